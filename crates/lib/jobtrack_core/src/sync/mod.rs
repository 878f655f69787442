//! Mutual-exclusion primitives.
//!
//! [`KeyedMutex`] serializes work per key inside one process;
//! [`DistributedLock`] does the same across processes through the shared
//! token store.

pub mod distributed;
pub mod mutex;

pub use distributed::{DistributedLock, LockError};
pub use mutex::KeyedMutex;
