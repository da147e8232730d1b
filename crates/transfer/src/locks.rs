use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) fn lock_mutex<'a, T>(lock: &'a Mutex<T>, name: &'static str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(
                event = "transfer_lock_poisoned",
                lock = name,
                access = "mutex"
            );
            poisoned.into_inner()
        }
    }
}

pub(crate) fn read_lock<'a, T>(lock: &'a RwLock<T>, name: &'static str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(
                event = "transfer_lock_poisoned",
                lock = name,
                access = "read"
            );
            poisoned.into_inner()
        }
    }
}

pub(crate) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    name: &'static str,
) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(
                event = "transfer_lock_poisoned",
                lock = name,
                access = "write"
            );
            poisoned.into_inner()
        }
    }
}
