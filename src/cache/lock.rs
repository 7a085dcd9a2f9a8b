use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Acquire `lock`, recovering the guard if a previous holder panicked.
///
/// `op` names the caller in the log line, e.g. `"store.set"`.
pub(crate) fn mutex_lock<'a, T>(lock: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                hint = "entries may predate a panic in another thread",
                "Recovered from poisoned cache lock"
            );
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn poisoned_mutex_is_recovered() {
        let lock = Mutex::new(1_u32);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.lock().expect("lock should be acquired");
            panic!("poison the lock");
        }));

        assert!(lock.is_poisoned());
        *mutex_lock(&lock, "lock.test") += 1;
        assert_eq!(*mutex_lock(&lock, "lock.test"), 2);
    }
}
