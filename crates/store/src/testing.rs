//! Test doubles shared by the index, ledger and engine test suites.

use crate::{InMemoryBackend, SnapshotBackend, StoreError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory backend whose writes can be switched to fail.
///
/// Reads always succeed so tests can inspect what was (not) persisted.
pub struct FlakyBackend {
    inner: InMemoryBackend,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
    fail_from: AtomicUsize,
}

impl Default for FlakyBackend {
    fn default() -> Self {
        Self {
            inner: InMemoryBackend::new(),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            fail_from: AtomicUsize::new(usize::MAX),
        }
    }
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every write while `fail` is set. Clearing it also cancels
    /// [`fail_after`](Self::fail_after).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
        if !fail {
            self.fail_from.store(usize::MAX, Ordering::SeqCst);
        }
    }

    /// Let the next `ok_writes` writes succeed and fail every one after.
    pub fn fail_after(&self, ok_writes: usize) {
        let start = self.writes.load(Ordering::SeqCst);
        self.fail_from
            .store(start.saturating_add(ok_writes), Ordering::SeqCst);
    }

    /// Writes attempted so far, failed ones included.
    pub fn write_attempts(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        let attempt = self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst)
            || attempt >= self.fail_from.load(Ordering::SeqCst)
        {
            Err(StoreError::backend("injected write failure"))
        } else {
            Ok(())
        }
    }
}

impl SnapshotBackend for FlakyBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key)
    }

    fn put_many(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put_many(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_after_lets_a_fixed_number_of_writes_through() {
        let backend = FlakyBackend::new();
        backend.put("a", b"1").unwrap();
        backend.fail_after(1);
        backend.put("b", b"2").unwrap();
        assert!(backend.put("c", b"3").is_err());
        assert!(backend.put_many(vec![("d".into(), b"4".to_vec())]).is_err());
        assert_eq!(backend.get("c").unwrap(), None);
        assert_eq!(backend.write_attempts(), 4);

        backend.set_fail_writes(false);
        backend.put("c", b"3").unwrap();
        assert_eq!(backend.get("c").unwrap(), Some(b"3".to_vec()));
    }
}
