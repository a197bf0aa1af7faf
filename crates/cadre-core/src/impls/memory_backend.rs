//! MemoryBackend - state backend that never touches the disk
//!
//! Used when `state.persistence` is off and in tests. Clones share the same
//! storage, so a test can keep a handle and inspect what the store wrote.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::PersistenceError;
use crate::ports::StateBackend;
use crate::store::StateFile;

#[derive(Clone, Default)]
pub struct MemoryBackend {
    file: Arc<Mutex<Option<StateFile>>>,
    failing: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose every operation fails.
    pub fn failing() -> Self {
        let backend = Self::new();
        backend.set_failing(true);
        backend
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Last file written, if any.
    pub fn snapshot(&self) -> Option<StateFile> {
        self.file.lock().ok().and_then(|file| file.clone())
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PersistenceError::Unavailable(
                "memory backend set to fail".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<StateFile>>, PersistenceError> {
        self.file
            .lock()
            .map_err(|e| PersistenceError::Unavailable(format!("memory backend poisoned: {e}")))
    }
}

impl StateBackend for MemoryBackend {
    fn read(&self) -> Result<Option<StateFile>, PersistenceError> {
        self.check()?;
        Ok(self.slot()?.clone())
    }

    fn write(&self, file: &StateFile) -> Result<(), PersistenceError> {
        self.check()?;
        *self.slot()? = Some(file.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self) -> Result<(), PersistenceError> {
        self.check()?;
        *self.slot()? = None;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_storage() {
        let backend = MemoryBackend::new();
        let handle = backend.clone();
        backend.write(&StateFile::default()).unwrap();
        assert!(handle.snapshot().is_some());
        assert_eq!(handle.write_count(), 1);

        handle.remove().unwrap();
        assert!(backend.read().unwrap().is_none());
    }

    #[test]
    fn failing_backend_fails_every_operation() {
        let backend = MemoryBackend::failing();
        assert!(backend.read().is_err());
        assert!(backend.write(&StateFile::default()).is_err());
        assert!(backend.remove().is_err());
        assert_eq!(backend.write_count(), 0);

        backend.set_failing(false);
        assert!(backend.write(&StateFile::default()).is_ok());
    }
}
