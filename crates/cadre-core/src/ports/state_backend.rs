//! State backend port.
//!
//! The state store keeps the run state in memory and hands the whole
//! `{current, history}` file to a backend on every save. Backends are
//! synchronous: a commit returns only after the write attempt finished.

use crate::error::PersistenceError;
use crate::store::StateFile;

pub trait StateBackend: Send + Sync {
    /// Read the persisted file. `Ok(None)` when nothing has been written yet.
    fn read(&self) -> Result<Option<StateFile>, PersistenceError>;

    /// Replace the persisted file wholesale.
    fn write(&self, file: &StateFile) -> Result<(), PersistenceError>;

    /// Delete the persisted file. Removing a missing file is not an error.
    fn remove(&self) -> Result<(), PersistenceError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}
