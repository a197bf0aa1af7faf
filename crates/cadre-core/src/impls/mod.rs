//! Implementations of the ports.
//!
//! - **FileBackend**: JSON state file (production)
//! - **MemoryBackend**: in-memory state (tests, `persistence: false`)
//! - **CommandExecutor**: shell-command execution backend

pub mod command_executor;
pub mod file_backend;
pub mod memory_backend;

pub use self::command_executor::CommandExecutor;
pub use self::file_backend::FileBackend;
pub use self::memory_backend::MemoryBackend;
