//! Ports: the seams between the scheduler and the outside world.
//!
//! Each trait hides one external collaborator (execution backend, durable
//! storage, time, ids, operator confirmation).

pub mod clock;
pub mod confirm;
pub mod executor;
pub mod id_generator;
pub mod state_backend;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::confirm::{AssumeYes, Confirmation};
pub use self::executor::TaskExecutor;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::state_backend::StateBackend;
