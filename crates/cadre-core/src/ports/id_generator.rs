//! IdGenerator port.
//!
//! Each scheduling session gets a `RunId` stamped on every state write it
//! makes. Abstracted as a trait so tests can pin the timestamp part.

use crate::domain::RunId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator produces session identifiers.
///
/// # ULID properties
/// - sortable by creation time
/// - no coordination needed
pub trait IdGenerator: Send + Sync {
    fn generate_run_id(&self) -> RunId;
}

/// ULID generator driven by a `Clock`.
///
/// With a `FixedClock` the timestamp part is deterministic; the random part
/// still differs between calls.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_run_id(&self) -> RunId {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        RunId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
