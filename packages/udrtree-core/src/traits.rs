use crate::error::Result;
use crate::ids::Lamport;
use crate::ops::MoveOperation;

/// Pluggable logical clock.
pub trait Clock {
    /// Issue a timestamp for a locally created operation and advance past it.
    fn tick(&mut self) -> Lamport;
    /// Advance strictly past a timestamp that has just been applied.
    fn observe(&mut self, external: Lamport);
    /// Next timestamp `tick` would hand out.
    fn now(&self) -> Lamport;
}

/// Sink for operations this replica originated; the engine hands every local op to it once
/// the op has been applied.
pub trait Outbox {
    fn publish(&mut self, op: &MoveOperation) -> Result<()>;
}

/// Lamport clock starting at 1.
#[derive(Clone, Debug)]
pub struct LamportClock {
    counter: Lamport,
}

impl LamportClock {
    pub fn starting_at(counter: Lamport) -> Self {
        Self { counter }
    }
}

impl Default for LamportClock {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl Clock for LamportClock {
    fn tick(&mut self) -> Lamport {
        let issued = self.counter;
        self.counter += 1;
        issued
    }

    fn observe(&mut self, external: Lamport) {
        self.counter = self.counter.max(external) + 1;
    }

    fn now(&self) -> Lamport {
        self.counter
    }
}

/// Buffers published operations in memory until the owner drains them.
///
/// Lets a caller hold the engine lock only for in-memory work and do the actual network
/// enqueueing after releasing it.
#[derive(Clone, Debug, Default)]
pub struct MemoryOutbox {
    pending: Vec<MoveOperation>,
}

impl MemoryOutbox {
    pub fn drain(&mut self) -> Vec<MoveOperation> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Outbox for MemoryOutbox {
    fn publish(&mut self, op: &MoveOperation) -> Result<()> {
        self.pending.push(op.clone());
        Ok(())
    }
}

/// Discards everything; for replicas that never replicate (tests, benchmarks).
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopOutbox;

impl Outbox for NoopOutbox {
    fn publish(&mut self, _op: &MoveOperation) -> Result<()> {
        Ok(())
    }
}
