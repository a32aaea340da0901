use std::sync::atomic::{AtomicBool, Ordering};

/// Single-flight admission for catalog commit passes.
///
/// The gate is either open or closed. `try_close` never waits: exactly one
/// caller wins while the gate is open, every other caller gets `None` back.
/// The winner holds a [`GateGuard`] and the gate reopens when it is dropped,
/// on every exit path including unwinding.
#[derive(Debug, Default)]
pub struct CommitGate {
    closed: AtomicBool,
}

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_close(&self) -> Option<GateGuard<'_>> {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateGuard { gate: self })
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a CommitGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.closed.store(false, Ordering::Release);
    }
}
