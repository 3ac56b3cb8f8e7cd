use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag preventing the Voice Ear from reacting to the runtime's own
/// spoken output (echo self-triggering), matching the distilled source's
/// `AudioManager.is_speaking` (§4.7).
#[derive(Debug, Default)]
pub struct AudioGate {
    speaking: AtomicBool,
}

impl AudioGate {
    /// A gate with speech not in progress.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `true` while the runtime is producing spoken output.
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    /// Marks speech as starting; pairs with [`AudioGate::end_speaking`].
    pub fn begin_speaking(&self) {
        self.speaking.store(true, Ordering::Release);
    }

    /// Marks speech as finished.
    pub fn end_speaking(&self) {
        self.speaking.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_toggles() {
        let gate = AudioGate::new();
        assert!(!gate.is_speaking());
        gate.begin_speaking();
        assert!(gate.is_speaking());
        gate.end_speaking();
        assert!(!gate.is_speaking());
    }
}
