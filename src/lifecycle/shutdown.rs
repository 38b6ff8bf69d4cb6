use log::info;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// One-shot guard around a shutdown sequence.
#[derive(Debug, Default)]
pub struct ShutdownTrigger {
    triggered: AtomicBool,
    exit_code: AtomicI32,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `body` if this is the first trigger; later calls return `false`
    /// without running anything, whatever their exit code.
    pub fn fire<F: FnOnce(i32)>(&self, exit_code: i32, body: F) -> bool {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.exit_code.store(exit_code, Ordering::Release);
        info!("event=shutdown_triggered exit_code={}", exit_code);
        body(exit_code);
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.is_triggered()
            .then(|| self.exit_code.load(Ordering::Acquire))
    }
}
