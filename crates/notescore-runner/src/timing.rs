use std::time::Instant;

use tracing::info;

/// Logs how long a scoring phase took when dropped.
pub struct PhaseTimer {
    phase: &'static str,
    start: Instant,
}

impl PhaseTimer {
    pub fn start(phase: &'static str) -> Self {
        info!(phase, "phase started");
        Self {
            phase,
            start: Instant::now(),
        }
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        let elapsed_secs = self.start.elapsed().as_secs_f64();
        info!(phase = self.phase, elapsed_secs, "phase finished");
    }
}
