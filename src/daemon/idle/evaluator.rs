pub struct IdleEvaluator {
    threshold_ms: u64,
}

impl IdleEvaluator {
    pub fn from_seconds(threshold_s: u64) -> Self {
        Self {
            threshold_ms: threshold_s * 1000,
        }
    }

    pub fn is_idle(&self, idle_time_ms: u64) -> bool {
        self.threshold_ms < idle_time_ms
    }
}
