use super::step::StepAction;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct StepMetrics {
    pub name: String,
    pub action: StepAction,
    pub duration_ms: u128,
}

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub started_at: DateTime<Utc>,
    pub total_duration_ms: u128,
    pub cleanup_duration_ms: u128,
    pub steps: Vec<StepMetrics>,
}

impl PipelineMetrics {
    pub fn step_duration_ms(&self, name: &str) -> Option<u128> {
        self.steps
            .iter()
            .find(|step| step.name == name)
            .map(|step| step.duration_ms)
    }
}
