use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScrapePhase {
    Idle,
    Running,
    Succeeded,
    Failed { reason: String },
}

/// Progress of the current (or last) gallery crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeJobState {
    pub phase: ScrapePhase,
    /// Best estimate of the gallery size so far.
    pub total_items_known: usize,
    /// Entries written to the catalog by this run.
    pub completed_items: usize,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl ScrapeJobState {
    pub fn is_running(&self) -> bool {
        self.phase == ScrapePhase::Running
    }
}

impl Default for ScrapeJobState {
    fn default() -> Self {
        Self {
            phase: ScrapePhase::Idle,
            total_items_known: 0,
            completed_items: 0,
            started_at: None,
            finished_at: None,
        }
    }
}
