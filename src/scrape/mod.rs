//! Gallery crawl job: one at a time, progress observable while it runs.

mod controller;
mod state;

pub use controller::{ScrapeController, StartOutcome};
pub use state::{ScrapeJobState, ScrapePhase};
