pub mod error;
mod job_runner;
mod view_count;

pub use job_runner::{JobHandle, JobRunner, PruneJob};
pub use view_count::{ViewCountCache, ViewState};
