//! Jobs module - lifecycle records, normalization, state store, and refresh

pub mod job;
pub mod normalizer;
pub mod refresh;
pub mod store;
pub mod worker;

pub use job::{Job, JobStatus};
pub use normalizer::ProgressReport;
