pub mod record;
pub mod runner;
pub mod store;

pub use record::{JobRecord, JobState};
pub use runner::JobRunner;
pub use store::{InMemoryJobStore, JobStore};
