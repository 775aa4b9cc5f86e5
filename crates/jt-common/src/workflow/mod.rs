pub mod clock;
pub mod error;
pub mod saved_jobs;

pub use clock::{Clock, SystemClock};
pub use error::{WorkflowAction, WorkflowError};
pub use saved_jobs::{AppliedOutcome, SaveOutcome, SavedJobWorkflow};
