pub mod job_responses;
pub mod save_request;

pub use job_responses::{AppliedResponse, MessageResponse, SaveJobResponse};
pub use save_request::{SaveJobRequest, SimilarityScore};
