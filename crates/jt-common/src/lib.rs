pub mod api;
pub mod db;
pub mod identity;
pub mod logging;
pub mod models;
pub mod seed;
pub mod workflow;

pub use identity::{IdentityError, IdentityResolver, Principal};
pub use models::{Job, NewJob, Role, RoleName, User};
pub use workflow::{SavedJobWorkflow, WorkflowError};
