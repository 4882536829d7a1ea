pub mod models;
pub mod registry;

pub use models::{Artifact, Job, JobId, JobStatus};
pub use registry::{JobRegistry, RegistryError};
