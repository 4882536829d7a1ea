pub mod executor;
pub mod stage;

pub use executor::PipelineExecutor;
pub use stage::{Pipeline, PipelineError, Stage, StageKind};
