use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("pipeline has no stages")]
    Empty,

    #[error("stage '{0}' has zero weight")]
    ZeroWeight(String),

    #[error("pipeline needs exactly one render stage, found {0}")]
    RenderStages(usize),

    #[error("stage duration of {0} seconds is out of range")]
    Duration(f64),
}

/// What a stage does while it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageKind {
    /// No real work: wait out the duration while reporting interpolated progress
    Timed(Duration),
    /// Invoke the renderer and wait for it
    Render,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub weight: u32,
    pub kind: StageKind,
}

impl Stage {
    pub fn timed(name: &str, weight: u32, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            weight,
            kind: StageKind::Timed(duration),
        }
    }

    pub fn render(name: &str, weight: u32) -> Self {
        Self {
            name: name.to_string(),
            weight,
            kind: StageKind::Render,
        }
    }
}

/// Ordered, weighted stage table shared by every job
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
    total_weight: u32,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Result<Self, PipelineError> {
        if stages.is_empty() {
            return Err(PipelineError::Empty);
        }
        if let Some(stage) = stages.iter().find(|s| s.weight == 0) {
            return Err(PipelineError::ZeroWeight(stage.name.clone()));
        }
        let renders = stages.iter().filter(|s| s.kind == StageKind::Render).count();
        if renders != 1 {
            return Err(PipelineError::RenderStages(renders));
        }

        let total_weight = stages.iter().map(|s| s.weight).sum();
        Ok(Self { stages, total_weight })
    }

    /// The text-to-video pipeline; `time_scale` stretches or shrinks the
    /// simulated stage durations (0 disables the waits).
    pub fn video_generation(time_scale: f64) -> Result<Self, PipelineError> {
        let scaled = |secs: f64| {
            let scaled = secs * time_scale;
            Duration::try_from_secs_f64(scaled).map_err(|_| PipelineError::Duration(scaled))
        };

        Self::new(vec![
            Stage::timed("Analyzing Text", 15, scaled(2.0)?),
            Stage::timed("Generating Audio", 25, scaled(3.0)?),
            Stage::timed("Creating Slideshow", 35, scaled(3.0)?),
            Stage::render("Finalizing Video", 25),
        ])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_weight(&self) -> u32 {
        self.total_weight
    }

    /// Progress percentage once `completed_weight` worth of stages are done, floored
    pub fn progress_at(&self, completed_weight: u32) -> u8 {
        self.interpolate(completed_weight, 0, 0, 1)
    }

    /// Progress `step` of `steps` through a stage of `weight` that starts
    /// after `completed_weight`, floored
    pub fn interpolate(&self, completed_weight: u32, weight: u32, step: u32, steps: u32) -> u8 {
        let steps = u64::from(steps.max(1));
        let numerator = (u64::from(completed_weight) * steps + u64::from(weight) * u64::from(step)) * 100;
        let denominator = u64::from(self.total_weight) * steps;
        (numerator / denominator).min(100) as u8
    }
}
