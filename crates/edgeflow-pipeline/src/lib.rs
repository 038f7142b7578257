pub mod config;
pub mod pipeline;
pub mod priority;
pub mod worker;

pub use config::{BackendKind, PipelineConfig, PriorityConfig};
pub use pipeline::{backend_for, Pipeline};
pub use worker::{StageEvent, ThreadedPipeline, WorkerOptions};
