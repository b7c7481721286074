mod loop_runner;
mod metrics;
mod scene;

pub use loop_runner::{run_scene, LoopConfig, LoopExit, LoopSummary};
pub use metrics::LoopMetricsSnapshot;
pub use scene::{Scene, SceneCommand, Vec2};
