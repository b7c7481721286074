pub mod actor;
pub mod app;
pub mod challenge;
pub mod config;
pub mod encounter;
pub mod events;
pub mod focus;
pub mod router;
pub mod scoring;
pub mod targets;

pub use actor::{ActorSignal, EngineTimeScale, PlayerActor, RewardHook, TimeScaleService};
pub use app::{
    run_scene, LoopConfig, LoopExit, LoopMetricsSnapshot, LoopSummary, Scene, SceneCommand, Vec2,
};
pub use challenge::{
    Challenge, ChallengeError, ChallengeId, ChallengeIdAllocator, ChallengeOutcome,
    ChallengeState, CompletionReport, DisplaySegments, FailureReason, Keystroke,
};
pub use config::{ConfigError, EngineConfig, FocusTuning, RouterTuning, TypingTuning};
pub use encounter::{Encounter, TypingInput};
pub use events::{TypingEvent, TypingEventBus, TypingEventCounts, TypingEventKind};
pub use focus::{
    ActivationOutcome, FocusContext, FocusController, FocusPhase, OneShotWait, RegionChanges,
    TriggerRegion, WaitToken,
};
pub use router::{ActiveChallenge, EnqueueOutcome, InputRouter, RouterError};
pub use scoring::{
    accuracy, keystroke_accuracy, seconds_to_ms, wpm, DefaultTimeBonusPolicy, TimeBonusPolicy,
};
pub use targets::{
    ChallengeContent, ChallengeHost, Target, TargetContentProvider, TargetId, TargetWorld,
};
