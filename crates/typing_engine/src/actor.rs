use tracing::debug;

use crate::app::Vec2;
use crate::challenge::CompletionReport;
use crate::focus::WaitToken;
use crate::targets::TargetId;

/// Completion notices raised by the player actor, tagged with the token of
/// the command that started them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorSignal {
    Arrived(WaitToken),
    AttackFinished(WaitToken),
}

/// Choreography the focus controller drives between challenges.
pub trait PlayerActor {
    fn position(&self) -> Vec2;
    /// Move toward `destination`, raising `Arrived(token)` once within `stop_distance`.
    fn approach(&mut self, destination: Vec2, stop_distance: f32, token: WaitToken);
    fn hold_pre_attack_pose(&mut self);
    /// Play the attack, raising `AttackFinished(token)` when it ends.
    fn resume_attack(&mut self, token: WaitToken);
    fn resume_normal_state(&mut self);
    /// Advance by scaled world time, pushing any signals raised this step.
    fn update(&mut self, world_dt_seconds: f32, signals: &mut Vec<ActorSignal>);
}

/// Called once per target fully resolved by a focus session.
pub trait RewardHook {
    fn target_resolved(&mut self, target_id: TargetId, report: Option<&CompletionReport>);
}

impl RewardHook for () {
    fn target_resolved(&mut self, _target_id: TargetId, _report: Option<&CompletionReport>) {}
}

pub trait TimeScaleService {
    fn current(&self) -> f64;
    /// Applies `scale`, remembering the pre-focus value the first time.
    fn set_scale(&mut self, scale: f64);
    /// Returns to the remembered value. Repeated calls are no-ops.
    fn restore(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineTimeScale {
    current: f64,
    original: Option<f64>,
}

impl Default for EngineTimeScale {
    fn default() -> Self {
        Self {
            current: 1.0,
            original: None,
        }
    }
}

impl EngineTimeScale {
    pub fn is_overridden(&self) -> bool {
        self.original.is_some()
    }
}

impl TimeScaleService for EngineTimeScale {
    fn current(&self) -> f64 {
        self.current
    }

    fn set_scale(&mut self, scale: f64) {
        if self.original.is_none() {
            self.original = Some(self.current);
        }
        self.current = scale;
        debug!(scale, "time_scale_set");
    }

    fn restore(&mut self) {
        if let Some(original) = self.original.take() {
            self.current = original;
            debug!(scale = original, "time_scale_restored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_returns_to_value_before_first_override() {
        let mut scale = EngineTimeScale::default();
        scale.set_scale(0.22);
        scale.set_scale(0.5);
        assert_eq!(scale.current(), 0.5);
        scale.restore();
        assert_eq!(scale.current(), 1.0);
        assert!(!scale.is_overridden());
    }

    #[test]
    fn restore_is_idempotent() {
        let mut scale = EngineTimeScale::default();
        scale.restore();
        assert_eq!(scale.current(), 1.0);
        scale.set_scale(0.22);
        scale.restore();
        scale.restore();
        assert_eq!(scale.current(), 1.0);
    }
}
