mod region;
mod wait;

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

pub use region::{RegionChanges, TriggerRegion};
pub use wait::{OneShotWait, WaitSlot, WaitToken, WaitTokenAllocator};

use crate::actor::{ActorSignal, PlayerActor, RewardHook, TimeScaleService};
use crate::challenge::{ChallengeId, ChallengeState, CompletionReport};
use crate::config::FocusTuning;
use crate::events::{TypingEvent, TypingEventBus};
use crate::router::{EnqueueOutcome, InputRouter};
use crate::targets::{ChallengeHost, TargetId, TargetWorld};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPhase {
    Idle,
    Activating,
    Resolving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    Started { target_count: usize },
    NotReady,
    AlreadyActive,
}

/// Collaborators a focus controller drives during one call.
pub struct FocusContext<'a> {
    pub now_ms: u64,
    pub router: &'a mut InputRouter,
    pub targets: &'a mut TargetWorld,
    pub player: &'a mut dyn PlayerActor,
    pub rewards: &'a mut dyn RewardHook,
    pub time_scale: &'a mut dyn TimeScaleService,
    pub events: &'a mut TypingEventBus,
}

/// Turns the set of eligible targets into a nearest-first sequence of
/// challenges: approach, type, attack, next. Any failure ends the session.
#[derive(Debug)]
pub struct FocusController {
    tuning: FocusTuning,
    phase: FocusPhase,
    eligible: BTreeSet<TargetId>,
    target_queue: Vec<TargetId>,
    active_target: Option<TargetId>,
    active_challenge: Option<ChallengeId>,
    wait: WaitSlot,
    tokens: WaitTokenAllocator,
    last_report: Option<CompletionReport>,
    remaining_seconds: f64,
    max_remaining_seconds: f64,
}

impl FocusController {
    pub fn new(tuning: FocusTuning) -> Self {
        Self {
            tuning,
            phase: FocusPhase::Idle,
            eligible: BTreeSet::new(),
            target_queue: Vec::new(),
            active_target: None,
            active_challenge: None,
            wait: WaitSlot::default(),
            tokens: WaitTokenAllocator::default(),
            last_report: None,
            remaining_seconds: 0.0,
            max_remaining_seconds: 0.0,
        }
    }

    pub fn try_activate(&mut self, ctx: &mut FocusContext<'_>) -> ActivationOutcome {
        if self.phase != FocusPhase::Idle {
            return ActivationOutcome::AlreadyActive;
        }
        if self.eligible.is_empty() {
            info!("focus_not_ready");
            ctx.events.emit(TypingEvent::FocusNotReady);
            return ActivationOutcome::NotReady;
        }

        self.phase = FocusPhase::Activating;
        let origin = ctx.player.position();
        let mut snapshot: Vec<(f32, TargetId)> = self
            .eligible
            .iter()
            .filter_map(|id| {
                ctx.targets
                    .position(*id)
                    .map(|position| (origin.distance(position), *id))
            })
            .collect();
        snapshot.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        self.target_queue = snapshot.into_iter().map(|(_, id)| id).collect();

        let target_count = self.target_queue.len();
        ctx.time_scale.set_scale(self.tuning.time_scale);
        info!(target_count, "focus_session_started");
        ctx.events
            .emit(TypingEvent::FocusSessionStarted { target_count });
        self.follow_next(ctx);
        ActivationOutcome::Started { target_count }
    }

    pub fn on_target_entered(&mut self, target_id: TargetId, ctx: &mut FocusContext<'_>) {
        self.eligible.insert(target_id);
        if self.phase == FocusPhase::Idle || self.target_queue.contains(&target_id) {
            return;
        }
        let Some(position) = ctx.targets.position(target_id) else {
            return;
        };
        let origin = ctx.player.position();
        let distance = origin.distance(position);
        let index = self
            .target_queue
            .iter()
            .position(|queued| {
                ctx.targets
                    .position(*queued)
                    .is_some_and(|other| origin.distance(other) > distance)
            })
            .unwrap_or(self.target_queue.len());
        self.target_queue.insert(index, target_id);
        debug!(target_id = target_id.0, index, "focus_target_inserted");
    }

    /// Drops a target that is no longer eligible. Losing the target being
    /// approached or typed moves straight on to the next one.
    pub fn on_target_exited(&mut self, target_id: TargetId, ctx: &mut FocusContext<'_>) {
        self.eligible.remove(&target_id);
        self.target_queue.retain(|queued| *queued != target_id);
        if self.active_target != Some(target_id) {
            return;
        }
        let interrupted = matches!(
            self.wait.current(),
            Some(OneShotWait::Arrival { .. } | OneShotWait::Resolution { .. })
        );
        if !interrupted {
            return;
        }

        self.wait.tear_down();
        self.active_target = None;
        self.active_challenge = None;
        ctx.router
            .cancel_target(target_id, ctx.now_ms, ctx.targets, ctx.events);
        info!(target_id = target_id.0, "focus_target_lost");
        self.follow_next(ctx);
    }

    pub fn handle_actor_signal(&mut self, signal: ActorSignal, ctx: &mut FocusContext<'_>) {
        let Some(wait) = self.wait.take_for_signal(signal) else {
            debug!(signal = ?signal, "stale_actor_signal_ignored");
            return;
        };
        match wait {
            OneShotWait::Arrival { target_id, .. } => self.on_arrival(target_id, ctx),
            OneShotWait::AttackFinished { target_id, .. } => {
                self.on_attack_finished(target_id, ctx)
            }
            OneShotWait::Resolution { .. } => {}
        }
    }

    pub fn handle_event(&mut self, event: &TypingEvent, ctx: &mut FocusContext<'_>) {
        match event {
            TypingEvent::ChallengeProgress {
                challenge_id,
                remaining_seconds,
                ..
            } if self.active_challenge == Some(*challenge_id) => {
                self.remaining_seconds = *remaining_seconds;
            }
            TypingEvent::ChallengeCompleted(report) => {
                if let Some(wait) = self.wait.take_for_resolution(report.challenge_id) {
                    self.on_challenge_completed(wait.target_id(), report, ctx);
                }
            }
            TypingEvent::ChallengeFailed {
                challenge_id,
                reason,
            } => {
                if let Some(wait) = self.wait.take_for_resolution(*challenge_id) {
                    warn!(
                        target_id = wait.target_id().0,
                        challenge_id = challenge_id.0,
                        reason = reason.as_str(),
                        "focus_challenge_failed"
                    );
                    self.end_session(false, ctx);
                }
            }
            _ => {}
        }
    }

    pub fn cancel_session(&mut self, ctx: &mut FocusContext<'_>) {
        self.end_session(false, ctx);
    }

    /// Approaches the next queued target. `Activating` holds until the first
    /// arrival; an empty queue ends the session as a success.
    fn follow_next(&mut self, ctx: &mut FocusContext<'_>) {
        while let Some(&target_id) = self.target_queue.first() {
            let open = ctx.targets.challenge(target_id).filter(|challenge| {
                matches!(
                    challenge.state(),
                    ChallengeState::Prepared | ChallengeState::Running
                )
            });
            let (Some(challenge), Some(position)) = (open, ctx.targets.position(target_id))
            else {
                warn!(
                    target_id = target_id.0,
                    state = ?ctx.targets.challenge_state(target_id),
                    "focus_target_skipped"
                );
                self.target_queue.remove(0);
                continue;
            };

            self.active_target = Some(target_id);
            self.active_challenge = Some(challenge.id());
            self.remaining_seconds = challenge.remaining_seconds(ctx.now_ms);
            self.max_remaining_seconds = challenge.max_remaining_seconds();
            let token = self.tokens.allocate();
            self.wait.arm(OneShotWait::Arrival { target_id, token });
            info!(
                target_id = target_id.0,
                remaining_targets = self.target_queue.len(),
                "focus_target_approach"
            );
            ctx.player
                .approach(position, self.tuning.stop_distance, token);
            return;
        }
        self.end_session(true, ctx);
    }

    fn on_arrival(&mut self, target_id: TargetId, ctx: &mut FocusContext<'_>) {
        self.phase = FocusPhase::Resolving;
        ctx.player.hold_pre_attack_pose();
        match ctx.targets.challenge(target_id).map(|challenge| challenge.state()) {
            Some(ChallengeState::Prepared) => {}
            Some(ChallengeState::Running) => {
                // Already routed outside the session; wait for it to resolve.
                if let Some(challenge_id) = self.active_challenge {
                    debug!(target_id = target_id.0, "focus_target_already_running");
                    self.wait.arm(OneShotWait::Resolution {
                        target_id,
                        challenge_id,
                    });
                }
                return;
            }
            state => {
                warn!(target_id = target_id.0, state = ?state, "focus_target_closed_on_arrival");
                self.skip_active(target_id, ctx);
                return;
            }
        }
        match ctx
            .router
            .enqueue(target_id, ctx.now_ms, ctx.targets, ctx.events)
        {
            Ok(EnqueueOutcome::Activated | EnqueueOutcome::Queued) => {
                if let Some(challenge_id) = self.active_challenge {
                    self.wait.arm(OneShotWait::Resolution {
                        target_id,
                        challenge_id,
                    });
                }
            }
            Ok(EnqueueOutcome::Dropped) => {
                warn!(target_id = target_id.0, "focus_target_dropped_by_router");
                self.skip_active(target_id, ctx);
            }
            Err(error) => {
                warn!(target_id = target_id.0, error = %error, "focus_target_rejected");
                self.skip_active(target_id, ctx);
            }
        }
    }

    fn skip_active(&mut self, target_id: TargetId, ctx: &mut FocusContext<'_>) {
        self.target_queue.retain(|queued| *queued != target_id);
        self.active_target = None;
        self.active_challenge = None;
        self.follow_next(ctx);
    }

    fn on_challenge_completed(
        &mut self,
        target_id: TargetId,
        report: &CompletionReport,
        ctx: &mut FocusContext<'_>,
    ) {
        self.target_queue.retain(|queued| *queued != target_id);
        self.eligible.remove(&target_id);
        self.active_challenge = None;
        self.last_report = Some(report.clone());
        info!(target_id = target_id.0, wpm = report.wpm, "focus_target_resolved");
        ctx.events.emit(TypingEvent::TargetResolved { target_id });

        let token = self.tokens.allocate();
        self.wait
            .arm(OneShotWait::AttackFinished { target_id, token });
        ctx.player.resume_attack(token);
    }

    fn on_attack_finished(&mut self, target_id: TargetId, ctx: &mut FocusContext<'_>) {
        self.pay_out(target_id, ctx);
        self.follow_next(ctx);
    }

    fn pay_out(&mut self, target_id: TargetId, ctx: &mut FocusContext<'_>) {
        ctx.rewards
            .target_resolved(target_id, self.last_report.as_ref());
        self.last_report = None;
        ctx.targets.despawn(target_id);
        if self.active_target == Some(target_id) {
            self.active_target = None;
        }
    }

    fn end_session(&mut self, success: bool, ctx: &mut FocusContext<'_>) {
        if self.phase == FocusPhase::Idle {
            return;
        }
        // A completed target mid-attack still gets its reward and removal.
        if let Some(OneShotWait::AttackFinished { target_id, .. }) = self.wait.tear_down() {
            self.pay_out(target_id, ctx);
        }
        if let Some(target_id) = self.active_target.take() {
            self.active_challenge = None;
            ctx.router
                .cancel_target(target_id, ctx.now_ms, ctx.targets, ctx.events);
        }
        self.target_queue.clear();
        self.last_report = None;
        self.remaining_seconds = 0.0;
        ctx.player.resume_normal_state();
        ctx.time_scale.restore();
        self.phase = FocusPhase::Idle;
        info!(success, "focus_session_ended");
        ctx.events.emit(TypingEvent::FocusSessionEnded { success });
    }

    pub fn phase(&self) -> FocusPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase != FocusPhase::Idle
    }

    pub fn target_queue(&self) -> &[TargetId] {
        &self.target_queue
    }

    pub fn active_target(&self) -> Option<TargetId> {
        self.active_target
    }

    pub fn active_challenge(&self) -> Option<ChallengeId> {
        self.active_challenge
    }

    pub fn current_wait(&self) -> Option<OneShotWait> {
        self.wait.current()
    }

    pub fn eligible(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.eligible.iter().copied()
    }

    pub fn has_eligible_targets(&self) -> bool {
        !self.eligible.is_empty()
    }

    /// Remaining time of the challenge being worked on, as last reported.
    pub fn remaining_seconds(&self) -> f64 {
        self.remaining_seconds
    }

    pub fn max_remaining_seconds(&self) -> f64 {
        self.max_remaining_seconds
    }

    pub fn tuning(&self) -> FocusTuning {
        self.tuning
    }
}
