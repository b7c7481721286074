use std::time::Duration;

use tracing::{debug, info};

use crate::actor::{ActorSignal, EngineTimeScale, PlayerActor, RewardHook, TimeScaleService};
use crate::challenge::DisplaySegments;
use crate::config::EngineConfig;
use crate::events::{TypingEventBus, TypingEventCounts};
use crate::focus::{ActivationOutcome, FocusContext, FocusController, TriggerRegion};
use crate::router::{EnqueueOutcome, InputRouter, RouterError};
use crate::targets::{ChallengeHost, TargetContentProvider, TargetId, TargetWorld};

/// Input gathered for one fixed tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingInput {
    typed: Vec<char>,
    backspaces: u32,
    activate_focus: bool,
    cancel_focus: bool,
    cancel_challenge: bool,
}

impl TypingInput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_typed(mut self, text: &str) -> Self {
        self.typed.extend(text.chars());
        self
    }

    pub fn with_char(mut self, ch: char) -> Self {
        self.typed.push(ch);
        self
    }

    pub fn with_backspaces(mut self, backspaces: u32) -> Self {
        self.backspaces = backspaces;
        self
    }

    pub fn with_activate_focus(mut self, activate_focus: bool) -> Self {
        self.activate_focus = activate_focus;
        self
    }

    pub fn with_cancel_focus(mut self, cancel_focus: bool) -> Self {
        self.cancel_focus = cancel_focus;
        self
    }

    pub fn with_cancel_challenge(mut self, cancel_challenge: bool) -> Self {
        self.cancel_challenge = cancel_challenge;
        self
    }

    pub fn typed(&self) -> &[char] {
        &self.typed
    }

    pub fn backspaces(&self) -> u32 {
        self.backspaces
    }

    pub fn activate_focus(&self) -> bool {
        self.activate_focus
    }

    pub fn cancel_focus(&self) -> bool {
        self.cancel_focus
    }

    pub fn cancel_challenge(&self) -> bool {
        self.cancel_challenge
    }
}

/// One combat encounter: targets, the input router, the focus controller and
/// the player, advanced together one fixed tick at a time.
///
/// Challenge deadlines run on unscaled simulation time; the player moves on
/// world time, which a focus session slows down.
pub struct Encounter<P: PlayerActor, R: RewardHook = ()> {
    config: EngineConfig,
    elapsed: Duration,
    tick: u64,
    targets: TargetWorld,
    router: InputRouter,
    focus: FocusController,
    region: TriggerRegion,
    events: TypingEventBus,
    totals: TypingEventCounts,
    dispatched: usize,
    signals: Vec<ActorSignal>,
    time_scale: EngineTimeScale,
    player: P,
    rewards: R,
}

impl<P: PlayerActor, R: RewardHook> Encounter<P, R> {
    pub fn new(config: EngineConfig, player: P, rewards: R) -> Self {
        Self {
            config,
            elapsed: Duration::ZERO,
            tick: 0,
            targets: TargetWorld::new(config.typing),
            router: InputRouter::new(config.router),
            focus: FocusController::new(config.focus),
            region: TriggerRegion::new(config.focus.trigger_radius),
            events: TypingEventBus::default(),
            totals: TypingEventCounts::default(),
            dispatched: 0,
            signals: Vec::new(),
            time_scale: EngineTimeScale::default(),
            player,
            rewards,
        }
    }

    /// Runs one fixed tick. Events raised during the tick stay readable
    /// through `events()` until the next call.
    pub fn update(&mut self, fixed_dt: Duration, input: &TypingInput) {
        self.events.finish_tick_rollover();
        self.totals.accumulate(&self.events.last_tick_counts());
        self.dispatched = 0;
        self.elapsed = self.elapsed.saturating_add(fixed_dt);
        self.tick = self.tick.saturating_add(1);
        let now_ms = self.now_ms();

        // Timeouts resolve before any of this tick's input is seen.
        self.router.tick(now_ms, &mut self.targets, &mut self.events);
        self.dispatch();
        self.refresh_region();

        if input.cancel_focus {
            let (focus, mut ctx) = self.split();
            focus.cancel_session(&mut ctx);
            self.dispatch();
        }
        if input.activate_focus {
            let (focus, mut ctx) = self.split();
            let outcome = focus.try_activate(&mut ctx);
            debug!(outcome = ?outcome, "focus_activation_requested");
            self.dispatch();
        }
        if input.cancel_challenge {
            self.router.cancel_active(&mut self.targets, &mut self.events);
            self.dispatch();
            self.router
                .advance_queue(now_ms, &mut self.targets, &mut self.events);
            self.dispatch();
        }
        for &ch in &input.typed {
            self.router
                .type_character(ch, now_ms, &mut self.targets, &mut self.events);
            self.dispatch();
        }
        for _ in 0..input.backspaces {
            self.router.backspace();
        }

        let world_dt_seconds = fixed_dt.as_secs_f32() * self.time_scale.current() as f32;
        self.player.update(world_dt_seconds, &mut self.signals);
        let signals = std::mem::take(&mut self.signals);
        for signal in &signals {
            let (focus, mut ctx) = self.split();
            focus.handle_actor_signal(*signal, &mut ctx);
            self.dispatch();
        }
        self.signals = signals;
        self.signals.clear();

        self.apply_despawns();
        self.refresh_region();
        self.dispatch();
    }

    pub fn try_activate_focus(&mut self) -> ActivationOutcome {
        let (focus, mut ctx) = self.split();
        let outcome = focus.try_activate(&mut ctx);
        self.dispatch();
        outcome
    }

    /// Queues a target's challenge outside of any focus session.
    pub fn enqueue(&mut self, target_id: TargetId) -> Result<EnqueueOutcome, RouterError> {
        let now_ms = self.now_ms();
        let outcome = self
            .router
            .enqueue(target_id, now_ms, &mut self.targets, &mut self.events);
        self.dispatch();
        outcome
    }

    pub fn rearm_failed(&mut self, provider: &mut dyn TargetContentProvider) -> Vec<TargetId> {
        let rearmed = self.targets.rearm_failed(provider);
        if !rearmed.is_empty() {
            info!(count = rearmed.len(), "targets_rearmed");
        }
        rearmed
    }

    /// Presentation data for the live challenge.
    pub fn active_display(&self) -> Option<DisplaySegments> {
        let target_id = self.router.active_target()?;
        self.targets
            .challenge(target_id)
            .map(|challenge| challenge.display_segments(self.now_ms()))
    }

    pub fn now_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn targets(&self) -> &TargetWorld {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut TargetWorld {
        &mut self.targets
    }

    pub fn router(&self) -> &InputRouter {
        &self.router
    }

    pub fn focus(&self) -> &FocusController {
        &self.focus
    }

    pub fn region(&self) -> &TriggerRegion {
        &self.region
    }

    pub fn events(&self) -> &TypingEventBus {
        &self.events
    }

    /// Event counts over every completed tick.
    pub fn totals(&self) -> TypingEventCounts {
        self.totals
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale.current()
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    pub fn rewards(&self) -> &R {
        &self.rewards
    }

    pub fn rewards_mut(&mut self) -> &mut R {
        &mut self.rewards
    }

    fn split(&mut self) -> (&mut FocusController, FocusContext<'_>) {
        let now_ms = self.now_ms();
        (
            &mut self.focus,
            FocusContext {
                now_ms,
                router: &mut self.router,
                targets: &mut self.targets,
                player: &mut self.player,
                rewards: &mut self.rewards,
                time_scale: &mut self.time_scale,
                events: &mut self.events,
            },
        )
    }

    /// Hands every event not yet seen by the focus controller to it, including
    /// any raised while handling.
    fn dispatch(&mut self) {
        while let Some(event) = self.events.get(self.dispatched).cloned() {
            self.dispatched += 1;
            let (focus, mut ctx) = self.split();
            focus.handle_event(&event, &mut ctx);
        }
    }

    fn apply_despawns(&mut self) {
        let now_ms = self.now_ms();
        let pending = self.targets.pending_despawns().to_vec();
        for target_id in pending {
            self.router
                .cancel_target(target_id, now_ms, &mut self.targets, &mut self.events);
        }
        self.dispatch();
        let removed = self.targets.apply_pending();
        if !removed.is_empty() {
            debug!(count = removed.len(), "targets_despawned");
        }
    }

    fn refresh_region(&mut self) {
        let center = self.player.position();
        let changes = self.region.refresh(center, &self.targets, &mut self.events);
        for target_id in changes.exited {
            let (focus, mut ctx) = self.split();
            focus.on_target_exited(target_id, &mut ctx);
        }
        for target_id in changes.entered {
            let (focus, mut ctx) = self.split();
            focus.on_target_entered(target_id, &mut ctx);
        }
        self.dispatch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Vec2;
    use crate::challenge::{ChallengeState, CompletionReport};
    use crate::events::TypingEvent;
    use crate::focus::{FocusPhase, WaitToken};
    use crate::targets::ChallengeContent;

    const TICK: Duration = Duration::from_millis(20);

    /// Arrives one tick after every approach and finishes attacks after a
    /// fixed amount of world time.
    #[derive(Debug, Default)]
    struct QuickPlayer {
        position: Vec2,
        arriving: Option<WaitToken>,
        attacking: Option<(WaitToken, f32)>,
        last_world_dt: f32,
        normal_resumes: u32,
    }

    impl PlayerActor for QuickPlayer {
        fn position(&self) -> Vec2 {
            self.position
        }

        fn approach(&mut self, _destination: Vec2, _stop_distance: f32, token: WaitToken) {
            self.arriving = Some(token);
        }

        fn hold_pre_attack_pose(&mut self) {}

        fn resume_attack(&mut self, token: WaitToken) {
            self.attacking = Some((token, 0.05));
        }

        fn resume_normal_state(&mut self) {
            self.normal_resumes += 1;
            self.arriving = None;
            self.attacking = None;
        }

        fn update(&mut self, world_dt_seconds: f32, signals: &mut Vec<ActorSignal>) {
            self.last_world_dt = world_dt_seconds;
            if let Some(token) = self.arriving.take() {
                signals.push(ActorSignal::Arrived(token));
            }
            if let Some((token, remaining)) = self.attacking.as_mut() {
                *remaining -= world_dt_seconds;
                if *remaining <= 0.0 {
                    signals.push(ActorSignal::AttackFinished(*token));
                    self.attacking = None;
                }
            }
        }
    }

    #[derive(Debug, Default)]
    struct Tally {
        resolved: Vec<TargetId>,
        wpm: Vec<f64>,
    }

    impl RewardHook for Tally {
        fn target_resolved(&mut self, target_id: TargetId, report: Option<&CompletionReport>) {
            self.resolved.push(target_id);
            if let Some(report) = report {
                self.wpm.push(report.wpm);
            }
        }
    }

    fn encounter() -> Encounter<QuickPlayer, Tally> {
        Encounter::new(EngineConfig::default(), QuickPlayer::default(), Tally::default())
    }

    fn spawn(encounter: &mut Encounter<QuickPlayer, Tally>, x: f32, text: &str) -> TargetId {
        encounter
            .targets_mut()
            .spawn_with_challenge(
                Vec2::new(x, 0.0),
                text,
                ChallengeContent {
                    text: text.to_string(),
                    time_limit_seconds: 3.0,
                },
            )
            .expect("spawn")
    }

    fn run_until(
        encounter: &mut Encounter<QuickPlayer, Tally>,
        max_ticks: u32,
        mut done: impl FnMut(&Encounter<QuickPlayer, Tally>) -> bool,
    ) {
        for _ in 0..max_ticks {
            if done(encounter) {
                return;
            }
            encounter.update(TICK, &TypingInput::empty());
        }
        panic!("condition not reached within {max_ticks} ticks");
    }

    #[test]
    fn focus_session_clears_every_target_through_ticks() {
        let mut encounter = encounter();
        let far = spawn(&mut encounter, 90.0, "owl");
        let near = spawn(&mut encounter, 30.0, "cat");
        let mid = spawn(&mut encounter, 60.0, "dog");
        encounter.update(TICK, &TypingInput::empty());
        assert_eq!(encounter.region().len(), 3);

        encounter.update(TICK, &TypingInput::empty().with_activate_focus(true));
        assert!(encounter.focus().is_active());
        assert_eq!(encounter.time_scale(), 0.22);

        for text in ["cat", "dog", "owl"] {
            run_until(&mut encounter, 20, |encounter| {
                encounter.router().active_target().is_some()
            });
            encounter.update(TICK, &TypingInput::empty().with_typed(text));
            run_until(&mut encounter, 200, |encounter| {
                encounter.router().active_target().is_some() || !encounter.focus().is_active()
            });
        }

        assert_eq!(encounter.focus().phase(), FocusPhase::Idle);
        assert_eq!(encounter.rewards().resolved, vec![near, mid, far]);
        assert_eq!(encounter.rewards().wpm.len(), 3);
        assert_eq!(encounter.targets().target_count(), 0);
        assert!(encounter.region().is_empty());
        assert_eq!(encounter.time_scale(), 1.0);
        assert_eq!(encounter.player().normal_resumes, 1);
        assert!(encounter
            .events()
            .iter_emitted_so_far()
            .any(|event| *event == TypingEvent::FocusSessionEnded { success: true }));
    }

    #[test]
    fn world_time_is_scaled_during_focus() {
        let mut encounter = encounter();
        spawn(&mut encounter, 30.0, "cat");
        encounter.update(TICK, &TypingInput::empty());
        assert!((encounter.player().last_world_dt - 0.02).abs() < 1e-6);

        encounter.update(TICK, &TypingInput::empty().with_activate_focus(true));
        assert!((encounter.player().last_world_dt - 0.02 * 0.22).abs() < 1e-6);
    }

    #[test]
    fn unanswered_focus_challenge_times_out_and_fails_session() {
        let mut encounter = encounter();
        let target = spawn(&mut encounter, 30.0, "dog");
        encounter.update(TICK, &TypingInput::empty());
        encounter.update(TICK, &TypingInput::empty().with_activate_focus(true));
        run_until(&mut encounter, 20, |encounter| {
            encounter.router().active_target().is_some()
        });
        let activated_at = encounter.now_ms();

        run_until(&mut encounter, 400, |encounter| !encounter.focus().is_active());
        assert!(encounter.now_ms() >= activated_at + 3_000);
        assert_eq!(
            encounter.targets().challenge_state(target),
            Some(ChallengeState::Failed)
        );
        assert!(encounter
            .events()
            .iter_emitted_so_far()
            .any(|event| *event == TypingEvent::FocusSessionEnded { success: false }));
        assert_eq!(encounter.time_scale(), 1.0);
        assert!(encounter.rewards().resolved.is_empty());
    }

    #[test]
    fn activation_with_nothing_in_range_notifies() {
        let mut encounter = encounter();
        spawn(&mut encounter, 1_000.0, "cat");
        encounter.update(TICK, &TypingInput::empty().with_activate_focus(true));
        assert!(!encounter.focus().is_active());
        assert!(encounter
            .events()
            .iter_emitted_so_far()
            .any(|event| *event == TypingEvent::FocusNotReady));
    }

    #[test]
    fn timeout_takes_priority_over_input_in_same_tick() {
        let mut encounter = encounter();
        let target = spawn(&mut encounter, 1_000.0, "ab");
        encounter.update(TICK, &TypingInput::empty());
        assert_eq!(encounter.enqueue(target), Ok(EnqueueOutcome::Activated));
        encounter.update(TICK, &TypingInput::empty().with_typed("a"));

        let deadline = encounter
            .targets()
            .challenge(target)
            .expect("challenge")
            .deadline_ms();
        assert_eq!(deadline, 3_520);
        while encounter.now_ms() + (TICK.as_millis() as u64) < deadline {
            encounter.update(TICK, &TypingInput::empty());
        }
        assert_eq!(
            encounter.targets().challenge_state(target),
            Some(ChallengeState::Running)
        );
        encounter.update(TICK, &TypingInput::empty().with_typed("b"));
        assert_eq!(
            encounter.targets().challenge_state(target),
            Some(ChallengeState::Failed)
        );
        assert_eq!(
            encounter.targets().challenge(target).expect("challenge").cursor(),
            1
        );
    }

    #[test]
    fn despawning_live_target_cancels_its_challenge() {
        let mut encounter = encounter();
        let first = spawn(&mut encounter, 1_000.0, "ab");
        let second = spawn(&mut encounter, 1_000.0, "cd");
        encounter.enqueue(first).expect("enqueue");
        encounter.enqueue(second).expect("enqueue");

        encounter.targets_mut().despawn(first);
        encounter.update(TICK, &TypingInput::empty());

        assert!(encounter.targets().find(first).is_none());
        assert_eq!(encounter.router().active_target(), Some(second));
        assert!(encounter.events().iter_emitted_so_far().any(|event| matches!(
            event,
            TypingEvent::ChallengeFailed { .. }
        )));
    }

    #[test]
    fn display_and_backspace_follow_live_challenge() {
        let mut encounter = encounter();
        let target = spawn(&mut encounter, 1_000.0, "cat");
        encounter.enqueue(target).expect("enqueue");
        encounter.update(TICK, &TypingInput::empty().with_typed("cx"));

        let display = encounter.active_display().expect("display");
        assert_eq!(display.matched, "c");
        assert_eq!(display.invalid, Some('x'));
        assert_eq!(display.remaining, "t");
        assert_eq!(encounter.router().buffer(), "cx");

        encounter.update(TICK, &TypingInput::empty().with_backspaces(1));
        assert_eq!(encounter.router().buffer(), "c");
    }

    #[test]
    fn failed_targets_can_be_rearmed() {
        let mut encounter = encounter();
        let target = spawn(&mut encounter, 1_000.0, "ab");
        encounter.enqueue(target).expect("enqueue");
        encounter.update(TICK, &TypingInput::empty().with_cancel_challenge(true));
        assert_eq!(
            encounter.targets().challenge_state(target),
            Some(ChallengeState::Failed)
        );

        let mut provider = |_id: TargetId| {
            Some(ChallengeContent {
                text: "ba".to_string(),
                time_limit_seconds: 2.0,
            })
        };
        assert_eq!(encounter.rearm_failed(&mut provider), vec![target]);
        assert_eq!(encounter.enqueue(target), Ok(EnqueueOutcome::Activated));
    }

    #[test]
    fn cancelling_live_challenge_promotes_next_pending() {
        let mut encounter = encounter();
        let first = spawn(&mut encounter, 1_000.0, "ab");
        let second = spawn(&mut encounter, 1_000.0, "cd");
        encounter.enqueue(first).expect("enqueue");
        assert_eq!(encounter.enqueue(second), Ok(EnqueueOutcome::Queued));

        encounter.update(TICK, &TypingInput::empty().with_cancel_challenge(true));
        assert_eq!(
            encounter.targets().challenge_state(first),
            Some(ChallengeState::Failed)
        );
        assert_eq!(encounter.router().active_target(), Some(second));
        assert_eq!(encounter.router().pending_len(), 0);
        assert_eq!(
            encounter.targets().challenge_state(second),
            Some(ChallengeState::Running)
        );

        encounter.update(TICK, &TypingInput::empty().with_typed("cd"));
        assert_eq!(
            encounter.targets().challenge_state(second),
            Some(ChallengeState::Completed)
        );
    }

    #[test]
    fn cancelling_focus_mid_attack_keeps_the_reward() {
        let mut encounter = encounter();
        let target = spawn(&mut encounter, 30.0, "ab");
        encounter.update(TICK, &TypingInput::empty());
        encounter.update(TICK, &TypingInput::empty().with_activate_focus(true));
        run_until(&mut encounter, 20, |encounter| {
            encounter.router().active_target().is_some()
        });
        encounter.update(TICK, &TypingInput::empty().with_typed("ab"));
        assert_eq!(
            encounter.targets().challenge_state(target),
            Some(ChallengeState::Completed)
        );
        assert!(encounter.focus().is_active());

        encounter.update(TICK, &TypingInput::empty().with_cancel_focus(true));
        assert!(!encounter.focus().is_active());
        assert_eq!(encounter.rewards().resolved, vec![target]);
        assert!(encounter.targets().find(target).is_none());

        for _ in 0..50 {
            encounter.update(TICK, &TypingInput::empty());
        }
        assert_eq!(encounter.rewards().resolved, vec![target]);
    }

    #[test]
    fn totals_accumulate_across_ticks() {
        let mut encounter = encounter();
        encounter.update(TICK, &TypingInput::empty().with_typed("ab"));
        encounter.update(TICK, &TypingInput::empty().with_typed("c"));
        encounter.update(TICK, &TypingInput::empty());
        assert_eq!(encounter.totals().characters_typed, 3);
    }
}
