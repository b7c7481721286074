use std::collections::VecDeque;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::challenge::{ChallengeId, ChallengeOutcome, ChallengeState, Keystroke};
use crate::config::RouterTuning;
use crate::events::{TypingEvent, TypingEventBus};
use crate::targets::{ChallengeHost, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The target's challenge is now the live one.
    Activated,
    Queued,
    /// The pending queue was full; the request was discarded.
    Dropped,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("target {target_id} does not exist")]
    UnknownTarget { target_id: TargetId },
    #[error("target {target_id} has no challenge")]
    NoChallenge { target_id: TargetId },
    #[error("challenge for target {target_id} is {state:?}, expected Prepared")]
    NotPrepared {
        target_id: TargetId,
        state: ChallengeState,
    },
    #[error("target {target_id} is already queued or active")]
    AlreadyQueued { target_id: TargetId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveChallenge {
    pub target_id: TargetId,
    pub challenge_id: ChallengeId,
}

/// Routes typed characters to the single live challenge and holds the FIFO of
/// challenges waiting for their turn.
#[derive(Debug)]
pub struct InputRouter {
    tuning: RouterTuning,
    buffer: String,
    buffer_len: usize,
    last_char: Option<char>,
    pending: VecDeque<TargetId>,
    active: Option<ActiveChallenge>,
}

impl Default for InputRouter {
    fn default() -> Self {
        Self::new(RouterTuning::default())
    }
}

impl InputRouter {
    pub fn new(tuning: RouterTuning) -> Self {
        Self {
            tuning,
            buffer: String::new(),
            buffer_len: 0,
            last_char: None,
            pending: VecDeque::with_capacity(tuning.pending_queue_capacity),
            active: None,
        }
    }

    /// Records `ch` in the input buffer and forwards it to the live challenge.
    /// The buffer stops growing at capacity; forwarding is unaffected.
    pub fn type_character(
        &mut self,
        ch: char,
        now_ms: u64,
        host: &mut dyn ChallengeHost,
        events: &mut TypingEventBus,
    ) -> Keystroke {
        self.last_char = Some(ch);
        if self.buffer_len < self.tuning.buffer_capacity {
            self.buffer.push(ch);
            self.buffer_len += 1;
        } else {
            debug!(capacity = self.tuning.buffer_capacity, "input_buffer_full");
        }
        events.emit(TypingEvent::CharacterTyped { ch });

        let Some(active) = self.active else {
            return Keystroke::Inert;
        };
        let Some(challenge) = host.challenge_mut(active.target_id) else {
            warn!(target_id = active.target_id.0, "active_challenge_missing");
            self.release_active();
            return Keystroke::Inert;
        };

        let cursor_before = challenge.cursor();
        let keystroke = challenge.advance(ch, now_ms, events);
        if challenge.cursor() > cursor_before {
            events.emit(TypingEvent::CharacterCorrect {
                challenge_id: active.challenge_id,
                ch,
            });
        }
        if let Keystroke::Resolved(outcome) = &keystroke {
            self.on_challenge_resolved(outcome, now_ms, host, events);
        }
        keystroke
    }

    /// Removes the last buffered character. Challenge cursors never move back.
    pub fn backspace(&mut self) -> bool {
        match self.buffer.pop() {
            Some(_) => {
                self.buffer_len -= 1;
                true
            }
            None => false,
        }
    }

    pub fn enqueue(
        &mut self,
        target_id: TargetId,
        now_ms: u64,
        host: &mut dyn ChallengeHost,
        events: &mut TypingEventBus,
    ) -> Result<EnqueueOutcome, RouterError> {
        if !host.has_target(target_id) {
            return Err(self.reject(RouterError::UnknownTarget { target_id }));
        }
        let Some(challenge) = host.challenge(target_id) else {
            return Err(self.reject(RouterError::NoChallenge { target_id }));
        };
        if challenge.state() != ChallengeState::Prepared {
            return Err(self.reject(RouterError::NotPrepared {
                target_id,
                state: challenge.state(),
            }));
        }
        let is_active = self
            .active
            .is_some_and(|active| active.target_id == target_id);
        if is_active || self.pending.contains(&target_id) {
            return Err(self.reject(RouterError::AlreadyQueued { target_id }));
        }

        if self.pending.len() >= self.tuning.pending_queue_capacity {
            warn!(
                target_id = target_id.0,
                capacity = self.tuning.pending_queue_capacity,
                "enqueue_dropped_queue_full"
            );
            events.emit(TypingEvent::EnqueueDropped { target_id });
            return Ok(EnqueueOutcome::Dropped);
        }

        self.pending.push_back(target_id);
        if self.active.is_none() {
            self.advance_queue(now_ms, host, events);
        }
        match self.active {
            Some(active) if active.target_id == target_id => Ok(EnqueueOutcome::Activated),
            _ => Ok(EnqueueOutcome::Queued),
        }
    }

    /// Activates the next valid pending challenge when nothing is live.
    pub fn advance_queue(
        &mut self,
        now_ms: u64,
        host: &mut dyn ChallengeHost,
        events: &mut TypingEventBus,
    ) -> Option<TargetId> {
        if self.active.is_some() {
            return None;
        }
        while let Some(target_id) = self.pending.pop_front() {
            let Some(challenge) = host.challenge_mut(target_id) else {
                debug!(target_id = target_id.0, "pending_target_skipped_missing");
                continue;
            };
            if let Err(error) = challenge.activate(now_ms) {
                warn!(target_id = target_id.0, error = %error, "pending_target_skipped");
                continue;
            }
            let challenge_id = challenge.id();
            self.active = Some(ActiveChallenge {
                target_id,
                challenge_id,
            });
            self.clear_buffer();
            info!(
                target_id = target_id.0,
                challenge_id = challenge_id.0,
                pending = self.pending.len(),
                "challenge_routed"
            );
            events.emit(TypingEvent::ChallengeActivated {
                target_id,
                challenge_id,
            });
            return Some(target_id);
        }
        None
    }

    /// Polls the live challenge; a timeout resolves it and promotes the next.
    pub fn tick(
        &mut self,
        now_ms: u64,
        host: &mut dyn ChallengeHost,
        events: &mut TypingEventBus,
    ) -> Option<ChallengeOutcome> {
        let active = self.active?;
        let Some(challenge) = host.challenge_mut(active.target_id) else {
            warn!(target_id = active.target_id.0, "active_challenge_missing");
            self.release_active();
            self.advance_queue(now_ms, host, events);
            return None;
        };
        if challenge.id() != active.challenge_id || challenge.state() != ChallengeState::Running {
            debug!(target_id = active.target_id.0, "active_challenge_stale");
            self.release_active();
            self.advance_queue(now_ms, host, events);
            return None;
        }
        let outcome = challenge.tick(now_ms, events)?;
        self.on_challenge_resolved(&outcome, now_ms, host, events);
        Some(outcome)
    }

    pub fn on_challenge_resolved(
        &mut self,
        outcome: &ChallengeOutcome,
        now_ms: u64,
        host: &mut dyn ChallengeHost,
        events: &mut TypingEventBus,
    ) {
        match self.active {
            Some(active) if active.challenge_id == outcome.challenge_id() => {
                self.release_active();
                self.advance_queue(now_ms, host, events);
            }
            _ => debug!(
                challenge_id = outcome.challenge_id().0,
                "resolution_ignored_not_active"
            ),
        }
    }

    /// Fails the live challenge as cancelled without promoting the next one.
    pub fn cancel_active(
        &mut self,
        host: &mut dyn ChallengeHost,
        events: &mut TypingEventBus,
    ) -> Option<ChallengeOutcome> {
        let active = self.active.take()?;
        self.clear_buffer();
        host.challenge_mut(active.target_id)
            .filter(|challenge| challenge.id() == active.challenge_id)
            .and_then(|challenge| challenge.cancel(events))
    }

    /// Cancels the target's challenge wherever it sits. A live challenge is
    /// replaced by the next pending one; a pending one is removed from the queue.
    pub fn cancel_target(
        &mut self,
        target_id: TargetId,
        now_ms: u64,
        host: &mut dyn ChallengeHost,
        events: &mut TypingEventBus,
    ) -> bool {
        if self
            .active
            .is_some_and(|active| active.target_id == target_id)
        {
            self.cancel_active(host, events);
            self.advance_queue(now_ms, host, events);
            return true;
        }
        let Some(index) = self.pending.iter().position(|queued| *queued == target_id) else {
            return false;
        };
        self.pending.remove(index);
        if let Some(challenge) = host.challenge_mut(target_id) {
            challenge.cancel(events);
        }
        true
    }

    pub fn active(&self) -> Option<ActiveChallenge> {
        self.active
    }

    pub fn active_target(&self) -> Option<TargetId> {
        self.active.map(|active| active.target_id)
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn pending(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.pending.iter().copied()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn last_char(&self) -> Option<char> {
        self.last_char
    }

    pub fn tuning(&self) -> RouterTuning {
        self.tuning
    }

    fn release_active(&mut self) {
        self.active = None;
        self.clear_buffer();
    }

    fn clear_buffer(&mut self) {
        self.buffer.clear();
        self.buffer_len = 0;
    }

    fn reject(&self, error: RouterError) -> RouterError {
        warn!(error = %error, "enqueue_rejected");
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Vec2;
    use crate::config::TypingTuning;
    use crate::events::TypingEventKind;
    use crate::targets::{ChallengeContent, TargetWorld};

    fn world_with(texts: &[&str]) -> (TargetWorld, Vec<TargetId>) {
        let mut world = TargetWorld::new(TypingTuning::default());
        let ids = texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                world
                    .spawn_with_challenge(
                        Vec2::new(index as f32, 0.0),
                        format!("t{index}"),
                        ChallengeContent {
                            text: text.to_string(),
                            time_limit_seconds: 3.0,
                        },
                    )
                    .expect("spawn")
            })
            .collect();
        (world, ids)
    }

    fn router(capacity: usize) -> InputRouter {
        InputRouter::new(RouterTuning {
            pending_queue_capacity: capacity,
            ..RouterTuning::default()
        })
    }

    fn type_text(
        router: &mut InputRouter,
        text: &str,
        now_ms: u64,
        world: &mut TargetWorld,
        events: &mut TypingEventBus,
    ) {
        for ch in text.chars() {
            router.type_character(ch, now_ms, world, events);
        }
    }

    fn running_count(world: &TargetWorld) -> usize {
        world
            .targets()
            .iter()
            .filter(|target| {
                target
                    .challenge
                    .as_ref()
                    .is_some_and(|challenge| challenge.state() == ChallengeState::Running)
            })
            .count()
    }

    #[test]
    fn input_is_inert_without_active_challenge() {
        let (mut world, _) = world_with(&["cat"]);
        let mut events = TypingEventBus::default();
        let mut router = router(4);
        assert_eq!(
            router.type_character('c', 0, &mut world, &mut events),
            Keystroke::Inert
        );
        assert_eq!(router.buffer(), "c");
        assert_eq!(router.last_char(), Some('c'));
        assert_eq!(running_count(&world), 0);
    }

    #[test]
    fn enqueue_while_idle_activates_immediately() {
        let (mut world, ids) = world_with(&["cat", "dog"]);
        let mut events = TypingEventBus::default();
        let mut router = router(4);
        assert_eq!(
            router.enqueue(ids[0], 0, &mut world, &mut events),
            Ok(EnqueueOutcome::Activated)
        );
        assert_eq!(
            router.enqueue(ids[1], 0, &mut world, &mut events),
            Ok(EnqueueOutcome::Queued)
        );
        assert_eq!(router.active_target(), Some(ids[0]));
        assert_eq!(world.challenge_state(ids[1]), Some(ChallengeState::Prepared));
    }

    #[test]
    fn completion_promotes_next_in_fifo_order() {
        let (mut world, ids) = world_with(&["cat", "dog", "owl"]);
        let mut events = TypingEventBus::default();
        let mut router = router(4);
        for id in &ids {
            router.enqueue(*id, 0, &mut world, &mut events).expect("enqueue");
        }
        type_text(&mut router, "cat", 100, &mut world, &mut events);
        assert_eq!(world.challenge_state(ids[0]), Some(ChallengeState::Completed));
        assert_eq!(router.active_target(), Some(ids[1]));
        assert_eq!(router.buffer(), "");

        type_text(&mut router, "dog", 200, &mut world, &mut events);
        assert_eq!(router.active_target(), Some(ids[2]));
        type_text(&mut router, "owl", 300, &mut world, &mut events);
        assert!(router.is_idle());

        let activated: Vec<TargetId> = events
            .iter_emitted_so_far()
            .filter_map(|event| match event {
                TypingEvent::ChallengeActivated { target_id, .. } => Some(*target_id),
                _ => None,
            })
            .collect();
        assert_eq!(activated, ids);
    }

    #[test]
    fn queue_bound_drops_the_overflowing_request() {
        let capacity = 3;
        let texts = ["a", "b", "c", "d", "e"];
        let (mut world, ids) = world_with(&texts);
        let mut events = TypingEventBus::default();
        let mut router = router(capacity);

        assert_eq!(
            router.enqueue(ids[0], 0, &mut world, &mut events),
            Ok(EnqueueOutcome::Activated)
        );
        for id in &ids[1..=capacity] {
            assert_eq!(
                router.enqueue(*id, 0, &mut world, &mut events),
                Ok(EnqueueOutcome::Queued)
            );
        }
        assert_eq!(
            router.enqueue(ids[4], 0, &mut world, &mut events),
            Ok(EnqueueOutcome::Dropped)
        );
        assert_eq!(router.pending_len(), capacity);
        assert_eq!(router.pending().collect::<Vec<_>>(), ids[1..=capacity].to_vec());
        assert_eq!(world.challenge_state(ids[4]), Some(ChallengeState::Prepared));
        assert_eq!(
            events
                .iter_emitted_so_far()
                .filter(|event| event.kind() == TypingEventKind::EnqueueDropped)
                .count(),
            1
        );
    }

    #[test]
    fn enqueue_rejects_contract_violations() {
        let (mut world, ids) = world_with(&["cat"]);
        let bare = world.spawn(Vec2::default(), "bare");
        let mut events = TypingEventBus::default();
        let mut router = router(4);

        assert_eq!(
            router.enqueue(TargetId(999), 0, &mut world, &mut events),
            Err(RouterError::UnknownTarget {
                target_id: TargetId(999)
            })
        );
        assert_eq!(
            router.enqueue(bare, 0, &mut world, &mut events),
            Err(RouterError::NoChallenge { target_id: bare })
        );
        router.enqueue(ids[0], 0, &mut world, &mut events).expect("enqueue");
        assert_eq!(
            router.enqueue(ids[0], 0, &mut world, &mut events),
            Err(RouterError::NotPrepared {
                target_id: ids[0],
                state: ChallengeState::Running,
            })
        );
        assert!(router.active().is_some());
    }

    #[test]
    fn duplicate_pending_enqueue_is_rejected() {
        let (mut world, ids) = world_with(&["cat", "dog"]);
        let mut events = TypingEventBus::default();
        let mut router = router(4);
        router.enqueue(ids[0], 0, &mut world, &mut events).expect("enqueue");
        router.enqueue(ids[1], 0, &mut world, &mut events).expect("enqueue");
        assert_eq!(
            router.enqueue(ids[1], 0, &mut world, &mut events),
            Err(RouterError::AlreadyQueued { target_id: ids[1] })
        );
        assert_eq!(router.pending_len(), 1);
    }

    #[test]
    fn timeout_on_tick_promotes_next() {
        let (mut world, ids) = world_with(&["cat", "dog"]);
        let mut events = TypingEventBus::default();
        let mut router = router(4);
        router.enqueue(ids[0], 0, &mut world, &mut events).expect("enqueue");
        router.enqueue(ids[1], 0, &mut world, &mut events).expect("enqueue");

        assert_eq!(router.tick(2_999, &mut world, &mut events), None);
        let outcome = router.tick(3_000, &mut world, &mut events);
        assert!(matches!(outcome, Some(ChallengeOutcome::Failed { .. })));
        assert_eq!(router.active_target(), Some(ids[1]));
        assert_eq!(world.challenge(ids[1]).expect("challenge").deadline_ms(), 6_000);
    }

    #[test]
    fn cancel_active_does_not_advance_queue() {
        let (mut world, ids) = world_with(&["cat", "dog", "owl"]);
        let mut events = TypingEventBus::default();
        let mut router = router(4);
        router.enqueue(ids[0], 0, &mut world, &mut events).expect("enqueue");
        router.enqueue(ids[1], 0, &mut world, &mut events).expect("enqueue");
        router.type_character('c', 0, &mut world, &mut events);

        let outcome = router.cancel_active(&mut world, &mut events);
        assert!(matches!(
            outcome,
            Some(ChallengeOutcome::Failed {
                reason: crate::challenge::FailureReason::Cancelled,
                ..
            })
        ));
        assert!(router.is_idle());
        assert_eq!(router.buffer(), "");
        assert_eq!(router.pending_len(), 1);

        assert_eq!(
            router.enqueue(ids[2], 0, &mut world, &mut events),
            Ok(EnqueueOutcome::Queued)
        );
        assert_eq!(router.active_target(), Some(ids[1]));
    }

    #[test]
    fn cancel_target_handles_active_and_pending() {
        let (mut world, ids) = world_with(&["cat", "dog", "owl"]);
        let mut events = TypingEventBus::default();
        let mut router = router(4);
        for id in &ids {
            router.enqueue(*id, 0, &mut world, &mut events).expect("enqueue");
        }
        assert!(router.cancel_target(ids[1], 0, &mut world, &mut events));
        assert_eq!(world.challenge_state(ids[1]), Some(ChallengeState::Failed));
        assert_eq!(router.active_target(), Some(ids[0]));

        assert!(router.cancel_target(ids[0], 10, &mut world, &mut events));
        assert_eq!(world.challenge_state(ids[0]), Some(ChallengeState::Failed));
        assert_eq!(router.active_target(), Some(ids[2]));
        assert!(!router.cancel_target(ids[0], 10, &mut world, &mut events));
    }

    #[test]
    fn buffer_truncates_but_input_still_reaches_challenge() {
        let (mut world, ids) = world_with(&["cats"]);
        let mut events = TypingEventBus::default();
        let mut router = InputRouter::new(RouterTuning {
            buffer_capacity: 2,
            ..RouterTuning::default()
        });
        router.enqueue(ids[0], 0, &mut world, &mut events).expect("enqueue");
        type_text(&mut router, "cat", 0, &mut world, &mut events);
        assert_eq!(router.buffer(), "ca");
        assert_eq!(world.challenge(ids[0]).expect("challenge").cursor(), 3);
        assert_eq!(router.last_char(), Some('t'));
    }

    #[test]
    fn backspace_edits_buffer_only() {
        let (mut world, ids) = world_with(&["cat"]);
        let mut events = TypingEventBus::default();
        let mut router = router(4);
        router.enqueue(ids[0], 0, &mut world, &mut events).expect("enqueue");
        type_text(&mut router, "cx", 0, &mut world, &mut events);
        assert!(router.backspace());
        assert_eq!(router.buffer(), "c");
        assert_eq!(world.challenge(ids[0]).expect("challenge").cursor(), 1);
        assert!(router.backspace());
        assert!(!router.backspace());
    }

    #[test]
    fn correct_keystrokes_are_announced() {
        let (mut world, ids) = world_with(&["ab"]);
        let mut events = TypingEventBus::default();
        let mut router = router(4);
        router.enqueue(ids[0], 0, &mut world, &mut events).expect("enqueue");
        type_text(&mut router, "axb", 0, &mut world, &mut events);
        let correct: Vec<char> = events
            .iter_emitted_so_far()
            .filter_map(|event| match event {
                TypingEvent::CharacterCorrect { ch, .. } => Some(*ch),
                _ => None,
            })
            .collect();
        assert_eq!(correct, vec!['a', 'b']);
    }

    #[test]
    fn at_most_one_challenge_runs_under_random_operations() {
        let texts = ["ab", "ba", "aab", "b", "abba", "a", "bb", "aba"];
        let (mut world, ids) = world_with(&texts);
        let mut events = TypingEventBus::default();
        let mut router = router(3);
        let mut seed = 0x2545_f491_4f6c_dd1d_u64;
        let mut now_ms = 0;

        for _ in 0..5_000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let target = ids[(seed % ids.len() as u64) as usize];
            match (seed >> 8) % 6 {
                0 | 1 => {
                    let _ = router.enqueue(target, now_ms, &mut world, &mut events);
                }
                2 => {
                    let ch = if seed & 1 == 0 { 'a' } else { 'b' };
                    router.type_character(ch, now_ms, &mut world, &mut events);
                }
                3 => {
                    now_ms += (seed >> 16) % 700;
                    router.tick(now_ms, &mut world, &mut events);
                }
                4 => {
                    router.cancel_target(target, now_ms, &mut world, &mut events);
                }
                _ => {
                    let mut content = |_id: TargetId| {
                        Some(ChallengeContent {
                            text: "ab".to_string(),
                            time_limit_seconds: 1.0,
                        })
                    };
                    world.rearm_failed(&mut content);
                    if (seed >> 20) % 4 == 0 {
                        router.cancel_active(&mut world, &mut events);
                    }
                }
            }

            let running = running_count(&world);
            assert!(running <= 1, "{running} challenges running");
            if running == 1 {
                let active = router.active_target().expect("running challenge is active");
                assert_eq!(world.challenge_state(active), Some(ChallengeState::Running));
            }
            assert!(router.pending_len() <= 3);
            events.finish_tick_rollover();
        }
    }
}
