use crate::challenge::{ChallengeId, CompletionReport, FailureReason};
use crate::targets::TargetId;

/// Notifications produced during a tick, consumed by the focus controller and
/// the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum TypingEvent {
    CharacterTyped {
        ch: char,
    },
    CharacterCorrect {
        challenge_id: ChallengeId,
        ch: char,
    },
    ChallengeActivated {
        target_id: TargetId,
        challenge_id: ChallengeId,
    },
    ChallengeProgress {
        challenge_id: ChallengeId,
        matched: String,
        remaining_seconds: f64,
    },
    WpmUpdated {
        challenge_id: ChallengeId,
        wpm: f64,
    },
    Mistyped {
        challenge_id: ChallengeId,
        typed: char,
        /// `None` when nothing is left to type at the cursor.
        expected: Option<char>,
    },
    ChallengeCompleted(CompletionReport),
    ChallengeFailed {
        challenge_id: ChallengeId,
        reason: FailureReason,
    },
    EnqueueDropped {
        target_id: TargetId,
    },
    TargetEnteredRegion {
        target_id: TargetId,
    },
    TargetExitedRegion {
        target_id: TargetId,
    },
    ActivationReady {
        has_targets: bool,
    },
    FocusNotReady,
    FocusSessionStarted {
        target_count: usize,
    },
    FocusSessionEnded {
        success: bool,
    },
    TargetResolved {
        target_id: TargetId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingEventKind {
    CharacterTyped,
    CharacterCorrect,
    ChallengeActivated,
    ChallengeProgress,
    WpmUpdated,
    Mistyped,
    ChallengeCompleted,
    ChallengeFailed,
    EnqueueDropped,
    TargetEnteredRegion,
    TargetExitedRegion,
    ActivationReady,
    FocusNotReady,
    FocusSessionStarted,
    FocusSessionEnded,
    TargetResolved,
}

impl TypingEvent {
    pub fn kind(&self) -> TypingEventKind {
        match self {
            Self::CharacterTyped { .. } => TypingEventKind::CharacterTyped,
            Self::CharacterCorrect { .. } => TypingEventKind::CharacterCorrect,
            Self::ChallengeActivated { .. } => TypingEventKind::ChallengeActivated,
            Self::ChallengeProgress { .. } => TypingEventKind::ChallengeProgress,
            Self::WpmUpdated { .. } => TypingEventKind::WpmUpdated,
            Self::Mistyped { .. } => TypingEventKind::Mistyped,
            Self::ChallengeCompleted(_) => TypingEventKind::ChallengeCompleted,
            Self::ChallengeFailed { .. } => TypingEventKind::ChallengeFailed,
            Self::EnqueueDropped { .. } => TypingEventKind::EnqueueDropped,
            Self::TargetEnteredRegion { .. } => TypingEventKind::TargetEnteredRegion,
            Self::TargetExitedRegion { .. } => TypingEventKind::TargetExitedRegion,
            Self::ActivationReady { .. } => TypingEventKind::ActivationReady,
            Self::FocusNotReady => TypingEventKind::FocusNotReady,
            Self::FocusSessionStarted { .. } => TypingEventKind::FocusSessionStarted,
            Self::FocusSessionEnded { .. } => TypingEventKind::FocusSessionEnded,
            Self::TargetResolved { .. } => TypingEventKind::TargetResolved,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypingEventCounts {
    pub total: u32,
    pub characters_typed: u32,
    pub characters_correct: u32,
    pub challenges_activated: u32,
    pub progress: u32,
    pub wpm_updates: u32,
    pub mistypes: u32,
    pub challenges_completed: u32,
    pub challenges_failed: u32,
    pub enqueue_drops: u32,
    pub region_entries: u32,
    pub region_exits: u32,
    pub readiness_changes: u32,
    pub focus_not_ready: u32,
    pub sessions_started: u32,
    pub sessions_ended: u32,
    pub targets_resolved: u32,
}

impl TypingEventCounts {
    pub fn record(&mut self, kind: TypingEventKind) {
        self.total = self.total.saturating_add(1);
        let slot = match kind {
            TypingEventKind::CharacterTyped => &mut self.characters_typed,
            TypingEventKind::CharacterCorrect => &mut self.characters_correct,
            TypingEventKind::ChallengeActivated => &mut self.challenges_activated,
            TypingEventKind::ChallengeProgress => &mut self.progress,
            TypingEventKind::WpmUpdated => &mut self.wpm_updates,
            TypingEventKind::Mistyped => &mut self.mistypes,
            TypingEventKind::ChallengeCompleted => &mut self.challenges_completed,
            TypingEventKind::ChallengeFailed => &mut self.challenges_failed,
            TypingEventKind::EnqueueDropped => &mut self.enqueue_drops,
            TypingEventKind::TargetEnteredRegion => &mut self.region_entries,
            TypingEventKind::TargetExitedRegion => &mut self.region_exits,
            TypingEventKind::ActivationReady => &mut self.readiness_changes,
            TypingEventKind::FocusNotReady => &mut self.focus_not_ready,
            TypingEventKind::FocusSessionStarted => &mut self.sessions_started,
            TypingEventKind::FocusSessionEnded => &mut self.sessions_ended,
            TypingEventKind::TargetResolved => &mut self.targets_resolved,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn accumulate(&mut self, other: &TypingEventCounts) {
        self.total = self.total.saturating_add(other.total);
        self.characters_typed = self.characters_typed.saturating_add(other.characters_typed);
        self.characters_correct = self
            .characters_correct
            .saturating_add(other.characters_correct);
        self.challenges_activated = self
            .challenges_activated
            .saturating_add(other.challenges_activated);
        self.progress = self.progress.saturating_add(other.progress);
        self.wpm_updates = self.wpm_updates.saturating_add(other.wpm_updates);
        self.mistypes = self.mistypes.saturating_add(other.mistypes);
        self.challenges_completed = self
            .challenges_completed
            .saturating_add(other.challenges_completed);
        self.challenges_failed = self.challenges_failed.saturating_add(other.challenges_failed);
        self.enqueue_drops = self.enqueue_drops.saturating_add(other.enqueue_drops);
        self.region_entries = self.region_entries.saturating_add(other.region_entries);
        self.region_exits = self.region_exits.saturating_add(other.region_exits);
        self.readiness_changes = self.readiness_changes.saturating_add(other.readiness_changes);
        self.focus_not_ready = self.focus_not_ready.saturating_add(other.focus_not_ready);
        self.sessions_started = self.sessions_started.saturating_add(other.sessions_started);
        self.sessions_ended = self.sessions_ended.saturating_add(other.sessions_ended);
        self.targets_resolved = self.targets_resolved.saturating_add(other.targets_resolved);
    }
}

/// Per-tick event log. Events stay readable until the next rollover, which
/// folds them into `last_tick_counts`.
#[derive(Debug, Default)]
pub struct TypingEventBus {
    current_tick_events: Vec<TypingEvent>,
    last_tick_counts: TypingEventCounts,
}

impl TypingEventBus {
    pub fn emit(&mut self, event: TypingEvent) {
        self.current_tick_events.push(event);
    }

    pub fn len(&self) -> usize {
        self.current_tick_events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current_tick_events.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TypingEvent> {
        self.current_tick_events.get(index)
    }

    pub fn iter_emitted_so_far(&self) -> impl Iterator<Item = &TypingEvent> {
        self.current_tick_events.iter()
    }

    pub fn finish_tick_rollover(&mut self) {
        let mut counts = TypingEventCounts::default();
        for event in &self.current_tick_events {
            counts.record(event.kind());
        }
        self.last_tick_counts = counts;
        self.current_tick_events.clear();
    }

    pub fn last_tick_counts(&self) -> TypingEventCounts {
        self.last_tick_counts
    }
}
