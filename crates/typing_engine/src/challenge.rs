use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::TypingTuning;
use crate::events::{TypingEvent, TypingEventBus};
use crate::scoring::{
    accuracy, keystroke_accuracy, seconds_to_ms, wpm, DefaultTimeBonusPolicy, TimeBonusPolicy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChallengeId(pub u64);

impl fmt::Display for ChallengeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct ChallengeIdAllocator {
    next: u64,
}

impl ChallengeIdAllocator {
    pub fn allocate(&mut self) -> ChallengeId {
        let id = ChallengeId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    Prepared,
    Running,
    Completed,
    Failed,
}

impl ChallengeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    Cancelled,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub challenge_id: ChallengeId,
    pub text: String,
    pub accuracy: f64,
    pub wpm: f64,
    pub time_left_seconds: f64,
    pub has_half_time_left: bool,
    pub mistypes: u32,
    /// Correct keystrokes over all keystrokes, mistypes included.
    pub keystroke_accuracy: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChallengeOutcome {
    Completed(CompletionReport),
    Failed {
        challenge_id: ChallengeId,
        reason: FailureReason,
    },
}

impl ChallengeOutcome {
    pub fn challenge_id(&self) -> ChallengeId {
        match self {
            Self::Completed(report) => report.challenge_id,
            Self::Failed { challenge_id, .. } => *challenge_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Result of feeding one character to a challenge.
#[derive(Debug, Clone, PartialEq)]
pub enum Keystroke {
    /// The challenge was not running; nothing changed.
    Inert,
    Correct,
    Mistyped,
    Resolved(ChallengeOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySegments {
    pub matched: String,
    /// Most recent mistype, shown in place of the next expected character.
    pub invalid: Option<char>,
    pub remaining: String,
}

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("challenge {challenge_id} has empty expected text")]
    EmptyText { challenge_id: ChallengeId },
    #[error("challenge {challenge_id} has invalid time limit {seconds}s (must be finite and > 0)")]
    InvalidTimeLimit {
        challenge_id: ChallengeId,
        seconds: f64,
    },
    #[error("challenge {challenge_id} cannot be activated from state {state:?}")]
    NotPrepared {
        challenge_id: ChallengeId,
        state: ChallengeState,
    },
    #[error("challenge {challenge_id} cannot be re-prepared from state {state:?}")]
    NotTerminal {
        challenge_id: ChallengeId,
        state: ChallengeState,
    },
    #[error("challenge id {challenge_id} was already used by this challenge")]
    ReusedId { challenge_id: ChallengeId },
}

/// A timed text-matching challenge bound to one target.
#[derive(Debug)]
pub struct Challenge {
    id: ChallengeId,
    text: String,
    chars: Vec<char>,
    time_limit_seconds: f64,
    cursor: usize,
    start_ms: u64,
    deadline_ms: u64,
    correct_count: u32,
    mistypes: u32,
    last_invalid: Option<(char, u64)>,
    last_progress_emit_ms: u64,
    wpm: f64,
    state: ChallengeState,
    tuning: TypingTuning,
    bonus_policy: Box<dyn TimeBonusPolicy>,
}

impl Challenge {
    pub fn prepare(
        id: ChallengeId,
        text: impl Into<String>,
        time_limit_seconds: f64,
        tuning: TypingTuning,
    ) -> Result<Self, ChallengeError> {
        let text = text.into();
        validate_content(id, &text, time_limit_seconds)?;
        Ok(Self {
            id,
            chars: text.chars().collect(),
            text,
            time_limit_seconds,
            cursor: 0,
            start_ms: 0,
            deadline_ms: 0,
            correct_count: 0,
            mistypes: 0,
            last_invalid: None,
            last_progress_emit_ms: 0,
            wpm: 0.0,
            state: ChallengeState::Prepared,
            tuning,
            bonus_policy: Box::new(DefaultTimeBonusPolicy),
        })
    }

    pub fn with_bonus_policy(mut self, policy: Box<dyn TimeBonusPolicy>) -> Self {
        self.bonus_policy = policy;
        self
    }

    /// Reuses a finished challenge for new content under a fresh id.
    pub fn re_prepare(
        &mut self,
        id: ChallengeId,
        text: impl Into<String>,
        time_limit_seconds: f64,
    ) -> Result<(), ChallengeError> {
        if !self.state.is_terminal() {
            return Err(ChallengeError::NotTerminal {
                challenge_id: self.id,
                state: self.state,
            });
        }
        if id == self.id {
            return Err(ChallengeError::ReusedId { challenge_id: id });
        }
        let text = text.into();
        validate_content(id, &text, time_limit_seconds)?;

        self.id = id;
        self.chars = text.chars().collect();
        self.text = text;
        self.time_limit_seconds = time_limit_seconds;
        self.cursor = 0;
        self.start_ms = 0;
        self.deadline_ms = 0;
        self.correct_count = 0;
        self.mistypes = 0;
        self.last_invalid = None;
        self.last_progress_emit_ms = 0;
        self.wpm = 0.0;
        self.state = ChallengeState::Prepared;
        Ok(())
    }

    pub fn activate(&mut self, now_ms: u64) -> Result<(), ChallengeError> {
        if self.state != ChallengeState::Prepared {
            return Err(ChallengeError::NotPrepared {
                challenge_id: self.id,
                state: self.state,
            });
        }
        self.start_ms = now_ms;
        self.deadline_ms = now_ms.saturating_add(seconds_to_ms(self.time_limit_seconds));
        self.last_progress_emit_ms = now_ms;
        self.cursor = 0;
        self.state = ChallengeState::Running;
        info!(
            challenge_id = self.id.0,
            text = %self.text,
            time_limit_seconds = self.time_limit_seconds,
            "challenge_activated"
        );
        Ok(())
    }

    pub fn advance(&mut self, ch: char, now_ms: u64, events: &mut TypingEventBus) -> Keystroke {
        if self.state != ChallengeState::Running {
            return Keystroke::Inert;
        }
        if now_ms >= self.deadline_ms {
            return Keystroke::Resolved(self.fail(FailureReason::Timeout, events));
        }

        let expected = self.chars.get(self.cursor).copied();
        if expected != Some(ch) {
            self.mistypes = self.mistypes.saturating_add(1);
            self.last_invalid = Some((ch, now_ms));
            debug!(
                challenge_id = self.id.0,
                typed = %ch,
                expected = ?expected,
                "challenge_mistyped"
            );
            events.emit(TypingEvent::Mistyped {
                challenge_id: self.id,
                typed: ch,
                expected,
            });
            return Keystroke::Mistyped;
        }

        self.cursor += 1;
        self.correct_count = self.correct_count.saturating_add(1);
        self.deadline_ms = self.bonus_policy.apply_bonus(
            self.deadline_ms,
            now_ms,
            self.tuning.letter_time_bonus_seconds,
            self.tuning.max_remaining_seconds,
        );
        self.wpm = wpm(self.correct_count, self.start_ms, now_ms);
        events.emit(TypingEvent::WpmUpdated {
            challenge_id: self.id,
            wpm: self.wpm,
        });
        self.emit_progress(now_ms, events);

        if self.cursor == self.chars.len() {
            return Keystroke::Resolved(self.complete(now_ms, events));
        }
        Keystroke::Correct
    }

    /// Per-tick poll: timeout first, otherwise periodic progress.
    pub fn tick(&mut self, now_ms: u64, events: &mut TypingEventBus) -> Option<ChallengeOutcome> {
        if self.state != ChallengeState::Running {
            return None;
        }
        if now_ms >= self.deadline_ms {
            return Some(self.fail(FailureReason::Timeout, events));
        }
        if now_ms.saturating_sub(self.last_progress_emit_ms) >= self.tuning.progress_emit_interval_ms
        {
            self.emit_progress(now_ms, events);
        }
        None
    }

    /// Forces a live or queued challenge to `Failed`. No-op once terminal.
    pub fn cancel(&mut self, events: &mut TypingEventBus) -> Option<ChallengeOutcome> {
        if self.state.is_terminal() {
            return None;
        }
        Some(self.fail(FailureReason::Cancelled, events))
    }

    pub fn remaining_seconds(&self, now_ms: u64) -> f64 {
        match self.state {
            ChallengeState::Prepared => self.time_limit_seconds,
            _ => self.deadline_ms.saturating_sub(now_ms) as f64 / 1000.0,
        }
    }

    pub fn display_segments(&self, now_ms: u64) -> DisplaySegments {
        let matched: String = self.chars[..self.cursor].iter().collect();
        let invalid = self.last_invalid.and_then(|(ch, at_ms)| {
            let flashing = self.state == ChallengeState::Running
                && now_ms.saturating_sub(at_ms) <= self.tuning.invalid_display_ms;
            flashing.then_some(ch)
        });
        let skip = if invalid.is_some() { 1 } else { 0 };
        let remaining: String = self.chars[self.cursor..].iter().skip(skip).collect();
        DisplaySegments {
            matched,
            invalid,
            remaining,
        }
    }

    pub fn id(&self) -> ChallengeId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn matched(&self) -> String {
        self.chars[..self.cursor].iter().collect()
    }

    pub fn state(&self) -> ChallengeState {
        self.state
    }

    pub fn time_limit_seconds(&self) -> f64 {
        self.time_limit_seconds
    }

    pub fn max_remaining_seconds(&self) -> f64 {
        self.tuning.max_remaining_seconds
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn deadline_ms(&self) -> u64 {
        self.deadline_ms
    }

    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    pub fn mistypes(&self) -> u32 {
        self.mistypes
    }

    pub fn last_invalid(&self) -> Option<(char, u64)> {
        self.last_invalid
    }

    pub fn wpm(&self) -> f64 {
        self.wpm
    }

    fn emit_progress(&mut self, now_ms: u64, events: &mut TypingEventBus) {
        self.last_progress_emit_ms = now_ms;
        events.emit(TypingEvent::ChallengeProgress {
            challenge_id: self.id,
            matched: self.matched(),
            remaining_seconds: self.remaining_seconds(now_ms),
        });
    }

    fn complete(&mut self, now_ms: u64, events: &mut TypingEventBus) -> ChallengeOutcome {
        let time_left_seconds = self.remaining_seconds(now_ms);
        self.wpm = wpm(self.correct_count, self.start_ms, now_ms);
        self.state = ChallengeState::Completed;
        let report = CompletionReport {
            challenge_id: self.id,
            text: self.text.clone(),
            accuracy: accuracy(&self.text, &self.matched()),
            wpm: self.wpm,
            time_left_seconds,
            has_half_time_left: time_left_seconds >= 0.5 * self.tuning.max_remaining_seconds,
            mistypes: self.mistypes,
            keystroke_accuracy: keystroke_accuracy(self.correct_count, self.mistypes),
        };
        info!(
            challenge_id = self.id.0,
            wpm = report.wpm,
            time_left_seconds = report.time_left_seconds,
            mistypes = report.mistypes,
            "challenge_completed"
        );
        events.emit(TypingEvent::ChallengeCompleted(report.clone()));
        ChallengeOutcome::Completed(report)
    }

    fn fail(&mut self, reason: FailureReason, events: &mut TypingEventBus) -> ChallengeOutcome {
        self.state = ChallengeState::Failed;
        info!(
            challenge_id = self.id.0,
            reason = reason.as_str(),
            cursor = self.cursor,
            "challenge_failed"
        );
        events.emit(TypingEvent::ChallengeFailed {
            challenge_id: self.id,
            reason,
        });
        ChallengeOutcome::Failed {
            challenge_id: self.id,
            reason,
        }
    }
}

fn validate_content(
    id: ChallengeId,
    text: &str,
    time_limit_seconds: f64,
) -> Result<(), ChallengeError> {
    if text.is_empty() {
        return Err(ChallengeError::EmptyText { challenge_id: id });
    }
    if !time_limit_seconds.is_finite() || time_limit_seconds <= 0.0 {
        return Err(ChallengeError::InvalidTimeLimit {
            challenge_id: id,
            seconds: time_limit_seconds,
        });
    }
    Ok(())
}
