use std::fmt::Debug;

/// Extends a challenge deadline after a correct keystroke.
pub trait TimeBonusPolicy: Debug {
    /// Returns the new absolute deadline in milliseconds.
    fn apply_bonus(
        &self,
        deadline_ms: u64,
        now_ms: u64,
        bonus_seconds: f64,
        max_remaining_seconds: f64,
    ) -> u64;
}

/// Adds a fixed bonus to the remaining time, capped at a maximum.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTimeBonusPolicy;

impl TimeBonusPolicy for DefaultTimeBonusPolicy {
    fn apply_bonus(
        &self,
        deadline_ms: u64,
        now_ms: u64,
        bonus_seconds: f64,
        max_remaining_seconds: f64,
    ) -> u64 {
        let remaining_ms = deadline_ms.saturating_sub(now_ms);
        let new_remaining_ms = remaining_ms
            .saturating_add(seconds_to_ms(bonus_seconds))
            .min(seconds_to_ms(max_remaining_seconds));
        now_ms.saturating_add(new_remaining_ms)
    }
}

/// Converts seconds to whole milliseconds; negative and NaN inputs become zero.
pub fn seconds_to_ms(seconds: f64) -> u64 {
    // `as` saturates: NaN and negatives map to 0, overflow to u64::MAX.
    (seconds * 1000.0) as u64
}
