mod accuracy;
mod time_bonus;
mod wpm;

pub use accuracy::{accuracy, keystroke_accuracy};
pub use time_bonus::{seconds_to_ms, DefaultTimeBonusPolicy, TimeBonusPolicy};
pub use wpm::{wpm, CHARS_PER_WORD};
