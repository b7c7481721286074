/// Average word length used to turn characters into words.
pub const CHARS_PER_WORD: f64 = 5.0;

const MIN_ELAPSED_MINUTES: f64 = 1e-6;
const MS_PER_MINUTE: f64 = 60_000.0;

/// Words per minute from the number of correctly typed characters.
pub fn wpm(correct_chars: u32, start_ms: u64, now_ms: u64) -> f64 {
    let elapsed_minutes =
        (now_ms.saturating_sub(start_ms) as f64 / MS_PER_MINUTE).max(MIN_ELAPSED_MINUTES);
    (correct_chars as f64 / CHARS_PER_WORD) / elapsed_minutes
}
