/// Positional accuracy of `typed` against `expected`.
///
/// Characters are compared index by index over the shorter of the two
/// strings and the match count is divided by the expected length. Missing or
/// trailing extra characters simply do not count as matches; there is no
/// edit-distance alignment.
pub fn accuracy(expected: &str, typed: &str) -> f64 {
    let total = expected.chars().count();
    if total == 0 {
        return if typed.is_empty() { 1.0 } else { 0.0 };
    }

    let correct = expected
        .chars()
        .zip(typed.chars())
        .filter(|(want, got)| want == got)
        .count();

    (correct as f64 / total as f64).clamp(0.0, 1.0)
}

/// Share of keystrokes that matched the expected character.
pub fn keystroke_accuracy(correct: u32, mistyped: u32) -> f64 {
    let total = correct.saturating_add(mistyped);
    if total == 0 {
        return 1.0;
    }
    correct as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_expected_is_perfect_only_for_empty_input() {
        assert_eq!(accuracy("", ""), 1.0);
        assert_eq!(accuracy("", "a"), 0.0);
    }

    #[test]
    fn exact_match_is_one() {
        for text in ["c", "cat", "hello world", "ünïcødé"] {
            assert_eq!(accuracy(text, text), 1.0, "text {text}");
        }
    }

    #[test]
    fn compares_positions_without_alignment() {
        assert!((accuracy("cat", "cxt") - 2.0 / 3.0).abs() < 1e-9);
        // A single inserted character shifts every following position.
        assert!((accuracy("cat", "xcat") - 0.0).abs() < 1e-9);
    }

    #[test]
    fn missing_and_extra_characters_do_not_count() {
        assert!((accuracy("cats", "ca") - 0.5).abs() < 1e-9);
        assert_eq!(accuracy("cat", "catalog"), 1.0);
    }

    #[test]
    fn more_mismatches_never_raise_accuracy() {
        let expected = "focusing";
        let mut typed: Vec<char> = expected.chars().collect();
        let mut previous = accuracy(expected, expected);
        for index in 0..typed.len() {
            typed[index] = '#';
            let current = accuracy(expected, &typed.iter().collect::<String>());
            assert!(current <= previous, "index {index}: {current} > {previous}");
            previous = current;
        }
        assert_eq!(previous, 0.0);
    }

    #[test]
    fn keystroke_accuracy_handles_no_input() {
        assert_eq!(keystroke_accuracy(0, 0), 1.0);
        assert!((keystroke_accuracy(3, 1) - 0.75).abs() < 1e-9);
    }
}
