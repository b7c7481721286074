const WRONG_CHAR: char = '#';

/// Scripted keyboard: types the remaining text of the live challenge at a
/// steady rate, slipping in a wrong key every `mistype_every` keystrokes.
#[derive(Debug, Clone)]
pub struct ScriptedTypist {
    chars_per_second: f64,
    mistype_every: Option<u32>,
    carry: f64,
    keystrokes: u32,
}

impl ScriptedTypist {
    pub fn new(chars_per_second: f64, mistype_every: Option<u32>) -> Self {
        Self {
            chars_per_second: chars_per_second.max(0.0),
            mistype_every: mistype_every.filter(|every| *every > 0),
            carry: 0.0,
            keystrokes: 0,
        }
    }

    /// Keys pressed over `dt_seconds` of real time against `remaining`.
    pub fn keystrokes(&mut self, dt_seconds: f64, remaining: &[char]) -> Vec<char> {
        if remaining.is_empty() {
            self.carry = 0.0;
            return Vec::new();
        }
        self.carry += dt_seconds * self.chars_per_second;
        let mut typed = Vec::new();
        let mut cursor = 0;
        while self.carry >= 1.0 && cursor < remaining.len() {
            self.carry -= 1.0;
            self.keystrokes = self.keystrokes.saturating_add(1);
            let slip = self
                .mistype_every
                .is_some_and(|every| self.keystrokes % every == 0);
            if slip && remaining[cursor] != WRONG_CHAR {
                typed.push(WRONG_CHAR);
            } else {
                typed.push(remaining[cursor]);
                cursor += 1;
            }
        }
        typed
    }
}
