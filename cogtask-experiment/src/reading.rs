//! Moving-window (self-paced) reading: words of a sentence are revealed one
//! key press at a time while the rest of the sentence stays masked.

use crate::config::ReadingConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskKind {
    /// Only the current word is visible.
    #[default]
    Single,
    /// Every word up to and including the current one is visible.
    Cumulative,
    /// The current word alone, centred, without a mask line.
    Centre,
}

/// Replaces every non-whitespace character with `mask`.
pub fn mask_text(text: &str, mask: char) -> String {
    text.chars()
        .map(|c| if c.is_whitespace() { c } else { mask })
        .collect()
}

/// One wrapped line of the display: the visible text and the mask drawn
/// under it. Both strings have the same character length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingLine {
    pub text: String,
    pub mask: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingFrame {
    pub lines: Vec<ReadingLine>,
    pub centred: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingResult {
    pub block: u32,
    pub trial: u32,
    pub sentence: String,
    /// 1-based position of the word in the sentence.
    pub word_number: usize,
    pub word: String,
    pub rt_ms: f64,
}

/// Word read and how long it stayed on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct WordRead {
    pub word_number: usize,
    pub word: String,
    pub rt_ms: f64,
}

#[derive(Debug, Clone)]
pub struct MovingWindow {
    sentence: String,
    words: Vec<String>,
    /// `None` while only the masked outline is shown.
    position: Option<usize>,
    shown_ns: u64,
    kind: MaskKind,
    mask_char: char,
    mask_on_word: bool,
    line_width: usize,
    finished: bool,
}

impl MovingWindow {
    pub fn new(sentence: &str, config: &ReadingConfig, now_ns: u64) -> Self {
        let words: Vec<String> = sentence.split_whitespace().map(str::to_string).collect();
        let position = match config.mask {
            MaskKind::Centre if !words.is_empty() => Some(0),
            _ => None,
        };
        Self {
            sentence: sentence.to_string(),
            finished: words.is_empty(),
            words,
            position,
            shown_ns: now_ns,
            kind: config.mask,
            mask_char: config.mask_char,
            mask_on_word: config.mask_on_word,
            line_width: config.line_width.max(1),
        }
    }

    pub fn sentence(&self) -> &str {
        &self.sentence
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Moves to the next word. Returns the word that was on screen, if any,
    /// with its reading time.
    pub fn advance(&mut self, now_ns: u64) -> Option<WordRead> {
        if self.finished {
            return None;
        }
        let read = self.position.map(|i| WordRead {
            word_number: i + 1,
            word: self.words[i].clone(),
            rt_ms: now_ns.saturating_sub(self.shown_ns) as f64 / 1e6,
        });
        let next = self.position.map_or(0, |i| i + 1);
        if next >= self.words.len() {
            self.finished = true;
        } else {
            self.position = Some(next);
        }
        self.shown_ns = now_ns;
        read
    }

    fn visible(&self, idx: usize) -> bool {
        match (self.kind, self.position) {
            (_, None) => false,
            (MaskKind::Cumulative, Some(p)) => idx <= p,
            (_, Some(p)) => idx == p,
        }
    }

    pub fn frame(&self) -> ReadingFrame {
        if self.kind == MaskKind::Centre {
            let text = self
                .position
                .filter(|_| !self.finished)
                .map(|p| self.words[p].clone())
                .unwrap_or_default();
            return ReadingFrame {
                lines: vec![ReadingLine {
                    mask: " ".repeat(text.chars().count()),
                    text,
                }],
                centred: true,
            };
        }

        let mut lines = Vec::new();
        let mut text = String::new();
        let mut mask = String::new();
        for (idx, word) in self.words.iter().enumerate() {
            let len = word.chars().count();
            let current = text.chars().count();
            if current > 0 && current + 1 + len > self.line_width {
                lines.push(ReadingLine {
                    text: std::mem::take(&mut text),
                    mask: std::mem::take(&mut mask),
                });
            }
            if !text.is_empty() {
                text.push(' ');
                mask.push(' ');
            }
            let visible = self.visible(idx);
            if visible {
                text.push_str(word);
            } else {
                text.push_str(&mask_text(word, ' '));
            }
            if visible && !self.mask_on_word {
                mask.push_str(&mask_text(word, ' '));
            } else {
                mask.push_str(&mask_text(word, self.mask_char));
            }
        }
        if !text.is_empty() {
            lines.push(ReadingLine { text, mask });
        }
        ReadingFrame {
            lines,
            centred: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: MaskKind) -> ReadingConfig {
        ReadingConfig {
            mask: kind,
            mask_on_word: false,
            ..ReadingConfig::default()
        }
    }

    #[test]
    fn mask_keeps_whitespace() {
        assert_eq!(mask_text("The cat, sat", '_'), "___ ____ ___");
    }

    #[test]
    fn single_mask_reveals_one_word_at_a_time() {
        let mut w = MovingWindow::new("The cat sat", &config(MaskKind::Single), 0);
        let outline = w.frame();
        assert_eq!(outline.lines[0].text, "           ");
        assert_eq!(outline.lines[0].mask, "___ ___ ___");

        assert_eq!(w.advance(500_000_000), None);
        let f = w.frame();
        assert_eq!(f.lines[0].text, "The        ");
        assert_eq!(f.lines[0].mask, "    ___ ___");

        let read = w.advance(800_000_000).unwrap();
        assert_eq!(read.word, "The");
        assert_eq!(read.word_number, 1);
        assert!((read.rt_ms - 300.0).abs() < 1e-9);
        assert_eq!(w.frame().lines[0].text, "    cat    ");
    }

    #[test]
    fn cumulative_mask_keeps_read_words() {
        let mut w = MovingWindow::new("The cat sat", &config(MaskKind::Cumulative), 0);
        w.advance(1);
        w.advance(2);
        assert_eq!(w.frame().lines[0].text, "The cat    ");
    }

    #[test]
    fn finishes_after_last_word() {
        let mut w = MovingWindow::new("Go home", &config(MaskKind::Single), 0);
        w.advance(10);
        w.advance(20);
        assert!(!w.is_finished());
        let last = w.advance(30).unwrap();
        assert_eq!(last.word, "home");
        assert!(w.is_finished());
        assert_eq!(w.advance(40), None);
    }

    #[test]
    fn centre_mode_starts_on_first_word() {
        let mut w = MovingWindow::new("Go home", &config(MaskKind::Centre), 0);
        let f = w.frame();
        assert!(f.centred);
        assert_eq!(f.lines[0].text, "Go");
        assert_eq!(w.advance(250_000_000).unwrap().word, "Go");
        assert_eq!(w.frame().lines[0].text, "home");
    }

    #[test]
    fn wraps_at_line_width() {
        let cfg = ReadingConfig {
            line_width: 8,
            ..config(MaskKind::Single)
        };
        let w = MovingWindow::new("aaa bbb ccc dd", &cfg, 0);
        let f = w.frame();
        assert_eq!(f.lines.len(), 2);
        assert_eq!(f.lines[0].mask, "___ ___");
        assert_eq!(f.lines[1].mask, "___ __");
    }

    #[test]
    fn mask_on_word_keeps_mask_under_visible_word() {
        let cfg = ReadingConfig {
            mask_on_word: true,
            ..config(MaskKind::Single)
        };
        let mut w = MovingWindow::new("ab cd", &cfg, 0);
        w.advance(1);
        assert_eq!(w.frame().lines[0].mask, "__ __");
    }
}
