use serde::{Deserialize, Serialize};
use std::fmt;

/// Defines stimuli and the label they are recorded under
pub trait Stimulus: Clone + Send + Sync + std::fmt::Debug {
    /// Short, stable text used in output rows and for repeat detection.
    fn describe(&self) -> String;
    fn is_text(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Colour(pub [u8; 4]);

impl Colour {
    pub const BLACK: Colour = Colour([0, 0, 0, 255]);
    pub const WHITE: Colour = Colour([255, 255, 255, 255]);
    pub const RED: Colour = Colour([220, 30, 30, 255]);
    pub const GREEN: Colour = Colour([30, 170, 60, 255]);
    pub const BLUE: Colour = Colour([40, 70, 230, 255]);

    pub fn name(&self) -> String {
        match *self {
            Colour::BLACK => "black".into(),
            Colour::WHITE => "white".into(),
            Colour::RED => "red".into(),
            Colour::GREEN => "green".into(),
            Colour::BLUE => "blue".into(),
            Colour([r, g, b, a]) => format!("#{r:02x}{g:02x}{b:02x}{a:02x}"),
        }
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StimulusType {
    /// A row of arrows; the centre one is the target.
    Arrows {
        target: ArrowDirection,
        flankers: ArrowDirection,
        count: usize,
    },
    /// A letter array such as `AAEAA`, or the flanker-only preview `AA AA`.
    Letters { text: String },
    /// A colour word printed in an ink colour.
    ColourWord { word: String, ink: Colour },
    Text { content: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrowDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ArrowDirection {
    pub fn glyph(&self) -> char {
        match self {
            ArrowDirection::Up => '^',
            ArrowDirection::Down => 'v',
            ArrowDirection::Left => '<',
            ArrowDirection::Right => '>',
        }
    }
}

impl Stimulus for StimulusType {
    fn describe(&self) -> String {
        match self {
            StimulusType::Arrows {
                target,
                flankers,
                count,
            } => {
                let centre = count / 2;
                (0..*count)
                    .map(|i| {
                        if i == centre {
                            target.glyph()
                        } else {
                            flankers.glyph()
                        }
                    })
                    .collect()
            }
            StimulusType::Letters { text } => text.clone(),
            StimulusType::ColourWord { word, ink } => format!("{word}/{ink}"),
            StimulusType::Text { content } => content.clone(),
        }
    }

    fn is_text(&self) -> bool {
        !matches!(self, StimulusType::Arrows { .. })
    }
}

/// One part of a staged display, shown `onset_ms` after the first part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusStage {
    pub onset_ms: u64,
    pub stimulus: StimulusType,
}

impl StimulusStage {
    pub fn immediate(stimulus: StimulusType) -> Self {
        Self {
            onset_ms: 0,
            stimulus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrows_describe_centre_target() {
        let s = StimulusType::Arrows {
            target: ArrowDirection::Left,
            flankers: ArrowDirection::Right,
            count: 5,
        };
        assert_eq!(s.describe(), ">><>>");
        assert!(!s.is_text());
    }

    #[test]
    fn colour_word_describes_word_and_ink() {
        let s = StimulusType::ColourWord {
            word: "BLAU".into(),
            ink: Colour::RED,
        };
        assert_eq!(s.describe(), "BLAU/red");
        assert_eq!(Colour([1, 2, 3, 255]).name(), "#010203ff");
    }
}
