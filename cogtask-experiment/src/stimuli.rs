use crate::config::{ResponseMapping, RunConfig};
use crate::error::ConfigError;
use cogtask_core::{
    ArrowDirection, Colour, Compatibility, Response, Side, StimulusStage, StimulusType, TrialSpec,
};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

const VOWELS: [char; 4] = ['A', 'E', 'O', 'U'];
const CONSONANTS: [char; 4] = ['B', 'H', 'T', 'S'];

/// Left and right mouse buttons, in the order of the left/right answers.
pub const CLICKS: [Response; 2] = [Response::Click(Side::Left), Response::Click(Side::Right)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StimulusSetKind {
    ArrowFlanker,
    LetterFlanker,
    ColourStroop,
    /// "now left" / "not right" phrases answered with the response keys.
    AffirmationNegation,
    /// The same phrases answered with the left or right mouse button.
    MouseNegation,
    SelfPacedReading,
}

impl StimulusSetKind {
    pub fn is_reading(&self) -> bool {
        matches!(self, StimulusSetKind::SelfPacedReading)
    }

    /// Answered by clicks rather than the configured keys.
    pub fn uses_mouse(&self) -> bool {
        matches!(self, StimulusSetKind::MouseNegation)
    }
}

/// The distinct templates a block is balanced over.
#[derive(Debug, Clone, PartialEq)]
pub enum Templates {
    Trials(Vec<TrialSpec>),
    Sentences(Vec<String>),
}

impl Templates {
    pub fn len(&self) -> usize {
        match self {
            Templates::Trials(t) => t.len(),
            Templates::Sentences(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn build<R: Rng + ?Sized>(
        config: &RunConfig,
        mapping: &ResponseMapping,
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        let keys = || match mapping.keys.as_slice() {
            [first, second, ..] => Ok([*first, *second]),
            other => Err(ConfigError::TooFewKeys {
                needed: 2,
                got: other.len(),
            }),
        };
        Ok(match config.stimuli {
            StimulusSetKind::SelfPacedReading => {
                if config.reading.sentences.is_empty() {
                    return Err(ConfigError::NoSentences);
                }
                Templates::Sentences(config.reading.sentences.clone())
            }
            StimulusSetKind::ArrowFlanker => Templates::Trials(arrow_flanker(keys()?)),
            StimulusSetKind::LetterFlanker => Templates::Trials(letter_flanker(
                keys()?,
                config.timing.flanker_onset_ms,
                rng,
            )),
            StimulusSetKind::ColourStroop => Templates::Trials(colour_stroop(keys()?)),
            StimulusSetKind::AffirmationNegation => {
                Templates::Trials(affirmation_negation(keys()?))
            }
            StimulusSetKind::MouseNegation => Templates::Trials(affirmation_negation(CLICKS)),
        })
    }
}

/// Five arrows; respond to the direction of the centre one.
/// `keys[0]` answers left, `keys[1]` right.
pub fn arrow_flanker(keys: [Response; 2]) -> Vec<TrialSpec> {
    use ArrowDirection::{Left, Right};
    [
        ("comp_left", Left, Left, Compatibility::Compatible),
        ("incomp_left", Left, Right, Compatibility::Incompatible),
        ("comp_right", Right, Right, Compatibility::Compatible),
        ("incomp_right", Right, Left, Compatibility::Incompatible),
    ]
    .into_iter()
    .map(|(condition, target, flankers, compatibility)| {
        TrialSpec::single(
            StimulusType::Arrows {
                target,
                flankers,
                count: 5,
            },
            condition,
            compatibility,
            if target == Left { keys[0] } else { keys[1] },
        )
    })
    .collect()
}

fn is_vowel(c: char) -> bool {
    VOWELS.contains(&c)
}

/// Letter arrays like `AAEAA`: vowel targets take `keys[0]`, consonants
/// `keys[1]`. Flanker letter never equals the target, and one incompatible
/// target is dropped per flanker letter so every flanker contributes three
/// compatible and three incompatible arrays (48 in total). Each array is
/// previewed as flankers only (`AA AA`) for `flanker_onset_ms`.
pub fn letter_flanker<R: Rng + ?Sized>(
    keys: [Response; 2],
    flanker_onset_ms: u64,
    rng: &mut R,
) -> Vec<TrialSpec> {
    let mut letters: Vec<char> = VOWELS.iter().chain(CONSONANTS.iter()).copied().collect();
    letters.shuffle(rng);

    let mut specs = Vec::with_capacity(48);
    for &flanker in &letters {
        let mut removed = false;
        for &target in &letters {
            if target == flanker {
                continue;
            }
            let compatible = is_vowel(flanker) == is_vowel(target);
            if !compatible && !removed {
                removed = true;
                continue;
            }
            let f: String = [flanker, flanker].iter().collect();
            let preview = format!("{f} {f}");
            let array = format!("{f}{target}{f}");
            specs.push(TrialSpec::staged(
                vec![
                    StimulusStage::immediate(StimulusType::Letters { text: preview }),
                    StimulusStage {
                        onset_ms: flanker_onset_ms,
                        stimulus: StimulusType::Letters { text: array },
                    },
                ],
                if compatible { "comp" } else { "incomp" },
                if compatible {
                    Compatibility::Compatible
                } else {
                    Compatibility::Incompatible
                },
                if is_vowel(target) { keys[0] } else { keys[1] },
            ));
        }
    }
    specs
}

/// Colour words printed in red or blue ink; respond to the ink.
/// `keys[0]` answers red, `keys[1]` blue.
pub fn colour_stroop(keys: [Response; 2]) -> Vec<TrialSpec> {
    let inks = [(Colour::RED, "RED", keys[0]), (Colour::BLUE, "BLUE", keys[1])];
    let mut specs = Vec::with_capacity(8);
    for (ink, name, key) in inks {
        for word in [name, name, "GREEN", "YELLOW"] {
            let compatibility = if word == name {
                Compatibility::Compatible
            } else {
                Compatibility::Incompatible
            };
            specs.push(TrialSpec::single(
                StimulusType::ColourWord {
                    word: word.to_string(),
                    ink,
                },
                compatibility.to_string(),
                compatibility,
                key,
            ));
        }
    }
    specs
}

/// Phrases naming a side, affirmed ("now") or negated ("not"); the answer
/// is the side meant. `answers[0]` answers left, `answers[1]` right.
/// Affirmations count as compatible, negations as incompatible.
pub fn affirmation_negation(answers: [Response; 2]) -> Vec<TrialSpec> {
    [
        ("now left", "aff_left", Side::Left),
        ("now right", "aff_right", Side::Right),
        ("not left", "neg_right", Side::Right),
        ("not right", "neg_left", Side::Left),
    ]
    .into_iter()
    .map(|(phrase, condition, side)| {
        let compatibility = if condition.starts_with("aff") {
            Compatibility::Compatible
        } else {
            Compatibility::Incompatible
        };
        TrialSpec::single(
            StimulusType::Text {
                content: phrase.to_string(),
            },
            condition,
            compatibility,
            match side {
                Side::Left => answers[0],
                Side::Right => answers[1],
            },
        )
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogtask_core::{Key, Stimulus};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    const X: Response = Response::Key(Key::Char('X'));
    const M: Response = Response::Key(Key::Char('M'));

    #[test]
    fn arrow_flanker_answers_centre_arrow() {
        let specs = arrow_flanker([X, M]);
        assert_eq!(specs.len(), 4);
        for s in &specs {
            let StimulusType::Arrows { target, .. } = s.target() else {
                panic!("expected arrows");
            };
            let want = if *target == ArrowDirection::Left { X } else { M };
            assert_eq!(s.expected, want);
        }
        assert_eq!(specs[1].condition, "incomp_left");
        assert_eq!(specs[1].describe(), ">><>>");
    }

    #[test]
    fn letter_flanker_yields_48_balanced_arrays() {
        let specs = letter_flanker([X, M], 100, &mut StdRng::seed_from_u64(3));
        assert_eq!(specs.len(), 48);

        let arrays: HashSet<String> = specs.iter().map(|s| s.describe()).collect();
        assert_eq!(arrays.len(), 48, "arrays must be unique");

        let comp = specs
            .iter()
            .filter(|s| s.compatibility == Compatibility::Compatible)
            .count();
        assert_eq!(comp, 24);

        for s in &specs {
            let text = s.describe();
            let chars: Vec<char> = text.chars().collect();
            assert_eq!(chars.len(), 5);
            assert_ne!(chars[0], chars[2], "flanker equals target in {text}");
            assert_eq!(s.expected, if is_vowel(chars[2]) { X } else { M });
            assert_eq!(s.stages.len(), 2);
            assert_eq!(s.stages[1].onset_ms, 100);
            assert_eq!(
                s.stages[0].stimulus.describe(),
                format!("{0}{0} {0}{0}", chars[0])
            );
        }
    }

    #[test]
    fn letter_flanker_drops_one_incompatible_per_flanker() {
        let specs = letter_flanker([X, M], 100, &mut StdRng::seed_from_u64(11));
        for flanker in VOWELS.iter().chain(CONSONANTS.iter()) {
            let with: Vec<_> = specs
                .iter()
                .filter(|s| s.describe().starts_with(*flanker))
                .collect();
            assert_eq!(with.len(), 6);
            let incomp = with
                .iter()
                .filter(|s| s.compatibility == Compatibility::Incompatible)
                .count();
            assert_eq!(incomp, 3);
        }
    }

    #[test]
    fn colour_stroop_answers_ink() {
        let specs = colour_stroop([X, M]);
        assert_eq!(specs.len(), 8);
        for s in &specs {
            let StimulusType::ColourWord { ink, word } = s.target() else {
                panic!("expected colour word");
            };
            assert_eq!(s.expected, if *ink == Colour::RED { X } else { M });
            let named = (word == "RED" && *ink == Colour::RED) || (word == "BLUE" && *ink == Colour::BLUE);
            let want = if named {
                Compatibility::Compatible
            } else {
                Compatibility::Incompatible
            };
            assert_eq!(s.compatibility, want, "{word} in {}", ink.name());
            assert_eq!(s.condition, want.to_string());
        }
        let incomp = specs
            .iter()
            .filter(|s| s.compatibility == Compatibility::Incompatible)
            .count();
        assert_eq!(incomp, 4);
    }

    #[test]
    fn negated_phrases_answer_the_other_side() {
        let specs = affirmation_negation([X, M]);
        let got: Vec<(String, &str, Compatibility, Response)> = specs
            .iter()
            .map(|s| (s.describe(), s.condition.as_str(), s.compatibility, s.expected))
            .collect();
        assert_eq!(
            got,
            vec![
                ("now left".to_string(), "aff_left", Compatibility::Compatible, X),
                ("now right".to_string(), "aff_right", Compatibility::Compatible, M),
                ("not left".to_string(), "neg_right", Compatibility::Incompatible, M),
                ("not right".to_string(), "neg_left", Compatibility::Incompatible, X),
            ]
        );
    }

    #[test]
    fn mouse_negation_expects_clicks_whatever_the_keys() {
        let mut config = RunConfig::default();
        config.stimuli = StimulusSetKind::MouseNegation;
        let mapping = ResponseMapping {
            mapping: 2,
            keys: vec![M, X],
        };
        let Templates::Trials(specs) =
            Templates::build(&config, &mapping, &mut StdRng::seed_from_u64(0)).unwrap()
        else {
            panic!("expected trial templates");
        };
        assert_eq!(specs[0].describe(), "now left");
        assert_eq!(specs[0].expected, Response::Click(Side::Left));
        assert_eq!(specs[2].expected, Response::Click(Side::Right));
        assert!(specs.iter().all(|s| matches!(s.expected, Response::Click(_))));
    }

    #[test]
    fn templates_follow_mapping_order() {
        let config = RunConfig::default();
        let mapping = ResponseMapping {
            mapping: 2,
            keys: vec![M, X],
        };
        let Templates::Trials(specs) =
            Templates::build(&config, &mapping, &mut StdRng::seed_from_u64(0)).unwrap()
        else {
            panic!("expected trial templates");
        };
        assert_eq!(specs[0].condition, "comp_left");
        assert_eq!(specs[0].expected, M);
    }

    #[test]
    fn reading_templates_are_sentences() {
        let mut config = RunConfig::default();
        config.stimuli = StimulusSetKind::SelfPacedReading;
        config.reading.sentences = vec!["One two.".into(), "Three four.".into()];
        let mapping = config.responses.mapping(&mut StdRng::seed_from_u64(0));
        let t = Templates::build(&config, &mapping, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(t.len(), 2);
        assert!(matches!(t, Templates::Sentences(_)));
    }
}
