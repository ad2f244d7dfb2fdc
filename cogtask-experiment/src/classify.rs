use crate::config::Thresholds;
use cogtask_core::{Outcome, Response};
use std::time::Duration;

/// What the trial runner saw before the response window closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Responded { response: Response, rt: Duration },
    /// No qualifying input inside the window.
    Timeout,
}

impl Observation {
    pub fn response(&self) -> Option<Response> {
        match self {
            Observation::Responded { response, .. } => Some(*response),
            Observation::Timeout => None,
        }
    }

    pub fn rt(&self) -> Option<Duration> {
        match self {
            Observation::Responded { rt, .. } => Some(*rt),
            Observation::Timeout => None,
        }
    }

    pub fn rt_ms(&self) -> Option<f64> {
        self.rt().map(|rt| rt.as_nanos() as f64 / 1e6)
    }
}

/// Maps an observation to exactly one outcome.
///
/// A timeout is always [`Outcome::TooSlow`], whatever the thresholds say.
/// Otherwise `rt >= too_slow` is too slow, `rt <= too_fast` is too fast, and
/// only the open interval between them compares the response with `expected`.
pub fn classify(observation: &Observation, expected: &Response, thresholds: &Thresholds) -> Outcome {
    let (response, rt) = match observation {
        Observation::Timeout => return Outcome::TooSlow,
        Observation::Responded { response, rt } => (response, *rt),
    };

    if rt >= thresholds.too_slow() {
        Outcome::TooSlow
    } else if rt <= thresholds.too_fast() {
        Outcome::TooFast
    } else if response == expected {
        Outcome::Correct
    } else {
        Outcome::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogtask_core::Key;
    use rstest::rstest;

    const D: Response = Response::Key(Key::Char('D'));
    const J: Response = Response::Key(Key::Char('J'));

    fn responded(response: Response, ms: u64) -> Observation {
        Observation::Responded {
            response,
            rt: Duration::from_millis(ms),
        }
    }

    #[rstest]
    #[case::correct_inside_window(D, 400, Outcome::Correct)]
    #[case::error_inside_window(J, 400, Outcome::Error)]
    #[case::just_above_too_fast(D, 151, Outcome::Correct)]
    #[case::just_below_too_slow(J, 1499, Outcome::Error)]
    #[case::at_too_fast_is_too_fast(D, 150, Outcome::TooFast)]
    #[case::below_too_fast_wrong_key(J, 20, Outcome::TooFast)]
    #[case::at_too_slow_is_too_slow(D, 1500, Outcome::TooSlow)]
    #[case::beyond_too_slow(J, 4000, Outcome::TooSlow)]
    fn classifies_responses(#[case] response: Response, #[case] ms: u64, #[case] expected: Outcome) {
        let t = Thresholds::new(150, 1500);
        assert_eq!(classify(&responded(response, ms), &D, &t), expected);
    }

    #[test]
    fn timeout_wins_over_numeric_comparison() {
        // Thresholds that would make any rt "too fast" still yield TooSlow on timeout.
        let t = Thresholds::new(u64::MAX - 1, u64::MAX);
        assert_eq!(classify(&Observation::Timeout, &D, &t), Outcome::TooSlow);
    }

    #[test]
    fn sub_millisecond_boundaries() {
        let t = Thresholds::new(150, 1500);
        let just_over = Observation::Responded {
            response: D,
            rt: Duration::from_micros(150_001),
        };
        assert_eq!(classify(&just_over, &D, &t), Outcome::Correct);
        let just_under = Observation::Responded {
            response: D,
            rt: Duration::from_micros(1_499_999),
        };
        assert_eq!(classify(&just_under, &D, &t), Outcome::Correct);
    }

    #[test]
    fn classification_is_total_over_a_grid() {
        let t = Thresholds::new(100, 1000);
        for ms in (0..=1200).step_by(25) {
            for r in [D, J] {
                let outcome = classify(&responded(r, ms), &D, &t);
                let expected = if ms >= 1000 {
                    Outcome::TooSlow
                } else if ms <= 100 {
                    Outcome::TooFast
                } else if r == D {
                    Outcome::Correct
                } else {
                    Outcome::Error
                };
                assert_eq!(outcome, expected, "rt {ms} response {r}");
            }
        }
    }

    #[test]
    fn observation_accessors() {
        let o = responded(J, 250);
        assert_eq!(o.response(), Some(J));
        assert_eq!(o.rt_ms(), Some(250.0));
        assert_eq!(Observation::Timeout.rt(), None);
    }
}
