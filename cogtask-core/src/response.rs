use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Key {
    /// Letter and digit keys, stored upper-case.
    Char(char),
    Space,
    Escape,
}

impl Key {
    pub fn char(c: char) -> Self {
        Key::Char(c.to_ascii_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// What a participant did to answer a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Response {
    Key(Key),
    Click(Side),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResponseError(pub String);

impl fmt::Display for ParseResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised response `{}`", self.0)
    }
}

impl std::error::Error for ParseResponseError {}

impl FromStr for Key {
    type Err = ParseResponseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "space" | " " => return Ok(Key::Space),
            "escape" | "esc" | "27" => return Ok(Key::Escape),
            _ => {}
        }
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphanumeric() => Ok(Key::char(c)),
            _ => Err(ParseResponseError(s.to_string())),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{c}"),
            Key::Space => f.write_str("Space"),
            Key::Escape => f.write_str("Escape"),
        }
    }
}

impl TryFrom<String> for Key {
    type Error = ParseResponseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

impl FromStr for Response {
    type Err = ParseResponseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "click:left" => Ok(Response::Click(Side::Left)),
            "click:right" => Ok(Response::Click(Side::Right)),
            _ => s.parse().map(Response::Key),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Key(k) => k.fmt(f),
            Response::Click(Side::Left) => f.write_str("click:left"),
            Response::Click(Side::Right) => f.write_str("click:right"),
        }
    }
}

impl TryFrom<String> for Response {
    type Error = ParseResponseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Response> for String {
    fn from(r: Response) -> Self {
        r.to_string()
    }
}

impl From<Key> for Response {
    fn from(k: Key) -> Self {
        Response::Key(k)
    }
}

/// Allow-list of inputs that count as an answer while a trial waits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseSet(Vec<Response>);

impl ResponseSet {
    pub fn new(responses: impl IntoIterator<Item = Response>) -> Self {
        let mut v: Vec<Response> = Vec::new();
        for r in responses {
            if !v.contains(&r) {
                v.push(r);
            }
        }
        Self(v)
    }

    pub fn contains(&self, response: &Response) -> bool {
        self.0.contains(response)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Response> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_case_insensitively() {
        assert_eq!("d".parse::<Key>().unwrap(), Key::Char('D'));
        assert_eq!("Escape".parse::<Key>().unwrap(), Key::Escape);
        assert_eq!("27".parse::<Key>().unwrap(), Key::Escape);
        assert_eq!("space".parse::<Key>().unwrap(), Key::Space);
        assert!("DJ".parse::<Key>().is_err());
    }

    #[test]
    fn responses_round_trip_through_strings() {
        let r: Response = "click:right".parse().unwrap();
        assert_eq!(r, Response::Click(Side::Right));
        assert_eq!(String::from(r), "click:right");
        assert_eq!(Response::Key(Key::char('m')).to_string(), "M");
    }

    #[test]
    fn response_set_deduplicates() {
        let set = ResponseSet::new([
            Response::Key(Key::char('x')),
            Response::Key(Key::Char('X')),
            Response::Key(Key::char('m')),
        ]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&Response::Key(Key::Char('M'))));
        assert!(!set.contains(&Response::Key(Key::Escape)));
    }
}
