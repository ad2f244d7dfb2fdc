use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::{Alphanumeric, Distribution};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const COMPLETION_CODE_LEN: usize = 16;

/// Who is running the task. Properties are carried through to the output
/// untouched (age, handedness, anything the lab asked for).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Participant {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Anonymous participant identified by the start time in epoch ms.
    pub fn anonymous(now: DateTime<Utc>) -> Self {
        Self::new(now.timestamp_millis().to_string())
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl Default for Participant {
    fn default() -> Self {
        Self::anonymous(Utc::now())
    }
}

/// Random alphanumeric code shown at the end of the run.
pub fn completion_code<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(Alphanumeric.sample(rng)))
        .collect()
}
