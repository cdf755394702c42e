use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "RawState")]
pub enum ChecklistState {
    Pass,
    Fail,
    NotApplicable,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawState {
    Flag(bool),
    Text(String),
}

impl TryFrom<RawState> for ChecklistState {
    type Error = String;

    fn try_from(raw: RawState) -> Result<Self, Self::Error> {
        match raw {
            RawState::Flag(flag) => Ok(flag.into()),
            RawState::Text(text) => ChecklistState::parse(&text)
                .ok_or_else(|| format!("unrecognised checklist state `{text}`")),
        }
    }
}

impl From<bool> for ChecklistState {
    fn from(flag: bool) -> Self {
        if flag {
            ChecklistState::Pass
        } else {
            ChecklistState::Fail
        }
    }
}

impl ChecklistState {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pass" | "passed" | "true" | "yes" => Some(ChecklistState::Pass),
            "fail" | "failed" | "false" | "no" => Some(ChecklistState::Fail),
            "na" | "n/a" | "not_applicable" => Some(ChecklistState::NotApplicable),
            _ => None,
        }
    }

    /// Reads a state out of a JSON value as it appears on API records.
    /// Missing or unrecognised values count as not passed.
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Bool(flag)) => (*flag).into(),
            Some(Value::String(text)) => Self::parse(text).unwrap_or(ChecklistState::Fail),
            _ => ChecklistState::Fail,
        }
    }
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    #[serde(default)]
    pub label: String,
    pub state: ChecklistState,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl ChecklistItem {
    pub fn new(label: &str, state: ChecklistState) -> Self {
        Self {
            label: label.to_string(),
            state,
            weight: 1,
        }
    }

    pub fn weighted(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// Completion percentage over weighted items, 0..=100, rounded half-up.
/// N/A and zero-weight items count toward neither side.
pub fn score(items: &[ChecklistItem]) -> u8 {
    let mut total: u64 = 0;
    let mut passed: u64 = 0;

    for item in items {
        match item.state {
            ChecklistState::NotApplicable => continue,
            ChecklistState::Pass => {
                total += u64::from(item.weight);
                passed += u64::from(item.weight);
            }
            ChecklistState::Fail => total += u64::from(item.weight),
        }
    }

    if total == 0 {
        return 0;
    }
    ((passed * 200 + total) / (total * 2)) as u8
}
