use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single domain entity as returned by the API: a project, crew, incident,
/// receipt, outage and so on. The shape is owned by the remote side, so the
/// record is kept as an untyped JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Builds a record from any JSON value. Non-object values are rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Looks up a field by name. Dotted names walk into nested objects, so
    /// `project.name` reads `{"project": {"name": ...}}`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(field) {
            return Some(value);
        }

        let mut parts = field.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Present and not null.
    pub fn has(&self, field: &str) -> bool {
        matches!(self.get(field), Some(value) if !value.is_null())
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Only JSON numbers count as numeric.
    pub fn number_field(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn bool_field(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    pub fn array_field(&self, field: &str) -> Option<&Vec<Value>> {
        self.get(field).and_then(Value::as_array)
    }

    /// Reads `YYYY-MM-DD` or an RFC 3339 timestamp (its UTC date).
    pub fn date_field(&self, field: &str) -> Option<NaiveDate> {
        self.str_field(field).and_then(parse_date)
    }

    /// The field rendered as a bucket key. Strings are used as-is, other
    /// scalars by their JSON text. Null, absent, arrays and objects give `None`.
    pub fn key_field(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc).date_naive())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Stable,
}

impl Trend {
    pub fn arrow(self) -> &'static str {
        match self {
            Trend::Up => "↑",
            Trend::Down => "↓",
            Trend::Stable => "→",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Integer(value) => write!(f, "{value}"),
            MetricValue::Decimal(value) => write!(f, "{value:.2}"),
            MetricValue::Text(value) if value.is_empty() => f.write_str("-"),
            MetricValue::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetric {
    pub key: String,
    pub label: String,
    pub value: MetricValue,
    pub trend: Trend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Records that passed the rule's predicate.
    pub matched: usize,
}

impl SummaryMetric {
    pub fn display_value(&self) -> String {
        match (&self.unit, &self.value) {
            (Some(unit), value) if unit == "%" => format!("{value}%"),
            (Some(unit), value) => format!("{value} {unit}"),
            (None, value) => value.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) fn record(value: Value) -> Record {
    Record::from_value(value).expect("test records are objects")
}
