use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::clock::{cutoff_date, offset_date, Clock};
use crate::models::{MetricValue, Record, SummaryMetric, Trend};

/// Which records a rule looks at. Date-relative variants are evaluated
/// against the clock handed to [`aggregate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    #[default]
    Always,
    Equals { field: String, value: Value },
    OneOf { field: String, values: Vec<Value> },
    Present { field: String },
    Truthy { field: String },
    GreaterThan { field: String, value: f64 },
    LessThan { field: String, value: f64 },
    /// Date on or before `today + days`, overdue dates included.
    DueWithin { field: String, days: i64 },
    /// Date strictly before today.
    Overdue { field: String },
    /// Date equal to `today + offset_days`.
    OnDate {
        field: String,
        #[serde(default)]
        offset_days: i64,
    },
    And { all: Vec<Predicate> },
    Or { any: Vec<Predicate> },
    Not { predicate: Box<Predicate> },
}

impl Predicate {
    pub fn equals(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Equals {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn one_of<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::OneOf {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn truthy(field: &str) -> Self {
        Predicate::Truthy {
            field: field.to_string(),
        }
    }

    pub fn absent(field: &str) -> Self {
        Predicate::Not {
            predicate: Box::new(Predicate::Present {
                field: field.to_string(),
            }),
        }
    }

    pub fn due_within(field: &str, days: i64) -> Self {
        Predicate::DueWithin {
            field: field.to_string(),
            days,
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And { mut all } => {
                all.push(other);
                Predicate::And { all }
            }
            first => Predicate::And {
                all: vec![first, other],
            },
        }
    }

    pub fn matches(&self, record: &Record, today: NaiveDate) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Equals { field, value } => record
                .get(field)
                .is_some_and(|actual| values_match(actual, value)),
            Predicate::OneOf { field, values } => record
                .get(field)
                .is_some_and(|actual| values.iter().any(|value| values_match(actual, value))),
            Predicate::Present { field } => record.has(field),
            Predicate::Truthy { field } => record.bool_field(field).unwrap_or(false),
            Predicate::GreaterThan { field, value } => {
                record.number_field(field).is_some_and(|actual| actual > *value)
            }
            Predicate::LessThan { field, value } => {
                record.number_field(field).is_some_and(|actual| actual < *value)
            }
            // A bound past the last representable date admits every dated
            // record; one before the first admits none.
            Predicate::DueWithin { field, days } => {
                record
                    .date_field(field)
                    .is_some_and(|date| match offset_date(today, *days) {
                        Some(bound) => date <= bound,
                        None => *days > 0,
                    })
            }
            Predicate::Overdue { field } => {
                record.date_field(field).is_some_and(|date| date < today)
            }
            Predicate::OnDate { field, offset_days } => record
                .date_field(field)
                .is_some_and(|date| offset_date(today, *offset_days) == Some(date)),
            Predicate::And { all } => all.iter().all(|inner| inner.matches(record, today)),
            Predicate::Or { any } => any.iter().any(|inner| inner.matches(record, today)),
            Predicate::Not { predicate } => !predicate.matches(record, today),
        }
    }
}

fn values_match(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(left), Some(right)) => left == right,
        _ => actual == expected,
    }
}

/// How the records selected by a rule collapse into one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reducer {
    Count,
    Sum { field: String },
    Average { field: String },
    PercentOfTotal,
    /// Share of `base` records that also pass the rule's predicate.
    PercentOf { base: Predicate },
    DaysSinceLatest { field: String },
    /// Most frequent value of a field; ties go to the smallest value.
    Mode { field: String },
}

impl Reducer {
    fn default_unit(&self) -> Option<&'static str> {
        match self {
            Reducer::PercentOfTotal | Reducer::PercentOf { .. } => Some("%"),
            Reducer::DaysSinceLatest { .. } => Some("days"),
            _ => None,
        }
    }

    fn reduce(
        &self,
        key: &str,
        all: &[Record],
        matched: &[&Record],
        today: NaiveDate,
    ) -> MetricValue {
        match self {
            Reducer::Count => MetricValue::Integer(matched.len() as i64),
            Reducer::Sum { field } => {
                let values = numeric_values(key, field, matched);
                number_value(values.iter().sum())
            }
            Reducer::Average { field } => {
                let values = numeric_values(key, field, matched);
                if values.is_empty() {
                    return MetricValue::Integer(0);
                }
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                MetricValue::Integer(round_half_up(mean))
            }
            Reducer::PercentOfTotal => MetricValue::Integer(percent(matched.len(), all.len())),
            Reducer::PercentOf { base } => {
                let base_count = all
                    .iter()
                    .filter(|record| base.matches(record, today))
                    .count();
                let hits = matched
                    .iter()
                    .filter(|record| base.matches(record, today))
                    .count();
                MetricValue::Integer(percent(hits, base_count))
            }
            Reducer::DaysSinceLatest { field } => {
                let dates: Vec<NaiveDate> = matched
                    .iter()
                    .filter_map(|record| record.date_field(field))
                    .collect();
                log_exclusions(key, field, matched.len() - dates.len());
                let days = dates
                    .into_iter()
                    .max()
                    .map_or(0, |latest| (today - latest).num_days().max(0));
                MetricValue::Integer(days)
            }
            Reducer::Mode { field } => {
                let mut counts: BTreeMap<String, usize> = BTreeMap::new();
                for record in matched {
                    if let Some(value) = record.key_field(field) {
                        *counts.entry(value).or_insert(0) += 1;
                    }
                }
                let mut best: Option<(String, usize)> = None;
                for (value, count) in counts {
                    if best.as_ref().map_or(true, |(_, top)| count > *top) {
                        best = Some((value, count));
                    }
                }
                MetricValue::Text(best.map(|(value, _)| value).unwrap_or_default())
            }
        }
    }
}

/// Numeric values of `field`; records where it is absent or non-numeric do
/// not contribute.
fn numeric_values(key: &str, field: &str, matched: &[&Record]) -> Vec<f64> {
    let values: Vec<f64> = matched
        .iter()
        .filter_map(|record| record.number_field(field))
        .collect();
    log_exclusions(key, field, matched.len() - values.len());
    values
}

fn log_exclusions(key: &str, field: &str, skipped: usize) {
    if skipped > 0 {
        debug!(
            target: "fieldforge::aggregate",
            rule = key,
            field,
            skipped,
            "records without a usable value excluded from reduction"
        );
    }
}

fn number_value(total: f64) -> MetricValue {
    if total.fract() == 0.0 && total.abs() < 9.0e15 {
        MetricValue::Integer(total as i64)
    } else {
        MetricValue::Decimal(total)
    }
}

pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// `part / whole * 100` rounded half-up; an empty whole yields 0.
pub fn percent(part: usize, whole: usize) -> i64 {
    if whole == 0 {
        return 0;
    }
    let part = part as u128;
    let whole = whole as u128;
    ((part * 200 + whole) / (whole * 2)) as i64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub predicate: Predicate,
    pub reducer: Reducer,
    #[serde(default)]
    pub unit: Option<String>,
}

impl ClassificationRule {
    pub fn new(key: &str, label: &str, reducer: Reducer) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            predicate: Predicate::Always,
            reducer,
            unit: None,
        }
    }

    pub fn count(key: &str, label: &str) -> Self {
        Self::new(key, label, Reducer::Count)
    }

    pub fn when(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    fn matched<'a>(&self, records: &'a [Record], today: NaiveDate) -> Vec<&'a Record> {
        records
            .iter()
            .filter(|record| self.predicate.matches(record, today))
            .collect()
    }
}

/// Folds `records` into one metric per rule, in rule order. Trends are left
/// `Stable`; use [`aggregate_with_trend`] when a previous period is known.
pub fn aggregate(
    records: &[Record],
    rules: &[ClassificationRule],
    clock: &dyn Clock,
) -> Vec<SummaryMetric> {
    let today = clock.today();
    rules
        .iter()
        .map(|rule| {
            let matched = rule.matched(records, today);
            SummaryMetric {
                key: rule.key.clone(),
                label: rule.label.clone(),
                value: rule.reducer.reduce(&rule.key, records, &matched, today),
                trend: Trend::Stable,
                unit: rule
                    .unit
                    .clone()
                    .or_else(|| rule.reducer.default_unit().map(str::to_string)),
                matched: matched.len(),
            }
        })
        .collect()
}

/// Like [`aggregate`], with each metric's trend taken from the change in
/// rule-passing counts between `previous` and `current`.
pub fn aggregate_with_trend(
    current: &[Record],
    previous: &[Record],
    rules: &[ClassificationRule],
    threshold: usize,
    clock: &dyn Clock,
) -> Vec<SummaryMetric> {
    let today = clock.today();
    let mut metrics = aggregate(current, rules, clock);
    for (metric, rule) in metrics.iter_mut().zip(rules) {
        let before = rule.matched(previous, today).len();
        metric.trend = trend(metric.matched, before, threshold);
    }
    metrics
}

pub fn trend(current: usize, previous: usize, threshold: usize) -> Trend {
    if current > previous.saturating_add(threshold) {
        Trend::Up
    } else if current.saturating_add(threshold) < previous {
        Trend::Down
    } else {
        Trend::Stable
    }
}

#[derive(Debug, Clone, Default)]
pub struct Periods {
    pub current: Vec<Record>,
    pub previous: Vec<Record>,
}

/// Splits records into the trailing `period_days` window ending today and
/// the window of equal length before it. Future-dated, older or undated
/// records land in neither.
pub fn split_periods(
    records: &[Record],
    date_field: &str,
    period_days: i64,
    clock: &dyn Clock,
) -> Periods {
    let period_days = period_days.max(1);
    let today = clock.today();
    let current_start = cutoff_date(clock, period_days);
    let previous_start = cutoff_date(clock, period_days.saturating_mul(2));

    let mut periods = Periods::default();
    for record in records {
        let Some(date) = record.date_field(date_field) else {
            continue;
        };
        if date > current_start && date <= today {
            periods.current.push(record.clone());
        } else if date > previous_start && date <= current_start {
            periods.previous.push(record.clone());
        }
    }
    periods
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::record;
    use proptest::prelude::*;
    use serde_json::json;

    fn clock() -> FixedClock {
        FixedClock::on(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap())
    }

    fn incidents() -> Vec<Record> {
        vec![
            record(json!({ "id": 1, "status": "open" })),
            record(json!({ "id": 2, "status": "open" })),
            record(json!({ "id": 3, "status": "resolved" })),
        ]
    }

    fn incident_rules() -> Vec<ClassificationRule> {
        vec![
            ClassificationRule::count("open", "Open").when(Predicate::equals("status", "open")),
            ClassificationRule::new("resolved_pct", "Resolved", Reducer::PercentOfTotal)
                .when(Predicate::equals("status", "resolved")),
        ]
    }

    #[test]
    fn counts_and_percentages_follow_rounding_policy() {
        let metrics = aggregate(&incidents(), &incident_rules(), &clock());
        assert_eq!(metrics[0].value, MetricValue::Integer(2));
        assert_eq!(metrics[1].value, MetricValue::Integer(33));
        assert_eq!(metrics[1].unit.as_deref(), Some("%"));
    }

    #[test]
    fn output_follows_rule_order() {
        let mut rules = incident_rules();
        rules.reverse();
        let keys: Vec<String> = aggregate(&incidents(), &rules, &clock())
            .into_iter()
            .map(|metric| metric.key)
            .collect();
        assert_eq!(keys, vec!["resolved_pct", "open"]);
    }

    #[test]
    fn empty_input_yields_neutral_values() {
        let rules = vec![
            ClassificationRule::count("all", "All"),
            ClassificationRule::new("spend", "Spend", Reducer::Sum { field: "amount".into() }),
            ClassificationRule::new("avg", "Avg", Reducer::Average { field: "amount".into() }),
            ClassificationRule::new("pct", "Pct", Reducer::PercentOfTotal),
            ClassificationRule::new(
                "pass_rate",
                "Pass rate",
                Reducer::PercentOf { base: Predicate::equals("status", "completed") },
            ),
            ClassificationRule::new(
                "since",
                "Since",
                Reducer::DaysSinceLatest { field: "incident_date".into() },
            ),
        ];
        for metric in aggregate(&[], &rules, &clock()) {
            assert_eq!(metric.value, MetricValue::Integer(0), "{}", metric.key);
            assert_eq!(metric.matched, 0);
        }
        let mode = ClassificationRule::new("top", "Top", Reducer::Mode { field: "kind".into() });
        assert_eq!(
            aggregate(&[], &[mode], &clock())[0].value,
            MetricValue::Text(String::new())
        );
    }

    #[test]
    fn repeated_runs_are_identical() {
        let records = incidents();
        let rules = incident_rules();
        assert_eq!(
            aggregate(&records, &rules, &clock()),
            aggregate(&records, &rules, &clock())
        );
    }

    #[test]
    fn malformed_records_are_excluded_from_sums_and_averages() {
        let receipts = vec![
            record(json!({ "amount": 120.5 })),
            record(json!({ "amount": "n/a" })),
            record(json!({})),
            record(json!({ "amount": 79.5 })),
        ];
        let rules = vec![
            ClassificationRule::new("total", "Total", Reducer::Sum { field: "amount".into() }),
            ClassificationRule::new("avg", "Average", Reducer::Average { field: "amount".into() }),
        ];
        let metrics = aggregate(&receipts, &rules, &clock());
        assert_eq!(metrics[0].value, MetricValue::Integer(200));
        assert_eq!(metrics[1].value, MetricValue::Integer(100));
        assert_eq!(metrics[0].matched, 4);
    }

    #[test]
    fn fractional_sums_keep_precision() {
        let receipts = vec![record(json!({ "amount": 10.25 })), record(json!({ "amount": 2 }))];
        let rule = ClassificationRule::new("total", "Total", Reducer::Sum { field: "amount".into() });
        assert_eq!(
            aggregate(&receipts, &[rule], &clock())[0].value,
            MetricValue::Decimal(12.25)
        );
    }

    #[test]
    fn averages_round_half_up() {
        let crews = vec![
            record(json!({ "active_members": 4 })),
            record(json!({ "active_members": 5 })),
        ];
        let rule = ClassificationRule::new(
            "avg_size",
            "Avg crew",
            Reducer::Average { field: "active_members".into() },
        );
        assert_eq!(aggregate(&crews, &[rule], &clock())[0].value, MetricValue::Integer(5));
    }

    #[test]
    fn percent_of_uses_base_as_denominator() {
        let inspections = vec![
            record(json!({ "status": "completed", "result": "pass" })),
            record(json!({ "status": "completed", "result": "fail" })),
            record(json!({ "status": "completed", "result": "pass" })),
            record(json!({ "status": "scheduled", "result": "pass" })),
        ];
        let rule = ClassificationRule::new(
            "pass_rate",
            "Pass rate",
            Reducer::PercentOf { base: Predicate::equals("status", "completed") },
        )
        .when(Predicate::equals("result", "pass"));
        assert_eq!(
            aggregate(&inspections, &[rule], &clock())[0].value,
            MetricValue::Integer(67)
        );
    }

    #[test]
    fn days_since_latest_uses_injected_clock() {
        let incidents = vec![
            record(json!({ "incident_date": "2026-02-28" })),
            record(json!({ "incident_date": "2026-03-07T14:00:00Z" })),
            record(json!({ "incident_date": "garbage" })),
        ];
        let rule = ClassificationRule::new(
            "days_since",
            "Days since last incident",
            Reducer::DaysSinceLatest { field: "incident_date".into() },
        );
        let metric = &aggregate(&incidents, &[rule], &clock())[0];
        assert_eq!(metric.value, MetricValue::Integer(3));
        assert_eq!(metric.unit.as_deref(), Some("days"));
    }

    #[test]
    fn mode_breaks_ties_by_smallest_value() {
        let incidents = vec![
            record(json!({ "incident_type": "Near Miss" })),
            record(json!({ "incident_type": "First Aid" })),
            record(json!({ "incident_type": "Near Miss" })),
            record(json!({ "incident_type": "First Aid" })),
        ];
        let rule = ClassificationRule::new(
            "top_type",
            "Most common",
            Reducer::Mode { field: "incident_type".into() },
        );
        assert_eq!(
            aggregate(&incidents, &[rule], &clock())[0].value,
            MetricValue::Text("First Aid".into())
        );
    }

    #[test]
    fn date_predicates_are_relative_to_clock() {
        let today = clock().today();
        let equipment = vec![
            record(json!({ "next_maintenance_date": "2026-03-01" })),
            record(json!({ "next_maintenance_date": "2026-03-10" })),
            record(json!({ "next_maintenance_date": "2026-03-17" })),
            record(json!({ "next_maintenance_date": "2026-03-18" })),
            record(json!({})),
        ];
        let due = Predicate::due_within("next_maintenance_date", 7);
        let overdue = Predicate::Overdue { field: "next_maintenance_date".into() };
        let today_only = Predicate::OnDate { field: "next_maintenance_date".into(), offset_days: 0 };
        assert_eq!(equipment.iter().filter(|r| due.matches(r, today)).count(), 3);
        assert_eq!(equipment.iter().filter(|r| overdue.matches(r, today)).count(), 1);
        assert_eq!(equipment.iter().filter(|r| today_only.matches(r, today)).count(), 1);
    }

    #[test]
    fn numeric_equality_ignores_representation() {
        let item = record(json!({ "level": 2.0 }));
        assert!(Predicate::equals("level", 2).matches(&item, clock().today()));
    }

    #[test]
    fn combinators_compose() {
        let today = clock().today();
        let permit = record(json!({ "status": "active", "risk_level": "high" }));
        let high_active = Predicate::equals("status", "active").and(Predicate::equals("risk_level", "high"));
        assert!(high_active.matches(&permit, today));
        assert!(!Predicate::absent("status").matches(&permit, today));
        assert!(Predicate::one_of("status", ["draft", "active"]).matches(&permit, today));
    }

    #[test]
    fn trend_respects_threshold() {
        assert_eq!(trend(5, 5, 0), Trend::Stable);
        assert_eq!(trend(6, 5, 0), Trend::Up);
        assert_eq!(trend(4, 5, 0), Trend::Down);
        assert_eq!(trend(7, 5, 2), Trend::Stable);
        assert_eq!(trend(8, 5, 2), Trend::Up);
        assert_eq!(trend(2, 5, 2), Trend::Down);
        assert_eq!(trend(0, 0, usize::MAX), Trend::Stable);
    }

    #[test]
    fn trends_compare_against_explicit_previous_period() {
        let current = incidents();
        let previous = vec![record(json!({ "status": "open" }))];
        let metrics = aggregate_with_trend(&current, &previous, &incident_rules(), 0, &clock());
        assert_eq!(metrics[0].trend, Trend::Up);
        assert_eq!(metrics[1].trend, Trend::Up);

        let metrics = aggregate_with_trend(&previous, &current, &incident_rules(), 0, &clock());
        assert_eq!(metrics[0].trend, Trend::Down);
    }

    #[test]
    fn split_periods_partitions_trailing_windows() {
        let records = vec![
            record(json!({ "d": "2026-03-10" })),
            record(json!({ "d": "2026-03-04" })),
            record(json!({ "d": "2026-03-03" })),
            record(json!({ "d": "2026-02-25" })),
            record(json!({ "d": "2026-02-24" })),
            record(json!({ "d": "2026-03-11" })),
            record(json!({})),
        ];
        let periods = split_periods(&records, "d", 7, &clock());
        assert_eq!(periods.current.len(), 2);
        assert_eq!(periods.previous.len(), 2);
    }

    #[test]
    fn huge_periods_cover_everything_dated_up_to_today() {
        let records = vec![
            record(json!({ "d": "2026-03-09" })),
            record(json!({ "d": "1901-01-01" })),
            record(json!({ "d": "2026-03-11" })),
        ];
        for period_days in [100_000_000, i64::MAX] {
            let periods = split_periods(&records, "d", period_days, &clock());
            assert_eq!(periods.current.len(), 2);
            assert!(periods.previous.is_empty());
        }
    }

    #[test]
    fn out_of_range_day_offsets_do_not_panic() {
        let records = vec![
            record(json!({ "next": "2026-03-12" })),
            record(json!({ "next": "1999-01-01" })),
            record(json!({})),
        ];
        let rules: Vec<ClassificationRule> = serde_json::from_value(json!([
            { "key": "far_future", "label": "Far", "reducer": { "kind": "count" },
              "predicate": { "op": "due_within", "field": "next", "days": i64::MAX } },
            { "key": "far_past", "label": "Past", "reducer": { "kind": "count" },
              "predicate": { "op": "due_within", "field": "next", "days": i64::MIN } },
            { "key": "never", "label": "Never", "reducer": { "kind": "count" },
              "predicate": { "op": "on_date", "field": "next", "offset_days": i64::MAX } }
        ]))
        .unwrap();

        let metrics = aggregate(&records, &rules, &clock());
        assert_eq!(metrics[0].value, MetricValue::Integer(2));
        assert_eq!(metrics[1].value, MetricValue::Integer(0));
        assert_eq!(metrics[2].value, MetricValue::Integer(0));
    }

    #[test]
    fn rules_deserialize_from_json() {
        let rules: Vec<ClassificationRule> = serde_json::from_value(json!([
            {
                "key": "open",
                "label": "Open incidents",
                "predicate": { "op": "equals", "field": "status", "value": "open" },
                "reducer": { "kind": "count" }
            },
            {
                "key": "critical_open",
                "label": "Critical and open",
                "predicate": {
                    "op": "and",
                    "all": [
                        { "op": "equals", "field": "status", "value": "open" },
                        { "op": "one_of", "field": "severity", "values": ["critical", "high"] }
                    ]
                },
                "reducer": { "kind": "percent_of_total" },
                "unit": "%"
            },
            { "key": "total", "label": "Total", "reducer": { "kind": "count" } }
        ]))
        .unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[2].predicate, Predicate::Always);
        assert_eq!(rules[1].reducer, Reducer::PercentOfTotal);
    }

    #[test]
    fn percent_rounds_half_up_without_float_drift() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(1, 8), 13);
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(5, 5), 100);
    }

    fn status_record() -> impl Strategy<Value = Record> {
        (
            prop::sample::select(vec!["open", "investigating", "resolved", "closed", "bogus"]),
            prop::option::of(0u32..400),
            prop::option::of(-50i64..50),
        )
            .prop_map(|(status, days_ago, hours)| {
                let mut fields = json!({ "status": status });
                if let Some(days_ago) = days_ago {
                    let date = clock().today() - chrono::Duration::days(i64::from(days_ago));
                    fields["d"] = json!(date.to_string());
                }
                if let Some(hours) = hours {
                    fields["hours"] = json!(hours);
                }
                record(fields)
            })
    }

    proptest! {
        #[test]
        fn aggregate_is_idempotent(records in prop::collection::vec(status_record(), 0..40)) {
            let rules = vec![
                ClassificationRule::count("open", "Open").when(Predicate::equals("status", "open")),
                ClassificationRule::new("resolved", "Resolved", Reducer::PercentOfTotal)
                    .when(Predicate::one_of("status", ["resolved", "closed"])),
                ClassificationRule::new("hours", "Hours", Reducer::Sum { field: "hours".into() }),
                ClassificationRule::new("avg", "Avg", Reducer::Average { field: "hours".into() }),
                ClassificationRule::new("since", "Since", Reducer::DaysSinceLatest { field: "d".into() }),
                ClassificationRule::new("mode", "Mode", Reducer::Mode { field: "status".into() }),
                ClassificationRule::count("soon", "Soon").when(Predicate::due_within("d", -30)),
            ];
            let first = aggregate(&records, &rules, &clock());
            let second = aggregate(&records, &rules, &clock());
            prop_assert_eq!(first, second);
        }
    }
}
