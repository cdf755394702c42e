use std::fmt::Write;

use chrono::NaiveDate;

use crate::aggregate::percent;
use crate::bucket::StatusBuckets;
use crate::lookahead::{self, DayColumn, LookaheadSummary};
use crate::models::{Record, SummaryMetric};
use crate::screens::{self, Screen};

const LABEL_FIELDS: [&str; 8] = [
    "title",
    "name",
    "activity_name",
    "equipment_name",
    "crew_name",
    "permit_number",
    "incident_type",
    "description",
];

fn record_label(record: &Record) -> String {
    LABEL_FIELDS
        .iter()
        .find_map(|field| record.str_field(field).filter(|value| !value.is_empty()))
        .map(str::to_string)
        .or_else(|| record.key_field("id"))
        .unwrap_or_else(|| "-".to_string())
}

pub fn most_recent<'a>(records: &'a [Record], date_field: &str, limit: usize) -> Vec<&'a Record> {
    let mut dated: Vec<(NaiveDate, &Record)> = records
        .iter()
        .filter_map(|record| record.date_field(date_field).map(|date| (date, record)))
        .collect();
    dated.sort_by(|a, b| b.0.cmp(&a.0));
    dated.into_iter().take(limit).map(|(_, record)| record).collect()
}

pub struct ReportInput<'a> {
    pub screen: Screen,
    pub source: &'a str,
    pub generated_on: NaiveDate,
    pub period_days: i64,
    pub metrics: &'a [SummaryMetric],
    pub buckets: &'a StatusBuckets<'a>,
    pub records: &'a [Record],
}

pub fn build_report(input: &ReportInput<'_>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {} Report", input.screen.title());
    let _ = writeln!(
        output,
        "Generated {} from {} (trends compare the last {} days with the {} before)",
        input.generated_on, input.source, input.period_days, input.period_days
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");

    if input.metrics.is_empty() {
        let _ = writeln!(output, "No metrics configured for this screen.");
    } else {
        for metric in input.metrics {
            let _ = writeln!(
                output,
                "- {}: {} {}",
                metric.label,
                metric.display_value(),
                metric.trend.arrow()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Breakdown");

    let total = input.buckets.total();
    if total == 0 {
        let _ = writeln!(output, "No records in this window.");
    } else {
        for count in input.buckets.counts() {
            let _ = writeln!(
                output,
                "- {}: {} ({}%)",
                count.value,
                count.count,
                percent(count.count, total)
            );
        }
    }

    let recent = most_recent(input.records, input.screen.date_field(), 5);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Recent");

    if recent.is_empty() {
        let _ = writeln!(output, "No dated records in this window.");
    } else {
        for record in recent {
            let _ = write!(
                output,
                "- {} ({}) on {}",
                record_label(record),
                record.str_field(input.screen.status_field()).unwrap_or("no status"),
                record
                    .date_field(input.screen.date_field())
                    .map(|date| date.to_string())
                    .unwrap_or_default()
            );
            match screens::record_score(input.screen, record) {
                Some(score) => {
                    let _ = writeln!(output, ", score {score}%");
                }
                None => {
                    let _ = writeln!(output);
                }
            }
        }
    }

    output
}

/// Aligned plain-text table for terminal output.
pub fn render_metrics(metrics: &[SummaryMetric]) -> String {
    let width = metrics
        .iter()
        .map(|metric| metric.label.chars().count())
        .max()
        .unwrap_or(0);
    let mut output = String::new();
    for metric in metrics {
        let _ = writeln!(
            output,
            "{:<width$}  {:>12} {}",
            metric.label,
            metric.display_value(),
            metric.trend.arrow()
        );
    }
    output
}

pub fn render_buckets(buckets: &StatusBuckets<'_>) -> String {
    let width = buckets
        .iter()
        .map(|(value, _)| value.chars().count())
        .max()
        .unwrap_or(0);
    let mut output = String::new();
    for count in buckets.counts() {
        let _ = writeln!(output, "{:<width$}  {:>5}", count.value, count.count);
    }
    let _ = writeln!(output, "{:<width$}  {:>5}", "total", buckets.total());
    output
}

pub fn render_lookahead(days: &[DayColumn<'_>], summary: &LookaheadSummary) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{} activities, {} ready, {} in progress, {} open constraints, {}% average readiness",
        summary.total,
        summary.ready,
        summary.in_progress,
        summary.open_constraints,
        summary.average_readiness
    );

    for day in days {
        let _ = writeln!(output);
        let _ = writeln!(output, "{} {}", day.date.format("%a"), day.date);
        if day.activities.is_empty() {
            let _ = writeln!(output, "  (nothing scheduled)");
        }
        for activity in &day.activities {
            let _ = writeln!(
                output,
                "  - {} [{}] readiness {}%, {} open constraint(s)",
                record_label(activity),
                activity.str_field("status").unwrap_or("planned"),
                lookahead::readiness(activity),
                lookahead::open_constraints(activity)
            );
        }
    }

    output
}
