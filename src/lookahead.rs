//! Three-week lookahead board: activities laid out over a Sunday-start week,
//! with per-activity readiness and open constraints.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use serde_json::Value;

use crate::aggregate::round_half_up;
use crate::checklist::{self, ChecklistItem, ChecklistState};
use crate::models::Record;

const READINESS_FLAGS: [(&str, &str); 3] = [
    ("resources_confirmed", "Resources confirmed"),
    ("safety_reviewed", "Safety reviewed"),
    ("permits_obtained", "Permits obtained"),
];

pub fn week_window(today: NaiveDate, week_offset: i64) -> [NaiveDate; 7] {
    let start = today - Duration::days(i64::from(today.weekday().num_days_from_sunday()))
        + Duration::weeks(week_offset);
    std::array::from_fn(|day| start + Duration::days(day as i64))
}

fn span(activity: &Record) -> Option<(NaiveDate, NaiveDate)> {
    let start = activity.date_field("start_date")?;
    let end = activity.date_field("end_date").unwrap_or(start);
    Some((start, end))
}

/// Activities whose start..end range overlaps the window. Activities without a
/// readable start date are left out.
pub fn in_window<'a>(activities: &'a [Record], window: &[NaiveDate; 7]) -> Vec<&'a Record> {
    let (first, last) = (window[0], window[6]);
    activities
        .iter()
        .filter(|activity| {
            span(activity).is_some_and(|(start, end)| start <= last && end >= first)
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct DayColumn<'a> {
    pub date: NaiveDate,
    pub activities: Vec<&'a Record>,
}

pub fn group_by_day<'a>(activities: &[&'a Record], window: &[NaiveDate; 7]) -> Vec<DayColumn<'a>> {
    window
        .iter()
        .map(|date| DayColumn {
            date: *date,
            activities: activities
                .iter()
                .copied()
                .filter(|activity| {
                    span(activity).is_some_and(|(start, end)| start <= *date && end >= *date)
                })
                .collect(),
        })
        .collect()
}

pub fn readiness(activity: &Record) -> u8 {
    let items: Vec<ChecklistItem> = READINESS_FLAGS
        .iter()
        .map(|(field, label)| {
            ChecklistItem::new(label, ChecklistState::from_json(activity.get(field)))
        })
        .collect();
    checklist::score(&items)
}

/// Constraints not marked resolved. Bare strings have no resolved flag and
/// count as open.
pub fn open_constraints(activity: &Record) -> usize {
    activity
        .array_field("constraints")
        .map(|constraints| {
            constraints
                .iter()
                .filter(|constraint| match constraint {
                    Value::Object(fields) => fields.get("resolved") != Some(&Value::Bool(true)),
                    _ => true,
                })
                .count()
        })
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LookaheadSummary {
    pub total: usize,
    pub ready: usize,
    pub in_progress: usize,
    pub open_constraints: usize,
    pub average_readiness: u8,
}

pub fn summarize(activities: &[&Record]) -> LookaheadSummary {
    let with_status = |status: &str| {
        activities
            .iter()
            .filter(|activity| activity.str_field("status") == Some(status))
            .count()
    };
    let average_readiness = if activities.is_empty() {
        0
    } else {
        let total: u32 = activities.iter().map(|activity| u32::from(readiness(activity))).sum();
        round_half_up(f64::from(total) / activities.len() as f64) as u8
    };

    LookaheadSummary {
        total: activities.len(),
        ready: with_status("ready"),
        in_progress: with_status("in_progress"),
        open_constraints: activities.iter().map(|activity| open_constraints(activity)).sum(),
        average_readiness,
    }
}
