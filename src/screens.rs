use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;

use crate::aggregate::{ClassificationRule, Predicate, Reducer};
use crate::checklist::{self, ChecklistItem, ChecklistState};
use crate::models::Record;

/// The FieldForge dashboards whose summary cards this tool reproduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Incidents,
    Permits,
    Inspections,
    Equipment,
    Receipts,
    Crews,
    Outages,
    Lookahead,
    Projects,
    Documents,
    Briefings,
}

impl Screen {
    pub const ALL: [Screen; 11] = [
        Screen::Incidents,
        Screen::Permits,
        Screen::Inspections,
        Screen::Equipment,
        Screen::Receipts,
        Screen::Crews,
        Screen::Outages,
        Screen::Lookahead,
        Screen::Projects,
        Screen::Documents,
        Screen::Briefings,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Screen::Incidents => "incidents",
            Screen::Permits => "permits",
            Screen::Inspections => "inspections",
            Screen::Equipment => "equipment",
            Screen::Receipts => "receipts",
            Screen::Crews => "crews",
            Screen::Outages => "outages",
            Screen::Lookahead => "lookahead",
            Screen::Projects => "projects",
            Screen::Documents => "documents",
            Screen::Briefings => "briefings",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Screen::Incidents => "Safety Incidents",
            Screen::Permits => "Work Permits",
            Screen::Inspections => "QA/QC Inspections",
            Screen::Equipment => "Equipment Hub",
            Screen::Receipts => "Receipts",
            Screen::Crews => "Crew Management",
            Screen::Outages => "Outage Coordination",
            Screen::Lookahead => "Three-Week Lookahead",
            Screen::Projects => "Projects",
            Screen::Documents => "Document Hub",
            Screen::Briefings => "Safety Briefings",
        }
    }

    pub fn endpoint(self) -> &'static str {
        match self {
            Screen::Incidents => "/api/safety/incidents",
            Screen::Permits => "/api/safety/permits",
            Screen::Inspections => "/api/qaqc/inspections",
            Screen::Equipment => "/api/equipment",
            Screen::Receipts => "/api/receipts",
            Screen::Crews => "/api/crews/list",
            Screen::Outages => "/api/outages",
            Screen::Lookahead => "/api/scheduling/three-week",
            Screen::Projects => "/api/projects",
            Screen::Documents => "/api/documents",
            Screen::Briefings => "/api/safety/briefings",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Screen::Incidents => "safety_incidents",
            Screen::Permits => "work_permits",
            Screen::Inspections => "inspections",
            Screen::Equipment => "equipment_inventory",
            Screen::Receipts => "receipts",
            Screen::Crews => "crews",
            Screen::Outages => "outage_coordination",
            Screen::Lookahead => "lookahead_activities",
            Screen::Projects => "projects",
            Screen::Documents => "documents",
            Screen::Briefings => "safety_briefings",
        }
    }

    /// Key an API response may wrap its array under, besides `data`.
    pub fn collection_key(self) -> &'static str {
        match self {
            Screen::Lookahead => "activities",
            other => other.name(),
        }
    }

    /// Field the status breakdown groups by. Documents have no workflow
    /// status and are broken down by type instead.
    pub fn status_field(self) -> &'static str {
        match self {
            Screen::Documents => "type",
            _ => "status",
        }
    }

    pub fn statuses(self) -> &'static [&'static str] {
        match self {
            Screen::Incidents => &["open", "investigating", "resolved", "closed"],
            Screen::Permits => &["draft", "pending", "approved", "active", "expired", "closed"],
            Screen::Inspections => &["scheduled", "in_progress", "completed", "cancelled", "failed"],
            Screen::Equipment => &["available", "in use", "maintenance", "retired"],
            Screen::Receipts => &["pending", "processing", "approved", "rejected"],
            Screen::Crews => &["active", "inactive", "on_break"],
            Screen::Outages => &["planned", "active", "completed", "cancelled"],
            Screen::Lookahead => &["planned", "ready", "in_progress", "completed", "delayed"],
            Screen::Projects => &["planning", "active", "on_hold", "completed"],
            Screen::Documents => &["drawing", "report", "permit", "spec", "photo", "other"],
            Screen::Briefings => &["scheduled", "in_progress", "completed", "cancelled"],
        }
    }

    /// Field used to place records into reporting periods.
    pub fn date_field(self) -> &'static str {
        match self {
            Screen::Incidents => "incident_date",
            Screen::Permits => "start_date",
            Screen::Inspections => "scheduled_date",
            Screen::Equipment => "last_maintenance_date",
            Screen::Receipts => "receipt_date",
            Screen::Crews => "created_at",
            Screen::Outages => "start_time",
            Screen::Lookahead => "start_date",
            Screen::Projects => "start_date",
            Screen::Documents => "created_at",
            Screen::Briefings => "date",
        }
    }

    pub fn rules(self) -> Vec<ClassificationRule> {
        match self {
            Screen::Incidents => incident_rules(),
            Screen::Permits => permit_rules(),
            Screen::Inspections => inspection_rules(),
            Screen::Equipment => equipment_rules(),
            Screen::Receipts => receipt_rules(),
            Screen::Crews => crew_rules(),
            Screen::Outages => outage_rules(),
            Screen::Lookahead => lookahead_rules(),
            Screen::Projects => project_rules(),
            Screen::Documents => document_rules(),
            Screen::Briefings => briefing_rules(),
        }
    }
}

impl std::fmt::Display for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn status(value: &str) -> Predicate {
    Predicate::equals("status", value)
}

fn incident_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::count("total", "Total incidents"),
        ClassificationRule::count("open", "Open").when(status("open")),
        ClassificationRule::count("critical", "Critical").when(Predicate::equals("severity", "critical")),
        ClassificationRule::count("near_misses", "Near misses")
            .when(Predicate::equals("incident_type", "Near Miss")),
        ClassificationRule::count("lost_time", "Lost time injuries")
            .when(Predicate::equals("incident_type", "Lost Time Injury")),
        ClassificationRule::new("resolved_rate", "Resolved", Reducer::PercentOfTotal)
            .when(Predicate::one_of("status", ["resolved", "closed"])),
        ClassificationRule::new(
            "days_since_last",
            "Days since last incident",
            Reducer::DaysSinceLatest {
                field: "incident_date".into(),
            },
        ),
        ClassificationRule::new(
            "most_common_type",
            "Most common type",
            Reducer::Mode {
                field: "incident_type".into(),
            },
        ),
    ]
}

fn permit_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::count("active", "Active permits").when(status("active")),
        ClassificationRule::count("pending", "Pending approval").when(status("pending")),
        ClassificationRule::count("high_risk_active", "High risk active")
            .when(status("active").and(Predicate::equals("risk_level", "high"))),
        ClassificationRule::count("expiring_today", "Expiring today").when(status("active").and(
            Predicate::OnDate {
                field: "end_date".into(),
                offset_days: 0,
            },
        )),
        ClassificationRule::new("compliance", "Permit compliance", Reducer::PercentOfTotal)
            .when(status("active")),
    ]
}

fn inspection_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::count("total", "Total inspections"),
        ClassificationRule::count("scheduled", "Scheduled").when(status("scheduled")),
        ClassificationRule::count("completed", "Completed").when(status("completed")),
        ClassificationRule::count("failed", "Failed").when(Predicate::equals("result", "fail")),
        ClassificationRule::new(
            "pass_rate",
            "Pass rate",
            Reducer::PercentOf {
                base: status("completed"),
            },
        )
        .when(Predicate::equals("result", "pass")),
    ]
}

fn equipment_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::count("total", "Total equipment"),
        ClassificationRule::count("available", "Available").when(status("available")),
        ClassificationRule::count("maintenance", "In maintenance").when(status("maintenance")),
        ClassificationRule::count("due_service", "Due service")
            .when(Predicate::due_within("next_maintenance_date", 7)),
        ClassificationRule::new(
            "usage_hours",
            "Usage hours",
            Reducer::Sum {
                field: "usage_hours".into(),
            },
        )
        .unit("h"),
    ]
}

fn receipt_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::count("total", "Receipts"),
        ClassificationRule::count("pending", "Pending").when(status("pending")),
        ClassificationRule::count("approved", "Approved").when(status("approved")),
        ClassificationRule::new(
            "total_amount",
            "Total amount",
            Reducer::Sum {
                field: "total_amount".into(),
            },
        )
        .unit("USD"),
        ClassificationRule::new(
            "average_amount",
            "Average amount",
            Reducer::Average {
                field: "total_amount".into(),
            },
        )
        .unit("USD"),
    ]
}

fn crew_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::count("crews", "Crews"),
        ClassificationRule::new(
            "active_members",
            "Active members",
            Reducer::Sum {
                field: "active_members".into(),
            },
        ),
        ClassificationRule::count("unassigned", "Unassigned crews")
            .when(Predicate::absent("current_project_name")),
        ClassificationRule::new(
            "average_size",
            "Average crew size",
            Reducer::Average {
                field: "active_members".into(),
            },
        ),
    ]
}

fn outage_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::count("planned", "Planned").when(status("planned")),
        ClassificationRule::count("active", "In progress").when(status("active")),
        ClassificationRule::count("critical", "Critical impact")
            .when(Predicate::equals("impact_level", "critical")),
        ClassificationRule::new(
            "affected_customers",
            "Affected customers",
            Reducer::Sum {
                field: "affected_customers".into(),
            },
        ),
        ClassificationRule::new(
            "crews_required",
            "Crews required",
            Reducer::Sum {
                field: "crews_required".into(),
            },
        ),
    ]
}

fn lookahead_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::count("total", "Activities"),
        ClassificationRule::count("ready", "Ready").when(status("ready")),
        ClassificationRule::count("in_progress", "In progress").when(status("in_progress")),
        ClassificationRule::count("delayed", "Delayed").when(status("delayed")),
        ClassificationRule::count("safety_reviewed", "Safety reviewed")
            .when(Predicate::truthy("safety_reviewed")),
        ClassificationRule::new(
            "crew_demand",
            "Crew demand",
            Reducer::Sum {
                field: "crew_size".into(),
            },
        ),
    ]
}

fn project_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::count("total", "Projects"),
        ClassificationRule::count("active", "Active").when(status("active")),
        ClassificationRule::count("completed", "Completed").when(status("completed")),
        ClassificationRule::new(
            "budget",
            "Total budget",
            Reducer::Sum {
                field: "budget".into(),
            },
        )
        .unit("USD"),
        ClassificationRule::new(
            "spent",
            "Total spent",
            Reducer::Sum {
                field: "spent".into(),
            },
        )
        .unit("USD"),
        ClassificationRule::new(
            "average_progress",
            "Average progress",
            Reducer::Average {
                field: "progress".into(),
            },
        )
        .unit("%"),
    ]
}

fn document_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::count("total", "Total documents"),
        ClassificationRule::new(
            "total_size",
            "Total size",
            Reducer::Sum {
                field: "size".into(),
            },
        )
        .unit("bytes"),
        ClassificationRule::new(
            "downloads",
            "Total downloads",
            Reducer::Sum {
                field: "download_count".into(),
            },
        ),
        ClassificationRule::count("drawings", "Drawings").when(Predicate::equals("type", "drawing")),
        ClassificationRule::count("shared", "Shared").when(Predicate::truthy("is_public")),
    ]
}

fn briefing_rules() -> Vec<ClassificationRule> {
    // On or before today, and after the day eight days back.
    let last_seven_days = Predicate::due_within("date", 0).and(Predicate::Not {
        predicate: Box::new(Predicate::due_within("date", -8)),
    });
    vec![
        ClassificationRule::count("total", "Briefings"),
        ClassificationRule::count("completed", "Completed").when(status("completed")),
        ClassificationRule::count("this_week", "This week").when(last_seven_days),
        ClassificationRule::new("training_compliance", "Training compliance", Reducer::PercentOfTotal)
            .when(status("completed")),
    ]
}

/// Per-record checklist score shown next to each record, for the screens that
/// carry one.
pub fn record_score(screen: Screen, record: &Record) -> Option<u8> {
    match screen {
        Screen::Inspections => Some(inspection_quality(record)),
        Screen::Outages => Some(switching_progress(record)),
        Screen::Lookahead => Some(crate::lookahead::readiness(record)),
        _ => None,
    }
}

/// Share of an outage's switching steps marked completed.
pub fn switching_progress(outage: &Record) -> u8 {
    let steps: Vec<ChecklistItem> = outage
        .array_field("switching_steps")
        .map(|steps| {
            steps
                .iter()
                .map(|step| {
                    ChecklistItem::new(
                        step.get("description").and_then(Value::as_str).unwrap_or(""),
                        ChecklistState::from_json(step.get("completed")),
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    checklist::score(&steps)
}

/// Quality score of an inspection from its `checklist_items[].result`.
pub fn inspection_quality(inspection: &Record) -> u8 {
    let items: Vec<ChecklistItem> = inspection
        .array_field("checklist_items")
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    ChecklistItem::new(
                        item.get("item").and_then(Value::as_str).unwrap_or(""),
                        ChecklistState::from_json(item.get("result")),
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    checklist::score(&items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::bucket::bucket;
    use crate::clock::FixedClock;
    use crate::models::{record, MetricValue};
    use chrono::NaiveDate;
    use serde_json::json;

    fn clock() -> FixedClock {
        FixedClock::on(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap())
    }

    fn value_of(metrics: &[crate::models::SummaryMetric], key: &str) -> MetricValue {
        metrics
            .iter()
            .find(|metric| metric.key == key)
            .map(|metric| metric.value.clone())
            .unwrap_or_else(|| panic!("missing metric {key}"))
    }

    #[test]
    fn every_screen_has_unique_rule_keys() {
        for screen in Screen::ALL {
            let rules = screen.rules();
            assert!(!rules.is_empty(), "{screen}");
            let mut keys: Vec<&str> = rules.iter().map(|rule| rule.key.as_str()).collect();
            keys.sort_unstable();
            keys.dedup();
            assert_eq!(keys.len(), rules.len(), "{screen}");
        }
    }

    #[test]
    fn every_screen_aggregates_empty_input_to_neutral_values() {
        for screen in Screen::ALL {
            for metric in aggregate(&[], &screen.rules(), &clock()) {
                match metric.value {
                    MetricValue::Integer(value) => assert_eq!(value, 0, "{screen}/{}", metric.key),
                    MetricValue::Text(text) => assert!(text.is_empty()),
                    MetricValue::Decimal(value) => panic!("{screen}/{} gave {value}", metric.key),
                }
            }
        }
    }

    #[test]
    fn incident_screen_summary() {
        let incidents = vec![
            record(json!({ "status": "open", "severity": "critical", "incident_type": "Near Miss", "incident_date": "2026-03-01" })),
            record(json!({ "status": "open", "severity": "low", "incident_type": "Near Miss", "incident_date": "2026-03-08" })),
            record(json!({ "status": "resolved", "severity": "medium", "incident_type": "First Aid", "incident_date": "2026-02-20" })),
        ];
        let metrics = aggregate(&incidents, &Screen::Incidents.rules(), &clock());
        assert_eq!(value_of(&metrics, "open"), MetricValue::Integer(2));
        assert_eq!(value_of(&metrics, "critical"), MetricValue::Integer(1));
        assert_eq!(value_of(&metrics, "resolved_rate"), MetricValue::Integer(33));
        assert_eq!(value_of(&metrics, "days_since_last"), MetricValue::Integer(2));
        assert_eq!(
            value_of(&metrics, "most_common_type"),
            MetricValue::Text("Near Miss".into())
        );
    }

    #[test]
    fn permits_expiring_today_must_be_active() {
        let permits = vec![
            record(json!({ "status": "active", "end_date": "2026-03-10", "risk_level": "high" })),
            record(json!({ "status": "closed", "end_date": "2026-03-10" })),
            record(json!({ "status": "active", "end_date": "2026-03-11" })),
        ];
        let metrics = aggregate(&permits, &Screen::Permits.rules(), &clock());
        assert_eq!(value_of(&metrics, "expiring_today"), MetricValue::Integer(1));
        assert_eq!(value_of(&metrics, "high_risk_active"), MetricValue::Integer(1));
        assert_eq!(value_of(&metrics, "compliance"), MetricValue::Integer(67));
    }

    #[test]
    fn equipment_due_service_includes_overdue() {
        let equipment = vec![
            record(json!({ "status": "available", "next_maintenance_date": "2026-03-02", "usage_hours": 120 })),
            record(json!({ "status": "in use", "next_maintenance_date": "2026-03-16", "usage_hours": 40.5 })),
            record(json!({ "status": "maintenance", "next_maintenance_date": "2026-04-30" })),
            record(json!({ "status": "available" })),
        ];
        let metrics = aggregate(&equipment, &Screen::Equipment.rules(), &clock());
        assert_eq!(value_of(&metrics, "due_service"), MetricValue::Integer(2));
        assert_eq!(value_of(&metrics, "usage_hours"), MetricValue::Decimal(160.5));
        let buckets = bucket(&equipment, "status", Screen::Equipment.statuses()).unwrap();
        assert_eq!(buckets.count("in use"), 1);
    }

    #[test]
    fn crews_without_project_are_unassigned() {
        let crews = vec![
            record(json!({ "active_members": 6, "current_project_name": "Line 4 rebuild" })),
            record(json!({ "active_members": 3, "current_project_name": null })),
            record(json!({ "active_members": 4 })),
        ];
        let metrics = aggregate(&crews, &Screen::Crews.rules(), &clock());
        assert_eq!(value_of(&metrics, "unassigned"), MetricValue::Integer(2));
        assert_eq!(value_of(&metrics, "active_members"), MetricValue::Integer(13));
        assert_eq!(value_of(&metrics, "average_size"), MetricValue::Integer(4));
    }

    #[test]
    fn document_hub_totals_size_and_downloads() {
        let documents = vec![
            record(json!({ "type": "drawing", "size": 2048, "download_count": 3, "is_public": true })),
            record(json!({ "type": "report", "size": 512, "download_count": 0, "is_public": false })),
            record(json!({ "type": "photo", "size": 1024, "download_count": 7 })),
        ];
        let metrics = aggregate(&documents, &Screen::Documents.rules(), &clock());
        assert_eq!(value_of(&metrics, "total"), MetricValue::Integer(3));
        assert_eq!(value_of(&metrics, "total_size"), MetricValue::Integer(3584));
        assert_eq!(value_of(&metrics, "downloads"), MetricValue::Integer(10));
        assert_eq!(value_of(&metrics, "drawings"), MetricValue::Integer(1));
        assert_eq!(value_of(&metrics, "shared"), MetricValue::Integer(1));

        let by_type = bucket(
            &documents,
            Screen::Documents.status_field(),
            Screen::Documents.statuses(),
        )
        .unwrap();
        assert_eq!(by_type.count("drawing"), 1);
        assert_eq!(by_type.total(), 3);
    }

    #[test]
    fn briefing_training_compliance_is_completed_share() {
        let briefings = vec![
            record(json!({ "status": "completed", "date": "2026-03-09" })),
            record(json!({ "status": "completed", "date": "2026-03-03" })),
            record(json!({ "status": "scheduled", "date": "2026-03-02" })),
            record(json!({ "status": "scheduled", "date": "2026-03-12" })),
        ];
        let metrics = aggregate(&briefings, &Screen::Briefings.rules(), &clock());
        assert_eq!(value_of(&metrics, "completed"), MetricValue::Integer(2));
        assert_eq!(value_of(&metrics, "training_compliance"), MetricValue::Integer(50));
        assert_eq!(value_of(&metrics, "this_week"), MetricValue::Integer(2));
    }

    #[test]
    fn switching_progress_counts_completed_steps() {
        let outage = record(json!({
            "switching_steps": [
                { "sequence": 1, "description": "Open breaker 52-1", "completed": true },
                { "sequence": 2, "description": "Rack out breaker", "completed": true },
                { "sequence": 3, "description": "Apply grounds", "completed": false }
            ]
        }));
        assert_eq!(switching_progress(&outage), 67);
        assert_eq!(switching_progress(&record(json!({}))), 0);
    }

    #[test]
    fn inspection_quality_skips_not_applicable_items() {
        let inspection = record(json!({
            "checklist_items": [
                { "item": "Torque marks", "result": "pass" },
                { "item": "Grounding", "result": "fail" },
                { "item": "Oil level", "result": "na" },
                { "item": "Nameplate", "result": "pass" }
            ]
        }));
        assert_eq!(inspection_quality(&inspection), 67);
    }
}
