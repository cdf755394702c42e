use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info};

mod aggregate;
mod bucket;
mod checklist;
mod clock;
mod config;
mod db;
mod error;
mod fetch;
mod logging;
mod lookahead;
mod models;
mod refresh;
mod report;
mod screens;

use crate::clock::{Clock, FixedClock, SystemClock};
use crate::config::{Settings, SourceArgs};
use crate::error::ConfigError;
use crate::fetch::RecordSource;
use crate::models::Record;
use crate::refresh::{Poller, RefreshJob};
use crate::screens::Screen;

#[derive(Parser)]
#[command(name = "fieldforge-metrics")]
#[command(about = "Dashboard metrics, status breakdowns and checklist scores for FieldForge", long_about = None)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Evaluate date rules as of this day (YYYY-MM-DD) instead of today
    #[arg(long, global = true)]
    today: Option<NaiveDate>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a screen's summary metrics
    Summary {
        #[arg(long, value_enum)]
        screen: Screen,
        /// Compare the last N days with the N days before to get trends
        #[arg(long, value_parser = period_days_range())]
        period_days: Option<i64>,
        /// Change in matching records needed before a trend moves off stable
        #[arg(long, default_value_t = 0)]
        threshold: usize,
        #[arg(long)]
        json: bool,
    },
    /// Count records per status (or any other field)
    Buckets {
        #[arg(long, value_enum)]
        screen: Screen,
        #[arg(long)]
        field: Option<String>,
        /// Declared values, comma separated; defaults to the screen's statuses
        #[arg(long, value_delimiter = ',')]
        values: Option<Vec<String>>,
        /// Collect undeclared values under this label instead of failing
        #[arg(long, conflicts_with = "discard_unknown")]
        other: Option<String>,
        /// Leave records with undeclared values out instead of failing
        #[arg(long)]
        discard_unknown: bool,
        #[arg(long)]
        json: bool,
    },
    /// Score a JSON checklist
    Score {
        #[arg(long)]
        checklist: PathBuf,
    },
    /// Show a week of the three-week lookahead board
    Lookahead {
        /// Weeks from the current one (0, 1 or 2)
        #[arg(long, default_value_t = 0)]
        week: i64,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, value_enum)]
        screen: Screen,
        #[arg(long, default_value_t = 30, value_parser = period_days_range())]
        period_days: i64,
        #[arg(long, default_value_t = 0)]
        threshold: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Re-fetch a screen on an interval until interrupted
    Watch {
        #[arg(long, value_enum)]
        screen: Screen,
        /// Seconds between refreshes
        #[arg(long, default_value_t = 60)]
        interval: u64,
        /// Postgres NOTIFY channel that triggers an immediate refresh
        #[arg(long)]
        channel: Option<String>,
        /// Show trends against the N days before the last N days
        #[arg(long, value_parser = period_days_range())]
        period_days: Option<i64>,
        #[arg(long, default_value_t = 0)]
        threshold: usize,
    },
    /// Fetch every screen once and report what came back
    Check,
}

/// Trend windows from one day up to a century.
fn period_days_range() -> clap::builder::RangedI64ValueParser<i64> {
    clap::value_parser!(i64).range(1..=36_500)
}

async fn fetch_screen(source: &dyn RecordSource, screen: Screen) -> anyhow::Result<Vec<Record>> {
    match source.fetch(screen).await {
        Ok(records) => Ok(records),
        Err(err) if err.is_unauthorized() => Err(err).context(format!(
            "{} rejected the credentials; check FIELDFORGE_TOKEN",
            source.describe()
        )),
        Err(err) => Err(err).context(format!("failed to fetch {screen} from {}", source.describe())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;
    let clock: Arc<dyn Clock> = match cli.today {
        Some(day) => Arc::new(FixedClock::on(day)),
        None => Arc::new(SystemClock),
    };

    if let Commands::Score { checklist: path } = &cli.command {
        let items = config::load_checklist(path)?;
        let score = checklist::score(&items);
        let counted = items
            .iter()
            .filter(|item| item.state != checklist::ChecklistState::NotApplicable && item.weight > 0)
            .count();
        println!("Score {score}% across {counted} of {} items.", items.len());
        return Ok(());
    }

    let settings = Settings::from_args(&cli.source)?;
    let opened = settings.source.open().await?;
    let source = opened.source;
    info!(target: "fieldforge::cli", source = %source.describe(), "source ready");

    match cli.command {
        Commands::Score { .. } => {}
        Commands::Summary {
            screen,
            period_days,
            threshold,
            json,
        } => {
            let rules = settings.rules_for(screen)?;
            let records = fetch_screen(source.as_ref(), screen).await?;
            let metrics = match period_days {
                Some(period_days) => {
                    let periods = aggregate::split_periods(
                        &records,
                        screen.date_field(),
                        period_days,
                        clock.as_ref(),
                    );
                    aggregate::aggregate_with_trend(
                        &periods.current,
                        &periods.previous,
                        &rules,
                        threshold,
                        clock.as_ref(),
                    )
                }
                None => aggregate::aggregate(&records, &rules, clock.as_ref()),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            } else {
                println!("{} ({} records)", screen.title(), records.len());
                print!("{}", report::render_metrics(&metrics));
            }
        }
        Commands::Buckets {
            screen,
            field,
            values,
            other,
            discard_unknown,
            json,
        } => {
            let records = fetch_screen(source.as_ref(), screen).await?;
            let field = field.unwrap_or_else(|| screen.status_field().to_string());
            let declared: Vec<&str> = match &values {
                Some(values) => values.iter().map(String::as_str).collect(),
                None => screen.statuses().to_vec(),
            };

            let buckets = match (bucket::bucket(&records, &field, &declared), other) {
                (Ok(buckets), _) => buckets,
                (Err(unknown), Some(label)) => unknown.into_with_other(&label),
                (Err(unknown), None) if discard_unknown => unknown.discard_unknown(),
                (Err(unknown), None) => bail!(
                    "{unknown} (pass --other LABEL or --discard-unknown to continue)"
                ),
            };

            if json {
                let body = json!({ "field": buckets.field(), "counts": buckets.counts() });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                print!("{}", report::render_buckets(&buckets));
            }
        }
        Commands::Lookahead { week, json } => {
            let activities = fetch_screen(source.as_ref(), Screen::Lookahead).await?;
            let window = lookahead::week_window(clock.today(), week.clamp(0, 2));
            let visible = lookahead::in_window(&activities, &window);
            let days = lookahead::group_by_day(&visible, &window);
            let summary = lookahead::summarize(&visible);

            if json {
                let body = json!({ "summary": summary, "days": days });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("Week of {}", window[0]);
                print!("{}", report::render_lookahead(&days, &summary));
            }
        }
        Commands::Report {
            screen,
            period_days,
            threshold,
            out,
        } => {
            let rules = settings.rules_for(screen)?;
            let records = fetch_screen(source.as_ref(), screen).await?;
            let periods =
                aggregate::split_periods(&records, screen.date_field(), period_days, clock.as_ref());
            let metrics = aggregate::aggregate_with_trend(
                &periods.current,
                &periods.previous,
                &rules,
                threshold,
                clock.as_ref(),
            );
            let buckets = bucket::bucket(&periods.current, screen.status_field(), screen.statuses())
                .unwrap_or_else(|unknown| unknown.into_with_other("other"));

            let report = report::build_report(&report::ReportInput {
                screen,
                source: &source.describe(),
                generated_on: clock.today(),
                period_days,
                metrics: &metrics,
                buckets: &buckets,
                records: &periods.current,
            });
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Watch {
            screen,
            interval,
            channel,
            period_days,
            threshold,
        } => {
            let listener = match (&channel, &opened.pool) {
                (None, _) => None,
                (Some(channel), Some(pool)) => Some(db::listen(pool, channel).await?),
                (Some(_), None) => return Err(ConfigError::RealtimeNeedsPostgres.into()),
            };

            let mut job = RefreshJob::new(
                source.clone(),
                clock.clone(),
                screen,
                settings.rules_for(screen)?,
            );
            if let Some(period_days) = period_days {
                job = job.with_trends(period_days, threshold);
            }
            let poller = Poller::spawn(
                job,
                Duration::from_secs(interval.max(1)),
                listener,
                move |outcome| match outcome {
                    Ok(snapshot) => {
                        println!(
                            "{} at {} ({} records)",
                            snapshot.screen.title(),
                            snapshot.fetched_at.format("%H:%M:%S"),
                            snapshot.records.len()
                        );
                        print!("{}", report::render_metrics(&snapshot.metrics));
                    }
                    Err(err) => error!(target: "fieldforge::cli", %screen, error = %err, "refresh failed"),
                },
            );

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            info!(target: "fieldforge::cli", "stopping");
            poller.shutdown().await;
        }
        Commands::Check => {
            let mut failures = 0usize;
            for screen in Screen::ALL {
                match source.fetch(screen).await {
                    Ok(records) => println!("ok    {:<12} {} records", screen.name(), records.len()),
                    Err(err) => {
                        failures += 1;
                        println!("FAIL  {:<12} {err}", screen.name());
                    }
                }
            }
            if failures > 0 {
                bail!("{failures} of {} screens failed", Screen::ALL.len());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_days_outside_a_century_are_rejected() {
        for days in ["0", "-3", "36501", "9223372036854775807"] {
            let parsed = Cli::try_parse_from([
                "fieldforge-metrics",
                "summary",
                "--screen",
                "incidents",
                "--period-days",
                days,
            ]);
            assert!(parsed.is_err(), "accepted --period-days {days}");
        }
    }

    #[test]
    fn watch_accepts_a_trend_window() {
        let cli = Cli::try_parse_from([
            "fieldforge-metrics",
            "watch",
            "--screen",
            "permits",
            "--period-days",
            "7",
            "--threshold",
            "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Watch {
                period_days,
                threshold,
                ..
            } => {
                assert_eq!(period_days, Some(7));
                assert_eq!(threshold, 2);
            }
            _ => panic!("expected watch"),
        }
    }
}
