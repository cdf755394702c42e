//! Periodic and notification-driven re-fetching of a screen.
//!
//! A [`Poller`] owns its background task. Dropping it cancels the task and
//! any fetch still in flight; [`Poller::shutdown`] does the same but waits
//! for the task to finish.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate, aggregate_with_trend, split_periods, ClassificationRule};
use crate::clock::Clock;
use crate::error::FetchError;
use crate::fetch::RecordSource;
use crate::models::{Record, SummaryMetric};
use crate::screens::Screen;

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub screen: Screen,
    pub fetched_at: DateTime<Utc>,
    pub records: Vec<Record>,
    pub metrics: Vec<SummaryMetric>,
}

/// One screen's fetch-then-aggregate pipeline.
pub struct RefreshJob {
    source: Arc<dyn RecordSource>,
    clock: Arc<dyn Clock>,
    screen: Screen,
    rules: Vec<ClassificationRule>,
    trend_window: Option<(i64, usize)>,
}

impl RefreshJob {
    pub fn new(
        source: Arc<dyn RecordSource>,
        clock: Arc<dyn Clock>,
        screen: Screen,
        rules: Vec<ClassificationRule>,
    ) -> Self {
        Self {
            source,
            clock,
            screen,
            rules,
            trend_window: None,
        }
    }

    /// Computes metrics over the last `period_days` and trends against the
    /// period before, instead of over every fetched record.
    pub fn with_trends(mut self, period_days: i64, threshold: usize) -> Self {
        self.trend_window = Some((period_days, threshold));
        self
    }

    pub async fn run_once(&self) -> Result<Snapshot, FetchError> {
        let records = self.source.fetch(self.screen).await?;
        let clock = self.clock.as_ref();
        let metrics = match self.trend_window {
            Some((period_days, threshold)) => {
                let periods = split_periods(&records, self.screen.date_field(), period_days, clock);
                aggregate_with_trend(&periods.current, &periods.previous, &self.rules, threshold, clock)
            }
            None => aggregate(&records, &self.rules, clock),
        };
        info!(
            target: "fieldforge::refresh",
            screen = %self.screen,
            records = records.len(),
            metrics = metrics.len(),
            "snapshot refreshed"
        );
        Ok(Snapshot {
            screen: self.screen,
            fetched_at: self.clock.now(),
            records,
            metrics,
        })
    }
}

enum Event {
    Stop,
    Tick,
    Notified(Result<String, sqlx::Error>),
}

async fn next_notification(listener: Option<&mut PgListener>) -> Result<String, sqlx::Error> {
    match listener {
        Some(listener) => listener
            .recv()
            .await
            .map(|notification| notification.channel().to_string()),
        None => std::future::pending().await,
    }
}

pub struct Poller {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    /// Runs `job` immediately, then on every `interval` tick and on every
    /// notification from `listener`. Each outcome goes to `on_snapshot`.
    /// Ticks missed while a fetch is running are skipped, not queued.
    pub fn spawn<F>(
        job: RefreshJob,
        interval: Duration,
        mut listener: Option<PgListener>,
        mut on_snapshot: F,
    ) -> Self
    where
        F: FnMut(Result<Snapshot, FetchError>) + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.child_token();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                let event = tokio::select! {
                    _ = child.cancelled() => Event::Stop,
                    _ = ticker.tick() => Event::Tick,
                    notification = next_notification(listener.as_mut()) => Event::Notified(notification),
                };

                match event {
                    Event::Stop => break,
                    Event::Tick => debug!(target: "fieldforge::refresh", screen = %job.screen, "poll tick"),
                    Event::Notified(Ok(channel)) => {
                        debug!(target: "fieldforge::refresh", screen = %job.screen, %channel, "change notification")
                    }
                    Event::Notified(Err(err)) => {
                        warn!(
                            target: "fieldforge::refresh",
                            screen = %job.screen,
                            error = %err,
                            "realtime subscription lost, continuing with polling only"
                        );
                        listener = None;
                        continue;
                    }
                }

                let outcome = tokio::select! {
                    _ = child.cancelled() => None,
                    outcome = job.run_once() => Some(outcome),
                };
                let Some(outcome) = outcome else {
                    break;
                };
                on_snapshot(outcome);
            }

            debug!(target: "fieldforge::refresh", screen = %job.screen, "poller stopped");
        });

        Self {
            token,
            task: Some(task),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancels the loop and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                if err.is_panic() {
                    warn!(target: "fieldforge::refresh", error = %err, "poller task panicked");
                }
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
