use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::FetchError;
use crate::fetch::RecordSource;
use crate::models::Record;
use crate::screens::Screen;

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

/// Optional tenant and project filters applied to every query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scope {
    pub company_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

impl Scope {
    /// WHERE clause with one positional parameter per set filter, in
    /// company, project order.
    fn where_clause(&self) -> String {
        let mut clauses = Vec::new();
        if self.company_id.is_some() {
            clauses.push(format!("t.company_id = ${}", clauses.len() + 1));
        }
        if self.project_id.is_some() {
            clauses.push(format!("t.project_id = ${}", clauses.len() + 1));
        }
        if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        }
    }
}

pub fn select_records(screen: Screen, scope: &Scope) -> String {
    format!(
        "SELECT to_jsonb(t) AS record FROM {} t{}",
        screen.table(),
        scope.where_clause()
    )
}

/// Reads screen rows straight from the FieldForge tables, each row turned
/// into a JSON object by Postgres.
pub struct PgSource {
    pool: PgPool,
    scope: Scope,
}

impl PgSource {
    pub fn new(pool: PgPool, scope: Scope) -> Self {
        Self { pool, scope }
    }
}

#[async_trait]
impl RecordSource for PgSource {
    async fn fetch(&self, screen: Screen) -> Result<Vec<Record>, FetchError> {
        let query = select_records(screen, &self.scope);
        debug!(target: "fieldforge::db", %query, "selecting records");

        let mut rows = sqlx::query(&query);
        if let Some(company_id) = self.scope.company_id {
            rows = rows.bind(company_id);
        }
        if let Some(project_id) = self.scope.project_id {
            rows = rows.bind(project_id);
        }

        let rows = rows.fetch_all(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());

        for row in rows {
            let value: Value = row.try_get("record")?;
            let record = Record::from_value(value).ok_or_else(|| {
                FetchError::decode(screen.table(), "row did not convert to a JSON object")
            })?;
            records.push(record);
        }

        Ok(records)
    }

    fn describe(&self) -> String {
        match (self.scope.company_id, self.scope.project_id) {
            (None, None) => "postgres".to_string(),
            (company, project) => format!(
                "postgres (company {}, project {})",
                company.map_or_else(|| "*".to_string(), |id| id.to_string()),
                project.map_or_else(|| "*".to_string(), |id| id.to_string()),
            ),
        }
    }
}

/// Subscribes to a `NOTIFY` channel. Table triggers publish on it whenever a
/// screen's rows change.
pub async fn listen(pool: &PgPool, channel: &str) -> Result<PgListener, FetchError> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(channel).await?;
    info!(target: "fieldforge::db", channel, "listening for change notifications");
    Ok(listener)
}
