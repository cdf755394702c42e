use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::aggregate::ClassificationRule;
use crate::checklist::ChecklistItem;
use crate::db::{self, PgSource, Scope};
use crate::error::ConfigError;
use crate::fetch::{FileSource, HttpSource, RecordSource, Session};
use crate::screens::Screen;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    Http,
    Postgres,
    File,
}

#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Where records are read from
    #[arg(long, value_enum, default_value_t = SourceKind::Http, global = true)]
    pub source: SourceKind,
    /// FieldForge API base address
    #[arg(long, env = "FIELDFORGE_API_URL", global = true)]
    pub api_url: Option<String>,
    /// Bearer token for the API
    #[arg(long, env = "FIELDFORGE_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,
    #[arg(long, env = "DATABASE_URL", hide_env_values = true, global = true)]
    pub database_url: Option<String>,
    /// JSON or CSV snapshot, or a directory of `<screen>.json|csv` files
    #[arg(long, global = true)]
    pub file: Option<PathBuf>,
    #[arg(long, global = true)]
    pub company_id: Option<Uuid>,
    #[arg(long, global = true)]
    pub project_id: Option<Uuid>,
    /// Rule overrides: a JSON array of rules, or an object keyed by screen
    #[arg(long, global = true)]
    pub rules: Option<PathBuf>,
    #[arg(long, default_value_t = 30, global = true)]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub enum SourceConfig {
    Http { session: Session, timeout: Duration },
    Postgres { database_url: String, scope: Scope },
    File { path: PathBuf },
}

pub struct OpenedSource {
    pub source: Arc<dyn RecordSource>,
    /// Kept for realtime subscriptions when reading from Postgres.
    pub pool: Option<PgPool>,
}

impl SourceConfig {
    pub fn is_postgres(&self) -> bool {
        matches!(self, SourceConfig::Postgres { .. })
    }

    pub async fn open(&self) -> anyhow::Result<OpenedSource> {
        Ok(match self {
            SourceConfig::Http { session, timeout } => OpenedSource {
                source: Arc::new(HttpSource::new(session.clone(), *timeout)?),
                pool: None,
            },
            SourceConfig::Postgres {
                database_url,
                scope,
            } => {
                let pool = db::connect(database_url).await?;
                OpenedSource {
                    source: Arc::new(PgSource::new(pool.clone(), *scope)),
                    pool: Some(pool),
                }
            }
            SourceConfig::File { path } => OpenedSource {
                source: Arc::new(FileSource::new(path.clone())),
                pool: None,
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub source: SourceConfig,
    pub rules: Option<PathBuf>,
}

impl Settings {
    pub fn from_args(args: &SourceArgs) -> Result<Self, ConfigError> {
        let source = match args.source {
            SourceKind::Http => {
                let base_url = args
                    .api_url
                    .as_deref()
                    .filter(|url| !url.trim().is_empty())
                    .ok_or(ConfigError::MissingApiUrl)?;
                SourceConfig::Http {
                    session: Session::new(base_url, args.token.clone()),
                    timeout: Duration::from_secs(args.timeout_secs.max(1)),
                }
            }
            SourceKind::Postgres => SourceConfig::Postgres {
                database_url: args
                    .database_url
                    .clone()
                    .filter(|url| !url.trim().is_empty())
                    .ok_or(ConfigError::MissingDatabaseUrl)?,
                scope: Scope {
                    company_id: args.company_id,
                    project_id: args.project_id,
                },
            },
            SourceKind::File => SourceConfig::File {
                path: args.file.clone().ok_or(ConfigError::MissingFile)?,
            },
        };

        Ok(Self {
            source,
            rules: args.rules.clone(),
        })
    }

    /// Rules for `screen`: the override file's when one is given and covers
    /// the screen, otherwise the built-in catalog.
    pub fn rules_for(&self, screen: Screen) -> Result<Vec<ClassificationRule>, ConfigError> {
        match &self.rules {
            Some(path) => Ok(load_rules(path, screen)?.unwrap_or_else(|| screen.rules())),
            None => Ok(screen.rules()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RulesFile {
    Shared(Vec<ClassificationRule>),
    PerScreen(BTreeMap<String, Vec<ClassificationRule>>),
}

/// `Ok(None)` when the file is keyed by screen and has no entry for this one.
pub fn load_rules(
    path: &Path,
    screen: Screen,
) -> Result<Option<Vec<ClassificationRule>>, ConfigError> {
    let rules_error = |reason: String| ConfigError::Rules {
        path: path.to_path_buf(),
        reason,
    };
    let raw = std::fs::read_to_string(path).map_err(|err| rules_error(err.to_string()))?;
    let parsed: RulesFile = serde_json::from_str(&raw).map_err(|err| rules_error(err.to_string()))?;

    Ok(match parsed {
        RulesFile::Shared(rules) => Some(rules),
        RulesFile::PerScreen(mut by_screen) => by_screen.remove(screen.name()),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChecklistFile {
    Items(Vec<ChecklistItem>),
    Wrapped { items: Vec<ChecklistItem> },
}

pub fn load_checklist(path: &Path) -> Result<Vec<ChecklistItem>, ConfigError> {
    let checklist_error = |reason: String| ConfigError::Checklist {
        path: path.to_path_buf(),
        reason,
    };
    let raw = std::fs::read_to_string(path).map_err(|err| checklist_error(err.to_string()))?;
    let parsed: ChecklistFile =
        serde_json::from_str(&raw).map_err(|err| checklist_error(err.to_string()))?;

    Ok(match parsed {
        ChecklistFile::Items(items) | ChecklistFile::Wrapped { items } => items,
    })
}
