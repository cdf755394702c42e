use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::FetchError;
use crate::models::Record;
use crate::screens::Screen;

/// Credentials and base address for the FieldForge API. Passed explicitly to
/// whatever needs it; there is no process-wide client.
#[derive(Clone)]
pub struct Session {
    base_url: String,
    access_token: Option<String>,
}

impl Session {
    pub fn new(base_url: &str, access_token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.filter(|token| !token.is_empty()),
        }
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Where a screen's records come from. Implementations return the whole
/// collection or an error, never a partial list.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch(&self, screen: Screen) -> Result<Vec<Record>, FetchError>;

    fn describe(&self) -> String;
}

pub struct HttpSource {
    client: reqwest::Client,
    session: Session,
}

impl HttpSource {
    pub fn new(session: Session, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::transport(session.url(""), source))?;
        Ok(Self { client, session })
    }

    pub async fn fetch_endpoint(
        &self,
        endpoint: &str,
        collection_key: &str,
    ) -> Result<Vec<Record>, FetchError> {
        let url = self.session.url(endpoint);
        let request_id = Uuid::new_v4();
        debug!(target: "fieldforge::fetch", %url, %request_id, "fetching records");

        let mut request = self
            .client
            .get(&url)
            .header("X-Request-Id", request_id.to_string());
        if let Some(token) = &self.session.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|source| FetchError::transport(&url, source))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(&url, status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| FetchError::decode(&url, err.to_string()))?;
        let records = decode_records(body, collection_key, &url)?;
        info!(target: "fieldforge::fetch", %url, %request_id, count = records.len(), "records fetched");
        Ok(records)
    }
}

#[async_trait]
impl RecordSource for HttpSource {
    async fn fetch(&self, screen: Screen) -> Result<Vec<Record>, FetchError> {
        self.fetch_endpoint(screen.endpoint(), screen.collection_key())
            .await
    }

    fn describe(&self) -> String {
        self.session.base_url.clone()
    }
}

/// Accepts a bare array, or an object wrapping one under `data` or the
/// collection key. Every element must be an object.
pub fn decode_records(
    body: Value,
    collection_key: &str,
    origin: &str,
) -> Result<Vec<Record>, FetchError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut wrapper) => match wrapper
            .remove("data")
            .or_else(|| wrapper.remove(collection_key))
        {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(FetchError::decode(
                    origin,
                    format!("expected an array under `data` or `{collection_key}`"),
                ))
            }
        },
        other => {
            return Err(FetchError::decode(
                origin,
                format!("expected a JSON array, got {}", json_kind(&other)),
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let kind = json_kind(&item);
            Record::from_value(item).ok_or_else(|| {
                FetchError::decode(origin, format!("element {index} is {kind}, not an object"))
            })
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Records from a JSON or CSV snapshot on disk. A directory holds one file
/// per screen, named `<screen>.json` or `<screen>.csv`.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn resolve(path: &Path, screen: Screen) -> Result<PathBuf, FetchError> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }
    ["json", "csv"]
        .iter()
        .map(|extension| path.join(format!("{}.{extension}", screen.name())))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            FetchError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no {screen}.json or {screen}.csv in {}", path.display()),
            ))
        })
}

/// Runs synchronous file work off the async worker threads.
async fn run_blocking<T, F>(task: F) -> Result<T, FetchError>
where
    F: FnOnce() -> Result<T, FetchError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| FetchError::Io(std::io::Error::other(err)))?
}

#[async_trait]
impl RecordSource for FileSource {
    async fn fetch(&self, screen: Screen) -> Result<Vec<Record>, FetchError> {
        let root = self.path.clone();
        let path = run_blocking(move || resolve(&root, screen)).await?;
        let is_csv = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("csv"));
        let records = if is_csv {
            let csv_path = path.clone();
            run_blocking(move || read_csv(&csv_path)).await?
        } else {
            let raw = tokio::fs::read_to_string(&path).await?;
            let body: Value = serde_json::from_str(&raw)
                .map_err(|err| FetchError::decode(path.display().to_string(), err.to_string()))?;
            decode_records(body, screen.collection_key(), &path.display().to_string())?
        };
        debug!(target: "fieldforge::fetch", path = %path.display(), count = records.len(), "records loaded");
        Ok(records)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub fn read_csv(path: &Path) -> Result<Vec<Record>, FetchError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut records = Vec::new();

    for row in reader.records() {
        let row = row?;
        let fields: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(header, cell)| (header.to_string(), infer_cell(cell)))
            .collect();
        records.push(Record::new(fields));
    }

    Ok(records)
}

fn infer_cell(cell: &str) -> Value {
    let cell = cell.trim();
    if cell.is_empty() {
        return Value::Null;
    }
    match cell {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(integer) = cell.parse::<i64>() {
        return Value::from(integer);
    }
    match cell.parse::<f64>() {
        Ok(float) if float.is_finite() => Value::from(float),
        _ => Value::String(cell.to_string()),
    }
}
