use reqwest::{header, redirect, Client};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{DatasetKind, FetchSource};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http {status} from {url}")]
    Http { status: u16, url: String },
    #[error("timed out after {secs:.1}s fetching {url}")]
    Timeout { secs: f64, url: String },
    #[error("network: {0}")]
    Net(#[from] reqwest::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct FetcherOptions {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_redirects: usize,
    pub cache_dir: PathBuf,
    /// Synthesize a one-entry document when neither network nor cache works.
    pub allow_stub: bool,
    /// Per-document URL overrides; missing kinds use `DatasetKind::default_url`.
    pub urls: HashMap<DatasetKind, String>,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
            cache_dir: PathBuf::from("data/game"),
            allow_stub: true,
            urls: HashMap::new(),
        }
    }
}

pub fn default_user_agent() -> String {
    format!(
        "Mozilla/5.0 (X11; Linux x86_64) GameCatalogImporter/{} (+catalog import; contact operator)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Result of fetching one document. Never an error: failures are folded
/// into `success`/`source`/`error` and the fallback document.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub kind: DatasetKind,
    pub success: bool,
    pub source: Option<FetchSource>,
    pub bytes: usize,
    pub error: Option<String>,
    #[serde(skip)]
    pub document: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct SourceFetcher {
    http: Client,
    options: FetcherOptions,
}

impl SourceFetcher {
    pub fn new(options: FetcherOptions) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(options.user_agent.clone())
            .timeout(options.timeout)
            .redirect(redirect::Policy::limited(options.max_redirects))
            .build()?;
        Ok(Self { http, options })
    }

    pub fn url_for(&self, kind: DatasetKind) -> String {
        self.options
            .urls
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| kind.default_url().to_string())
    }

    pub fn cache_path(&self, kind: DatasetKind) -> PathBuf {
        self.options.cache_dir.join(kind.cache_file_name())
    }

    /// Fetch one document: network first, then the cached copy, then a stub.
    /// Whatever gets accepted is written back to the cache.
    pub async fn fetch(&self, kind: DatasetKind) -> FetchOutcome {
        let url = self.url_for(kind);
        let started = Instant::now();

        let failure = match self.fetch_remote(&url).await {
            Ok((body, document)) => {
                info!(
                    kind = %kind,
                    bytes = body.len(),
                    took_ms = started.elapsed().as_millis() as u64,
                    "fetched game data from wiki"
                );
                self.persist(kind, &body).await;
                return FetchOutcome {
                    kind,
                    success: true,
                    source: Some(FetchSource::Wiki),
                    bytes: body.len(),
                    error: None,
                    document: Some(document),
                };
            }
            Err(err) => {
                warn!(kind = %kind, url = %url, error = %err, "wiki fetch failed; falling back");
                err.to_string()
            }
        };

        match self.read_cached(kind).await {
            Ok(Some((body, document))) => {
                info!(kind = %kind, path = %self.cache_path(kind).display(), "using existing cached copy");
                self.persist(kind, &body).await;
                return FetchOutcome {
                    kind,
                    success: false,
                    source: Some(FetchSource::Existing),
                    bytes: body.len(),
                    error: Some(failure),
                    document: Some(document),
                };
            }
            Ok(None) => debug!(kind = %kind, "no cached copy present"),
            Err(err) => warn!(kind = %kind, error = %err, "cached copy unreadable; ignoring it"),
        }

        if !self.options.allow_stub {
            warn!(kind = %kind, "no dataset available and stub fallback disabled");
            return FetchOutcome {
                kind,
                success: false,
                source: None,
                bytes: 0,
                error: Some(failure),
                document: None,
            };
        }

        let document = stub_document(kind);
        let body = document.to_string();
        warn!(kind = %kind, "using synthesized placeholder dataset");
        self.persist(kind, &body).await;
        FetchOutcome {
            kind,
            success: false,
            source: Some(FetchSource::Empty),
            bytes: body.len(),
            error: Some(failure),
            document: Some(document),
        }
    }

    async fn fetch_remote(&self, url: &str) -> Result<(String, Value), FetchError> {
        let timed_out = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    secs: self.options.timeout.as_secs_f64(),
                    url: url.to_string(),
                }
            } else {
                FetchError::Net(e)
            }
        };
        let resp = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/json, text/plain;q=0.9, */*;q=0.8")
            .send()
            .await
            .map_err(timed_out)?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        if final_url != url {
            debug!(from = %url, to = %final_url, "followed redirect");
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: final_url,
            });
        }
        let body = resp.text().await.map_err(timed_out)?;
        let document: Value = serde_json::from_str(&body)?;
        Ok((body, document))
    }

    async fn read_cached(&self, kind: DatasetKind) -> Result<Option<(String, Value)>, FetchError> {
        let path = self.cache_path(kind);
        let body = match tokio::fs::read_to_string(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let document: Value = serde_json::from_str(&body)?;
        Ok(Some((body, document)))
    }

    /// Best effort; a failed cache write only costs the next run its fallback.
    async fn persist(&self, kind: DatasetKind, body: &str) {
        let path = self.cache_path(kind);
        if let Err(e) = write_atomically(&path, body).await {
            warn!(kind = %kind, path = %path.display(), error = %e, "failed to persist dataset copy");
        }
    }
}

async fn write_atomically(path: &Path, body: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Minimal single-entry document so later stages still have something to
/// chew on. Placeholders are marked unstable and never reach the user catalog.
pub fn stub_document(kind: DatasetKind) -> Value {
    match kind {
        DatasetKind::Items => json!({
            "Desc_ImportPlaceholder_C": [{
                "name": "Import Placeholder",
                "description": "Placeholder created because no items document was available.",
                "stackSize": 0,
                "form": "solid",
                "experimental": true,
                "stable": false
            }]
        }),
        DatasetKind::Buildings => json!({
            "Build_ImportPlaceholder_C": [{
                "name": "Import Placeholder Building",
                "description": "Placeholder created because no buildings document was available.",
                "experimental": true,
                "stable": false
            }]
        }),
        DatasetKind::Recipes => json!({
            "Recipe_ImportPlaceholder_C": [{
                "name": "Import Placeholder Recipe",
                "duration": 0,
                "ingredients": [],
                "products": [],
                "producedIn": [],
                "experimental": true,
                "stable": false
            }]
        }),
    }
}
