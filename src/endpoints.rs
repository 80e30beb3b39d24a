//! Monitored endpoints and the store they are read from
//!
//! The engine only ever reads the endpoint list through [`EndpointStore::load`].
//! [`JsonEndpointStore`] is the file-backed implementation used by the binary;
//! it additionally supports positional add/update/delete for the CLI and console.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::monitors::probe::{KeywordMatch, Outcome};

/// A named network address under observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub name: String,

    pub url: String,

    /// Content keywords; when any is present the HTTP status is ignored
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// How a response from this endpoint is turned into an outcome
    ///
    /// Blank keywords are ignored, so an endpoint whose keyword list only
    /// contains whitespace is classified by status code.
    pub fn classification(&self) -> ClassificationMode {
        let keywords: Vec<String> = self
            .keywords
            .iter()
            .map(|keyword| keyword.trim())
            .filter(|keyword| !keyword.is_empty())
            .map(str::to_lowercase)
            .collect();

        if keywords.is_empty() {
            ClassificationMode::ByStatusCode
        } else {
            ClassificationMode::ByKeyword(keywords)
        }
    }
}

/// Content classification and status-code classification are mutually exclusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationMode {
    /// Up iff the body contains at least one keyword (lowercased, case-insensitive match)
    ByKeyword(Vec<String>),

    /// Up iff `200 <= status < 400`
    ByStatusCode,
}

impl ClassificationMode {
    /// Whether the response body has to be read to classify
    pub fn needs_body(&self) -> bool {
        matches!(self, ClassificationMode::ByKeyword(_))
    }

    /// Classify a completed HTTP exchange
    pub fn classify(&self, http_status: u16, body: Option<&str>) -> (Outcome, KeywordMatch) {
        match self {
            ClassificationMode::ByKeyword(keywords) => {
                let body = body.unwrap_or_default().to_lowercase();
                if keywords.iter().any(|keyword| body.contains(keyword.as_str())) {
                    (Outcome::Up, KeywordMatch::Matched)
                } else {
                    (Outcome::Down, KeywordMatch::NotMatched)
                }
            }
            ClassificationMode::ByStatusCode => {
                let outcome = if (200..400).contains(&http_status) {
                    Outcome::Up
                } else {
                    Outcome::Down
                };
                (outcome, KeywordMatch::NotApplicable)
            }
        }
    }
}

/// Read source for the current endpoint set
#[async_trait]
pub trait EndpointStore: Send + Sync {
    /// Load the endpoints in their configured order
    ///
    /// A missing or corrupt backing store yields an empty list. Errors are
    /// reserved for failures the store cannot paper over (e.g. permissions).
    async fn load(&self) -> Result<Vec<Endpoint>, StoreError>;
}

/// Endpoint list kept as a JSON array in a single file
#[derive(Debug)]
pub struct JsonEndpointStore {
    path: PathBuf,

    /// Serializes read-modify-write cycles of the positional mutators
    write_lock: Mutex<()>,
}

impl JsonEndpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_exists(&self) -> Result<(), StoreError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("creating empty endpoint store at {}", self.path.display());
                self.save(&[]).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the store with the given list
    pub async fn save(&self, endpoints: &[Endpoint]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(endpoints)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }

    /// Append an endpoint and return the updated list
    pub async fn add(
        &self,
        name: &str,
        url: &str,
        keywords: Vec<String>,
    ) -> Result<Vec<Endpoint>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut endpoints = self.load().await?;
        endpoints.push(Endpoint::new(name.trim(), url.trim()).with_keywords(keywords));
        self.save(&endpoints).await?;
        Ok(endpoints)
    }

    /// Replace the endpoint at `index`; out-of-range indices leave the store untouched
    pub async fn update(
        &self,
        index: usize,
        name: &str,
        url: &str,
        keywords: Vec<String>,
    ) -> Result<Vec<Endpoint>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut endpoints = self.load().await?;
        if let Some(slot) = endpoints.get_mut(index) {
            *slot = Endpoint::new(name.trim(), url.trim()).with_keywords(keywords);
            self.save(&endpoints).await?;
        }
        Ok(endpoints)
    }

    /// Remove the endpoint at `index`, returning it alongside the remaining list
    pub async fn delete(&self, index: usize) -> Result<(Option<Endpoint>, Vec<Endpoint>), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut endpoints = self.load().await?;
        if index >= endpoints.len() {
            return Ok((None, endpoints));
        }
        let removed = endpoints.remove(index);
        self.save(&endpoints).await?;
        Ok((Some(removed), endpoints))
    }
}

#[async_trait]
impl EndpointStore for JsonEndpointStore {
    async fn load(&self) -> Result<Vec<Endpoint>, StoreError> {
        self.ensure_exists().await?;

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<Vec<Endpoint>>(&content) {
            Ok(endpoints) => Ok(endpoints),
            Err(e) => {
                warn!(
                    "endpoint store {} is not a valid endpoint list, treating as empty: {e}",
                    self.path.display()
                );
                Ok(Vec::new())
            }
        }
    }
}
