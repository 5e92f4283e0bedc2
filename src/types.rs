use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A polled feed origin tracked with health/error state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub error_count: u32,
    pub last_fetched: Option<DateTime<Utc>>,
    /// Per-source override of the global polling interval, in seconds.
    pub fetch_interval_secs: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// Derived health indicator. Never stored; computed from the error
/// counter and fetch history when observability surfaces ask for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceHealth {
    Healthy,
    Warning,
    Unhealthy,
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url: url.into(),
            description: None,
            is_active: true,
            error_count: 0,
            last_fetched: None,
            fetch_interval_secs: None,
            created_at: Utc::now(),
        }
    }

    /// Unhealthy above 3 consecutive errors, or when the source has never
    /// fetched successfully and is past a one-day grace period.
    pub fn health(&self, now: DateTime<Utc>) -> SourceHealth {
        if self.error_count > 3
            || (self.last_fetched.is_none() && now - self.created_at > Duration::days(1))
        {
            SourceHealth::Unhealthy
        } else if self.error_count > 0 {
            SourceHealth::Warning
        } else {
            SourceHealth::Healthy
        }
    }
}

/// Lifecycle state of an ingested item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// Just ingested, unscored.
    New,
    /// Relevance and sentiment populated.
    Scored,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::New => "new",
            ItemState::Scored => "scored",
        }
    }
}

impl std::str::FromStr for ItemState {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(ItemState::New),
            "scored" => Ok(ItemState::Scored),
            other => Err(PipelineError::Parse(format!("unknown item state: {other}"))),
        }
    }
}

/// One ingested unit of content moving through the scoring lifecycle.
///
/// Created exclusively by the collector; scores, state and `updated_at`
/// are mutated exclusively by the batch processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    /// Stable identity derived from the upstream entry's guid or link,
    /// never from its content. Re-fetching the same entry maps to the
    /// same identity.
    pub identity: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub source_id: Uuid,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// In [0.0, 1.0]; absent until scored.
    pub relevance: Option<f64>,
    /// In [-1.0, 1.0]; absent until scored.
    pub sentiment: Option<f64>,
    pub state: ItemState,
    pub language: String,
    /// Filled by collaborators outside the core; carried untouched.
    pub summary: Option<String>,
}

/// A weighted lexical trigger. Read-only to the pipeline; snapshotted
/// into an immutable table at analyzer construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub id: Uuid,
    pub term: String,
    pub weight: f64,
    pub category: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Keyword {
    pub fn new(term: impl Into<String>, weight: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            term: term.into(),
            weight,
            category: "general".to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// Enumerated score update applied by the processor. The only mutation
/// path for item scores; unknown fields cannot be smuggled through.
#[derive(Debug, Clone)]
pub struct ScoreUpdate {
    pub item_id: Uuid,
    pub relevance: f64,
    pub sentiment: f64,
    pub state: ItemState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Success,
    Skipped,
    Error,
}

/// Per-source result of one collection call. Failures are reported here,
/// never raised past the collector boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub source_id: Uuid,
    pub status: FetchStatus,
    pub new_items: usize,
    pub message: Option<String>,
}

impl FetchOutcome {
    pub fn success(source_id: Uuid, new_items: usize) -> Self {
        Self {
            source_id,
            status: FetchStatus::Success,
            new_items,
            message: None,
        }
    }

    pub fn skipped(source_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            source_id,
            status: FetchStatus::Skipped,
            new_items: 0,
            message: Some(message.into()),
        }
    }

    pub fn error(source_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            source_id,
            status: FetchStatus::Error,
            new_items: 0,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Success,
    Error,
}

/// Result of one processor invocation. Either every score in the batch
/// was committed (`Success`) or none were (`Error`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub status: ProcessStatus,
    pub processed: usize,
    pub message: Option<String>,
}

impl ProcessOutcome {
    pub fn success(processed: usize) -> Self {
        Self {
            status: ProcessStatus::Success,
            processed,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ProcessStatus::Error,
            processed: 0,
            message: Some(message.into()),
        }
    }
}

/// Counts surfaced to observability consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub active_sources: usize,
    pub unhealthy_sources: usize,
    pub new_items: usize,
    pub scored_items: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Source not found: {id}")]
    SourceNotFound { id: Uuid },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
