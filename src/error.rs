use thiserror::Error;

/// Run-fatal failures. Everything local to one page, stub, or location is
/// downgraded to a warning instead of surfacing here.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("a run is already in progress")]
    RunInProgress,

    #[error("could not create HTTP session: {0}")]
    Session(String),

    #[error("all export targets failed: {0}")]
    Export(#[from] ExportError),
}

/// A page that could not be fetched. Transient by assumption; callers retry
/// with backoff and then treat the page as empty.
#[derive(Debug, Error, Clone)]
#[error("failed to load {url}: {reason}")]
pub struct PageLoadError {
    pub url: String,
    pub reason: String,
}

impl PageLoadError {
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Typed outcomes of a contact lookup against the authenticated API.
#[derive(Debug, Error)]
pub enum ContactError {
    #[error("session is not authenticated")]
    Unauthenticated,

    #[error("no contact info published for ad {0}")]
    NotFound(String),

    #[error("contact API rate limited")]
    RateLimited,

    #[error("contact lookup failed: {0}")]
    Transport(String),
}

/// A single export target failing. Targets are independent; one failing does
/// not stop the others from being attempted.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TSV serialization failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Spreadsheet upload failures, kept separate from file exports so a sheets
/// outage never blocks the local files.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("sheets token unavailable: {0}")]
    Token(String),

    #[error("sheets API returned HTTP {status} during {context}")]
    Api { status: u16, context: String },

    #[error("sheets request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
