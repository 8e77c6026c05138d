use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::ScrapeError;

/// Pipeline phase. One run walks idle → (listing ⇄ detail per location) →
/// contacts? → exporting → complete, with error as a parallel terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Listing,
    Detail,
    Contacts,
    Exporting,
    Complete,
    Error,
}

impl Phase {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Phase::Listing | Phase::Detail | Phase::Contacts | Phase::Exporting
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub at: DateTime<Utc>,
    pub phase: Phase,
    pub message: String,
}

/// Per-location outcome reported in the final state. A location that
/// produced zero records still gets an entry, never an error.
#[derive(Debug, Clone, Serialize)]
pub struct LocationSummary {
    pub key: String,
    pub name: String,
    pub requested: usize,
    pub collected: usize,
    pub degraded: usize,
}

/// State of the single active run. Created at run start, mutated while the
/// run progresses, frozen at completion or the first unrecoverable error,
/// and reset when the next run begins.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub phase: Phase,
    pub events: Vec<ProgressEvent>,
    pub records_collected: usize,
    pub locations: Vec<LocationSummary>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

// Progress log cap; older entries roll off first.
const MAX_EVENTS: usize = 100;

impl RunState {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            phase: Phase::Idle,
            events: Vec::new(),
            records_collected: 0,
            locations: Vec::new(),
            warnings: Vec::new(),
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    fn push_event(&mut self, message: String) {
        self.events.push(ProgressEvent {
            at: Utc::now(),
            phase: self.phase,
            message,
        });
        if self.events.len() > MAX_EVENTS {
            let excess = self.events.len() - MAX_EVENTS;
            self.events.drain(..excess);
        }
    }
}

/// Owner handle for the run state. The orchestrator drives it; progress
/// consumers take snapshots. Concurrent runs are rejected at `begin`, so no
/// ambient locking discipline is needed anywhere else.
#[derive(Clone)]
pub struct RunTracker {
    inner: Arc<Mutex<RunState>>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunState::new())),
        }
    }

    /// Point-in-time copy of the run state for reporting.
    pub async fn snapshot(&self) -> RunState {
        self.inner.lock().await.clone()
    }

    /// Start a fresh run. Fails with a busy error while another run is
    /// active; otherwise resets state and stamps the start time.
    pub async fn begin(&self) -> Result<Uuid, ScrapeError> {
        let mut state = self.inner.lock().await;
        if state.phase.is_active() {
            return Err(ScrapeError::RunInProgress);
        }
        *state = RunState::new();
        state.started_at = Some(Utc::now());
        state.phase = Phase::Listing;
        state.push_event("Run started".to_string());
        Ok(state.run_id)
    }

    pub async fn set_phase(&self, phase: Phase) {
        let mut state = self.inner.lock().await;
        state.phase = phase;
    }

    pub async fn progress(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.inner.lock().await.push_event(message);
    }

    /// Record a coverage shortfall: logged, kept in the warning list, and
    /// appended to the progress stream.
    pub async fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        let mut state = self.inner.lock().await;
        state.warnings.push(message.clone());
        state.push_event(format!("Warning: {}", message));
    }

    pub async fn location_done(&self, summary: LocationSummary) {
        let mut state = self.inner.lock().await;
        state.records_collected += summary.collected;
        state.locations.push(summary);
    }

    pub async fn finish(&self) {
        let mut state = self.inner.lock().await;
        state.phase = Phase::Complete;
        state.completed_at = Some(Utc::now());
        state.push_event("Run complete".to_string());
    }

    pub async fn fail(&self, error: &ScrapeError) {
        let mut state = self.inner.lock().await;
        state.phase = Phase::Error;
        state.error = Some(error.to_string());
        state.completed_at = Some(Utc::now());
        state.push_event(format!("Run failed: {}", error));
    }
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}
