use crate::config::Config;
use crate::contacts::{enrich, OlxContactSession};
use crate::detail::collect_details;
use crate::error::{ExportError, ScrapeError};
use crate::export::{ColumnPolicy, Exporter};
use crate::http_client::{HttpFetcher, PageFetcher};
use crate::list_page::collect_stubs;
use crate::models::{Location, Record};
use crate::pacing::Pacing;
use crate::sheets::SheetsClient;
use crate::tracker::{LocationSummary, Phase, RunTracker};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;

/// One run's input, as received from the front end.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub location_keys: Vec<String>,
    pub max_pages: u32,
    pub target_per_location: usize,
    pub fetch_contacts: bool,
}

/// What a completed run produced.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub records: Vec<Record>,
    pub tsv_path: Option<PathBuf>,
    pub json_path: Option<PathBuf>,
    pub sheet_url: Option<String>,
}

/// Drives one run through its phases: per selected location a listing pass
/// then a detail pass, optional contact enrichment over the combined
/// accumulator, then export. Failures local to a page, stub, or location
/// are downgraded to warnings; only configuration problems, a client that
/// cannot be built at all, or every export target failing end the run in
/// the error state.
pub struct Orchestrator {
    config: Config,
    tracker: RunTracker,
    fetcher_override: Option<Arc<dyn PageFetcher>>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            tracker: RunTracker::new(),
            fetcher_override: None,
        }
    }

    /// Use a custom page fetcher instead of building an HTTP client per
    /// phase. Collectors still treat it as phase-scoped.
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            config,
            tracker: RunTracker::new(),
            fetcher_override: Some(fetcher),
        }
    }

    /// Handle for progress consumers; snapshots stay valid across runs.
    pub fn tracker(&self) -> &RunTracker {
        &self.tracker
    }

    /// Check the request against configuration. Runs before any I/O; an
    /// empty selection or an unknown or disabled key rejects the run.
    pub fn validate(&self, request: &RunRequest) -> Result<Vec<Location>, ScrapeError> {
        if request.location_keys.is_empty() {
            return Err(ScrapeError::Configuration(
                "no locations selected".to_string(),
            ));
        }
        if request.max_pages == 0 {
            return Err(ScrapeError::Configuration(
                "max_pages must be at least 1".to_string(),
            ));
        }
        if request.target_per_location == 0 {
            return Err(ScrapeError::Configuration(
                "target_per_location must be at least 1".to_string(),
            ));
        }

        let mut locations = Vec::with_capacity(request.location_keys.len());
        for key in &request.location_keys {
            let location = self.config.location(key).ok_or_else(|| {
                ScrapeError::Configuration(format!("unknown location key '{}'", key))
            })?;
            if !location.enabled {
                return Err(ScrapeError::Configuration(format!(
                    "location '{}' is disabled",
                    key
                )));
            }
            locations.push(location.clone());
        }
        Ok(locations)
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome, ScrapeError> {
        self.tracker.begin().await?;

        let locations = match self.validate(&request) {
            Ok(locations) => locations,
            Err(e) => {
                self.tracker.fail(&e).await;
                return Err(e);
            }
        };

        self.tracker
            .progress(format!(
                "Run started: {} locations, target {} per location, up to {} pages each",
                locations.len(),
                request.target_per_location,
                request.max_pages
            ))
            .await;

        let pacing = Arc::new(Pacing::from_config(&self.config));
        let mut records: Vec<Record> = Vec::new();

        for location in &locations {
            self.tracker.set_phase(Phase::Listing).await;
            self.tracker
                .progress(format!("{}: collecting listings", location.name))
                .await;

            // One session per phase: acquired here, dropped before the
            // detail phase builds its own.
            let stubs = {
                let fetcher = self.phase_fetcher().await?;
                collect_stubs(
                    fetcher.as_ref(),
                    location,
                    request.target_per_location,
                    request.max_pages,
                    self.config.fetch_retries,
                    &pacing,
                    &self.tracker,
                )
                .await
            };

            if stubs.is_empty() {
                self.tracker
                    .warn(format!(
                        "{} completed with 0 of {} requested",
                        location.name, request.target_per_location
                    ))
                    .await;
                self.tracker
                    .location_done(LocationSummary {
                        key: location.key.clone(),
                        name: location.name.clone(),
                        requested: request.target_per_location,
                        collected: 0,
                        degraded: 0,
                    })
                    .await;
                continue;
            }

            self.tracker.set_phase(Phase::Detail).await;
            self.tracker
                .progress(format!(
                    "{}: fetching {} detail pages",
                    location.name,
                    stubs.len()
                ))
                .await;

            let location_records = {
                let fetcher = self.phase_fetcher().await?;
                collect_details(
                    fetcher,
                    stubs,
                    location,
                    self.config.detail_workers,
                    self.config.fetch_retries,
                    Arc::clone(&pacing),
                    &self.tracker,
                )
                .await
            };

            let collected = location_records.len();
            let degraded = location_records.iter().filter(|r| r.incomplete).count();
            if collected < request.target_per_location {
                self.tracker
                    .progress(format!(
                        "{} completed with {} of {} requested",
                        location.name, collected, request.target_per_location
                    ))
                    .await;
            }
            self.tracker
                .location_done(LocationSummary {
                    key: location.key.clone(),
                    name: location.name.clone(),
                    requested: request.target_per_location,
                    collected,
                    degraded,
                })
                .await;
            records.extend(location_records);
        }

        if request.fetch_contacts {
            self.tracker.set_phase(Phase::Contacts).await;
            match OlxContactSession::from_cookie_file(
                &self.config.user_agent,
                self.config.request_timeout_secs,
                &self.config.cookies_file,
            ) {
                Ok(session) => {
                    enrich(&mut records, &session, &pacing, &self.tracker).await;
                }
                Err(e) => {
                    self.tracker
                        .warn(format!("Contact enrichment skipped: {}", e))
                        .await;
                }
            }
        }

        self.tracker.set_phase(Phase::Exporting).await;
        let outcome = self.export_phase(records, &request).await?;

        self.tracker.finish().await;
        Ok(outcome)
    }

    async fn export_phase(
        &self,
        records: Vec<Record>,
        request: &RunRequest,
    ) -> Result<RunOutcome, ScrapeError> {
        let exporter = Exporter::new(&self.config.out_dir, ColumnPolicy::default());
        let basename = export_basename(&request.location_keys);

        let mut outcome = RunOutcome {
            records: Vec::new(),
            tsv_path: None,
            json_path: None,
            sheet_url: None,
        };
        let mut last_error: Option<ExportError> = None;

        match exporter.export_tsv(&records, &basename) {
            Ok(path) => {
                self.tracker
                    .progress(format!("Wrote {}", path.display()))
                    .await;
                outcome.tsv_path = Some(path);
            }
            Err(e) => {
                self.tracker.warn(format!("TSV export failed: {}", e)).await;
                last_error = Some(e);
            }
        }

        match exporter.export_json(&records, &basename) {
            Ok(path) => {
                self.tracker
                    .progress(format!("Wrote {}", path.display()))
                    .await;
                outcome.json_path = Some(path);
            }
            Err(e) => {
                self.tracker
                    .warn(format!("JSON export failed: {}", e))
                    .await;
                last_error = Some(e);
            }
        }

        if outcome.tsv_path.is_none() && outcome.json_path.is_none() {
            if let Some(error) = last_error {
                let e = ScrapeError::Export(error);
                self.tracker.fail(&e).await;
                return Err(e);
            }
        }

        if let Some(sheets_config) = &self.config.sheets {
            if records.is_empty() {
                self.tracker
                    .progress("No records, skipping Google Sheets upload".to_string())
                    .await;
            } else {
                match SheetsClient::from_config(sheets_config, self.config.request_timeout_secs) {
                    Ok(client) => {
                        self.tracker
                            .progress("Uploading to Google Sheets...".to_string())
                            .await;
                        let (columns, rows) = exporter.table(&records);
                        let sheet_name = Utc::now().format("%d-%m-%Y").to_string();
                        match client.export(&sheet_name, &columns, rows).await {
                            Ok(url) => {
                                self.tracker
                                    .progress(format!("Sheet updated: {}", url))
                                    .await;
                                outcome.sheet_url = Some(url);
                            }
                            Err(e) => {
                                self.tracker
                                    .warn(format!("Google Sheets export failed: {}", e))
                                    .await;
                            }
                        }
                    }
                    Err(e) => {
                        self.tracker
                            .warn(format!("Google Sheets not available: {}", e))
                            .await;
                    }
                }
            }
        }

        outcome.records = records;
        Ok(outcome)
    }

    async fn phase_fetcher(&self) -> Result<Arc<dyn PageFetcher>, ScrapeError> {
        if let Some(fetcher) = &self.fetcher_override {
            return Ok(Arc::clone(fetcher));
        }
        match HttpFetcher::new(&self.config.user_agent, self.config.request_timeout_secs) {
            Ok(fetcher) => Ok(Arc::new(fetcher)),
            Err(e) => {
                let e = ScrapeError::Session(e.to_string());
                self.tracker.fail(&e).await;
                Err(e)
            }
        }
    }
}

fn export_basename(location_keys: &[String]) -> String {
    let scope = match location_keys {
        [single] => single.clone(),
        keys => format!("{}_areas", keys.len()),
    };
    format!("cars_{}_{}", scope, Utc::now().format("%Y-%m-%d"))
}
