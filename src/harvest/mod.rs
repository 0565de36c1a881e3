//! Harvest orchestration: page through a handler, convert, finalize.
//!
//! A [`Harvester`] owns the protocol client, the entity store and the
//! language registry. [`Harvester::harvest`] runs one [`HarvestJob`]:
//!
//! 1. The pager requests pages strictly one after another.
//! 2. Each page is staged by the [`Converter`] (its records in parallel).
//! 3. After the last page the run is finalized: cycle check, upsert, link
//!    resolution, org-unit ancestors.
//!
//! Cancellation is checked before every page request, so the page being
//! converted is always finished. A page that fails with a transient error is
//! requested again up to [`HarvestConfig::page_retry_limit`] times; after that
//! the run aborts with the error and nothing it staged is written.
//!
//! [`Harvester::harvest_all`] runs one worker per handler on scoped threads.

mod cancel;

pub use cancel::CancellationToken;

use chrono::NaiveDate;
use crossbeam_channel::bounded;
use indexmap::IndexMap;
use tracing::{debug, error, info};

use crate::config::HarvestConfig;
use crate::convert::{self, Converter};
use crate::error::Result;
use crate::model::{EntityId, RunId, UserId};
use crate::multilingual::LanguageTagRegistry;
use crate::oai::{ListRecordsRequest, OaiClient, Transport};
use crate::report::{RunReport, RunStatus};
use crate::store::EntityStore;

/// One incremental harvest against one handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestJob {
    /// Handler to harvest.
    pub handler: String,
    /// Metadata prefix; the handler or configuration default applies when `None`.
    pub metadata_prefix: Option<String>,
    /// Lower datestamp bound (inclusive).
    pub from: Option<NaiveDate>,
    /// Upper datestamp bound (inclusive).
    pub until: Option<NaiveDate>,
    /// Set spec.
    pub set: Option<String>,
    /// Page through `ListIdentifiers`; only withdrawals are reported.
    pub identifiers_only: bool,
    /// Importing user; the configured default applies when `None`.
    pub user: Option<UserId>,
}

impl HarvestJob {
    /// A full, unfiltered harvest of `handler`.
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            metadata_prefix: None,
            from: None,
            until: None,
            set: None,
            identifiers_only: false,
            user: None,
        }
    }

    /// Sets the metadata prefix.
    #[must_use]
    pub fn with_metadata_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metadata_prefix = Some(prefix.into());
        self
    }

    /// Limits the harvest to records changed on or after `from`.
    #[must_use]
    pub fn with_from(mut self, from: NaiveDate) -> Self {
        self.from = Some(from);
        self
    }

    /// Limits the harvest to records changed on or before `until`.
    #[must_use]
    pub fn with_until(mut self, until: NaiveDate) -> Self {
        self.until = Some(until);
        self
    }

    /// Limits the harvest to one set.
    #[must_use]
    pub fn with_set(mut self, set: impl Into<String>) -> Self {
        self.set = Some(set.into());
        self
    }

    /// Pages through headers only.
    #[must_use]
    pub fn identifiers_only(mut self, identifiers_only: bool) -> Self {
        self.identifiers_only = identifiers_only;
        self
    }

    /// Records `user` as the importer.
    #[must_use]
    pub fn with_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    /// First-page request for this job.
    #[must_use]
    pub fn request(&self) -> ListRecordsRequest {
        ListRecordsRequest {
            handler: self.handler.clone(),
            metadata_prefix: self.metadata_prefix.clone(),
            from: self.from,
            until: self.until,
            set: self.set.clone(),
            resumption_token: None,
            identifiers_only: self.identifiers_only,
        }
    }
}

/// Result of one job inside [`Harvester::harvest_all`].
#[derive(Debug)]
pub struct HarvestOutcome {
    /// Handler the job harvested.
    pub handler: String,
    /// Report, or the error that aborted the run.
    pub result: Result<RunReport>,
}

/// Harvest driver over a transport, a store and a language registry.
///
/// # Examples
///
/// ```ignore
/// let harvester = Harvester::new(&config, HttpTransport::from_config(&config)?, store, registry);
/// let report = harvester.harvest(&HarvestJob::new("repoX"), &CancellationToken::new())?;
/// harvester.commit_run(report.run)?;
/// ```
#[derive(Debug)]
pub struct Harvester<T, S, R> {
    client: OaiClient<T>,
    store: S,
    registry: R,
    page_retry_limit: u32,
    default_user: UserId,
}

impl<T, S, R> Harvester<T, S, R>
where
    T: Transport,
    S: EntityStore,
    R: LanguageTagRegistry,
{
    /// Creates a harvester for the handlers in `config`.
    pub fn new(config: &HarvestConfig, transport: T, store: S, registry: R) -> Self {
        Self {
            client: OaiClient::new(config, transport),
            store,
            registry,
            page_retry_limit: config.page_retry_limit,
            default_user: config.default_user(),
        }
    }

    /// The protocol client, for `Identify`, `ListSets` and friends.
    #[must_use]
    pub fn client(&self) -> &OaiClient<T> {
        &self.client
    }

    /// The entity store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The language registry.
    #[must_use]
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Runs one harvest job to completion or cancellation.
    ///
    /// Skipped records do not fail the run; they are listed in the report.
    ///
    /// # Errors
    ///
    /// - [`crate::HarvestError::UnknownHandler`] before any request.
    /// - [`crate::HarvestError::Protocol`] when a page fails and retries are
    ///   exhausted (or the error is an OAI error code, which is never retried).
    /// - [`crate::HarvestError::Store`] when finalization fails.
    pub fn harvest(&self, job: &HarvestJob, cancel: &CancellationToken) -> Result<RunReport> {
        let mut pager = self.client.pages(job.request())?;
        let user = job.user.unwrap_or(self.default_user);
        let mut converter = Converter::new(&self.store, &self.registry, &job.handler, user);
        info!(handler = %job.handler, run = %converter.run(), "harvest started");

        let mut status = RunStatus::Completed;
        let mut failures = 0;
        loop {
            if cancel.is_cancelled() {
                info!(handler = %job.handler, pages = pager.pages_fetched(), "harvest cancelled");
                status = RunStatus::Cancelled;
                break;
            }
            let Some(page) = pager.next_page() else {
                break;
            };
            match page {
                Ok(page) => {
                    failures = 0;
                    debug!(
                        handler = %job.handler,
                        records = page.records.len(),
                        more = page.has_more(),
                        "staging page"
                    );
                    converter.stage_page(page.records);
                },
                Err(err) if err.is_retryable() && failures < self.page_retry_limit => {
                    failures += 1;
                    error!(handler = %job.handler, attempt = failures, error = %err, "page failed, retrying");
                    pager.retry();
                },
                Err(err) => {
                    error!(
                        handler = %job.handler,
                        pages = pager.pages_fetched(),
                        error = %err,
                        "harvest aborted"
                    );
                    return Err(err);
                },
            }
        }

        let mut report = converter.finish()?;
        report.status = status;
        info!(
            handler = %report.handler,
            run = %report.run,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped.len(),
            unresolved = report.unresolved.len(),
            "harvest finished"
        );
        Ok(report)
    }

    /// Imports a single record fetched with `GetRecord`.
    ///
    /// # Errors
    ///
    /// As [`harvest`](Self::harvest), without retries.
    pub fn harvest_record(&self, handler: &str, identifier: &str, user: Option<UserId>) -> Result<RunReport> {
        let record = self.client.get_record(handler, identifier, None)?;
        let mut converter = Converter::new(&self.store, &self.registry, handler, user.unwrap_or(self.default_user));
        converter.stage_page(vec![record]);
        converter.finish()
    }

    /// Marks every record imported by `run` as loaded.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HarvestError::Store`] when the store fails.
    pub fn commit_run(&self, run: RunId) -> Result<usize> {
        convert::commit_run(&self.store, run)
    }

    /// Re-opens a loaded record for replacement by the next harvest.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HarvestError::Store`] for an unknown id or a store failure.
    pub fn reopen(&self, id: EntityId) -> Result<bool> {
        convert::reopen(&self.store, id)
    }
}

impl<T, S, R> Harvester<T, S, R>
where
    T: Transport,
    S: EntityStore + Sync,
    R: LanguageTagRegistry + Sync,
{
    /// Runs `jobs` with one worker thread per handler.
    ///
    /// Jobs for the same handler run in order on that handler's worker, so a
    /// handler never sees overlapping runs. Outcomes come back in job order.
    pub fn harvest_all(&self, jobs: Vec<HarvestJob>, cancel: &CancellationToken) -> Vec<HarvestOutcome> {
        let total = jobs.len();
        let mut by_handler: IndexMap<String, Vec<(usize, HarvestJob)>> = IndexMap::new();
        for (index, job) in jobs.into_iter().enumerate() {
            by_handler.entry(job.handler.clone()).or_default().push((index, job));
        }
        info!(jobs = total, workers = by_handler.len(), "harvesting handlers");

        let (sender, receiver) = bounded(total.max(1));
        std::thread::scope(|scope| {
            for (_, queue) in by_handler {
                let sender = sender.clone();
                scope.spawn(move || {
                    for (index, job) in queue {
                        let result = self.harvest(&job, cancel);
                        let outcome = HarvestOutcome {
                            handler: job.handler,
                            result,
                        };
                        if sender.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(sender);

        let mut slots: Vec<Option<HarvestOutcome>> = (0..total).map(|_| None).collect();
        for (index, outcome) in receiver.iter() {
            slots[index] = Some(outcome);
        }
        slots.into_iter().flatten().collect()
    }
}
