use clap::ValueEnum;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::GeoError;
use crate::plan::{CommandEntry, CommandManifest};
use crate::transfer::TransferClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Report the plan without touching the network or the filesystem.
    Skip,
    Execute,
}

/// What to do when a destination is already on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExistingPolicy {
    #[default]
    #[serde(rename = "skip")]
    SkipExisting,
    #[serde(rename = "overwrite")]
    Overwrite,
}

#[derive(Debug)]
pub enum EntryStatus {
    NotRun,
    AlreadyPresent,
    Transferred { bytes: u64 },
    Failed(GeoError),
}

impl EntryStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EntryStatus::NotRun => "not_run",
            EntryStatus::AlreadyPresent => "already_present",
            EntryStatus::Transferred { .. } => "transferred",
            EntryStatus::Failed(_) => "failed",
        }
    }
}

#[derive(Debug)]
pub struct EntryOutcome {
    pub entry: CommandEntry,
    pub status: EntryStatus,
}

/// Per-entry outcomes in manifest order.
#[derive(Debug)]
pub struct ExecutionReport {
    pub manifest: String,
    pub mode: ExecutionMode,
    pub outcomes: Vec<EntryOutcome>,
}

impl ExecutionReport {
    /// Entries handed to the transfer client.
    pub fn attempted(&self) -> usize {
        self.count(|status| {
            matches!(status, EntryStatus::Transferred { .. } | EntryStatus::Failed(_))
        })
    }

    pub fn succeeded(&self) -> usize {
        self.count(|status| matches!(status, EntryStatus::Transferred { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|status| matches!(status, EntryStatus::Failed(_)))
    }

    /// Entries left alone, either by mode or because the file was present.
    pub fn skipped(&self) -> usize {
        self.count(|status| matches!(status, EntryStatus::NotRun | EntryStatus::AlreadyPresent))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&CommandEntry, &GeoError)> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.status {
            EntryStatus::Failed(err) => Some((&outcome.entry, err)),
            _ => None,
        })
    }

    /// Entries whose destination now holds data.
    pub fn available(&self) -> impl Iterator<Item = &CommandEntry> {
        self.outcomes
            .iter()
            .filter(|outcome| {
                matches!(
                    outcome.status,
                    EntryStatus::Transferred { .. } | EntryStatus::AlreadyPresent
                )
            })
            .map(|outcome| &outcome.entry)
    }

    fn count(&self, predicate: impl Fn(&EntryStatus) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| predicate(&outcome.status))
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub existing: ExistingPolicy,
    pub workers: usize,
    /// Dataset label used in authentication errors.
    pub dataset: String,
    pub requires_auth: bool,
    pub has_credentials: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            existing: ExistingPolicy::SkipExisting,
            workers: 1,
            dataset: String::new(),
            requires_auth: false,
            has_credentials: false,
        }
    }
}

pub struct Executor<'a> {
    client: &'a dyn TransferClient,
    options: ExecutorOptions,
}

impl<'a> Executor<'a> {
    pub fn new(client: &'a dyn TransferClient, options: ExecutorOptions) -> Self {
        Self { client, options }
    }

    pub fn run(&self, manifest: &CommandManifest, mode: ExecutionMode) -> ExecutionReport {
        self.run_with_progress(manifest, mode, &|_| {})
    }

    /// Like `run`, calling `on_entry` as each executed entry settles. Calls may
    /// come from several worker threads and in any order.
    pub fn run_with_progress(
        &self,
        manifest: &CommandManifest,
        mode: ExecutionMode,
        on_entry: &(dyn Fn(&EntryOutcome) + Sync),
    ) -> ExecutionReport {
        let process = |entry: &CommandEntry| {
            let outcome = self.process(entry);
            on_entry(&outcome);
            outcome
        };
        let outcomes: Vec<EntryOutcome> = match mode {
            ExecutionMode::Skip => manifest
                .entries
                .iter()
                .map(|entry| EntryOutcome {
                    entry: entry.clone(),
                    status: EntryStatus::NotRun,
                })
                .collect(),
            ExecutionMode::Execute if self.options.workers <= 1 || manifest.len() <= 1 => {
                manifest.entries.iter().map(process).collect()
            }
            ExecutionMode::Execute => match self.pool() {
                Ok(pool) => pool.install(|| manifest.entries.par_iter().map(process).collect()),
                Err(err) => {
                    warn!(error = %err, "worker pool unavailable; running sequentially");
                    manifest.entries.iter().map(process).collect()
                }
            },
        };

        let report = ExecutionReport {
            manifest: manifest.name.clone(),
            mode,
            outcomes,
        };
        info!(
            manifest = %report.manifest,
            attempted = report.attempted(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "execution finished"
        );
        report
    }

    fn pool(&self) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .thread_name(|index| format!("geofetch-transfer-{index}"))
            .build()
    }

    fn process(&self, entry: &CommandEntry) -> EntryOutcome {
        if self.options.existing == ExistingPolicy::SkipExisting && is_present(entry) {
            debug!(destination = %entry.destination, "already present");
            return EntryOutcome {
                entry: entry.clone(),
                status: EntryStatus::AlreadyPresent,
            };
        }

        let use_credentials = self.options.requires_auth && self.options.has_credentials;
        let status = match self.client.fetch(entry, use_credentials) {
            Ok(info) => {
                debug!(destination = %entry.destination, bytes = info.bytes, "transferred");
                EntryStatus::Transferred { bytes: info.bytes }
            }
            Err(err) => {
                let err = self.classify(entry, err);
                warn!(url = %entry.url, error = %err, "transfer failed");
                EntryStatus::Failed(err)
            }
        };
        EntryOutcome {
            entry: entry.clone(),
            status,
        }
    }

    fn classify(&self, entry: &CommandEntry, err: GeoError) -> GeoError {
        let auth_status = matches!(
            err,
            GeoError::Transfer {
                status: Some(401 | 403),
                ..
            }
        );
        let missing_credentials = self.options.requires_auth
            && !self.options.has_credentials
            && matches!(err, GeoError::Transfer { .. });
        if auth_status || missing_credentials {
            GeoError::AuthenticationRequired {
                dataset: self.options.dataset.clone(),
                url: entry.url.clone(),
            }
        } else {
            err
        }
    }
}

fn is_present(entry: &CommandEntry) -> bool {
    entry
        .destination
        .as_std_path()
        .metadata()
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}
