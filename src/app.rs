use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::error::GeoError;
use crate::executor::{EntryStatus, ExecutionMode, ExecutionReport, Executor, ExecutorOptions};
use crate::manifest::{ManifestHandle, ManifestStore};
use crate::params::{Normalizer, RawParameters};
use crate::plan::{CommandEntry, CommandManifest, PlanBuilder};
use crate::postprocess::{CleanupOutcome, PostProcessor};
use crate::sources::Registry;
use crate::transfer::TransferClient;
use crate::validate::{ProbeMethod, UrlProbe, ValidationResult, Validator, all_ok};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: ExecutionMode,
    /// Probe this many sampled entries before executing; a failed check halts the run.
    pub validate: Option<usize>,
    pub probe_method: ProbeMethod,
    pub unzip: bool,
    pub cleanup: bool,
    pub remove_manifest: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Execute,
            validate: None,
            probe_method: ProbeMethod::Head,
            unzip: false,
            cleanup: false,
            remove_manifest: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetsResult {
    pub datasets: Vec<DatasetEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetEntry {
    pub id: String,
    pub description: String,
    pub granularity: Option<String>,
    pub formats: Vec<String>,
    pub variables: Vec<String>,
    pub selector: String,
    pub transfer_method: String,
    pub requires_auth: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub dataset: String,
    pub manifest: String,
    pub path: String,
    pub entries: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResult {
    pub manifest: String,
    pub mode: ExecutionMode,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub items: Vec<ExecuteItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteItem {
    pub url: String,
    pub destination: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateResult {
    pub manifest: String,
    pub method: ProbeMethod,
    pub all_ok: bool,
    pub results: Vec<ValidationResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionItem {
    pub archive: String,
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub plan: PlanResult,
    pub validation: Option<ValidateResult>,
    pub execution: Option<ExecuteResult>,
    pub extraction: Vec<ExtractionItem>,
    pub cleanup: Vec<CleanupOutcome>,
    pub manifest_removed: bool,
    /// Set when the run stopped before execution.
    pub halted: Option<String>,
}

impl From<&ExecutionReport> for ExecuteResult {
    fn from(report: &ExecutionReport) -> Self {
        let items = report
            .outcomes
            .iter()
            .map(|outcome| ExecuteItem {
                url: outcome.entry.url.clone(),
                destination: outcome.entry.destination.to_string(),
                status: outcome.status.label().to_string(),
                error: match &outcome.status {
                    EntryStatus::Failed(err) => Some(err.to_string()),
                    _ => None,
                },
            })
            .collect();
        Self {
            manifest: report.manifest.clone(),
            mode: report.mode,
            attempted: report.attempted(),
            succeeded: report.succeeded(),
            failed: report.failed(),
            skipped: report.skipped(),
            items,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

/// Receives phase messages plus per-entry ticks for counted phases. Ticks may
/// arrive from transfer worker threads.
pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);

    fn begin(&self, _phase: &str, _total: u64) {}

    fn advance(&self) {}

    fn finish(&self) {}
}

pub struct App<T: TransferClient, P: UrlProbe> {
    registry: Registry,
    config: ResolvedConfig,
    transfer: T,
    probe: P,
}

impl<T: TransferClient, P: UrlProbe> App<T, P> {
    pub fn new(registry: Registry, config: ResolvedConfig, transfer: T, probe: P) -> Self {
        Self {
            registry,
            config,
            transfer,
            probe,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn datasets(&self) -> DatasetsResult {
        let datasets = self
            .registry
            .adapters()
            .map(|adapter| DatasetEntry {
                id: adapter.dataset_id().to_string(),
                description: adapter.description().to_string(),
                granularity: adapter.granularity().map(|g| g.to_string()),
                formats: adapter.formats().iter().map(|f| f.to_string()).collect(),
                variables: adapter.variables().iter().map(|v| v.to_string()).collect(),
                selector: format!("{:?}", adapter.selector_kind()).to_ascii_lowercase(),
                transfer_method: adapter.transfer_method().to_string(),
                requires_auth: adapter.requires_auth(),
            })
            .collect();
        DatasetsResult { datasets }
    }

    /// Normalizes, plans and persists; nothing is downloaded.
    pub fn plan(
        &self,
        raw: RawParameters,
        sink: &dyn ProgressSink,
    ) -> Result<PlanResult, GeoError> {
        let (_, _, result) = self.plan_inner(raw, sink)?;
        Ok(result)
    }

    fn plan_inner(
        &self,
        raw: RawParameters,
        sink: &dyn ProgressSink,
    ) -> Result<(ManifestHandle, CommandManifest, PlanResult), GeoError> {
        let start = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Plan; dataset={}", raw.dataset.trim()),
            elapsed: None,
        });
        let descriptor = Normalizer::normalize(raw, &self.registry)?;
        let adapter = self.registry.lookup(&descriptor.dataset_id)?;
        let manifest = PlanBuilder::build(&descriptor, adapter)?;
        let store = ManifestStore::new(descriptor.output_directory.clone());
        let handle = store.write(&manifest)?;

        sink.event(ProgressEvent {
            message: format!("phase=Plan; wrote {} ({} entries)", handle, manifest.len()),
            elapsed: Some(start.elapsed()),
        });
        let result = PlanResult {
            dataset: descriptor.dataset_id,
            manifest: manifest.name.clone(),
            path: handle.to_string(),
            entries: manifest.len(),
        };
        Ok((handle, manifest, result))
    }

    pub fn execute(
        &self,
        handle: &ManifestHandle,
        mode: ExecutionMode,
        sink: &dyn ProgressSink,
    ) -> Result<ExecuteResult, GeoError> {
        let manifest = ManifestStore::read(handle)?;
        let report = self.execute_manifest(&manifest, mode, sink);
        Ok(ExecuteResult::from(&report))
    }

    fn executor_options(&self, manifest_name: &str) -> ExecutorOptions {
        let adapter = self.registry.for_manifest(manifest_name);
        ExecutorOptions {
            existing: self.config.existing,
            workers: self.config.workers,
            dataset: adapter
                .map(|adapter| adapter.dataset_id().to_string())
                .unwrap_or_else(|| manifest_name.to_string()),
            requires_auth: adapter.is_some_and(|adapter| adapter.requires_auth()),
            has_credentials: self.config.credentials_file.is_some(),
        }
    }

    fn execute_manifest(
        &self,
        manifest: &CommandManifest,
        mode: ExecutionMode,
        sink: &dyn ProgressSink,
    ) -> ExecutionReport {
        let start = Instant::now();
        sink.event(ProgressEvent {
            message: format!(
                "phase=Execute; {} entries, mode={:?}",
                manifest.len(),
                mode
            ),
            elapsed: None,
        });
        let executor = Executor::new(&self.transfer, self.executor_options(&manifest.name));
        let report = match mode {
            ExecutionMode::Skip => executor.run(manifest, mode),
            ExecutionMode::Execute => {
                sink.begin("Execute", manifest.len() as u64);
                let report = executor.run_with_progress(manifest, mode, &|_| sink.advance());
                sink.finish();
                report
            }
        };
        sink.event(ProgressEvent {
            message: format!(
                "phase=Execute; transferred={} present={} failed={}",
                report.succeeded(),
                report.skipped(),
                report.failed()
            ),
            elapsed: Some(start.elapsed()),
        });
        report
    }

    pub fn validate(
        &self,
        handle: &ManifestHandle,
        sample_size: usize,
        method: ProbeMethod,
        sink: &dyn ProgressSink,
    ) -> Result<ValidateResult, GeoError> {
        self.validate_with_rng(handle, sample_size, method, &mut rand::rng(), sink)
    }

    pub fn validate_with_rng<R: Rng + ?Sized>(
        &self,
        handle: &ManifestHandle,
        sample_size: usize,
        method: ProbeMethod,
        rng: &mut R,
        sink: &dyn ProgressSink,
    ) -> Result<ValidateResult, GeoError> {
        let manifest = ManifestStore::read(handle)?;
        Ok(self.validate_manifest(&manifest, sample_size, method, rng, sink))
    }

    fn validate_manifest<R: Rng + ?Sized>(
        &self,
        manifest: &CommandManifest,
        sample_size: usize,
        method: ProbeMethod,
        rng: &mut R,
        sink: &dyn ProgressSink,
    ) -> ValidateResult {
        let start = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Validate; sampling {sample_size} of {}", manifest.len()),
            elapsed: None,
        });
        sink.begin("Validate", sample_size.min(manifest.len()) as u64);
        let results = Validator::new(&self.probe).validate_with_progress(
            manifest,
            sample_size,
            method,
            rng,
            &|_| sink.advance(),
        );
        sink.finish();
        let ok = all_ok(&results);
        sink.event(ProgressEvent {
            message: format!(
                "phase=Validate; {}/{} reachable",
                results.iter().filter(|result| result.ok).count(),
                results.len()
            ),
            elapsed: Some(start.elapsed()),
        });
        ValidateResult {
            manifest: manifest.name.clone(),
            method,
            all_ok: ok,
            results,
        }
    }

    /// Plan, then optionally validate, then execute, post-process and tidy up.
    pub fn run(
        &self,
        raw: RawParameters,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, GeoError> {
        let (handle, manifest, plan) = self.plan_inner(raw, sink)?;
        let mut result = RunResult {
            plan,
            validation: None,
            execution: None,
            extraction: Vec::new(),
            cleanup: Vec::new(),
            manifest_removed: false,
            halted: None,
        };

        if let Some(sample_size) = options.validate {
            let validation = self.validate_manifest(
                &manifest,
                sample_size,
                options.probe_method,
                &mut rand::rng(),
                sink,
            );
            let passed = validation.all_ok;
            result.validation = Some(validation);
            if !passed {
                result.halted = Some("url validation failed".to_string());
                return Ok(result);
            }
        }

        let report = self.execute_manifest(&manifest, options.mode, sink);
        result.execution = Some(ExecuteResult::from(&report));
        if options.mode == ExecutionMode::Skip {
            return Ok(result);
        }

        let post = PostProcessor::new(self.executor_options(&manifest.name).dataset);
        let available: Vec<&CommandEntry> = report.available().collect();
        let mut extracted = Vec::new();
        if options.unzip {
            sink.event(ProgressEvent {
                message: format!("phase=Extract; {} files", available.len()),
                elapsed: None,
            });
        }
        for entry in available {
            let target_dir = entry
                .destination
                .parent()
                .map(|parent| parent.as_std_path().to_path_buf())
                .unwrap_or_default();
            match post.unzip(entry, &target_dir, options.unzip) {
                Ok(files) if files.is_empty() => {}
                Ok(files) => {
                    extracted.push(entry.clone());
                    result.extraction.push(ExtractionItem {
                        archive: entry.destination.to_string(),
                        files: files
                            .iter()
                            .map(|file| file.to_string_lossy().to_string())
                            .collect(),
                        error: None,
                    });
                }
                Err(err) => result.extraction.push(ExtractionItem {
                    archive: entry.destination.to_string(),
                    files: Vec::new(),
                    error: Some(err.to_string()),
                }),
            }
        }
        result.cleanup = post.cleanup(&extracted, options.cleanup);

        // Kept on failure so a re-run can resume from it.
        if options.remove_manifest && report.failed() == 0 {
            ManifestStore::remove(&handle)?;
            result.manifest_removed = true;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::output::JsonOutput;
    use crate::transfer::TransferInfo;

    #[derive(Default)]
    struct WritingTransfer {
        calls: Mutex<usize>,
    }

    impl TransferClient for WritingTransfer {
        fn fetch(
            &self,
            entry: &CommandEntry,
            _use_credentials: bool,
        ) -> Result<TransferInfo, GeoError> {
            *self.calls.lock().unwrap() += 1;
            std::fs::write(entry.destination.as_std_path(), b"payload").unwrap();
            Ok(TransferInfo {
                http_status: Some(200),
                bytes: 7,
            })
        }
    }

    struct FixedProbe(u16);

    impl UrlProbe for FixedProbe {
        fn status(&self, _url: &str, _method: ProbeMethod) -> Result<u16, GeoError> {
            Ok(self.0)
        }
    }

    fn raw(dir: &Utf8PathBuf) -> RawParameters {
        RawParameters {
            dataset: "noaa_hms_fire".to_string(),
            start: Some("2024-07-01".to_string()),
            end: Some("2024-07-03".to_string()),
            format: Some("text".to_string()),
            output_directory: Some(dir.to_string()),
            acknowledge: true,
            ..RawParameters::default()
        }
    }

    fn app(probe: u16) -> App<WritingTransfer, FixedProbe> {
        App::new(
            Registry::with_defaults(),
            ResolvedConfig::default(),
            WritingTransfer::default(),
            FixedProbe(probe),
        )
    }

    #[test]
    fn run_halts_when_validation_fails() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let app = app(404);
        let options = RunOptions {
            validate: Some(2),
            ..RunOptions::default()
        };
        let result = app.run(raw(&dir), &options, &JsonOutput).unwrap();
        assert!(result.halted.is_some());
        assert!(result.execution.is_none());
        assert_eq!(*app.transfer.calls.lock().unwrap(), 0);
    }

    #[test]
    fn run_executes_and_removes_manifest() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let app = app(200);
        let options = RunOptions {
            validate: Some(1),
            remove_manifest: true,
            ..RunOptions::default()
        };
        let result = app.run(raw(&dir), &options, &JsonOutput).unwrap();
        let execution = result.execution.unwrap();
        assert_eq!(execution.succeeded, 3);
        assert!(result.manifest_removed);
        assert!(!Utf8PathBuf::from(&result.plan.path).exists());
        assert!(dir.join("hms_fire20240702.txt").exists());
    }

    #[derive(Default)]
    struct RecordingSink {
        phases: Mutex<Vec<(String, u64)>>,
        ticks: Mutex<usize>,
        finished: Mutex<usize>,
    }

    impl ProgressSink for RecordingSink {
        fn event(&self, _event: ProgressEvent) {}

        fn begin(&self, phase: &str, total: u64) {
            self.phases.lock().unwrap().push((phase.to_string(), total));
        }

        fn advance(&self) {
            *self.ticks.lock().unwrap() += 1;
        }

        fn finish(&self) {
            *self.finished.lock().unwrap() += 1;
        }
    }

    #[test]
    fn run_ticks_each_counted_phase() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let sink = RecordingSink::default();
        let options = RunOptions {
            validate: Some(2),
            ..RunOptions::default()
        };
        app(200).run(raw(&dir), &options, &sink).unwrap();
        assert_eq!(
            *sink.phases.lock().unwrap(),
            vec![("Validate".to_string(), 2), ("Execute".to_string(), 3)]
        );
        assert_eq!(*sink.ticks.lock().unwrap(), 5);
        assert_eq!(*sink.finished.lock().unwrap(), 2);
    }

    #[test]
    fn datasets_lists_registry() {
        let listed = app(200).datasets();
        assert_eq!(listed.datasets.len(), 9);
        let merra = listed
            .datasets
            .iter()
            .find(|entry| entry.id == "merra2_slv")
            .unwrap();
        assert!(merra.requires_auth);
    }
}
