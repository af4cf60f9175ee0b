use std::collections::HashSet;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use rand::SeedableRng;
use rand::rngs::StdRng;

use geofetch::app::{App, RunOptions};
use geofetch::config::ResolvedConfig;
use geofetch::error::GeoError;
use geofetch::executor::{EntryStatus, ExecutionMode, Executor, ExecutorOptions, ExistingPolicy};
use geofetch::manifest::{ManifestHandle, ManifestStore};
use geofetch::output::JsonOutput;
use geofetch::params::RawParameters;
use geofetch::plan::CommandEntry;
use geofetch::sources::Registry;
use geofetch::transfer::{TransferClient, TransferInfo};
use geofetch::validate::{ProbeMethod, UrlProbe, Validator, all_ok};

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
        let mut guard = self.calls.lock().unwrap();
        *guard += 1;
        std::fs::write(entry.destination.as_std_path(), b"shapefile bytes").unwrap();
        Ok(TransferInfo {
            http_status: Some(200),
            bytes: 15,
        })
    }
}

#[derive(Default)]
struct FailingTransfer {
    calls: Mutex<usize>,
}

impl TransferClient for FailingTransfer {
    fn fetch(
        &self,
        entry: &CommandEntry,
        _use_credentials: bool,
    ) -> Result<TransferInfo, GeoError> {
        let mut guard = self.calls.lock().unwrap();
        *guard += 1;
        Err(GeoError::Transfer {
            url: entry.url.clone(),
            reason: "The requested URL returned error: 404".to_string(),
            status: Some(404),
        })
    }
}

#[derive(Default)]
struct CountingProbe {
    status: u16,
    seen: Mutex<Vec<String>>,
}

impl UrlProbe for CountingProbe {
    fn status(&self, url: &str, _method: ProbeMethod) -> Result<u16, GeoError> {
        self.seen.lock().unwrap().push(url.to_string());
        Ok(self.status)
    }
}

struct OfflineProbe;

impl UrlProbe for OfflineProbe {
    fn status(&self, _url: &str, _method: ProbeMethod) -> Result<u16, GeoError> {
        Err(GeoError::Http("dns error".to_string()))
    }
}

fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, dir)
}

fn smoke(dir: &Utf8PathBuf, start: &str, end: &str) -> RawParameters {
    RawParameters {
        dataset: "noaa_hms_smoke".to_string(),
        start: Some(start.to_string()),
        end: Some(end.to_string()),
        output_directory: Some(dir.to_string()),
        acknowledge: true,
        ..RawParameters::default()
    }
}

fn app<T: TransferClient, P: UrlProbe>(transfer: T, probe: P) -> App<T, P> {
    App::new(
        Registry::with_defaults(),
        ResolvedConfig::default(),
        transfer,
        probe,
    )
}

#[test]
fn plan_writes_readable_manifest() {
    let (_temp, dir) = temp_dir();
    let app = app(WritingTransfer::default(), OfflineProbe);
    let plan = app
        .plan(smoke(&dir, "2023-12-28", "2024-01-02"), &JsonOutput)
        .unwrap();
    assert_eq!(plan.manifest, "hms_smoke_20231228_20240102_curl_commands");
    assert_eq!(
        plan.path,
        dir.join("hms_smoke_20231228_20240102_curl_commands.txt").to_string()
    );

    let manifest = ManifestStore::read(&ManifestHandle::new(plan.path)).unwrap();
    assert_eq!(manifest.len(), 6);
    assert_eq!(manifest.name, plan.manifest);
}

#[test]
fn skip_mode_touches_nothing() {
    let (_temp, dir) = temp_dir();
    let app = app(WritingTransfer::default(), OfflineProbe);
    let plan = app
        .plan(smoke(&dir, "2024-01-01", "2024-01-04"), &JsonOutput)
        .unwrap();
    let handle = ManifestHandle::new(plan.path);

    let result = app.execute(&handle, ExecutionMode::Skip, &JsonOutput).unwrap();
    assert_eq!(result.attempted, 0);
    assert_eq!(result.skipped, 4);
    assert!(result.items.iter().all(|item| item.status == "not_run"));
    assert!(!dir.join("hms_smoke20240101.zip").exists());
}

#[test]
fn rerun_skips_present_destinations() {
    let (_temp, dir) = temp_dir();
    let transfer = WritingTransfer::default();
    let app = app(transfer, OfflineProbe);
    let plan = app
        .plan(smoke(&dir, "2024-05-01", "2024-05-03"), &JsonOutput)
        .unwrap();
    let handle = ManifestHandle::new(plan.path);

    let first = app.execute(&handle, ExecutionMode::Execute, &JsonOutput).unwrap();
    assert_eq!(first.succeeded, 3);
    let second = app.execute(&handle, ExecutionMode::Execute, &JsonOutput).unwrap();
    assert_eq!(second.attempted, 0);
    assert!(second.items.iter().all(|item| item.status == "already_present"));
}

#[test]
fn overwrite_policy_transfers_again() {
    let (_temp, dir) = temp_dir();
    let manifest_app = app(WritingTransfer::default(), OfflineProbe);
    let plan = manifest_app
        .plan(smoke(&dir, "2024-05-01", "2024-05-02"), &JsonOutput)
        .unwrap();
    let manifest = ManifestStore::read(&ManifestHandle::new(plan.path)).unwrap();

    let client = WritingTransfer::default();
    for policy in [ExistingPolicy::SkipExisting, ExistingPolicy::Overwrite] {
        let options = ExecutorOptions {
            existing: policy,
            ..ExecutorOptions::default()
        };
        Executor::new(&client, options).run(&manifest, ExecutionMode::Execute);
    }
    assert_eq!(*client.calls.lock().unwrap(), 4);
}

#[test]
fn historic_range_fails_per_entry_without_aborting() {
    let (_temp, dir) = temp_dir();
    let app = app(
        FailingTransfer::default(),
        CountingProbe {
            status: 404,
            ..CountingProbe::default()
        },
    );
    let plan = app
        .plan(smoke(&dir, "1800-01-01", "1800-01-02"), &JsonOutput)
        .unwrap();
    let handle = ManifestHandle::new(plan.path);

    let validation = app
        .validate(&handle, 5, ProbeMethod::Head, &JsonOutput)
        .unwrap();
    assert_eq!(validation.results.len(), 2);
    assert!(validation.results.iter().all(|result| !result.ok));
    assert!(!validation.all_ok);

    let manifest = ManifestStore::read(&handle).unwrap();
    let client = FailingTransfer::default();
    let report = Executor::new(&client, ExecutorOptions::default())
        .run(&manifest, ExecutionMode::Execute);
    assert_eq!(report.attempted(), 2);
    assert_eq!(report.failed(), 2);
    for outcome in &report.outcomes {
        assert_matches!(
            &outcome.status,
            EntryStatus::Failed(GeoError::Transfer {
                status: Some(404),
                ..
            })
        );
    }
}

#[test]
fn validation_samples_distinct_entries() {
    let (_temp, dir) = temp_dir();
    let planner = app(WritingTransfer::default(), OfflineProbe);
    let plan = planner
        .plan(smoke(&dir, "2024-02-01", "2024-02-29"), &JsonOutput)
        .unwrap();
    let manifest = ManifestStore::read(&ManifestHandle::new(plan.path)).unwrap();
    assert_eq!(manifest.len(), 29);

    for (requested, expected) in [(5, 5), (29, 29), (100, 29)] {
        let probe = CountingProbe {
            status: 200,
            ..CountingProbe::default()
        };
        let mut rng = StdRng::seed_from_u64(requested as u64);
        let results =
            Validator::new(&probe).validate(&manifest, requested, ProbeMethod::Get, &mut rng);
        assert_eq!(results.len(), expected);
        let seen = probe.seen.lock().unwrap();
        let unique: HashSet<_> = seen.iter().collect();
        assert_eq!(unique.len(), expected);
        assert!(all_ok(&results));

        let positions: Vec<_> = results
            .iter()
            .map(|result| {
                manifest
                    .entries
                    .iter()
                    .position(|entry| entry.url == result.url)
                    .unwrap()
            })
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }
}

#[test]
fn network_errors_mark_probe_unreachable() {
    let (_temp, dir) = temp_dir();
    let app = app(WritingTransfer::default(), OfflineProbe);
    let plan = app
        .plan(smoke(&dir, "2024-02-01", "2024-02-03"), &JsonOutput)
        .unwrap();
    let result = app
        .validate(&ManifestHandle::new(plan.path), 2, ProbeMethod::Head, &JsonOutput)
        .unwrap();
    assert_eq!(result.results.len(), 2);
    assert!(result.results.iter().all(|r| r.http_status.is_none() && !r.ok));
}

#[test]
fn planning_errors_leave_no_manifest() {
    let (_temp, dir) = temp_dir();
    let app = app(WritingTransfer::default(), OfflineProbe);
    let mut params = smoke(&dir, "2024-01-01", "2024-01-02");
    params.format = Some("geojson".to_string());
    let err = app.plan(params, &JsonOutput).unwrap_err();
    assert_matches!(err, GeoError::UnsupportedFormat { .. });
    assert_eq!(std::fs::read_dir(dir.as_std_path()).unwrap().count(), 0);
}

#[test]
fn run_in_skip_mode_keeps_manifest() {
    let (_temp, dir) = temp_dir();
    let app = app(WritingTransfer::default(), OfflineProbe);
    let options = RunOptions {
        mode: ExecutionMode::Skip,
        remove_manifest: true,
        ..RunOptions::default()
    };
    let result = app
        .run(smoke(&dir, "2024-01-01", "2024-01-02"), &options, &JsonOutput)
        .unwrap();
    assert_eq!(result.execution.unwrap().attempted, 0);
    assert!(!result.manifest_removed);
    assert!(Utf8PathBuf::from(&result.plan.path).exists());
}
