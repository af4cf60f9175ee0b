use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use geofetch::app::{App, ExecuteResult, ProgressSink, RunOptions, RunResult, ValidateResult};
use geofetch::config::ConfigLoader;
use geofetch::error::GeoError;
use geofetch::executor::ExecutionMode;
use geofetch::manifest::ManifestHandle;
use geofetch::output::{JsonOutput, TextProgress};
use geofetch::params::RawParameters;
use geofetch::sources::Registry;
use geofetch::transfer::SystemTransferClient;
use geofetch::validate::{HttpProbe, ProbeMethod};

const EXIT_BATCH_FAILED: u8 = 4;

#[derive(Parser)]
#[command(name = "geofetch")]
#[command(about = "Plan, validate and execute batch downloads from geoscience data archives")]
#[command(version, author)]
struct Cli {
    /// Path to geofetch.json (default: ./geofetch.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List registered datasets")]
    Datasets,
    #[command(about = "Write a command manifest without downloading")]
    Plan(PlanArgs),
    #[command(about = "Run the transfers listed in a manifest")]
    Execute(ExecuteArgs),
    #[command(about = "Probe a random sample of manifest URLs")]
    Validate(ValidateArgs),
    #[command(about = "Plan, optionally validate, then execute")]
    Run(RunArgs),
}

#[derive(Args, Clone)]
struct PlanArgs {
    /// Dataset id, see `geofetch datasets`
    dataset: String,

    #[arg(long)]
    start: Option<String>,

    #[arg(long)]
    end: Option<String>,

    #[arg(long)]
    granularity: Option<String>,

    /// `region:<code>` or `bbox:<min_lon>,<min_lat>,<max_lon>,<max_lat>`
    #[arg(long)]
    selector: Option<String>,

    #[arg(long)]
    variable: Option<String>,

    #[arg(long)]
    format: Option<String>,

    #[arg(long, short = 'o')]
    output_dir: Option<String>,

    /// Confirm that a potentially large download is intended
    #[arg(long)]
    acknowledge: bool,
}

impl From<PlanArgs> for RawParameters {
    fn from(args: PlanArgs) -> Self {
        RawParameters {
            dataset: args.dataset,
            start: args.start,
            end: args.end,
            granularity: args.granularity,
            spatial_selector: args.selector,
            variable: args.variable,
            format: args.format,
            output_directory: args.output_dir,
            acknowledge: args.acknowledge,
        }
    }
}

#[derive(Args)]
struct ExecuteArgs {
    manifest: String,

    #[arg(long, value_enum, default_value_t = ExecutionMode::Execute)]
    mode: ExecutionMode,
}

#[derive(Args)]
struct ValidateArgs {
    manifest: String,

    #[arg(long, default_value_t = 5)]
    sample: usize,

    #[arg(long, value_enum, default_value_t = ProbeMethod::Head)]
    method: ProbeMethod,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    plan: PlanArgs,

    #[arg(long, value_enum, default_value_t = ExecutionMode::Execute)]
    mode: ExecutionMode,

    /// Probe this many URLs first and stop if any is unreachable
    #[arg(long)]
    validate: Option<usize>,

    #[arg(long, value_enum, default_value_t = ProbeMethod::Head)]
    method: ProbeMethod,

    #[arg(long)]
    unzip: bool,

    /// Delete archives after successful extraction
    #[arg(long, requires = "unzip")]
    cleanup: bool,

    /// Delete the manifest once every entry succeeded
    #[arg(long)]
    remove_manifest: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<GeoError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &GeoError) -> u8 {
    match error {
        err if err.is_planning() => 2,
        GeoError::Transfer { .. }
        | GeoError::AuthenticationRequired { .. }
        | GeoError::Http(_)
        | GeoError::MissingTool(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<u8> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let probe = HttpProbe::new(config.probe_timeout, &config.user_agent)?;
    let transfer = SystemTransferClient::new(config.transfer_settings());
    let app = App::new(Registry::with_defaults(), config, transfer, probe);

    let text = TextProgress::new();
    let sink: &dyn ProgressSink = if cli.json { &JsonOutput } else { &text };

    match cli.command {
        Commands::Datasets => {
            let result = app.datasets();
            if cli.json {
                JsonOutput::print_datasets(&result).into_diagnostic()?;
            } else {
                for dataset in &result.datasets {
                    let auth = if dataset.requires_auth { " [login]" } else { "" };
                    println!(
                        "{:<18} {:<7} {:<28} {}{auth}",
                        dataset.id,
                        dataset.granularity.as_deref().unwrap_or("static"),
                        dataset.formats.join(","),
                        dataset.description
                    );
                }
            }
            Ok(0)
        }
        Commands::Plan(args) => {
            let result = app.plan(args.into(), sink)?;
            if cli.json {
                JsonOutput::print_plan(&result).into_diagnostic()?;
            } else {
                println!("{} ({} entries)", result.path, result.entries);
            }
            Ok(0)
        }
        Commands::Execute(args) => {
            let handle = ManifestHandle::new(args.manifest);
            let result = app.execute(&handle, args.mode, sink)?;
            if cli.json {
                JsonOutput::print_execute(&result).into_diagnostic()?;
            } else {
                print_execute_summary(&result);
            }
            Ok(if result.failed > 0 { EXIT_BATCH_FAILED } else { 0 })
        }
        Commands::Validate(args) => {
            let handle = ManifestHandle::new(args.manifest);
            let result = app.validate(&handle, args.sample, args.method, sink)?;
            if cli.json {
                JsonOutput::print_validate(&result).into_diagnostic()?;
            } else {
                print_validate_summary(&result);
            }
            Ok(if result.all_ok { 0 } else { EXIT_BATCH_FAILED })
        }
        Commands::Run(args) => {
            let options = RunOptions {
                mode: args.mode,
                validate: args.validate,
                probe_method: args.method,
                unzip: args.unzip,
                cleanup: args.cleanup,
                remove_manifest: args.remove_manifest,
            };
            let result = app.run(args.plan.into(), &options, sink)?;
            if cli.json {
                JsonOutput::print_run(&result).into_diagnostic()?;
            } else {
                print_run_summary(&result);
            }
            let failed = result.halted.is_some()
                || result.execution.as_ref().is_some_and(|e| e.failed > 0)
                || result.extraction.iter().any(|item| item.error.is_some());
            Ok(if failed { EXIT_BATCH_FAILED } else { 0 })
        }
    }
}

fn print_execute_summary(result: &ExecuteResult) {
    println!(
        "{}: attempted {}, transferred {}, skipped {}, failed {}",
        result.manifest, result.attempted, result.succeeded, result.skipped, result.failed
    );
    for item in result.items.iter().filter(|item| item.error.is_some()) {
        println!(
            "  failed {} -> {}: {}",
            item.url,
            item.destination,
            item.error.as_deref().unwrap_or_default()
        );
    }
}

fn print_validate_summary(result: &ValidateResult) {
    for probe in &result.results {
        let status = probe
            .http_status
            .map(|status| status.to_string())
            .unwrap_or_else(|| "---".to_string());
        let mark = if probe.ok { "ok" } else { "FAIL" };
        println!("{mark:<4} {status} {}", probe.url);
    }
    println!(
        "{}: {}",
        result.manifest,
        if result.all_ok { "all reachable" } else { "unreachable urls" }
    );
}

fn print_run_summary(result: &RunResult) {
    println!("{} ({} entries)", result.plan.path, result.plan.entries);
    if let Some(validation) = &result.validation {
        print_validate_summary(validation);
    }
    if let Some(reason) = &result.halted {
        println!("halted: {reason}");
    }
    if let Some(execution) = &result.execution {
        print_execute_summary(execution);
    }
    for item in &result.extraction {
        match &item.error {
            Some(error) => println!("  extract failed {}: {error}", item.archive),
            None => println!("  extracted {} ({} files)", item.archive, item.files.len()),
        }
    }
    let removed = result.cleanup.iter().filter(|outcome| outcome.removed).count();
    if removed > 0 {
        println!("  removed {removed} archives");
    }
    if result.manifest_removed {
        println!("  manifest removed");
    }
}
