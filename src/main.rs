// FormSnap - main.rs
//
// Application entry point. Handles:
// 1. CLI argument parsing
// 2. Configuration loading (config.toml + CLI overrides)
// 3. Logging initialisation (debug mode support)
// 4. Termination signal handling
// 5. Mode/path prompts, discovery, the run itself, and the final tally

use formsnap::app::prompt::{self, RunMode};
use formsnap::app::runner::{Harness, RunSettings};
use formsnap::core::discovery;
use formsnap::core::model::{BatchTally, ProjectDescriptor};
use formsnap::core::patch::ResourcePatcher;
use formsnap::core::reaper::ProcessReaper;
use formsnap::core::report::{self, BatchReport};
use formsnap::core::window::WindowObserver;
use formsnap::platform::command::ShellCommandRunner;
use formsnap::platform::config::{self, HarnessConfig, PlatformPaths};
use formsnap::platform::desktop::XcapDesktop;
use formsnap::platform::process::SystemProcessTable;
use formsnap::util::constants;
use formsnap::util::error::HarnessError;
use formsnap::util::logging::{self, LogOptions, LoggingContext};

use clap::Parser;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// FormSnap - build, launch and screenshot WinForms sample projects.
///
/// Point FormSnap at a project directory, or at a tree containing `CS`
/// folders of projects, to clean, restore, build and run each one, capture
/// its main window, and tear the process tree down again.
#[derive(Parser, Debug)]
#[command(name = "FormSnap", version, about)]
struct Cli {
    /// Project directory (single mode) or root directory (batch mode).
    /// Prompted for if omitted.
    path: Option<PathBuf>,

    /// Run mode. Prompted for if omitted.
    #[arg(short = 'm', long = "mode", value_enum)]
    mode: Option<RunMode>,

    /// Icon to embed into each project's entry form before building.
    #[arg(short = 'i', long = "icon")]
    icon: Option<PathBuf>,

    /// Configuration file (default: platform config directory).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Write a JSON report of the run to this file.
    #[arg(short = 'r', long = "report")]
    report: Option<PathBuf>,

    /// Do not reap leftover processes that reference the project directory.
    #[arg(long = "no-sweep")]
    no_sweep: bool,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

type LogSlot = Arc<Mutex<Option<LoggingContext>>>;

fn main() {
    let cli = Cli::parse();

    // Configuration comes first: it decides where the log files go.
    let (mut config, config_warnings) = match &cli.config {
        Some(path) => match config::load_config_file(path) {
            Ok(loaded) => loaded,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(2);
            }
        },
        None => config::load_config(&PlatformPaths::resolve().config_file()),
    };
    if let Some(icon) = &cli.icon {
        config.icon = Some(icon.clone());
    }
    if cli.no_sweep {
        config.sweep_strays = false;
    }

    let log_context = match logging::init(&LogOptions {
        debug_flag: cli.debug,
        config_level: config.log_level.clone(),
        log_dir: config.log_dir.clone(),
        info_log: config.info_log,
    }) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: failed to initialise logging: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        logs = %log_context.log_dir().display(),
        "FormSnap starting"
    );
    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Configuration warning");
    }

    let slot: LogSlot = Arc::new(Mutex::new(Some(log_context)));
    install_signal_handler(Arc::clone(&slot));

    let code = match run(&cli, config) {
        Ok(tally) if tally.failed == 0 => 0,
        Ok(_) => 1,
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            2
        }
    };

    shutdown_logging(&slot);
    std::process::exit(code);
}

/// Exit promptly on Ctrl+C / SIGTERM, flushing the log files first.
fn install_signal_handler(slot: LogSlot) {
    let result = ctrlc::set_handler(move || {
        tracing::warn!("Received termination signal. Exiting gracefully...");
        println!("\nReceived termination signal. Exiting gracefully...");
        shutdown_logging(&slot);
        std::process::exit(0);
    });
    if let Err(e) = result {
        tracing::warn!(error = %e, "Could not install termination signal handler");
    }
}

fn shutdown_logging(slot: &LogSlot) {
    let taken = match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    if let Some(ctx) = taken {
        ctx.shutdown();
    }
}

fn run(cli: &Cli, config: HarnessConfig) -> Result<BatchTally, HarnessError> {
    let started_at = chrono::Local::now();

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    let mode = match cli.mode {
        Some(mode) => mode,
        None => prompt::prompt_mode(&mut input, &mut output).map_err(prompt_error)?,
    };
    let root = match &cli.path {
        Some(path) => PathBuf::from(prompt::clean_path_input(&path.to_string_lossy())),
        None => prompt::prompt_path(&mut input, &mut output, mode).map_err(prompt_error)?,
    };
    tracing::info!(?mode, path = %root.display(), "Target selected");

    let projects = match mode {
        RunMode::Single => vec![discovery::describe_project(&root, &config.discovery)?],
        RunMode::Batch => {
            let projects = discovery::discover_projects(&root, &config.discovery)?;
            print_project_list(&projects);
            projects
        }
    };

    let patcher = config
        .icon
        .as_deref()
        .map(ResourcePatcher::new)
        .transpose()?;
    if let Some(p) = &patcher {
        tracing::info!(icon = %p.icon_path().display(), "Icon patching enabled");
    }

    let harness = Harness::new(
        ShellCommandRunner::new(),
        WindowObserver::new(XcapDesktop::new(), config.timing, &config.extra_deny_list),
        ProcessReaper::new(SystemProcessTable::new(), config.reap_timeout),
        patcher,
        RunSettings {
            templates: config.commands.clone(),
            cooldown: config.cooldown,
            sweep_strays: config.sweep_strays,
        },
    );

    tracing::info!(projects = projects.len(), "Starting processing");
    let (tally, outcomes) = harness.run_batch(&projects);

    println!("\n{}", report::format_summary(&tally));
    tracing::info!(
        projects = tally.projects,
        succeeded = tally.succeeded,
        failed = tally.failed,
        "Processing completed"
    );

    if let Some(report_path) = &cli.report {
        let report = BatchReport::new(&root, started_at, tally, outcomes);
        if let Err(e) = report.save(report_path) {
            tracing::error!(error = %e, "Could not write report");
        }
    }

    Ok(tally)
}

fn print_project_list(projects: &[ProjectDescriptor]) {
    println!("\nFound {} project(s) to process:", projects.len());
    for (i, project) in projects.iter().enumerate() {
        println!("  {}. {}", i + 1, project.dir.display());
    }
    println!();
}

fn prompt_error(source: io::Error) -> HarnessError {
    HarnessError::Io {
        path: Path::new("<stdin>").to_path_buf(),
        operation: "read prompt answer",
        source,
    }
}
