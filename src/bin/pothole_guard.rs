//! pothole_guard - road defect analysis for images, recordings, and live cameras
//!
//! Runs one analysis session:
//! 1. Loads configuration (defaults, config file, environment)
//! 2. Brings up the detector and reports whether it is online
//! 3. Streams frames from the chosen source through the analysis loop
//! 4. Prints the session summary and incident history (most recent first)

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;

use pothole_guard::ui::Ui;
use pothole_guard::{
    load_backend, AnalysisSession, DetectorStatus, DirectorySink, FanoutSink, FrameAnalysisLoop,
    FrameSource, GuardConfig, LogSink, LoopOutcome, SessionSummary, SourceKind, StopSignal,
};

#[derive(Parser, Debug)]
#[command(
    name = "pothole_guard",
    version,
    about = "Detect potholes in images, video files, and live camera feeds"
)]
struct Args {
    /// Config file (JSON, or TOML by extension). Defaults to $POTHOLE_CONFIG.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write annotated frames to this directory
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse a single still image
    Image {
        /// Image path (JPEG / PNG) or stub://name
        path: String,
    },
    /// Analyse a recording frame by frame
    Video {
        /// Video file, directory of stills, or stub://name
        path: String,
    },
    /// Analyse a live camera until Ctrl-C
    Live {
        /// Camera device or stub://name
        #[arg(long, default_value = "/dev/video0")]
        device: String,
    },
}

impl Command {
    fn target(&self) -> (SourceKind, &str) {
        match self {
            Command::Image { path } => (SourceKind::Image, path.as_str()),
            Command::Video { path } => (SourceKind::Video, path.as_str()),
            Command::Live { device } => (SourceKind::Live, device.as_str()),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = {
        let _stage = ui.stage("Load configuration");
        match &args.config {
            Some(path) => GuardConfig::load_from(Some(path.as_path()))?,
            None => GuardConfig::load()?,
        }
    };
    let (kind, location) = args.command.target();

    let backend = {
        let _stage = ui.stage("Load detector");
        load_backend(&cfg.detector)
    };
    let backend = match backend {
        Ok(backend) => backend,
        Err(err) => {
            println!(
                "{}",
                DetectorStatus::Offline {
                    reason: err.to_string()
                }
            );
            return Err(anyhow!(err).context(format!(
                "detector '{}' could not be loaded from {}",
                cfg.detector.backend,
                cfg.detector.model_path.display()
            )));
        }
    };
    let mut session = AnalysisSession::init(backend, kind, cfg.analysis.clone())
        .context("start analysis session")?;

    let mut source = FrameSource::open(kind, location, &cfg.source)
        .with_context(|| format!("open {} source {}", kind, location))?;

    let mut sink = FanoutSink::new().with(LogSink::new()).with(ui.telemetry());
    if let Some(dir) = args.out.clone().or_else(|| cfg.output_dir.clone()) {
        sink.push(Box::new(DirectorySink::create(dir)?));
    }

    let stop = StopSignal::new();
    if kind == SourceKind::Live {
        let handler_stop = stop.clone();
        ctrlc::set_handler(move || handler_stop.stop()).context("install Ctrl-C handler")?;
        log::info!("pothole_guard: press Ctrl-C to stop the live feed");
    }

    let report = {
        let _stage = ui.stage(&format!("Analyse {}", kind));
        FrameAnalysisLoop::new(&mut session, stop)
            .with_decode_failure_limit(cfg.source.max_consecutive_decode_failures)
            .run(&mut source, &mut sink)
    };
    drop(sink);

    let summary = session.teardown();
    print_summary(&summary);
    println!(
        "frames delivered: {} (undecodable: {}, display failures: {})",
        report.frames_delivered, report.decode_failures, report.sink_failures
    );

    match report.outcome {
        LoopOutcome::Exhausted | LoopOutcome::Cancelled => Ok(()),
        LoopOutcome::DetectorLost(reason) => Err(anyhow!("detector went offline: {}", reason)),
        LoopOutcome::SourceFailed(reason) => Err(anyhow!("source failed: {}", reason)),
    }
}

fn print_summary(summary: &SessionSummary) {
    println!();
    println!("{}", summary.detector);
    println!(
        "{} session: {} frames analysed, {} skipped",
        summary.kind, summary.frames_processed, summary.frames_skipped
    );
    println!("peak defects: {}", summary.peak_count);
    println!("status: {} - {}", summary.status.headline(), summary.status.advice());

    if summary.incidents.is_empty() {
        println!("history: no incidents recorded");
        return;
    }
    println!(
        "history ({} shown of {}):",
        summary.incidents.len(),
        summary.total_incidents
    );
    for entry in &summary.incidents {
        println!("  {}", entry);
    }
}
