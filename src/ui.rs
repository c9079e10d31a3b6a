use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::analysis::{FrameAnalysis, SeverityStatus};
use crate::detect::DetectorStatus;
use crate::error::AnalysisError;
use crate::sink::PresentationSink;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = spinner();
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Per-frame counters for the terminal.
    pub fn telemetry(&self) -> TelemetrySink {
        let spinner = self.use_pretty().then(spinner);
        TelemetrySink {
            spinner,
            last_status: None,
            frames: 0,
        }
    }
}

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.enable_steady_tick(Duration::from_millis(120));
    let style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Live metrics line: current count, peak count, status.
///
/// On a TTY the line is redrawn in place; otherwise only incidents and status
/// changes are printed.
pub struct TelemetrySink {
    spinner: Option<ProgressBar>,
    last_status: Option<SeverityStatus>,
    frames: u64,
}

impl TelemetrySink {
    pub fn frames_shown(&self) -> u64 {
        self.frames
    }
}

impl PresentationSink for TelemetrySink {
    fn present(&mut self, analysis: &FrameAnalysis) -> Result<(), AnalysisError> {
        self.frames += 1;
        let line = metrics_line(analysis);
        let status_changed = self.last_status != Some(analysis.status);
        self.last_status = Some(analysis.status);

        match &self.spinner {
            Some(spinner) => {
                if let Some(entry) = &analysis.new_entry {
                    spinner.println(format!("  {}", entry));
                }
                spinner.set_message(line);
            }
            None => {
                if let Some(entry) = &analysis.new_entry {
                    eprintln!("  {}", entry);
                }
                if status_changed {
                    eprintln!("{line}");
                }
            }
        }
        Ok(())
    }

    fn detector_status(&mut self, status: &DetectorStatus) {
        match &self.spinner {
            Some(spinner) => spinner.println(status.to_string()),
            None => eprintln!("{}", status),
        }
    }
}

impl Drop for TelemetrySink {
    fn drop(&mut self) {
        if let Some(spinner) = &self.spinner {
            spinner.finish_and_clear();
        }
    }
}

fn metrics_line(analysis: &FrameAnalysis) -> String {
    format!(
        "frame {} | current {} | peak {} | {}",
        analysis.annotated.index, analysis.current_count, analysis.peak_count, analysis.status
    )
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
