//! Frame loop that draws a running flow with `indicatif`.

use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use millennium_installer::{FlowStatus, Orchestrator, Phase};

/// Time between two polls of the scheduler snapshot.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Resolution of the bar; progress is a fraction in `[0, 1]`.
const BAR_LENGTH: u64 = 1000;

const BAR_TEMPLATE: &str = "{prefix:.bold.dim} [{bar:40.cyan/blue}] {percent:>3}% {msg}";

struct FlowBar {
    bar: ProgressBar,
}

impl FlowBar {
    fn new() -> Self {
        let bar = ProgressBar::new(BAR_LENGTH);
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }

    fn draw(&self, status: &FlowStatus) {
        let snapshot = &status.snapshot;
        self.bar
            .set_prefix(format!("[{}/{}]", snapshot.step.max(1), snapshot.step_count));
        let message = if status.phase == Phase::Extracting && snapshot.detail < 1.0 {
            format!("{} (file {:.0}%)", snapshot.status, snapshot.detail * 100.0)
        } else {
            snapshot.status.clone()
        };
        self.bar.set_message(message);
        self.bar.set_position(position(snapshot.progress));
    }

    fn finish(&self, status: &FlowStatus) {
        match &status.phase {
            Phase::Failed(reason) => self.bar.abandon_with_message(format!("failed: {reason}")),
            _ => {
                self.bar.set_position(BAR_LENGTH);
                self.bar.finish_with_message("done");
            }
        }
    }
}

fn position(progress: f64) -> u64 {
    (progress.clamp(0.0, 1.0) * BAR_LENGTH as f64).round() as u64
}

/// Polls the running flow once per frame until it is done, then joins it.
pub fn drive(orchestrator: &mut Orchestrator) -> Option<FlowStatus> {
    let bar = FlowBar::new();
    while let Some(status) = orchestrator.poll() {
        bar.draw(&status);
        if status.is_done() {
            break;
        }
        thread::sleep(FRAME_INTERVAL);
    }
    let status = orchestrator.wait()?;
    bar.finish(&status);
    Some(status)
}

/// Spinner shown while blocking on a single request.
pub fn spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}
