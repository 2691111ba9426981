//! Terminal progress display for `armdeploy deploy`.

use colored::Colorize;
use indexmap::IndexMap;
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::orchestrator::{DeploymentOutcome, RunPhase, StatusPresenter};
use crate::tracker::{OperationState, OrderedStatusView, TrackedResource};

/// Spinner frames.
const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Time each spinner frame stays on screen.
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Renders deployment progress on stderr.
///
/// On a terminal the resource list is redrawn in place on every status
/// update, and a spinner task of its own keeps redrawing the last view while
/// the deployment is polled; otherwise only phase changes are printed.
#[derive(Debug)]
pub struct TerminalPresenter {
    screen: Arc<Mutex<Screen>>,
    spinner: Option<JoinHandle<()>>,
}

/// What is currently on screen.
#[derive(Debug)]
struct Screen {
    interactive: bool,
    started: Instant,
    view: Option<(OrderedStatusView, usize)>,
    drawn_lines: usize,
    write_failed: bool,
}

impl TerminalPresenter {
    /// Creates a presenter writing to stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::with_interactive(io::stderr().is_terminal())
    }

    fn with_interactive(interactive: bool) -> Self {
        Self {
            screen: Arc::new(Mutex::new(Screen {
                interactive,
                started: Instant::now(),
                view: None,
                drawn_lines: 0,
                write_failed: false,
            })),
            spinner: None,
        }
    }

    fn with_screen(&self, f: impl FnOnce(&mut Screen)) {
        if let Ok(mut screen) = self.screen.lock() {
            f(&mut screen);
        }
    }

    /// Starts redrawing the last view on a fixed cadence.
    ///
    /// Needs a tokio runtime; without one the display only changes on updates.
    fn start_spinner(&mut self) {
        if self.spinner.is_some() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let screen = Arc::clone(&self.screen);
        self.spinner = Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(FRAME_INTERVAL);
            loop {
                ticker.tick().await;
                if let Ok(mut screen) = screen.lock() {
                    screen.draw();
                }
            }
        }));
    }

    fn stop_spinner(&mut self) {
        if let Some(task) = self.spinner.take() {
            task.abort();
        }
    }
}

impl Default for TerminalPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TerminalPresenter {
    fn drop(&mut self) {
        self.stop_spinner();
    }
}

impl Screen {
    fn frame(&self) -> usize {
        let ticks = self.started.elapsed().as_millis() / FRAME_INTERVAL.as_millis();
        usize::try_from(ticks).unwrap_or(0)
    }

    fn draw(&mut self) {
        if !self.interactive || self.write_failed {
            return;
        }
        let Some((view, total_expected)) = &self.view else {
            return;
        };
        let lines = render_frame(view, *total_expected, self.frame());
        let result = write_frame(self.drawn_lines, &lines);
        self.drawn_lines = lines.len();
        self.report(result);
    }

    fn print(&mut self, line: &str) {
        let result = writeln!(io::stderr(), "{line}");
        self.report(result);
    }

    /// Logs the first write failure and stops redrawing after it.
    fn report(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            if !self.write_failed {
                debug!("Progress display disabled: {e}");
                self.write_failed = true;
            }
        }
    }
}

/// Replaces the previous `previous_lines` lines on stderr with `lines`.
fn write_frame(previous_lines: usize, lines: &[String]) -> io::Result<()> {
    let mut out = io::stderr().lock();
    if previous_lines > 0 {
        write!(out, "\x1b[{previous_lines}A\x1b[J")?;
    }
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()
}

impl StatusPresenter for TerminalPresenter {
    fn phase_changed(&mut self, phase: RunPhase) {
        if phase.is_terminal() {
            self.stop_spinner();
            return;
        }
        self.with_screen(|screen| {
            screen.view = None;
            screen.drawn_lines = 0;
            screen.print(&format!("{} {}...", "→".cyan(), capitalize(&phase.to_string())));
        });
        let interactive = self.screen.lock().is_ok_and(|screen| screen.interactive);
        if phase == RunPhase::Polling && interactive {
            self.start_spinner();
        }
    }

    fn progress(&mut self, view: &OrderedStatusView, total_expected: usize) {
        self.with_screen(|screen| {
            screen.view = Some((view.clone(), total_expected));
            screen.draw();
        });
    }

    fn succeeded(&mut self, outcome: &DeploymentOutcome) {
        self.stop_spinner();
        self.with_screen(|screen| {
            screen.print(&format!(
                "{} Deployment {} finished in {:.1}s",
                "✓".green(),
                outcome.deployment_id,
                outcome.elapsed_secs
            ));
        });
    }

    fn failed(&mut self, reason: &str, errors: &IndexMap<String, String>) {
        self.stop_spinner();
        self.with_screen(|screen| {
            screen.print(&format!(
                "{} {reason} ({} failed resource(s))",
                "✗".red(),
                errors.len()
            ));
        });
    }
}

/// Renders one frame of the progress display.
///
/// Resources not yet reported are shown as spinner placeholders, so the
/// frame always has at least `total_expected` resource lines.
#[must_use]
pub fn render_frame(view: &OrderedStatusView, total_expected: usize, frame: usize) -> Vec<String> {
    let spinner = SPINNER[frame % SPINNER.len()];
    let total = total_expected.max(view.len());

    let mut lines = Vec::with_capacity(total + 1);
    lines.push(format!(
        "Resources: {}/{total} succeeded",
        view.count(OperationState::Succeeded)
    ));

    for resource in view.iter() {
        lines.push(render_resource(resource, spinner));
    }

    let placeholders = total_expected.saturating_sub(view.len());
    for _ in 0..placeholders {
        lines.push(format!("  {} {}", spinner.dimmed(), "waiting for resource".dimmed()));
    }

    lines
}

fn render_resource(resource: &TrackedResource, spinner: &str) -> String {
    let name = resource
        .resource_id
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(&resource.resource_id);

    match resource.state {
        OperationState::Succeeded => format!(
            "  {} {} {}",
            resource.state.symbol().green(),
            name,
            resource.resource_type.dimmed()
        ),
        OperationState::Running => format!(
            "  {} {} {}",
            spinner.yellow(),
            name,
            resource.resource_type.dimmed()
        ),
        OperationState::Pending => format!(
            "  {} {} {}",
            resource.state.symbol().dimmed(),
            name,
            resource.resource_type.dimmed()
        ),
        OperationState::Failed => format!(
            "  {} {} {}: {}",
            resource.state.symbol().red(),
            name,
            resource.resource_type.dimmed(),
            resource.error_or_default().red()
        ),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{OperationStatusTracker, SubOperation};

    #[test]
    fn test_placeholders_fill_expected_total() {
        let mut tracker = OperationStatusTracker::new();
        let view = tracker.observe(&[SubOperation::new(
            "/rg/providers/Microsoft.Web/sites/web",
            "Microsoft.Web/sites",
            OperationState::Running,
        )]);

        let lines = render_frame(&view, 3, 0);

        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("0/3"));
        assert!(lines[1].contains("web"));
        assert!(lines[2].contains("waiting for resource"));
        assert!(lines[3].contains("waiting for resource"));
    }

    #[test]
    fn test_more_resources_than_expected() {
        let mut tracker = OperationStatusTracker::new();
        let view = tracker.observe(&[
            SubOperation::new("/a", "T", OperationState::Succeeded),
            SubOperation::new("/b", "T", OperationState::Succeeded),
        ]);

        let lines = render_frame(&view, 1, 0);

        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("2/2"));
    }

    #[test]
    fn test_failed_line_shows_error() {
        let mut tracker = OperationStatusTracker::new();
        let view = tracker.observe(&[SubOperation::new("/b", "T", OperationState::Failed)
            .with_error("quota exceeded")]);

        let lines = render_frame(&view, 0, 7);

        assert!(lines[1].contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_spinner_runs_only_while_polling() {
        let mut presenter = TerminalPresenter::with_interactive(true);

        presenter.phase_changed(RunPhase::ContainerProvisioning);
        assert!(presenter.spinner.is_none());

        presenter.phase_changed(RunPhase::Polling);
        assert!(presenter.spinner.is_some());

        presenter.phase_changed(RunPhase::Succeeded);
        assert!(presenter.spinner.is_none());
    }

    #[test]
    fn test_non_interactive_never_spins() {
        let mut presenter = TerminalPresenter::with_interactive(false);
        presenter.phase_changed(RunPhase::Polling);
        assert!(presenter.spinner.is_none());
    }

    #[test]
    fn test_first_write_failure_disables_redraw() {
        let presenter = TerminalPresenter::with_interactive(true);
        let mut screen = presenter.screen.lock().unwrap();

        screen.report(Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")));
        assert!(screen.write_failed);

        screen.view = Some((OrderedStatusView::default(), 2));
        screen.draw();
        assert_eq!(screen.drawn_lines, 0);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("deploying"), "Deploying");
        assert_eq!(capitalize(""), "");
    }
}
