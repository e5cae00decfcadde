//! Progress reporter (C11).
//!
//! Renders `PipelineEvent`s as `[NN%] <status> <phase> (<duration>)`
//! lines, one per phase, falling back to plain `[OK]`/`[FAIL]` style
//! markers when output isn't a terminal so CI logs stay readable.

use crate::hash::Phase;
use crate::pipeline::{EventSink, PipelineEvent};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::sync::Mutex;

const TOTAL_PHASES: usize = 12;

pub struct Reporter {
    interactive: bool,
    bar: Option<ProgressBar>,
    completed: Mutex<usize>,
}

impl Reporter {
    pub fn new() -> Self {
        let interactive = std::io::stdout().is_terminal();
        let bar = interactive.then(|| {
            let bar = ProgressBar::new(TOTAL_PHASES as u64);
            bar.set_style(
                ProgressStyle::with_template("{msg}")
                    .expect("static template is always valid"),
            );
            bar
        });
        Self {
            interactive,
            bar,
            completed: Mutex::new(0),
        }
    }

    fn percent(&self) -> u64 {
        let completed = *self.completed.lock().unwrap();
        (completed as u64 * 100) / TOTAL_PHASES as u64
    }

    fn print_line(&self, line: String) {
        if let Some(bar) = &self.bar {
            bar.println(line);
        } else {
            println!("{line}");
        }
    }

}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for Reporter {
    fn emit(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::Start { .. } => {}
            PipelineEvent::Reuse { phase } => {
                *self.completed.lock().unwrap() += 1;
                let marker = if self.interactive { style("done").green().to_string() } else { "[OK]".to_string() };
                self.print_line(format!(
                    "[{:>3}%] {} {} (cached)",
                    self.percent(),
                    marker,
                    phase.name()
                ));
            }
            PipelineEvent::Run { phase } => {
                self.print_line(format!("[{:>3}%] running {}", self.percent(), phase.name()));
            }
            PipelineEvent::Done { phase, duration } => {
                *self.completed.lock().unwrap() += 1;
                let marker = if self.interactive { style("done").green().to_string() } else { "[OK]".to_string() };
                self.print_line(format!(
                    "[{:>3}%] {} {} ({:.1}s)",
                    self.percent(),
                    marker,
                    phase.name(),
                    duration.as_secs_f64()
                ));
            }
            PipelineEvent::Fail { phase, error } => {
                let marker = if self.interactive { style("fail").red().to_string() } else { "[FAIL]".to_string() };
                self.print_line(format!(
                    "[{:>3}%] {} {}: {}",
                    self.percent(),
                    marker,
                    phase.name(),
                    error
                ));
            }
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Render one finished phase's line without a `Reporter` instance, for
/// callers (e.g. `habitat status`) that want the same formatting outside
/// a live pipeline run.
pub fn format_phase_line(phase: Phase, cached: bool) -> String {
    if cached {
        format!("done {} (cached)", phase.name())
    } else {
        format!("done {}", phase.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_phase_line_marks_cached_phases() {
        assert_eq!(format_phase_line(Phase::Base, true), "done base (cached)");
        assert_eq!(format_phase_line(Phase::Base, false), "done base");
    }

    #[test]
    fn percent_scales_with_completed_count() {
        let reporter = Reporter {
            interactive: false,
            bar: None,
            completed: Mutex::new(6),
        };
        assert_eq!(reporter.percent(), 50);
    }
}
