//! Change reporting for a publish run.
//!
//! Two modes: a verbose changeset log (one labeled line per mutation) and a
//! progress indicator emitting a dot per fixed interval of changed items.
//! Changeset notices whose path is not relative to the reporting root (they
//! do not start with `/`) describe entries crossing a nested catalog
//! boundary and are labeled accordingly.

use std::io::Write;

/// Changed items per progress dot.
const DOT_INTERVAL: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// One line per add/remove/modify.
    Changes,
    /// A dot per [`DOT_INTERVAL`] changed items.
    Dots,
}

pub struct ChangeReporter {
    mode: ReportMode,
    changed_items: u64,
    out: Box<dyn Write + Send>,
}

impl ChangeReporter {
    pub fn new(mode: ReportMode) -> Self {
        Self::with_output(mode, Box::new(std::io::stdout()))
    }

    /// Report into an arbitrary sink. Used by tests; production runs write
    /// to stdout.
    pub fn with_output(mode: ReportMode, out: Box<dyn Write + Send>) -> Self {
        Self {
            mode,
            changed_items: 0,
            out,
        }
    }

    pub fn changed_items(&self) -> u64 {
        self.changed_items
    }

    pub fn on_add(&mut self, path: &str) {
        self.changed_items += 1;
        match self.mode {
            ReportMode::Changes => {
                let label = if path.starts_with('/') {
                    "[add]"
                } else {
                    "[x-catalog-add]"
                };
                let _ = writeln!(self.out, "{} {}", label, path);
            }
            ReportMode::Dots => self.print_dots(),
        }
    }

    pub fn on_remove(&mut self, path: &str) {
        self.changed_items += 1;
        match self.mode {
            ReportMode::Changes => {
                let label = if path.starts_with('/') {
                    "[rem]"
                } else {
                    "[x-catalog-rem]"
                };
                let _ = writeln!(self.out, "{} {}", label, path);
            }
            ReportMode::Dots => self.print_dots(),
        }
    }

    pub fn on_modify(&mut self, path: &str) {
        self.changed_items += 1;
        match self.mode {
            ReportMode::Changes => {
                let _ = writeln!(self.out, "[mod] {}", path);
            }
            ReportMode::Dots => self.print_dots(),
        }
    }

    /// Finalize the report. In dot mode this terminates the dot line iff at
    /// least one full interval was emitted.
    pub fn commit_report(&mut self) {
        if self.mode == ReportMode::Dots && self.changed_items >= DOT_INTERVAL {
            let _ = writeln!(self.out);
        }
        let _ = self.out.flush();
    }

    fn print_dots(&mut self) {
        if self.changed_items % DOT_INTERVAL == 0 {
            let _ = write!(self.out, ".");
            let _ = self.out.flush();
        }
    }
}
