//! CLI output formatting for compile runs and outdatedness checks.
//!
//! # Output Format
//!
//! ## Compile
//!
//! ```text
//! compiled  /about/ (default): source was modified
//!     → /about/index.html
//! deferred  /index/ (default), waiting on /news/ (default)
//! compiled  /news/ (default): output file does not exist
//!     → /news/index.html
//! compiled  /index/ (default): source was modified
//!     → /index.html
//! up to date /contact/ (default)
//!
//! 3 compiled, 1 up to date, 3 written (1 retry)
//! ```
//!
//! ## Check
//!
//! ```text
//! 001 /about/ (default)
//!     Outdated: source was modified
//! 002 /contact/ (default)
//!     Up to date
//! 003 /index/ (default)
//!     Outdated: depends on an outdated item or layout
//!
//! 2 of 3 reps outdated
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure.

use crate::compiler::{CompileEvent, CompileSummary, RepStatus};

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

// ============================================================================
// Compile
// ============================================================================

/// Format a single compile progress event as display lines.
pub fn format_compile_event(event: &CompileEvent) -> Vec<String> {
    match event {
        CompileEvent::RepCompiled {
            rep,
            reason,
            written,
        } => {
            let mut lines = vec![match reason {
                Some(reason) => format!("compiled  {}: {}", rep, reason),
                None => format!("compiled  {}", rep),
            }];
            for path in written {
                lines.push(format!("    \u{2192} {}", path));
            }
            lines
        }
        CompileEvent::RepDeferred { rep, waiting_on } => {
            vec![format!("deferred  {}, waiting on {}", rep, waiting_on)]
        }
        CompileEvent::RepSkipped { rep } => vec![format!("up to date {}", rep)],
    }
}

pub fn format_summary(summary: &CompileSummary) -> Vec<String> {
    vec![String::new(), summary.to_string()]
}

pub fn print_summary(summary: &CompileSummary) {
    for line in format_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format the outdatedness report: one entry per rep, then a count.
pub fn format_status_report(report: &[RepStatus]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, status) in report.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), status.rep));
        let detail = match (status.reason, status.outdated_by_dependency) {
            (Some(reason), _) => format!("Outdated: {}", reason),
            (None, true) => "Outdated: depends on an outdated item or layout".to_string(),
            (None, false) => "Up to date".to_string(),
        };
        lines.push(format!("    {}", detail));
    }

    let outdated = report.iter().filter(|s| s.is_outdated()).count();
    if !report.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!("{} of {} reps outdated", outdated, report.len()));
    lines
}

pub fn print_status_report(report: &[RepStatus]) {
    for line in format_status_report(report) {
        println!("{}", line);
    }
}
