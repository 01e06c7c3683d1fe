//! Formatted output helpers for CLI commands.
//!
//! Provides column-aligned tables, colored state markers and exit status
//! rendering.

use berth_common::types::{ExitStatus, ServiceState};

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const RESET: &str = "\x1b[0m";

/// Renders rows under headers, each column padded to its widest cell.
/// The last column is not padded.
#[must_use]
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header_cells: Vec<String> = headers.iter().map(|h| (*h).to_string()).collect();
    for cells in std::iter::once(&header_cells).chain(rows) {
        let last = cells.len().saturating_sub(1);
        let line: Vec<String> = cells
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, width))| {
                if i == last {
                    cell.clone()
                } else {
                    format!("{cell:<width$}")
                }
            })
            .collect();
        out.push_str(line.join("   ").trim_end());
        out.push('\n');
    }
    out
}

/// Colored bullet for a service state.
#[must_use]
pub const fn state_marker(state: ServiceState) -> &'static str {
    match state {
        ServiceState::Running => "\x1b[32m●\x1b[0m",
        ServiceState::Starting | ServiceState::Restarting => "\x1b[33m●\x1b[0m",
        ServiceState::Pending | ServiceState::Stopped => "\x1b[2m○\x1b[0m",
        ServiceState::Exited => "\x1b[31m○\x1b[0m",
    }
}

/// Short form of an optional exit status for tables.
#[must_use]
pub fn format_exit(exit: Option<ExitStatus>) -> String {
    match exit.and_then(|e| e.code) {
        Some(code) => code.to_string(),
        None if exit.is_some() => "signal".into(),
        None => "-".into(),
    }
}
