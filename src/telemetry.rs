//! Tracing setup and trace-event rendering for debugger surfaces.

use std::io::IsTerminal;

use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::tracker::{TraceEvent, TracePhase};

pub const ENTER_COLOR: &str = "\x1b[32m"; // green
pub const EXIT_COLOR: &str = "\x1b[35m"; // magenta
pub const RESET_COLOR: &str = "\x1b[0m";

/// Install the global tracing subscriber: env-filter (via `RUST_LOG`,
/// `.env`-loadable through dotenvy), fmt layer, and span-trace capture.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(ErrorLayer::default())
        .try_init();
}

/// Color mode for rendered trace output.
///
/// - [`FormatterMode::Auto`]: detect TTY capability via `stderr.is_terminal()`
/// - [`FormatterMode::Colored`]: always emit ANSI color codes
/// - [`FormatterMode::Plain`]: never emit color codes (logs, files)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatterMode {
    #[default]
    Auto,
    Colored,
    Plain,
}

impl FormatterMode {
    /// Returns true if this mode should use colored output. `Auto` performs
    /// TTY detection on each call.
    #[must_use]
    pub fn is_colored(&self) -> bool {
        match self {
            FormatterMode::Auto => std::io::stderr().is_terminal(),
            FormatterMode::Colored => true,
            FormatterMode::Plain => false,
        }
    }
}

/// Plain text formatter for [`TraceEvent`]s with optional ANSI color.
#[derive(Default)]
pub struct TraceFormatter {
    mode: FormatterMode,
}

impl TraceFormatter {
    /// Formatter with auto-detected color mode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Formatter with explicit color mode.
    #[must_use]
    pub fn with_mode(mode: FormatterMode) -> Self {
        Self { mode }
    }

    /// Render one trace event as a single line.
    #[must_use]
    pub fn render(&self, event: &TraceEvent) -> String {
        let (label, color) = match event.phase {
            TracePhase::Enter => ("enter", ENTER_COLOR),
            TracePhase::Exit => ("exit ", EXIT_COLOR),
        };
        let when = event.when.format("%H:%M:%S%.3f");
        if self.mode.is_colored() {
            format!(
                "{color}{label}{RESET_COLOR} {when} {}::{}",
                event.at.graph, event.at.node
            )
        } else {
            format!("{label} {when} {}::{}", event.at.graph, event.at.node)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::NodeRef;
    use crate::types::{GraphId, NodeId};

    #[test]
    fn plain_mode_has_no_ansi_codes() {
        let formatter = TraceFormatter::with_mode(FormatterMode::Plain);
        let line = formatter.render(&TraceEvent {
            at: NodeRef {
                graph: GraphId::random(),
                node: NodeId::new("n"),
            },
            phase: TracePhase::Enter,
            when: chrono::Utc::now(),
        });
        assert!(!line.contains('\x1b'));
        assert!(line.starts_with("enter"));
    }

    #[test]
    fn colored_mode_wraps_phase_label() {
        let formatter = TraceFormatter::with_mode(FormatterMode::Colored);
        let line = formatter.render(&TraceEvent {
            at: NodeRef {
                graph: GraphId::random(),
                node: NodeId::new("n"),
            },
            phase: TracePhase::Exit,
            when: chrono::Utc::now(),
        });
        assert!(line.contains(EXIT_COLOR));
        assert!(line.contains(RESET_COLOR));
    }
}
