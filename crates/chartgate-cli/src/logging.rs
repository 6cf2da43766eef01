//! Diagnostic logging
//!
//! Logs always go to stderr: in downloader mode stdout carries the archive
//! bytes Helm reads back.

use console::style;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::{FmtSpan, Writer};
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const CRATES: &[&str] = &["chartgate", "chartgate_cli", "chartgate_repo", "chartgate_core"];

/// `[LEVEL] message key=value` lines
struct LevelFormatter;

impl<S, N> FormatEvent<S, N> for LevelFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        match *event.metadata().level() {
            Level::TRACE => write!(writer, "{} ", style("[TRACE]").magenta()),
            Level::DEBUG => write!(writer, "{} ", style("[DEBUG]").blue()),
            Level::INFO => write!(writer, "{} ", style("[INFO]").green()),
            Level::WARN => write!(writer, "{} ", style("[WARN]").yellow()),
            Level::ERROR => write!(writer, "{} ", style("[ERROR]").red()),
        }?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Default filter directives for our crates
fn default_directives(debug: bool) -> String {
    let level = if debug { Level::DEBUG } else { Level::WARN };
    CRATES
        .iter()
        .map(|krate| format!("{}={}", krate, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `--debug` / `HELM_DEBUG`.
pub fn setup_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(debug)));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .event_format(LevelFormatter)
        .finish();

    // Already installed when called twice; keep the first one
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(
            default_directives(false),
            "chartgate=WARN,chartgate_cli=WARN,chartgate_repo=WARN,chartgate_core=WARN"
        );
        assert!(default_directives(true).contains("chartgate_repo=DEBUG"));
    }
}
