use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use std::io::IsTerminal;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Directives used when `RUST_LOG` is unset or empty: epoch progress from the
/// training crates, warnings from everything else.
pub const DEFAULT_DIRECTIVES: &str =
    "warn,tc_train=info,tc_distributor=info,tc_nn=info,tc_metrics=info,tc_config=info";

static INITIALISED: OnceLock<()> = OnceLock::new();
static CHROME_GUARD: OnceLock<Mutex<Option<tracing_chrome::FlushGuard>>> = OnceLock::new();

/// Configures the global tracing subscriber.
///
/// The filter honours `RUST_LOG` and falls back to [`DEFAULT_DIRECTIVES`].
/// Events go to stderr so stdout stays free for reports. When
/// `TC_TRACE_CHROME` names a file, a Chrome trace is written there as well.
pub fn init_tracing() -> Result<(), InitError> {
    INITIALISED
        .set(())
        .map_err(|_| InitError::AlreadyInitialised)?;

    let ansi = std::io::stderr().is_terminal();
    let filter = filter_from(std::env::var("RUST_LOG").ok().as_deref());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(ansi);

    match chrome_trace_path()? {
        Some(path) => {
            let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
                .file(path)
                .include_args(true)
                .build();
            let _ = CHROME_GUARD.set(Mutex::new(Some(guard)));
            Registry::default()
                .with(filter)
                .with(fmt_layer)
                .with(chrome_layer)
                .init();
        }
        None => {
            Registry::default().with(filter).with(fmt_layer).init();
        }
    }

    Ok(())
}

/// Flushes and drops the Chrome trace writer, if one was installed.
pub fn flush_chrome_trace() {
    if let Some(cell) = CHROME_GUARD.get() {
        if let Ok(mut slot) = cell.lock() {
            slot.take();
        }
    }
}

fn filter_from(raw: Option<&str>) -> EnvFilter {
    raw.map(str::trim)
        .filter(|directives| !directives.is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

fn chrome_trace_path() -> Result<Option<PathBuf>, InitError> {
    match std::env::var("TC_TRACE_CHROME") {
        Ok(raw) if !raw.trim().is_empty() => Ok(Some(PathBuf::from(raw))),
        Ok(_) => Ok(None),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(InitError::Env(err)),
    }
}

/// Errors emitted when configuring the tracing subscriber.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing has already been initialised")]
    AlreadyInitialised,
    #[error("failed to read TC_TRACE_CHROME: {0}")]
    Env(std::env::VarError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_or_blank_filter_uses_distributor_defaults() {
        for raw in [None, Some(""), Some("   ")] {
            let filter = filter_from(raw).to_string();
            assert!(filter.contains("tc_distributor=info"), "{filter}");
            assert!(filter.contains("warn"), "{filter}");
        }
    }

    #[test]
    fn explicit_directives_replace_the_defaults() {
        let filter = filter_from(Some("tc_distributor=trace")).to_string();
        assert!(filter.contains("tc_distributor=trace"));
        assert!(!filter.contains("tc_metrics"));
    }
}
