use std::panic;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const DEFAULT_FILTER: &str = "info,tower_http=info,tokio_postgres=warn";

/// Logging knobs read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    /// `JT_LOG_DIR`: write daily-rotated files there instead of stdout.
    pub log_dir: Option<PathBuf>,
    /// `JT_LOG_INCLUDE_BACKTRACE`: also run the default panic hook.
    pub include_backtrace: bool,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var_os("JT_LOG_DIR").map(PathBuf::from),
            std::env::var("JT_LOG_INCLUDE_BACKTRACE").ok(),
        )
    }

    fn from_vars(log_dir: Option<PathBuf>, include_backtrace: Option<String>) -> Self {
        Self {
            log_dir: log_dir.filter(|dir| !dir.as_os_str().is_empty()),
            include_backtrace: include_backtrace.as_deref().is_some_and(flag_enabled),
        }
    }
}

fn flag_enabled(raw: &str) -> bool {
    let raw = raw.trim();
    raw == "1" || raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("yes")
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic payload not string".into())
}

/// Route panics through `tracing` so they land in the same sink as request
/// logs. Installed at most once per process.
pub fn install_tracing_panic_hook(app_name: &'static str) {
    static INSTALLED: OnceLock<()> = OnceLock::new();

    INSTALLED.get_or_init(|| {
        let default_hook = panic::take_hook();
        let include_backtrace = LogSettings::from_env().include_backtrace;

        panic::set_hook(Box::new(move |info| {
            let thread = std::thread::current();
            let location = info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));

            tracing::error!(
                application = app_name,
                thread_name = thread.name().unwrap_or("unknown"),
                location = location.as_deref().unwrap_or("unknown"),
                panic_message = %panic_message(info.payload()),
                "panic captured"
            );

            if include_backtrace {
                default_hook(info);
            }
        }));
    });
}

fn rotating_file_writer(app_name: &'static str, dir: PathBuf) -> Option<BoxMakeWriter> {
    if let Err(err) = std::fs::create_dir_all(&dir) {
        tracing::warn!(error = %err, dir = %dir.display(), "cannot create JT_LOG_DIR; logging to stdout");
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, format!("{app_name}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Some(BoxMakeWriter::new(non_blocking))
}

/// Install the global subscriber. Filtering follows `RUST_LOG` when set.
/// Later calls are no-ops, so tests and binaries can both call it.
pub fn init_tracing_subscriber(app_name: &'static str) {
    let settings = LogSettings::from_env();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    match settings.log_dir.and_then(|dir| rotating_file_writer(app_name, dir)) {
        Some(writer) => {
            let _ = builder.with_ansi(false).with_writer(writer).try_init();
        }
        None => {
            let _ = builder.try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtrace_flag_accepts_common_truthy_values() {
        for raw in ["1", "true", "TRUE", " yes "] {
            assert!(flag_enabled(raw), "{raw}");
        }
        for raw in ["0", "false", "", "on-crash"] {
            assert!(!flag_enabled(raw), "{raw}");
        }
    }

    #[test]
    fn empty_log_dir_means_stdout() {
        let settings = LogSettings::from_vars(Some(PathBuf::new()), None);
        assert_eq!(settings, LogSettings::default());

        let settings = LogSettings::from_vars(Some(PathBuf::from("/var/log/jt")), Some("1".into()));
        assert_eq!(settings.log_dir, Some(PathBuf::from("/var/log/jt")));
        assert!(settings.include_backtrace);
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_message(owned.as_ref()), "boom");
        let borrowed: Box<dyn std::any::Any + Send> = Box::new("static boom");
        assert_eq!(panic_message(borrowed.as_ref()), "static boom");
        let other: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(other.as_ref()), "panic payload not string");
    }

    #[test]
    fn init_is_idempotent() {
        init_tracing_subscriber("jt-test");
        init_tracing_subscriber("jt-test");
    }
}
