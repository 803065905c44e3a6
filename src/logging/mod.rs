//! Logging infrastructure - structured tracing of block lifecycles
//!
//! Design: The library only emits `tracing` events; it never installs a
//! subscriber on its own. Binaries and tests opt in through [`init`] or
//! [`init_with_config`]:
//! - Level and format configurable from the environment
//! - Zero-cost when no subscriber is listening
//! - Optional non-blocking file output

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::block::BlockKind;

/// Global logging state; holds the file writer guard when file output is on
static LOGGER: OnceCell<Option<WorkerGuard>> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // OWNSHARE_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("OWNSHARE_LOG_LEVEL") {
            config.level = parse_level(&level_str);
        }

        // OWNSHARE_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("OWNSHARE_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("OWNSHARE_LOG_JSON").is_ok();
        config.show_spans = std::env::var("OWNSHARE_LOG_SPANS").is_ok();

        config
    }

    /// Minimal logging for hot loops
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Every block transition, written to `ownshare.log` as well
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            file_output: true,
            log_path: Some("ownshare.log".to_string()),
            json_format: false,
            show_spans: true,
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration.
///
/// Only the first call has any effect. `RUST_LOG` overrides `config.level`.
pub fn init_with_config(config: LogConfig) {
    LOGGER.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("ownshare={}", config.level.as_str().to_lowercase()))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let (file_writer, guard) = match config.log_path.as_deref() {
            Some(path) if config.file_output => {
                let path = Path::new(path);
                let directory = path
                    .parent()
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .map(|name| name.to_os_string())
                    .unwrap_or_else(|| "ownshare.log".into());
                let appender = tracing_appender::rolling::never(directory, file_name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                (Some(writer), Some(guard))
            }
            _ => (None, None),
        };

        let console = (!config.json_format).then(|| {
            fmt::layer()
                .with_writer(io::stdout)
                .with_span_events(span_events.clone())
                .with_target(true)
                .with_line_number(cfg!(debug_assertions))
        });
        let console_json = config.json_format.then(|| {
            fmt::layer()
                .json()
                .with_writer(io::stdout)
                .with_span_events(span_events.clone())
        });
        let file = file_writer.map(|writer| {
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_span_events(span_events)
        });

        // Another subscriber may already be global (e.g. installed by the host
        // application); ours then stays inactive.
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .with(console_json)
            .with(file)
            .try_init();

        guard
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

// ============================================================================
// Block lifecycle events
// ============================================================================

/// Log a control block allocation
#[inline]
pub(crate) fn log_block_alloc(kind: BlockKind, block: *const u8, payload: *const u8) {
    tracing::trace!(
        target: "ownshare::block",
        event = "block_alloc",
        kind = kind.as_str(),
        block = ?block,
        payload = ?payload,
        "control block allocated"
    );
}

/// Log payload destruction (strong count reached zero)
#[inline]
pub(crate) fn log_payload_destroyed(kind: BlockKind, block: *const u8) {
    tracing::trace!(
        target: "ownshare::block",
        event = "payload_destroy",
        kind = kind.as_str(),
        block = ?block,
        "payload destroyed"
    );
}

/// Log control block deallocation (both counts reached zero)
#[inline]
pub(crate) fn log_block_freed(kind: BlockKind, block: *const u8) {
    tracing::trace!(
        target: "ownshare::block",
        event = "block_free",
        kind = kind.as_str(),
        block = ?block,
        "control block freed"
    );
}

/// Log a failed weak-to-strong promotion
#[inline]
pub(crate) fn log_promotion_failure(block: *const u8, reason: &dyn std::fmt::Display) {
    tracing::debug!(
        target: "ownshare::promote",
        event = "promotion_failure",
        block = ?block,
        %reason,
        "weak promotion failed"
    );
}

/// Warn that a self-aware payload was asked for its owner while its
/// `WeakThis` field is empty, usually because a plain constructor wrapped it
#[inline]
pub(crate) fn log_unattached_this(context: &str) {
    tracing::warn!(
        target: "ownshare::this",
        event = "unattached_this",
        context,
        "self-reference field is empty; wrap the value with Shared::new_this, \
         Shared::from_box_this or make_shared_this, or call Shared::enable_this"
    );
}
