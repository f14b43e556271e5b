//! Structured logging utilities for Tessera components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use tessera_config::{log_output_debug, log_recovery_info};
//! use tracing::field::display;
//!
//! log_output_debug!("Create staging area", id = "sales", path = display(staging.display()));
//! log_recovery_info!("Start applying transaction", transaction_id = "ex1");
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const FRAGMENT: &'static str = "FRAGMENT";
    pub const OUTPUT: &'static str = "OUTPUT";
    pub const MOVE: &'static str = "MOVE";
    pub const RECOVERY: &'static str = "RECOVERY";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// === OUTPUT logging macros ===

#[macro_export]
macro_rules! log_output_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "OUTPUT", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_output_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "OUTPUT", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_output_trace {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::trace!(component = "OUTPUT", $($key = $value,)* $msg)
    };
}

// === MOVE logging macros ===

#[macro_export]
macro_rules! log_move_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "MOVE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_move_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "MOVE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_move_trace {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::trace!(component = "MOVE", $($key = $value,)* $msg)
    };
}

// === RECOVERY logging macros ===

#[macro_export]
macro_rules! log_recovery_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "RECOVERY", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_recovery_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "RECOVERY", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_recovery_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "RECOVERY", $($key = $value,)* $msg)
    };
}

// === FRAGMENT logging macros ===

#[macro_export]
macro_rules! log_fragment_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "FRAGMENT", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_fragment_trace {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::trace!(component = "FRAGMENT", $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // try_init: tests call this repeatedly from several threads
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}
