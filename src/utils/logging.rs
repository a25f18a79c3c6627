//! Logging Module
//!
//! Structured logging via the `tracing` crate, plus small helpers for the
//! timing lines the pipeline prints ("Loaded data in", per-epoch summaries).

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use super::format_duration;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Debug level with module paths, for `--verbose`
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Initialize logging with the given configuration
///
/// Fails if a global subscriber was already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Measures wall-clock time of a pipeline phase
#[derive(Debug)]
pub struct Stopwatch {
    label: String,
    start: Instant,
}

impl Stopwatch {
    pub fn start(label: &str) -> Self {
        Self {
            label: label.to_string(),
            start: Instant::now(),
        }
    }

    /// Seconds since the stopwatch started
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Log "<label> in [s]: <secs>" and return the elapsed seconds
    pub fn finish(&self) -> f64 {
        let secs = self.elapsed_secs();
        tracing::info!("{} in [s]: {:.3}", self.label, secs);
        secs
    }
}

/// Per-epoch progress logger for the training loop
pub struct EpochLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl EpochLogger {
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch (0-indexed)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();
        tracing::info!("Epoch {}/{}", epoch + 1, self.total_epochs);
    }

    /// Log end of an epoch with Keras-style metrics
    pub fn end_epoch(&self, loss: f64, acc: f64, val_loss: f64, val_acc: f64) {
        tracing::info!(
            "Epoch {}/{} - {:.1}s - loss: {:.4} - acc: {:.4} - val_loss: {:.4} - val_acc: {:.4}",
            self.epoch + 1,
            self.total_epochs,
            self.epoch_start.elapsed().as_secs_f64(),
            loss,
            acc,
            val_loss,
            val_acc
        );
    }

    /// Log training completion
    pub fn log_complete(&self) {
        tracing::info!(
            "Training finished: {} epochs in {}",
            self.total_epochs,
            format_duration(self.training_start.elapsed().as_secs_f64())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_maps_to_tracing() {
        assert_eq!(LogLevel::Debug.to_tracing_level(), Level::DEBUG);
        assert_eq!(LogLevel::Warn.to_tracing_level(), Level::WARN);
    }

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert!(!config.include_target);
        assert_eq!(LogConfig::verbose().level, LogLevel::Debug);
    }

    #[test]
    fn test_stopwatch_elapsed_is_monotonic() {
        let sw = Stopwatch::start("Loaded data");
        let a = sw.elapsed_secs();
        let b = sw.elapsed_secs();
        assert!(a >= 0.0);
        assert!(b >= a);
    }
}
