//! Coarse progress reporting with cooperative cancellation.

/// Answer of a [`ProgressSink`] after each milestone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    Continue,
    Cancel,
}

/// Receives percentage updates. Returning [`Progress::Cancel`] aborts the
/// conversion with [`ExportError::Cancelled`](crate::ExportError::Cancelled).
pub trait ProgressSink {
    fn report(&mut self, percent: f64, message: &str) -> Progress;
}

impl<F> ProgressSink for F
where
    F: FnMut(f64, &str) -> Progress,
{
    fn report(&mut self, percent: f64, message: &str) -> Progress {
        self(percent, message)
    }
}

/// Forwards progress to the `log` facade and never cancels.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, percent: f64, message: &str) -> Progress {
        log::info!("[{:>3.0}%] {}", percent, message);
        Progress::Continue
    }
}

/// Swallows progress. Useful in tests.
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _percent: f64, _message: &str) -> Progress {
        Progress::Continue
    }
}
