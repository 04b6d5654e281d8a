use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Something that draws one spinner frame per tick.
pub trait Ticker: Send + 'static {
    fn tick(&mut self);
    /// Remove the spinner from the screen. Called once, as the last draw.
    fn finish(&mut self);
}

impl Ticker for Box<dyn Ticker> {
    fn tick(&mut self) {
        (**self).tick();
    }

    fn finish(&mut self) {
        (**self).finish();
    }
}

/// Spinner drawn with an `indicatif` progress bar.
pub struct BarTicker {
    bar: ProgressBar,
}

impl BarTicker {
    pub fn new(message: impl Into<String>) -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&[
                "▁▁▁▁▁",
                "▁▂▂▂▁",
                "▁▄▂▄▁",
                "▂▄▆▄▂",
                "▄▆█▆▄",
                "▂▄▆▄▂",
                "▁▄▂▄▁",
                "▁▂▂▂▁",
            ]);
        bar.set_style(style);
        bar.set_message(message.into());
        Self { bar }
    }
}

impl Ticker for BarTicker {
    fn tick(&mut self) {
        self.bar.tick();
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// A spinner animating on its own task until stopped.
pub struct Spinner {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Spinner {
    /// Start ticking every `interval` on a separate task.
    pub fn start<T: Ticker>(mut ticker: T, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let task = tokio::spawn(async move {
            let mut every = time::interval(interval);
            every.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = every.tick() => ticker.tick(),
                }
            }
            ticker.finish();
        });
        Self { cancel, task }
    }

    /// Signal the spinner to stop and wait until it has drawn its last frame.
    ///
    /// Once this returns the ticker is gone; nothing more is drawn.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::debug!("spinner task ended abnormally: {e}");
        }
    }
}
