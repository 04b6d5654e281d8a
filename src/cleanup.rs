use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::debug;

use crate::render;
use crate::spinner::Spinner;

/// The one place that tears the session down on interrupt.
///
/// Owns the running spinner, if any, so both the normal scan path and the
/// interrupt path can stop it without either stopping it twice.
#[derive(Default)]
pub struct Cleanup {
    fired: AtomicBool,
    spinner: Mutex<Option<Spinner>>,
}

impl Cleanup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand a running spinner over for safekeeping until the scan ends.
    ///
    /// After cleanup has run the spinner is stopped right away instead.
    pub async fn hold_spinner(&self, spinner: Spinner) {
        let rejected = {
            let mut slot = self.spinner.lock().unwrap_or_else(|e| e.into_inner());
            if self.fired.load(Ordering::SeqCst) {
                Some(spinner)
            } else {
                *slot = Some(spinner);
                None
            }
        };
        if let Some(spinner) = rejected {
            spinner.stop().await;
        }
    }

    /// Stop the held spinner and wait for it. No-op if cleanup already took it.
    pub async fn stop_spinner(&self) {
        let spinner = self.take_spinner();
        if let Some(spinner) = spinner {
            spinner.stop().await;
        }
    }

    fn take_spinner(&self) -> Option<Spinner> {
        self.spinner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Restore the terminal and stop the spinner. Only the first call does
    /// anything; it never fails.
    pub async fn run(&self) {
        {
            // Flip under the slot lock so hold_spinner cannot slip one in after.
            let _slot = self.spinner.lock().unwrap_or_else(|e| e.into_inner());
            if self.fired.swap(true, Ordering::SeqCst) {
                return;
            }
        }
        debug!("running cleanup");
        if let Some(spinner) = self.take_spinner() {
            spinner.stop().await;
        }
        render::restore_terminal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spinner::Ticker;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Finishes(Arc<AtomicUsize>);

    impl Ticker for Finishes {
        fn tick(&mut self) {}

        fn finish(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn cleanup_stops_held_spinner_once() {
        let finishes = Finishes::default();
        let cleanup = Cleanup::new();
        cleanup
            .hold_spinner(Spinner::start(finishes.clone(), Duration::from_millis(5)))
            .await;

        cleanup.run().await;
        cleanup.run().await;
        // the scan path finishing afterwards finds nothing to stop
        cleanup.stop_spinner().await;

        assert!(cleanup.has_fired());
        assert_eq!(finishes.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn spinner_started_after_cleanup_is_stopped_immediately() {
        let finishes = Finishes::default();
        let cleanup = Cleanup::new();
        cleanup.run().await;
        cleanup
            .hold_spinner(Spinner::start(finishes.clone(), Duration::from_millis(5)))
            .await;
        assert_eq!(finishes.0.load(Ordering::SeqCst), 1);
    }
}
