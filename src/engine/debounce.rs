//! Generic quiet-window debouncer.
//!
//! Coalesces rapid parameter changes (radius slider drags, category hint
//! edits) into a single settled value: every `schedule` restarts the timer,
//! and only the last value scheduled within one quiet window is delivered.
//! Dropping the [`Debouncer`] handle cancels any pending timer without
//! firing, so torn-down sessions never receive dangling callbacks.
//!
//! Each parameter stream gets its own instance with its own delay; the
//! settled callback is whatever the caller provides (typically a send into
//! the engine's event channel).

use log::trace;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

/// Handle to a running debounce task.
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Debouncer<T> {
    /// Replace any pending value and restart the quiet-window timer.
    pub fn schedule(&self, value: T) {
        let _ = self.tx.send(value);
    }
}

/// Spawn a debounce task with the given quiet window. `on_settled` is called
/// with the last scheduled value once the stream has been quiet for `delay`.
pub fn start_debouncer<T, F>(delay: Duration, on_settled: F) -> Debouncer<T>
where
    T: Send + 'static,
    F: Fn(T) + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<T>();

    tokio::spawn(async move {
        let mut pending: Option<(T, Instant)> = None;
        loop {
            let deadline = pending.as_ref().map(|(_, d)| *d);
            tokio::select! {
                scheduled = rx.recv() => {
                    match scheduled {
                        Some(value) => {
                            // Restart the window; the previous value is gone.
                            pending = Some((value, Instant::now() + delay));
                        }
                        None => {
                            // Handle dropped: cancel without firing.
                            if pending.is_some() {
                                trace!("debouncer torn down with a pending value; discarding");
                            }
                            break;
                        }
                    }
                }
                _ = async { sleep_until(deadline.unwrap()).await }, if deadline.is_some() => {
                    if let Some((value, _)) = pending.take() {
                        on_settled(value);
                    }
                }
            }
        }
    });

    Debouncer { tx }
}
