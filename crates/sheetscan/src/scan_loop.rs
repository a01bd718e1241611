//! Continuous identity scanning.
//!
//! Camera mode runs a best-effort loop: each tick snapshots the current
//! device frame, attempts a QR identity decode, and forwards any payload
//! over a channel for the session's acceptance logic. The loop performs
//! no detection work and is safe to run alongside everything else — it
//! only reads frames, and the identity slot it ultimately feeds is
//! idempotent once locked.
//!
//! Cancellation contract: the token is checked before every tick, and
//! [`IdentityScanner::stop`] joins the worker, so no tick body executes
//! after `stop` returns. The scanner owns its [`FrameSource`]; the device
//! handle is released when the worker exits, on every path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::acquire::FrameSource;
use crate::identity::{self, IdentityPayload};
use crate::normalize;

/// Handle to a running identity scan loop.
pub struct IdentityScanner {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl IdentityScanner {
    /// Spawn the loop. Decoded payloads are sent on `sender`; the loop
    /// exits on cancellation or when the receiver is dropped. Acquire
    /// failures are logged and the loop keeps ticking — acquisition
    /// itself never retries, the next tick simply tries again.
    pub fn spawn<S>(mut source: S, interval: Duration, sender: Sender<IdentityPayload>) -> Self
    where
        S: FrameSource + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let token = Arc::clone(&cancel);
        let handle = thread::spawn(move || {
            while !token.load(Ordering::SeqCst) {
                match source.acquire() {
                    Ok(frame) => {
                        let gray = normalize::grayscale(&frame);
                        if let Some(payload) = identity::decode_identity(&gray) {
                            tracing::debug!(
                                "identity frame decoded: student '{}'",
                                payload.student_id
                            );
                            if sender.send(payload).is_err() {
                                // Receiver gone: the session ended.
                                break;
                            }
                        }
                    }
                    Err(err) => {
                        tracing::debug!("frame acquisition failed ({err}); next tick retries")
                    }
                }
                sleep_cancellable(&token, interval);
            }
            tracing::debug!("identity scan loop exited");
            // `source` drops here, releasing the device handle.
        });
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Cancel and join. When this returns, no further tick will run.
    pub fn stop(mut self) {
        self.cancel_and_join();
    }

    fn cancel_and_join(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("identity scan worker panicked");
            }
        }
    }
}

impl Drop for IdentityScanner {
    fn drop(&mut self) {
        self.cancel_and_join();
    }
}

/// Sleep for `interval` in short slices so a stop request is honored
/// promptly even with long tick intervals.
fn sleep_cancellable(token: &AtomicBool, interval: Duration) {
    let slice = Duration::from_millis(20);
    let mut remaining = interval;
    while !token.load(Ordering::SeqCst) && remaining > Duration::ZERO {
        let step = remaining.min(slice);
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}
