//! Cooperative pause/stop signalling
//!
//! A [`JobControl`] is held by the registry for the lifetime of one run; the
//! running job holds [`ControlToken`]s subscribed to it. Signals are observed
//! only at page boundaries, during delays and between retry attempts, never
//! in the middle of a request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// What the job has been asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Run,
    Pause,
    Stop,
}

/// Sending half, owned by the registry slot
#[derive(Debug)]
pub struct JobControl {
    tx: watch::Sender<Signal>,
}

impl JobControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Signal::Run);
        Self { tx }
    }

    pub fn signal(&self) -> Signal {
        *self.tx.borrow()
    }

    pub fn pause(&self) {
        self.send(Signal::Pause);
    }

    pub fn resume(&self) {
        self.send(Signal::Run);
    }

    /// Stop is final; later pause/resume requests are ignored
    pub fn stop(&self) {
        self.send(Signal::Stop);
    }

    /// Subscribes a token; `on_park` runs each time the job parks on a pause
    pub fn token(&self, on_park: Option<Arc<dyn Fn() + Send + Sync>>) -> ControlToken {
        ControlToken {
            rx: self.tx.subscribe(),
            on_park,
        }
    }

    fn send(&self, signal: Signal) {
        self.tx.send_if_modified(|current| {
            if *current == Signal::Stop || *current == signal {
                return false;
            }
            *current = signal;
            true
        });
    }
}

impl Default for JobControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half, carried through the walk and into the fetcher
#[derive(Clone)]
pub struct ControlToken {
    rx: watch::Receiver<Signal>,
    on_park: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl fmt::Debug for ControlToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlToken")
            .field("signal", &*self.rx.borrow())
            .finish()
    }
}

impl ControlToken {
    /// A token no one can signal, for one-off walks outside the registry
    pub fn detached() -> Self {
        let (_tx, rx) = watch::channel(Signal::Run);
        Self { rx, on_park: None }
    }

    pub fn signal(&self) -> Signal {
        *self.rx.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.signal() == Signal::Stop
    }

    /// Honors pending signals at a page boundary
    ///
    /// Parks while paused. Returns `false` when the job must stop.
    pub async fn proceed(&mut self) -> bool {
        loop {
            let signal = *self.rx.borrow_and_update();
            match signal {
                Signal::Run => return true,
                Signal::Stop => return false,
                Signal::Pause => {
                    tracing::info!("Paused at page boundary");
                    if let Some(hook) = &self.on_park {
                        hook();
                    }
                    // Controller gone while parked: nobody can resume us
                    if self.rx.changed().await.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    /// Sleeps for `duration` unless a stop arrives first
    ///
    /// Pause requests do not shorten the sleep. Returns `false` when stopped.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_stopped() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return !self.is_stopped(),
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        // No controller left to send a stop
                        (&mut deadline).await;
                        return !self.is_stopped();
                    }
                    if self.is_stopped() {
                        return false;
                    }
                }
            }
        }
    }
}
