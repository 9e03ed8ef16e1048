//! Duty-cycle scheduler for rate-limited scanning.
//!
//! Keeps a scan source logically running while honoring an external "at most
//! K starts per rolling window" limit: the radio is alternated on and off in
//! phases of the derived duration (see [`ScanRateLimits`]), and the presence
//! registry's expiration clock is paused and resumed in lockstep so tracked
//! entries never expire because the radio was resting.
//!
//! # Architecture
//!
//! ```text
//! start()/stop() ──mpsc──► scheduler task ──► ScanSource start/stop
//!   (any context)             │    ▲               PresenceClock pause/resume
//!                             │    └── phase timer (tokio::time)
//!                             └──watch──► SchedulerStatus
//! ```
//!
//! The whole state machine lives in one task; callers are serialized onto it
//! through a command channel, so the scheduler itself needs no locks. Phase
//! flips are driven by a deadline recomputed on every state change inside the
//! task's `select!` loop, which makes a stale timer impossible: cancelling a
//! phase (on `stop()` or shutdown) simply clears the deadline before the
//! timer branch can fire again.
//!
//! # Example
//!
//! ```ignore
//! use nearscan::scheduler::{DutyCycleScheduler, ScanRateLimits};
//!
//! let (scheduler, handle) = DutyCycleScheduler::new(source, registry, limits);
//! tokio::spawn(scheduler.run(shutdown_token));
//!
//! handle.start().await?;   // radio on, off after ~3.1s, on again at ~6.2s...
//! handle.stop().await?;    // radio off, registry paused
//! ```

mod limits;

pub use limits::{
    ScanRateLimits, DEFAULT_DUTY_CYCLE, DEFAULT_MAX_STARTS, DEFAULT_SAFETY_MARGIN, DEFAULT_WINDOW,
};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::PresenceRegistry;
use crate::scan::ScanSource;

/// Deadline used while no phase timer is armed; re-armed every loop turn.
const IDLE_RECHECK: Duration = Duration::from_secs(60);

/// Minimal pause/resume surface the scheduler needs from the registry.
///
/// Keeps the scheduler independent of the registry's payload type; tests
/// substitute a recording implementation.
pub trait PresenceClock: Send + Sync {
    /// Freeze the expiration clock (radio going quiet).
    fn pause(&self);

    /// Unfreeze the expiration clock (radio scanning again).
    fn resume(&self);
}

impl<V> PresenceClock for PresenceRegistry<V>
where
    V: Clone + PartialEq + Send,
{
    fn pause(&self) {
        PresenceRegistry::pause(self);
    }

    fn resume(&self) {
        PresenceRegistry::resume(self);
    }
}

/// The scheduler's externally visible phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// Not logically scanning.
    Stopped,
    /// Logically scanning, radio on.
    Active,
    /// Logically scanning, radio off for the duty-cycle rest.
    Resting,
}

impl ScanPhase {
    /// Short description for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Stopped => "Stopped",
            ScanPhase::Active => "Active",
            ScanPhase::Resting => "Resting",
        }
    }

    /// Whether the caller has asked to scan, regardless of the radio state.
    pub fn is_scanning(&self) -> bool {
        matches!(self, ScanPhase::Active | ScanPhase::Resting)
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time scheduler observability.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerStatus {
    /// Current phase.
    pub phase: ScanPhase,
    /// Scan-source starts since the current logical session began.
    pub start_count: u64,
}

/// Errors from [`SchedulerHandle`] calls.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler task has already exited.
    #[error("scheduler task is no longer running")]
    TaskStopped,
}

enum Command {
    Start(oneshot::Sender<bool>),
    Stop(oneshot::Sender<()>),
}

/// Cloneable handle for controlling a running scheduler task.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<SchedulerStatus>,
}

impl SchedulerHandle {
    /// Begin duty-cycled scanning. Idempotent: returns `Ok(true)` if already
    /// scanning. `Ok(false)` means the scan source refused to start; the
    /// scheduler stays stopped and does not retry.
    pub async fn start(&self) -> Result<bool, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Start(reply_tx))
            .map_err(|_| SchedulerError::TaskStopped)?;
        reply_rx.await.map_err(|_| SchedulerError::TaskStopped)
    }

    /// Stop scanning. Idempotent.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Stop(reply_tx))
            .map_err(|_| SchedulerError::TaskStopped)?;
        reply_rx.await.map_err(|_| SchedulerError::TaskStopped)
    }

    /// Latest published status.
    pub fn status(&self) -> SchedulerStatus {
        *self.status_rx.borrow()
    }

    /// Whether the scheduler is logically scanning.
    pub fn is_scanning(&self) -> bool {
        self.status().phase.is_scanning()
    }
}

/// The duty-cycle scheduler task.
///
/// Construct with [`new`](Self::new), spawn [`run`](Self::run) on the
/// runtime, and control it through the handle returned alongside.
pub struct DutyCycleScheduler<S> {
    core: Core<S>,
    rx: mpsc::UnboundedReceiver<Command>,
}

struct Core<S> {
    source: S,
    clock: Arc<dyn PresenceClock>,
    limits: ScanRateLimits,
    status_tx: watch::Sender<SchedulerStatus>,
    phase: ScanPhase,
    next_flip: Option<Instant>,
    start_count: u64,
}

impl<S: ScanSource> DutyCycleScheduler<S> {
    /// Create a scheduler over `source`, pausing/resuming `clock` in
    /// lockstep with the radio. Returns the task and its control handle.
    pub fn new(
        source: S,
        clock: Arc<dyn PresenceClock>,
        limits: ScanRateLimits,
    ) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SchedulerStatus {
            phase: ScanPhase::Stopped,
            start_count: 0,
        });
        let scheduler = Self {
            core: Core {
                source,
                clock,
                limits,
                status_tx,
                phase: ScanPhase::Stopped,
                next_flip: None,
                start_count: 0,
            },
            rx,
        };
        (scheduler, SchedulerHandle { tx, status_rx })
    }

    /// Run until `shutdown` is cancelled or every handle is dropped.
    pub async fn run(self, shutdown: CancellationToken) {
        let Self { mut core, mut rx } = self;
        info!(
            phase_ms = core.limits.phase_period().as_millis() as u64,
            max_starts = core.limits.max_starts,
            window_s = core.limits.window.as_secs(),
            "duty-cycle scheduler running"
        );
        loop {
            let flip_at = core
                .next_flip
                .unwrap_or_else(|| Instant::now() + IDLE_RECHECK);
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    core.enter_stopped();
                    break;
                }

                command = rx.recv() => match command {
                    Some(Command::Start(reply)) => {
                        let started = core.handle_start();
                        let _ = reply.send(started);
                    }
                    Some(Command::Stop(reply)) => {
                        core.enter_stopped();
                        let _ = reply.send(());
                    }
                    None => {
                        core.enter_stopped();
                        break;
                    }
                },

                _ = time::sleep_until(flip_at), if core.next_flip.is_some() => {
                    core.flip();
                }
            }
        }
        debug!("duty-cycle scheduler exited");
    }
}

impl<S: ScanSource> Core<S> {
    fn handle_start(&mut self) -> bool {
        if self.phase.is_scanning() {
            return true;
        }
        self.start_count = 0;
        self.clock.resume();
        let started = if self.source.start_scan() {
            self.start_count = 1;
            self.phase = ScanPhase::Active;
            self.next_flip = Some(Instant::now() + self.limits.phase_period());
            info!("scanning started");
            true
        } else {
            // Not running, no automatic retry; the caller owns retry policy.
            warn!("scan source failed to start");
            self.clock.pause();
            self.phase = ScanPhase::Stopped;
            self.next_flip = None;
            false
        };
        self.publish();
        started
    }

    fn flip(&mut self) {
        match self.phase {
            ScanPhase::Active => {
                if !self.source.stop_scan() {
                    warn!("scan source failed to stop");
                }
                self.clock.pause();
                self.phase = ScanPhase::Resting;
                self.next_flip = Some(Instant::now() + self.limits.phase_period());
                debug!(start_count = self.start_count, "scan window closed");
            }
            ScanPhase::Resting => {
                self.clock.resume();
                if self.source.start_scan() {
                    self.start_count += 1;
                    self.phase = ScanPhase::Active;
                    self.next_flip = Some(Instant::now() + self.limits.phase_period());
                    debug!(start_count = self.start_count, "scan window opened");
                } else {
                    warn!("scan source failed to restart; stopping");
                    self.clock.pause();
                    self.phase = ScanPhase::Stopped;
                    self.next_flip = None;
                }
            }
            ScanPhase::Stopped => {
                // No timer is armed while stopped.
            }
        }
        self.publish();
    }

    fn enter_stopped(&mut self) {
        self.next_flip = None;
        if self.phase == ScanPhase::Stopped {
            return;
        }
        if !self.source.stop_scan() {
            warn!("scan source failed to stop");
        }
        self.clock.pause();
        self.phase = ScanPhase::Stopped;
        self.start_count = 0;
        info!("scanning stopped");
        self.publish();
    }

    fn publish(&self) {
        let _ = self.status_tx.send(SchedulerStatus {
            phase: self.phase,
            start_count: self.start_count,
        });
    }
}
