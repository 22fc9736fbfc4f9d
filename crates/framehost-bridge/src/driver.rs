//! Frame driver.
//!
//! The driver runs the guest's setup entry point once, then one frame per
//! display tick until the session ends.  Its state machine:
//!
//! ```text
//! Idle  --start-->  Scheduled  --step-->  Running  --ok-->  Scheduled
//!                                                  \->  Terminated(GuestPanic | Trap)
//! Scheduled  --teardown / frame limit-->  Terminated(TornDown | FrameLimit)
//! ```
//!
//! Calls never overlap: each setup or frame call runs to completion before
//! the driver awaits the next tick.  Once `Terminated`, no further guest call
//! is issued.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::panic::PanicRecord;
use crate::session::Session;

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// The guest reported a panic.
    GuestPanic(PanicRecord),
    /// The guest trapped for another reason, e.g. fuel exhaustion.
    Trap(String),
    /// The host tore the session down.
    TornDown,
    /// The configured frame limit was reached.
    FrameLimit,
}

impl Termination {
    /// Returns `true` if the guest failed rather than being stopped by the host.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::GuestPanic(_) | Self::Trap(_))
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GuestPanic(record) => write!(f, "guest panic: {record}"),
            Self::Trap(reason) => write!(f, "trap: {reason}"),
            Self::TornDown => f.write_str("torn down"),
            Self::FrameLimit => f.write_str("frame limit reached"),
        }
    }
}

/// Lifecycle state of the frame driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverState {
    /// Loaded; setup has not run.
    Idle,
    /// Waiting for the next display tick.
    Scheduled,
    /// A guest call is in progress.
    Running,
    /// No further guest calls will be made.
    Terminated(Termination),
}

/// Schedules guest calls for one session.
pub struct FrameDriver {
    session: Session,
    state: DriverState,
    frames_run: u64,
    max_frames: Option<u64>,
    interval: Duration,
}

impl FrameDriver {
    /// Wrap a freshly loaded session.
    pub fn new(session: Session, config: &BridgeConfig) -> Self {
        Self {
            session,
            state: DriverState::Idle,
            frames_run: 0,
            max_frames: config.max_frames,
            interval: config.frame_interval(),
        }
    }

    /// Current state.
    pub fn state(&self) -> &DriverState {
        &self.state
    }

    /// Number of frame calls that completed successfully.
    pub fn frames_run(&self) -> u64 {
        self.frames_run
    }

    /// The driven session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable access to the driven session.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Returns `true` once the driver has terminated.
    pub fn is_terminated(&self) -> bool {
        matches!(self.state, DriverState::Terminated(_))
    }

    /// Run the setup entry point.  Only has an effect in `Idle`.
    pub fn start(&mut self) -> &DriverState {
        if self.state != DriverState::Idle {
            tracing::warn!(state = ?self.state, "start ignored, driver already started");
            return &self.state;
        }
        self.state = DriverState::Running;
        self.state = match self.session.call_setup() {
            Ok(()) => {
                tracing::debug!("guest setup complete");
                DriverState::Scheduled
            }
            Err(err) => self.fail(err),
        };
        &self.state
    }

    /// Run exactly one frame.  Only has an effect in `Scheduled`.
    pub fn step(&mut self) -> &DriverState {
        if self.state != DriverState::Scheduled {
            tracing::trace!(state = ?self.state, "step ignored");
            return &self.state;
        }
        self.state = DriverState::Running;
        self.state = match self.session.call_frame() {
            Ok(()) => {
                self.frames_run += 1;
                DriverState::Scheduled
            }
            Err(err) => self.fail(err),
        };
        &self.state
    }

    /// End the session from the host side.
    pub fn teardown(&mut self) -> &DriverState {
        self.terminate(Termination::TornDown)
    }

    /// Start if needed, then step on every display tick until the session
    /// terminates, the frame limit is reached, or `shutdown` resolves.
    pub async fn run<F>(&mut self, shutdown: F) -> &DriverState
    where
        F: Future<Output = ()>,
    {
        if self.state == DriverState::Idle {
            self.start();
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        while self.state == DriverState::Scheduled {
            if self.max_frames.is_some_and(|max| self.frames_run >= max) {
                self.terminate(Termination::FrameLimit);
                break;
            }
            tokio::select! {
                () = &mut shutdown => {
                    self.teardown();
                }
                _ = ticker.tick() => {
                    self.step();
                }
            }
        }

        if let DriverState::Terminated(reason) = &self.state {
            tracing::info!(frames = self.frames_run, %reason, "frame driver stopped");
        }
        &self.state
    }

    fn terminate(&mut self, reason: Termination) -> &DriverState {
        if !self.is_terminated() {
            self.state = DriverState::Terminated(reason);
        }
        &self.state
    }

    /// Turn a failed guest call into the terminal state, presenting panics
    /// to the user first.
    fn fail(&mut self, err: BridgeError) -> DriverState {
        let reason = match err {
            BridgeError::GuestPanic(record) => {
                self.session.alert(&record.alert_text());
                Termination::GuestPanic(record)
            }
            BridgeError::Trap(reason) => {
                tracing::error!(%reason, "guest execution aborted");
                Termination::Trap(reason)
            }
            other => {
                tracing::error!(error = %other, "unexpected failure calling guest");
                Termination::Trap(other.to_string())
            }
        };
        DriverState::Terminated(reason)
    }
}
