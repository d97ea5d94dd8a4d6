//! Reconnection State Machine
//!
//! Connectivity is modeled as an explicit machine with a pure transition
//! function: `apply(event)` mutates the status and returns the effects the
//! driver must execute (attempt a connect, schedule or cancel a retry,
//! report terminal failure). Timers live only in the driver, so backoff
//! and ceiling behavior are testable without a runtime clock.
//!
//! # Transitions
//!
//! ```text
//! Disconnected/Failed --ConnectRequested--> Connecting
//! Connecting --ConnectSucceeded--> Connected
//! Connecting --ConnectFailed--> Reconnecting (retries < max) | Failed
//! Reconnecting --RetryElapsed--> Connecting
//! Connected --RemoteDisconnect--> Reconnecting
//! any --ClientDisconnect--> Disconnected (terminal, no auto retry)
//! ```
//!
//! A manual `ConnectRequested` from `Reconnecting` cancels the pending
//! scheduled retry and resets the retry count; a `ConnectSucceeded` is
//! only honored while `Connecting`, so the machine can never jump from
//! `Disconnected` straight to `Connected`.

use std::time::Duration;

/// Connectivity status driving the UI and gating socket sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Inputs to the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Manual connect/reconnect request
    ConnectRequested,
    /// A scheduled retry delay elapsed
    RetryElapsed,
    /// The handshake completed (connection-confirmed received)
    ConnectSucceeded,
    /// A connect attempt failed
    ConnectFailed,
    /// The server or the network dropped an established connection
    RemoteDisconnect,
    /// The client itself disconnected; terminal
    ClientDisconnect,
}

/// Effects the driver must execute after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Start a connect attempt
    AttemptConnect,
    /// Schedule a retry after `delay`; must be cancellable
    ScheduleRetry { delay: Duration },
    /// Cancel any scheduled retry
    CancelRetry,
    /// The retry ceiling was reached; surface `Failed` to the caller
    ReportFailed,
}

/// Exponential backoff with a cap and an attempt ceiling
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub cap_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            cap_delay: Duration::from_secs(16),
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry_count` (1-based):
    /// `min(base * 2^(retry_count - 1), cap)`
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.cap_delay)
    }
}

/// The connectivity state machine
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    status: ConnectionStatus,
    retry_count: u32,
    policy: RetryPolicy,
}

impl ConnectionMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            retry_count: 0,
            policy,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Number of failed attempts since the last successful connect
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Apply one event, returning the effects to execute.
    ///
    /// Events that are invalid in the current status are ignored and
    /// produce no effects.
    pub fn apply(&mut self, event: ConnectionEvent) -> Vec<Effect> {
        use ConnectionEvent::*;
        use ConnectionStatus::*;

        match (self.status, event) {
            (Disconnected | Failed | Reconnecting, ConnectRequested) => {
                self.status = Connecting;
                self.retry_count = 0;
                vec![Effect::CancelRetry, Effect::AttemptConnect]
            }
            (Connecting | Connected, ConnectRequested) => vec![],

            (Reconnecting, RetryElapsed) => {
                self.status = Connecting;
                vec![Effect::AttemptConnect]
            }
            (_, RetryElapsed) => vec![],

            (Connecting, ConnectSucceeded) => {
                self.status = Connected;
                self.retry_count = 0;
                vec![]
            }
            (_, ConnectSucceeded) => vec![],

            (Connecting, ConnectFailed) => {
                self.retry_count += 1;
                if self.retry_count >= self.policy.max_retries {
                    self.status = Failed;
                    vec![Effect::ReportFailed]
                } else {
                    self.status = Reconnecting;
                    vec![Effect::ScheduleRetry {
                        delay: self.policy.backoff_delay(self.retry_count),
                    }]
                }
            }
            (_, ConnectFailed) => vec![],

            (Connected, RemoteDisconnect) => {
                // Losing an established connection is not a failed attempt;
                // only ConnectFailed counts against the ceiling.
                self.status = Reconnecting;
                vec![Effect::ScheduleRetry {
                    delay: self.policy.backoff_delay(1),
                }]
            }
            (_, RemoteDisconnect) => vec![],

            (_, ClientDisconnect) => {
                self.status = Disconnected;
                self.retry_count = 0;
                vec![Effect::CancelRetry]
            }
        }
    }
}
