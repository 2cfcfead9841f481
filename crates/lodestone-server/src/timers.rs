//! Per-connection timers.
//!
//! [`SessionTimers`] belongs to the connection task. It holds at most one of
//! the login kick (a one-shot sleep) and the keep-alive interval. Dropping it
//! cancels both, so every exit path of the task releases them.

use std::{pin::Pin, time::Duration};

use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Login deadline passed
    LoginKick,
    /// Keep-alive check is due
    KeepAlive,
}

/// Login kick and keep-alive timers for one connection.
#[derive(Debug, Default)]
pub struct SessionTimers {
    login_kick: Option<Pin<Box<Sleep>>>,
    keep_alive: Option<Interval>,
}

impl SessionTimers {
    /// No timers armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the login kick to fire after `timeout`. Re-arming replaces the
    /// previous deadline.
    pub fn arm_login_kick(&mut self, timeout: Duration) {
        debug_assert!(self.keep_alive.is_none(), "login kick armed while keep-alive runs");
        self.login_kick = Some(Box::pin(tokio::time::sleep(timeout)));
    }

    /// Cancel the login kick if armed.
    pub fn cancel_login_kick(&mut self) {
        self.login_kick = None;
    }

    /// Cancel the login kick, then tick every `period`, first tick one
    /// period from now.
    pub fn start_keep_alive(&mut self, period: Duration) {
        self.cancel_login_kick();
        debug_assert!(self.keep_alive.is_none(), "keep-alive started twice");

        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.keep_alive = Some(interval);
    }

    /// Release both timers.
    pub fn cancel_all(&mut self) {
        self.login_kick = None;
        self.keep_alive = None;
    }

    /// Whether the login kick is armed.
    pub fn is_login_kick_armed(&self) -> bool {
        self.login_kick.is_some()
    }

    /// Whether the keep-alive interval runs.
    pub fn is_keep_alive_running(&self) -> bool {
        self.keep_alive.is_some()
    }

    /// Wait for the next timer. Pending forever while nothing is armed.
    ///
    /// Cancel-safe: dropping the future keeps the deadlines intact. A fired
    /// login kick disarms itself.
    pub async fn next(&mut self) -> TimerKind {
        if let Some(sleep) = self.login_kick.as_mut() {
            sleep.as_mut().await;
            self.login_kick = None;
            return TimerKind::LoginKick;
        }

        if let Some(interval) = self.keep_alive.as_mut() {
            interval.tick().await;
            return TimerKind::KeepAlive;
        }

        std::future::pending().await
    }
}
