//! Retry scheduler: the reprobe backoff timer and the one-shot TCP
//! recheck timer, ported from `svr_retry_*`/`svr_tcp_*` in the original
//! daemon.
//!
//! The original has two independent `comm_timer`s (`retry_timer`,
//! `tcp_timer`) but `svr_tcp_timer_stop` calls `comm_timer_disable` on
//! `retry_timer` instead of `tcp_timer` — almost certainly a copy-paste
//! bug, since every other `tcp_*` function in the file operates on
//! `svr->tcp_timer`. This rewrite keeps the two timers independent and
//! has `stop_tcp_timer` disable the TCP timer, not the reprobe timer.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::config::RetryTimerConfig;

/// Fired when a scheduled timer elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    Reprobe,
    TcpRecheck,
}

struct ReprobeState {
    enabled: AtomicBool,
    timeout_secs: AtomicU64,
    count: AtomicU32,
}

/// Owns both timers. `spawn_reprobe_loop`/`spawn_tcp_loop` run as
/// background tasks for the lifetime of the daemon; `next`/`stop`/`start`
/// methods just flip state and wake the relevant task via `Notify`.
pub struct RetryScheduler {
    config: RetryTimerConfig,
    reprobe: ReprobeState,
    reprobe_wake: Notify,
    reprobe_deadline: Arc<Notify>,
    tcp_timer_used: AtomicBool,
    tcp_wake: Notify,
    shutdown: Arc<Notify>,
}

impl RetryScheduler {
    pub fn new(config: RetryTimerConfig, shutdown: Arc<Notify>) -> Self {
        Self {
            reprobe: ReprobeState {
                enabled: AtomicBool::new(false),
                timeout_secs: AtomicU64::new(config.start_secs),
                count: AtomicU32::new(0),
            },
            config,
            reprobe_wake: Notify::new(),
            reprobe_deadline: Arc::new(Notify::new()),
            tcp_timer_used: AtomicBool::new(false),
            tcp_wake: Notify::new(),
            shutdown,
        }
    }

    /// Port of `svr_retry_timer_next`: arm the timer if it wasn't
    /// running, otherwise advance it — bump the try count while under
    /// `count_max`, then switch to exponential backoff capped at
    /// `max_secs`.
    pub fn retry_timer_next(&self, http_mode: bool) {
        if !self.reprobe.enabled.swap(true, Ordering::SeqCst) {
            self.reprobe.timeout_secs.store(self.config.start_secs, Ordering::SeqCst);
            self.reprobe.count.store(
                if http_mode { 1 } else { self.config.count_max },
                Ordering::SeqCst,
            );
        } else if self.reprobe.count.load(Ordering::SeqCst) < self.config.count_max {
            self.reprobe.count.fetch_add(1, Ordering::SeqCst);
        } else {
            let doubled = self.reprobe.timeout_secs.load(Ordering::SeqCst) * 2;
            self.reprobe
                .timeout_secs
                .store(doubled.min(self.config.max_secs), Ordering::SeqCst);
        }
        self.reprobe_deadline.notify_one();
    }

    /// Port of `svr_retry_timer_stop`: a finished sweep disarms the
    /// reprobe timer entirely.
    pub fn retry_timer_stop(&self) {
        self.reprobe.enabled.store(false, Ordering::SeqCst);
        self.reprobe_deadline.notify_one();
    }

    /// Port of `svr_tcp_timer_enable`: fires once, `self.config.tcp_retry_secs`
    /// after the current resolution settles on TCP or TLS. A second
    /// call before it fires is a no-op, matching `tcp_timer_used`.
    pub fn tcp_timer_enable(&self) {
        if self.tcp_timer_used.swap(true, Ordering::SeqCst) {
            return;
        }
        self.tcp_wake.notify_one();
    }

    /// Port of `svr_tcp_timer_stop`, bug fixed: disables the TCP timer,
    /// not the reprobe timer.
    pub fn tcp_timer_stop(&self) {
        self.tcp_timer_used.store(false, Ordering::SeqCst);
        self.tcp_wake.notify_one();
    }

    pub fn reprobe_interval(&self) -> Duration {
        Duration::from_secs(self.reprobe.timeout_secs.load(Ordering::SeqCst))
    }

    pub fn reprobe_enabled(&self) -> bool {
        self.reprobe.enabled.load(Ordering::SeqCst)
    }

    /// Background loop: waits for the reprobe timer to be armed, sleeps
    /// for the current interval (restarting if re-armed mid-sleep), and
    /// emits `RetryEvent::Reprobe` on elapse.
    pub async fn run_reprobe_loop(&self, on_event: impl Fn(RetryEvent)) {
        loop {
            if !self.reprobe_enabled() {
                tokio::select! {
                    _ = self.reprobe_deadline.notified() => continue,
                    _ = self.shutdown.notified() => return,
                }
            }
            let sleep = tokio::time::sleep(self.reprobe_interval());
            tokio::select! {
                _ = sleep => {
                    if self.reprobe_enabled() {
                        on_event(RetryEvent::Reprobe);
                    }
                }
                _ = self.reprobe_deadline.notified() => continue,
                _ = self.shutdown.notified() => return,
            }
        }
    }

    /// Background loop for the one-shot TCP recheck timer.
    pub async fn run_tcp_loop(&self, on_event: impl Fn(RetryEvent)) {
        loop {
            tokio::select! {
                _ = self.tcp_wake.notified() => {}
                _ = self.shutdown.notified() => return,
            }
            if !self.tcp_timer_used.load(Ordering::SeqCst) {
                continue;
            }
            let sleep = tokio::time::sleep(Duration::from_secs(self.config.tcp_retry_secs));
            tokio::select! {
                _ = sleep => {
                    if self.tcp_timer_used.swap(false, Ordering::SeqCst) {
                        on_event(RetryEvent::TcpRecheck);
                    }
                }
                _ = self.tcp_wake.notified() => continue,
                _ = self.shutdown.notified() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> RetryScheduler {
        RetryScheduler::new(
            RetryTimerConfig {
                start_secs: 1,
                count_max: 3,
                max_secs: 8,
                tcp_retry_secs: 1,
            },
            Arc::new(Notify::new()),
        )
    }

    #[test]
    fn first_reprobe_arms_timer_with_start_timeout() {
        let s = scheduler();
        s.retry_timer_next(false);
        assert!(s.reprobe_enabled());
        assert_eq!(s.reprobe_interval(), Duration::from_secs(1));
    }

    #[test]
    fn http_mode_starts_count_at_one() {
        let s = scheduler();
        s.retry_timer_next(true);
        assert_eq!(s.reprobe.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_http_mode_starts_count_at_count_max() {
        let s = scheduler();
        s.retry_timer_next(false);
        assert_eq!(s.reprobe.count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles_and_caps_after_count_max() {
        let s = scheduler();
        s.retry_timer_next(true); // count=1
        s.retry_timer_next(true); // count=2
        s.retry_timer_next(true); // count=3 == count_max
        s.retry_timer_next(true); // now doubles: 1 -> 2
        assert_eq!(s.reprobe_interval(), Duration::from_secs(2));
        s.retry_timer_next(true); // 2 -> 4
        s.retry_timer_next(true); // 4 -> 8 (== max)
        s.retry_timer_next(true); // 8 -> 16, capped to 8
        assert_eq!(s.reprobe_interval(), Duration::from_secs(8));
    }

    #[test]
    fn stop_disarms_reprobe_timer() {
        let s = scheduler();
        s.retry_timer_next(false);
        s.retry_timer_stop();
        assert!(!s.reprobe_enabled());
    }

    #[test]
    fn tcp_timer_enable_is_idempotent_until_stopped() {
        let s = scheduler();
        s.tcp_timer_enable();
        assert!(s.tcp_timer_used.load(Ordering::SeqCst));
        s.tcp_timer_enable();
        assert!(s.tcp_timer_used.load(Ordering::SeqCst));
        s.tcp_timer_stop();
        assert!(!s.tcp_timer_used.load(Ordering::SeqCst));
    }

    #[test]
    fn tcp_timer_stop_does_not_touch_reprobe_timer() {
        let s = scheduler();
        s.retry_timer_next(false);
        s.tcp_timer_enable();
        s.tcp_timer_stop();
        assert!(s.reprobe_enabled(), "tcp_timer_stop must not disarm the reprobe timer");
    }
}
