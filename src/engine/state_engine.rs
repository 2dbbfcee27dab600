//! State engine: owns `resolution_state` and the insecure/forced/http flags,
//! classifies a finished probe sweep, and drives the resolver-hook arbiter,
//! retry scheduler, and panel broadcast in response.

use std::sync::{Arc, Mutex};

use crate::engine::retry::RetryScheduler;
use crate::probe::{HttpProbeOutcome, ProbeEntry, ProbeKind, ProbeObserver};
use crate::resolver::ResolverHookArbiter;
use crate::update::{UpdateAvailability, UpdateNotifier};

const RESULTS_BLOCK_TIMESTAMP: &[time::format_description::FormatItem<'_>] =
    time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

fn format_now() -> String {
    time::OffsetDateTime::now_utc()
        .format(RESULTS_BLOCK_TIMESTAMP)
        .unwrap_or_else(|_| "unknown".to_string())
}

/// `resolution_state`. Starts `Unprobed` until the first sweep completes;
/// the original daemon leaves this implementation-defined, so this
/// rewrite makes the "not yet probed" posture an explicit variant instead
/// of overloading `disconn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Unprobed,
    Cache,
    Tcp,
    Ssl,
    Auth,
    Disconn,
    Dark,
}

impl ResolutionState {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            ResolutionState::Unprobed => "unprobed",
            ResolutionState::Cache => "cache",
            ResolutionState::Tcp => "tcp",
            ResolutionState::Ssl => "ssl",
            ResolutionState::Auth => "auth",
            ResolutionState::Disconn => "disconn",
            ResolutionState::Dark => "dark",
        }
    }

    fn is_dark(&self) -> bool {
        matches!(self, ResolutionState::Dark)
    }
}

/// Classifies a finished probe sweep into a `ResolutionState`, per the
/// sweep-completion algorithm: cache beats tcp/ssl beats auth beats
/// disconn/dark, with plain tcp preferred over ssl when both work.
pub fn classify_sweep(probes: &[ProbeEntry], http_mode: HttpProbeOutcome) -> ResolutionState {
    let working = |kind: &ProbeKind| probes.iter().any(|p| &p.kind == kind && p.counts_as_working());

    if probes
        .iter()
        .any(|p| p.kind == ProbeKind::Cache && p.counts_as_working())
    {
        return ResolutionState::Cache;
    }
    if working(&ProbeKind::Tcp { ssl: false }) {
        return ResolutionState::Tcp;
    }
    if working(&ProbeKind::Tcp { ssl: true }) {
        return ResolutionState::Ssl;
    }
    if probes
        .iter()
        .any(|p| p.kind == ProbeKind::Authority && p.counts_as_working())
    {
        return ResolutionState::Auth;
    }
    if http_mode == HttpProbeOutcome::CaptivePortal || http_mode == HttpProbeOutcome::NotRun {
        ResolutionState::Dark
    } else {
        ResolutionState::Disconn
    }
}

#[derive(Debug, Default)]
struct Flags {
    insecure_state: bool,
    forced_insecure: bool,
    http_insecure: bool,
    skip_http: bool,
}

struct Inner {
    resolution_state: ResolutionState,
    flags: Flags,
    probes: Vec<ProbeEntry>,
    last_sweep_at: Option<String>,
    update_desired: Option<String>,
}

/// The mutable core plus its collaborators. `Arc<StateEngine>` is shared
/// between the control server's per-connection tasks and the retry
/// scheduler's background loops.
pub struct StateEngine {
    inner: Mutex<Inner>,
    arbiter: ResolverHookArbiter,
    retry: Arc<RetryScheduler>,
    updater: Box<dyn UpdateNotifier>,
    check_updates: bool,
    broadcast: tokio::sync::broadcast::Sender<String>,
}

impl StateEngine {
    pub fn new(
        arbiter: ResolverHookArbiter,
        retry: Arc<RetryScheduler>,
        updater: Box<dyn UpdateNotifier>,
        check_updates: bool,
    ) -> Self {
        let (broadcast, _) = tokio::sync::broadcast::channel(64);
        Self {
            inner: Mutex::new(Inner {
                resolution_state: ResolutionState::Unprobed,
                flags: Flags::default(),
                probes: Vec::new(),
                last_sweep_at: None,
                update_desired: None,
            }),
            arbiter,
            retry,
            updater,
            check_updates,
            broadcast,
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<String> {
        self.broadcast.subscribe()
    }

    /// Daemon teardown: restore the resolver hooks to a mutable,
    /// user-owned state rather than leaving the last-installed posture in
    /// place.
    pub fn uninstall_hooks(&self) {
        self.arbiter.uninstall();
    }

    pub fn resolution_state(&self) -> ResolutionState {
        self.inner.lock().unwrap().resolution_state
    }

    pub fn probes(&self) -> Vec<ProbeEntry> {
        self.inner.lock().unwrap().probes.clone()
    }

    pub fn skip_http(&self) -> bool {
        self.inner.lock().unwrap().flags.skip_http
    }

    /// Sweep completion: classify, update flags, drive the arbiter, arm
    /// timers, maybe trigger an update check, then broadcast.
    pub fn complete_sweep(&self, probes: Vec<ProbeEntry>, http_mode: HttpProbeOutcome, at: String) {
        let new_state = classify_sweep(&probes, http_mode);
        let was_secure;
        {
            let mut inner = self.inner.lock().unwrap();
            was_secure = !inner.resolution_state.is_dark() && !inner.resolution_state.eq(&ResolutionState::Disconn);
            inner.probes = probes;
            inner.resolution_state = new_state;
            inner.last_sweep_at = Some(at);
            if http_mode == HttpProbeOutcome::CaptivePortal {
                inner.flags.http_insecure = true;
            }
            if !new_state.is_dark() {
                // a successful non-dark state clears the http captive-portal
                // sticky bit, matching the open-question decision on skip_http
                inner.flags.skip_http = false;
            }
        }

        self.arbiter.flush_cache_if(was_secure, new_state);
        self.drive_arbiter(new_state);
        self.rearm_timers(new_state, http_mode);

        if !matches!(new_state, ResolutionState::Dark | ResolutionState::Disconn) {
            self.maybe_check_update();
        }

        self.broadcast_results();
    }

    fn drive_arbiter(&self, state: ResolutionState) {
        let (insecure, forced) = {
            let inner = self.inner.lock().unwrap();
            (inner.flags.insecure_state, inner.flags.forced_insecure)
        };
        if (state.is_dark() || state == ResolutionState::Disconn) && (insecure || forced) {
            let probes = self.inner.lock().unwrap().probes.clone();
            self.arbiter.set_to_iplist(&probes);
        } else {
            self.arbiter.set_to_localhost();
        }
    }

    fn rearm_timers(&self, state: ResolutionState, http_mode: HttpProbeOutcome) {
        match state {
            ResolutionState::Cache => {
                self.retry.retry_timer_stop();
                self.retry.tcp_timer_stop();
            }
            ResolutionState::Tcp | ResolutionState::Ssl => {
                self.retry.retry_timer_stop();
                self.retry.tcp_timer_enable();
            }
            _ => {
                self.retry
                    .retry_timer_next(http_mode == HttpProbeOutcome::CaptivePortal);
            }
        }
    }

    fn maybe_check_update(&self) {
        if !self.check_updates {
            return;
        }
        let (insecure, forced) = {
            let inner = self.inner.lock().unwrap();
            (inner.flags.insecure_state, inner.flags.forced_insecure)
        };
        if insecure || forced {
            return;
        }
        if let UpdateAvailability::Available { version } = self.updater.check_for_update() {
            self.inner.lock().unwrap().update_desired = Some(version.clone());
            let _ = self.broadcast.send(format!("update {version}\n"));
        }
    }

    /// `reprobe`: clears `forced_insecure`/`http_insecure`/`insecure_state`
    /// and asks the probe collaborator to re-sweep the current candidate
    /// set. The actual sweep dispatch is the caller's job; this just
    /// clears state per the invariant that a `reprobe` command always
    /// resets these flags.
    pub fn begin_reprobe(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.flags.insecure_state = false;
        inner.flags.forced_insecure = false;
        inner.flags.http_insecure = false;
    }

    /// `insecure yes`/`insecure no` persistent command.
    pub fn set_insecure(&self, wants_insecure: bool) {
        let state = self.resolution_state();
        let mut inner = self.inner.lock().unwrap();
        if state.is_dark() {
            if wants_insecure && !inner.flags.insecure_state {
                inner.flags.insecure_state = true;
                drop(inner);
                let probes = self.inner.lock().unwrap().probes.clone();
                self.arbiter.set_to_iplist(&probes);
            } else if !wants_insecure && inner.flags.insecure_state {
                inner.flags.insecure_state = false;
                drop(inner);
                self.arbiter.set_to_localhost();
            }
        } else if !inner.flags.forced_insecure {
            inner.flags.insecure_state = false;
        }
        self.broadcast_results();
    }

    /// `skip_http` persistent command: sticky until a successful non-dark
    /// state clears it.
    pub fn set_skip_http(&self) {
        self.inner.lock().unwrap().flags.skip_http = true;
    }

    /// `hotspot_signon`: synthetic dark+forced-insecure posture so the
    /// user can reach a captive portal landing page.
    pub fn hotspot_signon(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.resolution_state = ResolutionState::Dark;
            inner.flags.forced_insecure = true;
        }
        let probes = self.inner.lock().unwrap().probes.clone();
        self.arbiter.set_to_iplist(&probes);
        self.broadcast_results();
    }

    pub fn user_replied_update(&self, accepted: bool) {
        let version = self.inner.lock().unwrap().update_desired.clone();
        if let Some(version) = version {
            if accepted {
                self.updater.user_replied(&version);
            }
        }
    }

    /// `svr_send_results`: renders the current state into the results
    /// block and pushes it to every persistent connection.
    pub fn broadcast_results(&self) {
        let block = self.render_results_block();
        let _ = self.broadcast.send(block);
    }

    pub fn render_results_block(&self) -> String {
        let inner = self.inner.lock().unwrap();
        let mut out = String::new();
        match &inner.last_sweep_at {
            Some(at) => out.push_str(&format!("at {at}\n")),
            None => out.push_str("at (no probe performed)\n"),
        }
        for probe in &inner.probes {
            out.push_str(&probe.render_line());
            out.push('\n');
        }
        if inner.probes.is_empty() {
            out.push_str("no cache: no DNS servers have been supplied via DHCP\n");
        }
        let mode = if inner.flags.insecure_state {
            "insecure_mode"
        } else {
            "secure"
        };
        out.push_str(&format!("state: {} {mode}", inner.resolution_state.as_wire_str()));
        if inner.flags.forced_insecure {
            out.push_str(" forced_insecure");
        }
        if inner.flags.http_insecure {
            out.push_str(" http_insecure");
        }
        out.push('\n');
        out.push('\n');
        out
    }
}

impl ProbeObserver for StateEngine {
    fn sweep_complete(&self, probes: Vec<ProbeEntry>, http_mode: HttpProbeOutcome) {
        self.complete_sweep(probes, http_mode, format_now());
    }
}

trait ArbiterFlushExt {
    fn flush_cache_if(&self, was_secure: bool, new_state: ResolutionState);
}

impl ArbiterFlushExt for ResolverHookArbiter {
    /// Flush the OS resolver cache exactly on the insecure/disconn/dark
    /// -> secure transition, since stale negative answers cached while
    /// the network was unusable should not linger.
    fn flush_cache_if(&self, was_secure: bool, new_state: ResolutionState) {
        let now_secure = !matches!(new_state, ResolutionState::Dark | ResolutionState::Disconn);
        if !was_secure && now_secure {
            self.flush_cache();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeEntry;

    fn working(kind: ProbeKind, name: &str) -> ProbeEntry {
        let mut p = ProbeEntry::new(name, kind, 53);
        p.finished = true;
        p.works = true;
        p
    }

    fn failing(kind: ProbeKind, name: &str) -> ProbeEntry {
        let mut p = ProbeEntry::new(name, kind, 53);
        p.finished = true;
        p.works = false;
        p
    }

    #[test]
    fn classify_prefers_cache() {
        let probes = vec![
            working(ProbeKind::Cache, "192.0.2.1"),
            working(ProbeKind::Tcp { ssl: false }, "192.0.2.1"),
        ];
        assert_eq!(
            classify_sweep(&probes, HttpProbeOutcome::NotRun),
            ResolutionState::Cache
        );
    }

    #[test]
    fn classify_prefers_tcp_over_ssl() {
        let probes = vec![
            working(ProbeKind::Tcp { ssl: false }, "192.0.2.1"),
            working(ProbeKind::Tcp { ssl: true }, "192.0.2.1"),
        ];
        assert_eq!(
            classify_sweep(&probes, HttpProbeOutcome::NotRun),
            ResolutionState::Tcp
        );
    }

    #[test]
    fn classify_falls_back_to_auth() {
        let probes = vec![
            failing(ProbeKind::Cache, "192.0.2.1"),
            working(ProbeKind::Authority, "198.41.0.4"),
        ];
        assert_eq!(
            classify_sweep(&probes, HttpProbeOutcome::NotRun),
            ResolutionState::Auth
        );
    }

    #[test]
    fn classify_dark_when_http_reports_captive_portal() {
        let probes = vec![failing(ProbeKind::Cache, "192.0.2.1")];
        assert_eq!(
            classify_sweep(&probes, HttpProbeOutcome::CaptivePortal),
            ResolutionState::Dark
        );
    }

    #[test]
    fn classify_disconn_when_http_clean_but_nothing_resolves() {
        let probes = vec![failing(ProbeKind::Cache, "192.0.2.1")];
        assert_eq!(
            classify_sweep(&probes, HttpProbeOutcome::Clean),
            ResolutionState::Disconn
        );
    }
}
