//! The probe collaborator's reporting shape, and the minimal trait pair the
//! core uses to drive an external prober without depending on a concrete
//! DNS/HTTP/TLS implementation. No wire code lives here; see `ProbeRunner`.

use std::fmt;
use std::sync::Arc;

/// Which kind of probe a `ProbeEntry` represents. The original daemon
/// encodes this as four mutually-constrained booleans (`to_auth`,
/// `to_http`, `dnstcp`, `ssldns`); here it's a single sum type so an
/// inconsistent combination can't be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeKind {
    /// Plain DNS/53 probe against a DHCP-supplied cache.
    Cache,
    /// Probe against one of the hard-coded authority servers.
    Authority,
    /// TCP/53 or TLS/443 probe against a cache, depending on `ssl`.
    Tcp { ssl: bool },
    /// HTTP captive-portal reachability probe.
    Http(HttpProbeKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpProbeKind {
    /// "addr" line: probe fetched a qname/record-type pair through a
    /// specific cache IP.
    WithHost,
    /// "http" line: a plain reachability probe with only a description.
    WithoutHost,
}

/// A DNS record type as used in the `host_c` "addr" probe line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Aaaa,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::Aaaa => write!(f, "AAAA"),
        }
    }
}

/// Hostname + record type checked by an "addr" HTTP probe.
#[derive(Debug, Clone)]
pub struct HttpHostCheck {
    pub qname: String,
    pub record_type: RecordType,
}

/// One candidate in the current probe set.
///
/// Created in bulk when a sweep starts (`submit`/`reprobe`) and replaced
/// wholesale on the next sweep or shutdown — never mutated in place by the
/// core; only the probe collaborator flips `finished`/`works`/`reason`, by
/// handing back a whole new set via `ProbeObserver::sweep_complete`.
#[derive(Debug, Clone)]
pub struct ProbeEntry {
    pub name: String,
    pub kind: ProbeKind,
    pub port: u16,
    pub host_c: Option<HttpHostCheck>,
    pub http_desc: Option<String>,
    pub finished: bool,
    pub works: bool,
    pub reason: Option<String>,
}

impl ProbeEntry {
    pub fn new(name: impl Into<String>, kind: ProbeKind, port: u16) -> Self {
        Self {
            name: name.into(),
            kind,
            port,
            host_c: None,
            http_desc: None,
            finished: false,
            works: false,
            reason: None,
        }
    }

    /// `works` is only meaningful once `finished`; an unfinished entry
    /// never influences sweep classification.
    pub fn counts_as_working(&self) -> bool {
        self.finished && self.works
    }

    /// Render this entry's results-block line, matching the wire formats
    /// in the control protocol exactly.
    pub fn render_line(&self) -> String {
        let status = if self.works { "OK" } else { "error" };
        let reason = self
            .reason
            .as_deref()
            .map(|r| format!(" {r}"))
            .unwrap_or_default();

        match &self.kind {
            ProbeKind::Http(HttpProbeKind::WithHost) => {
                let host_c = self.host_c.as_ref().expect("addr probe missing host_c");
                format!(
                    "addr {} {} from {}: {status}{reason}",
                    host_c.qname, host_c.record_type, self.name
                )
            }
            ProbeKind::Http(HttpProbeKind::WithoutHost) => {
                let desc = self.http_desc.as_deref().unwrap_or("");
                format!("http {desc} ({}): {status}{reason}", self.name)
            }
            ProbeKind::Tcp { ssl } => {
                let proto = if *ssl { "ssl" } else { "tcp" };
                format!("{proto}{} {}: {status}{reason}", self.port, self.name)
            }
            ProbeKind::Cache => format!("cache {}: {status}{reason}", self.name),
            ProbeKind::Authority => format!("authority {}: {status}{reason}", self.name),
        }
    }
}

/// Flags the probe collaborator needs to decide whether to run the
/// captive-portal HTTP check on this sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOptions {
    pub skip_http: bool,
    pub forced_insecure: bool,
}

/// Whether the HTTP probe chain, if it ran, decided the network looks like
/// a captive portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpProbeOutcome {
    NotRun,
    Clean,
    CaptivePortal,
}

/// The probe collaborator's entry point: start a sweep over `candidates`.
/// Out of scope: the wire-level DNS/HTTP/TLS implementation itself — this
/// trait only describes how the core drives it.
pub trait ProbeRunner: Send + Sync {
    fn start_sweep(&self, candidates: Vec<String>, opts: SweepOptions);
}

/// Callback surface the probe collaborator uses to report sweep results
/// back to the core.
pub trait ProbeObserver: Send + Sync {
    fn sweep_complete(&self, probes: Vec<ProbeEntry>, http_mode: HttpProbeOutcome);
}

/// A `ProbeRunner` that does nothing: logs the sweep request and never
/// calls back. Wired in by default until a real DNS/TCP/TLS/HTTP prober
/// is plugged in — probing protocol is explicitly out of scope here.
#[derive(Debug, Default)]
pub struct NullProbeRunner;

impl ProbeRunner for NullProbeRunner {
    fn start_sweep(&self, candidates: Vec<String>, opts: SweepOptions) {
        tracing::warn!(
            candidates = candidates.len(),
            ?opts,
            "no probe collaborator wired in; sweep request dropped"
        );
    }
}

/// In-memory `ProbeRunner` for tests: records the last sweep request and
/// immediately reports back through a fixed observer.
pub struct FakeProbeRunner {
    observer: Arc<dyn ProbeObserver>,
    pub last_request: std::sync::Mutex<Option<(Vec<String>, SweepOptions)>>,
}

impl FakeProbeRunner {
    pub fn new(observer: Arc<dyn ProbeObserver>) -> Self {
        Self {
            observer,
            last_request: std::sync::Mutex::new(None),
        }
    }

    /// Test helper: deliver a canned result set as if a sweep just
    /// finished.
    pub fn complete_with(&self, probes: Vec<ProbeEntry>, http_mode: HttpProbeOutcome) {
        self.observer.sweep_complete(probes, http_mode);
    }
}

impl ProbeRunner for FakeProbeRunner {
    fn start_sweep(&self, candidates: Vec<String>, opts: SweepOptions) {
        *self.last_request.lock().unwrap() = Some((candidates, opts));
    }
}
