//! Resolver-hook arbiter: decides what `/etc/resolv.conf` (or whatever
//! `resolvconf` points at) should say, and writes it idempotently.
//!
//! Three postures, matching `hook_resolv_localhost`/`hook_resolv_iplist`/
//! `hook_resolv_uninstall` in the original daemon:
//!   - loopback: point resolution at 127.0.0.1 (secure/insecure DNS via
//!     the local validating resolver)
//!   - iplist: point resolution directly at a list of working caches
//!     (used once discovery proves those caches reachable)
//!   - uninstalled: give the file back to whatever owned it before

use std::fs::File;
use std::io::{self, Write as _};
use std::path::Path;
use std::sync::Mutex;

use crate::config::DaemonConfig;
use crate::probe::{ProbeEntry, ProbeKind};
use crate::resolver::platform::PlatformHooks;

pub struct ResolverHookArbiter {
    resolvconf: String,
    rescf_domain: Option<String>,
    rescf_search: Option<String>,
    signature: String,
    noaction: bool,
    hooks: Box<dyn PlatformHooks>,
    /// Mirrors the original's file-scope `set_to_localhost`: which
    /// posture we last wrote, so teardown knows what to undo.
    last_posture: Mutex<Posture>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Posture {
    Uninstalled,
    Loopback,
    IpList,
}

impl ResolverHookArbiter {
    pub fn new(config: &DaemonConfig, hooks: Box<dyn PlatformHooks>) -> Self {
        Self {
            resolvconf: config.resolvconf.clone(),
            rescf_domain: config.rescf_domain.clone(),
            rescf_search: config.rescf_search.clone(),
            signature: config.server_signature.clone(),
            noaction: config.noaction,
            hooks,
            last_posture: Mutex::new(Posture::Uninstalled),
        }
    }

    /// Point resolution at 127.0.0.1. Skips the rewrite entirely if the
    /// file already reads exactly as we'd write it — avoids a window
    /// where the file is mutable for no reason.
    pub fn set_to_localhost(&self) {
        *self.last_posture.lock().unwrap() = Posture::Loopback;
        if self.noaction {
            return;
        }
        if self.really_set_to_localhost() {
            tracing::debug!("resolv.conf localhost already set");
            return;
        }
        tracing::debug!("resolv.conf localhost write");
        let lines = vec!["nameserver 127.0.0.1\n".to_string()];
        if let Err(e) = self.write_rescf(&lines) {
            tracing::error!(error = %e, "failed to write resolv.conf");
        }
    }

    /// Point resolution directly at the working caches from `probes`.
    pub fn set_to_iplist(&self, probes: &[ProbeEntry]) {
        *self.last_posture.lock().unwrap() = Posture::IpList;
        if self.noaction {
            return;
        }
        let lines: Vec<String> = probes
            .iter()
            .filter(|p| p.kind == ProbeKind::Cache)
            .map(|p| format!("nameserver {}\n", p.name))
            .collect();
        if let Err(e) = self.write_rescf(&lines) {
            tracing::error!(error = %e, "failed to write resolv.conf");
        }
    }

    /// Best-effort OS resolver cache flush, fired when the daemon
    /// transitions from insecure to secure mode.
    pub fn flush_cache(&self) {
        self.hooks.flush_cache();
    }

    /// Release the file back to whatever owned it before we started:
    /// drop the immutable flag and leave the contents alone.
    pub fn uninstall(&self) {
        *self.last_posture.lock().unwrap() = Posture::Uninstalled;
        if self.noaction {
            return;
        }
        if let Err(e) = self.hooks.make_mutable(Path::new(&self.resolvconf)) {
            tracing::warn!(error = %e, "failed to restore resolv.conf mutability");
        }
    }

    /// Port of `really_set_to_localhost`: true only if the file's
    /// contents are *exactly* what `set_to_localhost` would write given
    /// the current `rescf_domain`/`rescf_search` config — our own
    /// signature line, an optional domain/search line each matching
    /// the configured value verbatim, and a single
    /// `nameserver 127.0.0.1` line with nothing else.
    fn really_set_to_localhost(&self) -> bool {
        let content = match std::fs::read_to_string(&self.resolvconf) {
            Ok(c) => c,
            Err(_) => return false,
        };
        let mut lines = content.lines();

        match lines.next() {
            Some(first) if format!("{first}\n") == self.signature => {}
            _ => return false,
        }

        let mut saw_127 = false;
        let mut saw_search = false;
        let mut saw_domain = false;

        for line in lines {
            if line == "nameserver 127.0.0.1" {
                saw_127 = true;
            } else if line.starts_with("nameserver") {
                return false;
            } else if let Some(arg) = line.strip_prefix("search ") {
                if !check_line_arg(arg, self.rescf_search.as_deref()) {
                    return false;
                }
                saw_search = true;
            } else if let Some(arg) = line.strip_prefix("domain ") {
                if !check_line_arg(arg, self.rescf_domain.as_deref()) {
                    return false;
                }
                saw_domain = true;
            }
        }

        if self.rescf_search.is_some() && !saw_search {
            return false;
        }
        if self.rescf_domain.is_some() && !saw_domain {
            return false;
        }
        saw_127
    }

    fn write_rescf(&self, nameserver_lines: &[String]) -> io::Result<()> {
        let path = Path::new(&self.resolvconf);
        self.hooks.make_mutable(path)?;
        self.hooks.chmod(path, 0o644)?;

        let mut out = File::create(path)?;
        out.write_all(self.signature.as_bytes())?;
        if let Some(domain) = &self.rescf_domain {
            out.write_all(format!("domain {domain}\n").as_bytes())?;
        }
        if let Some(search) = &self.rescf_search {
            out.write_all(format!("search {search}\n").as_bytes())?;
        }
        for line in nameserver_lines {
            out.write_all(line.as_bytes())?;
        }
        drop(out);

        self.hooks.chmod(path, 0o444)?;
        self.hooks.make_immutable(path)?;
        Ok(())
    }
}

/// Port of `check_line_arg`: the line's argument must match `opt`
/// exactly, or `opt` must be absent and so must the line's argument.
fn check_line_arg(arg: &str, opt: Option<&str>) -> bool {
    match opt {
        None => false,
        Some(opt) => arg == opt,
    }
}
