//! The UNIX primitives `ResolverHookArbiter` drives: toggling the
//! immutable flag on resolv.conf and flushing OS resolver caches. Split
//! behind a trait so the arbiter's idempotence/write logic can be tested
//! without touching the filesystem or spawning `chattr`.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

pub trait PlatformHooks: Send + Sync {
    /// Drop the immutable attribute so the file can be rewritten.
    fn make_mutable(&self, path: &Path) -> io::Result<()>;

    /// Set the immutable attribute so nothing else rewrites the file
    /// between our runs.
    fn make_immutable(&self, path: &Path) -> io::Result<()>;

    /// chmod to `mode`.
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Flush whatever OS-level resolver cache exists. Best effort.
    fn flush_cache(&self);
}

/// `chattr +i`/`chattr -i` on ext-family filesystems, matching the
/// non-BSD branch of `reshook.c`'s `r_mutable_efs`/`r_immutable_efs`.
/// `hook_resolv_flush` on plain UNIX has no implementation upstream
/// either (`/* TODO */`) — `flush_cache` mirrors that by doing nothing.
#[derive(Debug, Default)]
pub struct UnixPlatformHooks;

impl PlatformHooks for UnixPlatformHooks {
    fn make_mutable(&self, path: &Path) -> io::Result<()> {
        run_chattr(path, "-i")
    }

    fn make_immutable(&self, path: &Path) -> io::Result<()> {
        run_chattr(path, "+i")
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }

    fn flush_cache(&self) {
        // TODO: no portable UNIX resolver-cache flush exists; left
        // unimplemented upstream too.
    }
}

fn run_chattr(path: &Path, flag: &str) -> io::Result<()> {
    let status = Command::new("chattr").arg(flag).arg(path).status()?;
    if !status.success() {
        tracing::warn!(?path, flag, "chattr exited with non-zero status");
    }
    Ok(())
}

/// No-op hooks for `noaction` mode and for tests exercising the arbiter's
/// decision logic without a real filesystem.
#[derive(Debug, Default)]
pub struct NoopPlatformHooks;

impl PlatformHooks for NoopPlatformHooks {
    fn make_mutable(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn make_immutable(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn chmod(&self, _path: &Path, _mode: u32) -> io::Result<()> {
        Ok(())
    }

    fn flush_cache(&self) {}
}
