//! The update-notification collaborator surface. The daemon itself never
//! fetches or compares version numbers; it asks a collaborator to check,
//! and relays the collaborator's answer to panels via the `update` line.

/// Outcome of an update check, as reported back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateAvailability {
    UpToDate,
    Available { version: String },
}

/// Collaborator the engine asks whenever a sweep completes and
/// `check_updates` is enabled. `user_replied` records that a panel has
/// already been told about the current `Available` version, so the
/// engine does not nag on every subsequent sweep.
pub trait UpdateNotifier: Send + Sync {
    fn check_for_update(&self) -> UpdateAvailability;

    fn user_replied(&self, version: &str);
}

/// An `UpdateNotifier` that never finds anything new. Used when
/// `check_updates` is disabled or in tests.
#[derive(Debug, Default)]
pub struct NoopUpdateNotifier;

impl UpdateNotifier for NoopUpdateNotifier {
    fn check_for_update(&self) -> UpdateAvailability {
        UpdateAvailability::UpToDate
    }

    fn user_replied(&self, _version: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_always_up_to_date() {
        let n = NoopUpdateNotifier;
        assert_eq!(n.check_for_update(), UpdateAvailability::UpToDate);
        n.user_replied("9.9");
    }
}
