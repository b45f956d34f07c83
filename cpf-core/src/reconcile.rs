//! Pure hot-reload classification.
//!
//! Four passes over two summary lists: unmodified-by-name-and-digest,
//! reloaded-by-name-only, leftover-old-is-deleted, leftover-new-is-new.
//! `classify` works over plain summaries so it needs no real `.so` files,
//! no live handles, and is entirely unit-testable; the effectful shell
//! that actually calls destructors/constructors and merges
//! [`crate::plugin::PluginRecord`]s lives in `framework.rs`.

use crate::hash::Digest;

/// The bit of a [`crate::plugin::PluginRecord`] relevant to classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSummary {
    pub logical_name: String,
    pub digest: Digest,
}

/// Classification of one entry from the *old* (currently live) set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OldStatus {
    Unmodified,
    Reloaded,
    Deleted,
}

/// Classification of one entry from the *new* (freshly discovered) set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewStatus {
    Unmodified,
    Reloaded,
    New,
}

/// Per-index classification of both sides, aligned with the `old`/`new`
/// slices passed to [`classify`].
#[derive(Debug, Clone)]
pub struct Plan {
    pub old: Vec<OldStatus>,
    pub new: Vec<NewStatus>,
}

/// Classify `old` against `new` in four passes. Every entry ends up in
/// exactly one of Unmodified/Reloaded/Deleted (old) or
/// Unmodified/Reloaded/New (new).
pub fn classify(old: &[PluginSummary], new: &[PluginSummary]) -> Plan {
    let mut old_status = vec![None; old.len()];
    let mut new_status = vec![None; new.len()];

    // Pass 1: unmodified -- same logical name, same digest.
    for (r, new_entry) in new.iter().enumerate() {
        for (l, old_entry) in old.iter().enumerate() {
            if old_status[l].is_some() {
                continue;
            }
            if old_entry.logical_name == new_entry.logical_name
                && old_entry.digest == new_entry.digest
            {
                old_status[l] = Some(OldStatus::Unmodified);
                new_status[r] = Some(NewStatus::Unmodified);
                break;
            }
        }
    }

    // Pass 2: reloaded -- same logical name, different digest.
    for (r, new_entry) in new.iter().enumerate() {
        if new_status[r].is_some() {
            continue;
        }
        for (l, old_entry) in old.iter().enumerate() {
            if old_status[l].is_some() {
                continue;
            }
            if old_entry.logical_name == new_entry.logical_name {
                old_status[l] = Some(OldStatus::Reloaded);
                new_status[r] = Some(NewStatus::Reloaded);
                break;
            }
        }
    }

    // Pass 3 & 4: whatever's left is deleted / new.
    let old = old_status
        .into_iter()
        .map(|s| s.unwrap_or(OldStatus::Deleted))
        .collect();
    let new = new_status
        .into_iter()
        .map(|s| s.unwrap_or(NewStatus::New))
        .collect();

    Plan { old, new }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str, byte: u8) -> PluginSummary {
        let mut bytes = [0u8; 32];
        bytes[0] = byte;
        PluginSummary {
            logical_name: name.to_string(),
            digest: crate::hash::Digest::from_bytes(bytes),
        }
    }

    #[test]
    fn identical_set_is_all_unmodified() {
        let old = vec![summary("a", 1), summary("b", 2)];
        let new = old.clone();
        let plan = classify(&old, &new);
        assert!(plan.old.iter().all(|s| *s == OldStatus::Unmodified));
        assert!(plan.new.iter().all(|s| *s == NewStatus::Unmodified));
    }

    #[test]
    fn same_name_different_digest_is_reloaded() {
        let old = vec![summary("a", 1)];
        let new = vec![summary("a", 2)];
        let plan = classify(&old, &new);
        assert_eq!(plan.old, vec![OldStatus::Reloaded]);
        assert_eq!(plan.new, vec![NewStatus::Reloaded]);
    }

    #[test]
    fn missing_from_new_is_deleted() {
        let old = vec![summary("a", 1), summary("b", 2)];
        let new = vec![summary("a", 1)];
        let plan = classify(&old, &new);
        assert_eq!(plan.old, vec![OldStatus::Unmodified, OldStatus::Deleted]);
        assert_eq!(plan.new, vec![NewStatus::Unmodified]);
    }

    #[test]
    fn present_only_in_new_is_new() {
        let old = vec![summary("a", 1)];
        let new = vec![summary("a", 1), summary("c", 3)];
        let plan = classify(&old, &new);
        assert_eq!(plan.old, vec![OldStatus::Unmodified]);
        assert_eq!(plan.new, vec![NewStatus::Unmodified, NewStatus::New]);
    }

    #[test]
    fn empty_both_sides() {
        let plan = classify(&[], &[]);
        assert!(plan.old.is_empty());
        assert!(plan.new.is_empty());
    }
}
