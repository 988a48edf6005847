//! Two-pointer merge diff
//!
//! Both inputs must already be sorted the same way. Each step compares the
//! canonical keys at the heads of both sequences and hands the decision to a
//! [`MergePolicy`], which is where the per-resource behavior lives.

use crate::traits::Comparable;
use std::cmp::Ordering;

/// Result of matching a local value against a remote value with the same key
#[derive(Debug)]
pub enum Matched<T> {
    Common(T),
    Updated(T),
}

/// Per-resource decisions taken during a merge
pub trait MergePolicy<T> {
    /// Build the output for a local/remote pair with equal keys.
    fn matched(&mut self, local: T, remote: T) -> Matched<T>;

    /// Whether a remote-only value is reported for removal.
    fn removable(&self, _remote: &T) -> bool {
        true
    }

    /// Capability gate and priority assignment for a local-only value.
    /// Returning `None` drops the value silently.
    fn admit(&mut self, local: T) -> Option<T> {
        Some(local)
    }
}

#[derive(Debug)]
pub struct MergeOutcome<T> {
    pub common: Vec<T>,
    pub added: Vec<T>,
    pub removed: Vec<T>,
    pub updated: Vec<T>,
}

impl<T> Default for MergeOutcome<T> {
    fn default() -> Self {
        Self {
            common: Vec::new(),
            added: Vec::new(),
            removed: Vec::new(),
            updated: Vec::new(),
        }
    }
}

impl<T> MergeOutcome<T> {
    pub fn append(&mut self, mut other: MergeOutcome<T>) {
        self.common.append(&mut other.common);
        self.added.append(&mut other.added);
        self.removed.append(&mut other.removed);
        self.updated.append(&mut other.updated);
    }
}

fn log_decision(debug: bool, decision: &str, key: &str) {
    if debug {
        tracing::info!(decision, key, "merge");
    } else {
        tracing::trace!(decision, key, "merge");
    }
}

/// Merge two pre-sorted sequences.
///
/// Keys are compared as `remote.cmp(local)`: a smaller remote key has no local
/// counterpart and is removed, a smaller local key is added. Duplicate keys
/// cannot break the merge; at worst they surface as a spurious add/remove pair.
pub fn merge_sorted<T, P>(local: Vec<T>, remote: Vec<T>, policy: &mut P, debug: bool) -> MergeOutcome<T>
where
    T: Comparable,
    P: MergePolicy<T>,
{
    let mut outcome = MergeOutcome::default();
    let mut local = local.into_iter().map(|v| (v.canonical_key(), v)).peekable();
    let mut remote = remote.into_iter().map(|v| (v.canonical_key(), v)).peekable();

    loop {
        let step = match (local.peek(), remote.peek()) {
            (Some((local_key, _)), Some((remote_key, _))) => remote_key.cmp(local_key),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => break,
        };

        match step {
            Ordering::Equal => {
                if let (Some((key, l)), Some((_, r))) = (local.next(), remote.next()) {
                    match policy.matched(l, r) {
                        Matched::Common(v) => {
                            log_decision(debug, "common", &key);
                            outcome.common.push(v);
                        }
                        Matched::Updated(v) => {
                            log_decision(debug, "update", &key);
                            outcome.updated.push(v);
                        }
                    }
                }
            }
            Ordering::Less => {
                if let Some((key, r)) = remote.next() {
                    if policy.removable(&r) {
                        log_decision(debug, "remove", &key);
                        outcome.removed.push(r);
                    } else {
                        log_decision(debug, "keep-implicit", &key);
                    }
                }
            }
            Ordering::Greater => {
                if let Some((key, l)) = local.next() {
                    match policy.admit(l) {
                        Some(v) => {
                            log_decision(debug, "add", &key);
                            outcome.added.push(v);
                        }
                        None => log_decision(debug, "unsupported", &key),
                    }
                }
            }
        }
    }

    outcome
}
