//! Security-group reconciliation
//!
//! [`compare_rules`] diffs the locally desired rules of one security group
//! against what the provider reports, per direction and, unless only allow
//! rules are compared, per protocol.

use crate::allowlist::{AllowListReduction, reduce_to_allow_list};
use crate::merge::{Matched, MergeOutcome, MergePolicy, merge_sorted};
use crate::order::{PriorityCursor, PriorityWindow};
use crate::secrule::{DefaultSide, Direction, Protocol, RuleAction, RuleOrigin, SecurityRule};
use crate::traits::Comparable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// The local model's implicit trailing rule for `direction`.
///
/// Inbound traffic is denied and outbound traffic allowed unless a rule says
/// otherwise.
pub fn local_default_rule(direction: Direction) -> SecurityRule {
    let action = match direction {
        Direction::In => RuleAction::Deny,
        Direction::Out => RuleAction::Allow,
    };
    SecurityRule::new(direction, action, Protocol::Any)
}

/// Outcome of a security-group comparison
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRuleDiff {
    pub common: Vec<SecurityRule>,
    pub in_adds: Vec<SecurityRule>,
    pub out_adds: Vec<SecurityRule>,
    pub in_dels: Vec<SecurityRule>,
    pub out_dels: Vec<SecurityRule>,
}

impl SecurityRuleDiff {
    /// True when applying the diff would change nothing.
    pub fn is_converged(&self) -> bool {
        self.in_adds.is_empty()
            && self.out_adds.is_empty()
            && self.in_dels.is_empty()
            && self.out_dels.is_empty()
    }

    pub fn adds(&self) -> impl Iterator<Item = &SecurityRule> {
        self.in_adds.iter().chain(self.out_adds.iter())
    }

    pub fn dels(&self) -> impl Iterator<Item = &SecurityRule> {
        self.in_dels.iter().chain(self.out_dels.iter())
    }
}

/// Make the implicit trailing rules explicit when local and provider disagree.
///
/// Returns `true` when both defaults are the same policy and nothing was
/// injected.
pub fn inject_default(
    window: &PriorityWindow,
    direction: Direction,
    provider_default: &SecurityRule,
    local: &mut Vec<SecurityRule>,
    remote: &mut Vec<SecurityRule>,
) -> bool {
    let local_default = local_default_rule(direction);
    let mut provider_default = provider_default.clone();
    provider_default.direction = direction;

    if provider_default.canonical_key() == local_default.canonical_key() {
        return true;
    }

    local.push(
        local_default
            .with_priority(window.beyond_lowest())
            .with_origin(RuleOrigin::SynthesizedDefault(DefaultSide::Local)),
    );
    remote.push(
        provider_default
            .with_priority(window.beyond_lowest())
            .with_origin(RuleOrigin::SynthesizedDefault(DefaultSide::Cloud)),
    );
    false
}

/// Classifies one partition. Priorities of added rules are assigned
/// afterwards by [`assign_priorities`].
struct SecurityGroupMerge {
    window: PriorityWindow,
    /// Raw remote priority of every matched key
    anchors: HashMap<String, i32>,
    /// Keys matched against a synthesized provider default
    pinned: HashSet<String>,
}

impl MergePolicy<SecurityRule> for SecurityGroupMerge {
    fn matched(&mut self, mut local: SecurityRule, remote: SecurityRule) -> Matched<SecurityRule> {
        self.anchors.insert(remote.canonical_key(), remote.priority);
        if remote.origin.is_synthesized() {
            self.pinned.insert(remote.canonical_key());
        }
        local.external_id = remote.external_id;
        local.priority = if remote.origin.is_synthesized() {
            self.window.clamp(remote.priority)
        } else {
            remote.priority
        };
        Matched::Common(local)
    }

    fn removable(&self, remote: &SecurityRule) -> bool {
        !remote.origin.is_synthesized()
    }
}

/// Indices of a longest non-decreasing subsequence of `values`.
fn longest_ordered_run(values: &[i64]) -> Vec<usize> {
    // tails[n] ends the best run of length n + 1 found so far
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; values.len()];
    for (i, value) in values.iter().enumerate() {
        let len = tails.partition_point(|&t| values[t] <= *value);
        prev[i] = len.checked_sub(1).map(|l| tails[l]);
        if len == tails.len() {
            tails.push(i);
        } else {
            tails[len] = i;
        }
    }

    let mut run = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        run.push(i);
        cursor = prev[i];
    }
    run.reverse();
    run
}

/// Take matched rules that the remote evaluates in another order than the
/// local rules out of `common`.
///
/// The largest set of matched rules whose remote priorities already follow
/// the local order stays. Every other matched rule has its remote copy
/// removed and is added again, to be placed between the rules that stay.
/// Equal remote priorities never count as out of order.
fn displace_reordered(
    window: &PriorityWindow,
    walk_order: &[String],
    merged: &mut MergeOutcome<SecurityRule>,
    policy: &mut SecurityGroupMerge,
) {
    let mut positions: HashMap<&str, VecDeque<usize>> = HashMap::new();
    for (position, key) in walk_order.iter().enumerate() {
        positions.entry(key.as_str()).or_default().push_back(position);
    }

    // (local walk position, index into common)
    let mut matched: Vec<(usize, usize)> = Vec::new();
    for (index, rule) in merged.common.iter().enumerate() {
        let key = rule.canonical_key();
        if rule.origin.is_synthesized() || policy.pinned.contains(&key) {
            continue;
        }
        if let Some(position) = positions.get_mut(key.as_str()).and_then(|p| p.pop_front()) {
            matched.push((position, index));
        }
    }
    matched.sort_unstable();

    let ranks: Vec<i64> = matched
        .iter()
        .map(|&(_, index)| window.merge_rank(merged.common[index].priority))
        .collect();
    let in_order: HashSet<usize> = longest_ordered_run(&ranks)
        .into_iter()
        .map(|i| matched[i].1)
        .collect();
    if in_order.len() == matched.len() {
        return;
    }

    let displaced: HashSet<usize> = matched
        .iter()
        .map(|&(_, index)| index)
        .filter(|index| !in_order.contains(index))
        .collect();
    for (index, rule) in std::mem::take(&mut merged.common).into_iter().enumerate() {
        if !displaced.contains(&index) {
            merged.common.push(rule);
            continue;
        }
        tracing::debug!(rule = %rule, priority = rule.priority, "matched rule out of order");
        let mut readded = rule.clone();
        readded.external_id = None;
        merged.removed.push(rule);
        merged.added.push(readded);
    }

    let kept: HashSet<String> = merged.common.iter().map(|r| r.canonical_key()).collect();
    policy.anchors.retain(|key, _| kept.contains(key));
}

/// Walk the local rules from last-evaluated to first-evaluated and give each
/// added rule the slot just ahead of the closest matched rule behind it.
fn assign_priorities(
    window: &PriorityWindow,
    walk_order: &[String],
    anchors: &HashMap<String, i32>,
    remote_is_empty: bool,
    added: Vec<SecurityRule>,
) -> Vec<SecurityRule> {
    let mut pending: HashMap<String, Vec<SecurityRule>> = HashMap::new();
    for rule in added {
        pending.entry(rule.canonical_key()).or_default().push(rule);
    }

    let mut cursor = PriorityCursor::new(*window, remote_is_empty);
    let mut placed = Vec::new();
    for key in walk_order {
        if let Some(priority) = anchors.get(key) {
            cursor.reanchor(*priority);
            continue;
        }
        if let Some(rules) = pending.get_mut(key) {
            if !rules.is_empty() {
                let mut rule = rules.remove(0);
                rule.priority = cursor.next();
                placed.push(rule);
            }
        }
    }

    // duplicates of a matched key
    for key in walk_order {
        for mut rule in pending.remove(key).unwrap_or_default() {
            rule.priority = cursor.next();
            placed.push(rule);
        }
    }
    placed
}

type Partitions = BTreeMap<Option<Protocol>, (Vec<SecurityRule>, Vec<SecurityRule>)>;

fn partition(local: Vec<SecurityRule>, remote: Vec<SecurityRule>, by_protocol: bool) -> Partitions {
    let key = |rule: &SecurityRule| by_protocol.then_some(rule.protocol);
    let mut partitions = Partitions::new();
    for rule in local {
        partitions.entry(key(&rule)).or_default().0.push(rule);
    }
    for rule in remote {
        partitions.entry(key(&rule)).or_default().1.push(rule);
    }
    partitions
}

/// Reduce to effective allow rules, keeping synthesized defaults as they are.
fn to_allow_list(window: &PriorityWindow, rules: Vec<SecurityRule>) -> AllowListReduction {
    let (defaults, mut rules): (Vec<_>, Vec<_>) =
        rules.into_iter().partition(|r| r.origin.is_synthesized());
    window.sort_for_evaluation(&mut rules);
    let mut reduction = reduce_to_allow_list(rules);
    reduction
        .kept
        .extend(defaults.into_iter().filter(|r| r.is_allow()));
    reduction
}

fn compare_direction(
    window: &PriorityWindow,
    direction: Direction,
    mut local: Vec<SecurityRule>,
    mut remote: Vec<SecurityRule>,
    provider_default: &SecurityRule,
    only_allow_rules: bool,
    debug: bool,
) -> MergeOutcome<SecurityRule> {
    let defaults_equal = inject_default(window, direction, provider_default, &mut local, &mut remote);
    tracing::debug!(%direction, defaults_equal, "default rules compared");

    // Remote rules a deny cuts into cannot be kept as they are: the shadowed
    // allow and the deny go, and the surviving pieces the local side wants are
    // created as plain allow rules.
    let mut retired = Vec::new();
    if only_allow_rules {
        local = to_allow_list(window, local).effective();
        let reduced = to_allow_list(window, remote);
        retired = reduced.shadowing;
        retired.extend(reduced.shadowed);
        remote = reduced.kept;
    }

    let mut outcome = MergeOutcome::default();
    for (protocol, (mut local, mut remote)) in partition(local, remote, !only_allow_rules) {
        // Effective reachability has no order, so the allow-list walk is by key.
        if only_allow_rules {
            local.sort_by_cached_key(|r| r.canonical_key());
        } else {
            window.sort_for_merge(&mut local);
        }
        let walk_order: Vec<String> = local.iter().map(|r| r.canonical_key()).collect();
        let remote_is_empty = remote.is_empty();
        tracing::debug!(
            %direction,
            protocol = ?protocol,
            local = local.len(),
            remote = remote.len(),
            "comparing partition"
        );

        local.sort_by_cached_key(|r| r.canonical_key());
        remote.sort_by_cached_key(|r| r.canonical_key());
        let mut policy = SecurityGroupMerge {
            window: *window,
            anchors: HashMap::new(),
            pinned: HashSet::new(),
        };
        let mut merged = merge_sorted(local, remote, &mut policy, debug);
        if !only_allow_rules {
            displace_reordered(window, &walk_order, &mut merged, &mut policy);
        }
        merged.added = assign_priorities(
            window,
            &walk_order,
            &policy.anchors,
            remote_is_empty,
            merged.added,
        );
        outcome.append(merged);
    }

    for rule in retired {
        tracing::debug!(%direction, rule = %rule, "remote rule retired from allow-only group");
        outcome.removed.push(rule);
    }
    outcome
}

/// Diff local security-group rules against the provider's rules.
///
/// `default_in_rule` and `default_out_rule` are the trailing rules the
/// provider applies implicitly. With `only_allow_rules` both sides are
/// compared as effective allow-lists. Common rules carry the remote
/// `external_id` and priority; added rules get synthesized priorities inside
/// `window`.
pub fn compare_rules(
    window: &PriorityWindow,
    local_rules: Vec<SecurityRule>,
    remote_rules: Vec<SecurityRule>,
    default_in_rule: &SecurityRule,
    default_out_rule: &SecurityRule,
    only_allow_rules: bool,
    debug: bool,
) -> SecurityRuleDiff {
    let (local_in, local_out): (Vec<_>, Vec<_>) =
        local_rules.into_iter().partition(|r| r.direction == Direction::In);
    let (remote_in, remote_out): (Vec<_>, Vec<_>) =
        remote_rules.into_iter().partition(|r| r.direction == Direction::In);

    let inbound = compare_direction(
        window,
        Direction::In,
        local_in,
        remote_in,
        default_in_rule,
        only_allow_rules,
        debug,
    );
    let outbound = compare_direction(
        window,
        Direction::Out,
        local_out,
        remote_out,
        default_out_rule,
        only_allow_rules,
        debug,
    );

    let mut common = inbound.common;
    common.extend(outbound.common);
    SecurityRuleDiff {
        common,
        in_adds: inbound.added,
        out_adds: outbound.added,
        in_dels: inbound.removed,
        out_dels: outbound.removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::PriorityOrder;

    fn rule(line: &str, priority: i32) -> SecurityRule {
        SecurityRule::parse(line).unwrap().with_priority(priority)
    }

    fn remote(line: &str, priority: i32, id: &str) -> SecurityRule {
        rule(line, priority).with_external_id(id)
    }

    fn window() -> PriorityWindow {
        PriorityWindow::new(1, 100, PriorityOrder::Ascending)
    }

    fn default_in() -> SecurityRule {
        SecurityRule::parse("in:deny any").unwrap()
    }

    fn default_out() -> SecurityRule {
        SecurityRule::parse("out:allow any").unwrap()
    }

    fn keys(rules: &[SecurityRule]) -> Vec<String> {
        rules.iter().map(|r| r.canonical_key()).collect()
    }

    #[test]
    fn test_single_inbound_rule_added() {
        let local = vec![rule("in:allow 10.0.0.0/8 tcp 22", 1)];
        let diff = compare_rules(&window(), local, vec![], &default_in(), &default_out(), false, false);

        assert_eq!(keys(&diff.in_adds), vec!["in:allow 10.0.0.0/8 tcp 22"]);
        assert!(diff.in_dels.is_empty());
        assert!(diff.out_adds.is_empty());
        assert!(diff.out_dels.is_empty());
        assert!(diff.common.is_empty());
        assert!(window().contains(diff.in_adds[0].priority));
    }

    #[test]
    fn test_converged_group_is_idempotent() {
        let local = vec![rule("in:allow tcp 22", 10), rule("out:deny udp 53", 20)];
        let remote = vec![
            remote("in:allow tcp 22", 10, "r-1"),
            remote("out:deny udp 53", 20, "r-2"),
        ];
        let diff = compare_rules(&window(), local, remote, &default_in(), &default_out(), false, true);
        assert!(diff.is_converged());
        assert_eq!(diff.common.len(), 2);
        let ids: Vec<_> = diff.common.iter().filter_map(|r| r.external_id.clone()).collect();
        assert_eq!(ids, vec!["r-1", "r-2"]);
    }

    #[test]
    fn test_stale_remote_rule_removed() {
        let local = vec![rule("in:allow tcp 22", 10)];
        let remote = vec![
            remote("in:allow tcp 22", 10, "r-1"),
            remote("in:allow tcp 3389", 20, "r-2"),
        ];
        let diff = compare_rules(&window(), local, remote, &default_in(), &default_out(), false, false);
        assert_eq!(keys(&diff.in_dels), vec!["in:allow tcp 3389"]);
        assert_eq!(diff.in_dels[0].external_id.as_deref(), Some("r-2"));
        assert_eq!(diff.common.len(), 1);
    }

    #[test]
    fn test_partitions_by_protocol() {
        let local = vec![rule("in:allow tcp 22", 10), rule("in:allow udp 53", 10)];
        let remote = vec![remote("in:allow udp 53", 10, "r-1")];
        let diff = compare_rules(&window(), local, remote, &default_in(), &default_out(), false, false);
        assert_eq!(keys(&diff.in_adds), vec!["in:allow tcp 22"]);
        // the tcp partition has no remote rules, so insertion starts mid-window
        assert_eq!(diff.in_adds[0].priority, 49);
        assert_eq!(keys(&diff.common), vec!["in:allow udp 53"]);
    }

    #[test]
    fn test_added_rule_lands_before_anchor() {
        let local = vec![rule("in:allow tcp 80", 30), rule("in:allow tcp 22", 10)];
        let remote = vec![remote("in:allow tcp 80", 30, "r-1")];
        let diff = compare_rules(&window(), local, remote, &default_in(), &default_out(), false, false);
        assert_eq!(keys(&diff.in_adds), vec!["in:allow tcp 22"]);
        assert_eq!(diff.in_adds[0].priority, 29);
    }

    #[test]
    fn test_differing_default_is_reconciled() {
        // provider admits all inbound traffic by default; local wants deny
        let provider_in = SecurityRule::parse("in:allow any").unwrap();
        let diff = compare_rules(&window(), vec![], vec![], &provider_in, &default_out(), false, false);

        assert_eq!(keys(&diff.in_adds), vec!["in:deny any"]);
        assert_eq!(
            diff.in_adds[0].origin,
            RuleOrigin::SynthesizedDefault(DefaultSide::Local)
        );
        assert_eq!(diff.in_adds[0].priority, 100);
        // the provider's implicit rule cannot be deleted
        assert!(diff.in_dels.is_empty());
    }

    #[test]
    fn test_explicit_deny_matches_local_default() {
        let provider_in = SecurityRule::parse("in:allow any").unwrap();
        let remote = vec![remote("in:deny any", 100, "r-9")];
        let diff = compare_rules(&window(), vec![], remote, &provider_in, &default_out(), false, false);
        assert!(diff.is_converged());
        assert_eq!(diff.common.len(), 1);
        assert_eq!(diff.common[0].external_id.as_deref(), Some("r-9"));
    }

    #[test]
    fn test_only_allow_mode_compares_reachability() {
        let local = vec![rule("in:deny tcp 25", 1), rule("in:allow tcp 20-30", 2)];
        let remote = vec![
            remote("in:allow tcp 20-24", 50, "r-1"),
            remote("in:allow tcp 26-30", 50, "r-2"),
        ];
        let diff = compare_rules(&window(), local, remote, &default_in(), &default_out(), true, false);
        assert!(diff.is_converged());
        assert_eq!(diff.common.len(), 2);
    }

    #[test]
    fn test_only_allow_mode_ignores_order() {
        let local = vec![rule("in:allow tcp 443", 1), rule("in:allow tcp 80", 2)];
        let remote = vec![
            remote("in:allow tcp 80", 1, "r-1"),
            remote("in:allow tcp 443", 2, "r-2"),
        ];
        let diff = compare_rules(&window(), local, remote, &default_in(), &default_out(), true, false);
        assert!(diff.is_converged());
    }

    #[test]
    fn test_descending_window_priorities() {
        let w = PriorityWindow::new(1, 100, PriorityOrder::Descending);
        let local = vec![rule("in:allow tcp 22", 0), rule("in:allow tcp 80", 0)];
        let remote = vec![remote("in:allow tcp 9000", 40, "r-1")];
        let diff = compare_rules(&w, local, remote, &default_in(), &default_out(), false, false);
        assert_eq!(diff.in_adds.len(), 2);
        assert_eq!(diff.in_dels.len(), 1);
        for added in &diff.in_adds {
            assert!(w.contains(added.priority));
        }
    }

    #[test]
    fn test_partition_conservation() {
        let local = vec![
            rule("in:allow tcp 22", 1),
            rule("in:allow tcp 443", 2),
            rule("out:allow udp 123", 3),
        ];
        let remote = vec![
            remote("in:allow tcp 22", 1, "a"),
            remote("in:allow icmp", 2, "b"),
            remote("out:allow udp 123", 3, "c"),
        ];
        let diff = compare_rules(&window(), local, remote, &default_in(), &default_out(), false, false);
        let adds = diff.in_adds.len() + diff.out_adds.len();
        let dels = diff.in_dels.len() + diff.out_dels.len();
        assert_eq!(diff.common.len() + adds, 3);
        assert_eq!(diff.common.len() + dels, 3);
    }

    fn priorities_by_key(rules: &[SecurityRule]) -> HashMap<String, i32> {
        rules.iter().map(|r| (r.canonical_key(), r.priority)).collect()
    }

    #[test]
    fn test_swapped_allow_and_deny_are_reordered() {
        let local = vec![rule("in:deny tcp 22", 1), rule("in:allow 10.0.0.0/8 tcp 22", 2)];
        let remote = vec![
            remote("in:allow 10.0.0.0/8 tcp 22", 1, "a"),
            remote("in:deny tcp 22", 2, "b"),
        ];
        let diff = compare_rules(&window(), local.clone(), remote, &default_in(), &default_out(), false, false);
        assert!(!diff.is_converged());

        assert_eq!(keys(&diff.common), vec!["in:deny tcp 22"]);
        assert_eq!(diff.common[0].external_id.as_deref(), Some("b"));
        assert_eq!(keys(&diff.in_dels), vec!["in:allow 10.0.0.0/8 tcp 22"]);
        assert_eq!(diff.in_dels[0].external_id.as_deref(), Some("a"));
        assert_eq!(keys(&diff.in_adds), vec!["in:allow 10.0.0.0/8 tcp 22"]);
        assert!(diff.in_adds[0].external_id.is_none());
        // the allow now comes after the deny it used to precede
        assert!(diff.in_adds[0].priority > 2);

        // applied, the group converges
        let applied = vec![
            self::remote("in:deny tcp 22", 2, "b"),
            self::remote("in:allow 10.0.0.0/8 tcp 22", diff.in_adds[0].priority, "c"),
        ];
        let again = compare_rules(&window(), local, applied, &default_in(), &default_out(), false, false);
        assert!(again.is_converged());
    }

    #[test]
    fn test_equal_remote_priorities_are_not_reordered() {
        let local = vec![rule("in:deny tcp 22", 1), rule("in:allow tcp 80", 2)];
        let remote = vec![
            remote("in:allow tcp 80", 5, "a"),
            remote("in:deny tcp 22", 5, "b"),
        ];
        let diff = compare_rules(&window(), local, remote, &default_in(), &default_out(), false, false);
        assert!(diff.is_converged());
    }

    #[test]
    fn test_longest_ordered_run() {
        assert_eq!(longest_ordered_run(&[]), Vec::<usize>::new());
        assert_eq!(longest_ordered_run(&[3, 1, 2]), vec![1, 2]);
        assert_eq!(longest_ordered_run(&[1, 1, 0, 2]), vec![0, 1, 3]);
    }

    #[test]
    fn test_only_allow_retires_shadowing_deny() {
        let local = vec![rule("in:allow tcp 20-24", 1)];
        let remote = vec![
            remote("in:deny tcp 25", 1, "a"),
            remote("in:allow tcp 20-30", 2, "b"),
        ];
        let diff = compare_rules(&window(), local.clone(), remote, &default_in(), &default_out(), true, false);

        let retired: Vec<_> = diff
            .in_dels
            .iter()
            .map(|r| r.external_id.as_deref())
            .collect();
        assert_eq!(retired, vec![Some("a"), Some("b")]);
        assert_eq!(keys(&diff.in_adds), vec!["in:allow tcp 20-24"]);
        assert!(diff.common.is_empty());

        let applied = vec![self::remote("in:allow tcp 20-24", diff.in_adds[0].priority, "c")];
        let again = compare_rules(&window(), local, applied, &default_in(), &default_out(), true, false);
        assert!(again.is_converged());
    }

    #[test]
    fn test_only_allow_keeps_wanted_pieces_as_new_rules() {
        let local = vec![rule("in:allow tcp 20-24", 1), rule("in:allow tcp 26-30", 2)];
        let remote = vec![
            remote("in:deny tcp 25", 1, "a"),
            remote("in:allow tcp 20-30", 2, "b"),
            remote("in:deny udp 53", 3, "c"),
        ];
        let diff = compare_rules(&window(), local, remote, &default_in(), &default_out(), true, false);

        assert_eq!(keys(&diff.in_adds), vec!["in:allow tcp 20-24", "in:allow tcp 26-30"]);
        assert!(diff.in_adds.iter().all(|r| r.external_id.is_none()));
        // the udp deny cuts nothing and stays out of the diff
        let retired: Vec<_> = diff.in_dels.iter().filter_map(|r| r.external_id.clone()).collect();
        assert_eq!(retired, vec!["a", "b"]);
    }

    #[test]
    fn test_inserted_run_is_monotonic_ascending() {
        let mut local = vec![rule("in:allow tcp 1000", 10), rule("in:allow tcp 2000", 20)];
        local.extend((1..=5).map(|i| rule(&format!("in:allow tcp {}", 1000 + i), 10 + i)));
        let remote = vec![
            remote("in:allow tcp 1000", 10, "a"),
            remote("in:allow tcp 2000", 20, "b"),
        ];
        let diff = compare_rules(&window(), local, remote, &default_in(), &default_out(), false, false);
        assert_eq!(diff.common.len(), 2);

        let placed = priorities_by_key(&diff.in_adds);
        let run: Vec<i32> = (1..=5)
            .map(|i| placed[&format!("in:allow tcp {}", 1000 + i)])
            .collect();
        assert_eq!(run, vec![15, 16, 17, 18, 19]);
        assert!(run.windows(2).all(|w| w[0] < w[1]));
        assert!(run.iter().all(|p| (10..20).contains(p) && window().contains(*p)));
    }

    #[test]
    fn test_inserted_run_is_monotonic_descending() {
        let w = PriorityWindow::new(1, 100, PriorityOrder::Descending);
        let mut local = vec![rule("in:allow tcp 1000", 20), rule("in:allow tcp 2000", 10)];
        local.extend((1..=5).map(|i| rule(&format!("in:allow tcp {}", 1000 + i), 20 - i)));
        let remote = vec![
            remote("in:allow tcp 1000", 20, "a"),
            remote("in:allow tcp 2000", 10, "b"),
        ];
        let diff = compare_rules(&w, local, remote, &default_in(), &default_out(), false, false);
        assert_eq!(diff.common.len(), 2);

        let placed = priorities_by_key(&diff.in_adds);
        let run: Vec<i32> = (1..=5)
            .map(|i| placed[&format!("in:allow tcp {}", 1000 + i)])
            .collect();
        assert_eq!(run, vec![15, 14, 13, 12, 11]);
        assert!(run.windows(2).all(|pair| pair[0] > pair[1]));
        assert!(run.iter().all(|p| (11..20).contains(p) && w.contains(*p)));
    }

    #[test]
    fn test_inserted_run_piles_up_at_bound() {
        let local = vec![
            rule("in:allow tcp 1001", -3),
            rule("in:allow tcp 1002", -2),
            rule("in:allow tcp 1003", -1),
            rule("in:allow tcp 1000", 0),
        ];
        let remote = vec![remote("in:allow tcp 1000", 2, "a")];
        let diff = compare_rules(&window(), local, remote, &default_in(), &default_out(), false, false);

        let placed = priorities_by_key(&diff.in_adds);
        assert_eq!(placed["in:allow tcp 1003"], 1);
        assert_eq!(placed["in:allow tcp 1002"], 1);
        assert_eq!(placed["in:allow tcp 1001"], 1);
        assert_eq!(keys(&diff.common), vec!["in:allow tcp 1000"]);
    }
}
