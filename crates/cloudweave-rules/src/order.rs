//! Priority ordering policy
//!
//! Providers disagree on which end of the priority range wins. A
//! [`PriorityWindow`] captures one provider's `[min, max]` range together with
//! its [`PriorityOrder`], and every priority computation goes through it.

use crate::error::{Result, RuleError};
use crate::traits::{Comparable, Prioritized};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which end of the priority range is evaluated first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityOrder {
    /// Lower number is evaluated first
    #[default]
    Ascending,
    /// Higher number is evaluated first
    Descending,
}

impl fmt::Display for PriorityOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityOrder::Ascending => write!(f, "ascending"),
            PriorityOrder::Descending => write!(f, "descending"),
        }
    }
}

impl FromStr for PriorityOrder {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(PriorityOrder::Ascending),
            "desc" | "descending" => Ok(PriorityOrder::Descending),
            other => Err(RuleError::InvalidOrder(other.to_string())),
        }
    }
}

/// A provider's priority range and ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityWindow {
    pub min: i32,
    pub max: i32,
    #[serde(default)]
    pub order: PriorityOrder,
}

impl PriorityWindow {
    /// Bounds given in either order are stored as `min <= max`.
    pub fn new(min: i32, max: i32, order: PriorityOrder) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self { min, max, order }
    }

    /// Numeric direction from lower to higher precedence.
    pub fn step_sign(&self) -> i32 {
        match self.order {
            PriorityOrder::Ascending => -1,
            PriorityOrder::Descending => 1,
        }
    }

    pub fn clamp(&self, priority: i32) -> i32 {
        priority.clamp(self.min, self.max)
    }

    pub fn contains(&self, priority: i32) -> bool {
        (self.min..=self.max).contains(&priority)
    }

    /// Move `step` slots toward higher precedence, saturating at the bounds.
    pub fn adjust_priority(&self, current: i32, step: i32) -> i32 {
        self.clamp(current.saturating_add(step.saturating_mul(self.step_sign())))
    }

    pub fn midpoint(&self) -> i32 {
        self.min + (self.max - self.min) / 2
    }

    /// The bound evaluated last
    pub fn lowest_precedence_bound(&self) -> i32 {
        match self.order {
            PriorityOrder::Ascending => self.max,
            PriorityOrder::Descending => self.min,
        }
    }

    /// The bound evaluated first
    pub fn highest_precedence_bound(&self) -> i32 {
        match self.order {
            PriorityOrder::Ascending => self.min,
            PriorityOrder::Descending => self.max,
        }
    }

    /// One slot past the lowest-precedence bound, outside the window.
    ///
    /// Synthesized default rules live here so they are evaluated after every
    /// real rule.
    pub fn beyond_lowest(&self) -> i32 {
        self.lowest_precedence_bound().saturating_sub(self.step_sign())
    }

    fn evaluation_rank(&self, priority: i32) -> i64 {
        -(i64::from(priority) * i64::from(self.step_sign()))
    }

    /// Compare in evaluation order; equal priorities fall back to the
    /// canonical key, ascending.
    pub fn evaluation_cmp<T>(&self, a: &T, b: &T) -> std::cmp::Ordering
    where
        T: Prioritized + Comparable,
    {
        self.evaluation_rank(a.priority())
            .cmp(&self.evaluation_rank(b.priority()))
            .then_with(|| a.canonical_key().cmp(&b.canonical_key()))
    }

    /// Sort first-evaluated first.
    pub fn sort_for_evaluation<T>(&self, rules: &mut [T])
    where
        T: Prioritized + Comparable,
    {
        rules.sort_by_cached_key(|r| (self.evaluation_rank(r.priority()), r.canonical_key()));
    }

    /// Sort last-evaluated first, the traversal order of the security-group
    /// merge. Ties keep ascending canonical keys.
    pub fn sort_for_merge<T>(&self, rules: &mut [T])
    where
        T: Prioritized + Comparable,
    {
        rules.sort_by_cached_key(|r| (self.merge_rank(r.priority()), r.canonical_key()));
    }

    /// Position of `priority` in merge order: larger is evaluated earlier.
    pub fn merge_rank(&self, priority: i32) -> i64 {
        -self.evaluation_rank(priority)
    }
}

/// `anchor` moved `step` slots toward higher precedence inside `[min, max]`.
pub fn next_priority(anchor: i32, order: PriorityOrder, step: i32, min: i32, max: i32) -> i32 {
    PriorityWindow::new(min, max, order).adjust_priority(anchor, step)
}

/// Hands out priorities for rules inserted between matched anchors.
///
/// Each insertion after an anchor lands one slot further toward higher
/// precedence. Exhausting the window piles the remaining rules on the bound.
#[derive(Debug, Clone)]
pub struct PriorityCursor {
    window: PriorityWindow,
    anchor: i32,
    inc: i32,
}

impl PriorityCursor {
    /// Start a partition. An empty remote partition has nothing to anchor
    /// on, so insertions start from the middle of the window.
    pub fn new(window: PriorityWindow, remote_is_empty: bool) -> Self {
        let anchor = if remote_is_empty {
            window.midpoint()
        } else {
            window.beyond_lowest()
        };
        Self {
            window,
            anchor,
            inc: 0,
        }
    }

    pub fn anchor(&self) -> i32 {
        self.anchor
    }

    pub fn reanchor(&mut self, priority: i32) {
        self.anchor = priority;
        self.inc = 0;
    }

    pub fn next(&mut self) -> i32 {
        self.inc += 1;
        self.window.adjust_priority(self.anchor, self.inc)
    }
}
