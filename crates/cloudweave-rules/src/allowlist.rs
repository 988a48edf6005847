//! Effective allow-list conversion
//!
//! Providers that only accept allow rules cannot express a deny that shadows
//! part of a later allow. Both sides of an only-allow comparison are therefore
//! reduced to the traffic they actually admit: every deny is subtracted from the
//! allow rules evaluated after it, then dropped.
//!
//! A rule covers a region `protocol × cidr × port interval`. Subtraction splits
//! the surviving part of a region along each of those three dimensions.

use crate::secrule::{PORT_MAX, PORT_MIN, PortSpec, Protocol, SecurityRule, normalize_cidr};
use crate::traits::Comparable;
use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr};

const FULL_PORTS: (u16, u16) = (PORT_MIN, PORT_MAX);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    protocol: Protocol,
    /// `None` is the whole IPv4 space
    cidr: Option<IpNetwork>,
    ports: (u16, u16),
}

impl Region {
    fn of(rule: &SecurityRule) -> Vec<Region> {
        let intervals = if rule.protocol.supports_ports() {
            rule.ports.intervals()
        } else {
            vec![FULL_PORTS]
        };
        intervals
            .into_iter()
            .map(|ports| Region {
                protocol: rule.protocol,
                cidr: rule.cidr,
                ports,
            })
            .collect()
    }

    fn overlaps(&self, other: &Region) -> bool {
        protocols_overlap(self.protocol, other.protocol)
            && cidrs_overlap(self.cidr, other.cidr)
            && self.ports.0 <= other.ports.1
            && other.ports.0 <= self.ports.1
    }

    /// Parts of `self` not covered by `deny`.
    fn subtract(&self, deny: &Region) -> Vec<Region> {
        if !self.overlaps(deny) {
            return vec![*self];
        }

        let mut pieces = Vec::new();

        // Protocol: `any` minus a concrete protocol leaves the other ones.
        let mut inner = *self;
        if self.protocol == Protocol::Any && deny.protocol != Protocol::Any {
            for protocol in Protocol::CONCRETE {
                if protocol != deny.protocol {
                    pieces.push(Region {
                        protocol,
                        ports: FULL_PORTS,
                        ..*self
                    });
                }
            }
            inner.protocol = deny.protocol;
        }

        // CIDR: keep the parts of our prefix outside the denied prefix.
        if let Some(denied) = deny.cidr {
            if !contains(Some(denied), inner.cidr) {
                for rest in subtract_prefix(inner.cidr, denied) {
                    pieces.push(Region {
                        cidr: normalize_cidr(rest),
                        ..inner
                    });
                }
                inner.cidr = Some(denied);
            }
        }

        // Ports: only meaningful for tcp/udp.
        if inner.protocol.supports_ports() {
            let denied = if deny.protocol.supports_ports() {
                deny.ports
            } else {
                FULL_PORTS
            };
            if inner.ports.0 < denied.0 {
                pieces.push(Region {
                    ports: (inner.ports.0, denied.0 - 1),
                    ..inner
                });
            }
            if inner.ports.1 > denied.1 {
                pieces.push(Region {
                    ports: (denied.1 + 1, inner.ports.1),
                    ..inner
                });
            }
        }

        pieces
    }

    fn into_rule(self, template: &SecurityRule) -> SecurityRule {
        let ports = if self.protocol.supports_ports() {
            PortSpec::range(self.ports.0, self.ports.1)
        } else {
            PortSpec::All
        };
        SecurityRule {
            protocol: self.protocol,
            cidr: self.cidr,
            ports,
            ..template.clone()
        }
    }
}

fn protocols_overlap(a: Protocol, b: Protocol) -> bool {
    a == Protocol::Any || b == Protocol::Any || a == b
}

/// Whether `outer` contains every address of `inner`. `None` is the IPv4 space.
fn contains(outer: Option<IpNetwork>, inner: Option<IpNetwork>) -> bool {
    match (outer, inner) {
        (None, None) => true,
        (None, Some(inner)) => inner.is_ipv4(),
        (Some(_), None) => false,
        (Some(outer), Some(inner)) => {
            outer.is_ipv4() == inner.is_ipv4()
                && outer.prefix() <= inner.prefix()
                && outer.contains(inner.network())
        }
    }
}

fn cidrs_overlap(a: Option<IpNetwork>, b: Option<IpNetwork>) -> bool {
    contains(a, b) || contains(b, a)
}

/// Split `outer` around `inner` (which it strictly contains) into the sibling
/// prefixes that together cover `outer - inner`.
fn subtract_prefix(outer: Option<IpNetwork>, inner: IpNetwork) -> Vec<IpNetwork> {
    let outer_len = outer.map(|o| o.prefix()).unwrap_or(0);
    match inner {
        IpNetwork::V4(i) => sibling_prefixes(outer_len, u32::from(i.network()) as u128, i.prefix(), 32)
            .into_iter()
            .filter_map(|(addr, len)| Ipv4Network::new(Ipv4Addr::from(addr as u32), len).ok())
            .map(IpNetwork::V4)
            .collect(),
        IpNetwork::V6(i) => sibling_prefixes(outer_len, u128::from(i.network()), i.prefix(), 128)
            .into_iter()
            .filter_map(|(addr, len)| Ipv6Network::new(Ipv6Addr::from(addr), len).ok())
            .map(IpNetwork::V6)
            .collect(),
    }
}

fn sibling_prefixes(outer_len: u8, inner_addr: u128, inner_len: u8, width: u8) -> Vec<(u128, u8)> {
    ((outer_len + 1)..=inner_len)
        .map(|len| {
            let base = inner_addr & prefix_mask(len, width);
            (base ^ (1u128 << (width - len)), len)
        })
        .collect()
}

fn prefix_mask(len: u8, width: u8) -> u128 {
    if len == 0 {
        return 0;
    }
    let all = if width == 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    };
    let host = (1u128 << (width - len)) - 1;
    all & !host
}

/// Rules of one direction reduced to the allow rules they enforce
#[derive(Debug, Default)]
pub struct AllowListReduction {
    /// Allow rules no earlier deny touches, as given
    pub kept: Vec<SecurityRule>,
    /// What survives of the shadowed allow rules. A piece keeps the external
    /// id of the rule it was cut from.
    pub pieces: Vec<SecurityRule>,
    /// Allow rules cut by an earlier deny
    pub shadowed: Vec<SecurityRule>,
    /// Deny rules that cut at least one later allow
    pub shadowing: Vec<SecurityRule>,
}

impl AllowListReduction {
    /// Kept rules and pieces. Duplicates are removed, first occurrence wins.
    pub fn effective(self) -> Vec<SecurityRule> {
        let mut allowed = self.kept;
        allowed.extend(self.pieces);
        let mut seen = HashSet::new();
        allowed.retain(|rule| seen.insert(rule.canonical_key()));
        allowed
    }
}

/// Reduce rules of one direction, given in evaluation order, to the allow
/// rules they effectively enforce, remembering which rules were involved.
pub fn reduce_to_allow_list(rules: Vec<SecurityRule>) -> AllowListReduction {
    let mut denies: Vec<(SecurityRule, bool)> = Vec::new();
    let mut denied: Vec<(Region, usize)> = Vec::new();
    let mut reduction = AllowListReduction::default();

    for rule in rules {
        let regions = Region::of(&rule);
        if !rule.is_allow() {
            denied.extend(regions.into_iter().map(|region| (region, denies.len())));
            denies.push((rule, false));
            continue;
        }

        let mut shadowed = false;
        for (deny, index) in &denied {
            if regions.iter().any(|region| region.overlaps(deny)) {
                denies[*index].1 = true;
                shadowed = true;
            }
        }
        if !shadowed {
            reduction.kept.push(rule);
            continue;
        }

        let mut surviving = regions;
        for (deny, _) in &denied {
            surviving = surviving.iter().flat_map(|r| r.subtract(deny)).collect();
        }
        tracing::trace!(rule = %rule, pieces = surviving.len(), "allow rule shadowed by deny");
        reduction
            .pieces
            .extend(surviving.into_iter().map(|region| region.into_rule(&rule)));
        reduction.shadowed.push(rule);
    }

    reduction.shadowing = denies
        .into_iter()
        .filter_map(|(rule, cut)| cut.then_some(rule))
        .collect();
    reduction
}

/// Reduce rules of one direction, given in evaluation order, to the allow
/// rules they effectively enforce.
///
/// Allow rules untouched by any earlier deny are kept as they are. Shadowed
/// allow rules are replaced by the pieces that survive. Deny rules are dropped.
/// Duplicate results are removed, first occurrence wins.
pub fn effective_allow_list(rules: Vec<SecurityRule>) -> Vec<SecurityRule> {
    reduce_to_allow_list(rules).effective()
}
