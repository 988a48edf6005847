//! Security-group rule model
//!
//! A rule is serialized into a single canonical string that doubles as its
//! identity key:
//!
//! ```text
//! in:allow 10.0.0.0/8 tcp 22
//! in:deny any
//! out:allow udp 53,123
//! ```
//!
//! `direction:action`, an optional CIDR (omitted for "anywhere"), the protocol,
//! and an optional port specification (omitted for "all ports").

use crate::error::{Result, RuleError};
use crate::traits::{Comparable, Identifiable, Prioritized};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lowest and highest port a rule may name
pub const PORT_MIN: u16 = 1;
pub const PORT_MAX: u16 = 65535;

/// Traffic direction of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

impl FromStr for Direction {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" | "ingress" => Ok(Direction::In),
            "out" | "egress" => Ok(Direction::Out),
            other => Err(RuleError::InvalidDirection(other.to_string())),
        }
    }
}

/// What a matching rule does with the traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Deny,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Allow => write!(f, "allow"),
            RuleAction::Deny => write!(f, "deny"),
        }
    }
}

impl FromStr for RuleAction {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" | "accept" => Ok(RuleAction::Allow),
            "deny" | "drop" => Ok(RuleAction::Deny),
            other => Err(RuleError::InvalidAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Any,
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    /// Protocols that carry port numbers
    pub fn supports_ports(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }

    /// Every concrete protocol covered by `Any`
    pub const CONCRETE: [Protocol; 3] = [Protocol::Tcp, Protocol::Udp, Protocol::Icmp];
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Any => write!(f, "any"),
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Icmp => write!(f, "icmp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "any" | "all" => Ok(Protocol::Any),
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "icmp" => Ok(Protocol::Icmp),
            other => Err(RuleError::InvalidProtocol(other.to_string())),
        }
    }
}

/// Ports matched by a rule. Serialized in its text form (`22`, `80-443`,
/// `53,123`, empty for all ports).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PortSpec {
    #[default]
    All,
    Range(u16, u16),
    List(Vec<u16>),
}

impl PortSpec {
    /// Build a normalized inclusive range. `1-65535` collapses to `All`.
    pub fn range(start: u16, end: u16) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        if start <= PORT_MIN && end == PORT_MAX {
            PortSpec::All
        } else {
            PortSpec::Range(start, end)
        }
    }

    /// Build a normalized port list (sorted, deduplicated).
    pub fn list(mut ports: Vec<u16>) -> Self {
        ports.sort_unstable();
        ports.dedup();
        match ports.as_slice() {
            [] => PortSpec::All,
            [single] => PortSpec::Range(*single, *single),
            _ => PortSpec::List(ports),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, PortSpec::All)
    }

    /// Inclusive intervals covered by this specification
    pub fn intervals(&self) -> Vec<(u16, u16)> {
        match self {
            PortSpec::All => vec![(PORT_MIN, PORT_MAX)],
            PortSpec::Range(start, end) => vec![(*start, *end)],
            PortSpec::List(ports) => ports.iter().map(|p| (*p, *p)).collect(),
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::All => Ok(()),
            PortSpec::Range(start, end) if start == end => write!(f, "{}", start),
            PortSpec::Range(start, end) => write!(f, "{}-{}", start, end),
            PortSpec::List(ports) => {
                let joined: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", joined.join(","))
            }
        }
    }
}

impl FromStr for PortSpec {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(PortSpec::All);
        }
        let parse_port = |p: &str| {
            p.trim()
                .parse::<u16>()
                .map_err(|_| RuleError::InvalidPorts(s.to_string()))
        };
        if s.contains(',') {
            let ports = s.split(',').map(parse_port).collect::<Result<Vec<_>>>()?;
            return Ok(PortSpec::list(ports));
        }
        if let Some((start, end)) = s.split_once('-') {
            return Ok(PortSpec::range(parse_port(start)?, parse_port(end)?));
        }
        let port = parse_port(s)?;
        Ok(PortSpec::Range(port, port))
    }
}

impl TryFrom<String> for PortSpec {
    type Error = RuleError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PortSpec> for String {
    fn from(ports: PortSpec) -> String {
        ports.to_string()
    }
}

/// Which side synthesized a default rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultSide {
    /// The provider's implicit trailing rule
    Cloud,
    /// The local model's implicit trailing rule
    Local,
}

/// Where a rule came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOrigin {
    #[default]
    UserDefined,
    SynthesizedDefault(DefaultSide),
}

impl RuleOrigin {
    pub fn is_synthesized(&self) -> bool {
        matches!(self, RuleOrigin::SynthesizedDefault(_))
    }
}

/// A single security-group rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub direction: Direction,
    pub action: RuleAction,
    pub protocol: Protocol,

    /// `None` matches any address
    #[serde(default)]
    pub cidr: Option<IpNetwork>,

    #[serde(default)]
    pub ports: PortSpec,

    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub external_id: Option<String>,

    #[serde(default)]
    pub origin: RuleOrigin,
}

impl SecurityRule {
    pub fn new(direction: Direction, action: RuleAction, protocol: Protocol) -> Self {
        Self {
            direction,
            action,
            protocol,
            cidr: None,
            ports: PortSpec::All,
            priority: 0,
            description: String::new(),
            id: None,
            external_id: None,
            origin: RuleOrigin::UserDefined,
        }
    }

    /// Parse the canonical rule format, e.g. `in:allow 10.0.0.0/8 tcp 22`.
    pub fn parse(rule: &str) -> Result<Self> {
        let invalid = |reason: &str| RuleError::InvalidRule {
            rule: rule.to_string(),
            reason: reason.to_string(),
        };

        let (direction, body) = rule
            .trim()
            .split_once(':')
            .ok_or_else(|| invalid("missing ':' after direction"))?;
        let direction: Direction = direction.parse()?;

        let mut tokens = body.split_whitespace().peekable();
        let action: RuleAction = tokens
            .next()
            .ok_or_else(|| invalid("missing action"))?
            .parse()?;

        let mut cidr = None;
        let leading_cidr = tokens.peek().and_then(|t| t.parse::<IpNetwork>().ok());
        if let Some(net) = leading_cidr {
            cidr = normalize_cidr(net);
            tokens.next();
        }

        let protocol = match tokens.next() {
            Some(token) => token.parse()?,
            None => Protocol::Any,
        };

        let ports = match tokens.next() {
            Some(token) => token.parse()?,
            None => PortSpec::All,
        };

        if tokens.next().is_some() {
            return Err(invalid("unexpected trailing tokens"));
        }

        let parsed = Self {
            cidr,
            ports,
            ..Self::new(direction, action, protocol)
        };
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject port ranges on protocols without ports.
    pub fn validate(&self) -> Result<()> {
        if !self.ports.is_all() && !self.protocol.supports_ports() {
            return Err(RuleError::InvalidRule {
                rule: self.to_string(),
                reason: "ports are only valid with tcp or udp".to_string(),
            });
        }
        Ok(())
    }

    pub fn with_cidr(mut self, cidr: IpNetwork) -> Self {
        self.cidr = normalize_cidr(cidr);
        self
    }

    pub fn with_ports(mut self, ports: PortSpec) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_origin(mut self, origin: RuleOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Fold the CIDR the way `parse` does, for rules deserialized field by
    /// field.
    pub fn normalized(mut self) -> Self {
        self.cidr = self.cidr.and_then(normalize_cidr);
        self
    }

    pub fn is_allow(&self) -> bool {
        self.action == RuleAction::Allow
    }
}

/// Clear host bits and fold the IPv4 "anywhere" network into `None`.
pub fn normalize_cidr(net: IpNetwork) -> Option<IpNetwork> {
    let net = IpNetwork::new(net.network(), net.prefix()).unwrap_or(net);
    match net {
        IpNetwork::V4(v4) if v4.prefix() == 0 => None,
        _ => Some(net),
    }
}

impl fmt::Display for SecurityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.direction, self.action)?;
        if let Some(cidr) = &self.cidr {
            write!(f, " {}", cidr)?;
        }
        write!(f, " {}", self.protocol)?;
        if !self.ports.is_all() {
            write!(f, " {}", self.ports)?;
        }
        Ok(())
    }
}

impl FromStr for SecurityRule {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        SecurityRule::parse(s)
    }
}

impl Comparable for SecurityRule {
    fn canonical_key(&self) -> String {
        self.to_string()
    }
}

impl Identifiable for SecurityRule {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    fn set_external_id(&mut self, external_id: Option<String>) {
        self.external_id = external_id;
    }
}

impl Prioritized for SecurityRule {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }
}
