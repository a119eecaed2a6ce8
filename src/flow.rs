//! Switch-level flow rule descriptors.
//!
//! The transport translates a [`RuleDescriptor`] into its own wire message
//! (an OpenFlow `flow_mod` for instance). Nothing here talks to a switch.

use std::{
  fmt,
  net::{IpAddr, Ipv4Addr, Ipv6Addr},
};

pub const ETHER_TYPE_IPV4: u16 = 0x0800;
pub const ETHER_TYPE_IPV6: u16 = 0x86dd;
pub const IP_PROTOCOL_UDP: u8 = 17;

pub const DNS_SERVER_PORT: u16 = 53;
/// Above the default forwarding flows, below any higher policy a deployment adds.
pub const DNS_CAPTURE_PRIORITY: u16 = 99;
pub const DROP_PRIORITY: u16 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchField {
  TransportSource(u16),
  Ipv4Destination(Ipv4Addr),
  Ipv6Destination(Ipv6Addr),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleMatch {
  pub ether_type: Option<u16>,
  pub ip_protocol: Option<u8>,
  pub fields: Vec<MatchField>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputTarget {
  Controller,
  Port(u16),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
  Drop,
  Output(OutputTarget),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleDescriptor {
  pub matches: RuleMatch,
  pub priority: u16,
  pub actions: Vec<Action>,
}

impl RuleDescriptor {
  pub fn is_drop(&self) -> bool {
    self.actions == [Action::Drop]
  }

  /// Destination address a drop rule matches on.
  pub fn destination(&self) -> Option<IpAddr> {
    self.matches.fields.iter().find_map(|field| match field {
      MatchField::Ipv4Destination(ip) => Some(IpAddr::V4(*ip)),
      MatchField::Ipv6Destination(ip) => Some(IpAddr::V6(*ip)),
      MatchField::TransportSource(_) => None,
    })
  }
}

impl fmt::Display for RuleDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "priority={}", self.priority)?;
    if let Some(ether_type) = self.matches.ether_type {
      write!(f, " dl_type={:#06x}", ether_type)?;
    }
    if let Some(proto) = self.matches.ip_protocol {
      write!(f, " nw_proto={}", proto)?;
    }
    for field in &self.matches.fields {
      match field {
        MatchField::TransportSource(port) => write!(f, " tp_src={}", port)?,
        MatchField::Ipv4Destination(ip) => write!(f, " nw_dst={}", ip)?,
        MatchField::Ipv6Destination(ip) => write!(f, " ipv6_dst={}", ip)?,
      }
    }
    let actions: Vec<String> = self
      .actions
      .iter()
      .map(|action| match action {
        Action::Drop => "drop".to_string(),
        Action::Output(OutputTarget::Controller) => "output:CONTROLLER".to_string(),
        Action::Output(OutputTarget::Port(port)) => format!("output:{}", port),
      })
      .collect();
    write!(f, " actions={}", actions.join(","))
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowRuleCompiler {
  dns_port: u16,
  capture_priority: u16,
  drop_priority: u16,
}

impl Default for FlowRuleCompiler {
  fn default() -> Self {
    Self::new(DNS_SERVER_PORT, DNS_CAPTURE_PRIORITY, DROP_PRIORITY)
  }
}

impl FlowRuleCompiler {
  pub fn new(dns_port: u16, capture_priority: u16, drop_priority: u16) -> Self {
    Self {
      dns_port,
      capture_priority,
      drop_priority,
    }
  }

  /// Sends every IPv4/UDP packet coming from a DNS server to the controller.
  pub fn dns_capture_rule(&self) -> RuleDescriptor {
    RuleDescriptor {
      matches: RuleMatch {
        ether_type: Some(ETHER_TYPE_IPV4),
        ip_protocol: Some(IP_PROTOCOL_UDP),
        fields: vec![MatchField::TransportSource(self.dns_port)],
      },
      priority: self.capture_priority,
      actions: vec![Action::Output(OutputTarget::Controller)],
    }
  }

  pub fn drop_rule(&self, ip: IpAddr) -> RuleDescriptor {
    let (ether_type, field) = match ip {
      IpAddr::V4(ip) => (ETHER_TYPE_IPV4, MatchField::Ipv4Destination(ip)),
      IpAddr::V6(ip) => (ETHER_TYPE_IPV6, MatchField::Ipv6Destination(ip)),
    };
    RuleDescriptor {
      matches: RuleMatch {
        ether_type: Some(ether_type),
        ip_protocol: None,
        fields: vec![field],
      },
      priority: self.drop_priority,
      actions: vec![Action::Drop],
    }
  }
}
