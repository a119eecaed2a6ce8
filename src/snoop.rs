use crate::{
  domain::{Domain, DomainMatcher},
  flow::DNS_SERVER_PORT,
};
use hickory_server::proto::{
  error::ProtoError,
  op::Message,
  rr::{RData, RecordType},
};
use pnet::packet::{
  ethernet::{EtherType, EtherTypes, EthernetPacket},
  ip::{IpNextHeaderProtocol, IpNextHeaderProtocols},
  ipv4::Ipv4Packet,
  ipv6::Ipv6Packet,
  udp::UdpPacket,
  vlan::VlanPacket,
  Packet,
};
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::debug;

const MAX_VLAN_TAGS: usize = 2;

#[derive(Debug, Error)]
pub enum SnoopError {
  #[error("truncated {0} header")]
  Truncated(&'static str),

  #[error("too many VLAN tags")]
  TooManyVlanTags,

  #[error("undecodable DNS payload: {0}")]
  Dns(#[from] ProtoError),
}

/// An A answer whose name is on the blacklist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlacklistedAnswer {
  pub domain: Domain,
  pub ip: Ipv4Addr,
}

/// Looks into packet-in frames for DNS answers naming a blacklisted domain.
#[derive(Clone, Copy, Debug)]
pub struct DnsSnoop {
  dns_port: u16,
}

impl Default for DnsSnoop {
  fn default() -> Self {
    Self::new(DNS_SERVER_PORT)
  }
}

impl DnsSnoop {
  pub fn new(dns_port: u16) -> Self {
    Self { dns_port }
  }

  /// Never fails: packets that do not decode are treated as non-DNS.
  pub fn inspect(&self, frame: &[u8], matcher: &DomainMatcher) -> Vec<BlacklistedAnswer> {
    let message = match self.dns_message(frame) {
      Ok(Some(message)) => message,
      Ok(None) => return Vec::new(),
      Err(err) => {
        debug!("Skipping DNS inspection: {}", err);
        return Vec::new();
      }
    };

    blacklisted_answers(&message, matcher)
  }

  /// Decodes the DNS message carried by an Ethernet frame. `Ok(None)` means
  /// the frame is not UDP to or from the DNS port.
  pub fn dns_message(&self, frame: &[u8]) -> Result<Option<Message>, SnoopError> {
    let ethernet = EthernetPacket::new(frame).ok_or(SnoopError::Truncated("ethernet"))?;
    let (ether_type, payload) = strip_vlan_tags(ethernet.get_ethertype(), ethernet.payload())?;

    match ether_type {
      EtherTypes::Ipv4 => {
        let ip = Ipv4Packet::new(payload).ok_or(SnoopError::Truncated("ipv4"))?;
        self.decode_udp(ip.get_next_level_protocol(), ip.payload())
      }
      EtherTypes::Ipv6 => {
        let ip = Ipv6Packet::new(payload).ok_or(SnoopError::Truncated("ipv6"))?;
        self.decode_udp(ip.get_next_header(), ip.payload())
      }
      _ => Ok(None),
    }
  }

  fn decode_udp(
    &self,
    protocol: IpNextHeaderProtocol,
    segment: &[u8],
  ) -> Result<Option<Message>, SnoopError> {
    if protocol != IpNextHeaderProtocols::Udp {
      return Ok(None);
    }
    let udp = UdpPacket::new(segment).ok_or(SnoopError::Truncated("udp"))?;
    if udp.get_source() != self.dns_port && udp.get_destination() != self.dns_port {
      return Ok(None);
    }
    let data = udp.payload();
    let length = (udp.get_length() as usize).saturating_sub(8).min(data.len());

    Ok(Some(Message::from_vec(&data[..length])?))
  }
}

/// A records of the answer section naming a blacklisted domain, in message
/// order. Class and query are not checked.
fn blacklisted_answers(message: &Message, matcher: &DomainMatcher) -> Vec<BlacklistedAnswer> {
  message
    .answers()
    .iter()
    .filter(|record| record.record_type() == RecordType::A)
    .filter_map(|record| match record.data() {
      Some(RData::A(a)) => Some(BlacklistedAnswer {
        domain: Domain::from(record.name()),
        ip: a.0,
      }),
      _ => None,
    })
    .filter(|answer| matcher.contains(&answer.domain))
    .collect()
}

fn strip_vlan_tags(
  mut ether_type: EtherType,
  mut payload: &[u8],
) -> Result<(EtherType, &[u8]), SnoopError> {
  let mut tags = 0;
  while ether_type == EtherTypes::Vlan {
    if tags == MAX_VLAN_TAGS {
      return Err(SnoopError::TooManyVlanTags);
    }
    let vlan = VlanPacket::new(payload).ok_or(SnoopError::Truncated("vlan"))?;
    ether_type = vlan.get_ethertype();
    // VlanPacket borrows `payload`; re-slice past its fixed 4 byte header.
    payload = &payload[VlanPacket::minimum_packet_size()..];
    tags += 1;
  }
  Ok((ether_type, payload))
}
