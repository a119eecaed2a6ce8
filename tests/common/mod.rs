#![allow(dead_code)]

use hickory_server::proto::{
  op::{Message, MessageType, OpCode, Query},
  rr::{
    rdata::{A, CNAME},
    Name, RData, Record, RecordType,
  },
  serialize::binary::BinEncodable,
};
use pnet::packet::{
  ethernet::{EtherTypes, MutableEthernetPacket},
  ip::IpNextHeaderProtocols,
  ipv4::MutableIpv4Packet,
  udp::MutableUdpPacket,
};
use sdn_blacklist::{RuleDescriptor, RuleSender, SendError};
use std::{
  net::Ipv4Addr,
  str::FromStr,
  sync::{Arc, Mutex},
};

/// Records every rule handed to it.
#[derive(Default)]
pub struct Switch {
  rules: Mutex<Vec<RuleDescriptor>>,
}

impl Switch {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn take(&self) -> Vec<RuleDescriptor> {
    std::mem::take(&mut *self.rules.lock().unwrap())
  }
}

impl RuleSender for Switch {
  fn send(&self, rule: RuleDescriptor) -> Result<(), SendError> {
    self.rules.lock().unwrap().push(rule);
    Ok(())
  }
}

pub fn a_answer(name: &str, ip: &str) -> Record {
  Record::from_rdata(
    Name::from_str(name).unwrap(),
    300,
    RData::A(A(ip.parse().unwrap())),
  )
}

pub fn cname_answer(name: &str, target: &str) -> Record {
  Record::from_rdata(
    Name::from_str(name).unwrap(),
    300,
    RData::CNAME(CNAME(Name::from_str(target).unwrap())),
  )
}

/// Ethernet/IPv4/UDP frame from a DNS server carrying a response.
pub fn dns_response(query: &str, answers: Vec<Record>) -> Vec<u8> {
  let mut message = Message::new();
  message
    .set_id(0xbeef)
    .set_message_type(MessageType::Response)
    .set_op_code(OpCode::Query)
    .set_recursion_desired(true)
    .set_recursion_available(true);
  message.add_query(Query::query(Name::from_str(query).unwrap(), RecordType::A));
  for answer in answers {
    message.add_answer(answer);
  }
  udp_frame(53, 51000, &message.to_bytes().unwrap())
}

pub fn udp_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
  let udp_length = 8 + payload.len();
  let ip_length = 20 + udp_length;
  let mut buf = vec![0u8; 14 + ip_length];

  let mut ethernet = MutableEthernetPacket::new(&mut buf).unwrap();
  ethernet.set_ethertype(EtherTypes::Ipv4);

  let mut ip = MutableIpv4Packet::new(&mut buf[14..]).unwrap();
  ip.set_version(4);
  ip.set_header_length(5);
  ip.set_total_length(ip_length as u16);
  ip.set_ttl(64);
  ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
  ip.set_source(Ipv4Addr::new(1, 1, 1, 1));
  ip.set_destination(Ipv4Addr::new(10, 0, 0, 2));

  let mut udp = MutableUdpPacket::new(&mut buf[34..]).unwrap();
  udp.set_source(src_port);
  udp.set_destination(dst_port);
  udp.set_length(udp_length as u16);
  udp.set_payload(payload);

  buf
}
