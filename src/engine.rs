use crate::{
  block::{Block, BlockTable},
  domain::{Domain, DomainMatcher},
  flow::{FlowRuleCompiler, DNS_CAPTURE_PRIORITY, DNS_SERVER_PORT, DROP_PRIORITY},
  registry::{ConnectionId, ConnectionRegistry, RuleSender},
  snoop::DnsSnoop,
};
use std::{net::IpAddr, sync::Arc};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
  pub dns_port: u16,
  pub capture_priority: u16,
  pub drop_priority: u16,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      dns_port: DNS_SERVER_PORT,
      capture_priority: DNS_CAPTURE_PRIORITY,
      drop_priority: DROP_PRIORITY,
    }
  }
}

/// Owns the blacklist state and drives rule installation on every switch.
///
/// All operations take `&mut self` and run to completion, sends included.
/// Callers must deliver events one at a time, see [`crate::controller`].
#[derive(Debug)]
pub struct EnforcementEngine {
  matcher: DomainMatcher,
  table: BlockTable,
  registry: ConnectionRegistry,
  compiler: FlowRuleCompiler,
  snoop: DnsSnoop,
}

impl Default for EnforcementEngine {
  fn default() -> Self {
    Self::new(EngineConfig::default())
  }
}

impl EnforcementEngine {
  pub fn new(config: EngineConfig) -> Self {
    Self {
      matcher: DomainMatcher::new(),
      table: BlockTable::new(),
      registry: ConnectionRegistry::new(),
      compiler: FlowRuleCompiler::new(
        config.dns_port,
        config.capture_priority,
        config.drop_priority,
      ),
      snoop: DnsSnoop::new(config.dns_port),
    }
  }

  /// Has no effect on traffic until a DNS answer for the domain is seen.
  pub fn add_banned_domain(&mut self, domain: Domain) -> bool {
    let added = self.matcher.add(domain.clone());
    if added {
      info!("Domain {} will be blocked on its next resolution", domain);
    }
    added
  }

  /// Returns `true` when a new block was created and broadcast.
  pub fn block_domain(&mut self, domain: Domain, ip: IpAddr) -> bool {
    let (block, is_new) = self.table.record_block(domain, ip);
    if !is_new {
      debug!("Ip {} of {} is already blocked", ip, block.domain());
      return false;
    }
    info!("Blocking ip {} of blacklisted domain {}", ip, block.domain());
    let id = block.id();

    let rule = self.compiler.drop_rule(ip);
    for connection in self.registry.broadcast(&rule) {
      self.table.mark_installed(id, connection);
    }
    true
  }

  /// Runs DNS inspection on a packet-in frame. Returns the number of new blocks.
  pub fn packet_in(&mut self, connection: ConnectionId, frame: &[u8]) -> usize {
    let hits = self.snoop.inspect(frame, &self.matcher);
    if !hits.is_empty() {
      debug!("{} blacklisted answers seen on {}", hits.len(), connection);
    }
    let mut created = 0;
    for hit in hits {
      if self.block_domain(hit.domain, IpAddr::V4(hit.ip)) {
        created += 1;
      }
    }
    created
  }

  pub fn connection_up(&mut self, id: ConnectionId, sender: Arc<dyn RuleSender>) {
    self
      .registry
      .on_connection_up(id, sender, &mut self.table, &self.compiler);
  }

  pub fn connection_down(&mut self, id: ConnectionId) {
    self.registry.on_connection_down(id, &mut self.table);
  }

  pub fn is_banned(&self, domain: &Domain) -> bool {
    self.matcher.contains(domain)
  }

  pub fn banned_domains(&self) -> Vec<Domain> {
    self.matcher.domains()
  }

  pub fn blocks(&self) -> &[Block] {
    self.table.blocks()
  }

  pub fn connections(&self) -> Vec<ConnectionId> {
    self.registry.connections()
  }

  pub fn compiler(&self) -> &FlowRuleCompiler {
    &self.compiler
  }
}
