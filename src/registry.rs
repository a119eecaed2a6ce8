use crate::{
  block::BlockTable,
  flow::{FlowRuleCompiler, RuleDescriptor},
};
use std::{collections::HashMap, fmt, sync::Arc};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Identifier the switch-control transport assigns to a switch session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
  pub const fn new(id: u64) -> Self {
    Self(id)
  }
}

impl fmt::Display for ConnectionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:016x}", self.0)
  }
}

#[derive(Debug, Error)]
#[error("rule could not be handed to the transport: {0}")]
pub struct SendError(pub String);

/// Outbound half of a switch connection.
///
/// `send` hands the rule over and returns; it must not wait for the switch.
pub trait RuleSender: Send + Sync {
  fn send(&self, rule: RuleDescriptor) -> Result<(), SendError>;
}

impl RuleSender for UnboundedSender<RuleDescriptor> {
  fn send(&self, rule: RuleDescriptor) -> Result<(), SendError> {
    UnboundedSender::send(self, rule).map_err(|_| SendError("connection channel closed".into()))
  }
}

/// Live switch connections.
#[derive(Default)]
pub struct ConnectionRegistry {
  live: HashMap<ConnectionId, Arc<dyn RuleSender>>,
}

impl fmt::Debug for ConnectionRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ConnectionRegistry")
      .field("live", &self.connections())
      .finish()
  }
}

impl ConnectionRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers the connection, then replays every current block followed by
  /// the DNS capture rule.
  pub fn on_connection_up(
    &mut self,
    id: ConnectionId,
    sender: Arc<dyn RuleSender>,
    table: &mut BlockTable,
    compiler: &FlowRuleCompiler,
  ) {
    if self.live.insert(id, sender.clone()).is_some() {
      warn!("Connection {} was already live, replaying its rules", id);
      table.mark_all_uninstalled(id);
    }
    info!("Connection {} up, replaying {} blocks", id, table.len());

    for (block, ip) in table.snapshot() {
      if deliver(id, sender.as_ref(), compiler.drop_rule(ip)) {
        table.mark_installed(block, id);
      }
    }

    info!("Installing dns response capturing flow on {}", id);
    deliver(id, sender.as_ref(), compiler.dns_capture_rule());
  }

  /// Returns `false` when the connection was not registered.
  pub fn on_connection_down(&mut self, id: ConnectionId, table: &mut BlockTable) -> bool {
    if self.live.remove(&id).is_none() {
      warn!("Connection down for unknown connection {}", id);
      return false;
    }
    table.mark_all_uninstalled(id);
    info!("Connection {} down", id);
    true
  }

  /// Sends the rule to every live connection and returns those that took it.
  pub fn broadcast(&self, rule: &RuleDescriptor) -> Vec<ConnectionId> {
    let mut reached = Vec::with_capacity(self.live.len());
    for (id, sender) in &self.live {
      if deliver(*id, sender.as_ref(), rule.clone()) {
        reached.push(*id);
      }
    }
    reached
  }

  pub fn is_live(&self, id: ConnectionId) -> bool {
    self.live.contains_key(&id)
  }

  pub fn connections(&self) -> Vec<ConnectionId> {
    let mut ids: Vec<ConnectionId> = self.live.keys().copied().collect();
    ids.sort();
    ids
  }

  pub fn len(&self) -> usize {
    self.live.len()
  }

  pub fn is_empty(&self) -> bool {
    self.live.is_empty()
  }
}

fn deliver(id: ConnectionId, sender: &dyn RuleSender, rule: RuleDescriptor) -> bool {
  debug!("Sending {} to {}", rule, id);
  match sender.send(rule) {
    Ok(()) => true,
    Err(err) => {
      warn!("Cannot send rule to connection {}: {}", id, err);
      false
    }
  }
}
