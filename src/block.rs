use crate::{domain::Domain, registry::ConnectionId};
use std::{
  collections::{BTreeSet, HashMap},
  net::IpAddr,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

/// A (domain, ip) pairing that every live switch must drop traffic to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
  id: BlockId,
  domain: Domain,
  ip: IpAddr,
  installed_on: BTreeSet<ConnectionId>,
}

impl Block {
  pub fn id(&self) -> BlockId {
    self.id
  }

  pub fn domain(&self) -> &Domain {
    &self.domain
  }

  pub fn ip(&self) -> IpAddr {
    self.ip
  }

  pub fn installed_on(&self) -> &BTreeSet<ConnectionId> {
    &self.installed_on
  }

  pub fn is_installed_on(&self, connection: ConnectionId) -> bool {
    self.installed_on.contains(&connection)
  }
}

/// Blocks in creation order. Blocks are never removed.
#[derive(Default, Debug)]
pub struct BlockTable {
  blocks: Vec<Block>,
  index: HashMap<(Domain, IpAddr), BlockId>,
}

impl BlockTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the block for the pair and whether it was created by this call.
  pub fn record_block(&mut self, domain: Domain, ip: IpAddr) -> (&Block, bool) {
    let key = (domain, ip);
    if let Some(&id) = self.index.get(&key) {
      return (&self.blocks[id.0], false);
    }

    let id = BlockId(self.blocks.len());
    let (domain, ip) = key;
    self.blocks.push(Block {
      id,
      domain: domain.clone(),
      ip,
      installed_on: BTreeSet::new(),
    });
    self.index.insert((domain, ip), id);
    (&self.blocks[id.0], true)
  }

  pub fn get(&self, id: BlockId) -> Option<&Block> {
    self.blocks.get(id.0)
  }

  pub fn blocks(&self) -> &[Block] {
    &self.blocks
  }

  /// `(id, ip)` of every block at this instant.
  pub fn snapshot(&self) -> Vec<(BlockId, IpAddr)> {
    self.blocks.iter().map(|block| (block.id, block.ip)).collect()
  }

  pub fn mark_installed(&mut self, id: BlockId, connection: ConnectionId) {
    if let Some(block) = self.blocks.get_mut(id.0) {
      block.installed_on.insert(connection);
    }
  }

  pub fn mark_all_uninstalled(&mut self, connection: ConnectionId) {
    for block in self.blocks.iter_mut() {
      block.installed_on.remove(&connection);
    }
  }

  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }
}
