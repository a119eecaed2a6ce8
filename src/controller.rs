//! Serial event dispatch for the enforcement engine.
//!
//! One task owns the [`EnforcementEngine`] and handles commands in arrival
//! order, so a new block and a new connection can never interleave. Every
//! other component talks to it through a cloneable [`ControllerHandle`].

use crate::{
  block::Block,
  domain::Domain,
  engine::EnforcementEngine,
  registry::{ConnectionId, RuleSender},
};
use std::sync::Arc;
use thiserror::Error;
use tokio::{
  sync::{mpsc, oneshot},
  task::JoinHandle,
};
use tracing::info;

pub const DEFAULT_QUEUE_SIZE: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
  #[error("controller has stopped")]
  Closed,
}

/// Downstream packet-in stage, run after DNS inspection for every packet.
pub trait ForwardingHook: Send {
  fn packet_in(&mut self, connection: ConnectionId, frame: &[u8]);
}

enum Command {
  ConnectionUp {
    id: ConnectionId,
    sender: Arc<dyn RuleSender>,
  },
  ConnectionDown {
    id: ConnectionId,
  },
  PacketIn {
    id: ConnectionId,
    frame: Vec<u8>,
  },
  AddDomain {
    domain: Domain,
    reply: oneshot::Sender<bool>,
  },
  Domains(oneshot::Sender<Vec<Domain>>),
  Blocks(oneshot::Sender<Vec<Block>>),
  Connections(oneshot::Sender<Vec<ConnectionId>>),
}

#[derive(Clone, Debug)]
pub struct ControllerHandle {
  sender: mpsc::Sender<Command>,
}

impl ControllerHandle {
  pub async fn connection_up(
    &self,
    id: ConnectionId,
    sender: Arc<dyn RuleSender>,
  ) -> Result<(), ControllerError> {
    self.send(Command::ConnectionUp { id, sender }).await
  }

  pub async fn connection_down(&self, id: ConnectionId) -> Result<(), ControllerError> {
    self.send(Command::ConnectionDown { id }).await
  }

  pub async fn packet_in(&self, id: ConnectionId, frame: Vec<u8>) -> Result<(), ControllerError> {
    self.send(Command::PacketIn { id, frame }).await
  }

  /// Returns `true` when the domain was not blacklisted yet.
  pub async fn add_domain(&self, domain: Domain) -> Result<bool, ControllerError> {
    self
      .request(|reply| Command::AddDomain { domain, reply })
      .await
  }

  pub async fn domains(&self) -> Result<Vec<Domain>, ControllerError> {
    self.request(Command::Domains).await
  }

  pub async fn blocks(&self) -> Result<Vec<Block>, ControllerError> {
    self.request(Command::Blocks).await
  }

  pub async fn connections(&self) -> Result<Vec<ConnectionId>, ControllerError> {
    self.request(Command::Connections).await
  }

  async fn send(&self, command: Command) -> Result<(), ControllerError> {
    self
      .sender
      .send(command)
      .await
      .map_err(|_| ControllerError::Closed)
  }

  async fn request<T>(
    &self,
    command: impl FnOnce(oneshot::Sender<T>) -> Command,
  ) -> Result<T, ControllerError> {
    let (reply, response) = oneshot::channel();
    self.send(command(reply)).await?;
    response.await.map_err(|_| ControllerError::Closed)
  }
}

pub struct Controller {
  engine: EnforcementEngine,
  forwarding: Vec<Box<dyn ForwardingHook>>,
  queue_size: usize,
}

impl Controller {
  pub fn new(engine: EnforcementEngine) -> Self {
    Self {
      engine,
      forwarding: Vec::new(),
      queue_size: DEFAULT_QUEUE_SIZE,
    }
  }

  pub fn with_forwarding(mut self, hook: impl ForwardingHook + 'static) -> Self {
    self.forwarding.push(Box::new(hook));
    self
  }

  pub fn with_queue_size(mut self, queue_size: usize) -> Self {
    self.queue_size = queue_size.max(1);
    self
  }

  /// Starts the controller task. It stops once every handle is dropped and
  /// hands the engine back.
  pub fn spawn(self) -> (ControllerHandle, JoinHandle<EnforcementEngine>) {
    let (sender, receiver) = mpsc::channel(self.queue_size);
    let task = tokio::spawn(self.run(receiver));
    (ControllerHandle { sender }, task)
  }

  async fn run(mut self, mut receiver: mpsc::Receiver<Command>) -> EnforcementEngine {
    info!("Blacklist controller started");
    while let Some(command) = receiver.recv().await {
      self.handle(command);
    }
    info!("Blacklist controller stopped");
    self.engine
  }

  fn handle(&mut self, command: Command) {
    match command {
      Command::ConnectionUp { id, sender } => self.engine.connection_up(id, sender),
      Command::ConnectionDown { id } => self.engine.connection_down(id),
      Command::PacketIn { id, frame } => {
        self.engine.packet_in(id, &frame);
        for hook in self.forwarding.iter_mut() {
          hook.packet_in(id, &frame);
        }
      }
      Command::AddDomain { domain, reply } => {
        let _ = reply.send(self.engine.add_banned_domain(domain));
      }
      Command::Domains(reply) => {
        let _ = reply.send(self.engine.banned_domains());
      }
      Command::Blocks(reply) => {
        let _ = reply.send(self.engine.blocks().to_vec());
      }
      Command::Connections(reply) => {
        let _ = reply.send(self.engine.connections());
      }
    }
  }
}
