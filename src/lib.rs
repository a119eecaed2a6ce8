//! Reactive DNS blacklist enforcement for an SDN controller.
//!
//! DNS answers seen in packet-in events that resolve a blacklisted domain
//! turn into drop rules installed on every connected switch.

pub mod api;
pub mod blacklist_file;
pub mod block;
pub mod controller;
pub mod domain;
pub mod engine;
pub mod flow;
pub mod registry;
pub mod snoop;

pub use crate::block::{Block, BlockId, BlockTable};
pub use crate::controller::{Controller, ControllerError, ControllerHandle, ForwardingHook};
pub use crate::domain::{Domain, DomainError, DomainMatcher};
pub use crate::engine::{EnforcementEngine, EngineConfig};
pub use crate::flow::{Action, FlowRuleCompiler, MatchField, OutputTarget, RuleDescriptor, RuleMatch};
pub use crate::registry::{ConnectionId, ConnectionRegistry, RuleSender, SendError};
pub use crate::snoop::{BlacklistedAnswer, DnsSnoop, SnoopError};
