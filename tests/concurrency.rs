mod common;

use common::{a_answer, dns_response, Switch};
use sdn_blacklist::{ConnectionId, Controller, EnforcementEngine, FlowRuleCompiler};
use std::{collections::HashSet, net::IpAddr, sync::Arc};
use tokio::task::JoinSet;

const SWITCHES: u64 = 16;
const ANSWERS: u8 = 64;

fn resolved(n: u8) -> String {
  format!("10.1.0.{}", n)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocks_and_connections_interleave_without_leaks() {
  let compiler = FlowRuleCompiler::default();
  let (handle, task) = Controller::new(EnforcementEngine::default()).spawn();
  handle
    .add_domain("bad.example.com".parse().unwrap())
    .await
    .unwrap();

  let switches: Vec<(ConnectionId, Arc<Switch>)> = (0..SWITCHES)
    .map(|n| (ConnectionId::new(n + 1), Switch::new()))
    .collect();

  let mut tasks = JoinSet::new();
  for (id, switch) in switches.iter().cloned() {
    let handle = handle.clone();
    tasks.spawn(async move { handle.connection_up(id, switch).await.unwrap() });
  }
  for n in 0..ANSWERS {
    let handle = handle.clone();
    let ingress = ConnectionId::new(u64::from(n) % SWITCHES + 1);
    tasks.spawn(async move {
      let frame = dns_response(
        "bad.example.com.",
        vec![a_answer("bad.example.com.", &resolved(n))],
      );
      handle.packet_in(ingress, frame).await.unwrap()
    });
  }
  while let Some(joined) = tasks.join_next().await {
    joined.unwrap();
  }

  let blocks = handle.blocks().await.unwrap();
  assert_eq!(blocks.len(), usize::from(ANSWERS));
  for block in &blocks {
    for (id, _) in &switches {
      assert!(block.is_installed_on(*id), "{} not installed on {}", block.ip(), id);
    }
  }

  let expected: HashSet<IpAddr> = (0..ANSWERS).map(|n| resolved(n).parse().unwrap()).collect();
  for (id, switch) in &switches {
    let rules = switch.take();
    let capture: Vec<_> = rules.iter().filter(|rule| !rule.is_drop()).collect();
    assert_eq!(capture, vec![&compiler.dns_capture_rule()], "switch {}", id);

    let drops: Vec<IpAddr> = rules.iter().filter_map(|rule| rule.destination()).collect();
    assert_eq!(drops.len(), usize::from(ANSWERS), "switch {}", id);
    assert_eq!(drops.into_iter().collect::<HashSet<_>>(), expected, "switch {}", id);
  }

  drop(handle);
  let engine = task.await.unwrap();
  assert_eq!(engine.connections().len(), SWITCHES as usize);
}
