use anyhow::{Context, Result};
use clap::{builder::RangedU64ValueParser, CommandFactory, Parser};
use clap_complete::Shell;
use sdn_blacklist::{
  api::create_router,
  blacklist_file::{load_blacklist_file, watch_blacklist_file},
  Controller, ControllerHandle, EnforcementEngine, EngineConfig,
};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use tokio::{net::TcpListener, runtime, time::sleep};
use tokio_graceful::{Shutdown, ShutdownGuard};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sdn-blacklist", author, version, about)]
pub struct BlacklistController {
  /// Address of the management HTTP endpoint
  #[arg(long = "http-addr", env = "SDN_BLACKLIST_HTTP_ADDR", default_value = "127.0.0.1:8000")]
  http_addr: SocketAddr,
  /// File with the domains to blacklist at startup
  #[arg(long = "blacklist-file", env = "SDN_BLACKLIST_FILE")]
  blacklist_file: Option<PathBuf>,
  /// Seconds between two reads of the blacklist file
  #[arg(long = "reload-interval", env = "SDN_BLACKLIST_RELOAD_INTERVAL", default_value = "300")]
  reload_interval: u64,
  /// UDP port DNS responses are captured from
  #[arg(
    long = "dns-port",
    env = "SDN_BLACKLIST_DNS_PORT",
    default_value = "53",
    value_parser = clap::value_parser!(u16).range(1..)
  )]
  dns_port: u16,
  /// Priority of the rule sending DNS responses to the controller
  #[arg(long = "capture-priority", env = "SDN_BLACKLIST_CAPTURE_PRIORITY", default_value = "99")]
  capture_priority: u16,
  /// Priority of the rules dropping traffic to blocked addresses
  #[arg(long = "drop-priority", env = "SDN_BLACKLIST_DROP_PRIORITY", default_value = "100")]
  drop_priority: u16,
  /// Number of pending controller events before callers wait
  #[arg(
    long = "queue-size",
    env = "SDN_BLACKLIST_QUEUE_SIZE",
    default_value = "1024",
    value_parser = RangedU64ValueParser::<usize>::new().range(1..)
  )]
  queue_size: usize,
  /// Number of runtime worker threads
  #[arg(
    long = "workers",
    env = "SDN_BLACKLIST_WORKERS",
    default_value = "4",
    value_parser = RangedU64ValueParser::<usize>::new().range(1..)
  )]
  worker: usize,
  /// Print shell completions and exit
  #[arg(long = "completions", value_enum)]
  completions: Option<Shell>,
}

impl BlacklistController {
  fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      dns_port: self.dns_port,
      capture_priority: self.capture_priority,
      drop_priority: self.drop_priority,
    }
  }
}

fn main() -> Result<()> {
  let args = BlacklistController::parse();

  if let Some(shell) = args.completions {
    let mut command = BlacklistController::command();
    clap_complete::generate(shell, &mut command, "sdn-blacklist", &mut std::io::stdout());
    return Ok(());
  }

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let runtime = runtime::Builder::new_multi_thread()
    .enable_all()
    .worker_threads(args.worker)
    .thread_name("sdn-blacklist-runtime")
    .build()
    .context("failed to initialize Tokio Runtime")?;

  runtime.block_on(run(args))
}

async fn run(args: BlacklistController) -> Result<()> {
  let engine = EnforcementEngine::new(args.engine_config());
  let (handle, _controller) = Controller::new(engine)
    .with_queue_size(args.queue_size)
    .spawn();

  if let Some(blacklist_file) = &args.blacklist_file {
    let added = load_blacklist_file(blacklist_file, &handle).await?;
    info!("{} domains loaded from {}", added, blacklist_file.display());
  }

  let listener = TcpListener::bind(args.http_addr)
    .await
    .with_context(|| format!("could not bind to {}", args.http_addr))?;
  info!("Management endpoint listening on {}", args.http_addr);

  let shutdown = Shutdown::default();

  let router = create_router(handle.clone());
  shutdown.spawn_task_fn(move |guard| async move {
    let server = axum::serve(listener, router)
      .with_graceful_shutdown(async move { guard.cancelled().await });
    if let Err(err) = server.await {
      warn!("Management endpoint stopped: {}", err);
    }
  });

  if let Some(blacklist_file) = args.blacklist_file {
    let interval = Duration::from_secs(args.reload_interval.max(1));
    let reload_handle = handle.clone();
    shutdown.spawn_task_fn(move |guard| async move {
      watch_until_shutdown(blacklist_file, interval, reload_handle, guard).await
    });
  }
  drop(handle);

  match shutdown.shutdown_with_limit(Duration::from_secs(10)).await {
    Ok(elapsed) => info!("Shutdown after {}s", elapsed.as_secs_f64()),
    Err(err) => warn!("Shutdown did not complete: {}", err),
  }
  Ok(())
}

async fn watch_until_shutdown(
  blacklist_file: PathBuf,
  interval: Duration,
  handle: ControllerHandle,
  guard: ShutdownGuard,
) {
  tokio::select! {
    _ = guard.cancelled() => {}
    _ = async {
      sleep(interval).await;
      watch_blacklist_file(blacklist_file, interval, handle).await
    } => {}
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn parse(args: &[&str]) -> Result<BlacklistController, clap::Error> {
    BlacklistController::try_parse_from(std::iter::once("sdn-blacklist").chain(args.iter().copied()))
  }

  #[test]
  fn defaults() {
    let args = parse(&[]).unwrap();
    assert_eq!(args.engine_config(), EngineConfig::default());
    assert_eq!(args.worker, 4);
    assert_eq!(args.queue_size, 1024);
    assert!(args.blacklist_file.is_none());
  }

  #[test]
  fn zero_workers_is_rejected() {
    assert!(parse(&["--workers", "0"]).is_err());
    assert_eq!(parse(&["--workers", "1"]).unwrap().worker, 1);
  }

  #[test]
  fn zero_queue_size_and_dns_port_are_rejected() {
    assert!(parse(&["--queue-size", "0"]).is_err());
    assert!(parse(&["--dns-port", "0"]).is_err());
  }

  #[test]
  fn engine_config_from_arguments() {
    let args = parse(&["--dns-port", "5353", "--capture-priority", "7", "--drop-priority", "8"]).unwrap();
    assert_eq!(
      args.engine_config(),
      EngineConfig {
        dns_port: 5353,
        capture_priority: 7,
        drop_priority: 8,
      }
    );
  }

  #[test]
  fn command_is_consistent() {
    BlacklistController::command().debug_assert();
  }
}
