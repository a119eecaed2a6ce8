use crate::{
  controller::{ControllerError, ControllerHandle},
  domain::Domain,
};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::{path::PathBuf, time::Duration};
use tokio::{fs::read_to_string, time::sleep};
use tracing::{debug, error, info, warn};

/// Parses blacklist file content: any number of names per line, `#` starts a
/// comment. Invalid names are skipped.
pub fn parse_blacklist(content: &str) -> Result<Vec<Domain>> {
  let regex = Regex::new("#.*$")?;
  let mut domains = Vec::new();
  let lines = content
    .split('\n')
    .map(|line| regex.replace_all(line, "").trim().to_string())
    .filter(|line| !line.is_empty());

  for line in lines {
    for name in line.split_whitespace() {
      match name.parse::<Domain>() {
        Ok(domain) => {
          debug!("Add {}", domain);
          domains.push(domain);
        }
        Err(err) => warn!("Ignoring {}: {}", name, err),
      }
    }
  }

  Ok(domains)
}

pub async fn read_blacklist_file(blacklist_file: &PathBuf) -> Result<Vec<Domain>> {
  let content = read_to_string(blacklist_file)
    .await
    .with_context(|| anyhow!("Cannot read blacklist file {}", blacklist_file.display()))?;
  parse_blacklist(&content)
}

/// Adds every domain of the file through the controller. Returns how many
/// were new.
pub async fn load_blacklist_file(
  blacklist_file: &PathBuf,
  handle: &ControllerHandle,
) -> Result<usize> {
  let mut added = 0;
  for domain in read_blacklist_file(blacklist_file).await? {
    if handle.add_domain(domain).await? {
      added += 1;
    }
  }
  Ok(added)
}

/// Re-reads the file forever. Lines removed from the file are not unbanned.
/// Returns once the controller has stopped.
pub async fn watch_blacklist_file(
  blacklist_file: PathBuf,
  interval: Duration,
  handle: ControllerHandle,
) {
  info!("Blacklist file {:?}", blacklist_file);
  loop {
    match load_blacklist_file(&blacklist_file, &handle).await {
      Ok(0) => debug!("No new domain in {}", blacklist_file.display()),
      Ok(added) => info!("{} domains added from {}", added, blacklist_file.display()),
      Err(err) if err.downcast_ref::<ControllerError>().is_some() => return,
      Err(err) => error!("Cannot update blacklist: {:#}", err),
    }
    sleep(interval).await;
  }
}
