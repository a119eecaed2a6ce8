use hickory_server::proto::rr::{LowerName, Name};
use std::{collections::HashSet, fmt, str::FromStr};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
  #[error("empty domain name")]
  Empty,

  #[error("invalid domain name {name}: {reason}")]
  Invalid { name: String, reason: String },
}

/// A blacklisted domain, case-normalized and always fully qualified.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Domain(LowerName);

impl From<&Name> for Domain {
  fn from(name: &Name) -> Self {
    let mut name = name.clone();
    name.set_fqdn(true);
    Domain(LowerName::new(&name))
  }
}

impl FromStr for Domain {
  type Err = DomainError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let trimmed = s.trim().trim_end_matches('.');
    if trimmed.is_empty() {
      return Err(DomainError::Empty);
    }
    let fqdn = trimmed.to_string() + ".";
    let name = Name::from_str(&fqdn).map_err(|err| DomainError::Invalid {
      name: s.to_string(),
      reason: err.to_string(),
    })?;
    Ok(Domain(LowerName::new(&name)))
  }
}

impl fmt::Display for Domain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = self.0.to_string();
    f.write_str(name.trim_end_matches('.'))
  }
}

/// Set of domains subject to enforcement. Membership only grows.
#[derive(Default, Debug)]
pub struct DomainMatcher {
  domains: HashSet<Domain>,
}

impl DomainMatcher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns `true` when the domain was not already present.
  pub fn add(&mut self, domain: Domain) -> bool {
    let added = self.domains.insert(domain.clone());
    if added {
      debug!("Domain {} added to the blacklist", domain);
    }
    added
  }

  pub fn contains(&self, domain: &Domain) -> bool {
    self.domains.contains(domain)
  }

  pub fn len(&self) -> usize {
    self.domains.len()
  }

  pub fn is_empty(&self) -> bool {
    self.domains.is_empty()
  }

  /// Sorted by display name so listings are stable.
  pub fn domains(&self) -> Vec<Domain> {
    let mut domains: Vec<Domain> = self.domains.iter().cloned().collect();
    domains.sort_by_cached_key(|domain| domain.to_string());
    domains
  }
}
