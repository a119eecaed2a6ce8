//! Management HTTP endpoints.

use crate::{
  block::Block,
  controller::{ControllerError, ControllerHandle},
  domain::{Domain, DomainError},
};
use axum::{
  extract::State,
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::get,
  Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  InvalidDomain(#[from] DomainError),

  #[error(transparent)]
  Unavailable(#[from] ControllerError),
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
  pub error: String,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match self {
      ApiError::InvalidDomain(_) => StatusCode::BAD_REQUEST,
      ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = ErrorBody {
      error: self.to_string(),
    };
    (status, Json(body)).into_response()
  }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Health {
  pub status: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainRequest {
  pub domain: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainAdded {
  pub domain: String,
  pub added: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockView {
  pub domain: String,
  pub ip: IpAddr,
  pub installed_on: Vec<String>,
}

impl From<&Block> for BlockView {
  fn from(block: &Block) -> Self {
    Self {
      domain: block.domain().to_string(),
      ip: block.ip(),
      installed_on: block.installed_on().iter().map(|id| id.to_string()).collect(),
    }
  }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlacklistView {
  pub domains: Vec<String>,
  pub blocks: Vec<BlockView>,
}

pub fn create_router(handle: ControllerHandle) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/blacklist", get(get_blacklist).post(add_domain))
    .route("/blacklist/blocks", get(get_blocks))
    .with_state(handle)
}

pub async fn health() -> Json<Health> {
  Json(Health {
    status: "ok".to_string(),
  })
}

pub async fn get_blacklist(
  State(handle): State<ControllerHandle>,
) -> Result<Json<BlacklistView>, ApiError> {
  let domains = handle.domains().await?;
  let blocks = handle.blocks().await?;
  Ok(Json(BlacklistView {
    domains: domains.iter().map(Domain::to_string).collect(),
    blocks: blocks.iter().map(BlockView::from).collect(),
  }))
}

pub async fn get_blocks(
  State(handle): State<ControllerHandle>,
) -> Result<Json<Vec<BlockView>>, ApiError> {
  let blocks = handle.blocks().await?;
  Ok(Json(blocks.iter().map(BlockView::from).collect()))
}

pub async fn add_domain(
  State(handle): State<ControllerHandle>,
  Json(request): Json<DomainRequest>,
) -> Result<(StatusCode, Json<DomainAdded>), ApiError> {
  let domain: Domain = request.domain.parse()?;
  let added = handle.add_domain(domain.clone()).await?;
  if added {
    info!("Domain {} blacklisted through the management API", domain);
  }
  let status = if added {
    StatusCode::CREATED
  } else {
    StatusCode::OK
  };
  Ok((
    status,
    Json(DomainAdded {
      domain: domain.to_string(),
      added,
    }),
  ))
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    controller::Controller, engine::EnforcementEngine, flow::RuleDescriptor, registry::ConnectionId,
  };
  use std::sync::Arc;
  use tokio::sync::mpsc::unbounded_channel;

  fn request(domain: &str) -> Json<DomainRequest> {
    Json(DomainRequest {
      domain: domain.to_string(),
    })
  }

  #[tokio::test]
  async fn health_is_ok() {
    assert_eq!(health().await.0.status, "ok");
  }

  #[tokio::test]
  async fn post_adds_domain_once() {
    let (handle, _task) = Controller::new(EnforcementEngine::default()).spawn();

    let (status, Json(body)) = add_domain(State(handle.clone()), request("Bad.Example.com"))
      .await
      .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
      body,
      DomainAdded {
        domain: "bad.example.com".to_string(),
        added: true
      }
    );

    let (status, Json(body)) = add_domain(State(handle.clone()), request("bad.example.com."))
      .await
      .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(!body.added);
  }

  #[tokio::test]
  async fn post_rejects_invalid_domain() {
    let (handle, _task) = Controller::new(EnforcementEngine::default()).spawn();

    let err = add_domain(State(handle.clone()), request("   ")).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidDomain(DomainError::Empty)));
    assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    assert!(handle.domains().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn get_lists_domains_and_blocks() {
    let (handle, _task) = Controller::new(EnforcementEngine::default()).spawn();
    let (tx, _rx) = unbounded_channel::<RuleDescriptor>();
    handle.connection_up(ConnectionId::new(1), Arc::new(tx)).await.unwrap();
    handle.add_domain("bad.example.com".parse().unwrap()).await.unwrap();

    let Json(view) = get_blacklist(State(handle.clone())).await.unwrap();
    assert_eq!(view.domains, vec!["bad.example.com"]);
    assert!(view.blocks.is_empty());

    let Json(blocks) = get_blocks(State(handle)).await.unwrap();
    assert!(blocks.is_empty());
  }

  #[test]
  fn block_view_lists_connections() {
    let mut table = crate::block::BlockTable::new();
    let id = table
      .record_block("bad.example.com".parse().unwrap(), "10.0.0.5".parse().unwrap())
      .0
      .id();
    table.mark_installed(id, ConnectionId::new(1));

    let view = BlockView::from(&table.blocks()[0]);
    assert_eq!(view.domain, "bad.example.com");
    assert_eq!(view.ip, "10.0.0.5".parse::<IpAddr>().unwrap());
    assert_eq!(view.installed_on, vec!["0000000000000001"]);
  }

  #[tokio::test]
  async fn stopped_controller_is_unavailable() {
    let (handle, task) = Controller::new(EnforcementEngine::default()).spawn();
    task.abort();
    let _ = task.await;

    let err = get_blocks(State(handle)).await.unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
  }
}
