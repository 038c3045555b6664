//! HTTP/JSON gateway over the running connectors
//!
//! Read endpoints serve the latest [`ServiceSnapshot`] of a connector; command
//! endpoints translate into outbound request messages, gated on the features
//! the service advertised.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use playcast_core::{ConnectorHandle, Feature, Message, ServiceSnapshot, Word, format_duration};

/// Gateway errors, each mapped to an HTTP status
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("unknown connector: {0}")]
    UnknownConnector(String),

    #[error("connector {connector} has not reported {field}")]
    NotReported {
        connector: String,
        field: &'static str,
    },

    #[error("connector {connector} does not support {feature}")]
    Unsupported { connector: String, feature: Feature },

    #[error("connector {0} is closed")]
    Closed(String),
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            GatewayError::UnknownConnector(_) | GatewayError::NotReported { .. } => {
                StatusCode::NOT_FOUND
            }
            GatewayError::Unsupported { .. } => StatusCode::CONFLICT,
            GatewayError::Closed(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Shared view of every connector handle
#[derive(Debug, Clone)]
pub struct Gateway {
    connectors: Arc<[ConnectorHandle]>,
}

impl Gateway {
    /// Create a gateway over the given handles
    pub fn new(connectors: Vec<ConnectorHandle>) -> Self {
        Self {
            connectors: connectors.into(),
        }
    }

    fn find(&self, name: &str) -> Result<&ConnectorHandle, GatewayError> {
        self.connectors
            .iter()
            .find(|handle| handle.name() == name)
            .ok_or_else(|| GatewayError::UnknownConnector(name.to_string()))
    }

    /// Send a request to a connector, checking it is open and supports `feature`
    async fn command(
        &self,
        name: &str,
        feature: Feature,
        message: Message,
    ) -> Result<StatusCode, GatewayError> {
        let handle = self.find(name)?;
        if handle.is_closed() {
            return Err(GatewayError::Closed(name.to_string()));
        }
        if !handle.snapshot().features.contains(&feature) {
            return Err(GatewayError::Unsupported {
                connector: name.to_string(),
                feature,
            });
        }

        info!(connector = %name, request = %message, "forwarding request");
        handle
            .send(message)
            .await
            .map_err(|_| GatewayError::Closed(name.to_string()))?;
        Ok(StatusCode::ACCEPTED)
    }
}

/// Entry in the connector listing
#[derive(Debug, Serialize)]
pub struct ConnectorSummary {
    pub name: String,
    pub running: bool,
}

/// Body of a load request
#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    pub file: String,
}

/// `GET /connectors`
pub async fn list_connectors(State(gateway): State<Gateway>) -> Json<Vec<ConnectorSummary>> {
    Json(
        gateway
            .connectors
            .iter()
            .map(|handle| ConnectorSummary {
                name: handle.name().to_string(),
                running: !handle.is_closed(),
            })
            .collect(),
    )
}

/// `GET /connectors/{name}`
pub async fn get_connector(
    State(gateway): State<Gateway>,
    Path(name): Path<String>,
) -> Result<Json<ServiceSnapshot>, GatewayError> {
    Ok(Json(gateway.find(&name)?.snapshot()))
}

/// `GET /connectors/{name}/state`
pub async fn get_state(
    State(gateway): State<Gateway>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let snapshot = gateway.find(&name)?.snapshot();
    Ok(Json(json!({ "state": snapshot.state })))
}

/// `GET /connectors/{name}/features`
pub async fn get_features(
    State(gateway): State<Gateway>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let snapshot = gateway.find(&name)?.snapshot();
    Ok(Json(json!({ "features": snapshot.features })))
}

/// `GET /connectors/{name}/time`
pub async fn get_time(
    State(gateway): State<Gateway>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let snapshot = gateway.find(&name)?.snapshot();
    let time_us = snapshot.time_us.ok_or_else(|| GatewayError::NotReported {
        connector: name.clone(),
        field: "time",
    })?;
    Ok(Json(json!({
        "time_us": time_us,
        "time": format_duration(std::time::Duration::from_micros(time_us)),
    })))
}

/// `GET /connectors/{name}/file`
pub async fn get_file(
    State(gateway): State<Gateway>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let snapshot = gateway.find(&name)?.snapshot();
    let file = snapshot.file.ok_or_else(|| GatewayError::NotReported {
        connector: name.clone(),
        field: "file",
    })?;
    Ok(Json(json!({ "file": file })))
}

/// `POST /connectors/{name}/play`
pub async fn play(
    State(gateway): State<Gateway>,
    Path(name): Path<String>,
) -> Result<StatusCode, GatewayError> {
    gateway
        .command(&name, Feature::PlayStop, Message::new(Word::Play))
        .await
}

/// `POST /connectors/{name}/stop`
pub async fn stop(
    State(gateway): State<Gateway>,
    Path(name): Path<String>,
) -> Result<StatusCode, GatewayError> {
    gateway
        .command(&name, Feature::PlayStop, Message::new(Word::Stop))
        .await
}

/// `POST /connectors/{name}/eject`
pub async fn eject(
    State(gateway): State<Gateway>,
    Path(name): Path<String>,
) -> Result<StatusCode, GatewayError> {
    gateway
        .command(&name, Feature::FileLoad, Message::new(Word::Eject))
        .await
}

/// `POST /connectors/{name}/load` with body `{"file": ...}`
pub async fn load(
    State(gateway): State<Gateway>,
    Path(name): Path<String>,
    Json(request): Json<LoadRequest>,
) -> Result<StatusCode, GatewayError> {
    debug!(connector = %name, file = %request.file, "load requested");
    gateway
        .command(
            &name,
            Feature::FileLoad,
            Message::new(Word::Load).with_arg(request.file),
        )
        .await
}
