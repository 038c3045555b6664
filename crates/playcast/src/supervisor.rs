//! Connector supervision
//!
//! Connects every configured service up front, then runs each connector on
//! its own task. A connector that fails is not restarted.

use tokio::sync::broadcast;
use tracing::{info, warn};

use playcast_core::{Connector, ConnectorError, ConnectorHandle, Response, WaitGroup};

use crate::config::Config;

/// Supervisor errors
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("connector {name}: {source}")]
    Connect {
        name: String,
        #[source]
        source: ConnectorError,
    },
}

/// Running connectors and their shared completion group
pub struct Supervisor {
    handles: Vec<ConnectorHandle>,
    completion: WaitGroup,
}

/// Connect every configured connector and start it
///
/// Any connect failure aborts startup; connectors already connected are
/// dropped with it.
pub async fn start(
    config: &Config,
    observer: broadcast::Sender<Response>,
) -> Result<Supervisor, SupervisorError> {
    let completion = WaitGroup::new();
    let mut connectors = Vec::with_capacity(config.connectors.len());
    let mut handles = Vec::with_capacity(config.connectors.len());

    for entry in &config.connectors {
        let (mut connector, handle) =
            Connector::new(entry.name.clone(), observer.clone(), &completion);
        connector
            .connect(&entry.address)
            .await
            .map_err(|source| SupervisorError::Connect {
                name: entry.name.clone(),
                source,
            })?;
        connectors.push(connector);
        handles.push(handle);
    }

    for mut connector in connectors {
        tokio::spawn(async move {
            match connector.run().await {
                Ok(()) => info!(connector = %connector.name(), "connector stopped"),
                Err(e) => warn!(connector = %connector.name(), error = %e, "connector closed"),
            }
        });
    }

    info!(count = handles.len(), "all connectors running");
    Ok(Supervisor {
        handles,
        completion,
    })
}

impl Supervisor {
    /// Handles to every connector, in config order
    pub fn handles(&self) -> &[ConnectorHandle] {
        &self.handles
    }

    /// Ask every connector to shut down
    pub fn shutdown(&self) {
        for handle in &self.handles {
            handle.shutdown();
        }
    }

    /// Wait until every connector has closed
    pub async fn wait(&self) {
        self.completion.wait().await;
    }
}
