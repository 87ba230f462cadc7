//! DHCP relay agent driver
//!
//! This module owns the runtime side of the relay:
//! - Binding the client-facing and server-facing interfaces
//! - One receive loop per interface, both feeding the same handler
//! - Coordinated shutdown when either loop fails or a stop is requested

use crate::{
    config::RelayConfig,
    error::RelayError,
    network::{InterfaceTransport, Role},
    v4::{Forward, RelayHandler},
};
use std::sync::Arc;
use tokio::{sync::watch, task::JoinSet};

/// Largest datagram read in one call.
const RECV_BUFFER_LEN: usize = 1500;

#[derive(Debug)]
pub struct RelayAgent {
    config: RelayConfig,
    transport: Arc<InterfaceTransport>,
    handler: Arc<RelayHandler>,
}

impl RelayAgent {
    /// Resolves and binds both interfaces. Must be called inside a tokio runtime.
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        if config.servers.is_empty() {
            tracing::warn!("No DHCP servers configured; client requests will not be forwarded");
        }

        let transport =
            InterfaceTransport::bind(&config.client_interface, &config.server_interface)?;
        let handler = RelayHandler::from_config(&config);

        Ok(Self {
            config,
            transport: Arc::new(transport),
            handler: Arc::new(handler),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn handler(&self) -> &Arc<RelayHandler> {
        &self.handler
    }

    /// Runs both receive loops until one fails or `shutdown` turns true.
    ///
    /// A failing loop takes its sibling down with it and its error is returned.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), RelayError> {
        tracing::info!(
            relay = %self.config.relay_address,
            servers = ?self.config.servers,
            "Relay agent started"
        );

        let mut loops = JoinSet::new();
        for role in [Role::ClientFacing, Role::ServerFacing] {
            loops.spawn(serve(
                role,
                Arc::clone(&self.transport),
                Arc::clone(&self.handler),
            ));
        }

        let result = loop {
            tokio::select! {
                Some(joined) = loops.join_next() => {
                    break joined.map_err(RelayError::from).and_then(|outcome| outcome);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Relay agent shutting down");
                        break Ok(());
                    }
                }
            }
        };

        loops.shutdown().await;
        if let Err(e) = &result {
            tracing::error!("Relay agent stopped: {}", e);
        }
        result
    }
}

/// Receive loop for one interface. Returns only on a receive error.
async fn serve(
    role: Role,
    transport: Arc<InterfaceTransport>,
    handler: Arc<RelayHandler>,
) -> Result<(), RelayError> {
    let binding = transport.binding(role);
    tracing::info!(
        interface = binding.name(),
        index = binding.index(),
        port = role.port(),
        "Listening on {} interface",
        role
    );

    let mut buf = [0u8; RECV_BUFFER_LEN];
    loop {
        let (len, ingress) = transport
            .recv(role, &mut buf)
            .await
            .map_err(|source| RelayError::Receive { role, source })?;
        if len == 0 {
            continue;
        }

        match handler.handle_datagram(&buf[..len]) {
            Ok(forwards) => dispatch(&transport, forwards).await,
            Err(reason) => {
                tracing::debug!(%role, ?ingress, len, "Dropping datagram: {}", reason);
            }
        }
    }
}

/// Sends every forward; a failed send is logged and does not stop the rest.
async fn dispatch(transport: &InterfaceTransport, forwards: Vec<Forward>) {
    for forward in forwards {
        match transport
            .send(
                forward.egress,
                &forward.payload,
                forward.destination,
                forward.source,
            )
            .await
        {
            Ok(sent) => {
                tracing::debug!(destination = %forward.destination, sent, "Relayed datagram");
            }
            Err(e) => {
                tracing::warn!(
                    destination = %forward.destination,
                    egress = %forward.egress,
                    "Failed to relay datagram: {}",
                    e
                );
            }
        }
    }
}
