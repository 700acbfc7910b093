//! Cloudflare Tunnel (cloudflared) collector.

use serde::Deserialize;
use tokio::time::Instant;

use crate::cloudflare::ApiClient;
use crate::collector::{Collector, CollectorError, CollectorKind, ScrapeContext};
use crate::metrics::SeriesSpec;

const TUNNELS_UP: &str = "zerotrust_tunnels_up";
const TUNNELS_UP_HELP: &str = "Whether the tunnel status is healthy (1) or not (0)";
const TUNNEL_CONNECTIONS: &str = "zerotrust_tunnel_connections";
const TUNNEL_CONNECTIONS_HELP: &str = "Number of active tunnel connections";

#[derive(Debug, Deserialize)]
struct Tunnel {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    tun_type: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    connections: Vec<TunnelConnection>,
}

#[derive(Debug, Deserialize)]
struct TunnelConnection {
    #[serde(default)]
    is_pending_reconnect: bool,
}

impl Tunnel {
    fn is_healthy(&self) -> bool {
        self.status.as_deref() == Some("healthy")
    }

    fn active_connections(&self) -> usize {
        self.connections
            .iter()
            .filter(|c| !c.is_pending_reconnect)
            .count()
    }
}

/// Exports health and connection counts of non-deleted tunnels.
#[derive(Debug)]
pub struct TunnelCollector {
    client: ApiClient,
}

impl TunnelCollector {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Collector for TunnelCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Tunnels
    }

    async fn collect(&self, ctx: &ScrapeContext) -> Result<(), CollectorError> {
        let started = Instant::now();
        let tunnels: Vec<Tunnel> = self
            .client
            .get_paged(
                ctx.cancel_token(),
                &self.client.account_path("cfd_tunnel"),
                &[("is_deleted", "false")],
            )
            .await?;

        for tunnel in &tunnels {
            let up = SeriesSpec::new(TUNNELS_UP, TUNNELS_UP_HELP)
                .label("tunnel_id", tunnel.id.as_str())
                .label("name", tunnel.name.as_str())
                .label("tun_type", tunnel.tun_type.as_str());
            ctx.set_gauge(&up, if tunnel.is_healthy() { 1.0 } else { 0.0 })?;

            let connections = SeriesSpec::new(TUNNEL_CONNECTIONS, TUNNEL_CONNECTIONS_HELP)
                .label("tunnel_id", tunnel.id.as_str())
                .label("name", tunnel.name.as_str());
            ctx.set_gauge(&connections, tunnel.active_connections() as f64)?;
        }

        if ctx.debug() {
            tracing::info!(
                collector = "tunnels",
                tunnels = tunnels.len(),
                elapsed = ?started.elapsed(),
                "Fetched tunnels"
            );
        }

        Ok(())
    }
}
