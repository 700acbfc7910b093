//! Zero Trust Access user collector.
//!
//! Consumes the device snapshot: a user is up when any device enrolled under
//! their email is online.

use serde::Deserialize;
use tokio::time::Instant;

use crate::cloudflare::ApiClient;
use crate::collector::handoff::DeviceSnapshot;
use crate::collector::{CollectorError, CollectorKind, ScrapeContext, SnapshotConsumer};
use crate::metrics::SeriesSpec;

const USERS_UP: &str = "zerotrust_users_up";
const USERS_UP_HELP: &str = "Whether any device of the user is online (1) or not (0)";
const USER_DEVICES: &str = "zerotrust_user_devices";
const USER_DEVICES_HELP: &str = "Number of devices enrolled by the user";

#[derive(Debug, Deserialize)]
struct AccessUser {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: Option<String>,
}

/// Consumer half of the device → user handoff.
#[derive(Debug)]
pub struct UserCollector {
    client: ApiClient,
}

impl UserCollector {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl SnapshotConsumer for UserCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Users
    }

    async fn consume(
        &self,
        ctx: &ScrapeContext,
        snapshot: DeviceSnapshot,
    ) -> Result<(), CollectorError> {
        let started = Instant::now();
        let users: Vec<AccessUser> = self
            .client
            .get_paged(ctx.cancel_token(), &self.client.account_path("access/users"), &[])
            .await?;

        for user in &users {
            let (count, online) = snapshot
                .devices_for(&user.email)
                .fold((0usize, false), |(count, online), d| (count + 1, online || d.online));

            let up = SeriesSpec::new(USERS_UP, USERS_UP_HELP)
                .label("user_id", user.id.as_str())
                .label("email", user.email.as_str())
                .label("name", user.name.clone().unwrap_or_default());
            ctx.set_gauge(&up, if online { 1.0 } else { 0.0 })?;

            let devices = SeriesSpec::new(USER_DEVICES, USER_DEVICES_HELP)
                .label("email", user.email.as_str());
            ctx.set_gauge(&devices, count as f64)?;
        }

        if ctx.debug() {
            tracing::info!(
                collector = "users",
                users = users.len(),
                snapshot_devices = snapshot.len(),
                elapsed = ?started.elapsed(),
                "Fetched users"
            );
        }

        Ok(())
    }
}
