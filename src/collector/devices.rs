//! Zero Trust device collector.
//!
//! Lists the account's enrolled WARP devices, exports one
//! `zerotrust_devices_up` series per device and hands the per-device status to
//! the user collector.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tokio::time::Instant;

use crate::cloudflare::ApiClient;
use crate::collector::handoff::{DeviceSnapshot, DeviceStatus};
use crate::collector::{CollectorError, CollectorKind, ScrapeContext, SnapshotProducer};
use crate::metrics::SeriesSpec;

const DEVICES_UP: &str = "zerotrust_devices_up";
const DEVICES_UP_HELP: &str = "Whether the device checked in within the online window (1) or not (0)";

#[derive(Debug, Deserialize)]
struct Device {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    device_type: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    user: Option<DeviceUser>,
}

#[derive(Debug, Deserialize)]
struct DeviceUser {
    #[serde(default)]
    email: Option<String>,
}

/// Producer half of the device → user handoff.
#[derive(Debug)]
pub struct DeviceCollector {
    client: ApiClient,
    online_window: Duration,
}

impl DeviceCollector {
    pub fn new(client: ApiClient, online_window: Duration) -> Self {
        Self {
            client,
            online_window,
        }
    }

    fn is_online(&self, last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let window = TimeDelta::from_std(self.online_window).unwrap_or(TimeDelta::days(365));
        last_seen.is_some_and(|seen| now.signed_duration_since(seen) <= window)
    }
}

#[async_trait::async_trait]
impl SnapshotProducer for DeviceCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Devices
    }

    async fn produce(&self, ctx: &ScrapeContext) -> Result<DeviceSnapshot, CollectorError> {
        let started = Instant::now();
        let devices: Vec<Device> = self
            .client
            .get_paged(ctx.cancel_token(), &self.client.account_path("devices"), &[])
            .await?;

        let now = Utc::now();
        let mut snapshot = DeviceSnapshot::new();

        for device in devices {
            let online = self.is_online(device.last_seen, now);
            let user_email = device.user.and_then(|u| u.email);

            let series = SeriesSpec::new(DEVICES_UP, DEVICES_UP_HELP)
                .label("device_id", device.id.as_str())
                .label("name", device.name.as_str())
                .label("user_email", user_email.clone().unwrap_or_default())
                .label("device_type", device.device_type)
                .label("version", device.version);
            ctx.set_gauge(&series, if online { 1.0 } else { 0.0 })?;

            snapshot.insert(
                device.id,
                DeviceStatus {
                    name: device.name,
                    user_email,
                    online,
                    last_seen: device.last_seen,
                },
            );
        }

        if ctx.debug() {
            tracing::info!(
                collector = "devices",
                devices = snapshot.len(),
                elapsed = ?started.elapsed(),
                "Fetched devices"
            );
        }

        Ok(snapshot)
    }
}
