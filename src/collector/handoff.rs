//! One-shot device snapshot handoff between the device and user collectors.
//!
//! A capacity-one, single-producer/single-consumer conduit built on
//! [`tokio::sync::oneshot`]. Both ends are consumed on use, so "at most one
//! send" and "exactly one receive" hold by construction. Dropping the sender
//! without sending (disabled producer, panic, abort) closes the channel, and
//! the receiver observes [`Handoff::Closed`] instead of blocking.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Status of one device as seen by the device collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Device display name.
    pub name: String,
    /// Email of the enrolled user, if any.
    pub user_email: Option<String>,
    /// Whether the device checked in within the online window.
    pub online: bool,
    /// Last check-in time reported by the API.
    pub last_seen: Option<DateTime<Utc>>,
}

/// Per-device status keyed by device id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSnapshot {
    devices: HashMap<String, DeviceStatus>,
}

impl DeviceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, device_id: impl Into<String>, status: DeviceStatus) {
        self.devices.insert(device_id.into(), status);
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceStatus> {
        self.devices.get(device_id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Devices enrolled by `email` (case-insensitive).
    pub fn devices_for<'a>(
        &'a self,
        email: &'a str,
    ) -> impl Iterator<Item = &'a DeviceStatus> + 'a {
        self.devices.values().filter(move |status| {
            status
                .user_email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(email))
        })
    }
}

impl FromIterator<(String, DeviceStatus)> for DeviceSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, DeviceStatus)>>(iter: I) -> Self {
        Self {
            devices: iter.into_iter().collect(),
        }
    }
}

/// Result of the consumer's single receive.
#[derive(Debug, PartialEq, Eq)]
pub enum Handoff {
    /// The producer delivered a snapshot (possibly empty).
    Delivered(DeviceSnapshot),
    /// The producer is disabled or went away without sending.
    Closed,
    /// The scrape was cancelled before anything arrived.
    Cancelled,
}

/// Producer end. Sending consumes it; dropping it closes the channel.
#[derive(Debug)]
pub struct HandoffSender {
    tx: oneshot::Sender<DeviceSnapshot>,
}

/// Consumer end. Receiving consumes it.
#[derive(Debug)]
pub struct HandoffReceiver {
    rx: oneshot::Receiver<DeviceSnapshot>,
}

/// Create a connected sender/receiver pair.
pub fn channel() -> (HandoffSender, HandoffReceiver) {
    let (tx, rx) = oneshot::channel();
    (HandoffSender { tx }, HandoffReceiver { rx })
}

impl HandoffSender {
    /// Hand the snapshot over and close the channel.
    ///
    /// Returns `false` if no consumer is listening (consumer disabled); the
    /// snapshot is dropped in that case.
    pub fn send(self, snapshot: DeviceSnapshot) -> bool {
        self.tx.send(snapshot).is_ok()
    }

    /// Close the channel without a value.
    pub fn close(self) {
        drop(self);
    }
}

impl HandoffReceiver {
    /// Wait for the snapshot, bounded by `cancel`.
    ///
    /// A value that is already in the slot wins over a concurrent cancellation.
    pub async fn recv(self, cancel: &CancellationToken) -> Handoff {
        tokio::select! {
            biased;
            received = self.rx => match received {
                Ok(snapshot) => Handoff::Delivered(snapshot),
                Err(_) => Handoff::Closed,
            },
            _ = cancel.cancelled() => Handoff::Cancelled,
        }
    }
}
