//! Consumers of per-device snapshots.

use std::collections::HashMap;

use tracing::info;

use crate::devices::DeviceSnapshot;

/// Receives one snapshot per tracked device per processed sample.
///
/// Implementations must not block; the engine calls `publish` inline.
pub trait UpdateSink {
    fn publish(&mut self, snapshot: &DeviceSnapshot);
}

impl<S: UpdateSink + ?Sized> UpdateSink for &mut S {
    fn publish(&mut self, snapshot: &DeviceSnapshot) {
        (**self).publish(snapshot);
    }
}

impl<S: UpdateSink + ?Sized> UpdateSink for Box<S> {
    fn publish(&mut self, snapshot: &DeviceSnapshot) {
        (**self).publish(snapshot);
    }
}

/// Fans every snapshot out to both sinks.
impl<A: UpdateSink, B: UpdateSink> UpdateSink for (A, B) {
    fn publish(&mut self, snapshot: &DeviceSnapshot) {
        self.0.publish(snapshot);
        self.1.publish(snapshot);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl UpdateSink for NullSink {
    fn publish(&mut self, _snapshot: &DeviceSnapshot) {}
}

/// Keeps every snapshot in arrival order.
#[derive(Debug, Default, Clone)]
pub struct VecSink {
    snapshots: Vec<DeviceSnapshot>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> &[DeviceSnapshot] {
        &self.snapshots
    }

    /// Snapshots published for `device`, in arrival order.
    pub fn for_device<'a>(&'a self, device: &'a str) -> impl Iterator<Item = &'a DeviceSnapshot> {
        self.snapshots.iter().filter(move |s| s.device_name == device)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn into_inner(self) -> Vec<DeviceSnapshot> {
        self.snapshots
    }
}

impl UpdateSink for VecSink {
    fn publish(&mut self, snapshot: &DeviceSnapshot) {
        self.snapshots.push(snapshot.clone());
    }
}

/// Keeps only the most recent snapshot of each device.
#[derive(Debug, Default, Clone)]
pub struct LatestSink {
    latest: HashMap<String, DeviceSnapshot>,
}

impl LatestSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device: &str) -> Option<&DeviceSnapshot> {
        self.latest.get(device)
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// All latest snapshots sorted by device name.
    pub fn sorted(&self) -> Vec<&DeviceSnapshot> {
        let mut all: Vec<_> = self.latest.values().collect();
        all.sort_by(|a, b| a.device_name.cmp(&b.device_name));
        all
    }
}

impl UpdateSink for LatestSink {
    fn publish(&mut self, snapshot: &DeviceSnapshot) {
        match self.latest.get_mut(&snapshot.device_name) {
            Some(slot) => slot.clone_from(snapshot),
            None => {
                self.latest
                    .insert(snapshot.device_name.clone(), snapshot.clone());
            }
        }
    }
}

/// Logs ON/OFF transitions at `info`.
#[derive(Debug, Default, Clone)]
pub struct LogSink {
    on: HashMap<String, bool>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UpdateSink for LogSink {
    fn publish(&mut self, snapshot: &DeviceSnapshot) {
        let was_on = self
            .on
            .insert(snapshot.device_name.clone(), snapshot.is_on)
            .unwrap_or(false);
        if was_on != snapshot.is_on {
            info!(
                device = %snapshot.device_name,
                state = %snapshot.state(),
                power_w = snapshot.current_power_watts,
                confidence_pct = snapshot.confidence_percent,
                at = %snapshot.last_update.to_rfc3339(),
                "device state changed"
            );
        }
    }
}
