use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{debug, warn};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{models::UsbDeviceIdentity, usb_matcher::DeviceEvent};

const EVENT_BUFFER: usize = 64;

/// Enumerates the currently connected USB devices.
pub trait DeviceSource: Send + Sync + 'static {
    fn connected_devices(&self) -> Result<Vec<UsbDeviceIdentity>>;
}

#[derive(Debug, Default)]
pub struct NusbDeviceSource;

impl DeviceSource for NusbDeviceSource {
    fn connected_devices(&self) -> Result<Vec<UsbDeviceIdentity>> {
        let devices = nusb::list_devices().context("failed to enumerate usb devices")?;
        Ok(devices
            .map(|info| {
                UsbDeviceIdentity::from_descriptor(
                    info.vendor_id(),
                    info.product_id(),
                    info.manufacturer_string(),
                    info.product_string(),
                    info.serial_number(),
                )
            })
            .collect())
    }
}

/// Events that turn `previous` into `current`: disconnects first, then connects.
pub fn diff_devices(
    previous: &[UsbDeviceIdentity],
    current: &[UsbDeviceIdentity],
) -> Vec<DeviceEvent> {
    let mut events = Vec::new();
    for device in previous {
        if !current.iter().any(|known| known.matches(device)) {
            events.push(DeviceEvent::Disconnected(device.clone()));
        }
    }
    for device in current {
        if !previous.iter().any(|known| known.matches(device)) {
            events.push(DeviceEvent::Connected(device.clone()));
        }
    }
    events
}

/// Polls `source` every `interval` and reports changes. The first message is a
/// [`DeviceEvent::Snapshot`]. Aborting the returned handle stops monitoring.
pub fn spawn_device_monitor(
    source: Arc<dyn DeviceSource>,
    interval: Duration,
) -> (JoinHandle<()>, mpsc::Receiver<DeviceEvent>) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let handle = tokio::spawn(async move {
        let mut known: Option<Vec<UsbDeviceIdentity>> = None;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(current) = enumerate(&source).await else {
                continue;
            };

            let events = match &known {
                None => vec![DeviceEvent::Snapshot(current.clone())],
                Some(previous) => diff_devices(previous, &current),
            };
            known = Some(current);

            for event in events {
                debug!("usb event: {:?}", event);
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        }
    });
    (handle, rx)
}

async fn enumerate(source: &Arc<dyn DeviceSource>) -> Option<Vec<UsbDeviceIdentity>> {
    let source = Arc::clone(source);
    match tokio::task::spawn_blocking(move || source.connected_devices()).await {
        Ok(Ok(devices)) => Some(devices),
        Ok(Err(err)) => {
            warn!("usb enumeration failed: {err:#}");
            None
        }
        Err(err) => {
            warn!("usb enumeration task failed: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;
    use pretty_assertions::assert_eq;

    use super::*;

    fn device(serial: &str) -> UsbDeviceIdentity {
        UsbDeviceIdentity::from_descriptor(0x046d, 0xc52b, Some("Logitech"), Some("Receiver"), Some(serial))
    }

    /// Replays one scripted enumeration per poll, repeating the last one.
    struct ScriptedSource {
        steps: Mutex<Vec<Result<Vec<UsbDeviceIdentity>>>>,
        last: Mutex<Vec<UsbDeviceIdentity>>,
    }

    impl ScriptedSource {
        fn new(mut steps: Vec<Result<Vec<UsbDeviceIdentity>>>) -> Self {
            steps.reverse();
            Self {
                steps: Mutex::new(steps),
                last: Mutex::new(Vec::new()),
            }
        }
    }

    impl DeviceSource for ScriptedSource {
        fn connected_devices(&self) -> Result<Vec<UsbDeviceIdentity>> {
            match self.steps.lock().unwrap().pop() {
                Some(Ok(devices)) => {
                    *self.last.lock().unwrap() = devices.clone();
                    Ok(devices)
                }
                Some(Err(err)) => Err(err),
                None => Ok(self.last.lock().unwrap().clone()),
            }
        }
    }

    #[test]
    fn diff_reports_disconnects_then_connects() {
        let events = diff_devices(&[device("A"), device("B")], &[device("B"), device("C")]);
        assert_eq!(
            events,
            vec![
                DeviceEvent::Disconnected(device("A")),
                DeviceEvent::Connected(device("C")),
            ]
        );
    }

    #[test]
    fn unchanged_lists_produce_no_events() {
        assert!(diff_devices(&[device("A")], &[device("A")]).is_empty());
    }

    #[tokio::test]
    async fn monitor_sends_snapshot_then_changes() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(vec![device("A")]),
            Err(anyhow!("bus busy")),
            Ok(vec![device("A"), device("B")]),
            Ok(vec![device("B")]),
        ]));
        let (handle, mut rx) = spawn_device_monitor(source, Duration::from_millis(5));

        assert_eq!(rx.recv().await, Some(DeviceEvent::Snapshot(vec![device("A")])));
        assert_eq!(rx.recv().await, Some(DeviceEvent::Connected(device("B"))));
        assert_eq!(rx.recv().await, Some(DeviceEvent::Disconnected(device("A"))));

        handle.abort();
    }
}
