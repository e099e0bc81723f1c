use log::{debug, info};

use crate::models::UsbDeviceIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbLinkState {
    NoSelection,
    SelectedDisconnected,
    SelectedConnected,
}

/// Side effect requested by a transition of the selected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbTrigger {
    /// Drives start-all.
    SelectedConnected,
    /// Drives stop-all.
    SelectedDisconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Full enumeration, delivered once when monitoring starts.
    Snapshot(Vec<UsbDeviceIdentity>),
    Connected(UsbDeviceIdentity),
    Disconnected(UsbDeviceIdentity),
}

/// Tracks the connected devices and whether the selected one is among them.
#[derive(Debug, Clone)]
pub struct UsbMatcher {
    selected: Option<UsbDeviceIdentity>,
    available: Vec<UsbDeviceIdentity>,
    state: UsbLinkState,
}

impl UsbMatcher {
    /// Starts from a persisted selection. A restored selection counts as
    /// disconnected until an enumeration shows it.
    pub fn restore(selected: Option<UsbDeviceIdentity>) -> Self {
        let state = if selected.is_some() {
            UsbLinkState::SelectedDisconnected
        } else {
            UsbLinkState::NoSelection
        };
        Self {
            selected,
            available: Vec::new(),
            state,
        }
    }

    pub fn state(&self) -> UsbLinkState {
        self.state
    }

    pub fn selected(&self) -> Option<&UsbDeviceIdentity> {
        self.selected.as_ref()
    }

    pub fn available(&self) -> &[UsbDeviceIdentity] {
        &self.available
    }

    /// Replaces the available list with a fresh enumeration. Settles the link
    /// state without firing a trigger.
    pub fn sync_devices(&mut self, devices: Vec<UsbDeviceIdentity>) {
        self.available.clear();
        for device in devices {
            self.push_available(device);
        }
        self.state = self.presence_state();
        debug!("usb enumeration: {} devices, {:?}", self.available.len(), self.state);
    }

    /// Explicit user choice. `None` clears the selection.
    pub fn select(&mut self, device: Option<UsbDeviceIdentity>) {
        self.selected = device;
        self.state = self.presence_state();
        match &self.selected {
            Some(device) => info!("selected usb device {} ({:?})", device.label(), self.state),
            None => info!("usb selection cleared"),
        }
    }

    pub fn handle_connect(&mut self, device: UsbDeviceIdentity) -> Option<UsbTrigger> {
        let is_selected = self.is_selected(&device);
        self.push_available(device);
        if is_selected && self.state == UsbLinkState::SelectedDisconnected {
            self.state = UsbLinkState::SelectedConnected;
            return Some(UsbTrigger::SelectedConnected);
        }
        None
    }

    pub fn handle_disconnect(&mut self, device: UsbDeviceIdentity) -> Option<UsbTrigger> {
        self.available.retain(|known| !known.matches(&device));
        if self.is_selected(&device) && self.state == UsbLinkState::SelectedConnected {
            self.state = UsbLinkState::SelectedDisconnected;
            return Some(UsbTrigger::SelectedDisconnected);
        }
        None
    }

    pub fn handle(&mut self, event: DeviceEvent) -> Option<UsbTrigger> {
        match event {
            DeviceEvent::Snapshot(devices) => {
                self.sync_devices(devices);
                None
            }
            DeviceEvent::Connected(device) => self.handle_connect(device),
            DeviceEvent::Disconnected(device) => self.handle_disconnect(device),
        }
    }

    fn is_selected(&self, device: &UsbDeviceIdentity) -> bool {
        self.selected
            .as_ref()
            .is_some_and(|selected| selected.matches(device))
    }

    fn push_available(&mut self, device: UsbDeviceIdentity) {
        if !self.available.iter().any(|known| known.matches(&device)) {
            self.available.push(device);
        }
    }

    fn presence_state(&self) -> UsbLinkState {
        match &self.selected {
            None => UsbLinkState::NoSelection,
            Some(selected) if self.available.iter().any(|known| known.matches(selected)) => {
                UsbLinkState::SelectedConnected
            }
            Some(_) => UsbLinkState::SelectedDisconnected,
        }
    }
}
