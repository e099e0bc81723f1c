use std::fmt;

use serde::{Deserialize, Serialize};

/// Case-insensitive matching key derived from an executable path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessIdentity(String);

impl ProcessIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProcessIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_lowercase())
    }
}

/// A user-registered application, owned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackedApp {
    pub id: u64,
    pub name: String,
    pub path: String,
}

/// A running process offered by the "track a running process" search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunningProcessInfo {
    pub name: String,
    pub path: String,
}

/// Per-path state returned by `get_app_list_details`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppLiveData {
    pub icon: Option<String>,
    pub is_running: bool,
}

/// Structural identity of a USB device. There is no server-assigned id; two
/// identities refer to the same device only if every field matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsbDeviceIdentity {
    pub product_id: u16,
    pub vendor_id: u16,
    pub manufacturer_name: String,
    pub product_name: String,
    pub serial_number: String,
}

impl UsbDeviceIdentity {
    /// Builds an identity from raw descriptor values, filling in the placeholder
    /// strings used when a device does not report them.
    pub fn from_descriptor(
        vendor_id: u16,
        product_id: u16,
        manufacturer: Option<&str>,
        product: Option<&str>,
        serial: Option<&str>,
    ) -> Self {
        let non_empty = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Self {
            product_id,
            vendor_id,
            manufacturer_name: non_empty(manufacturer)
                .unwrap_or_else(|| "Unknown Manufacturer".to_string()),
            product_name: non_empty(product)
                .unwrap_or_else(|| format!("Unknown Device ({product_id}:{vendor_id})")),
            serial_number: non_empty(serial)
                .unwrap_or_else(|| "Unknown Serial Number".to_string()),
        }
    }

    /// Full field-wise equality over the five identity fields.
    pub fn matches(&self, other: &UsbDeviceIdentity) -> bool {
        self.product_id == other.product_id
            && self.vendor_id == other.vendor_id
            && self.manufacturer_name == other.manufacturer_name
            && self.product_name == other.product_name
            && self.serial_number == other.serial_number
    }

    pub fn label(&self) -> String {
        format!(
            "{} ({:04x}:{:04x})",
            self.product_name, self.vendor_id, self.product_id
        )
    }
}

impl PartialEq for UsbDeviceIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl Eq for UsbDeviceIdentity {}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(serial: &str) -> UsbDeviceIdentity {
        UsbDeviceIdentity::from_descriptor(0x0781, 0x5581, Some("SanDisk"), Some("Ultra"), Some(serial))
    }

    #[test]
    fn identities_match_only_when_every_field_matches() {
        assert!(device("A1").matches(&device("A1")));
        assert!(!device("A1").matches(&device("B2")));

        let mut other_product = device("A1");
        other_product.product_id = 0x1234;
        assert!(!device("A1").matches(&other_product));

        let mut other_name = device("A1");
        other_name.product_name = "Extreme".into();
        assert_ne!(device("A1"), other_name);
    }

    #[test]
    fn missing_descriptor_strings_get_placeholders() {
        let identity = UsbDeviceIdentity::from_descriptor(4, 7, None, Some("  "), None);
        assert_eq!(identity.manufacturer_name, "Unknown Manufacturer");
        assert_eq!(identity.product_name, "Unknown Device (7:4)");
        assert_eq!(identity.serial_number, "Unknown Serial Number");
    }

    #[test]
    fn device_identity_keeps_camel_case_shape() {
        let json = serde_json::to_value(device("A1")).unwrap();
        assert_eq!(json["productId"], 0x5581);
        assert_eq!(json["vendorId"], 0x0781);
        assert_eq!(json["manufacturerName"], "SanDisk");
        assert_eq!(json["productName"], "Ultra");
        assert_eq!(json["serialNumber"], "A1");
    }

    #[test]
    fn app_live_data_serializes_is_running_in_camel_case() {
        let json = serde_json::to_value(AppLiveData {
            icon: None,
            is_running: true,
        })
        .unwrap();
        assert_eq!(json["isRunning"], true);
    }
}
