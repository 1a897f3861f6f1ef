//! Protocol types for controller-device communication.
//!
//! - Controller-to-device commands are plain HTTP POSTs against the device's own web server.
//! - Device-to-controller reports go through the controller's JSON API.

use core::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

// Macro to define the enum from variant => path mappings
macro_rules! define_enum_with_path {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $str:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant,
            )*
        }

        impl $name {
            /// Endpoint path on the device, without leading slash.
            #[must_use]
            pub const fn path(&self) -> &'static str {
                match *self {
                    $($name::$variant => $str,)*
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.path())
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($str => Ok($name::$variant),)*
                    _ => Err(()),
                }
            }
        }
    };
}

define_enum_with_path! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Commands the controller sends to the device.
    pub enum DeviceCommand {
        /// Begin working on the batch named in [`StartBatch`]
        Start => "start-batch",
        /// Stop whatever the device is doing
        Stop => "stop-batch",
    }
}

/// Body of the [`DeviceCommand::Start`] request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBatch {
    pub batch_id: String,
}

/// Heartbeat the device sends periodically.
///
/// The receive time is stamped by the controller, so the device doesn't need a synchronized clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatReport {
    #[serde(default, rename = "wifiSSID")]
    pub wifi_ssid: Option<String>,
    #[serde(default, rename = "wifiRSSI")]
    pub wifi_rssi: Option<i32>,
    #[serde(default, rename = "ipAddress")]
    pub ip_address: Option<String>,
}
