// Controller API response types
//
// Every synchronous response is wrapped in the `Envelope`. Fields use
// `#[serde(default)]` liberally because the controller is inconsistent
// about field presence across firmware versions; anything not modelled
// lands in the flattened `extra` map.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// `meta.rc` value that marks a successful response.
pub const RC_OK: &str = "ok";

// ── Response Envelope ────────────────────────────────────────────────

/// Standard controller response envelope.
///
/// ```json
/// { "meta": { "rc": "ok", "msg": "optional" }, "data": [...] }
/// ```
///
/// `data` may be absent, an object, or an array depending on the endpoint,
/// so it stays untyped here and is deserialized per call site.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub meta: Option<Meta>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Metadata from the envelope. `rc == "ok"` means success.
#[derive(Debug, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub rc: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl Meta {
    pub fn is_ok(&self) -> bool {
        self.rc.as_deref() == Some(RC_OK)
    }

    /// Failure carrying the server message, or `rc=<code>` without one.
    pub(crate) fn into_error(self) -> Error {
        let message = match (self.msg, self.rc) {
            (Some(msg), _) => msg,
            (None, Some(rc)) => format!("rc={rc}"),
            (None, None) => "request failed".into(),
        };
        Error::Api { message }
    }
}

// ── Device ───────────────────────────────────────────────────────────

/// Managed device from `stat/device`.
///
/// The controller returns 100+ fields per device. The commonly needed
/// ones are explicit; everything else lands in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "_id")]
    pub id: String,
    pub mac: String,
    #[serde(default, rename = "type")]
    pub device_type: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub adopted: bool,
    /// 0=offline, 1=online, 2=pending, 4=upgrading, 5=provisioning
    #[serde(default)]
    pub state: i32,
    #[serde(default)]
    pub uptime: Option<i64>,
    #[serde(default)]
    pub num_sta: Option<i32>,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub last_seen: Option<i64>,
    #[serde(default)]
    pub upgradable: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

// ── Station ──────────────────────────────────────────────────────────

/// Connected client (station) from `stat/sta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    #[serde(rename = "_id")]
    pub id: String,
    pub mac: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub oui: Option<String>,
    #[serde(default)]
    pub is_guest: Option<bool>,
    #[serde(default)]
    pub is_wired: Option<bool>,
    #[serde(default)]
    pub blocked: Option<bool>,
    #[serde(default)]
    pub essid: Option<String>,
    #[serde(default)]
    pub ap_mac: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub signal: Option<i32>,
    #[serde(default)]
    pub tx_bytes: Option<i64>,
    #[serde(default)]
    pub rx_bytes: Option<i64>,
    #[serde(default)]
    pub uptime: Option<i64>,
    #[serde(default)]
    pub last_seen: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Station {
    /// Best human-readable label: alias, then hostname, then MAC.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.hostname.as_deref())
            .unwrap_or(&self.mac)
    }
}

// ── Network ──────────────────────────────────────────────────────────

/// Network definition from `rest/networkconf`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConf {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// `corporate`, `guest`, `wan`, `vlan-only`, ...
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub vlan: Option<Value>,
    #[serde(default)]
    pub ip_subnet: Option<String>,
    #[serde(default)]
    pub dhcpd_enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

// ── Site ─────────────────────────────────────────────────────────────

/// Site object from `/api/self/sites`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

// ── Events / alarms ──────────────────────────────────────────────────

/// Stored event from `stat/event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerEvent {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub subsystem: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Alarm from `list/alarm`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alarm {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_data_shapes() {
        let absent: Envelope = serde_json::from_str(r#"{"meta":{"rc":"ok"}}"#).unwrap();
        assert!(absent.meta.unwrap().is_ok());
        assert!(absent.data.is_none());

        let object: Envelope =
            serde_json::from_str(r#"{"meta":{"rc":"ok"},"data":{"a":1}}"#).unwrap();
        assert!(object.data.unwrap().is_object());

        let failed: Envelope =
            serde_json::from_str(r#"{"meta":{"rc":"error","msg":"api.err.Invalid"},"data":[]}"#)
                .unwrap();
        let meta = failed.meta.unwrap();
        assert!(!meta.is_ok());
        assert_eq!(meta.msg.as_deref(), Some("api.err.Invalid"));
    }

    #[test]
    fn device_keeps_unknown_fields() {
        let device: Device = serde_json::from_value(serde_json::json!({
            "_id": "d1",
            "mac": "aa:bb:cc:dd:ee:ff",
            "type": "uap",
            "state": 1,
            "radio_table": [{"name": "wifi0"}]
        }))
        .unwrap();

        assert_eq!(device.device_type.as_deref(), Some("uap"));
        assert!(!device.adopted);
        assert!(device.extra.contains_key("radio_table"));
    }

    #[test]
    fn station_display_name_falls_back() {
        let mut sta: Station = serde_json::from_value(serde_json::json!({
            "_id": "s1",
            "mac": "11:22:33:44:55:66",
            "hostname": "laptop"
        }))
        .unwrap();
        assert_eq!(sta.display_name(), "laptop");

        sta.name = Some("Work Laptop".into());
        assert_eq!(sta.display_name(), "Work Laptop");

        sta.name = None;
        sta.hostname = None;
        assert_eq!(sta.display_name(), "11:22:33:44:55:66");
    }
}
