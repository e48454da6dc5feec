// Device endpoints
//
// Reads via stat/device, commands via cmd/devmgr.

use serde_json::{Value, json};
use tracing::debug;

use super::CommandAck;
use crate::client::{UnifiClient, find_by};
use crate::error::Error;
use crate::models::Device;

impl UnifiClient {
    /// List all devices adopted by (or pending on) the site.
    ///
    /// `GET /api/s/{site}/stat/device`
    pub async fn list_devices(&self) -> Result<Vec<Device>, Error> {
        let url = self.site_url("stat/device");
        debug!("listing devices");
        self.get(url).await
    }

    /// Find one device by MAC, ignoring case.
    ///
    /// Fails with [`Error::NotFound`] when no device matches.
    pub async fn get_device(&self, mac: &str) -> Result<Device, Error> {
        let devices = self.list_devices().await?;
        find_by(devices, "device", mac, |d| d.mac.as_str())
    }

    /// Detailed statistics for one device.
    ///
    /// `GET /api/s/{site}/stat/device/{mac}`
    pub async fn device_stats(&self, mac: &str) -> Result<Value, Error> {
        let url = self.site_url_with("stat/device", &mac.to_lowercase())?;
        self.get(url).await
    }

    pub async fn restart_device(&self, mac: &str) -> Result<(), Error> {
        self.devmgr("restart", mac).await
    }

    pub async fn adopt_device(&self, mac: &str) -> Result<(), Error> {
        self.devmgr("adopt", mac).await
    }

    /// Remove a device from the site.
    pub async fn forget_device(&self, mac: &str) -> Result<(), Error> {
        self.devmgr("delete-device", mac).await
    }

    /// Toggle the locate LED.
    pub async fn locate_device(&self, mac: &str, enable: bool) -> Result<(), Error> {
        let cmd = if enable { "set-locate" } else { "unset-locate" };
        self.devmgr(cmd, mac).await
    }

    /// `POST /api/s/{site}/cmd/devmgr` with `{"cmd": ..., "mac": ...}`
    async fn devmgr(&self, cmd: &str, mac: &str) -> Result<(), Error> {
        let url = self.site_url("cmd/devmgr");
        let mac = mac.to_lowercase();
        debug!(cmd, mac = %mac, "device command");
        let _: CommandAck = self.post(url, &json!({ "cmd": cmd, "mac": mac })).await?;
        Ok(())
    }
}
