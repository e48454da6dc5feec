// Client (station) endpoints
//
// Reads via stat/sta and stat/user, commands via cmd/stamgr.

use serde_json::{Value, json};
use tracing::debug;

use super::CommandAck;
use crate::client::{UnifiClient, find_by};
use crate::error::Error;
use crate::models::Station;

impl UnifiClient {
    /// List currently connected clients.
    ///
    /// `GET /api/s/{site}/stat/sta`
    pub async fn list_clients(&self) -> Result<Vec<Station>, Error> {
        let url = self.site_url("stat/sta");
        debug!("listing connected clients");
        self.get(url).await
    }

    /// Find one connected client by MAC, ignoring case.
    pub async fn get_client(&self, mac: &str) -> Result<Station, Error> {
        let clients = self.list_clients().await?;
        find_by(clients, "client", mac, |c| c.mac.as_str())
    }

    /// Stored statistics for a client, connected or not.
    ///
    /// `GET /api/s/{site}/stat/user/{mac}`
    pub async fn client_stats(&self, mac: &str) -> Result<Value, Error> {
        let url = self.site_url_with("stat/user", &mac.to_lowercase())?;
        self.get(url).await
    }

    pub async fn block_client(&self, mac: &str) -> Result<(), Error> {
        self.stamgr("block-sta", mac).await
    }

    pub async fn unblock_client(&self, mac: &str) -> Result<(), Error> {
        self.stamgr("unblock-sta", mac).await
    }

    /// Force a client to reassociate.
    pub async fn reconnect_client(&self, mac: &str) -> Result<(), Error> {
        self.stamgr("kick-sta", mac).await
    }

    async fn stamgr(&self, cmd: &str, mac: &str) -> Result<(), Error> {
        let url = self.site_url("cmd/stamgr");
        let mac = mac.to_lowercase();
        debug!(cmd, mac = %mac, "client command");
        let _: CommandAck = self.post(url, &json!({ "cmd": cmd, "mac": mac })).await?;
        Ok(())
    }
}
