// Network configuration endpoints
//
// CRUD over rest/networkconf. Bodies are caller-supplied and passed
// through as JSON; the controller validates them.

use serde::Serialize;
use tracing::debug;

use crate::client::{UnifiClient, find_by};
use crate::error::Error;
use crate::models::NetworkConf;

impl UnifiClient {
    /// `GET /api/s/{site}/rest/networkconf`
    pub async fn list_networks(&self) -> Result<Vec<NetworkConf>, Error> {
        let url = self.site_url("rest/networkconf");
        debug!("listing networks");
        self.get(url).await
    }

    /// Find one network by `_id`.
    pub async fn get_network(&self, id: &str) -> Result<NetworkConf, Error> {
        let networks = self.list_networks().await?;
        find_by(networks, "network", id, |n| n.id.as_str())
    }

    /// Create a network and return the stored record.
    ///
    /// `POST /api/s/{site}/rest/networkconf`
    pub async fn create_network(
        &self,
        body: &(impl Serialize + Sync + ?Sized),
    ) -> Result<NetworkConf, Error> {
        let url = self.site_url("rest/networkconf");
        debug!("creating network");
        let created: Vec<NetworkConf> = self.post(url, body).await?;
        first_record(created)
    }

    /// Replace fields on an existing network.
    ///
    /// `PUT /api/s/{site}/rest/networkconf/{id}`
    pub async fn update_network(
        &self,
        id: &str,
        body: &(impl Serialize + Sync + ?Sized),
    ) -> Result<NetworkConf, Error> {
        let url = self.site_url_with("rest/networkconf", id)?;
        debug!(id, "updating network");
        let updated: Vec<NetworkConf> = self.put(url, body).await?;
        first_record(updated)
    }

    /// `DELETE /api/s/{site}/rest/networkconf/{id}`
    pub async fn delete_network(&self, id: &str) -> Result<(), Error> {
        let url = self.site_url_with("rest/networkconf", id)?;
        debug!(id, "deleting network");
        let _: serde_json::Value = self.delete(url).await?;
        Ok(())
    }
}

fn first_record(records: Vec<NetworkConf>) -> Result<NetworkConf, Error> {
    records.into_iter().next().ok_or_else(|| Error::Api {
        message: "controller returned no network record".into(),
    })
}
