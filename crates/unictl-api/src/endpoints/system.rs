// Controller and site information endpoints

use serde_json::Value;
use tracing::debug;

use crate::client::UnifiClient;
use crate::error::Error;
use crate::models::{ControllerEvent, Site};

impl UnifiClient {
    /// Controller version and runtime details.
    ///
    /// `GET /api/s/{site}/stat/sysinfo`. The controller wraps the single
    /// record in an array; this returns the record itself.
    pub async fn sysinfo(&self) -> Result<Value, Error> {
        let url = self.site_url("stat/sysinfo");
        debug!("fetching sysinfo");
        let records: Vec<Value> = self.get(url).await?;
        records.into_iter().next().ok_or_else(|| Error::Api {
            message: "empty sysinfo response".into(),
        })
    }

    /// The logged-in admin.
    ///
    /// `GET /api/self`
    pub async fn self_info(&self) -> Result<Value, Error> {
        let url = self.api_url("self");
        self.get(url).await
    }

    /// Sites visible to the logged-in admin.
    ///
    /// `GET /api/self/sites`
    pub async fn list_sites(&self) -> Result<Vec<Site>, Error> {
        let url = self.api_url("self/sites");
        debug!("listing sites");
        self.get(url).await
    }

    /// Per-subsystem health (`wan`, `lan`, `wlan`, `vpn`, ...).
    ///
    /// `GET /api/s/{site}/stat/health`
    pub async fn site_health(&self) -> Result<Vec<Value>, Error> {
        let url = self.site_url("stat/health");
        self.get(url).await
    }

    /// Recent stored events, newest first.
    ///
    /// `GET /api/s/{site}/stat/event`, capped with `_limit` when given.
    pub async fn list_events(&self, limit: Option<u32>) -> Result<Vec<ControllerEvent>, Error> {
        let path = match limit {
            Some(n) => format!("stat/event?_limit={n}"),
            None => "stat/event".to_owned(),
        };
        let url = self.site_url(&path);
        debug!(?limit, "listing events");
        self.get(url).await
    }
}
