// Alarm endpoints

use serde_json::json;
use tracing::debug;

use super::CommandAck;
use crate::client::UnifiClient;
use crate::error::Error;
use crate::models::Alarm;

impl UnifiClient {
    /// `GET /api/s/{site}/list/alarm`
    pub async fn list_alarms(&self) -> Result<Vec<Alarm>, Error> {
        let url = self.site_url("list/alarm");
        debug!("listing alarms");
        self.get(url).await
    }

    /// Archive one alarm.
    ///
    /// `POST /api/s/{site}/cmd/evtmgr` with `{"cmd": "archive-alarm", "_id": ...}`
    pub async fn archive_alarm(&self, id: &str) -> Result<(), Error> {
        let url = self.site_url("cmd/evtmgr");
        debug!(id, "archiving alarm");
        let _: CommandAck = self
            .post(url, &json!({ "cmd": "archive-alarm", "_id": id }))
            .await?;
        Ok(())
    }
}
