//! Database module: the plugin's own tables on the backing data service.
//!
//! Table names are namespaced per plugin: `cards` is stored as
//! `<prefix>_cards`, where the prefix defaults to the plugin id.

use reqwest::{Method, Response};
use rimori_bridge::Bridge;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct DbModule {
    bridge: Bridge,
}

impl DbModule {
    pub(crate) fn new(bridge: Bridge) -> Self {
        Self { bridge }
    }

    /// Fully qualified name of one of the plugin's tables.
    pub async fn table_name(&self, table: &str) -> Result<String, ClientError> {
        let info = self.bridge.connection().await?;
        Ok(format!("{}_{table}", info.table_prefix()))
    }

    /// Rows of `table` matching PostgREST-style `filters`
    /// (e.g. `[("deck", "eq.3"), ("order", "due.asc")]`).
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<T>, ClientError> {
        let name = self.table_name(table).await?;
        let client = self.bridge.data_client().await?;
        debug!(table = %name, filters = filters.len(), "select");

        let resp = client
            .table(Method::GET, &name)?
            .query(&[("select", "*")])
            .query(filters)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Insert `rows` (one record or an array) and return what was stored.
    pub async fn insert<T, R>(&self, table: &str, rows: &T) -> Result<Vec<R>, ClientError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let name = self.table_name(table).await?;
        let client = self.bridge.data_client().await?;
        debug!(table = %name, "insert");

        let resp = client
            .table(Method::POST, &name)?
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

/// Turn a non-success response into [`ClientError::Api`].
pub(crate) async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().clone();
    let body = resp.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), url = %url, "backing service rejected request");
    Err(ClientError::Api {
        status: status.as_u16(),
        body,
    })
}
