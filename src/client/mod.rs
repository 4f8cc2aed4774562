//! Read-only HTTP queries against running peers.
//!
//! One GET per call, no retry. A peer that is not listening (yet) yields
//! [`QueryError::Unreachable`]; callers decide whether that means "wait".

mod types;
pub use types::*;


use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::Error;
use crate::QueryError;
use crate::Result;

/// HTTP client shared by every query of a cluster
#[derive(Debug, Clone)]
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// `GET /cluster`
    pub async fn cluster_info(
        &self,
        uri: &str,
    ) -> Result<ClusterInfo> {
        self.get(uri, "/cluster").await
    }

    /// `GET /collections/{name}/cluster`
    pub async fn collection_cluster_info(
        &self,
        uri: &str,
        collection: &str,
    ) -> Result<CollectionClusterInfo> {
        self.get(uri, &format!("/collections/{collection}/cluster")).await
    }

    /// `GET /collections/{name}`
    pub async fn collection_info(
        &self,
        uri: &str,
        collection: &str,
    ) -> Result<CollectionInfo> {
        self.get(uri, &format!("/collections/{collection}")).await
    }

    /// Names of the collections a peer knows about
    pub async fn list_collections(
        &self,
        uri: &str,
    ) -> Result<Vec<String>> {
        let response: CollectionsResponse = self.get(uri, "/collections").await?;
        Ok(response.collections.into_iter().map(|c| c.name).collect())
    }

    /// Leader id the peer currently reports
    pub async fn leader(
        &self,
        uri: &str,
    ) -> Result<Option<u64>> {
        Ok(self.cluster_info(uri).await?.leader())
    }

    /// `GET /` answers with a success status. Any failure counts as offline.
    pub async fn is_online(
        &self,
        uri: &str,
    ) -> bool {
        match self.get_body(uri, "/").await {
            Ok(_) => true,
            Err(e) => {
                debug!("{uri} is offline: {e}");
                false
            }
        }
    }

    /// Unwrapped `result` of any endpoint, untyped. Used for diagnostics.
    pub async fn raw(
        &self,
        uri: &str,
        path: &str,
    ) -> Result<Value> {
        self.get(uri, path).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        uri: &str,
        path: &str,
    ) -> Result<T> {
        let body = self.get_body(uri, path).await?;
        let response: ApiResponse<T> =
            serde_json::from_str(&body).map_err(|source| QueryError::Decode {
                uri: uri.to_string(),
                path: path.to_string(),
                source,
            })?;
        Ok(response.result)
    }

    async fn get_body(
        &self,
        uri: &str,
        path: &str,
    ) -> Result<String> {
        let url = endpoint(uri, path)?;
        debug!("GET {url}");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(uri, e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| transport_error(uri, e))?;

        if !status.is_success() {
            return Err(QueryError::UnexpectedStatus {
                uri: uri.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(body)
    }
}

fn endpoint(
    uri: &str,
    path: &str,
) -> Result<reqwest::Url> {
    reqwest::Url::parse(uri)
        .and_then(|base| base.join(path))
        .ok()
        .filter(|url| url.host().is_some())
        .ok_or_else(|| QueryError::InvalidUri(uri.to_string()).into())
}

/// Connection refused/reset or a timeout before any status arrived means the
/// peer is not there (yet). Everything else is a real failure.
fn transport_error(
    uri: &str,
    source: reqwest::Error,
) -> Error {
    let unreachable =
        source.is_connect() || source.is_timeout() || (source.is_request() && !source.is_builder());
    if unreachable {
        QueryError::Unreachable {
            uri: uri.to_string(),
            source,
        }
        .into()
    } else {
        QueryError::Request {
            uri: uri.to_string(),
            source,
        }
        .into()
    }
}
