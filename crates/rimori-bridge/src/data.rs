//! HTTP client for the backing data service.
//!
//! Built from a [`RimoriInfo`] and rebuilt by the bridge whenever the
//! host pushes a new context. Requests carry the service key and the
//! user's bearer token.

use reqwest::{Method, RequestBuilder};
use url::Url;

use crate::context::RimoriInfo;
use crate::error::BridgeError;

/// REST path prefix for table access.
const REST_PATH: &str = "rest/v1";

/// Path prefix for edge functions.
const FUNCTIONS_PATH: &str = "functions/v1";

#[derive(Debug, Clone)]
pub struct DataClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    token: String,
}

impl DataClient {
    pub fn new(http: reqwest::Client, info: &RimoriInfo) -> Result<Self, BridgeError> {
        let mut base_url = Url::parse(&info.url)
            .map_err(|e| BridgeError::InvalidContext(format!("url {:?}: {e}", info.url)))?;
        if base_url.cannot_be_a_base() {
            return Err(BridgeError::InvalidContext(format!(
                "url {:?} cannot be a base",
                info.url
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http,
            base_url,
            api_key: info.key.clone(),
            token: info.token.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// `<base>/rest/v1/<table>`
    pub fn table_url(&self, table: &str) -> Result<Url, BridgeError> {
        self.join(&format!("{REST_PATH}/{table}"))
    }

    /// `<base>/functions/v1/<name>`
    pub fn function_url(&self, name: &str) -> Result<Url, BridgeError> {
        self.join(&format!("{FUNCTIONS_PATH}/{name}"))
    }

    /// Start an authenticated request against `url`.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.token)
    }

    /// Authenticated request on a table endpoint.
    pub fn table(&self, method: Method, table: &str) -> Result<RequestBuilder, BridgeError> {
        Ok(self.request(method, self.table_url(table)?))
    }

    /// Authenticated POST to an edge function.
    pub fn function(&self, name: &str) -> Result<RequestBuilder, BridgeError> {
        Ok(self.request(Method::POST, self.function_url(name)?))
    }

    fn join(&self, path: &str) -> Result<Url, BridgeError> {
        self.base_url
            .join(path)
            .map_err(|e| BridgeError::InvalidContext(format!("path {path:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn info(url: &str) -> RimoriInfo {
        RimoriInfo::from_value(json!({
            "url": url,
            "key": "anon-key",
            "token": "jwt-1",
            "expiration": "2030-01-01T00:00:00Z",
            "pluginId": "pl001"
        }))
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let client = DataClient::new(reqwest::Client::new(), &info("https://db.rimori.test")).unwrap();
        assert_eq!(
            client.table_url("pl001_cards").unwrap().as_str(),
            "https://db.rimori.test/rest/v1/pl001_cards"
        );
        assert_eq!(
            client.function_url("llm").unwrap().as_str(),
            "https://db.rimori.test/functions/v1/llm"
        );
    }

    #[test]
    fn test_base_path_preserved() {
        let client =
            DataClient::new(reqwest::Client::new(), &info("https://rimori.test/backend")).unwrap();
        assert_eq!(
            client.table_url("t").unwrap().as_str(),
            "https://rimori.test/backend/rest/v1/t"
        );
    }

    #[test]
    fn test_invalid_url() {
        let err = DataClient::new(reqwest::Client::new(), &info("not a url")).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidContext(_)));
    }

    #[tokio::test]
    async fn test_request_carries_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/pl001_cards"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer jwt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = DataClient::new(reqwest::Client::new(), &info(&server.uri())).unwrap();
        let resp = client
            .table(Method::GET, "pl001_cards")
            .unwrap()
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
}
