//! The HTTP client for the round server

use std::time::Duration;

use crisp_common::{
    backends::RoundStateClient,
    errors::VoteError,
    types::{
        BroadcastVoteRequest, BroadcastVoteResponse, RoundCount, RoundId, RoundRequest,
        RoundState, VoteCountResponse,
    },
};
use reqwest::{RequestBuilder, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

/// Reaches the round server over its JSON API
#[derive(Clone, Debug)]
pub struct HttpRoundStateClient {
    /// The base URL of the server's API
    base_url: Url,
    /// The underlying HTTP client, carrying the request timeout
    http: reqwest::Client,
}

impl HttpRoundStateClient {
    /// Creates a client for the server at `base_url`, failing requests that
    /// take longer than `timeout`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, VoteError> {
        // A base without a trailing slash would have its last segment
        // replaced when joining endpoint paths
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)
        } else {
            Url::parse(&format!("{base_url}/"))
        }
        .map_err(|e| VoteError::Network(format!("invalid server url {base_url}: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoteError::Network(e.to_string()))?;

        Ok(Self { base_url, http })
    }

    /// The full URL of an endpoint
    fn endpoint(&self, path: &str) -> Result<Url, VoteError> {
        self.base_url
            .join(path)
            .map_err(|e| VoteError::Network(format!("invalid endpoint {path}: {e}")))
    }

    /// Sends a request and parses its JSON response.
    ///
    /// A body that does not parse is reported along with the status code,
    /// so that error pages from proxies surface intelligibly
    async fn send<Resp: DeserializeOwned>(request: RequestBuilder) -> Result<Resp, VoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| VoteError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VoteError::Network(e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                VoteError::Network(format!("malformed response: {e}"))
            } else {
                VoteError::Network(format!("server responded {status}: {body}"))
            }
        })
    }

    /// GETs an endpoint
    async fn get<Resp: DeserializeOwned>(&self, path: &str) -> Result<Resp, VoteError> {
        debug!(path, "GET");
        Self::send(self.http.get(self.endpoint(path)?)).await
    }

    /// POSTs a JSON body to an endpoint
    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, VoteError> {
        debug!(path, "POST");
        Self::send(self.http.post(self.endpoint(path)?).json(body)).await
    }
}

impl RoundStateClient for HttpRoundStateClient {
    async fn round_count(&self) -> Result<u32, VoteError> {
        let RoundCount { round_count } = self.get("get_rounds").await?;
        Ok(round_count)
    }

    async fn round_state(&self, round_id: RoundId) -> Result<RoundState, VoteError> {
        self.post("get_round_state_lite", &RoundRequest { round_id })
            .await
    }

    async fn vote_count(&self, round_id: RoundId) -> Result<u32, VoteError> {
        let VoteCountResponse { vote_count, .. } = self
            .post("get_vote_count_by_round", &RoundRequest { round_id })
            .await?;
        Ok(vote_count)
    }

    async fn broadcast_vote(
        &self,
        request: &BroadcastVoteRequest,
    ) -> Result<BroadcastVoteResponse, VoteError> {
        self.post("broadcast_enc_vote", request).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::HttpRoundStateClient;

    #[test]
    fn test_endpoints_extend_base_path() {
        for base in ["http://localhost:4000/api", "http://localhost:4000/api/"] {
            let client = HttpRoundStateClient::new(base, Duration::from_secs(1)).unwrap();
            assert_eq!(
                client.endpoint("get_rounds").unwrap().as_str(),
                "http://localhost:4000/api/get_rounds"
            );
        }
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(HttpRoundStateClient::new("not a url", Duration::from_secs(1)).is_err());
    }
}
