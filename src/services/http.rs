//! HTTP implementation of the compute-backend interface.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::http_client;
use crate::services::types::{
    CauseSortRequest, CauseSortResponse, HistogramRequest, HistogramResponse, PairSortRequest,
    PairSortResponse,
};
use crate::services::{ServiceError, SimilarityBackend};

const MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

/// Backend client posting JSON to the compute service.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp, ServiceError> {
        let url = format!("{}{path}", self.base_url);
        let response = match http_client::agent()
            .post(&url)
            .set("Accept", "application/json")
            .send_json(request)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = http_client::read_response_bytes(response, MAX_RESPONSE_BYTES)
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .unwrap_or_else(|err| err.to_string());
                return Err(ServiceError::Status { code, body });
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(ServiceError::Transport(err.to_string()));
            }
        };

        let bytes = http_client::read_response_bytes(response, MAX_RESPONSE_BYTES)
            .map_err(|err| ServiceError::Transport(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| ServiceError::Json(err.to_string()))
    }
}

impl SimilarityBackend for HttpBackend {
    fn sort_cause_by_similarity(
        &self,
        request: &CauseSortRequest,
    ) -> Result<CauseSortResponse, ServiceError> {
        self.post_json("/cause-similarity-sort", request)
    }

    fn sort_pairs_by_similarity(
        &self,
        request: &PairSortRequest,
    ) -> Result<PairSortResponse, ServiceError> {
        self.post_json("/pair-similarity-sort", request)
    }

    fn fetch_similarity_histogram(
        &self,
        request: &HistogramRequest,
    ) -> Result<HistogramResponse, ServiceError> {
        self.post_json("/similarity-histogram", request)
    }
}
