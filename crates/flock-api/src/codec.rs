use crate::{ApiError, ApiResult};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Builds authenticated JSON requests against one API origin and decodes
/// their responses.
#[derive(Clone, Debug)]
pub struct RequestCodec {
    client: reqwest::Client,
    base_url: String,
    access_key: String,
}

impl RequestCodec {
    pub fn new(base_url: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            access_key: access_key.into(),
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn build<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> ApiResult<reqwest::Request> {
        let endpoint = self.endpoint(path);
        let url = reqwest::Url::parse(&endpoint)
            .map_err(|err| ApiError::InvalidUrl(format!("{endpoint}: {err}")))?;

        let mut builder = self
            .client
            .request(method, url)
            .header(AUTHORIZATION, self.access_key.as_str())
            .header(CONTENT_TYPE, "application/json");
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body).map_err(|err| ApiError::Encode(err.to_string()))?;
            builder = builder.body(bytes);
        }

        builder
            .build()
            .map_err(|err| ApiError::InvalidUrl(format!("{endpoint}: {err}")))
    }

    pub async fn execute<T: DeserializeOwned>(&self, request: reqwest::Request) -> ApiResult<T> {
        let method = request.method().clone();
        let url = request.url().path().to_string();
        tracing::debug!(target: "flock_api", %method, path = %url, "sending request");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|err| ApiError::Network(format!("{method} {url} failed: {err}")))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ApiError::Network(format!("{method} {url} read body failed: {err}")))?;

        decode_response(status, &body)
    }
}

/// Applies the 2xx check and decodes the body into `T`.
pub fn decode_response<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> ApiResult<T> {
    if !status.is_success() {
        return Err(ApiError::BadStatus {
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }
    serde_json::from_slice(body).map_err(|err| ApiError::Decode(err.to_string()))
}
