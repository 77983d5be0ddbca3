//! reqwest-backed implementation of [`LambdaApi`].

use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{
    CreateFilesystemRequest, DataEnvelope, ErrorEnvelope, FilesystemWire, InstanceIdsRequest,
    InstanceTypeCatalog, LaunchResponse, OperationData, catalog_entries,
};
use super::{ApiError, ApiFuture, Filesystem, Instance, InstanceTypeEntry, LambdaApi, LaunchRequest};

/// Production API endpoint.
pub const DEFAULT_API_URL: &str = "https://cloud.lambda.ai/api/v1";

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ERROR_BODY_CHARS: usize = 200;
const USER_AGENT: &str = concat!("lambda-cli/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the Lambda Cloud API authenticated with a bearer token.
#[derive(Clone, Debug)]
pub struct HttpLambdaApi {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpLambdaApi {
    /// Builds a client for `base_url` using `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MissingApiKey`] when the key is blank and
    /// [`ApiError::Transport`] when the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ApiError> {
        let key = api_key.into();
        if key.trim().is_empty() {
            return Err(ApiError::MissingApiKey);
        }
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ApiError::Transport {
                method: "INIT".to_owned(),
                path: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: key.trim().to_owned(),
        })
    }

    async fn send<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<Vec<u8>>, ApiError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = format!("{}{path}", self.base_url);
        debug!(method = %method, path, "calling Lambda API");
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let transport = |err: reqwest::Error| ApiError::Transport {
            method: method.to_string(),
            path: path.to_owned(),
            message: err.to_string(),
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport)?;

        if !status.is_success() {
            return Err(status_error(method.as_str(), path, status, &bytes));
        }
        if status == StatusCode::NO_CONTENT || bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(bytes.to_vec()))
    }

    async fn fetch<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        let bytes = self
            .send(method, path, body)
            .await?
            .ok_or_else(|| ApiError::EmptyBody {
                path: path.to_owned(),
            })?;
        let envelope: DataEnvelope<T> = decode(path, &bytes)?;
        Ok(envelope.data)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.fetch::<T, ()>(Method::GET, path, None).await
    }

    async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        self.fetch(Method::POST, path, Some(body)).await
    }

    async fn instance_operation(
        &self,
        path: &str,
        instance_ids: &[String],
    ) -> Result<Vec<String>, ApiError> {
        let request = InstanceIdsRequest { instance_ids };
        let bytes = self.send(Method::POST, path, Some(&request)).await?;
        let Some(body) = bytes else {
            return Ok(Vec::new());
        };
        let envelope: DataEnvelope<OperationData> = decode(path, &body)?;
        Ok(envelope.data.into_ids())
    }
}

fn decode<T: DeserializeOwned>(path: &str, bytes: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(bytes).map_err(|err| ApiError::Decode {
        path: path.to_owned(),
        message: err.to_string(),
    })
}

/// Maps a non-2xx response to [`ApiError::Status`], preferring the structured
/// `{error:{code,message}}` body and falling back to a truncated raw body.
pub(crate) fn status_error(method: &str, path: &str, status: StatusCode, body: &[u8]) -> ApiError {
    let (code, message) = match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let detail = envelope.error;
            let mut message = detail
                .message
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_owned());
            if let Some(suggestion) = detail.suggestion.filter(|text| !text.is_empty()) {
                message = format!("{message} ({suggestion})");
            }
            (detail.code, message)
        }
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let trimmed: String = text.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
            let message = if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("error").to_owned()
            } else {
                trimmed
            };
            (None, message)
        }
    };
    ApiError::Status {
        method: method.to_owned(),
        path: path.to_owned(),
        status: status.as_u16(),
        code,
        message,
    }
}

impl LambdaApi for HttpLambdaApi {
    fn list_instances(&self) -> ApiFuture<'_, Vec<Instance>> {
        Box::pin(async move { self.get("/instances").await })
    }

    fn list_instance_types(&self) -> ApiFuture<'_, Vec<InstanceTypeEntry>> {
        Box::pin(async move {
            let catalog: InstanceTypeCatalog = self.get("/instance-types").await?;
            Ok(catalog_entries(catalog))
        })
    }

    fn list_filesystems(&self) -> ApiFuture<'_, Vec<Filesystem>> {
        Box::pin(async move {
            let listed: Vec<FilesystemWire> = self.get("/file-systems").await?;
            Ok(listed
                .into_iter()
                .map(|wire| wire.into_filesystem(""))
                .collect())
        })
    }

    fn create_filesystem<'a>(
        &'a self,
        name: &'a str,
        region: &'a str,
    ) -> ApiFuture<'a, Filesystem> {
        Box::pin(async move {
            let request = CreateFilesystemRequest {
                region_name: region,
                name: [name],
            };
            let created: FilesystemWire = self.post("/filesystems", &request).await?;
            Ok(created.into_filesystem(region))
        })
    }

    fn launch<'a>(&'a self, request: &'a LaunchRequest) -> ApiFuture<'a, Vec<String>> {
        Box::pin(async move {
            let launched: LaunchResponse =
                self.post("/instance-operations/launch", request).await?;
            Ok(launched.instance_ids)
        })
    }

    fn terminate<'a>(&'a self, instance_ids: &'a [String]) -> ApiFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.instance_operation("/instance-operations/terminate", instance_ids)
                .await
        })
    }

    fn restart<'a>(&'a self, instance_ids: &'a [String]) -> ApiFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.instance_operation("/instance-operations/restart", instance_ids)
                .await
        })
    }
}
