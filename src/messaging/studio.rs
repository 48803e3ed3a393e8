use std::time::Duration;

use log::{debug, warn};
use reqwest::Client;

use crate::{config::DEFAULT_BASE_URL, error::BatchError, item::payload::OutboundRequest};

use super::{Credentials, ExecutionResponse, MessagingClient};

/// Starts flow executions through the Studio REST API.
///
/// Each request is a form-encoded `POST {base_url}/Flows/{flow_id}/Executions`
/// authenticated with HTTP basic auth. The client is asynchronous; it is driven
/// from the synchronous batch with `block_in_place`, so it must be used inside
/// a multi-threaded tokio runtime.
pub struct StudioClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl StudioClient {
    pub fn executions_url(&self, flow_id: &str) -> String {
        format!(
            "{}/Flows/{}/Executions",
            self.base_url.trim_end_matches('/'),
            flow_id
        )
    }

    async fn dispatch_async(
        &self,
        request: &OutboundRequest,
    ) -> Result<ExecutionResponse, BatchError> {
        let url = self.executions_url(&request.flow_id);
        debug!("POST {} to {}", url, request.to);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.credentials.account_sid, Some(&self.credentials.auth_token))
            .form(request)
            .send()
            .await
            .map_err(|error| BatchError::Dispatch(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Execution request for {} rejected: {}", request.to, status);
            return Err(BatchError::Dispatch(format!("HTTP {}: {}", status, body)));
        }

        response
            .json::<ExecutionResponse>()
            .await
            .map_err(|error| BatchError::Dispatch(error.to_string()))
    }
}

impl MessagingClient for StudioClient {
    fn dispatch(&self, request: &OutboundRequest) -> Result<ExecutionResponse, BatchError> {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(self.dispatch_async(request))
        })
    }
}

/// Builder for [`StudioClient`].
///
/// ```
/// use survey_batch::messaging::{studio::StudioClientBuilder, Credentials};
///
/// let client = StudioClientBuilder::new()
///     .credentials(Credentials {
///         account_sid: "AC123".to_string(),
///         auth_token: "secret".to_string(),
///     })
///     .base_url("http://localhost:8080/v1/")
///     .build()
///     .unwrap();
///
/// assert_eq!(
///     client.executions_url("FW42"),
///     "http://localhost:8080/v1/Flows/FW42/Executions"
/// );
/// ```
pub struct StudioClientBuilder {
    base_url: String,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl Default for StudioClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StudioClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<StudioClient, BatchError> {
        let credentials = self.credentials.ok_or_else(|| {
            BatchError::Configuration("Credentials are required for the Studio client".to_string())
        })?;

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|error| BatchError::Configuration(error.to_string()))?;

        Ok(StudioClient {
            client,
            base_url: self.base_url,
            credentials,
        })
    }
}
