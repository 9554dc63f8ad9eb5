//! HTTP client for the fleetman daemon

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use fleetman_api::{
    requests::{BatchRequest, QueueCommandRequest, RepoConfig},
    responses::{
        BatchAccepted, BatchStatus, CommandQueued, DeviceLiveness, DeviceStatus, ErrorBody,
        HealthResponse,
    },
};

use crate::error::{ClientError, Result};

/// HTTP client for communicating with the fleetman daemon
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
}

impl HttpClient {
    /// Create a new HTTP client
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    ///
    /// # Example
    /// ```no_run
    /// use fleetman_client::HttpClient;
    ///
    /// let client = HttpClient::new("http://localhost:8080")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new HTTP client with custom `reqwest::Client`
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn with_client(base_url: impl AsRef<str>, client: Client) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::BaseUrl(base_url.to_string()));
        }
        Ok(Self { client, base_url })
    }

    /// Build a full URL from a path
    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(ClientError::Url)
    }

    /// `/api/devices/<id>/<tail>` with the id escaped as one segment
    fn device_url(&self, id: &str, tail: &str) -> Result<Url> {
        let mut url = self.url("/api/devices")?;
        url.path_segments_mut()
            .map_err(|()| ClientError::BaseUrl(self.base_url.to_string()))?
            .push(id)
            .push(tail);
        Ok(url)
    }

    /// Turn an error status into `ClientError::Api`
    async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (Some(body.code), body.message),
            Err(_) => (None, text),
        };
        Err(ClientError::Api {
            status,
            code,
            message,
        })
    }

    /// Perform a GET request and deserialize the response
    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.client.get(url).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Perform a POST request with JSON body
    async fn post<T: DeserializeOwned>(&self, url: Url, body: impl serde::Serialize) -> Result<T> {
        let response = self.client.post(url).json(&body).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    // System endpoints

    /// Get daemon health status
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn health(&self) -> Result<HealthResponse> {
        self.get(self.url("/health")?).await
    }

    // Batch endpoints

    /// Start building a batch request
    ///
    /// # Example
    /// ```no_run
    /// # use fleetman_client::HttpClient;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = HttpClient::new("http://localhost:8080")?;
    /// let accepted = client.batch()
    ///     .device("robot-1")
    ///     .device("robot-2")
    ///     .reinstall()
    ///     .self_test()
    ///     .send()
    ///     .await?;
    /// println!("{} devices", accepted.total);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn batch(&self) -> BatchBuilder {
        BatchBuilder::new(self.clone())
    }

    /// Start a batch
    ///
    /// # Errors
    /// Returns an error if the request is invalid, a batch is already
    /// running (`ClientError::is_conflict`) or the request fails.
    pub async fn start_batch(&self, request: &BatchRequest) -> Result<BatchAccepted> {
        self.post(self.url("/api/batch")?, request).await
    }

    /// Get the current or last batch status
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn batch_status(&self) -> Result<BatchStatus> {
        self.get(self.url("/api/batch/status")?).await
    }

    /// Poll the batch status until it is no longer active
    ///
    /// `on_update` sees every polled snapshot, including the final one.
    ///
    /// # Errors
    /// Returns `ClientError::Timeout` if the batch is still active after
    /// `timeout`, or any request error.
    pub async fn wait_for_batch(
        &self,
        poll: Duration,
        timeout: Duration,
        mut on_update: impl FnMut(&BatchStatus),
    ) -> Result<BatchStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.batch_status().await?;
            on_update(&status);
            if !status.active {
                return Ok(status);
            }
            if tokio::time::Instant::now() + poll > deadline {
                return Err(ClientError::Timeout);
            }
            debug!(completed = status.completed, total = status.total, "batch still active");
            tokio::time::sleep(poll).await;
        }
    }

    // Device endpoints

    /// Queue a command for one device; returns the job id
    ///
    /// # Errors
    /// Returns an error if the device is unknown, the type is empty or the
    /// request fails.
    pub async fn queue_command(&self, device_id: &str, kind: &str, data: Value) -> Result<String> {
        let body = QueueCommandRequest {
            kind: kind.to_string(),
            data,
        };
        let queued: CommandQueued = self.post(self.device_url(device_id, "commands")?, body).await?;
        Ok(queued.job_id)
    }

    /// Publish a command to every device; returns the command id
    ///
    /// # Errors
    /// Returns an error if the type is empty or the request fails.
    pub async fn broadcast(&self, kind: &str, data: Value) -> Result<String> {
        let body = QueueCommandRequest {
            kind: kind.to_string(),
            data,
        };
        let queued: CommandQueued = self.post(self.url("/api/commands/broadcast")?, body).await?;
        Ok(queued.job_id)
    }

    /// Get one device's record and last heartbeat
    ///
    /// # Errors
    /// Returns an error if the device is unknown or the request fails.
    pub async fn device_status(&self, device_id: &str) -> Result<DeviceStatus> {
        self.get(self.device_url(device_id, "status")?).await
    }

    /// Get the last heartbeat of every device heard from
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn fleet_status(&self) -> Result<Vec<DeviceLiveness>> {
        self.get(self.url("/api/devices/status")?).await
    }
}

/// Builder for batch requests
#[derive(Debug)]
pub struct BatchBuilder {
    client: HttpClient,
    request: BatchRequest,
}

impl BatchBuilder {
    fn new(client: HttpClient) -> Self {
        Self {
            client,
            request: BatchRequest::default(),
        }
    }

    /// Add a device to the batch (repeatable)
    #[must_use]
    pub fn device(mut self, id: impl Into<String>) -> Self {
        self.request.robot_ids.push(id.into());
        self
    }

    /// Add several devices to the batch
    #[must_use]
    pub fn devices<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request.robot_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Reinstall the agent and wait for it to reconnect
    #[must_use]
    pub fn reinstall(mut self) -> Self {
        self.request.reinstall = true;
        self
    }

    #[must_use]
    pub fn reset_logs(mut self) -> Self {
        self.request.reset_logs = true;
        self
    }

    /// Update the device repository, optionally overriding its settings
    #[must_use]
    pub fn update_repo(mut self, config: Option<RepoConfig>) -> Self {
        self.request.update_repo = true;
        self.request.repo_config = config;
        self
    }

    /// Apply a scenario (repeatable)
    #[must_use]
    pub fn scenario(mut self, id: impl Into<String>) -> Self {
        self.request.apply_scenarios = true;
        self.request.scenario_ids.push(id.into());
        self
    }

    #[must_use]
    pub fn self_test(mut self) -> Self {
        self.request.run_self_test = true;
        self
    }

    /// The request as built so far
    #[must_use]
    pub fn request(&self) -> &BatchRequest {
        &self.request
    }

    /// Execute the request
    ///
    /// # Errors
    /// Returns an error if the request is invalid, a batch is already
    /// running or the request fails.
    pub async fn send(self) -> Result<BatchAccepted> {
        self.client.start_batch(&self.request).await
    }
}
