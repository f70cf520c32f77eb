//! HTTP transport (reqwest).

use jobwatch_core::JobId;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;

use super::{
    Payload, PollStatus, SubmitOutcome, SubmitRequest, TaskRecord, TasksResponse, Transport,
    TransportError,
};
use crate::config::{ClientConfig, Endpoints};

/// Transport that talks to the job endpoints over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    endpoints: Endpoints,
}

impl HttpTransport {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: None,
            endpoints: Endpoints::default(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let mut transport = Self::new(config.api_url.clone()).with_endpoints(config.endpoints.clone());
        transport.token = config.auth_token.clone();
        transport
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get_task(&self, path: &str, job_id: &JobId) -> Result<reqwest::Response, TransportError> {
        let req = self
            .client
            .get(self.url(path))
            .query(&[("task_id", job_id.as_str())]);
        self.authorize(req)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))
    }
}

/// Classify a submit response.
///
/// - 202, or 200/201 whose body is a JSON task record: accepted, poll it
/// - any other 200/201: ready, body is `"<title>\n<content>"`
/// - anything else: rejected
pub fn classify_submit(
    status: u16,
    is_json: bool,
    body: &[u8],
) -> Result<SubmitOutcome, TransportError> {
    match status {
        202 => serde_json::from_slice::<TaskRecord>(body)
            .map(SubmitOutcome::Accepted)
            .map_err(|e| TransportError::Parse(format!("accepted job record: {e}"))),
        200 | 201 => {
            if is_json {
                if let Ok(record) = serde_json::from_slice::<TaskRecord>(body) {
                    return Ok(SubmitOutcome::Accepted(record));
                }
            }
            Ok(SubmitOutcome::Ready(Payload::parse(body)))
        }
        status => Err(TransportError::Status(
            status,
            String::from_utf8_lossy(body).into_owned(),
        )),
    }
}

fn is_json(resp: &reqwest::Response) -> bool {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

async fn error_for(resp: reqwest::Response) -> TransportError {
    let status = resp.status().as_u16();
    TransportError::Status(status, resp.text().await.unwrap_or_default())
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, TransportError> {
        let req = self
            .client
            .post(self.url(&self.endpoints.request_job))
            .json(request);
        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let json = is_json(&resp);
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        classify_submit(status, json, &body)
    }

    async fn poll(&self, job_id: &JobId) -> Result<PollStatus, TransportError> {
        let resp = self.get_task(&self.endpoints.job_result, job_id).await?;
        Ok(PollStatus::from_status(resp.status().as_u16()))
    }

    async fn cleanup(&self, job_id: &JobId) -> Result<(), TransportError> {
        let resp = self.get_task(&self.endpoints.remove_failed_job, job_id).await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(error_for(resp).await)
        }
    }

    async fn download(&self, job_id: &JobId) -> Result<Payload, TransportError> {
        let resp = self.get_task(&self.endpoints.download, job_id).await?;
        if resp.status() != StatusCode::OK {
            return Err(error_for(resp).await);
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Payload::parse(&body))
    }

    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, TransportError> {
        let req = self.client.get(self.url(&self.endpoints.tasks));
        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(error_for(resp).await);
        }

        let body: TasksResponse = resp
            .json()
            .await
            .map_err(|e| TransportError::Parse(format!("tasks listing: {e}")))?;
        Ok(body.tasks)
    }
}
