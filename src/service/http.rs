use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{
    Catalog, CorrectnessParams, CorrectnessStatus, JobParams, ResultPage, ResultService,
    StartedJob, WireCorrectness, WirePage,
};
use crate::error::{Result, StreamError};

/// HTTP/JSON client for the benchmark job service.
///
/// `reqwest::Client` is cheaply cloneable and pools connections, so one
/// instance is shared by every job streamed from the same server.
#[derive(Debug, Clone)]
pub struct HttpJobService {
    client: Client,
    base_url: String,
}

impl HttpJobService {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(StreamError::Config(format!(
                "invalid server URL \"{base_url}\""
            )));
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ResultService for HttpJobService {
    async fn result_page(&self, job_id: u64, offset: u64, count: u64) -> Result<ResultPage> {
        let wire: WirePage = self
            .client
            .get(self.url("/jobs/perfResult"))
            .query(&[("id", job_id), ("offset", offset), ("count", count)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(
            job_id,
            offset,
            received = wire.start_end_times.len(),
            total = wire.total,
            completed = wire.completed,
            "result page"
        );
        Ok(wire.into())
    }

    async fn start_job(&self, params: &JobParams) -> Result<StartedJob> {
        let started: StartedJob = self
            .client
            .post(self.url("/jobs/startPerf"))
            .form(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(started)
    }

    async fn list_catalog(&self) -> Result<Catalog> {
        let catalog: Catalog = self
            .client
            .get(self.url("/jobs/list"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(catalog)
    }

    async fn start_correctness(&self, params: &CorrectnessParams) -> Result<StartedJob> {
        let started: StartedJob = self
            .client
            .post(self.url("/jobs/startCorrectness"))
            .form(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(started)
    }

    async fn correctness_result(&self, job_id: u64) -> Result<CorrectnessStatus> {
        let wire: WireCorrectness = self
            .client
            .get(self.url("/jobs/correctnessResult"))
            .query(&[("id", job_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(job_id, completed = wire.completed, checks = wire.results.len(), "correctness status");
        Ok(wire.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_urls() {
        assert!(matches!(
            HttpJobService::new("localhost:8080"),
            Err(StreamError::Config(_))
        ));
    }

    #[test]
    fn test_trims_trailing_slash() {
        let svc = HttpJobService::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(svc.base_url(), "http://127.0.0.1:8080");
        assert_eq!(svc.url("/jobs/list"), "http://127.0.0.1:8080/jobs/list");
    }
}
