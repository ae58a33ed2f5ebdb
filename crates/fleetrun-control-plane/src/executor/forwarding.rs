//! Executor used by edge sites: every write goes to the center.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use fleetrun_client::{ClientError, HttpClient};
use fleetrun_core::api::{
    MARK_DONE_PATH, TASK_HOSTS_RUN_PATH, TASK_HOSTS_UPSERT_PATH, TASK_HOST_OUTPUT_PATH,
    TASK_HOST_PATH,
};
use fleetrun_core::{DoneReport, HostKey, OutputUpdate, TaskHost};

use crate::error::StatusError;
use crate::executor::{ensure_not_empty, SiteExecutor};
use crate::metrics::ReportOutcome;

/// Forwards writes to the first center that answers.
pub struct ForwardingExecutor {
    centers: Vec<HttpClient>,
}

impl ForwardingExecutor {
    /// Create a forwarder over `center_api` base URLs, tried in order.
    ///
    /// `timeout` bounds both the connect and the whole request against each
    /// center, so a center that stops answering moves on to the next one.
    pub fn new(center_api: &[String], timeout: Duration) -> Result<Self, StatusError> {
        let centers = center_api
            .iter()
            .map(|url| HttpClient::new(url, timeout))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { centers })
    }

    fn no_center() -> StatusError {
        StatusError::Configuration("no center API configured".to_string())
    }

    fn unreachable(&self, center: &HttpClient, path: &str, error: &ClientError) {
        warn!(
            center = %center.base_url(),
            path = %path,
            error = %error,
            "Center unreachable, trying next"
        );
    }

    async fn post<B>(&self, path: &str, body: &B) -> Result<(), StatusError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let mut last = None;
        for center in &self.centers {
            match center.post_json(path, body).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transport() => {
                    self.unreachable(center, path, &e);
                    last = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last.map_or_else(Self::no_center, StatusError::from))
    }

    async fn post_with_resp<B, T>(&self, path: &str, body: &B) -> Result<T, StatusError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned + Default,
    {
        let mut last = None;
        for center in &self.centers {
            match center.post_json_with_resp(path, body).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_transport() => {
                    self.unreachable(center, path, &e);
                    last = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last.map_or_else(Self::no_center, StatusError::from))
    }
}

#[async_trait]
impl SiteExecutor for ForwardingExecutor {
    async fn create(&self, record: &TaskHost) -> Result<(), StatusError> {
        self.post(TASK_HOST_PATH, record).await
    }

    async fn upserts(&self, records: &[TaskHost]) -> Result<HashMap<String, String>, StatusError> {
        ensure_not_empty(records, "upserts needs at least one record")?;
        self.post_with_resp(TASK_HOSTS_UPSERT_PATH, records).await
    }

    async fn bulk_start(&self, hosts: &[HostKey]) -> Result<i64, StatusError> {
        self.post_with_resp(TASK_HOSTS_RUN_PATH, hosts).await
    }

    async fn real_time_update_output(&self, update: &OutputUpdate) -> Result<(), StatusError> {
        self.post(TASK_HOST_OUTPUT_PATH, update).await
    }

    async fn mark_done(&self, report: &DoneReport) -> Result<ReportOutcome, StatusError> {
        self.post(MARK_DONE_PATH, report).await?;
        Ok(ReportOutcome::Forwarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Instant;

    use fleetrun_client::DEFAULT_TIMEOUT;
    use fleetrun_core::{HostStatus, TaskId};
    use tokio::net::TcpListener;

    use crate::config::Config;
    use crate::http::create_router;
    use crate::service::TaskHostService;
    use crate::state::AppState;

    async fn spawn_center() -> (Arc<AppState>, String) {
        let service = TaskHostService::from_config(&Config::default()).unwrap();
        let state = AppState::new(service);
        let router = create_router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (state, format!("http://{addr}"))
    }

    async fn dead_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    /// A center that accepts connections and never writes a byte back.
    async fn silent_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}")
    }

    fn forwarder(urls: &[String]) -> ForwardingExecutor {
        ForwardingExecutor::new(urls, DEFAULT_TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn test_forwards_create_and_mark_done() {
        let (center, url) = spawn_center().await;
        let forwarder = forwarder(&[url]);
        let id = TaskId::new(100);

        forwarder.create(&TaskHost::new(id, "h1")).await.unwrap();
        let clock = center
            .service
            .bulk_start(&[HostKey::new(id, "h1")])
            .await
            .unwrap();

        let report = DoneReport::new(id, clock, "h1", HostStatus::Success, "done", "");
        let outcome = forwarder.mark_done(&report).await.unwrap();

        assert_eq!(outcome, ReportOutcome::Forwarded);
        let record = center.service.get(id, "h1").await.unwrap().unwrap();
        assert_eq!(record.status, HostStatus::Success);
    }

    #[tokio::test]
    async fn test_forwards_bulk_start_and_output() {
        let (center, url) = spawn_center().await;
        let forwarder = forwarder(&[url]);
        let id = TaskId::new(100);
        forwarder.create(&TaskHost::new(id, "h1")).await.unwrap();

        let clock = forwarder.bulk_start(&[HostKey::new(id, "h1")]).await.unwrap();
        let update = OutputUpdate {
            id,
            host: "h1".to_string(),
            stdout: "partial".to_string(),
            stderr: String::new(),
        };
        forwarder.real_time_update_output(&update).await.unwrap();

        let record = center.service.get(id, "h1").await.unwrap().unwrap();
        assert_eq!(record.status, HostStatus::Running);
        assert_eq!(record.stdout, "partial");

        // The returned clock is the one the center stamped on the marker.
        let report = DoneReport::new(id, clock, "h1", HostStatus::Success, "", "");
        assert_eq!(
            forwarder.mark_done(&report).await.unwrap(),
            ReportOutcome::Forwarded
        );
        let record = center.service.get(id, "h1").await.unwrap().unwrap();
        assert_eq!(record.status, HostStatus::Success);
    }

    #[tokio::test]
    async fn test_falls_back_to_next_center() {
        let (center, url) = spawn_center().await;
        let forwarder = forwarder(&[dead_url().await, url]);
        let id = TaskId::new(7);

        let errors = forwarder
            .upserts(&[TaskHost::new(id, "h1").with_status(HostStatus::Failed)])
            .await
            .unwrap();

        assert!(errors.is_empty());
        let record = center.service.get(id, "h1").await.unwrap().unwrap();
        assert_eq!(record.status, HostStatus::Failed);
    }

    #[tokio::test]
    async fn test_silent_center_times_out_to_next() {
        let (center, url) = spawn_center().await;
        let forwarder =
            ForwardingExecutor::new(&[silent_url().await, url], Duration::from_millis(200))
                .unwrap();
        let id = TaskId::new(8);

        let started = Instant::now();
        forwarder.create(&TaskHost::new(id, "h1")).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(center.service.get(id, "h1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remote_error_is_not_retried() {
        let (_center, url) = spawn_center().await;
        let forwarder = forwarder(&[url]);
        let record = TaskHost::new(TaskId::new(1), "h1");

        forwarder.create(&record).await.unwrap();
        let err = forwarder.create(&record).await.unwrap_err();

        assert!(matches!(err, StatusError::Forwarding(ClientError::Remote(_))));
    }

    #[tokio::test]
    async fn test_all_centers_down() {
        let forwarder = forwarder(&[dead_url().await]);
        let err = forwarder
            .create(&TaskHost::new(TaskId::new(1), "h1"))
            .await
            .unwrap_err();

        assert!(matches!(err, StatusError::Forwarding(ref e) if e.is_transport()));
    }
}
