//! Backend REST API.

pub mod client;
pub mod error;
pub mod poll;
pub mod transport;

use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::model::{
    BatchRecord, CachedBatches, Compound, ProcessRequest, ProcessingResult, TaskHandle, TaskStatus,
    Template,
};
pub use client::ApiClient;
pub use error::ApiError;
use poll::{poll_until, PollConfig, PollStep};
pub use transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};

/// Where a set of batch records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSource {
    Cache,
    Processed,
}

#[derive(Debug, Clone)]
pub struct LoadedBatches {
    pub batches: Vec<BatchRecord>,
    pub source: BatchSource,
    pub last_updated: Option<String>,
}

impl LoadedBatches {
    /// Status line for the task pane.
    pub fn status_message(&self) -> String {
        match self.source {
            BatchSource::Cache => format!(
                "Found existing data: {} batches loaded from database. Last updated: {}",
                self.batches.len(),
                self.last_updated.as_deref().unwrap_or("unknown")
            ),
            BatchSource::Processed => format!(
                "Successfully processed and cached {} batches!",
                self.batches.len()
            ),
        }
    }
}

/// Typed endpoints on top of [`ApiClient`].
pub struct BackendApi {
    client: ApiClient,
    poll: PollConfig,
}

impl BackendApi {
    pub fn new(client: ApiClient, config: &AppConfig) -> Self {
        Self::with_poll(
            client,
            PollConfig {
                interval: config.poll_interval,
                max_polls: config.max_polls,
            },
        )
    }

    pub fn with_poll(client: ApiClient, poll: PollConfig) -> Self {
        Self { client, poll }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub async fn list_compounds(&self) -> Result<Vec<Compound>, ApiError> {
        let data: Option<Vec<Compound>> = self.client.get("/api/compounds", &[]).await?;
        Ok(data.unwrap_or_default())
    }

    pub async fn list_templates(&self, compound_id: &str) -> Result<Vec<Template>, ApiError> {
        let data: Option<Vec<Template>> = self
            .client
            .get("/api/templates", &[("compound_id", compound_id)])
            .await?;
        Ok(data.unwrap_or_default())
    }

    pub async fn check_cache(
        &self,
        compound_id: &str,
        template_id: &str,
    ) -> Result<Option<CachedBatches>, ApiError> {
        self.client
            .get(
                "/api/documents/check-cache",
                &[("compound_id", compound_id), ("template_id", template_id)],
            )
            .await
    }

    pub async fn clear_cache(&self, compound_id: &str, template_id: &str) -> Result<(), ApiError> {
        self.client
            .execute(
                Method::Delete,
                "/api/documents/clear-cache",
                &[("compound_id", compound_id), ("template_id", template_id)],
                None,
            )
            .await
            .and_then(ensure_success)
    }

    /// Synchronous processing of the compound's source directory.
    pub async fn process_directory(
        &self,
        request: &ProcessRequest,
    ) -> Result<ProcessingResult, ApiError> {
        let data: Option<ProcessingResult> = self
            .client
            .call(
                Method::Post,
                "/api/documents/process-directory",
                &[],
                Some(json!(request)),
            )
            .await?;
        Ok(data.unwrap_or_default())
    }

    pub async fn start_processing(&self, request: &ProcessRequest) -> Result<String, ApiError> {
        let handle: Option<TaskHandle> = self
            .client
            .call(
                Method::Post,
                "/api/documents/process-directory-async",
                &[],
                Some(json!(request)),
            )
            .await?;
        handle
            .map(|h| h.task_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Backend("Failed to start async processing".into()))
    }

    pub async fn task_status(&self, task_id: &str) -> Result<TaskStatus, ApiError> {
        let status: Option<TaskStatus> = self
            .client
            .get(&format!("/api/documents/task-status/{}", task_id), &[])
            .await?;
        status.ok_or_else(|| ApiError::Backend("Failed to get task status".into()))
    }

    pub async fn cancel_task(&self, task_id: &str) -> Result<(), ApiError> {
        self.client
            .execute(
                Method::Delete,
                &format!("/api/documents/cancel-task/{}", task_id),
                &[],
                None,
            )
            .await
            .and_then(ensure_success)
    }

    /// Poll a processing task until it succeeds, fails or runs out of polls.
    /// `on_progress` sees every `PROGRESS` update.
    pub async fn wait_for_task<P>(
        &self,
        task_id: &str,
        mut on_progress: P,
    ) -> Result<ProcessingResult, ApiError>
    where
        P: FnMut(u64, u64, &str),
    {
        let api = self;
        let outcome = poll_until(
            &self.poll,
            "task_status",
            move |_| {
                let status = api.task_status(task_id);
                async move {
                    Ok::<_, ApiError>(match status.await? {
                        TaskStatus::Success { result } => PollStep::Done(Ok(result)),
                        TaskStatus::Failure { error } => {
                            PollStep::Done(Err(error.unwrap_or_else(|| "Task failed".to_string())))
                        }
                        TaskStatus::Progress {
                            current,
                            total,
                            status,
                        } => PollStep::Pending(Some((current, total, status))),
                        TaskStatus::Pending | TaskStatus::Unknown => PollStep::Pending(None),
                    })
                }
            },
            |_, progress: Option<(u64, u64, String)>| {
                if let Some((current, total, status)) = progress {
                    on_progress(current, total, &status);
                }
            },
        )
        .await?;

        match outcome {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(ApiError::TaskFailed {
                task_id: task_id.to_string(),
                message,
            }),
            None => Err(ApiError::TaskTimeout {
                task_id: task_id.to_string(),
                polls: self.poll.max_polls,
            }),
        }
    }

    /// Start async processing and wait for it, cancelling the task on
    /// timeout.
    pub async fn process_async<P>(
        &self,
        request: &ProcessRequest,
        on_progress: P,
    ) -> Result<ProcessingResult, ApiError>
    where
        P: FnMut(u64, u64, &str),
    {
        let task_id = self.start_processing(request).await?;
        log(
            Level::Info,
            Domain::Api,
            "task_started",
            obj(&[("task_id", v_str(&task_id))]),
        );
        match self.wait_for_task(&task_id, on_progress).await {
            Err(err @ ApiError::TaskTimeout { .. }) => {
                if let Err(cancel_err) = self.cancel_task(&task_id).await {
                    log(
                        Level::Warn,
                        Domain::Api,
                        "task_cancel_failed",
                        obj(&[
                            ("task_id", v_str(&task_id)),
                            ("msg", v_str(&cancel_err.to_string())),
                        ]),
                    );
                }
                Err(err)
            }
            other => other,
        }
    }

    /// GET `/auth/status`. Returns the raw payload.
    pub async fn auth_status(&self) -> Result<Value, ApiError> {
        self.client.execute(Method::Get, "/auth/status", &[], None).await
    }

    pub async fn health(&self) -> Result<Value, ApiError> {
        self.client.execute(Method::Get, "/api/health", &[], None).await
    }

    /// Cached batches when the backend has any, otherwise process the source
    /// documents now.
    pub async fn load_batches(
        &self,
        compound_id: &str,
        template_id: &str,
    ) -> Result<LoadedBatches, ApiError> {
        if let Some(cached) = self.check_cache(compound_id, template_id).await? {
            if !cached.batch_data.is_empty() {
                log(
                    Level::Info,
                    Domain::Api,
                    "cache_hit",
                    obj(&[
                        ("compound_id", v_str(compound_id)),
                        ("template_id", v_str(template_id)),
                        ("batches", json!(cached.batch_data.len())),
                    ]),
                );
                return Ok(LoadedBatches {
                    batches: cached.batch_data,
                    source: BatchSource::Cache,
                    last_updated: cached.last_updated,
                });
            }
        }
        self.process(compound_id, template_id, false).await
    }

    /// Process regardless of what is cached, replacing the cache.
    pub async fn reprocess(
        &self,
        compound_id: &str,
        template_id: &str,
    ) -> Result<LoadedBatches, ApiError> {
        self.process(compound_id, template_id, true).await
    }

    async fn process(
        &self,
        compound_id: &str,
        template_id: &str,
        force_reprocess: bool,
    ) -> Result<LoadedBatches, ApiError> {
        let request = ProcessRequest {
            compound_id: compound_id.to_string(),
            template_id: template_id.to_string(),
            force_reprocess,
        };
        let result = self.process_directory(&request).await?;
        Ok(LoadedBatches {
            batches: result.batch_data,
            source: BatchSource::Processed,
            last_updated: None,
        })
    }
}

fn ensure_success(value: Value) -> Result<(), ApiError> {
    client::envelope_data::<Value>(value).map(|_| ())
}
