// Worker: pops pending requests and publishes exactly one result per decoded request

mod context;
mod signals;

pub use context::{load_index, AppContext, PipelineError};
pub use signals::{Signal, SignalHandler};

use crate::config::Config;
use crate::queue::{
    decode_request, result_key, MalformedRequest, QueueClient, QueueError, Request, ResultPayload,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Queue names and loop pacing
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub request_list: String,
    pub result_prefix: String,
    pub idle_backoff: Duration,
    pub fault_backoff: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_list: config.queue.request_list.clone(),
            result_prefix: config.queue.result_prefix.clone(),
            idle_backoff: config.idle_backoff(),
            fault_backoff: config.fault_backoff(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            request_list: "sql_requests".to_string(),
            result_prefix: "result:".to_string(),
            idle_backoff: Duration::from_secs(2),
            fault_backoff: Duration::from_secs(1),
        }
    }
}

/// Infrastructure failure outside the per-request boundary
#[derive(Error, Debug)]
pub enum LoopFault {
    #[error("Failed to pop pending request: {0}")]
    Pop(#[source] QueueError),

    #[error("Failed to publish result for {request_id}: {source}")]
    Publish {
        request_id: String,
        #[source]
        source: QueueError,
    },
}

/// What one loop iteration did
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The queue was empty
    Idle,
    /// A popped item was malformed and discarded without a result
    Dropped(MalformedRequest),
    /// A result was written for the request
    Published { request_id: String, success: bool },
}

/// Counters for the worker's lifetime
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub dropped: u64,
    pub faults: u64,
}

/// Single-consumer control loop
///
/// Requests are handled one at a time in queue order. Every request that
/// decodes gets exactly one result written, success or error; malformed items
/// are logged and dropped.
pub struct RequestWorker {
    ctx: Arc<AppContext>,
    queue: Arc<dyn QueueClient>,
    settings: WorkerSettings,
    shutdown: watch::Receiver<bool>,
    stats: WorkerStats,
}

impl RequestWorker {
    pub fn new(
        ctx: Arc<AppContext>,
        queue: Arc<dyn QueueClient>,
        settings: WorkerSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            queue,
            settings,
            shutdown,
            stats: WorkerStats::default(),
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Run until the shutdown signal is raised
    pub async fn run(&mut self) -> WorkerStats {
        info!(
            "Worker started: polling '{}', publishing under '{}'",
            self.settings.request_list, self.settings.result_prefix
        );

        while !self.shutdown_requested() {
            let pause = match self.poll_once().await {
                Ok(PollOutcome::Idle) => Some(self.settings.idle_backoff),
                Ok(_) => None,
                Err(fault) => {
                    error!("Worker error: {}", fault);
                    Some(self.settings.fault_backoff)
                }
            };

            if let Some(duration) = pause {
                if self.sleep_or_shutdown(duration).await {
                    break;
                }
            }
        }

        info!(
            "Worker stopped: {} processed ({} ok, {} failed), {} dropped, {} faults",
            self.stats.processed,
            self.stats.succeeded,
            self.stats.failed,
            self.stats.dropped,
            self.stats.faults
        );

        self.stats.clone()
    }

    /// Pop at most one item and carry it through to a published result
    pub async fn poll_once(&mut self) -> Result<PollOutcome, LoopFault> {
        let item = match self.queue.pop(&self.settings.request_list).await {
            Ok(Some(item)) => item,
            Ok(None) => return Ok(PollOutcome::Idle),
            Err(e) => {
                self.stats.faults += 1;
                return Err(LoopFault::Pop(e));
            }
        };

        let request = match decode_request(&item) {
            Ok(request) => request,
            Err(reason) => {
                warn!("Invalid request format, dropping item: {}", reason);
                self.stats.dropped += 1;
                return Ok(PollOutcome::Dropped(reason));
            }
        };

        debug!("Processing request {}", request.id);

        let payload = self.process(&request).await;
        let success = payload.is_success();
        let key = result_key(&self.settings.result_prefix, &request.id);

        self.stats.processed += 1;
        if let Err(source) = self.queue.set(&key, &payload.to_json()).await {
            self.stats.faults += 1;
            return Err(LoopFault::Publish {
                request_id: request.id,
                source,
            });
        }

        if success {
            self.stats.succeeded += 1;
            info!("SQL generated for {}", request.id);
        } else {
            self.stats.failed += 1;
            if let ResultPayload::Error { error } = &payload {
                warn!("Error generating SQL for {}: {}", request.id, error);
            }
        }

        Ok(PollOutcome::Published {
            request_id: request.id,
            success,
        })
    }

    /// Never fails: every pipeline error becomes an error payload
    async fn process(&self, request: &Request) -> ResultPayload {
        let mut shutdown = self.shutdown.clone();

        let outcome = tokio::select! {
            result = self.ctx.generate_sql(&request.question, &request.schema) => result,
            _ = wait_for_shutdown(&mut shutdown) => Err(PipelineError::Cancelled),
        };

        match outcome {
            Ok(sql) => ResultPayload::sql(sql),
            Err(e) => ResultPayload::error(e.to_string()),
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Returns true when woken by shutdown rather than the timer
    async fn sleep_or_shutdown(&self, duration: Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = wait_for_shutdown(&mut shutdown) => true,
        }
    }
}

/// Resolves once shutdown is signalled; never resolves if the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationClient, GenerationError};
    use crate::index::tests::{example, sample_corpus, KeywordEmbedder};
    use crate::index::{CorpusIndex, IndexOptions, SharedIndex};
    use crate::queue::MemoryQueue;
    use async_trait::async_trait;

    struct CannedModel(Result<String, GenerationError>);

    #[async_trait]
    impl GenerationClient for CannedModel {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.0.clone()
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    struct StalledModel;

    #[async_trait]
    impl GenerationClient for StalledModel {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            std::future::pending().await
        }

        fn model_name(&self) -> &str {
            "stalled"
        }
    }

    fn context(model: Arc<dyn GenerationClient>) -> Arc<AppContext> {
        let index = CorpusIndex::build(
            sample_corpus(),
            Arc::new(KeywordEmbedder::new()),
            &IndexOptions::default(),
        )
        .unwrap();
        Arc::new(AppContext::new(SharedIndex::new(index), model))
    }

    fn settings() -> WorkerSettings {
        WorkerSettings {
            idle_backoff: Duration::from_millis(10),
            fault_backoff: Duration::from_millis(10),
            ..WorkerSettings::default()
        }
    }

    fn worker(
        model: Arc<dyn GenerationClient>,
        queue: Arc<MemoryQueue>,
    ) -> (RequestWorker, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (RequestWorker::new(context(model), queue, settings(), rx), tx)
    }

    const REQUEST: &str = r#"{"question":"count rows in t","schema":"t(x int)","id":"r1"}"#;

    #[tokio::test]
    async fn test_success_publishes_sql_once() {
        let queue = Arc::new(MemoryQueue::new());
        queue.push("sql_requests", REQUEST);
        let model = Arc::new(CannedModel(Ok("SELECT COUNT(*) FROM t; -- done".to_string())));
        let (mut worker, _tx) = worker(model, queue.clone());

        let outcome = worker.poll_once().await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Published {
                request_id: "r1".to_string(),
                success: true
            }
        );

        let writes = queue.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "result:r1");
        let value: serde_json::Value = serde_json::from_str(&writes[0].1).unwrap();
        assert_eq!(value, serde_json::json!({"sql": "SELECT COUNT(*) FROM t"}));
    }

    #[tokio::test]
    async fn test_generation_failure_publishes_error_once() {
        let queue = Arc::new(MemoryQueue::new());
        queue.push("sql_requests", REQUEST);
        let model = Arc::new(CannedModel(Err(GenerationError::failed("connection refused"))));
        let (mut worker, _tx) = worker(model, queue.clone());

        let outcome = worker.poll_once().await.unwrap();
        assert!(matches!(outcome, PollOutcome::Published { success: false, .. }));

        let writes = queue.writes();
        assert_eq!(writes.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&writes[0].1).unwrap();
        assert!(value.get("sql").is_none());
        assert!(value["error"].as_str().unwrap().contains("connection refused"));
        assert_eq!(worker.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_missing_id_is_dropped_without_result() {
        let queue = Arc::new(MemoryQueue::new());
        queue.push("sql_requests", r#"{"question":"q","schema":"s"}"#);
        queue.push("sql_requests", REQUEST);
        let model = Arc::new(CannedModel(Ok("SELECT 1".to_string())));
        let (mut worker, _tx) = worker(model, queue.clone());

        let outcome = worker.poll_once().await.unwrap();
        assert_eq!(outcome, PollOutcome::Dropped(MalformedRequest::MissingField("id")));
        assert!(queue.writes().is_empty());

        // The next item is still processed
        let outcome = worker.poll_once().await.unwrap();
        assert!(matches!(outcome, PollOutcome::Published { success: true, .. }));
        assert_eq!(queue.writes().len(), 1);
        assert_eq!(worker.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_empty_queue_is_idle() {
        let queue = Arc::new(MemoryQueue::new());
        let model = Arc::new(CannedModel(Ok("SELECT 1".to_string())));
        let (mut worker, _tx) = worker(model, queue.clone());

        assert_eq!(worker.poll_once().await.unwrap(), PollOutcome::Idle);
    }

    #[tokio::test]
    async fn test_pop_failure_is_a_loop_fault() {
        let queue = Arc::new(MemoryQueue::new());
        queue.fail_next_pops(1);
        let model = Arc::new(CannedModel(Ok("SELECT 1".to_string())));
        let (mut worker, _tx) = worker(model, queue.clone());

        assert!(matches!(worker.poll_once().await, Err(LoopFault::Pop(_))));
        assert_eq!(worker.stats().faults, 1);
    }

    #[tokio::test]
    async fn test_run_survives_faults_and_stops_on_shutdown() {
        let queue = Arc::new(MemoryQueue::new());
        queue.fail_next_pops(2);
        queue.push("sql_requests", "not json");
        queue.push("sql_requests", REQUEST);
        let model = Arc::new(CannedModel(Ok("SELECT 1".to_string())));
        let (mut worker, tx) = worker(model, queue.clone());

        let handle = tokio::spawn(async move { worker.run().await });

        for _ in 0..200 {
            if queue.get("result:r1").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();

        let stats = handle.await.unwrap();
        assert_eq!(stats.faults, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(queue.pending("sql_requests"), 0);
    }

    #[tokio::test]
    async fn test_shutdown_mid_generation_still_publishes() {
        let queue = Arc::new(MemoryQueue::new());
        queue.push("sql_requests", REQUEST);
        let (mut worker, tx) = worker(Arc::new(StalledModel), queue.clone());

        let handle = tokio::spawn(async move { worker.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let stats = handle.await.unwrap();
        assert_eq!(stats.failed, 1);

        let value: serde_json::Value =
            serde_json::from_str(&queue.get("result:r1").unwrap()).unwrap();
        assert!(value["error"].as_str().unwrap().contains("shutting down"));
    }

    #[tokio::test]
    async fn test_publish_failure_is_a_loop_fault() {
        let queue = Arc::new(MemoryQueue::new());
        queue.fail_next_sets(1);
        queue.push("sql_requests", REQUEST);
        queue.push(
            "sql_requests",
            r#"{"question":"sum col","schema":"t(x int)","id":"r2"}"#,
        );
        let model = Arc::new(CannedModel(Ok("SELECT 1".to_string())));
        let (mut worker, _tx) = worker(model, queue.clone());

        match worker.poll_once().await {
            Err(LoopFault::Publish { request_id, .. }) => assert_eq!(request_id, "r1"),
            other => panic!("expected publish fault, got {:?}", other),
        }
        assert_eq!(queue.get("result:r1"), None);

        let outcome = worker.poll_once().await.unwrap();
        assert!(matches!(outcome, PollOutcome::Published { success: true, .. }));
        assert!(queue.get("result:r2").is_some());
        assert_eq!(worker.stats().faults, 1);
        assert_eq!(worker.stats().succeeded, 1);
    }

    #[tokio::test]
    async fn test_run_survives_publish_fault() {
        let queue = Arc::new(MemoryQueue::new());
        queue.fail_next_sets(1);
        queue.push("sql_requests", REQUEST);
        queue.push(
            "sql_requests",
            r#"{"question":"sum col","schema":"t(x int)","id":"r2"}"#,
        );
        let model = Arc::new(CannedModel(Ok("SELECT 1".to_string())));
        let (mut worker, tx) = worker(model, queue.clone());

        let handle = tokio::spawn(async move { worker.run().await });
        for _ in 0..200 {
            if queue.get("result:r2").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();

        let stats = handle.await.unwrap();
        assert_eq!(stats.faults, 1);
        assert_eq!(stats.succeeded, 1);
        assert!(queue.get("result:r2").is_some());
    }

    #[tokio::test]
    async fn test_single_example_corpus_publishes_error() {
        let index = CorpusIndex::build(
            vec![example("0", "count rows", "SELECT COUNT(*) FROM t;")],
            Arc::new(KeywordEmbedder::new()),
            &IndexOptions::default(),
        )
        .unwrap();
        let model = Arc::new(CannedModel(Ok("SELECT 1".to_string())));
        let ctx = Arc::new(AppContext::new(SharedIndex::new(index), model));
        let queue = Arc::new(MemoryQueue::new());
        queue.push("sql_requests", REQUEST);
        let (_tx, rx) = watch::channel(false);
        let mut worker = RequestWorker::new(ctx, queue.clone(), settings(), rx);

        let outcome = worker.poll_once().await.unwrap();
        assert!(matches!(outcome, PollOutcome::Published { success: false, .. }));

        let value: serde_json::Value =
            serde_json::from_str(&queue.get("result:r1").unwrap()).unwrap();
        assert!(value.get("sql").is_none());
        assert!(value["error"].as_str().unwrap().contains("1 examples"));
    }
}
