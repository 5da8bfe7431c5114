//! Batch video generation.
//!
//! A batch is an ordered list of briefs. [`process_batch`] walks the items one
//! at a time, hands each brief to a [`VideoRenderer`], and records the outcome
//! per item before writing an aggregate status onto the job. A failing item
//! never stops the rest of the batch, and re-running a failed batch only
//! touches the items that did not complete.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use courseforge_common::config::VideoConfig;
use courseforge_common::error::{ForgeError, ForgeResult};
use courseforge_common::models::video::{BatchStatus, VideoBatchItem, VideoBatchJob, VideoBrief};
use courseforge_db::repository::video_jobs;
use courseforge_db::Database;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ============================================================
// Rendering
// ============================================================

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("renderer returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

/// Turns one brief into a hosted video URL.
pub trait VideoRenderer: Send + Sync {
    fn render(&self, brief: &VideoBrief) -> impl Future<Output = Result<String, RenderError>> + Send;
}

/// Renderer that POSTs the brief to an HTTP render service.
///
/// The service answers `{ "video_url": "..." }` on success.
#[derive(Clone)]
pub struct HttpRenderer {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct RenderResponse {
    video_url: String,
}

impl HttpRenderer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("courseforge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &VideoConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            config.render_url.clone(),
            Duration::from_secs(config.render_timeout_secs),
        )
    }
}

impl VideoRenderer for HttpRenderer {
    async fn render(&self, brief: &VideoBrief) -> Result<String, RenderError> {
        let response = self.client.post(&self.url).json(brief).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RenderResponse = response.json().await?;
        if parsed.video_url.is_empty() {
            return Err(RenderError::Other("renderer returned an empty video_url".into()));
        }
        Ok(parsed.video_url)
    }
}

// ============================================================
// Persistence
// ============================================================

/// The slice of storage the batch processor needs.
pub trait VideoJobStore: Send + Sync {
    fn load_job(&self, job_id: Uuid) -> impl Future<Output = ForgeResult<Option<VideoBatchJob>>> + Send;

    /// Items in `position` order.
    fn load_items(&self, job_id: Uuid) -> impl Future<Output = ForgeResult<Vec<VideoBatchItem>>> + Send;

    /// Move the job into `processing`. False if it is not in a startable state.
    fn start_job(&self, job_id: Uuid) -> impl Future<Output = ForgeResult<bool>> + Send;

    fn update_item(
        &self,
        item_id: Uuid,
        status: BatchStatus,
        video_url: Option<&str>,
        error: Option<&str>,
    ) -> impl Future<Output = ForgeResult<()>> + Send;

    fn finish_job(
        &self,
        job_id: Uuid,
        status: BatchStatus,
        completed_items: i32,
        failed_items: i32,
        error: Option<&str>,
    ) -> impl Future<Output = ForgeResult<()>> + Send;

    /// Mark every job stuck in `processing` as failed with `error`.
    fn fail_interrupted(&self, error: &str) -> impl Future<Output = ForgeResult<Vec<Uuid>>> + Send;
}

/// [`VideoJobStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgVideoJobStore {
    db: Database,
}

impl PgVideoJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl VideoJobStore for PgVideoJobStore {
    async fn load_job(&self, job_id: Uuid) -> ForgeResult<Option<VideoBatchJob>> {
        Ok(video_jobs::find_job(&self.db.pg, job_id).await?)
    }

    async fn load_items(&self, job_id: Uuid) -> ForgeResult<Vec<VideoBatchItem>> {
        Ok(video_jobs::list_items(&self.db.pg, job_id).await?)
    }

    async fn start_job(&self, job_id: Uuid) -> ForgeResult<bool> {
        Ok(video_jobs::mark_job_processing(&self.db.pg, job_id).await?)
    }

    async fn update_item(
        &self,
        item_id: Uuid,
        status: BatchStatus,
        video_url: Option<&str>,
        error: Option<&str>,
    ) -> ForgeResult<()> {
        Ok(video_jobs::update_item(&self.db.pg, item_id, status, video_url, error).await?)
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: BatchStatus,
        completed_items: i32,
        failed_items: i32,
        error: Option<&str>,
    ) -> ForgeResult<()> {
        Ok(video_jobs::finish_job(&self.db.pg, job_id, status, completed_items, failed_items, error)
            .await?)
    }

    async fn fail_interrupted(&self, error: &str) -> ForgeResult<Vec<Uuid>> {
        Ok(video_jobs::fail_interrupted_jobs(&self.db.pg, error).await?)
    }
}

// ============================================================
// Processing
// ============================================================

/// Outcome of one [`process_batch`] run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub job_id: Uuid,
    pub status: BatchStatus,
    /// Items rendered during this run
    pub attempted: usize,
    /// Items complete after this run, including earlier runs
    pub completed: usize,
    /// Items still not complete after this run
    pub failed: usize,
}

/// Render every outstanding item of a batch, strictly one at a time.
pub async fn process_batch<S, R>(store: &S, renderer: &R, job_id: Uuid) -> ForgeResult<BatchSummary>
where
    S: VideoJobStore,
    R: VideoRenderer,
{
    let job = store
        .load_job(job_id)
        .await?
        .ok_or_else(|| ForgeError::not_found("Video batch"))?;

    if job.status == BatchStatus::Complete {
        debug!(job_id = %job_id, "Batch already complete, nothing to do");
        return Ok(BatchSummary {
            job_id,
            status: BatchStatus::Complete,
            attempted: 0,
            completed: job.completed_items.max(0) as usize,
            failed: 0,
        });
    }

    if !store.start_job(job_id).await? {
        return Err(ForgeError::Conflict {
            message: "Video batch is already processing".into(),
        });
    }

    info!(job_id = %job_id, total = job.total_items, "Processing video batch");

    match run_items(store, renderer, job_id).await {
        Ok(summary) => Ok(summary),
        Err(e) => {
            // Leave the job restartable rather than stuck in `processing`
            let message = e.to_string();
            error!(job_id = %job_id, error = %message, "Video batch aborted");
            if let Err(finish_err) = store
                .finish_job(
                    job_id,
                    BatchStatus::Failed,
                    job.completed_items,
                    job.failed_items,
                    Some(&message),
                )
                .await
            {
                warn!(job_id = %job_id, error = %finish_err, "Could not record batch failure");
            }
            Err(e)
        }
    }
}

async fn run_items<S, R>(store: &S, renderer: &R, job_id: Uuid) -> ForgeResult<BatchSummary>
where
    S: VideoJobStore,
    R: VideoRenderer,
{
    let items = store.load_items(job_id).await?;
    let total = items.len();
    let mut completed = items
        .iter()
        .filter(|item| item.status == BatchStatus::Complete)
        .count();
    let mut attempted = 0;

    // Items left `processing` by an interrupted run are picked up again too
    for item in items.iter().filter(|item| item.status != BatchStatus::Complete) {
        attempted += 1;
        store
            .update_item(item.id, BatchStatus::Processing, None, None)
            .await?;

        match renderer.render(&item.brief).await {
            Ok(video_url) => {
                store
                    .update_item(item.id, BatchStatus::Complete, Some(&video_url), None)
                    .await?;
                completed += 1;
                debug!(job_id = %job_id, item_id = %item.id, position = item.position, "Video rendered");
            }
            Err(e) => {
                let message = e.to_string();
                store
                    .update_item(item.id, BatchStatus::Failed, None, Some(&message))
                    .await?;
                warn!(
                    job_id = %job_id,
                    item_id = %item.id,
                    position = item.position,
                    error = %message,
                    "Video render failed"
                );
            }
        }
    }

    let failed = total - completed;
    let (status, error) = if failed == 0 {
        (BatchStatus::Complete, None)
    } else {
        (
            BatchStatus::Failed,
            Some(format!("{failed} of {total} items failed")),
        )
    };

    store
        .finish_job(job_id, status, completed as i32, failed as i32, error.as_deref())
        .await?;

    info!(
        job_id = %job_id,
        attempted,
        completed,
        failed,
        status = ?status,
        "Video batch finished"
    );

    Ok(BatchSummary {
        job_id,
        status,
        attempted,
        completed,
        failed,
    })
}

/// Error recorded on jobs whose run was cut short by a restart.
pub const INTERRUPTED_ERROR: &str = "Interrupted by server restart";

/// Release jobs left in `processing` by a previous process so they can be re-run.
///
/// Call once at startup, before any batch is spawned.
pub async fn recover_interrupted<S: VideoJobStore>(store: &S) -> ForgeResult<usize> {
    let reclaimed = store.fail_interrupted(INTERRUPTED_ERROR).await?;
    for job_id in &reclaimed {
        warn!(job_id = %job_id, "Reclaimed interrupted video batch");
    }
    Ok(reclaimed.len())
}

/// Run a batch on a background task against PostgreSQL.
pub fn spawn_batch<R>(db: Database, renderer: Arc<R>, job_id: Uuid) -> JoinHandle<()>
where
    R: VideoRenderer + 'static,
{
    tokio::spawn(async move {
        let store = PgVideoJobStore::new(db);
        if let Err(e) = process_batch(&store, renderer.as_ref(), job_id).await {
            error!(job_id = %job_id, error = %e, "Background video batch failed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::types::Json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        job: Mutex<Option<VideoBatchJob>>,
        items: Mutex<Vec<VideoBatchItem>>,
    }

    impl MemoryStore {
        fn with_briefs(titles: &[&str]) -> (Self, Uuid) {
            let job_id = Uuid::now_v7();
            let now = Utc::now();
            let job = VideoBatchJob {
                id: job_id,
                owner_id: Uuid::now_v7(),
                course_id: None,
                status: BatchStatus::Pending,
                total_items: titles.len() as i32,
                completed_items: 0,
                failed_items: 0,
                error: None,
                started_at: None,
                finished_at: None,
                created_at: now,
                updated_at: now,
            };
            let items = titles
                .iter()
                .enumerate()
                .map(|(position, title)| VideoBatchItem {
                    id: Uuid::now_v7(),
                    job_id,
                    position: position as i32,
                    brief: Json(VideoBrief {
                        title: title.to_string(),
                        script: format!("Script for {title}"),
                        avatar_id: None,
                        voice_id: None,
                    }),
                    status: BatchStatus::Pending,
                    video_url: None,
                    error: None,
                    updated_at: now,
                })
                .collect();
            let store = Self {
                job: Mutex::new(Some(job)),
                items: Mutex::new(items),
            };
            (store, job_id)
        }

        fn job(&self) -> VideoBatchJob {
            self.job.lock().unwrap().clone().unwrap()
        }

        fn statuses(&self) -> Vec<BatchStatus> {
            self.items.lock().unwrap().iter().map(|i| i.status).collect()
        }
    }

    impl VideoJobStore for MemoryStore {
        async fn load_job(&self, job_id: Uuid) -> ForgeResult<Option<VideoBatchJob>> {
            Ok(self.job.lock().unwrap().clone().filter(|j| j.id == job_id))
        }

        async fn load_items(&self, _job_id: Uuid) -> ForgeResult<Vec<VideoBatchItem>> {
            let mut items = self.items.lock().unwrap().clone();
            items.sort_by_key(|i| i.position);
            Ok(items)
        }

        async fn start_job(&self, _job_id: Uuid) -> ForgeResult<bool> {
            let mut guard = self.job.lock().unwrap();
            let job = guard.as_mut().unwrap();
            if !job.status.is_runnable() {
                return Ok(false);
            }
            job.status = BatchStatus::Processing;
            job.started_at = Some(Utc::now());
            job.error = None;
            Ok(true)
        }

        async fn update_item(
            &self,
            item_id: Uuid,
            status: BatchStatus,
            video_url: Option<&str>,
            error: Option<&str>,
        ) -> ForgeResult<()> {
            let mut items = self.items.lock().unwrap();
            let item = items.iter_mut().find(|i| i.id == item_id).unwrap();
            item.status = status;
            if let Some(url) = video_url {
                item.video_url = Some(url.to_string());
            }
            item.error = error.map(str::to_string);
            Ok(())
        }

        async fn finish_job(
            &self,
            _job_id: Uuid,
            status: BatchStatus,
            completed_items: i32,
            failed_items: i32,
            error: Option<&str>,
        ) -> ForgeResult<()> {
            let mut guard = self.job.lock().unwrap();
            let job = guard.as_mut().unwrap();
            job.status = status;
            job.completed_items = completed_items;
            job.failed_items = failed_items;
            job.error = error.map(str::to_string);
            job.finished_at = Some(Utc::now());
            Ok(())
        }

        async fn fail_interrupted(&self, error: &str) -> ForgeResult<Vec<Uuid>> {
            let mut guard = self.job.lock().unwrap();
            let job = guard.as_mut().unwrap();
            if job.status != BatchStatus::Processing {
                return Ok(Vec::new());
            }
            job.status = BatchStatus::Failed;
            job.error = Some(error.to_string());
            Ok(vec![job.id])
        }
    }

    /// Fails any brief whose title is in `failing`; records call order.
    #[derive(Default)]
    struct ScriptedRenderer {
        failing: Mutex<Vec<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRenderer {
        fn failing(titles: &[&str]) -> Self {
            Self {
                failing: Mutex::new(titles.iter().map(|t| t.to_string()).collect()),
                calls: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn heal(&self) {
            self.failing.lock().unwrap().clear();
        }
    }

    impl VideoRenderer for ScriptedRenderer {
        async fn render(&self, brief: &VideoBrief) -> Result<String, RenderError> {
            self.calls.lock().unwrap().push(brief.title.clone());
            if self.failing.lock().unwrap().contains(&brief.title) {
                return Err(RenderError::Other(format!("avatar unavailable for {}", brief.title)));
            }
            Ok(format!("https://cdn.example.com/{}.mp4", brief.title))
        }
    }

    #[tokio::test]
    async fn renders_items_in_position_order() {
        let (store, job_id) = MemoryStore::with_briefs(&["intro", "setup", "outro"]);
        let renderer = ScriptedRenderer::default();

        let summary = process_batch(&store, &renderer, job_id).await.unwrap();

        assert_eq!(renderer.calls(), vec!["intro", "setup", "outro"]);
        assert_eq!(summary.status, BatchStatus::Complete);
        assert_eq!((summary.attempted, summary.completed, summary.failed), (3, 3, 0));

        let job = store.job();
        assert_eq!(job.status, BatchStatus::Complete);
        assert_eq!(job.completed_items, 3);
        assert!(job.error.is_none());
        let items = store.items.lock().unwrap();
        assert_eq!(items[1].video_url.as_deref(), Some("https://cdn.example.com/setup.mp4"));
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_batch() {
        let (store, job_id) = MemoryStore::with_briefs(&["a", "b", "c"]);
        let renderer = ScriptedRenderer::failing(&["b"]);

        let summary = process_batch(&store, &renderer, job_id).await.unwrap();

        assert_eq!(renderer.calls(), vec!["a", "b", "c"]);
        assert_eq!(summary.status, BatchStatus::Failed);
        assert_eq!((summary.completed, summary.failed), (2, 1));
        assert_eq!(
            store.statuses(),
            vec![BatchStatus::Complete, BatchStatus::Failed, BatchStatus::Complete]
        );

        let job = store.job();
        assert_eq!(job.status, BatchStatus::Failed);
        assert_eq!(job.failed_items, 1);
        assert_eq!(job.error.as_deref(), Some("1 of 3 items failed"));
        let items = store.items.lock().unwrap();
        assert!(items[1].error.as_deref().unwrap().contains("avatar unavailable"));
    }

    #[tokio::test]
    async fn rerun_only_touches_failed_items() {
        let (store, job_id) = MemoryStore::with_briefs(&["a", "b", "c"]);
        let renderer = ScriptedRenderer::failing(&["b", "c"]);
        process_batch(&store, &renderer, job_id).await.unwrap();

        renderer.heal();
        let summary = process_batch(&store, &renderer, job_id).await.unwrap();

        assert_eq!(renderer.calls(), vec!["a", "b", "c", "b", "c"]);
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.status, BatchStatus::Complete);
        assert_eq!(store.job().completed_items, 3);
        assert!(store.job().error.is_none());
    }

    #[tokio::test]
    async fn complete_batch_is_a_no_op() {
        let (store, job_id) = MemoryStore::with_briefs(&["only"]);
        let renderer = ScriptedRenderer::default();
        process_batch(&store, &renderer, job_id).await.unwrap();

        let summary = process_batch(&store, &renderer, job_id).await.unwrap();

        assert_eq!(renderer.calls().len(), 1);
        assert_eq!(summary.attempted, 0);
        assert_eq!(summary.status, BatchStatus::Complete);
    }

    #[tokio::test]
    async fn missing_batch_is_not_found() {
        let store = MemoryStore::default();
        let renderer = ScriptedRenderer::default();

        let err = process_batch(&store, &renderer, Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, ForgeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn batch_already_processing_is_a_conflict() {
        let (store, job_id) = MemoryStore::with_briefs(&["a"]);
        store.job.lock().unwrap().as_mut().unwrap().status = BatchStatus::Processing;
        let renderer = ScriptedRenderer::default();

        let err = process_batch(&store, &renderer, job_id).await.unwrap_err();
        assert!(matches!(err, ForgeError::Conflict { .. }));
        assert!(renderer.calls().is_empty());
    }

    #[tokio::test]
    async fn batch_cut_short_by_a_restart_can_be_resumed() {
        let (store, job_id) = MemoryStore::with_briefs(&["a", "b", "c"]);
        {
            // State left behind by a process that died while rendering "b"
            store.job.lock().unwrap().as_mut().unwrap().status = BatchStatus::Processing;
            let mut items = store.items.lock().unwrap();
            items[0].status = BatchStatus::Complete;
            items[1].status = BatchStatus::Processing;
        }
        let renderer = ScriptedRenderer::default();

        let err = process_batch(&store, &renderer, job_id).await.unwrap_err();
        assert!(matches!(err, ForgeError::Conflict { .. }));

        assert_eq!(recover_interrupted(&store).await.unwrap(), 1);
        assert_eq!(store.job().status, BatchStatus::Failed);
        assert_eq!(store.job().error.as_deref(), Some(INTERRUPTED_ERROR));
        assert_eq!(recover_interrupted(&store).await.unwrap(), 0);

        let summary = process_batch(&store, &renderer, job_id).await.unwrap();
        assert_eq!(renderer.calls(), vec!["b", "c"]);
        assert_eq!(summary.status, BatchStatus::Complete);
        assert_eq!((summary.attempted, summary.completed), (2, 3));
    }
}
