// THEORY:
// `ParallelPipeline` fans independent scenes out over a fixed pool of workers
// and gathers them back at a single barrier. Per-scene analysis shares no state
// between scenes, so the only coordination needed is the hand-off and the
// final ordering, which `collect_outcomes` already does by timestamp.
//
// A dispatcher task receives every `SceneTask` and deals them round-robin to
// the workers. Each worker runs the CPU-bound analysis on the blocking thread
// pool and answers through the task's oneshot channel. A scene that fails,
// panics or exceeds its time budget becomes a `SkippedScene`; the rest of the
// run is unaffected.

use crate::config::PipelineConfig;
use crate::error::{NhiError, Result};
use crate::pipeline::{
    collect_outcomes, RadianceFrame, SceneAnalysis, ScenePipeline, SeriesReport,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub struct SceneTask {
    pub timestamp: DateTime<Utc>,
    pub frame: RadianceFrame,
    pub result_sender: oneshot::Sender<Result<SceneAnalysis>>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<SceneTask>,
    dispatcher: tokio::task::JoinHandle<()>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers and their dispatcher. Must be called from
    /// inside a tokio runtime.
    pub fn new(pipeline: Arc<ScenePipeline>, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<SceneTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<SceneTask>())
            .unzip();

        // Spawn dispatcher
        let dispatcher = tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if let Err(mpsc::error::SendError(task)) = worker_senders[worker_idx].send(task) {
                    // The receiving worker is gone; the dropped reply reports it.
                    log::warn!("worker {worker_idx} stopped, dropping scene {}", task.timestamp);
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        // Spawn workers
        let workers = worker_receivers
            .into_iter()
            .map(|mut worker_receiver| {
                let worker_pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move {
                    while let Some(task) = worker_receiver.recv().await {
                        let result =
                            Self::process_scene_worker(&worker_pipeline, task.timestamp, task.frame)
                                .await;
                        // The requester may have timed out and gone away.
                        let _ = task.result_sender.send(result);
                    }
                })
            })
            .collect();

        Self {
            task_sender,
            dispatcher,
            workers,
        }
    }

    async fn process_scene_worker(
        pipeline: &Arc<ScenePipeline>,
        timestamp: DateTime<Utc>,
        frame: RadianceFrame,
    ) -> Result<SceneAnalysis> {
        let pipeline = Arc::clone(pipeline);
        tokio::task::spawn_blocking(move || pipeline.process_scene(timestamp, &frame))
            .await
            .map_err(|_| NhiError::WorkerUnavailable("scene analysis panicked"))?
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn process_scene(
        &self,
        timestamp: DateTime<Utc>,
        frame: RadianceFrame,
    ) -> Result<SceneAnalysis> {
        let (result_sender, result_receiver) = oneshot::channel();

        let task = SceneTask {
            timestamp,
            frame,
            result_sender,
        };

        self.task_sender
            .send(task)
            .map_err(|_| NhiError::WorkerUnavailable("failed to send task to worker pool"))?;

        result_receiver
            .await
            .map_err(|_| NhiError::WorkerUnavailable("failed to receive result from worker"))?
    }

    /// Closes the task queue and waits for every worker to drain.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        let _ = self.dispatcher.await;
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

pub struct ParallelPipeline {
    config: PipelineConfig,
    worker_pool: WorkerPool,
}

impl ParallelPipeline {
    /// Validates `config` and starts the worker pool.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let workers = config.workers();
        let pipeline = Arc::new(ScenePipeline::new(config.clone()));
        log::info!("starting parallel pipeline with {workers} workers");
        Ok(Self {
            config,
            worker_pool: WorkerPool::new(pipeline, workers),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    /// Analyses one scene on the pool, honoring the configured time budget.
    pub async fn process_scene(
        &self,
        timestamp: DateTime<Utc>,
        frame: RadianceFrame,
    ) -> Result<SceneAnalysis> {
        let work = self.worker_pool.process_scene(timestamp, frame);
        match self.config.scene_timeout_ms {
            Some(limit_ms) => tokio::time::timeout(Duration::from_millis(limit_ms), work)
                .await
                .map_err(|_| NhiError::SceneTimedOut { timestamp, limit_ms })?,
            None => work.await,
        }
    }

    /// Analyses every scene concurrently and aggregates the results.
    ///
    /// Produces the same series as `ScenePipeline::process_series` for the
    /// same input, whatever order the workers finish in.
    pub async fn process_series(
        &self,
        scenes: Vec<(DateTime<Utc>, RadianceFrame)>,
    ) -> Result<SeriesReport> {
        let pending = scenes.into_iter().map(|(timestamp, frame)| async move {
            let outcome = self.process_scene(timestamp, frame).await;
            (timestamp, outcome)
        });
        let outcomes = futures::future::join_all(pending).await;
        collect_outcomes(outcomes)
    }

    pub async fn shutdown(self) {
        self.worker_pool.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::grid::Grid;
    use chrono::TimeZone;

    fn frame(size: usize, bump: f64) -> RadianceFrame {
        let a = Grid::from_fn(size, size, |c| 10.0 + ((c.x + 2 * c.y) % 4) as f64 * 0.05);
        let b = Grid::filled(size, size, 20.0);
        let mut values = a.as_slice().to_vec();
        values[size * (size / 2) + size / 2] += bump;
        RadianceFrame::new(Grid::from_vec(size, size, values).unwrap(), b)
    }

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 7, 1, hour, 0, 0).unwrap()
    }

    fn config(workers: usize) -> PipelineConfig {
        PipelineConfig {
            worker_count: Some(workers),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_matches_sequential_pipeline() {
        let scenes: Vec<_> = (0..6)
            .map(|h| (ts(h), frame(9, if h % 2 == 0 { 400.0 } else { 0.0 })))
            .collect();

        let sequential = ScenePipeline::new(config(1)).process_series(scenes.clone()).unwrap();
        let parallel = ParallelPipeline::new(config(3)).unwrap();
        assert_eq!(parallel.worker_count(), 3);
        let report = parallel.process_series(scenes).await.unwrap();

        assert_eq!(report.series.records(), sequential.series.records());
        assert_eq!(report.flagged.len(), sequential.flagged.len());
        assert!(report.skipped.is_empty());
        parallel.shutdown().await;
    }

    #[tokio::test]
    async fn test_bad_scene_is_skipped() {
        let broken = RadianceFrame::new(Grid::filled(4, 4, 1.0), Grid::filled(4, 5, 1.0));
        let parallel = ParallelPipeline::new(config(2)).unwrap();
        let report = parallel
            .process_series(vec![
                (ts(1), frame(7, 0.0)),
                (ts(2), broken),
                (ts(3), frame(7, 0.0)),
            ])
            .await
            .unwrap();
        assert_eq!(report.series.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].timestamp, ts(2));
        assert!(report.skipped[0].reason.contains("channel_b"));
    }

    fn budget(workers: usize, limit_ms: u64) -> PipelineConfig {
        PipelineConfig {
            scene_timeout_ms: Some(limit_ms),
            ..config(workers)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scene_over_budget_times_out() {
        let parallel = ParallelPipeline::new(budget(1, 1)).unwrap();
        let result = parallel.process_scene(ts(4), frame(1024, 400.0)).await;
        assert!(matches!(
            result,
            Err(NhiError::SceneTimedOut { limit_ms: 1, timestamp }) if timestamp == ts(4)
        ));
        parallel.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timed_out_scene_is_skipped_and_others_kept() {
        // Round-robin puts the large scene alone on the second worker.
        let parallel = ParallelPipeline::new(budget(2, 50)).unwrap();
        let report = parallel
            .process_series(vec![
                (ts(5), frame(7, 0.0)),
                (ts(6), frame(1024, 400.0)),
                (ts(7), frame(7, 0.0)),
            ])
            .await
            .unwrap();

        let kept: Vec<_> = report.series.iter().map(|r| r.timestamp).collect();
        assert_eq!(kept, [ts(5), ts(7)]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].timestamp, ts(6));
        assert!(report.skipped[0].reason.contains("50 ms processing budget"));
        parallel.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_workers_is_rejected() {
        assert!(matches!(
            ParallelPipeline::new(config(0)),
            Err(NhiError::InvalidConfig { name: "worker_count", .. })
        ));
    }
}
