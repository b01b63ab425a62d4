// THEORY:
// Each detection is a pure, CPU-bound function of one image, so many images
// can be graded at once without any shared state. This module provides the
// scheduling around that: a dispatcher task hands jobs round-robin to a fixed
// pool of worker tasks, each worker runs the detector on tokio's blocking pool,
// and the result comes back over a oneshot channel.
//
// The detector itself is shared behind an `Arc<dyn Detector>`; it is immutable,
// so workers never contend for it. Results are collected in submission order
// and folded into a `BatchSummary`.

use crate::error::{VisionError, VisionResult};
use crate::pipeline::{DetectionOutcome, Detector, GradeCounts, Image};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub struct ImageJob {
    pub job_id: u64,
    pub image: Image,
    pub result_sender: oneshot::Sender<DetectionOutcome>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<ImageJob>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers (at least one). Must be called inside a tokio runtime.
    pub fn new(detector: Arc<dyn Detector>, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<ImageJob>();
        let mut workers = Vec::with_capacity(worker_count);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<ImageJob>())
            .unzip();

        // Dispatcher: round-robin over the workers.
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(job) = task_receiver.recv().await {
                if worker_senders[worker_idx].send(job).is_err() {
                    tracing::warn!(worker_idx, "worker channel closed, dropping job");
                }
                worker_idx = (worker_idx + 1) % worker_senders.len();
            }
        });

        for (worker_idx, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            let detector = Arc::clone(&detector);
            let worker = tokio::spawn(async move {
                while let Some(job) = worker_receiver.recv().await {
                    let ImageJob {
                        job_id,
                        image,
                        result_sender,
                    } = job;
                    let detector = Arc::clone(&detector);
                    let outcome = tokio::task::spawn_blocking(move || detector.detect(&image))
                        .await
                        .unwrap_or_else(|err| DetectionOutcome::failed(format!("detection task failed: {err}")));
                    tracing::debug!(worker_idx, job_id, completed = outcome.is_completed(), "job finished");
                    let _ = result_sender.send(outcome);
                }
            });
            workers.push(worker);
        }

        Self {
            task_sender,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn process_image(&self, job_id: u64, image: Image) -> VisionResult<DetectionOutcome> {
        let (result_sender, result_receiver) = oneshot::channel();
        let job = ImageJob {
            job_id,
            image,
            result_sender,
        };

        self.task_sender
            .send(job)
            .map_err(|_| VisionError::WorkerUnavailable("failed to send job to worker pool"))?;

        result_receiver
            .await
            .map_err(|_| VisionError::WorkerUnavailable("failed to receive result from worker"))
    }
}

/// Outcome of one image within a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub name: String,
    #[serde(flatten)]
    pub outcome: DetectionOutcome,
}

/// Per-image outcomes plus totals across the whole batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub items: Vec<BatchItem>,
    pub grade_counts: GradeCounts,
    pub total_eggs: usize,
    pub completed: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_items(items: Vec<BatchItem>) -> Self {
        let mut grade_counts = GradeCounts::default();
        let mut total_eggs = 0;
        let mut completed = 0;
        for item in &items {
            let report = item.outcome.report();
            grade_counts.merge(&report.grade_counts);
            total_eggs += report.total_eggs;
            if item.outcome.is_completed() {
                completed += 1;
            }
        }
        let failed = items.len() - completed;
        Self {
            items,
            grade_counts,
            total_eggs,
            completed,
            failed,
        }
    }
}

/// Grades many images concurrently on a `WorkerPool`.
pub struct BatchPipeline {
    worker_pool: WorkerPool,
}

impl BatchPipeline {
    /// One worker per logical CPU.
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self::with_workers(detector, num_cpus::get())
    }

    pub fn with_workers(detector: Arc<dyn Detector>, worker_count: usize) -> Self {
        Self {
            worker_pool: WorkerPool::new(detector, worker_count),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    /// Processes every `(name, image)` pair and returns results in submission order.
    pub async fn process_batch(&self, images: Vec<(String, Image)>) -> VisionResult<BatchSummary> {
        let (names, jobs): (Vec<_>, Vec<_>) = images
            .into_iter()
            .enumerate()
            .map(|(job_id, (name, image))| (name, self.worker_pool.process_image(job_id as u64, image)))
            .unzip();

        let outcomes = join_all(jobs).await;
        let items = names
            .into_iter()
            .zip(outcomes)
            .map(|(name, outcome)| Ok(BatchItem { name, outcome: outcome? }))
            .collect::<VisionResult<Vec<_>>>()?;

        let summary = BatchSummary::from_items(items);
        tracing::debug!(
            images = summary.items.len(),
            total_eggs = summary.total_eggs,
            failed = summary.failed,
            "batch finished"
        );
        Ok(summary)
    }
}
