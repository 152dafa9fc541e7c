//! The manager owns the pool of workers. It hands each inference request to
//! an idle worker, and holds requests back while every worker is busy, so no
//! model replica ever runs two inferences at once.

use crate::model::ModelLoader;
use crate::worker::{Worker, WorkerStatus};
use anyhow::{anyhow, Result};
use image::{DynamicImage, RgbaImage};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::*;

/// The worker manager. All workers live in this process and share one
/// `ModelLoader`.
#[derive(Debug)]
pub struct Manager {
    workers: Vec<Arc<Worker>>,

    /// One permit per worker
    permits: Arc<Semaphore>,
}

impl Manager {
    /// Create a pool of `size` workers. Models are not loaded until
    /// `warm_up` or the first request.
    pub fn new(loader: Arc<dyn ModelLoader>, size: usize) -> Self {
        let size = size.max(1);
        let workers = (0..size)
            .map(|id| Arc::new(Worker::new(id, loader.clone())))
            .collect();

        Manager {
            workers,
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    /// Load the model on every worker. Every worker is attempted; the first
    /// failure is returned.
    pub fn warm_up(&self) -> Result<()> {
        let mut first_err = None;
        for worker in &self.workers {
            match worker.load() {
                Ok(()) => debug!("worker {} warmed up", worker.id()),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Remove the background from `image` on the first idle worker, waiting
    /// for one if all are busy
    pub async fn remove_background(&self, image: DynamicImage) -> Result<RgbaImage> {
        let permit = self.permits.clone().acquire_owned().await?;
        let worker = self.claim_idle_worker()?;
        debug!("dispatching inference to worker {}", worker.id());

        // The permit moves with the blocking task, so a dropped request does
        // not free the worker while it is still computing
        let output = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            worker.run(&image)
        })
        .await??;

        Ok(output)
    }

    /// Get the statuses of all workers
    pub fn all_status(&self) -> Vec<(usize, WorkerStatus)> {
        self.workers
            .iter()
            .map(|worker| (worker.id(), worker.status()))
            .collect()
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    fn claim_idle_worker(&self) -> Result<Arc<Worker>> {
        self.workers
            .iter()
            .find(|worker| worker.try_claim())
            .cloned()
            .ok_or_else(|| anyhow!("no idle worker available"))
    }
}
