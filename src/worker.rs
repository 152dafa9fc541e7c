//! An inference worker owns one replica of the model and computes one
//! background removal at a time

use crate::model::{BackgroundRemover, ModelLoader};
use crate::util::lock;
use anyhow::{anyhow, Result};
use image::{DynamicImage, RgbaImage};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::*;

/// The current status of a worker
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum WorkerStatus {
    /// No model loaded yet
    Unloaded,

    /// Not computing inference
    Idle,

    /// Currently computing inference
    Working,

    /// The last model load failed; retried on the next request
    Error,
}

/// A worker runs inference on its own copy of the model. The model is
/// loaded at warm-up, or lazily by the first request that reaches the worker.
pub struct Worker {
    id: usize,
    loader: Arc<dyn ModelLoader>,
    model: Mutex<Option<Box<dyn BackgroundRemover>>>,
    status: Mutex<WorkerStatus>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

/// Marks the worker as failed if inference panics while it is busy
struct Busy<'a>(&'a Mutex<WorkerStatus>);

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            *lock(self.0) = WorkerStatus::Error;
        }
    }
}

impl Worker {
    pub fn new(id: usize, loader: Arc<dyn ModelLoader>) -> Self {
        Worker {
            id,
            loader,
            model: Mutex::new(None),
            status: Mutex::new(WorkerStatus::Unloaded),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn status(&self) -> WorkerStatus {
        *lock(&self.status)
    }

    /// Reserve the worker for one inference. Fails if it is already busy.
    pub(crate) fn try_claim(&self) -> bool {
        let mut status = lock(&self.status);
        if *status == WorkerStatus::Working {
            return false;
        }
        *status = WorkerStatus::Working;
        true
    }

    /// Load the model if it is not loaded yet
    pub fn load(&self) -> Result<()> {
        let mut slot = self.model_slot();
        let result = self.ensure_loaded(&mut slot).map(|_| ());

        let mut status = lock(&self.status);
        if *status != WorkerStatus::Working {
            *status = match result {
                Ok(()) => WorkerStatus::Idle,
                Err(_) => WorkerStatus::Error,
            };
        }
        result
    }

    /// Run background removal on a claimed worker, loading the model first
    /// if needed. Releases the claim when done.
    #[tracing::instrument(skip_all, fields(worker = self.id))]
    pub fn run(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let _busy = Busy(&self.status);
        let mut slot = self.model_slot();

        let result = self
            .ensure_loaded(&mut slot)
            .and_then(|model| model.remove(image));

        *lock(&self.status) = match slot.is_some() {
            true => WorkerStatus::Idle,
            false => WorkerStatus::Error,
        };
        result
    }

    fn ensure_loaded<'a>(
        &self,
        slot: &'a mut Option<Box<dyn BackgroundRemover>>,
    ) -> Result<&'a mut Box<dyn BackgroundRemover>> {
        if slot.is_none() {
            debug!("worker {} loading model", self.id);
            let model = self.loader.load().inspect_err(|e| {
                warn!("worker {} could not load the model: {e:#}", self.id);
            })?;
            info!("worker {} model ready", self.id);
            *slot = Some(model);
        }

        slot.as_mut().ok_or_else(|| anyhow!("worker {} has no model", self.id))
    }

    /// A model that panicked mid-inference may be left inconsistent, so a
    /// poisoned slot is emptied and the model reloaded on next use
    fn model_slot(&self) -> MutexGuard<'_, Option<Box<dyn BackgroundRemover>>> {
        self.model.lock().unwrap_or_else(|poisoned| {
            let mut slot = poisoned.into_inner();
            *slot = None;
            self.model.clear_poison();
            slot
        })
    }
}
