//! The background removal capability, as seen by the worker pool

use anyhow::Result;
use image::{DynamicImage, RgbaImage};

/// A loaded model that strips the background from an image
///
/// Implementations need not be thread-safe: every replica lives behind its
/// worker's lock and runs one inference at a time.
pub trait BackgroundRemover: Send {
    /// Return `image` as RGBA with background pixels made transparent
    fn remove(&mut self, image: &DynamicImage) -> Result<RgbaImage>;
}

/// Produces model replicas. Called once per worker at warm-up, and again
/// on demand whenever a worker has no model yet.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn BackgroundRemover>>;
}
