//! Code for loading and running a TorchScript matting model

use crate::config::{DeviceKind, ModelSettings};
use crate::matting;
use crate::model::{BackgroundRemover, ModelLoader};
use anyhow::{anyhow, ensure, Context, Result};
use image::{DynamicImage, GenericImageView, RgbaImage};
use std::path::Path;
use tch::{no_grad, Device, IValue, Kind, Tensor};
use tracing::*;

/// Load and run a TorchScript file
#[derive(Debug)]
pub struct TorchModel {
    /// The loaded torch model
    model: tch::jit::CModule,
    device: Device,
    input_size: u32,
}

impl TorchModel {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        let device = match settings.device {
            DeviceKind::Cpu => Device::Cpu,
            DeviceKind::Cuda => Device::Cuda(0),
            DeviceKind::Auto => Device::cuda_if_available(),
        };

        let mut model = tch::CModule::load_on_device(&settings.path, device)
            .with_context(|| format!("failed to load model from {}", settings.path.display()))?;
        model.set_eval();

        info!("loaded model {} on {device:?}", settings.path.display());

        Ok(TorchModel {
            model,
            device,
            input_size: settings.input_size,
        })
    }

    /// Run the model and return its foreground prediction as a
    /// `(values, width, height)` triple
    fn predict(&self, image: &DynamicImage) -> Result<(Vec<f32>, u32, u32)> {
        let side = i64::from(self.input_size);
        let input = Tensor::from_slice(&matting::preprocess(image, self.input_size))
            .view([1, 3, side, side])
            .to_device(self.device);

        let output = no_grad(|| self.model.forward_is(&[IValue::Tensor(input)]))?;

        // U2-Net returns the fused map first, followed by the side outputs
        let prediction = match output {
            IValue::Tensor(t) => t,
            IValue::Tuple(values) | IValue::GenericList(values) => match values.into_iter().next() {
                Some(IValue::Tensor(t)) => t,
                _ => return Err(anyhow!("model output does not start with a tensor")),
            },
            IValue::TensorList(tensors) => tensors
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("model returned an empty tensor list"))?,
            _ => return Err(anyhow!("model returned an unsupported output type")),
        };

        // [1, 1, H, W] -> [H, W]
        let prediction = prediction
            .select(1, 0)
            .squeeze_dim(0)
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .contiguous();
        let dims = prediction.size();
        ensure!(
            dims.len() == 2,
            "expected a [1, 1, H, W] prediction, got a tensor of rank {}",
            dims.len() + 2
        );

        let numel = prediction.numel();
        let mut values = vec![0f32; numel];
        prediction.copy_data(&mut values, numel);

        Ok((values, dims[1] as u32, dims[0] as u32))
    }
}

impl BackgroundRemover for TorchModel {
    fn remove(&mut self, image: &DynamicImage) -> Result<RgbaImage> {
        let (prediction, width, height) = self.predict(image)?;
        let (target_width, target_height) = image.dimensions();
        let mask = matting::alpha_mask(&prediction, width, height, target_width, target_height)?;
        Ok(matting::cutout(image, &mask))
    }
}

/// Loads `TorchModel` replicas from the configured file
#[derive(Debug, Clone)]
pub struct TorchLoader {
    settings: ModelSettings,
}

impl TorchLoader {
    pub fn new(settings: ModelSettings) -> Self {
        TorchLoader { settings }
    }

    pub fn path(&self) -> &Path {
        &self.settings.path
    }
}

impl ModelLoader for TorchLoader {
    fn load(&self) -> Result<Box<dyn BackgroundRemover>> {
        Ok(Box::new(TorchModel::new(&self.settings)?))
    }
}
