use ndarray::Array4;
use std::path::Path;
use std::sync::Mutex;
use tch::{CModule, Device, Kind, Tensor};

use super::model::{Backbone, InferenceError};

/// TorchScript classifier. Calls are serialized through the mutex since a
/// `CModule` is not safe for concurrent forward passes.
pub struct TorchScriptBackbone {
    module: Mutex<CModule>,
    device: Device,
}

impl TorchScriptBackbone {
    pub fn load(model_path: &Path) -> Result<Self, tch::TchError> {
        let device = Device::cuda_if_available();
        let module = CModule::load_on_device(model_path, device)?;
        log::info!("TorchScript module ready on {:?}", device);
        Ok(Self {
            module: Mutex::new(module),
            device,
        })
    }
}

impl Backbone for TorchScriptBackbone {
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let input = input.as_standard_layout();
        let data = input
            .as_slice()
            .ok_or_else(|| InferenceError::Backend("input tensor is not contiguous".to_string()))?;

        // NHWC -> NCHW
        let tensor = Tensor::from_slice(data)
            .view(shape.as_slice())
            .permute([0, 3, 1, 2])
            .to_device(self.device);

        let module = self
            .module
            .lock()
            .map_err(|_| InferenceError::Backend("model lock poisoned".to_string()))?;
        let output = tch::no_grad(|| module.forward_ts(&[tensor]))
            .map_err(|e| InferenceError::Backend(e.to_string()))?;

        let output_flat = output.to_kind(Kind::Float).to_device(Device::Cpu).view([-1]);
        let num_elements = output_flat.size()[0] as usize;
        let mut scores = vec![0.0f32; num_elements];
        output_flat.copy_data(&mut scores, num_elements);
        Ok(scores)
    }
}
