pub mod model;
pub mod preprocess;
#[cfg(feature = "torch")]
pub mod torch;

pub use model::{Backbone, InferenceError, InferenceModel};
pub use preprocess::{INPUT_SIZE, preprocess};
#[cfg(feature = "torch")]
pub use torch::TorchScriptBackbone;
