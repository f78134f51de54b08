use image::DynamicImage;
use ndarray::Array4;
use shared::Label;
use std::fmt::Display;
use std::path::Path;

use super::preprocess::preprocess;
use crate::error::StartupError;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("unsupported image with {0} channels")]
    UnsupportedChannels(u8),
    #[error("model produced {got} scores, expected {expected}")]
    UnexpectedOutput { got: usize, expected: usize },
    #[error("model produced no comparable score")]
    NoComparableScore,
    #[error("model error: {0}")]
    Backend(String),
}

/// Network that maps a preprocessed NHWC batch to one score per label.
pub trait Backbone: Send + Sync {
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;
}

/// Fixed-vocabulary classifier shared by every request handler.
pub struct InferenceModel {
    backbone: Box<dyn Backbone>,
}

impl InferenceModel {
    pub fn new(backbone: impl Backbone + 'static) -> Self {
        Self {
            backbone: Box::new(backbone),
        }
    }

    /// Checks that the weight artifact exists, then hands it to `loader`.
    pub fn load_with<B, F, E>(model_path: &Path, loader: F) -> Result<Self, StartupError>
    where
        B: Backbone + 'static,
        F: FnOnce(&Path) -> Result<B, E>,
        E: Display,
    {
        if !model_path.exists() {
            return Err(StartupError::WeightsMissing(model_path.to_path_buf()));
        }
        let backbone = loader(model_path).map_err(|e| StartupError::ModelLoad(e.to_string()))?;
        log::info!("Model loaded from {}", model_path.display());
        Ok(Self::new(backbone))
    }

    pub fn classify(&self, image: &DynamicImage) -> Result<Label, InferenceError> {
        let input = preprocess(image)?;
        let scores = self.backbone.forward(&input)?;
        if scores.len() != Label::ALL.len() {
            return Err(InferenceError::UnexpectedOutput {
                got: scores.len(),
                expected: Label::ALL.len(),
            });
        }
        argmax(&scores)
            .and_then(Label::from_index)
            .ok_or(InferenceError::NoComparableScore)
    }
}

/// Index of the largest score; the first one wins ties and NaN never wins.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use std::sync::{Arc, Mutex};

    struct FixedScores(Vec<f32>);

    impl Backbone for FixedScores {
        fn forward(&self, _input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct CapturingBackbone {
        seen: Arc<Mutex<Vec<Vec<usize>>>>,
    }

    impl Backbone for CapturingBackbone {
        fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            self.seen.lock().unwrap().push(input.shape().to_vec());
            Ok(vec![0.0, 0.0, 1.0, 0.0])
        }
    }

    fn rgb() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([10, 20, 30])))
    }

    #[test]
    fn argmax_prefers_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[f32::NAN, 0.3, 0.2]), Some(1));
        assert_eq!(argmax(&[-3.0, -1.0, -2.0]), Some(1));
        assert_eq!(argmax(&[f32::NAN]), None);
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn classify_maps_argmax_into_vocabulary() {
        let cases = [
            (vec![0.9, 0.05, 0.03, 0.02], Label::Covid19),
            (vec![0.1, 0.6, 0.2, 0.1], Label::Normal),
            (vec![0.1, 0.2, 0.6, 0.1], Label::Pneumonia),
            (vec![0.1, 0.1, 0.1, 0.7], Label::Tuberculosis),
            (vec![0.25, 0.25, 0.25, 0.25], Label::Covid19),
        ];
        for (scores, expected) in cases {
            let model = InferenceModel::new(FixedScores(scores));
            assert_eq!(model.classify(&rgb()).unwrap(), expected);
        }
    }

    #[test]
    fn wrong_score_count_is_an_error() {
        let model = InferenceModel::new(FixedScores(vec![0.1, 0.9]));
        let err = model.classify(&rgb()).unwrap_err();
        assert!(matches!(err, InferenceError::UnexpectedOutput { got: 2, expected: 4 }));
    }

    #[test]
    fn all_nan_scores_are_an_error() {
        let model = InferenceModel::new(FixedScores(vec![f32::NAN; 4]));
        assert!(matches!(
            model.classify(&rgb()),
            Err(InferenceError::NoComparableScore)
        ));
    }

    #[test]
    fn backbone_always_sees_three_channels() {
        let backbone = CapturingBackbone::default();
        let seen = Arc::clone(&backbone.seen);
        let model = InferenceModel::new(backbone);
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(20, 20, Luma([7])));
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 20, Rgba([1, 2, 3, 4])));

        assert_eq!(model.classify(&gray).unwrap(), Label::Pneumonia);
        assert_eq!(model.classify(&rgba).unwrap(), Label::Pneumonia);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|shape| shape == &[1, 224, 224, 3]));
    }

    #[test]
    fn missing_weights_fail_before_loading() {
        let path = Path::new("/nonexistent/weights.pt");
        let result = InferenceModel::load_with(path, |_| -> Result<FixedScores, String> {
            panic!("loader must not run without weights")
        });
        assert!(matches!(result, Err(StartupError::WeightsMissing(p)) if p == path));
    }

    #[test]
    fn loader_failure_is_a_startup_error() {
        let dir = std::env::temp_dir();
        let result = InferenceModel::load_with(&dir, |_| -> Result<FixedScores, String> {
            Err("corrupt archive".to_string())
        });
        assert!(matches!(result, Err(StartupError::ModelLoad(msg)) if msg == "corrupt archive"));
    }
}
