/// Per-channel mean of the ImageNet training set (RGB, unit range).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel standard deviation of the ImageNet training set (RGB, unit range).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Top-1 classification result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub probability: f32,
}

/// Numerically stable softmax. Empty input gives an empty output.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![0.0; logits.len()];
    }
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Highest-probability class. `None` for an empty distribution.
pub fn top1(probabilities: &[f32]) -> Option<Prediction> {
    probabilities
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(class_index, &probability)| Prediction {
            class_index,
            probability,
        })
}
