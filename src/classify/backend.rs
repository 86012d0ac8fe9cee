use anyhow::Result;

use crate::batch::Batch;
use crate::classify::result::Prediction;
use crate::frame::ProcessedFrame;

/// Downstream consumer of processed frames.
///
/// Implementations must return quickly enough not to starve the admission
/// sampler in live mode.
pub trait Classifier {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Classify one frame.
    fn classify(&mut self, frame: &ProcessedFrame) -> Result<Prediction>;

    /// Classify every frame of a batch, in order.
    fn classify_batch(&mut self, batch: &Batch) -> Result<Vec<Prediction>> {
        batch.iter().map(|frame| self.classify(frame)).collect()
    }

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
