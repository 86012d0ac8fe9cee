//! Batch aggregation.
//!
//! - `FrameStream`: lazily loads and preprocesses one `FrameId` per pull.
//! - `Batches`: groups a stream of processed frames into fixed-size batches.
//!
//! Both are plain pull-based iterators. Nothing is read from disk until the
//! consumer asks for the next batch, and at most one batch of frames is held
//! in memory at a time.

use std::iter::FusedIterator;

use crate::error::{IntakeError, Result};
use crate::frame::{FrameId, ProcessedFrame};
use crate::loader::{FrameDecoder, FrameLoader};
use crate::preprocess::Preprocessor;

// ----------------------------------------------------------------------------
// Batch
// ----------------------------------------------------------------------------

/// Ordered, non-empty group of processed frames.
#[derive(Debug)]
pub struct Batch {
    frames: Vec<ProcessedFrame>,
    capacity: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false for batches produced by [`Batches`].
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True for every batch except a short final one.
    pub fn is_full(&self) -> bool {
        self.frames.len() == self.capacity
    }

    pub fn frames(&self) -> &[ProcessedFrame] {
        &self.frames
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProcessedFrame> {
        self.frames.iter()
    }

    pub fn into_frames(self) -> Vec<ProcessedFrame> {
        self.frames
    }

    /// Concatenate all frames into one contiguous buffer (`[n, ...frame shape]`).
    pub fn to_contiguous(&self) -> Vec<f32> {
        let per_frame = self.frames.first().map_or(0, |f| f.as_slice().len());
        let mut out = Vec::with_capacity(per_frame * self.frames.len());
        for frame in &self.frames {
            out.extend_from_slice(frame.as_slice());
        }
        out
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a ProcessedFrame;
    type IntoIter = std::slice::Iter<'a, ProcessedFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

// ----------------------------------------------------------------------------
// Batches: the aggregator
// ----------------------------------------------------------------------------

/// Pull-based batch aggregator.
///
/// Emits a batch every `capacity` frames and flushes the remainder when the
/// input ends. A fatal input error is yielded once; the iterator is finished
/// afterwards and any partially filled batch is discarded.
pub struct Batches<I> {
    frames: I,
    capacity: usize,
    finished: bool,
    emitted: u64,
}

impl<I> Batches<I>
where
    I: Iterator<Item = Result<ProcessedFrame>>,
{
    pub fn new(frames: I, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(IntakeError::Config(
                "batch size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            frames,
            capacity,
            finished: false,
            emitted: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of batches yielded so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// The underlying frame iterator.
    pub fn source(&self) -> &I {
        &self.frames
    }
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = Result<ProcessedFrame>>,
{
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut acc = Vec::with_capacity(self.capacity);
        while acc.len() < self.capacity {
            match self.frames.next() {
                Some(Ok(frame)) => acc.push(frame),
                Some(Err(err)) => {
                    self.finished = true;
                    if !acc.is_empty() {
                        log::debug!(
                            "Batches: discarding {} buffered frames after fatal error",
                            acc.len()
                        );
                    }
                    return Some(Err(err));
                }
                None => {
                    self.finished = true;
                    break;
                }
            }
        }

        if acc.is_empty() {
            return None;
        }
        self.emitted += 1;
        Some(Ok(Batch {
            frames: acc,
            capacity: self.capacity,
        }))
    }
}

impl<I> FusedIterator for Batches<I> where I: Iterator<Item = Result<ProcessedFrame>> {}

/// Batch already-processed frames.
pub fn batch_frames<I>(
    frames: I,
    capacity: usize,
) -> Result<Batches<std::iter::Map<I::IntoIter, fn(ProcessedFrame) -> Result<ProcessedFrame>>>>
where
    I: IntoIterator<Item = ProcessedFrame>,
{
    let wrap: fn(ProcessedFrame) -> Result<ProcessedFrame> = Ok;
    Batches::new(frames.into_iter().map(wrap), capacity)
}

// ----------------------------------------------------------------------------
// FrameStream: lazy load + preprocess
// ----------------------------------------------------------------------------

/// Lazily loads and preprocesses frames in identifier order.
///
/// Frames skipped under the lenient decode policy are not yielded; they are
/// only counted in [`skipped`](Self::skipped).
pub struct FrameStream<'a, D> {
    ids: std::vec::IntoIter<FrameId>,
    loader: &'a FrameLoader<D>,
    preprocessor: &'a Preprocessor,
    loaded: u64,
    skipped: u64,
    failed: bool,
}

impl<'a, D: FrameDecoder> FrameStream<'a, D> {
    pub fn new(
        ids: Vec<FrameId>,
        loader: &'a FrameLoader<D>,
        preprocessor: &'a Preprocessor,
    ) -> Self {
        Self {
            ids: ids.into_iter(),
            loader,
            preprocessor,
            loaded: 0,
            skipped: 0,
            failed: false,
        }
    }

    pub fn loaded(&self) -> u64 {
        self.loaded
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Identifiers not pulled yet.
    pub fn remaining(&self) -> usize {
        self.ids.len()
    }
}

impl<D: FrameDecoder> Iterator for FrameStream<'_, D> {
    type Item = Result<ProcessedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        // Strict mode: nothing after a fatal decode error is loaded.
        if self.failed {
            return None;
        }
        for id in self.ids.by_ref() {
            match self.loader.load(&id) {
                Ok(Some(raw)) => {
                    self.loaded += 1;
                    return Some(Ok(self.preprocessor.process(&raw)));
                }
                Ok(None) => self.skipped += 1,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        (0, Some(self.ids.len()))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
