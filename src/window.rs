//! Positive and negative frame window selection.
//!
//! Every sample draws two windows of `num_frames` consecutive frames from the
//! same video: the *positive* window is the training target, the *negative*
//! window supplies reference identity and pose. The negative start never lies
//! strictly within one window length of the positive start.

use std::ops::{Range, RangeInclusive};

use rand::Rng;

/// The two windows drawn for one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameWindows {
    /// First frame of the positive window.
    pub start_index: usize,
    /// Frame indices of the positive window.
    pub positive: Vec<usize>,
    /// Frame indices of the negative (reference) window.
    pub negative: Vec<usize>,
}

impl FrameWindows {
    /// First frame of the negative window.
    pub fn negative_start(&self) -> usize {
        self.negative[0]
    }
}

/// Draws [`FrameWindows`] for a fixed window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSampler {
    num_frames: usize,
}

impl WindowSampler {
    /// Create a sampler for windows of `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        Self { num_frames }
    }

    /// Window length in frames.
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Shortest video the sampler accepts: three windows.
    pub fn min_frame_count(&self) -> usize {
        3 * self.num_frames
    }

    /// Inclusive range the positive start is drawn from. Half a window of
    /// margin is kept at both ends.
    ///
    /// Returns `None` when `total_frames` cannot hold a window plus both
    /// margins.
    pub fn positive_start_range(&self, total_frames: usize) -> Option<RangeInclusive<usize>> {
        let half = self.num_frames / 2;
        let last = total_frames.checked_sub(self.num_frames + half)?;
        (half <= last).then_some(half..=last)
    }

    /// Draw a positive and a negative window from a video of `total_frames`
    /// frames. Returns `None` when the video is shorter than
    /// [`min_frame_count`](Self::min_frame_count).
    ///
    /// The negative start is uniform over every start in `[0, T - N]` that
    /// satisfies `s⁻ <= s⁺ - N || s⁻ >= s⁺ + N`. The valid set is enumerated
    /// instead of rejection-sampled, so the draw always terminates.
    pub fn sample<R: Rng + ?Sized>(&self, total_frames: usize, rng: &mut R) -> Option<FrameWindows> {
        if self.num_frames == 0 || total_frames < self.min_frame_count() {
            return None;
        }

        let start_index = rng.gen_range(self.positive_start_range(total_frames)?);
        let negative_start = self.draw_negative_start(start_index, total_frames, rng);

        Some(FrameWindows {
            start_index,
            positive: self.window(start_index).collect(),
            negative: self.window(negative_start).collect(),
        })
    }

    /// Returns `true` if `negative_start` is far enough from `positive_start`.
    pub fn is_separated(&self, positive_start: usize, negative_start: usize) -> bool {
        negative_start + self.num_frames <= positive_start
            || negative_start >= positive_start + self.num_frames
    }

    fn window(&self, start: usize) -> Range<usize> {
        start..start + self.num_frames
    }

    fn draw_negative_start<R: Rng + ?Sized>(
        &self,
        positive_start: usize,
        total_frames: usize,
        rng: &mut R,
    ) -> usize {
        let last_start = total_frames - self.num_frames;

        // [0, s⁺ - N]
        let below = if positive_start >= self.num_frames {
            positive_start - self.num_frames + 1
        } else {
            0
        };
        // [s⁺ + N, T - N]
        let above_first = positive_start + self.num_frames;
        let above = if above_first <= last_start {
            last_start - above_first + 1
        } else {
            0
        };

        // Non-empty whenever T >= 3N.
        let pick = rng.gen_range(0..below + above);
        if pick < below {
            pick
        } else {
            above_first + (pick - below)
        }
    }
}
