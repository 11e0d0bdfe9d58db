//! FFmpeg-backed decoding.
//!
//! [`FfmpegBackend`] implements [`MediaBackend`] on top of
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next). Every
//! [`open_video`](MediaBackend::open_video) call opens a private demuxer, so
//! nothing is shared between workers.
//!
//! FFmpeg's own console logging is separate from the `log` crate; use
//! [`FfmpegBackend::with_log_level`] to quiet it.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use ffmpeg_next::{
    ChannelLayout, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, Sample, context::Input, sample::Type as SampleType},
    frame::{Audio as AudioFrame, Video as VideoFrame},
    media::Type,
    software::{
        resampling::Context as ResamplingContext,
        scaling::{Context as ScalingContext, Flags as ScalingFlags},
    },
    util::log::Level,
};
use image::RgbImage;

use crate::{
    conversion,
    error::DatasetError,
    media::{DecodeContext, FrameBatch, MediaBackend, VideoReader},
};

/// Decodes videos and audio tracks with FFmpeg.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    /// Initialise FFmpeg (idempotent).
    pub fn new() -> Result<Self, DatasetError> {
        ffmpeg_next::init()?;
        Ok(Self)
    }

    /// Set FFmpeg's internal console log level.
    #[must_use]
    pub fn with_log_level(self, level: Level) -> Self {
        ffmpeg_next::util::log::set_level(level);
        self
    }
}

impl MediaBackend for FfmpegBackend {
    type Video = FfmpegVideo;

    fn open_video(&self, path: &Path, context: DecodeContext) -> Result<FfmpegVideo, DatasetError> {
        log::debug!(
            "Worker {} opening {}",
            context.worker_id,
            path.display()
        );
        FfmpegVideo::open(path)
    }

    fn read_audio(
        &self,
        path: &Path,
        context: DecodeContext,
        sample_rate: u32,
    ) -> Result<Vec<f32>, DatasetError> {
        log::debug!(
            "Worker {} decoding audio of {} at {sample_rate} Hz",
            context.worker_id,
            path.display()
        );
        decode_audio(path, sample_rate)
    }
}

/// An opened video stream.
pub struct FfmpegVideo {
    input_context: Input,
    stream_index: usize,
    time_base: Rational,
    frames_per_second: f64,
    frame_count: usize,
    width: u32,
    height: u32,
    path: PathBuf,
}

impl FfmpegVideo {
    /// Open the best video stream of `path`.
    pub fn open(path: &Path) -> Result<Self, DatasetError> {
        let decode_error = |reason: String| DatasetError::Decode {
            path: path.to_path_buf(),
            reason,
        };

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| decode_error(error.to_string()))?;
        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or_else(|| decode_error("no video stream".to_string()))?;

        let stream_index = stream.index();
        let time_base = stream.time_base();

        let frame_rate = stream.avg_frame_rate();
        let frames_per_second = if frame_rate.denominator() != 0 {
            frame_rate.numerator() as f64 / frame_rate.denominator() as f64
        } else {
            let rate = stream.rate();
            if rate.denominator() != 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            }
        };
        if frames_per_second <= 0.0 {
            return Err(decode_error("unknown frame rate".to_string()));
        }

        let frame_count = if stream.frames() > 0 {
            stream.frames() as usize
        } else {
            let duration_seconds = input_context.duration().max(0) as f64 / 1_000_000.0;
            (duration_seconds * frames_per_second) as usize
        };

        let decoder = CodecContext::from_parameters(stream.parameters())?
            .decoder()
            .video()?;
        let width = decoder.width();
        let height = decoder.height();

        Ok(Self {
            input_context,
            stream_index,
            time_base,
            frames_per_second,
            frame_count,
            width,
            height,
            path: path.to_path_buf(),
        })
    }

    /// Average frame rate of the stream.
    pub fn frames_per_second(&self) -> f64 {
        self.frames_per_second
    }

    /// Frame dimensions `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn new_decoder(&self) -> Result<(VideoDecoder, ScalingContext), DatasetError> {
        let stream = self
            .input_context
            .stream(self.stream_index)
            .ok_or_else(|| DatasetError::Decode {
                path: self.path.clone(),
                reason: "video stream disappeared".to_string(),
            })?;
        let decoder = CodecContext::from_parameters(stream.parameters())?
            .decoder()
            .video()?;
        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            self.width,
            self.height,
            ScalingFlags::BILINEAR,
        )?;
        Ok((decoder, scaler))
    }
}

/// Stream properties needed while decoding a batch.
struct StreamGeometry {
    time_base: Rational,
    frames_per_second: f64,
    width: u32,
    height: u32,
}

/// Decoding state for one [`FfmpegVideo::get_batch`] call.
struct BatchCollector<'a> {
    path: &'a Path,
    geometry: StreamGeometry,
    targets: &'a [usize],
    cursor: usize,
    frames: HashMap<usize, RgbImage>,
    rgb_frame: VideoFrame,
}

impl BatchCollector<'_> {
    fn is_done(&self) -> bool {
        self.cursor >= self.targets.len()
    }

    /// Pull every frame the decoder has ready, keeping the targeted ones.
    fn drain(
        &mut self,
        decoder: &mut VideoDecoder,
        scaler: &mut ScalingContext,
    ) -> Result<(), DatasetError> {
        let geometry = &self.geometry;
        let mut decoded_frame = VideoFrame::empty();
        while !self.is_done() && decoder.receive_frame(&mut decoded_frame).is_ok() {
            let pts = decoded_frame.pts().unwrap_or(0);
            let frame_number = conversion::pts_to_frame_number(
                pts,
                geometry.time_base,
                geometry.frames_per_second,
            );

            // A seek can land past a target; those frames are reported missing.
            while !self.is_done() && self.targets[self.cursor] < frame_number {
                self.cursor += 1;
            }

            if !self.is_done() && self.targets[self.cursor] == frame_number {
                scaler.run(&decoded_frame, &mut self.rgb_frame)?;
                let buffer = conversion::frame_to_rgb_buffer(
                    &self.rgb_frame,
                    geometry.width,
                    geometry.height,
                );
                let image = RgbImage::from_raw(geometry.width, geometry.height, buffer)
                    .ok_or_else(|| DatasetError::Decode {
                        path: self.path.to_path_buf(),
                        reason: "decoded frame has unexpected size".to_string(),
                    })?;
                self.frames.insert(frame_number, image);
                self.cursor += 1;
            }
        }
        Ok(())
    }
}

impl VideoReader for FfmpegVideo {
    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn get_batch(&mut self, indices: &[usize]) -> Result<FrameBatch, DatasetError> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let mut targets = indices.to_vec();
        targets.sort_unstable();
        targets.dedup();

        let (mut decoder, mut scaler) = self.new_decoder()?;
        self.seek(targets[0])?;

        let path = self.path.clone();
        let mut collector = BatchCollector {
            path: &path,
            geometry: StreamGeometry {
                time_base: self.time_base,
                frames_per_second: self.frames_per_second,
                width: self.width,
                height: self.height,
            },
            targets: &targets,
            cursor: 0,
            frames: HashMap::with_capacity(targets.len()),
            rgb_frame: VideoFrame::empty(),
        };

        let stream_index = self.stream_index;
        for (stream, packet) in self.input_context.packets() {
            if stream.index() != stream_index {
                continue;
            }
            decoder.send_packet(&packet)?;
            collector.drain(&mut decoder, &mut scaler)?;
            if collector.is_done() {
                break;
            }
        }

        if !collector.is_done() {
            decoder.send_eof()?;
            collector.drain(&mut decoder, &mut scaler)?;
        }

        let frames = collector.frames;
        indices
            .iter()
            .map(|index| {
                frames.get(index).cloned().ok_or_else(|| DatasetError::Decode {
                    path: path.clone(),
                    reason: format!("frame {index} could not be decoded"),
                })
            })
            .collect()
    }

    fn seek(&mut self, frame: usize) -> Result<(), DatasetError> {
        let timestamp = conversion::frame_number_to_seek_timestamp(frame, self.frames_per_second);
        self.input_context.seek(timestamp, ..timestamp)?;
        Ok(())
    }
}

/// Decode the best audio stream of `path` to mono `f32` at `sample_rate`.
fn decode_audio(path: &Path, sample_rate: u32) -> Result<Vec<f32>, DatasetError> {
    let decode_error = |reason: String| DatasetError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let mut input_context =
        ffmpeg_next::format::input(&path).map_err(|error| decode_error(error.to_string()))?;
    let stream = input_context
        .streams()
        .best(Type::Audio)
        .ok_or_else(|| decode_error("no audio stream".to_string()))?;
    let stream_index = stream.index();

    let mut decoder = CodecContext::from_parameters(stream.parameters())?
        .decoder()
        .audio()
        .map_err(|error| decode_error(format!("failed to create audio decoder: {error}")))?;

    let mut resampler = ResamplingContext::get(
        decoder.format(),
        decoder.channel_layout(),
        decoder.rate(),
        Sample::F32(SampleType::Packed),
        ChannelLayout::MONO,
        sample_rate,
    )
    .map_err(|error| decode_error(format!("failed to create resampler: {error}")))?;

    let mut samples = Vec::new();
    let mut decoded_frame = AudioFrame::empty();
    let mut resampled_frame = AudioFrame::empty();

    let mut drain = |decoder: &mut ffmpeg_next::decoder::Audio,
                     samples: &mut Vec<f32>|
     -> Result<(), DatasetError> {
        while decoder.receive_frame(&mut decoded_frame).is_ok() {
            resampler.run(&decoded_frame, &mut resampled_frame)?;
            samples.extend_from_slice(&resampled_frame.plane::<f32>(0)[..resampled_frame.samples()]);
        }
        Ok(())
    };

    for (stream, packet) in input_context.packets() {
        if stream.index() != stream_index {
            continue;
        }
        decoder.send_packet(&packet)?;
        drain(&mut decoder, &mut samples)?;
    }
    decoder.send_eof()?;
    drain(&mut decoder, &mut samples)?;

    Ok(samples)
}
