//! Internal timestamp and pixel-buffer helpers for the FFmpeg backend.

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy pixel data from an RGB24 frame into a tightly-packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × 3),
/// which is stripped so the result fits [`image::RgbImage::from_raw`].
pub fn frame_to_rgb_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = (width as usize) * 3;
    let data = video_frame.data(0);

    if stride == row_bytes {
        data[..row_bytes * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
        }
        buffer
    }
}

/// Rescale a PTS value to a frame number.
pub fn pts_to_frame_number(pts: i64, time_base: Rational, frames_per_second: f64) -> usize {
    let seconds = pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64;
    (seconds * frames_per_second).round().max(0.0) as usize
}

/// Seek target for `frame_number` in AV_TIME_BASE (microseconds), as
/// expected by container-level `seek`.
pub fn frame_number_to_seek_timestamp(frame_number: usize, frames_per_second: f64) -> i64 {
    let seconds = frame_number as f64 / frames_per_second;
    (seconds * 1_000_000.0) as i64
}
