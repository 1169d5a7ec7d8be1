// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Decoders turning reassembled track samples into raw frames.
//!
//! Audio is Opus and decoded in-process. Video is VP8 and handed to an
//! `ffmpeg` child process per track: complete VP8 frames go in as an IVF
//! stream on stdin, decoded pictures come back as yuv4mpegpipe on stdout.

use anyhow::{bail, Context, Result};
use compositor::VideoFrame;
use log::trace;
use std::process::Stdio;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, ChildStdout, Command},
};

/// Longest possible Opus frame: 120 ms at 48 kHz.
const MAX_OPUS_SAMPLES: usize = 5760;

/// Stateful Opus decoder producing 48 kHz interleaved stereo S16.
pub struct AudioDecoder {
    inner: opus::Decoder,
}

impl std::fmt::Debug for AudioDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDecoder").finish()
    }
}

impl AudioDecoder {
    pub fn new() -> Result<Self> {
        let inner = opus::Decoder::new(48_000, opus::Channels::Stereo)
            .context("failed to create opus decoder")?;

        Ok(Self { inner })
    }

    /// Decode one Opus packet.
    pub fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>> {
        let mut samples = vec![0i16; MAX_OPUS_SAMPLES * 2];
        let frames = self
            .inner
            .decode(payload, &mut samples, false)
            .context("opus decode failed")?;
        samples.truncate(frames * 2);

        Ok(samples)
    }
}

/// Width and height from a VP8 keyframe header.
///
/// Delta frames carry no dimensions; `None` also means "not a keyframe".
#[must_use]
pub fn vp8_keyframe_dimensions(frame: &[u8]) -> Option<(u16, u16)> {
    if frame.len() < 10 {
        return None;
    }
    // lowest bit of the first byte: 0 = keyframe
    if frame[0] & 0x01 != 0 {
        return None;
    }
    // start code of the uncompressed data chunk
    if frame[3..6] != [0x9d, 0x01, 0x2a] {
        return None;
    }

    let width = u16::from_le_bytes([frame[6], frame[7]]) & 0x3fff;
    let height = u16::from_le_bytes([frame[8], frame[9]]) & 0x3fff;

    Some((width, height))
}

/// 32 byte IVF file header for a VP8 stream.
#[must_use]
pub fn ivf_file_header(width: u16, height: u16) -> [u8; 32] {
    let mut header = [0u8; 32];
    header[0..4].copy_from_slice(b"DKIF");
    // version 0, header length 32
    header[6..8].copy_from_slice(&32u16.to_le_bytes());
    header[8..12].copy_from_slice(b"VP80");
    header[12..14].copy_from_slice(&width.to_le_bytes());
    header[14..16].copy_from_slice(&height.to_le_bytes());
    // nominal timebase, the decoder follows the bitstream anyway
    header[16..20].copy_from_slice(&30u32.to_le_bytes());
    header[20..24].copy_from_slice(&1u32.to_le_bytes());

    header
}

/// 12 byte IVF frame header.
#[must_use]
pub fn ivf_frame_header(payload_len: usize, pts: u64) -> [u8; 12] {
    let mut header = [0u8; 12];
    header[0..4].copy_from_slice(&(payload_len as u32).to_le_bytes());
    header[4..12].copy_from_slice(&pts.to_le_bytes());

    header
}

/// Geometry from a `YUV4MPEG2 ...` stream header line.
pub fn parse_y4m_header(line: &str) -> Result<(usize, usize)> {
    if !line.starts_with("YUV4MPEG2") {
        bail!("not a yuv4mpegpipe stream: {line:?}");
    }

    let mut width = None;
    let mut height = None;
    for parameter in line.split_ascii_whitespace().skip(1) {
        match parameter.split_at(1) {
            ("W", value) => width = value.parse::<usize>().ok(),
            ("H", value) => height = value.parse::<usize>().ok(),
            _ => {}
        }
    }

    match (width, height) {
        (Some(width), Some(height)) => Ok((width, height)),
        _ => bail!("yuv4mpegpipe header without geometry: {line:?}"),
    }
}

/// Spawn one ffmpeg decoder for a VP8 track.
pub fn spawn_vp8_decoder() -> Result<(Vp8SampleSink, DecodedFrames)> {
    let mut child = Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-f",
            "ivf",
            "-i",
            "pipe:0",
            "-f",
            "yuv4mpegpipe",
            "-pix_fmt",
            "yuv420p",
            "pipe:1",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .context("failed to spawn FFmpeg decoder process")?;

    let stdin = child
        .stdin
        .take()
        .context("failed to take FFmpeg decoder stdin")?;
    let stdout = child
        .stdout
        .take()
        .context("failed to take FFmpeg decoder stdout")?;

    Ok((
        Vp8SampleSink {
            stdin,
            header_written: false,
            pts: 0,
        },
        DecodedFrames {
            _child: child,
            stdout: BufReader::new(stdout),
            geometry: None,
        },
    ))
}

/// Write side of the ffmpeg decoder: complete VP8 frames as IVF.
#[derive(Debug)]
pub struct Vp8SampleSink {
    stdin: ChildStdin,
    header_written: bool,
    pts: u64,
}

impl Vp8SampleSink {
    /// Feed one complete VP8 frame.
    ///
    /// Frames arriving before the first keyframe are dropped, the decoder
    /// could not use them anyway.
    pub async fn push(&mut self, frame: &[u8]) -> Result<()> {
        if !self.header_written {
            let Some((width, height)) = vp8_keyframe_dimensions(frame) else {
                trace!("waiting for the first keyframe, dropped {} bytes", frame.len());
                return Ok(());
            };
            self.stdin
                .write_all(&ivf_file_header(width, height))
                .await
                .context("failed to write IVF header")?;
            self.header_written = true;
        }

        self.stdin
            .write_all(&ivf_frame_header(frame.len(), self.pts))
            .await
            .context("failed to write IVF frame header")?;
        self.stdin
            .write_all(frame)
            .await
            .context("failed to write IVF frame")?;
        self.pts += 1;

        Ok(())
    }
}

/// Read side of the ffmpeg decoder: raw frames as they are decoded.
#[derive(Debug)]
pub struct DecodedFrames {
    _child: Child,
    stdout: BufReader<ChildStdout>,
    geometry: Option<(usize, usize)>,
}

impl DecodedFrames {
    /// Next decoded frame, `None` on end of stream.
    pub async fn next(&mut self) -> Result<Option<VideoFrame>> {
        let (width, height) = match self.geometry {
            Some(geometry) => geometry,
            None => {
                let Some(line) = self.read_line().await? else {
                    return Ok(None);
                };
                let geometry = parse_y4m_header(&line)?;
                self.geometry = Some(geometry);
                geometry
            }
        };

        let Some(marker) = self.read_line().await? else {
            return Ok(None);
        };
        if !marker.starts_with("FRAME") {
            bail!("unexpected yuv4mpegpipe frame marker: {marker:?}");
        }

        let mut data = vec![0u8; VideoFrame::buffer_len(width, height)];
        self.stdout
            .read_exact(&mut data)
            .await
            .context("failed to read decoded frame data")?;

        VideoFrame::from_yuv420(width, height, data)
            .with_context(|| format!("decoder produced an invalid {width}x{height} frame"))
            .map(Some)
    }

    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = Vec::new();
        let read = self
            .stdout
            .read_until(b'\n', &mut line)
            .await
            .context("failed to read from decoder")?;
        if read == 0 {
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }

        String::from_utf8(line)
            .context("decoder emitted a non-UTF-8 header line")
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyframe_header_is_parsed() {
        // keyframe bit clear, start code, 640x360
        let mut frame = vec![0x10, 0x02, 0x00, 0x9d, 0x01, 0x2a];
        frame.extend_from_slice(&640u16.to_le_bytes());
        frame.extend_from_slice(&360u16.to_le_bytes());
        frame.extend_from_slice(&[0; 16]);

        assert_eq!(vp8_keyframe_dimensions(&frame), Some((640, 360)));
    }

    #[test]
    fn delta_frames_have_no_dimensions() {
        let mut frame = vec![0x11, 0x02, 0x00, 0x9d, 0x01, 0x2a];
        frame.extend_from_slice(&[0; 16]);

        assert_eq!(vp8_keyframe_dimensions(&frame), None);
    }

    #[test]
    fn ivf_headers_are_well_formed() {
        let header = ivf_file_header(1280, 720);
        assert_eq!(&header[0..4], b"DKIF");
        assert_eq!(&header[8..12], b"VP80");
        assert_eq!(u16::from_le_bytes([header[12], header[13]]), 1280);
        assert_eq!(u16::from_le_bytes([header[14], header[15]]), 720);

        let frame_header = ivf_frame_header(4242, 7);
        assert_eq!(
            u32::from_le_bytes(frame_header[0..4].try_into().unwrap()),
            4242
        );
        assert_eq!(
            u64::from_le_bytes(frame_header[4..12].try_into().unwrap()),
            7
        );
    }

    #[test]
    fn y4m_header_round_trip() {
        let (width, height) =
            parse_y4m_header("YUV4MPEG2 W1280 H720 F30:1 Ip A1:1 C420mpeg2").unwrap();
        assert_eq!((width, height), (1280, 720));

        assert!(parse_y4m_header("MJPEG W1 H1").is_err());
        assert!(parse_y4m_header("YUV4MPEG2 F30:1").is_err());
    }
}
