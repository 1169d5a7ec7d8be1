// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Matroska file output via an `ffmpeg` child process.
//!
//! The raw streams are fed to ffmpeg over two loopback TCP connections
//! (rawvideo and s16le); ffmpeg encodes H.264 + AAC and muxes a single
//! `.mkv` file. Closing both feeds makes ffmpeg flush and finalize the
//! container.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::{path::PathBuf, process::Stdio};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    process::{Child, Command},
    time::{timeout, Duration},
};

use crate::{ComposedFrame, MediaSink, MixedFrame, Size, AUDIO_CHANNELS, VIDEO_FRAMERATE};

/// How long to wait for ffmpeg to connect to the raw stream feeds.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Specific parameters needed to create a Matroska sink
#[derive(Clone, Debug, Deserialize)]
pub struct MatroskaParameters {
    /// Output file path
    pub file_path: PathBuf,
    /// x264 constant rate factor
    #[serde(default = "default_crf")]
    pub crf: u8,
    /// x264 encoder preset
    #[serde(default = "default_preset")]
    pub preset: String,
}

fn default_crf() -> u8 {
    18
}

fn default_preset() -> String {
    "ultrafast".to_owned()
}

/// Writes out a single Matroska file using `FFmpeg`
#[derive(Debug)]
pub struct MatroskaSink {
    process: Option<Child>,
    video_feed: Option<TcpStream>,
    audio_feed: Option<TcpStream>,
    file_path: PathBuf,
    canvas: Size,
}

impl MatroskaSink {
    /// Spawn ffmpeg and connect both raw stream feeds.
    ///
    /// # Errors
    ///
    /// This can fail for the following reasons:
    /// - no loopback TCP port could be bound
    /// - the `ffmpeg` binary cannot be spawned
    /// - ffmpeg does not connect to both feeds in time
    pub async fn create(canvas: Size, params: &MatroskaParameters) -> Result<Self> {
        let video_listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind video feed listener")?;
        let audio_listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind audio feed listener")?;
        let video_addr = video_listener
            .local_addr()
            .context("failed to get video feed address")?;
        let audio_addr = audio_listener
            .local_addr()
            .context("failed to get audio feed address")?;

        let file_path = params.file_path.clone();
        let file_name = file_path
            .to_str()
            .with_context(|| format!("file path '{file_path:?}' cannot be converted to UTF-8"))?;

        debug!("Starting ffmpeg to mux into '{file_name}', feeds: {video_addr} / {audio_addr}");
        let process = Command::new("ffmpeg")
            .args([
                "-v",
                "warning",
                "-y",
                "-nostdin",
                // raw video feed
                "-f",
                "rawvideo",
                "-pix_fmt",
                "yuv420p",
                "-s",
                &format!("{}x{}", canvas.width, canvas.height),
                "-r",
                &VIDEO_FRAMERATE.to_string(),
                "-i",
                &format!("tcp://{video_addr}"),
                // raw audio feed
                "-f",
                "s16le",
                "-ar",
                &crate::AUDIO_SAMPLE_RATE.to_string(),
                "-ac",
                &AUDIO_CHANNELS.to_string(),
                "-i",
                &format!("tcp://{audio_addr}"),
                // encoder settings
                "-c:v",
                "libx264",
                "-crf",
                &params.crf.to_string(),
                "-preset",
                &params.preset,
                "-tune",
                "zerolatency",
                "-c:a",
                "aac",
                "-f",
                "matroska",
                file_name,
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn FFmpeg process")?;

        // ffmpeg opens its inputs in order, so accept them one after the
        // other.
        let (video_feed, _) = timeout(CONNECT_TIMEOUT, video_listener.accept())
            .await
            .context("ffmpeg did not connect to the video feed")?
            .context("failed to accept video feed connection")?;
        let (audio_feed, _) = timeout(CONNECT_TIMEOUT, audio_listener.accept())
            .await
            .context("ffmpeg did not connect to the audio feed")?
            .context("failed to accept audio feed connection")?;

        Ok(Self {
            process: Some(process),
            video_feed: Some(video_feed),
            audio_feed: Some(audio_feed),
            file_path,
            canvas,
        })
    }

    #[must_use]
    pub fn file_path(&self) -> &PathBuf {
        &self.file_path
    }
}

#[async_trait]
impl MediaSink for MatroskaSink {
    async fn write_video(&mut self, frame: &ComposedFrame) -> Result<()> {
        if frame.frame.size() != self.canvas {
            bail!(
                "composed frame is {} but the encoder expects {}",
                frame.frame.size(),
                self.canvas
            );
        }

        let feed = self
            .video_feed
            .as_mut()
            .context("video feed already closed")?;
        feed.write_all(frame.frame.data())
            .await
            .context("failed to write video frame to ffmpeg")
    }

    async fn write_audio(&mut self, frame: &MixedFrame) -> Result<()> {
        let mut buffer = Vec::with_capacity(frame.samples.len() * 2);
        for sample in &frame.samples {
            buffer.extend_from_slice(&sample.to_le_bytes());
        }

        let feed = self
            .audio_feed
            .as_mut()
            .context("audio feed already closed")?;
        feed.write_all(&buffer)
            .await
            .context("failed to write audio frame to ffmpeg")
    }

    async fn finish(&mut self) -> Result<()> {
        debug!("Closing file '{:?}'", self.file_path);

        // EOS on both feeds makes ffmpeg flush and write the index.
        if let Some(mut feed) = self.video_feed.take() {
            let _ = feed.shutdown().await;
        }
        if let Some(mut feed) = self.audio_feed.take() {
            let _ = feed.shutdown().await;
        }

        let Some(mut process) = self.process.take() else {
            return Ok(());
        };
        let status = process
            .wait()
            .await
            .context("failed to wait for ffmpeg to exit")?;
        if !status.success() {
            bail!("ffmpeg exited with {status}");
        }

        Ok(())
    }
}

impl Drop for MatroskaSink {
    fn drop(&mut self) {
        if self.process.is_some() {
            warn!(
                "dropping unfinished recording '{:?}', the file may be truncated",
                self.file_path
            );
        }
    }
}
