// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Per-track reader tasks.
//!
//! One task per incoming media track: it reads RTP, reassembles complete
//! frames, decodes them and pushes the result into the compositor or
//! mixer. A dying track only detaches its own source; the session keeps
//! running.

use anyhow::{Context, Result};
use compositor::{AudioAttacher, VideoAttacher};
use log::{debug, warn};
use std::sync::Arc;
use webrtc::{
    media::io::sample_builder::SampleBuilder,
    rtp::codecs::{opus::OpusPacket, vp8::Vp8Packet},
    track::track_remote::TrackRemote,
};

use crate::decode::{spawn_vp8_decoder, AudioDecoder};

/// Reordering window of the sample builders, in packets.
const MAX_LATE_PACKETS: u16 = 32;

/// Read one remote video track until it ends.
pub async fn run_video_track(track: Arc<TrackRemote>, attacher: VideoAttacher) -> Result<()> {
    let track_id = track.id();
    let Some(source) = attacher.attach(&track_id) else {
        debug!("compositor is gone, ignoring video track {track_id}");
        return Ok(());
    };

    let (mut samples, mut frames) = spawn_vp8_decoder()
        .with_context(|| format!("failed to start decoder for video track {track_id}"))?;

    // Decoded frames surface on a second task so decode latency never
    // blocks RTP reading.
    let reader_track_id = track_id.clone();
    let reader = tokio::spawn(async move {
        loop {
            match frames.next().await {
                Ok(Some(frame)) => {
                    if !source.push(frame) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    warn!("decoder of video track {reader_track_id} failed: {error:#}");
                    break;
                }
            }
        }
        debug!("video track {reader_track_id} stopped delivering frames");
    });

    let mut builder = SampleBuilder::new(MAX_LATE_PACKETS, Vp8Packet::default(), 90_000);
    'receive: loop {
        let (packet, _) = match track.read_rtp().await {
            Ok(packet) => packet,
            Err(error) => {
                debug!("video track {track_id} ended: {error}");
                break 'receive;
            }
        };

        builder.push(packet);
        while let Some(sample) = builder.pop() {
            if let Err(error) = samples.push(&sample.data).await {
                warn!("failed to feed decoder of video track {track_id}: {error:#}");
                break 'receive;
            }
        }
    }

    // closing the sample sink sends EOS through the decoder
    drop(samples);
    reader.await.context("video frame reader task panicked")?;

    Ok(())
}

/// Read one remote audio track until it ends.
pub async fn run_audio_track(track: Arc<TrackRemote>, attacher: AudioAttacher) -> Result<()> {
    let track_id = track.id();
    // Opus always decodes at 48 kHz
    let Some(mut source) = attacher.attach(&track_id, 48_000)? else {
        debug!("mixer is gone, ignoring audio track {track_id}");
        return Ok(());
    };

    let mut decoder = AudioDecoder::new()?;
    let mut builder = SampleBuilder::new(MAX_LATE_PACKETS, OpusPacket::default(), 48_000);

    loop {
        let (packet, _) = match track.read_rtp().await {
            Ok(packet) => packet,
            Err(error) => {
                debug!("audio track {track_id} ended: {error}");
                break;
            }
        };

        builder.push(packet);
        while let Some(sample) = builder.pop() {
            let pcm = match decoder.decode(&sample.data) {
                Ok(pcm) => pcm,
                Err(error) => {
                    // a broken packet is not the end of the track
                    warn!("audio track {track_id}: {error:#}");
                    continue;
                }
            };

            if !source.push(&pcm, 2)? {
                debug!("mixer is gone, stopping audio track {track_id}");
                return Ok(());
            }
        }
    }

    Ok(())
}
