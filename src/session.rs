// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! One recording session: a peer connection, the compositor and mixer it
//! feeds, and the encoder writing the output file.
//!
//! The session is a single task owning all of its parts. Peer-connection
//! callbacks only send events into the task; tracks talk to the mixers
//! through attacher handles. Teardown always ends in `Closed` and removes
//! the session from the registry.

use compositor::{
    audio_interval, video_interval, AudioMixer, MatroskaParameters, MatroskaSink, MediaSink,
    PictureInPicture, Size, TickClock, VideoCompositor,
};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::Display,
    path::PathBuf,
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{sleep, timeout, Instant},
};
use uuid::Uuid;
use webrtc::{
    peer_connection::{
        peer_connection_state::RTCPeerConnectionState, RTCPeerConnection,
    },
    rtp_transceiver::rtp_codec::RTPCodecType,
};

use crate::{
    error::ApiError,
    metadata::MetadataStore,
    peer,
    settings::EncoderSettings,
    track::{run_audio_track, run_video_track},
};

/// Queue depth between the compositor task and the encoder task (one
/// second of video).
const VIDEO_QUEUE: usize = 30;
/// Queue depth between the mixer task and the encoder task (one second of
/// audio).
const AUDIO_QUEUE: usize = 50;

/// Server-generated identifier of a recording session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Negotiating,
    Recording,
    Stopping,
    Closed,
}

/// Registry of all sessions that are not `Closed` yet.
pub(crate) type SessionRegistry = Mutex<HashMap<SessionId, SessionHandle>>;

/// What the registry holds per running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    state: watch::Receiver<SessionState>,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Ask the session to stop and wait for the finalized result.
    pub(crate) async fn stop(&self) -> Result<(), ApiError> {
        let (reply, done) = oneshot::channel();

        self.commands
            .send(SessionCommand::Stop { reply })
            .await
            .map_err(|_| ApiError::NotFound("recording session"))?;

        done.await
            .map_err(|_| ApiError::NotFound("recording session"))?
    }
}

#[derive(Debug)]
pub(crate) enum SessionCommand {
    Stop {
        reply: oneshot::Sender<Result<(), ApiError>>,
    },
}

#[derive(Debug)]
enum PeerEvent {
    Connected,
    Failed(String),
    TrackAdded,
}

/// Everything `begin` decided about a new session.
#[derive(Debug, Clone)]
pub(crate) struct SessionParams {
    pub principal_id: String,
    pub division_id: String,
    pub file_path: PathBuf,
    pub encoder: EncoderSettings,
    pub negotiation_timeout: Duration,
    pub flush_timeout: Duration,
}

pub(crate) struct RecordingSession {
    id: SessionId,
    params: SessionParams,
    peer_connection: Arc<RTCPeerConnection>,
    compositor: Option<VideoCompositor>,
    mixer: Option<AudioMixer>,
    events: mpsc::Receiver<PeerEvent>,
    commands: Option<mpsc::Receiver<SessionCommand>>,
    state_tx: watch::Sender<SessionState>,
    metadata: Arc<dyn MetadataStore>,
    registry: Arc<SessionRegistry>,
}

impl RecordingSession {
    /// Create the session, negotiate the offer, register it and spawn its
    /// task.
    ///
    /// The returned join handle completes once the session reached
    /// `Closed`; the service keeps it so shutdown can wait for running
    /// recordings to finalize. On any error nothing stays registered and
    /// no task is left behind.
    pub(crate) async fn spawn(
        id: SessionId,
        params: SessionParams,
        offer_sdp: &str,
        metadata: Arc<dyn MetadataStore>,
        registry: Arc<SessionRegistry>,
    ) -> Result<(String, tokio::task::JoinHandle<()>), ApiError> {
        let peer_connection = peer::create_peer_connection().await?;

        let compositor = VideoCompositor::new(
            Size::HD,
            PictureInPicture::default(),
            TickClock::new(video_interval()),
        );
        let mixer = AudioMixer::new(TickClock::new(audio_interval()));

        let (events_tx, events_rx) = mpsc::channel(16);
        let (commands_tx, commands_rx) = mpsc::channel(4);
        let (state_tx, state_rx) = watch::channel(SessionState::Negotiating);

        install_peer_callbacks(
            id,
            &peer_connection,
            &compositor,
            &mixer,
            events_tx,
        );

        let answer = match peer::negotiate(&peer_connection, offer_sdp).await {
            Ok(answer) => answer,
            Err(error) => {
                let _ = peer_connection.close().await;
                return Err(error);
            }
        };

        let handle = SessionHandle {
            id,
            state: state_rx,
            commands: commands_tx,
        };
        registry.lock().insert(id, handle);

        let session = Self {
            id,
            params,
            peer_connection,
            compositor: Some(compositor),
            mixer: Some(mixer),
            events: events_rx,
            commands: Some(commands_rx),
            state_tx,
            metadata,
            registry,
        };

        let task = tokio::spawn(session.run());

        Ok((answer, task))
    }

    async fn run(mut self) {
        match self.negotiating_phase().await {
            NegotiationOutcome::Recording => {}
            NegotiationOutcome::Abandoned(reason) => {
                info!("session {}: {reason}, closing without a file", self.id);
                self.close_without_file(None).await;
                return;
            }
            NegotiationOutcome::Stopped(reply) => {
                info!("session {} stopped before recording started", self.id);
                self.close_without_file(Some(reply)).await;
                return;
            }
        }

        self.recording_phase().await;
    }

    /// Wait until the peer is connected and at least one track arrived.
    async fn negotiating_phase(&mut self) -> NegotiationOutcome {
        let deadline = sleep(self.params.negotiation_timeout);
        tokio::pin!(deadline);

        let mut commands = self.commands.take().expect("commands taken once");
        let mut connected = false;
        let mut tracks = 0usize;

        let outcome = loop {
            tokio::select! {
                () = &mut deadline => {
                    break NegotiationOutcome::Abandoned("negotiation timed out".to_owned());
                }
                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Stop { reply }) => {
                            break NegotiationOutcome::Stopped(reply);
                        }
                        None => break NegotiationOutcome::Abandoned("service is gone".to_owned()),
                    }
                }
                event = self.events.recv() => {
                    match event {
                        Some(PeerEvent::Connected) => {
                            debug!("session {}: peer connected", self.id);
                            connected = true;
                        }
                        Some(PeerEvent::TrackAdded) => {
                            debug!("session {}: track arrived", self.id);
                            tracks += 1;
                        }
                        Some(PeerEvent::Failed(state)) => {
                            break NegotiationOutcome::Abandoned(format!("peer {state}"));
                        }
                        None => break NegotiationOutcome::Abandoned("peer is gone".to_owned()),
                    }
                    if connected && tracks > 0 {
                        break NegotiationOutcome::Recording;
                    }
                }
            }
        };

        if matches!(outcome, NegotiationOutcome::Recording) {
            self.commands = Some(commands);
        }

        outcome
    }

    /// Drive the media pipeline until `end` is called or the peer fails.
    async fn recording_phase(&mut self) {
        self.set_state(SessionState::Recording);
        info!(
            "session {} started recording to {:?}",
            self.id, self.params.file_path
        );

        let sink = match MatroskaSink::create(
            Size::HD,
            &MatroskaParameters {
                file_path: self.params.file_path.clone(),
                crf: self.params.encoder.crf,
                preset: self.params.encoder.preset.clone(),
            },
        )
        .await
        {
            Ok(sink) => sink,
            Err(error) => {
                error!("session {}: encoder did not start: {error:#}", self.id);
                self.close_without_file(None).await;
                return;
            }
        };

        // tick zero of both streams is the moment recording starts
        let epoch = Instant::now();
        let mut compositor = self.compositor.take().expect("compositor taken once");
        let mut mixer = self.mixer.take().expect("mixer taken once");
        compositor.set_clock(TickClock::with_epoch(epoch, video_interval()));
        mixer.set_clock(TickClock::with_epoch(epoch, audio_interval()));

        let (stop_tx, stop_rx) = watch::channel(false);
        let (video_tx, video_rx) = mpsc::channel(VIDEO_QUEUE);
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_QUEUE);

        let mut video_stop = stop_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = video_stop.changed() => break,
                    frame = compositor.next_frame() => {
                        if video_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut audio_stop = stop_rx;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = audio_stop.changed() => break,
                    frame = mixer.next_frame() => {
                        if audio_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let encoder = tokio::spawn(encoder_task(sink, video_rx, audio_rx, self.params.flush_timeout));

        // run until someone ends the session
        let mut commands = self.commands.take().expect("commands taken once");
        let reply = loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Stop { reply }) => break Some(reply),
                        None => break None,
                    }
                }
                event = self.events.recv() => {
                    match event {
                        Some(PeerEvent::Failed(state)) => {
                            warn!("session {}: peer {state}, stopping", self.id);
                            break None;
                        }
                        Some(_) => {}
                        None => break None,
                    }
                }
            }
        };
        // further `end` calls now fail fast with NotFound
        drop(commands);

        self.set_state(SessionState::Stopping);
        let _ = stop_tx.send(true);

        let result = match encoder.await {
            Ok(result) => result,
            Err(error) => Err(ApiError::Internal(format!("encoder task failed: {error}"))),
        };
        let _ = self.peer_connection.close().await;

        let result = match result {
            Ok(()) => self.persist_metadata().await,
            Err(error) => {
                // the file may still exist partially; keep its record
                let _ = self.persist_metadata().await;
                Err(error)
            }
        };

        self.set_state(SessionState::Closed);
        self.registry.lock().remove(&self.id);

        match reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(error) = result {
                    error!("session {} finalization failed: {error}", self.id);
                }
            }
        }

        info!("session {} closed", self.id);
    }

    /// Record the finished file, leaving the file alone on failure.
    async fn persist_metadata(&self) -> Result<(), ApiError> {
        if tokio::fs::metadata(&self.params.file_path).await.is_err() {
            warn!(
                "session {}: no output file at {:?}, skipping metadata",
                self.id, self.params.file_path
            );
            return Ok(());
        }

        let filename = self
            .params
            .file_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ApiError::Internal("recording path has no file name".to_owned()))?;

        self.metadata
            .record_video(filename, &self.params.division_id, SystemTime::now())
            .await
            .map_err(|error| ApiError::Internal(format!("failed to persist recording: {error:#}")))?;

        debug!(
            "session {}: recorded video '{filename}' for division {} by {}",
            self.id, self.params.division_id, self.params.principal_id
        );

        Ok(())
    }

    async fn close_without_file(&mut self, reply: Option<oneshot::Sender<Result<(), ApiError>>>) {
        let _ = self.peer_connection.close().await;
        self.set_state(SessionState::Closed);
        self.registry.lock().remove(&self.id);

        if let Some(reply) = reply {
            let _ = reply.send(Ok(()));
        }
    }

    fn set_state(&self, state: SessionState) {
        let _ = self.state_tx.send(state);
    }
}

enum NegotiationOutcome {
    Recording,
    Abandoned(String),
    Stopped(oneshot::Sender<Result<(), ApiError>>),
}

/// Drain both frame queues into the sink, then flush with a bounded
/// timeout.
async fn encoder_task(
    mut sink: impl MediaSink,
    mut video_rx: mpsc::Receiver<compositor::ComposedFrame>,
    mut audio_rx: mpsc::Receiver<compositor::MixedFrame>,
    flush_timeout: Duration,
) -> Result<(), ApiError> {
    let mut failure = None;

    loop {
        tokio::select! {
            Some(frame) = video_rx.recv() => {
                if let Err(error) = sink.write_video(&frame).await {
                    failure = Some(ApiError::EncoderFailure(format!("{error:#}")));
                    break;
                }
            }
            Some(frame) = audio_rx.recv() => {
                if let Err(error) = sink.write_audio(&frame).await {
                    failure = Some(ApiError::EncoderFailure(format!("{error:#}")));
                    break;
                }
            }
            else => break,
        }
    }

    if let Some(failure) = failure {
        return Err(failure);
    }

    match timeout(flush_timeout, sink.finish()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(ApiError::EncoderFailure(format!("{error:#}"))),
        Err(_) => Err(ApiError::EncoderFailure(
            "flush timed out, the file is closed as-is".to_owned(),
        )),
    }
}

/// Wire the peer connection callbacks to the session task and the mixers.
fn install_peer_callbacks(
    id: SessionId,
    peer_connection: &RTCPeerConnection,
    compositor: &VideoCompositor,
    mixer: &AudioMixer,
    events: mpsc::Sender<PeerEvent>,
) {
    let state_events = events.clone();
    peer_connection.on_peer_connection_state_change(Box::new(move |state| {
        let events = state_events.clone();
        Box::pin(async move {
            match state {
                RTCPeerConnectionState::Connected => {
                    let _ = events.send(PeerEvent::Connected).await;
                }
                RTCPeerConnectionState::Failed
                | RTCPeerConnectionState::Disconnected
                | RTCPeerConnectionState::Closed => {
                    let _ = events.send(PeerEvent::Failed(state.to_string())).await;
                }
                _ => {}
            }
        })
    }));

    let video_attacher = compositor.attacher();
    let audio_attacher = mixer.attacher();
    peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
        let events = events.clone();
        let video_attacher = video_attacher.clone();
        let audio_attacher = audio_attacher.clone();

        Box::pin(async move {
            info!(
                "session {id}: incoming {} track '{}'",
                track.kind(),
                track.id()
            );
            let _ = events.send(PeerEvent::TrackAdded).await;

            match track.kind() {
                RTPCodecType::Video => {
                    tokio::spawn(async move {
                        if let Err(error) = run_video_track(track, video_attacher).await {
                            warn!("video track of session {id} failed: {error:#}");
                        }
                    });
                }
                RTPCodecType::Audio => {
                    tokio::spawn(async move {
                        if let Err(error) = run_audio_track(track, audio_attacher).await {
                            warn!("audio track of session {id} failed: {error:#}");
                        }
                    });
                }
                RTPCodecType::Unspecified => {
                    warn!("session {id}: track without codec type, ignoring");
                }
            }
        })
    }));
}
