// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! The recording service facade the signaling front-end talks to.

use anyhow::{Context, Result};
use futures::future::join_all;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::{
    auth::{Authorizer, Principal},
    error::ApiError,
    metadata::MetadataStore,
    session::{RecordingSession, SessionId, SessionParams, SessionRegistry, SessionState},
    settings::Settings,
};

/// `begin_recording` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct OfferRequest {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub division_id: String,
}

/// `begin_recording` response body.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: SessionId,
}

/// `stop_recording` response body.
#[derive(Debug, Clone, Serialize)]
pub struct StopResponse {
    pub message: String,
}

/// Owns the session registry and the collaborator seams.
pub struct Recorder {
    settings: Arc<Settings>,
    authorizer: Arc<dyn Authorizer>,
    metadata: Arc<dyn MetadataStore>,
    sessions: Arc<SessionRegistry>,
    /// Join handles of the session tasks, so shutdown can wait for files
    /// to finalize instead of tearing the runtime down under them.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Recorder {
    /// Create the service and make sure the recordings directory exists.
    pub fn new(
        settings: Arc<Settings>,
        authorizer: Arc<dyn Authorizer>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&settings.recording.directory).with_context(|| {
            format!(
                "failed to create recordings directory {:?}",
                settings.recording.directory
            )
        })?;

        Ok(Self {
            settings,
            authorizer,
            metadata,
            sessions: Arc::new(SessionRegistry::default()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Negotiate a new recording session.
    ///
    /// Checks run in a fixed order so the caller sees the most specific
    /// failure: authorization, division existence, then the offer itself.
    pub async fn begin(
        &self,
        principal: &Principal,
        request: &OfferRequest,
    ) -> Result<AnswerResponse, ApiError> {
        if !self
            .authorizer
            .may_record(principal, &request.division_id)
        {
            // never log the offer body here
            info!(
                "principal {} may not record division {}",
                principal.id, request.division_id
            );
            return Err(ApiError::Authorization);
        }

        if !self
            .metadata
            .division_exists(&request.division_id)
            .await
            .map_err(|error| ApiError::Internal(format!("division lookup failed: {error:#}")))?
        {
            return Err(ApiError::NotFound("division"));
        }

        if request.kind != "offer" {
            return Err(ApiError::BadOffer(format!(
                "expected an offer, got '{}'",
                request.kind
            )));
        }
        if !crate::peer::offer_has_media(&request.sdp) {
            return Err(ApiError::BadOffer(
                "offer contains no recordable track".to_owned(),
            ));
        }

        let session_id = SessionId::generate();
        let file_path = self.settings.recording.directory.join(format!(
            "{session_id}.{}",
            self.settings.recording.container
        ));

        let params = SessionParams {
            principal_id: principal.id.clone(),
            division_id: request.division_id.clone(),
            file_path,
            encoder: self.settings.encoder.clone(),
            negotiation_timeout: self.settings.timeouts.negotiation(),
            flush_timeout: self.settings.timeouts.flush(),
        };

        let (sdp, task) = RecordingSession::spawn(
            session_id,
            params,
            &request.sdp,
            Arc::clone(&self.metadata),
            Arc::clone(&self.sessions),
        )
        .await?;

        {
            let mut tasks = self.tasks.lock();
            tasks.retain(|task| !task.is_finished());
            tasks.push(task);
        }

        debug!(
            "session {session_id} negotiating for division {} (principal {})",
            request.division_id, principal.id
        );

        Ok(AnswerResponse {
            sdp,
            kind: "answer".to_owned(),
            session_id,
        })
    }

    /// Stop a session and finalize its file.
    ///
    /// The session id acts as a capability; no principal is required. A
    /// second call for the same id fails with `NotFound`.
    pub async fn end(&self, session_id: &SessionId) -> Result<StopResponse, ApiError> {
        let handle = self
            .sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or(ApiError::NotFound("recording session"))?;

        handle.stop().await?;

        Ok(StopResponse {
            message: format!("Recording session {session_id} stopped."),
        })
    }

    /// State of a session, `None` once it is closed and gone.
    #[must_use]
    pub fn session_state(&self, session_id: &SessionId) -> Option<SessionState> {
        self.sessions
            .lock()
            .get(session_id)
            .map(crate::session::SessionHandle::state)
    }

    /// Number of sessions currently in the registry.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Stop every open session through its regular flush path and wait
    /// for all session tasks to finish.
    ///
    /// Called on service shutdown so a SIGTERM never truncates a file
    /// that the encoder was still finalizing.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.sessions.lock().values().cloned().collect();
        if !handles.is_empty() {
            info!("stopping {} open recording session(s)", handles.len());
        }

        let results = join_all(handles.iter().map(|handle| handle.stop())).await;
        for (handle, result) in handles.iter().zip(results) {
            if let Err(error) = result {
                // NotFound here just means the session beat us to it
                debug!("session {} was already stopping: {error}", handle.id());
            }
        }

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for result in join_all(tasks).await {
            if let Err(error) = result {
                warn!("a session task did not finish cleanly: {error}");
            }
        }
    }
}
