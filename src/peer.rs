// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Peer connection construction and offer/answer negotiation.

use anyhow::{Context, Result};
use std::sync::Arc;
use webrtc::{
    api::{
        interceptor_registry::register_default_interceptors, media_engine::MediaEngine, APIBuilder,
    },
    interceptor::registry::Registry,
    peer_connection::{
        configuration::RTCConfiguration, sdp::session_description::RTCSessionDescription,
        RTCPeerConnection,
    },
};

use crate::error::ApiError;

/// Build a receiving peer connection with the default codec set.
pub async fn create_peer_connection() -> Result<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .context("failed to register default codecs")?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)
        .context("failed to register default interceptors")?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let peer_connection = api
        .new_peer_connection(RTCConfiguration::default())
        .await
        .context("failed to create peer connection")?;

    Ok(Arc::new(peer_connection))
}

/// Does the offer announce at least one recordable media section?
#[must_use]
pub fn offer_has_media(sdp: &str) -> bool {
    sdp.lines()
        .any(|line| line.starts_with("m=audio") || line.starts_with("m=video"))
}

/// Apply the remote offer and produce the local answer SDP.
///
/// Candidate gathering is awaited before answering, so the returned SDP is
/// complete and no trickle channel is needed.
pub async fn negotiate(
    peer_connection: &RTCPeerConnection,
    offer_sdp: &str,
) -> Result<String, ApiError> {
    let offer = RTCSessionDescription::offer(offer_sdp.to_owned())
        .map_err(|error| ApiError::BadOffer(error.to_string()))?;

    peer_connection
        .set_remote_description(offer)
        .await
        .map_err(|error| ApiError::BadOffer(error.to_string()))?;

    let answer = peer_connection
        .create_answer(None)
        .await
        .map_err(|error| ApiError::BadOffer(error.to_string()))?;

    let mut gathered = peer_connection.gathering_complete_promise().await;
    peer_connection
        .set_local_description(answer)
        .await
        .map_err(|error| ApiError::Internal(format!("failed to set local description: {error}")))?;
    let _ = gathered.recv().await;

    let answer = peer_connection
        .local_description()
        .await
        .ok_or_else(|| ApiError::Internal("local description disappeared".to_owned()))?;

    Ok(answer.sdp)
}
