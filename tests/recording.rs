// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Recording service operations against mocked collaborators.

mod common;

use lecture_recorder::{
    auth::{Principal, Role},
    error::ApiError,
    metadata::MemoryMetadataStore,
    recorder::{OfferRequest, Recorder},
    session::{SessionId, SessionState},
    settings::Settings,
};
use std::sync::Arc;
use webrtc::{
    api::{media_engine::MediaEngine, APIBuilder},
    peer_connection::{configuration::RTCConfiguration, RTCPeerConnection},
    rtp_transceiver::rtp_codec::RTPCodecType,
};

fn teacher() -> Principal {
    Principal::new("teacher-1", Role::Teacher)
}

fn student() -> Principal {
    Principal::new("student-1", Role::Student)
}

fn offer_request(sdp: &str) -> OfferRequest {
    OfferRequest {
        sdp: sdp.to_owned(),
        kind: "offer".to_owned(),
        division_id: "division-1".to_owned(),
    }
}

/// A publishing peer like the teacher's browser would create.
async fn publishing_offer() -> (RTCPeerConnection, String) {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs().unwrap();
    let api = APIBuilder::new().with_media_engine(media_engine).build();

    let peer = api
        .new_peer_connection(RTCConfiguration::default())
        .await
        .unwrap();
    peer.add_transceiver_from_kind(RTPCodecType::Video, None)
        .await
        .unwrap();
    peer.add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await
        .unwrap();

    let offer = peer.create_offer(None).await.unwrap();
    let sdp = offer.sdp.clone();
    peer.set_local_description(offer).await.unwrap();

    (peer, sdp)
}

#[tokio::test]
async fn unauthorized_begin_creates_nothing() {
    let (recorder, metadata, dir) = common::test_recorder();

    let result = recorder
        .begin(&student(), &offer_request("v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n"))
        .await;

    match result {
        Err(error @ ApiError::Authorization) => assert_eq!(error.status_code(), 403),
        other => panic!("expected an authorization failure, got {other:?}"),
    }
    assert_eq!(recorder.session_count(), 0);
    assert!(metadata.videos().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn unknown_division_is_not_found() {
    let (recorder, _metadata, _dir) = common::test_recorder();

    let mut request = offer_request("v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n");
    request.division_id = "division-missing".to_owned();

    let result = recorder.begin(&teacher(), &request).await;
    match result {
        Err(error @ ApiError::NotFound(_)) => assert_eq!(error.status_code(), 404),
        other => panic!("expected not found, got {other:?}"),
    }
    assert_eq!(recorder.session_count(), 0);
}

#[tokio::test]
async fn offer_without_media_is_rejected() {
    let (recorder, _metadata, _dir) = common::test_recorder();

    let result = recorder
        .begin(&teacher(), &offer_request("v=0\r\ns=-\r\n"))
        .await;
    match result {
        Err(error @ ApiError::BadOffer(_)) => assert_eq!(error.status_code(), 400),
        other => panic!("expected a bad offer, got {other:?}"),
    }
    assert_eq!(recorder.session_count(), 0);
}

#[tokio::test]
async fn wrong_request_kind_is_rejected() {
    let (recorder, _metadata, _dir) = common::test_recorder();

    let mut request = offer_request("v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n");
    request.kind = "answer".to_owned();

    assert!(matches!(
        recorder.begin(&teacher(), &request).await,
        Err(ApiError::BadOffer(_))
    ));
}

#[tokio::test]
async fn malformed_sdp_is_a_bad_offer_and_leaves_no_session() {
    let (recorder, _metadata, _dir) = common::test_recorder();

    let result = recorder
        .begin(&teacher(), &offer_request("m=video this is not sdp"))
        .await;
    assert!(matches!(result, Err(ApiError::BadOffer(_))));
    assert_eq!(recorder.session_count(), 0);
}

#[tokio::test]
async fn negotiation_registers_a_session_and_answers() {
    let (recorder, _metadata, _dir) = common::test_recorder();
    let (_peer, sdp) = publishing_offer().await;

    let answer = recorder
        .begin(&teacher(), &offer_request(&sdp))
        .await
        .expect("negotiation failed");

    assert_eq!(answer.kind, "answer");
    assert!(answer.sdp.contains("v=0"));
    assert_eq!(recorder.session_count(), 1);
    assert_eq!(
        recorder.session_state(&answer.session_id),
        Some(SessionState::Negotiating)
    );
}

#[tokio::test]
async fn end_is_not_repeatable() {
    let (recorder, _metadata, _dir) = common::test_recorder();
    let (_peer, sdp) = publishing_offer().await;

    let answer = recorder
        .begin(&teacher(), &offer_request(&sdp))
        .await
        .expect("negotiation failed");

    // never reached the peer, so it stops without a file
    recorder.end(&answer.session_id).await.expect("first end failed");
    assert_eq!(recorder.session_count(), 0);
    assert_eq!(recorder.session_state(&answer.session_id), None);

    assert!(matches!(
        recorder.end(&answer.session_id).await,
        Err(ApiError::NotFound(_))
    ));
}

#[tokio::test]
async fn shutdown_stops_open_sessions_and_waits_for_them() {
    let (recorder, _metadata, _dir) = common::test_recorder();
    let (_peer, sdp) = publishing_offer().await;

    let answer = recorder
        .begin(&teacher(), &offer_request(&sdp))
        .await
        .expect("negotiation failed");
    assert_eq!(recorder.session_count(), 1);

    recorder.shutdown().await;

    assert_eq!(recorder.session_count(), 0);
    assert_eq!(recorder.session_state(&answer.session_id), None);

    // shutdown with nothing left is fine too
    recorder.shutdown().await;
}

#[tokio::test]
async fn end_of_an_unknown_session_is_not_found() {
    let (recorder, _metadata, _dir) = common::test_recorder();

    assert!(matches!(
        recorder.end(&SessionId::generate()).await,
        Err(ApiError::NotFound(_))
    ));
}

#[tokio::test]
async fn denying_authorizer_wins_over_everything_else() {
    common::init();

    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(MemoryMetadataStore::new());
    metadata.add_division("division-1");

    let recorder = Recorder::new(
        Arc::new({
            let mut settings = Settings::default();
            settings.recording.directory = dir.path().to_path_buf();
            settings
        }),
        Arc::new(common::DenyAll),
        Arc::clone(&metadata) as _,
    )
    .unwrap();

    // even a teacher with a fine offer is refused first
    let result = recorder
        .begin(&teacher(), &offer_request("v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n"))
        .await;
    assert!(matches!(result, Err(ApiError::Authorization)));
}
