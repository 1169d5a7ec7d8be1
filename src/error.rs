// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Error taxonomy of the operation surface.
//!
//! The signaling front-end maps these kinds onto HTTP statuses; everything
//! below this surface uses `anyhow` and is folded into `Internal` when it
//! escapes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The principal lacks the required capability. Never carries the
    /// offer body.
    #[error("not authorized to record this division")]
    Authorization,

    /// A session, division or participant id is unknown.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The SDP offer is malformed or has no recordable track.
    #[error("invalid SDP offer: {0}")]
    BadOffer(String),

    /// A peer or participant connection failed. Recovered locally where
    /// possible.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The container writer could not finalize; the file may be partial.
    #[error("encoder failed to finalize: {0}")]
    EncoderFailure(String),

    /// Invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status the front-end should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Authorization => 403,
            Self::NotFound(_) => 404,
            Self::BadOffer(_) => 400,
            Self::Transport(_) | Self::EncoderFailure(_) | Self::Internal(_) => 500,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(format!("{error:#}"))
    }
}
