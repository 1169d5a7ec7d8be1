// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Metadata persistence seam.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    time::SystemTime,
};
use uuid::Uuid;

/// A persisted recording entry.
#[derive(Debug, Clone)]
pub struct RecordedVideo {
    pub id: String,
    pub filename: String,
    pub division_id: String,
    pub created_at: SystemTime,
}

/// Store for divisions and recorded video entries.
///
/// Failures never delete recording files; they surface from `end`.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Does the division exist?
    async fn division_exists(&self, division_id: &str) -> Result<bool>;

    /// Persist a recorded video and return its id.
    async fn record_video(
        &self,
        filename: &str,
        division_id: &str,
        created_at: SystemTime,
    ) -> Result<String>;
}

/// In-memory store used by tests and the demo binary.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    divisions: Mutex<HashSet<String>>,
    videos: Mutex<Vec<RecordedVideo>>,
}

impl MemoryMetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_division(&self, division_id: impl Into<String>) {
        self.divisions.lock().insert(division_id.into());
    }

    #[must_use]
    pub fn videos(&self) -> Vec<RecordedVideo> {
        self.videos.lock().clone()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn division_exists(&self, division_id: &str) -> Result<bool> {
        Ok(self.divisions.lock().contains(division_id))
    }

    async fn record_video(
        &self,
        filename: &str,
        division_id: &str,
        created_at: SystemTime,
    ) -> Result<String> {
        let video = RecordedVideo {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_owned(),
            division_id: division_id.to_owned(),
            created_at,
        };
        let id = video.id.clone();
        self.videos.lock().push(video);

        Ok(id)
    }
}
