// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Shared helpers for the integration tests.

use lecture_recorder::{
    auth::{Authorizer, Principal, RoleAuthorizer},
    metadata::MemoryMetadataStore,
    recorder::Recorder,
    settings::Settings,
};
use std::sync::Arc;
use tempfile::TempDir;

pub fn init() {
    env_logger::try_init().ok();
}

/// Settings pointing into a temporary recordings directory.
pub fn test_settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.recording.directory = dir.path().to_path_buf();
    settings
}

/// A recorder with the in-memory collaborators and one known division.
pub fn test_recorder() -> (Arc<Recorder>, Arc<MemoryMetadataStore>, TempDir) {
    init();

    let dir = tempfile::tempdir().expect("failed to create recordings dir");
    let metadata = Arc::new(MemoryMetadataStore::new());
    metadata.add_division("division-1");

    let recorder = Recorder::new(
        Arc::new(test_settings(&dir)),
        Arc::new(RoleAuthorizer),
        Arc::clone(&metadata) as _,
    )
    .expect("failed to create recorder");

    (Arc::new(recorder), metadata, dir)
}

/// An authorizer that denies everything, for the 403 paths.
#[derive(Debug)]
pub struct DenyAll;

impl Authorizer for DenyAll {
    fn may_record(&self, _principal: &Principal, _division_id: &str) -> bool {
        false
    }

    fn may_view(&self, _principal: &Principal, _division_id: &str) -> bool {
        false
    }
}
