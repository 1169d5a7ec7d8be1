// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Source identity and ordering.

use std::fmt::Display;

/// Stable ordering key of an attached source.
///
/// Sources are ordered by attachment sequence first and track identifier
/// second; the smallest key of the live set is the main source. The key of
/// a source never changes while it is attached, so the ordering is stable
/// across ticks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceKey {
    order: u64,
    track_id: String,
}

impl SourceKey {
    pub(crate) fn new(order: u64, track_id: &str) -> Self {
        Self {
            order,
            track_id: track_id.to_owned(),
        }
    }

    /// Identifier of the underlying media track.
    #[must_use]
    pub fn track_id(&self) -> &str {
        &self.track_id
    }
}

impl Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.order, self.track_id)
    }
}
