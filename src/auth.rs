// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Principals and the authorization seam.
//!
//! Authentication itself happens in the front-end; the core only ever sees
//! an already verified [`Principal`] and asks the [`Authorizer`] about
//! capabilities.

use serde::{Deserialize, Serialize};

/// Role of an authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Teacher,
    Student,
}

/// An authenticated identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    /// Opaque identifier issued by the authentication layer.
    pub id: String,
    pub role: Role,
}

impl Principal {
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// Capability checks consumed by the core.
pub trait Authorizer: Send + Sync + 'static {
    /// May this principal record the given division?
    fn may_record(&self, principal: &Principal, division_id: &str) -> bool;

    /// May this principal view recordings of the given division?
    fn may_view(&self, principal: &Principal, division_id: &str) -> bool;
}

/// Role based authorization: teachers record, everyone authenticated views.
#[derive(Debug, Default)]
pub struct RoleAuthorizer;

impl Authorizer for RoleAuthorizer {
    fn may_record(&self, principal: &Principal, _division_id: &str) -> bool {
        principal.role == Role::Teacher
    }

    fn may_view(&self, _principal: &Principal, _division_id: &str) -> bool {
        true
    }
}
