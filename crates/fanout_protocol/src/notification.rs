/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Follow,
    FollowRequest,
    Mention,
    Reblog,
    Favourite,
    Poll,
    Status,
    Signup,
    Update,
    AdminReport,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::FollowRequest => "follow_request",
            Self::Mention => "mention",
            Self::Reblog => "reblog",
            Self::Favourite => "favourite",
            Self::Poll => "poll",
            Self::Status => "status",
            Self::Signup => "admin.sign_up",
            Self::Update => "update",
            Self::AdminReport => "admin.report",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub notification_type: NotificationType,
    pub target_account_id: String,
    pub origin_account_id: String,
    #[serde(default)]
    pub status_id: Option<String>,
    pub created_at_ms: i64,
}

impl Notification {
    /// The dedup identity: at most one notification exists per tuple.
    pub fn identity(&self) -> (NotificationType, &str, &str, Option<&str>) {
        (
            self.notification_type,
            &self.target_account_id,
            &self.origin_account_id,
            self.status_id.as_deref(),
        )
    }
}
