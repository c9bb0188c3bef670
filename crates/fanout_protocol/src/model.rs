/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub uri: String,
    pub username: String,
    /// `None` for accounts hosted on this instance.
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub also_known_as_uris: Vec<String>,
    #[serde(default)]
    pub moved_to_uri: Option<String>,
    /// Pending or completed Move record for this account.
    #[serde(default)]
    pub move_id: Option<String>,
}

impl Account {
    pub fn is_local(&self) -> bool {
        self.domain.is_none()
    }

    pub fn is_remote(&self) -> bool {
        !self.is_local()
    }

    pub fn handle(&self) -> String {
        match &self.domain {
            Some(d) => format!("@{}@{d}", self.username),
            None => format!("@{}", self.username),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub account_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub unconfirmed_email: Option<String>,
    #[serde(default)]
    pub confirmation_token: Option<String>,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub sign_up_ip: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub moderator: bool,
    #[serde(default)]
    pub admin: bool,
}

impl User {
    /// Confirmed address first, falling back to the one awaiting confirmation.
    pub fn best_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .or(self.unconfirmed_email.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeniedUser {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub send_email: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusVisibility {
    #[default]
    Public,
    Unlocked,
    FollowersOnly,
    MutualsOnly,
    Direct,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub id: String,
    pub status_id: String,
    pub origin_account_id: String,
    pub target_account_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub uri: String,
    pub account_id: String,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    #[serde(default)]
    pub in_reply_to_account_id: Option<String>,
    #[serde(default)]
    pub boost_of_id: Option<String>,
    #[serde(default)]
    pub boost_of_account_id: Option<String>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub attachment_ids: Vec<String>,
    /// Snapshot of the attached poll, if any.
    #[serde(default)]
    pub poll: Option<Poll>,
    #[serde(default)]
    pub visibility: StatusVisibility,
    #[serde(default)]
    pub created_at_ms: i64,
}

impl Status {
    /// Skeleton for a remote status known only by its URI.
    pub fn bare_remote(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            local: false,
            ..Default::default()
        }
    }

    pub fn is_boost(&self) -> bool {
        self.boost_of_id.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
    }

    pub fn in_reply_to(&self) -> Option<&str> {
        self.in_reply_to_id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn boost_of(&self) -> Option<&str> {
        self.boost_of_id.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub status_id: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub votes: Vec<u64>,
    #[serde(default)]
    pub voters: u64,
    #[serde(default)]
    pub closed_at_ms: Option<i64>,
    /// Set by whoever produced this version when it closed the poll.
    #[serde(default)]
    pub closing: bool,
}

impl Poll {
    pub fn is_closed(&self) -> bool {
        self.closed_at_ms.is_some()
    }

    pub fn increment_votes(&mut self, choices: &[usize]) {
        if self.votes.len() < self.options.len() {
            self.votes.resize(self.options.len(), 0);
        }
        let mut counted = false;
        for &c in choices {
            if let Some(v) = self.votes.get_mut(c) {
                *v = v.saturating_add(1);
                counted = true;
            }
        }
        if counted {
            self.voters = self.voters.saturating_add(1);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollVote {
    pub id: String,
    pub poll_id: String,
    pub account_id: String,
    #[serde(default)]
    pub choices: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub id: String,
    pub uri: String,
    pub account_id: String,
    pub target_account_id: String,
    /// Follower asked to be notified of new posts.
    #[serde(default)]
    pub notify: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRequest {
    pub id: String,
    pub uri: String,
    pub account_id: String,
    pub target_account_id: String,
    #[serde(default)]
    pub notify: bool,
}

impl FollowRequest {
    /// Requests travel over federation as plain Follow activities.
    pub fn to_follow(&self) -> Follow {
        Follow {
            id: self.id.clone(),
            uri: self.uri.clone(),
            account_id: self.account_id.clone(),
            target_account_id: self.target_account_id.clone(),
            notify: self.notify,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFave {
    pub id: String,
    pub uri: String,
    pub account_id: String,
    pub target_account_id: String,
    pub status_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub uri: String,
    pub account_id: String,
    pub target_account_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub uri: String,
    /// Reporting account.
    pub account_id: String,
    pub target_account_id: String,
    #[serde(default)]
    pub status_ids: Vec<String>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub forwarded: bool,
    #[serde(default)]
    pub action_taken: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub id: String,
    pub origin_uri: String,
    pub target_uri: String,
    pub attempted_at_ms: i64,
    #[serde(default)]
    pub succeeded_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainBlock {
    pub id: String,
    pub domain: String,
}

/// A parsed federation object as handed over by the inbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApObject {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_includes_domain_only_for_remote_accounts() {
        let mut account = Account {
            username: "alice".into(),
            ..Default::default()
        };
        assert_eq!(account.handle(), "@alice");
        account.domain = Some("there.example".into());
        assert_eq!(account.handle(), "@alice@there.example");
    }
}
