/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::model::{
    Account, ApObject, Block, DeniedUser, DomainBlock, Follow, FollowRequest, PollVote, Report,
    Status, StatusFave, User,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    Create,
    Update,
    Accept,
    Reject,
    Undo,
    Delete,
    Flag,
    Move,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Accept => "Accept",
            Self::Reject => "Reject",
            Self::Undo => "Undo",
            Self::Delete => "Delete",
            Self::Flag => "Flag",
            Self::Move => "Move",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Note,
    Profile,
    Person,
    Follow,
    Like,
    Announce,
    Block,
    Flag,
    Question,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "Note",
            Self::Profile => "Profile",
            Self::Person => "Person",
            Self::Follow => "Follow",
            Self::Like => "Like",
            Self::Announce => "Announce",
            Self::Block => "Block",
            Self::Flag => "Flag",
            Self::Question => "Question",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one authoritative input carried by an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Status(Status),
    /// Stored version plus the freshly received federation object, if any.
    StatusUpdate {
        existing: Status,
        #[serde(default)]
        ap: Option<ApObject>,
    },
    ApStatus(ApObject),
    /// Object known only by IRI (forwarded activities).
    Iri(String),
    Account(Account),
    AccountUpdate {
        existing: Account,
        ap: ApObject,
    },
    User(User),
    DeniedUser(DeniedUser),
    Follow(Follow),
    FollowRequest(FollowRequest),
    Fave(StatusFave),
    Block(Block),
    PollVote(PollVote),
    Report(Report),
    DomainBlock(DomainBlock),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Status,
    StatusUpdate,
    ApStatus,
    Iri,
    Account,
    AccountUpdate,
    User,
    DeniedUser,
    Follow,
    FollowRequest,
    Fave,
    Block,
    PollVote,
    Report,
    DomainBlock,
    None,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::StatusUpdate => "status_update",
            Self::ApStatus => "ap_status",
            Self::Iri => "iri",
            Self::Account => "account",
            Self::AccountUpdate => "account_update",
            Self::User => "user",
            Self::DeniedUser => "denied_user",
            Self::Follow => "follow",
            Self::FollowRequest => "follow_request",
            Self::Fave => "fave",
            Self::Block => "block",
            Self::PollVote => "poll_vote",
            Self::Report => "report",
            Self::DomainBlock => "domain_block",
            Self::None => "none",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Status(_) => PayloadKind::Status,
            Self::StatusUpdate { .. } => PayloadKind::StatusUpdate,
            Self::ApStatus(_) => PayloadKind::ApStatus,
            Self::Iri(_) => PayloadKind::Iri,
            Self::Account(_) => PayloadKind::Account,
            Self::AccountUpdate { .. } => PayloadKind::AccountUpdate,
            Self::User(_) => PayloadKind::User,
            Self::DeniedUser(_) => PayloadKind::DeniedUser,
            Self::Follow(_) => PayloadKind::Follow,
            Self::FollowRequest(_) => PayloadKind::FollowRequest,
            Self::Fave(_) => PayloadKind::Fave,
            Self::Block(_) => PayloadKind::Block,
            Self::PollVote(_) => PayloadKind::PollVote,
            Self::Report(_) => PayloadKind::Report,
            Self::DomainBlock(_) => PayloadKind::DomainBlock,
            Self::None => PayloadKind::None,
        }
    }
}

/// One "thing happened" event, from a local client or a remote server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub verb: Verb,
    pub object_type: ObjectType,
    pub payload: Payload,
    /// Acting account: the local user for client envelopes, the
    /// requesting remote actor for federated ones.
    pub origin: Account,
    #[serde(default)]
    pub target: Option<Account>,
    /// Local inbox owner a federated envelope was delivered to.
    #[serde(default)]
    pub receiving: Option<Account>,
    #[serde(default)]
    pub target_uri: Option<String>,
}

impl Envelope {
    pub fn new(verb: Verb, object_type: ObjectType, origin: Account, payload: Payload) -> Self {
        Self {
            verb,
            object_type,
            payload,
            origin,
            target: None,
            receiving: None,
            target_uri: None,
        }
    }

    pub fn with_target(mut self, target: Account) -> Self {
        if self.target_uri.is_none() {
            self.target_uri = Some(target.uri.clone());
        }
        self.target = Some(target);
        self
    }

    pub fn with_receiving(mut self, receiving: Account) -> Self {
        self.receiving = Some(receiving);
        self
    }

    pub fn with_target_uri(mut self, uri: impl Into<String>) -> Self {
        self.target_uri = Some(uri.into());
        self
    }
}

/// One outbound federation request waiting for its inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryItem {
    pub actor_id: String,
    #[serde(default)]
    pub object_id: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    pub inbox: String,
    pub body: serde_json::Value,
}
