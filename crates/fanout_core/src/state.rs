/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Collaborators the pipeline drives but does not own.
//!
//! Storage, timelines, streaming, mail, outbound federation and remote
//! dereferencing all live behind these traits. Reads that can miss return
//! `Ok(None)` (or `Ok(false)` for deletes), never an error.

use crate::locks::KeyedLocks;
use crate::work_queue::{QueueKey, QueueName};
use anyhow::Result;
use async_trait::async_trait;
use fanout_protocol::{
    Account, ApObject, Block, DeniedUser, Envelope, Follow, FollowRequest, Move, Notification,
    NotificationType, Poll, PollVote, Report, Status, StatusFave, User,
};
use serde::Serialize;
use std::sync::Arc;

/// Relative change to an account's cached counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsDelta {
    pub statuses: i64,
    pub followers: i64,
    pub following: i64,
    pub follow_requests: i64,
    pub last_status_at_ms: Option<i64>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_account_by_id(&self, id: &str) -> Result<Option<Account>>;
    async fn update_account(&self, account: &Account) -> Result<()>;
    /// Removes the account row only, used for rejected sign-ups.
    async fn delete_account(&self, id: &str) -> Result<bool>;
    /// Full account removal: statuses, media, relations, then the account.
    async fn delete_account_data(&self, account: &Account, origin_id: &str) -> Result<()>;
    async fn update_account_stats(&self, account_id: &str, delta: StatsDelta) -> Result<()>;
    async fn get_instance_moderators(&self) -> Result<Vec<Account>>;

    async fn get_user_by_account_id(&self, account_id: &str) -> Result<Option<User>>;
    async fn get_instance_moderator_users(&self) -> Result<Vec<User>>;
    async fn update_user(&self, user: &User) -> Result<()>;
    async fn delete_user_by_id(&self, id: &str) -> Result<bool>;
    async fn put_denied_user(&self, denied: &DeniedUser) -> Result<()>;

    /// Follows targeting `account_id` whose follower is a local account.
    async fn get_local_followers(&self, account_id: &str) -> Result<Vec<Follow>>;
    async fn is_following(&self, account_id: &str, target_account_id: &str) -> Result<bool>;
    async fn put_follow_request(&self, request: &FollowRequest) -> Result<()>;
    async fn accept_follow_request(
        &self,
        account_id: &str,
        target_account_id: &str,
    ) -> Result<Follow>;
    async fn delete_follow(&self, account_id: &str, target_account_id: &str) -> Result<bool>;
    async fn delete_follow_request(
        &self,
        account_id: &str,
        target_account_id: &str,
    ) -> Result<bool>;

    async fn get_status_by_id(&self, id: &str) -> Result<Option<Status>>;
    async fn get_status_boosts(&self, status_id: &str) -> Result<Vec<Status>>;
    async fn delete_status_by_id(&self, id: &str) -> Result<bool>;
    async fn is_thread_muted(&self, thread_id: &str, account_id: &str) -> Result<bool>;
    async fn delete_attachment(&self, id: &str) -> Result<()>;
    async fn unattach_attachment(&self, id: &str) -> Result<()>;

    async fn get_poll_by_id(&self, id: &str) -> Result<Option<Poll>>;
    async fn get_poll_votes(&self, poll_id: &str) -> Result<Vec<PollVote>>;
    async fn put_poll_vote(&self, vote: &PollVote) -> Result<()>;

    async fn get_notification(
        &self,
        notification_type: NotificationType,
        target_account_id: &str,
        origin_account_id: &str,
        status_id: Option<&str>,
    ) -> Result<Option<Notification>>;
    async fn put_notification(&self, notification: &Notification) -> Result<()>;
    async fn delete_notification_by_id(&self, id: &str) -> Result<bool>;
    async fn delete_status_notifications(&self, status_id: &str) -> Result<()>;

    async fn get_move_by_id(&self, id: &str) -> Result<Option<Move>>;
    async fn update_move(&self, mv: &Move) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimelineKind {
    Home,
    List,
}

impl TimelineKind {
    pub const ALL: [TimelineKind; 2] = [TimelineKind::Home, TimelineKind::List];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::List => "list",
        }
    }
}

#[async_trait]
pub trait Timelines: Send + Sync {
    /// Drops the prepared form of a status so the next read rebuilds it.
    async fn unprepare(&self, kind: TimelineKind, status_id: &str) -> Result<()>;
    async fn wipe_items_from_account(
        &self,
        kind: TimelineKind,
        owner_account_id: &str,
        author_account_id: &str,
    ) -> Result<()>;
    /// Returns whether the status was actually inserted.
    async fn ingest(&self, kind: TimelineKind, owner_account_id: &str, status: &Status)
        -> Result<bool>;
    async fn remove_status(&self, status_id: &str) -> Result<()>;
}

#[async_trait]
pub trait Streams: Send + Sync {
    async fn notify(&self, account: &Account, notification: &Notification) -> Result<()>;
    async fn update(&self, account: &Account, status: &Status) -> Result<()>;
    async fn status_update(&self, account: &Account, status: &Status) -> Result<()>;
    async fn delete(&self, status_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub template: &'static str,
    pub data: serde_json::Value,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<()>;
}

/// Outbound federation. Delivery retries are the transport's concern.
#[async_trait]
pub trait Federator: Send + Sync {
    async fn create_status(&self, status: &Status) -> Result<()>;
    async fn update_status(&self, status: &Status) -> Result<()>;
    async fn delete_status(&self, status: &Status) -> Result<()>;
    async fn follow(&self, follow: &Follow) -> Result<()>;
    async fn accept_follow(&self, follow: &Follow) -> Result<()>;
    async fn reject_follow(&self, follow: &Follow) -> Result<()>;
    async fn undo_follow(&self, follow: &Follow) -> Result<()>;
    async fn like(&self, fave: &StatusFave) -> Result<()>;
    async fn undo_like(&self, fave: &StatusFave) -> Result<()>;
    async fn announce(&self, boost: &Status) -> Result<()>;
    async fn undo_announce(&self, boost: &Status) -> Result<()>;
    async fn block(&self, block: &Block) -> Result<()>;
    async fn undo_block(&self, block: &Block) -> Result<()>;
    async fn flag(&self, report: &Report) -> Result<()>;
    async fn move_account(&self, account: &Account) -> Result<()>;
    async fn update_account(&self, account: &Account) -> Result<()>;
    async fn delete_account(&self, account: &Account) -> Result<()>;
    async fn create_poll_vote(&self, poll: &Poll, vote: &PollVote) -> Result<()>;
}

/// Remote fetch + upsert, owned by the federation layer.
#[async_trait]
pub trait Dereferencer: Send + Sync {
    /// Returns the stored status and the object it was built from. The
    /// object is `None` when another worker already created this status.
    async fn refresh_status(
        &self,
        requesting_username: &str,
        status: Status,
        object: Option<ApObject>,
    ) -> Result<(Status, Option<ApObject>)>;
    async fn get_status_by_uri(
        &self,
        requesting_username: &str,
        uri: &str,
    ) -> Result<(Status, Option<ApObject>)>;
    /// Stores the boost and its target. Fails with `Unretrievable` when the
    /// boosted status cannot be fetched at all.
    async fn enrich_announce(&self, boost: Status, requesting_username: &str) -> Result<Status>;
    async fn refresh_account(
        &self,
        requesting_username: &str,
        account: Account,
        object: Option<ApObject>,
    ) -> Result<Account>;
}

#[async_trait]
pub trait Visibility: Send + Sync {
    async fn account_visible(&self, viewer: &Account, account: &Account) -> Result<bool>;
    async fn status_visible(&self, viewer: &Account, status: &Status) -> Result<bool>;
}

/// The pipeline's handle on its own queues.
#[async_trait]
pub trait Queues: Send + Sync {
    /// Drops pending items whose `key` equals `value`; returns how many went.
    async fn purge(&self, queue: QueueName, key: QueueKey, value: &str) -> Result<u64>;
    async fn enqueue_client(&self, envelope: Envelope) -> Result<()>;
}

#[derive(Clone)]
pub struct State {
    pub store: Arc<dyn Store>,
    pub timelines: Arc<dyn Timelines>,
    pub streams: Arc<dyn Streams>,
    pub mailer: Arc<dyn Mailer>,
    pub federator: Arc<dyn Federator>,
    pub dereferencer: Arc<dyn Dereferencer>,
    pub visibility: Arc<dyn Visibility>,
    pub queues: Arc<dyn Queues>,
    pub locks: Arc<KeyedLocks>,
}
