/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! In-memory collaborators with failure injection.
//!
//! One `World` implements every collaborator trait so a test can seed data,
//! run an envelope, then inspect what each side saw. Every mutating call is
//! appended to a journal for ordering checks.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fanout_core::error::Unretrievable;
use fanout_core::state::{
    Dereferencer, Email, Federator, Mailer, Queues, StatsDelta, Store, Streams, TimelineKind,
    Timelines, Visibility,
};
use fanout_core::{Processor, QueueKey, QueueName, QueueSettings, State};
use fanout_protocol::{
    Account, ApObject, Block, DeniedUser, Envelope, Follow, FollowRequest, Move, Notification,
    NotificationType, Poll, PollVote, Report, Status, StatusFave, User,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct Data {
    pub accounts: HashMap<String, Account>,
    pub users: HashMap<String, User>,
    pub denied: Vec<DeniedUser>,
    pub moderators: Vec<String>,
    pub follows: Vec<Follow>,
    pub follow_requests: Vec<FollowRequest>,
    pub statuses: HashMap<String, Status>,
    pub polls: HashMap<String, Poll>,
    pub poll_votes: Vec<PollVote>,
    pub muted_threads: HashSet<(String, String)>,
    /// Accounts `account_visible` reports as hidden.
    pub hidden: HashSet<String>,
    pub notifications: Vec<Notification>,
    pub moves: HashMap<String, Move>,
    pub stats: HashMap<String, StatsDelta>,
    pub home: HashMap<String, Vec<String>>,
    pub lists: HashMap<String, Vec<String>>,
    pub unprepared: Vec<(TimelineKind, String)>,
    pub emails: Vec<Email>,
    pub federated: Vec<String>,
    pub streamed: Vec<String>,
    pub enqueued: Vec<Envelope>,
    pub purges: Vec<(QueueName, QueueKey, String)>,
    pub journal: Vec<String>,
}

#[derive(Default)]
pub struct World {
    pub data: Mutex<Data>,
    fail: Mutex<HashSet<String>>,
    /// `refresh_status` reports that another worker created the status.
    pub lost_race: Mutex<bool>,
}

impl World {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(self: &Arc<Self>) -> State {
        State {
            store: self.clone(),
            timelines: self.clone(),
            streams: self.clone(),
            mailer: self.clone(),
            federator: self.clone(),
            dereferencer: self.clone(),
            visibility: self.clone(),
            queues: self.clone(),
            locks: Arc::new(
                QueueSettings {
                    lock_shards: 4,
                    ..Default::default()
                }
                .keyed_locks(),
            ),
        }
    }

    pub fn processor(self: &Arc<Self>) -> Processor {
        Processor::new(self.state())
    }

    /// Makes every later call of `op` fail.
    pub fn fail_on(&self, op: &str) {
        self.fail.lock().unwrap().insert(op.to_string());
    }

    fn check(&self, op: &str) -> Result<()> {
        if self.fail.lock().unwrap().contains(op) {
            return Err(anyhow!("injected failure: {op}"));
        }
        Ok(())
    }

    fn log(&self, entry: String) {
        self.data.lock().unwrap().journal.push(entry);
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Data) -> R) -> R {
        f(&mut self.data.lock().unwrap())
    }

    pub fn journal(&self) -> Vec<String> {
        self.with(|d| d.journal.clone())
    }

    pub fn add_account(&self, account: Account) -> Account {
        self.with(|d| d.accounts.insert(account.id.clone(), account.clone()));
        account
    }

    pub fn add_status(&self, status: Status) -> Status {
        self.with(|d| d.statuses.insert(status.id.clone(), status.clone()));
        status
    }

    pub fn add_follow(&self, follower: &Account, target: &Account) -> Follow {
        let follow = Follow {
            id: format!("follow-{}-{}", follower.id, target.id),
            uri: format!("{}/follow/{}", follower.uri, target.id),
            account_id: follower.id.clone(),
            target_account_id: target.id.clone(),
            notify: false,
        };
        self.with(|d| d.follows.push(follow.clone()));
        follow
    }

    pub fn notifications_of(&self, ty: NotificationType) -> Vec<Notification> {
        self.with(|d| {
            d.notifications
                .iter()
                .filter(|n| n.notification_type == ty)
                .cloned()
                .collect()
        })
    }

    pub fn federated(&self) -> Vec<String> {
        self.with(|d| d.federated.clone())
    }

    pub fn stats(&self, account_id: &str) -> StatsDelta {
        self.with(|d| d.stats.get(account_id).copied().unwrap_or_default())
    }
}

pub fn local(id: &str) -> Account {
    Account {
        id: id.to_string(),
        uri: format!("https://here.example/users/{id}"),
        username: id.to_string(),
        ..Default::default()
    }
}

pub fn remote(id: &str) -> Account {
    Account {
        id: id.to_string(),
        uri: format!("https://there.example/users/{id}"),
        username: id.to_string(),
        domain: Some("there.example".to_string()),
        ..Default::default()
    }
}

pub fn status(id: &str, author: &Account) -> Status {
    Status {
        id: id.to_string(),
        uri: format!("{}/statuses/{id}", author.uri),
        account_id: author.id.clone(),
        local: author.is_local(),
        thread_id: format!("thread-{id}"),
        created_at_ms: 1_700_000_000_000,
        ..Default::default()
    }
}

fn relation_matches(account_id: &str, target_id: &str, a: &str, t: &str) -> bool {
    account_id == a && target_id == t
}

#[async_trait]
impl Store for World {
    async fn get_account_by_id(&self, id: &str) -> Result<Option<Account>> {
        self.check("get_account_by_id")?;
        Ok(self.with(|d| d.accounts.get(id).cloned()))
    }

    async fn update_account(&self, account: &Account) -> Result<()> {
        self.check("update_account")?;
        self.log(format!("update_account:{}", account.id));
        self.with(|d| d.accounts.insert(account.id.clone(), account.clone()));
        Ok(())
    }

    async fn delete_account(&self, id: &str) -> Result<bool> {
        self.check("delete_account")?;
        self.log(format!("delete_account:{id}"));
        Ok(self.with(|d| d.accounts.remove(id).is_some()))
    }

    async fn delete_account_data(&self, account: &Account, origin_id: &str) -> Result<()> {
        self.check("delete_account_data")?;
        self.log(format!("delete_account_data:{}:{origin_id}", account.id));
        self.with(|d| {
            d.statuses.retain(|_, s| s.account_id != account.id);
            d.follows
                .retain(|f| f.account_id != account.id && f.target_account_id != account.id);
            d.accounts.remove(&account.id);
        });
        Ok(())
    }

    async fn update_account_stats(&self, account_id: &str, delta: StatsDelta) -> Result<()> {
        self.check("update_account_stats")?;
        self.with(|d| {
            let s = d.stats.entry(account_id.to_string()).or_default();
            s.statuses += delta.statuses;
            s.followers += delta.followers;
            s.following += delta.following;
            s.follow_requests += delta.follow_requests;
            if delta.last_status_at_ms.is_some() {
                s.last_status_at_ms = delta.last_status_at_ms;
            }
        });
        Ok(())
    }

    async fn get_instance_moderators(&self) -> Result<Vec<Account>> {
        self.check("get_instance_moderators")?;
        Ok(self.with(|d| {
            d.moderators
                .iter()
                .filter_map(|id| d.accounts.get(id).cloned())
                .collect()
        }))
    }

    async fn get_user_by_account_id(&self, account_id: &str) -> Result<Option<User>> {
        self.check("get_user_by_account_id")?;
        Ok(self.with(|d| d.users.get(account_id).cloned()))
    }

    async fn get_instance_moderator_users(&self) -> Result<Vec<User>> {
        self.check("get_instance_moderator_users")?;
        Ok(self.with(|d| {
            d.moderators
                .iter()
                .filter_map(|id| d.users.get(id).cloned())
                .collect()
        }))
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        self.check("update_user")?;
        self.log(format!("update_user:{}", user.id));
        self.with(|d| d.users.insert(user.account_id.clone(), user.clone()));
        Ok(())
    }

    async fn delete_user_by_id(&self, id: &str) -> Result<bool> {
        self.check("delete_user_by_id")?;
        self.log(format!("delete_user:{id}"));
        Ok(self.with(|d| {
            let before = d.users.len();
            d.users.retain(|_, u| u.id != id);
            before != d.users.len()
        }))
    }

    async fn put_denied_user(&self, denied: &DeniedUser) -> Result<()> {
        self.check("put_denied_user")?;
        self.with(|d| d.denied.push(denied.clone()));
        Ok(())
    }

    async fn get_local_followers(&self, account_id: &str) -> Result<Vec<Follow>> {
        self.check("get_local_followers")?;
        Ok(self.with(|d| {
            d.follows
                .iter()
                .filter(|f| f.target_account_id == account_id)
                .filter(|f| {
                    d.accounts
                        .get(&f.account_id)
                        .map(|a| a.is_local())
                        .unwrap_or(false)
                })
                .cloned()
                .collect()
        }))
    }

    async fn is_following(&self, account_id: &str, target_account_id: &str) -> Result<bool> {
        self.check("is_following")?;
        Ok(self.with(|d| {
            d.follows.iter().any(|f| {
                relation_matches(account_id, target_account_id, &f.account_id, &f.target_account_id)
            })
        }))
    }

    async fn put_follow_request(&self, request: &FollowRequest) -> Result<()> {
        self.check("put_follow_request")?;
        self.log(format!(
            "put_follow_request:{}->{}",
            request.account_id, request.target_account_id
        ));
        self.with(|d| d.follow_requests.push(request.clone()));
        Ok(())
    }

    async fn accept_follow_request(&self, account_id: &str, target_account_id: &str) -> Result<Follow> {
        self.check("accept_follow_request")?;
        self.with(|d| -> Result<Follow> {
            let idx = d
                .follow_requests
                .iter()
                .position(|r| {
                    relation_matches(account_id, target_account_id, &r.account_id, &r.target_account_id)
                })
                .ok_or_else(|| anyhow!("no follow request {account_id} -> {target_account_id}"))?;
            let follow = d.follow_requests.remove(idx).to_follow();
            d.follows.push(follow.clone());
            Ok(follow)
        })
    }

    async fn delete_follow(&self, account_id: &str, target_account_id: &str) -> Result<bool> {
        self.log(format!("delete_follow:{account_id}->{target_account_id}"));
        self.check("delete_follow")?;
        Ok(self.with(|d| {
            let before = d.follows.len();
            d.follows.retain(|f| {
                !relation_matches(account_id, target_account_id, &f.account_id, &f.target_account_id)
            });
            before != d.follows.len()
        }))
    }

    async fn delete_follow_request(&self, account_id: &str, target_account_id: &str) -> Result<bool> {
        self.log(format!("delete_follow_request:{account_id}->{target_account_id}"));
        self.check("delete_follow_request")?;
        Ok(self.with(|d| {
            let before = d.follow_requests.len();
            d.follow_requests.retain(|r| {
                !relation_matches(account_id, target_account_id, &r.account_id, &r.target_account_id)
            });
            before != d.follow_requests.len()
        }))
    }

    async fn get_status_by_id(&self, id: &str) -> Result<Option<Status>> {
        self.check("get_status_by_id")?;
        Ok(self.with(|d| d.statuses.get(id).cloned()))
    }

    async fn get_status_boosts(&self, status_id: &str) -> Result<Vec<Status>> {
        self.check("get_status_boosts")?;
        Ok(self.with(|d| {
            d.statuses
                .values()
                .filter(|s| s.boost_of() == Some(status_id))
                .cloned()
                .collect()
        }))
    }

    async fn delete_status_by_id(&self, id: &str) -> Result<bool> {
        self.check("delete_status_by_id")?;
        self.log(format!("delete_status:{id}"));
        Ok(self.with(|d| d.statuses.remove(id).is_some()))
    }

    async fn is_thread_muted(&self, thread_id: &str, account_id: &str) -> Result<bool> {
        self.check("is_thread_muted")?;
        Ok(self.with(|d| {
            d.muted_threads
                .contains(&(thread_id.to_string(), account_id.to_string()))
        }))
    }

    async fn delete_attachment(&self, id: &str) -> Result<()> {
        self.check("delete_attachment")?;
        self.log(format!("delete_attachment:{id}"));
        Ok(())
    }

    async fn unattach_attachment(&self, id: &str) -> Result<()> {
        self.check("unattach_attachment")?;
        self.log(format!("unattach_attachment:{id}"));
        Ok(())
    }

    async fn get_poll_by_id(&self, id: &str) -> Result<Option<Poll>> {
        self.check("get_poll_by_id")?;
        Ok(self.with(|d| d.polls.get(id).cloned()))
    }

    async fn get_poll_votes(&self, poll_id: &str) -> Result<Vec<PollVote>> {
        self.check("get_poll_votes")?;
        Ok(self.with(|d| {
            d.poll_votes
                .iter()
                .filter(|v| v.poll_id == poll_id)
                .cloned()
                .collect()
        }))
    }

    async fn put_poll_vote(&self, vote: &PollVote) -> Result<()> {
        self.check("put_poll_vote")?;
        self.with(|d| d.poll_votes.push(vote.clone()));
        Ok(())
    }

    async fn get_notification(
        &self,
        notification_type: NotificationType,
        target_account_id: &str,
        origin_account_id: &str,
        status_id: Option<&str>,
    ) -> Result<Option<Notification>> {
        self.check("get_notification")?;
        // Give concurrent callers a chance to interleave between check and put.
        tokio::task::yield_now().await;
        Ok(self.with(|d| {
            d.notifications
                .iter()
                .find(|n| {
                    n.identity()
                        == (notification_type, target_account_id, origin_account_id, status_id)
                })
                .cloned()
        }))
    }

    async fn put_notification(&self, notification: &Notification) -> Result<()> {
        self.check("put_notification")?;
        tokio::task::yield_now().await;
        self.log(format!("put_notification:{}", notification.notification_type));
        self.with(|d| d.notifications.push(notification.clone()));
        Ok(())
    }

    async fn delete_notification_by_id(&self, id: &str) -> Result<bool> {
        self.check("delete_notification_by_id")?;
        Ok(self.with(|d| {
            let before = d.notifications.len();
            d.notifications.retain(|n| n.id != id);
            before != d.notifications.len()
        }))
    }

    async fn delete_status_notifications(&self, status_id: &str) -> Result<()> {
        self.check("delete_status_notifications")?;
        self.log(format!("delete_status_notifications:{status_id}"));
        self.with(|d| {
            d.notifications
                .retain(|n| n.status_id.as_deref() != Some(status_id))
        });
        Ok(())
    }

    async fn get_move_by_id(&self, id: &str) -> Result<Option<Move>> {
        self.check("get_move_by_id")?;
        Ok(self.with(|d| d.moves.get(id).cloned()))
    }

    async fn update_move(&self, mv: &Move) -> Result<()> {
        self.check("update_move")?;
        self.log(format!("update_move:{}", mv.id));
        self.with(|d| d.moves.insert(mv.id.clone(), mv.clone()));
        Ok(())
    }
}

#[async_trait]
impl Timelines for World {
    async fn unprepare(&self, kind: TimelineKind, status_id: &str) -> Result<()> {
        self.check("unprepare")?;
        self.with(|d| d.unprepared.push((kind, status_id.to_string())));
        Ok(())
    }

    async fn wipe_items_from_account(
        &self,
        kind: TimelineKind,
        owner_account_id: &str,
        author_account_id: &str,
    ) -> Result<()> {
        self.log(format!(
            "wipe:{}:{owner_account_id}:{author_account_id}",
            kind.as_str()
        ));
        self.check("wipe_items_from_account")?;
        self.with(|d| {
            let statuses = &d.statuses;
            let tl = match kind {
                TimelineKind::Home => d.home.entry(owner_account_id.to_string()).or_default(),
                TimelineKind::List => d.lists.entry(owner_account_id.to_string()).or_default(),
            };
            tl.retain(|id| {
                statuses
                    .get(id)
                    .map(|s| s.account_id != author_account_id)
                    .unwrap_or(true)
            });
        });
        Ok(())
    }

    async fn ingest(&self, kind: TimelineKind, owner_account_id: &str, status: &Status) -> Result<bool> {
        self.check("ingest")?;
        Ok(self.with(|d| {
            let tl = match kind {
                TimelineKind::Home => d.home.entry(owner_account_id.to_string()).or_default(),
                TimelineKind::List => d.lists.entry(owner_account_id.to_string()).or_default(),
            };
            if tl.contains(&status.id) {
                false
            } else {
                tl.push(status.id.clone());
                true
            }
        }))
    }

    async fn remove_status(&self, status_id: &str) -> Result<()> {
        self.check("remove_status")?;
        self.log(format!("remove_from_timelines:{status_id}"));
        self.with(|d| {
            for tl in d.home.values_mut().chain(d.lists.values_mut()) {
                tl.retain(|id| id != status_id);
            }
        });
        Ok(())
    }
}

#[async_trait]
impl Streams for World {
    async fn notify(&self, account: &Account, notification: &Notification) -> Result<()> {
        self.check("stream_notify")?;
        self.with(|d| {
            d.streamed.push(format!(
                "notification:{}:{}",
                account.id, notification.notification_type
            ))
        });
        Ok(())
    }

    async fn update(&self, account: &Account, status: &Status) -> Result<()> {
        self.check("stream_update")?;
        self.with(|d| d.streamed.push(format!("update:{}:{}", account.id, status.id)));
        Ok(())
    }

    async fn status_update(&self, account: &Account, status: &Status) -> Result<()> {
        self.check("stream_status_update")?;
        self.with(|d| d.streamed.push(format!("status_update:{}:{}", account.id, status.id)));
        Ok(())
    }

    async fn delete(&self, status_id: &str) -> Result<()> {
        self.check("stream_delete")?;
        self.with(|d| d.streamed.push(format!("delete:{status_id}")));
        Ok(())
    }
}

#[async_trait]
impl Mailer for World {
    async fn send(&self, email: Email) -> Result<()> {
        self.check("send_email")?;
        self.with(|d| d.emails.push(email));
        Ok(())
    }
}

impl World {
    fn federate(&self, op: &str, id: &str) -> Result<()> {
        self.check(op)?;
        self.log(format!("federate:{op}:{id}"));
        self.with(|d| d.federated.push(format!("{op}:{id}")));
        Ok(())
    }
}

#[async_trait]
impl Federator for World {
    async fn create_status(&self, status: &Status) -> Result<()> {
        self.federate("create_status", &status.id)
    }
    async fn update_status(&self, status: &Status) -> Result<()> {
        self.federate("update_status", &status.id)
    }
    async fn delete_status(&self, status: &Status) -> Result<()> {
        self.federate("delete_status", &status.id)
    }
    async fn follow(&self, follow: &Follow) -> Result<()> {
        self.federate("follow", &follow.id)
    }
    async fn accept_follow(&self, follow: &Follow) -> Result<()> {
        self.federate("accept_follow", &follow.id)
    }
    async fn reject_follow(&self, follow: &Follow) -> Result<()> {
        self.federate("reject_follow", &follow.id)
    }
    async fn undo_follow(&self, follow: &Follow) -> Result<()> {
        self.federate("undo_follow", &follow.id)
    }
    async fn like(&self, fave: &StatusFave) -> Result<()> {
        self.federate("like", &fave.id)
    }
    async fn undo_like(&self, fave: &StatusFave) -> Result<()> {
        self.federate("undo_like", &fave.id)
    }
    async fn announce(&self, boost: &Status) -> Result<()> {
        self.federate("announce", &boost.id)
    }
    async fn undo_announce(&self, boost: &Status) -> Result<()> {
        self.federate("undo_announce", &boost.id)
    }
    async fn block(&self, block: &Block) -> Result<()> {
        self.federate("block", &block.id)
    }
    async fn undo_block(&self, block: &Block) -> Result<()> {
        self.federate("undo_block", &block.id)
    }
    async fn flag(&self, report: &Report) -> Result<()> {
        self.federate("flag", &report.id)
    }
    async fn move_account(&self, account: &Account) -> Result<()> {
        self.federate("move_account", &account.id)
    }
    async fn update_account(&self, account: &Account) -> Result<()> {
        self.federate("update_account", &account.id)
    }
    async fn delete_account(&self, account: &Account) -> Result<()> {
        self.federate("delete_account", &account.id)
    }
    async fn create_poll_vote(&self, _poll: &Poll, vote: &PollVote) -> Result<()> {
        self.federate("create_poll_vote", &vote.id)
    }
}

#[async_trait]
impl Dereferencer for World {
    async fn refresh_status(
        &self,
        _requesting_username: &str,
        status: Status,
        object: Option<ApObject>,
    ) -> Result<(Status, Option<ApObject>)> {
        self.check("refresh_status")?;
        let stored = self.with(|d| d.statuses.values().find(|s| s.uri == status.uri).cloned());
        let status = stored.unwrap_or(status);
        if *self.lost_race.lock().unwrap() {
            return Ok((status, None));
        }
        Ok((status, object))
    }

    async fn get_status_by_uri(
        &self,
        _requesting_username: &str,
        uri: &str,
    ) -> Result<(Status, Option<ApObject>)> {
        self.check("get_status_by_uri")?;
        let stored = self
            .with(|d| d.statuses.values().find(|s| s.uri == uri).cloned())
            .ok_or_else(|| anyhow!("status {uri} not found"))?;
        let object = ApObject {
            id: uri.to_string(),
            ty: "Note".to_string(),
            ..Default::default()
        };
        Ok((stored, Some(object)))
    }

    async fn enrich_announce(&self, boost: Status, _requesting_username: &str) -> Result<Status> {
        if self.fail.lock().unwrap().contains("enrich_announce_unretrievable") {
            return Err(anyhow::Error::new(Unretrievable(
                boost.boost_of_id.clone().unwrap_or_default(),
            )));
        }
        self.check("enrich_announce")?;
        self.with(|d| d.statuses.insert(boost.id.clone(), boost.clone()));
        Ok(boost)
    }

    async fn refresh_account(
        &self,
        _requesting_username: &str,
        account: Account,
        _object: Option<ApObject>,
    ) -> Result<Account> {
        self.check("refresh_account")?;
        Ok(self.with(|d| d.accounts.get(&account.id).cloned()).unwrap_or(account))
    }
}

#[async_trait]
impl Visibility for World {
    async fn account_visible(&self, _viewer: &Account, account: &Account) -> Result<bool> {
        self.check("account_visible")?;
        Ok(self.with(|d| !d.hidden.contains(&account.id)))
    }

    async fn status_visible(&self, _viewer: &Account, _status: &Status) -> Result<bool> {
        self.check("status_visible")?;
        Ok(true)
    }
}

#[async_trait]
impl Queues for World {
    async fn purge(&self, queue: QueueName, key: QueueKey, value: &str) -> Result<u64> {
        self.check("purge")?;
        self.log(format!("purge:{}:{}:{value}", queue.as_str(), key.column()));
        self.with(|d| d.purges.push((queue, key, value.to_string())));
        Ok(0)
    }

    async fn enqueue_client(&self, envelope: Envelope) -> Result<()> {
        self.check("enqueue_client")?;
        self.log(format!(
            "enqueue_client:{}/{}:{}",
            envelope.verb, envelope.object_type, envelope.origin.id
        ));
        self.with(|d| d.enqueued.push(envelope));
        Ok(())
    }
}
