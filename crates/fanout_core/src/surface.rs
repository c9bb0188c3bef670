/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Named reactions to events: notifications, timeline fan-out and streaming.

use crate::error::ErrorList;
use crate::state::{State, TimelineKind};
use anyhow::{anyhow, Context, Result};
use fanout_protocol::{
    Account, Follow, FollowRequest, NotificationType, Report, Status, StatusFave, User,
};
use std::collections::HashSet;

#[derive(Clone)]
pub struct Surface {
    state: State,
}

impl Surface {
    pub fn new(state: State) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    async fn account(&self, id: &str) -> Result<Option<Account>> {
        self.state
            .store
            .get_account_by_id(id)
            .await
            .with_context(|| format!("get account {id}"))
    }

    async fn thread_muted(&self, thread_id: &str, account_id: &str) -> Result<bool> {
        if thread_id.is_empty() {
            return Ok(false);
        }
        self.state
            .store
            .is_thread_muted(thread_id, account_id)
            .await
            .with_context(|| format!("check thread mute {thread_id}"))
    }

    pub async fn notify_mentions(&self, status: &Status) -> Result<()> {
        let mut errs = ErrorList::new();
        for mention in &status.mentions {
            let target = match self.account(&mention.target_account_id).await {
                Ok(Some(a)) => a,
                Ok(None) => continue,
                Err(e) => {
                    errs.push_context(format!("populate mention {}", mention.id), e);
                    continue;
                }
            };
            if target.is_remote() {
                continue;
            }
            match self.thread_muted(&status.thread_id, &target.id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    errs.push(e);
                    continue;
                }
            }
            let origin = match self.account(&mention.origin_account_id).await {
                Ok(Some(a)) => a,
                Ok(None) => continue,
                Err(e) => {
                    errs.push_context(format!("populate mention {}", mention.id), e);
                    continue;
                }
            };
            if let Err(e) = self
                .notify(NotificationType::Mention, &target, &origin, Some(&status.id))
                .await
            {
                errs.push_context(format!("notify mention target {}", target.id), e);
            }
        }
        errs.into_result()
    }

    pub async fn notify_follow_request(&self, request: &FollowRequest) -> Result<()> {
        let Some(target) = self.account(&request.target_account_id).await? else {
            return Ok(());
        };
        if target.is_remote() {
            return Ok(());
        }
        let Some(origin) = self.account(&request.account_id).await? else {
            return Ok(());
        };
        self.notify(NotificationType::FollowRequest, &target, &origin, None)
            .await
            .with_context(|| format!("notify follow target {}", target.id))?;
        Ok(())
    }

    /// Replaces any pending follow-request notification with a follow one.
    pub async fn notify_follow(&self, follow: &Follow) -> Result<()> {
        let Some(target) = self.account(&follow.target_account_id).await? else {
            return Ok(());
        };
        if target.is_remote() {
            return Ok(());
        }
        let Some(origin) = self.account(&follow.account_id).await? else {
            return Ok(());
        };

        let store = &self.state.store;
        let previous = store
            .get_notification(NotificationType::FollowRequest, &target.id, &origin.id, None)
            .await
            .context("get follow request notification")?;
        if let Some(previous) = previous {
            store
                .delete_notification_by_id(&previous.id)
                .await
                .with_context(|| format!("delete notification {}", previous.id))?;
        }

        self.notify(NotificationType::Follow, &target, &origin, None)
            .await
            .with_context(|| format!("notify follow target {}", target.id))?;
        Ok(())
    }

    pub async fn notify_fave(&self, fave: &StatusFave) -> Result<()> {
        if fave.target_account_id == fave.account_id {
            return Ok(());
        }
        let Some(target) = self.account(&fave.target_account_id).await? else {
            return Ok(());
        };
        if target.is_remote() {
            return Ok(());
        }
        let Some(status) = self
            .state
            .store
            .get_status_by_id(&fave.status_id)
            .await
            .with_context(|| format!("get faved status {}", fave.status_id))?
        else {
            return Ok(());
        };
        if self.thread_muted(&status.thread_id, &target.id).await? {
            return Ok(());
        }
        let Some(origin) = self.account(&fave.account_id).await? else {
            return Ok(());
        };
        self.notify(
            NotificationType::Favourite,
            &target,
            &origin,
            Some(&fave.status_id),
        )
        .await
        .with_context(|| format!("notify status author {}", target.id))?;
        Ok(())
    }

    pub async fn notify_announce(&self, boost: &Status) -> Result<()> {
        let Some(boost_of) = boost.boost_of() else {
            return Ok(());
        };
        if boost.boost_of_account_id.as_deref() == Some(boost.account_id.as_str()) {
            return Ok(());
        }
        let Some(original) = self
            .state
            .store
            .get_status_by_id(boost_of)
            .await
            .with_context(|| format!("get boosted status {boost_of}"))?
        else {
            return Ok(());
        };
        let Some(target) = self.account(&original.account_id).await? else {
            return Ok(());
        };
        if target.is_remote() || target.id == boost.account_id {
            return Ok(());
        }
        if self.thread_muted(&original.thread_id, &target.id).await? {
            return Ok(());
        }
        let Some(origin) = self.account(&boost.account_id).await? else {
            return Ok(());
        };
        self.notify(NotificationType::Reblog, &target, &origin, Some(&boost.id))
            .await
            .with_context(|| format!("notify status author {}", target.id))?;
        Ok(())
    }

    /// Tells the poll's author and each distinct local voter that it closed.
    pub async fn notify_poll_close(&self, status: &Status) -> Result<()> {
        let Some(poll) = status.poll.as_ref() else {
            return Ok(());
        };
        let votes = self
            .state
            .store
            .get_poll_votes(&poll.id)
            .await
            .with_context(|| format!("get poll {} votes", poll.id))?;
        let Some(author) = self.account(&status.account_id).await? else {
            return Ok(());
        };

        let mut errs = ErrorList::new();
        if author.is_local() {
            if let Err(e) = self
                .notify(NotificationType::Poll, &author, &author, Some(&status.id))
                .await
            {
                errs.push_context("notify poll author", e);
            }
        }

        let mut seen = HashSet::new();
        for vote in votes {
            if !seen.insert(vote.account_id.clone()) {
                continue;
            }
            let voter = match self.account(&vote.account_id).await {
                Ok(Some(a)) => a,
                Ok(None) => continue,
                Err(e) => {
                    errs.push(e);
                    continue;
                }
            };
            if voter.is_remote() {
                continue;
            }
            if let Err(e) = self
                .notify(NotificationType::Poll, &voter, &author, Some(&status.id))
                .await
            {
                errs.push_context(format!("notify poll voter {}", voter.id), e);
            }
        }
        errs.into_result()
    }

    pub async fn notify_signup(&self, user: &User) -> Result<()> {
        let mods = self
            .state
            .store
            .get_instance_moderators()
            .await
            .context("get instance moderators")?;
        if mods.is_empty() {
            return Ok(());
        }
        let account = self
            .account(&user.account_id)
            .await?
            .ok_or_else(|| anyhow!("account {} of new user {} missing", user.account_id, user.id))?;

        let mut errs = ErrorList::new();
        for m in &mods {
            if let Err(e) = self
                .notify(NotificationType::Signup, m, &account, None)
                .await
            {
                errs.push_context(format!("notify moderator {}", m.id), e);
            }
        }
        errs.into_result()
    }

    /// One admin notice per (moderator, reporter); repeat reports fold into it.
    pub async fn notify_report(&self, report: &Report) -> Result<()> {
        let mods = self
            .state
            .store
            .get_instance_moderators()
            .await
            .context("get instance moderators")?;
        if mods.is_empty() {
            return Ok(());
        }
        let Some(reporter) = self.account(&report.account_id).await? else {
            return Ok(());
        };

        let mut errs = ErrorList::new();
        for m in mods.iter().filter(|m| m.id != reporter.id) {
            if let Err(e) = self
                .notify(NotificationType::AdminReport, m, &reporter, None)
                .await
            {
                errs.push_context(format!("notify moderator {}", m.id), e);
            }
        }
        errs.into_result()
    }

    /// Puts a new status into the author's and each local follower's
    /// timelines, streams what was inserted, then notifies mentions.
    pub async fn timeline_and_notify_status(&self, status: &Status) -> Result<()> {
        let Some(author) = self.account(&status.account_id).await? else {
            return Ok(());
        };
        let mut errs = ErrorList::new();

        if author.is_local() {
            if let Err(e) = self.timeline_for(&author, status).await {
                errs.push(e);
            }
        }

        let follows = self
            .state
            .store
            .get_local_followers(&author.id)
            .await
            .with_context(|| format!("get local followers of {}", author.id))?;
        for follow in follows {
            let follower = match self.account(&follow.account_id).await {
                Ok(Some(a)) => a,
                Ok(None) => continue,
                Err(e) => {
                    errs.push(e);
                    continue;
                }
            };
            match self.state.visibility.status_visible(&follower, status).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    errs.push_context(format!("check visibility for {}", follower.id), e);
                    continue;
                }
            }
            if let Err(e) = self.timeline_for(&follower, status).await {
                errs.push(e);
            }
            if follow.notify && !status.is_boost() {
                if let Err(e) = self
                    .notify(NotificationType::Status, &follower, &author, Some(&status.id))
                    .await
                {
                    errs.push_context(format!("notify follower {}", follower.id), e);
                }
            }
        }

        if let Err(e) = self.notify_mentions(status).await {
            errs.push(e);
        }
        errs.into_result()
    }

    async fn timeline_for(&self, owner: &Account, status: &Status) -> Result<()> {
        let timelines = &self.state.timelines;
        let inserted = timelines
            .ingest(TimelineKind::Home, &owner.id, status)
            .await
            .with_context(|| format!("ingest {} into home of {}", status.id, owner.id))?;
        if inserted {
            self.state
                .streams
                .update(owner, status)
                .await
                .with_context(|| format!("stream {} to {}", status.id, owner.id))?;
        }
        timelines
            .ingest(TimelineKind::List, &owner.id, status)
            .await
            .with_context(|| format!("ingest {} into lists of {}", status.id, owner.id))?;
        Ok(())
    }

    /// Streams an edit to everyone whose home timeline may show the status.
    pub async fn timeline_status_update(&self, status: &Status) -> Result<()> {
        let Some(author) = self.account(&status.account_id).await? else {
            return Ok(());
        };
        let streams = &self.state.streams;
        let mut errs = ErrorList::new();
        if author.is_local() {
            if let Err(e) = streams.status_update(&author, status).await {
                errs.push_context(format!("stream edit to {}", author.id), e);
            }
        }
        let follows = self
            .state
            .store
            .get_local_followers(&author.id)
            .await
            .with_context(|| format!("get local followers of {}", author.id))?;
        for follow in follows {
            let Ok(Some(follower)) = self.account(&follow.account_id).await else {
                continue;
            };
            if !matches!(
                self.state.visibility.status_visible(&follower, status).await,
                Ok(true)
            ) {
                continue;
            }
            if let Err(e) = streams.status_update(&follower, status).await {
                errs.push_context(format!("stream edit to {}", follower.id), e);
            }
        }
        errs.into_result()
    }

    pub async fn delete_status_from_timelines(&self, status_id: &str) -> Result<()> {
        self.state
            .timelines
            .remove_status(status_id)
            .await
            .with_context(|| format!("remove {status_id} from timelines"))?;
        self.state
            .streams
            .delete(status_id)
            .await
            .with_context(|| format!("stream delete of {status_id}"))
    }

    /// Marks the prepared form of a status stale in every timeline kind.
    /// Nothing is recomputed, so repeating the call changes nothing.
    pub async fn invalidate_status_from_timelines(&self, status_id: &str) -> Result<()> {
        if status_id.is_empty() {
            return Ok(());
        }
        let mut errs = ErrorList::new();
        for kind in TimelineKind::ALL {
            if let Err(e) = self.state.timelines.unprepare(kind, status_id).await {
                errs.push_context(format!("unprepare {status_id} in {}", kind.as_str()), e);
            }
        }
        errs.into_result()
    }
}
