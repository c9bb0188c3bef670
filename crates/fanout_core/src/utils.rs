/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Multi-step routines shared by both handler sets.

use crate::counters;
use crate::dispatch::Processor;
use crate::effects::{Effect, Effects};
use crate::error::ProcessError;
use crate::state::{State, TimelineKind};
use crate::work_queue::{QueueKey, QueueName};
use anyhow::Result;
use fanout_protocol::{
    Account, Block, Envelope, Follow, FollowRequest, ObjectType, Payload, Poll, Status, Verb,
};
use rand::{rngs::OsRng, RngCore};
use tracing::debug;

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub(crate) fn new_id() -> String {
    let mut b = [0u8; 16];
    OsRng.fill_bytes(&mut b);
    hex::encode(b)
}

/// True when `current` closed a poll that `previous` still had open, or the
/// producer of `current` flagged it as closing.
pub(crate) fn poll_newly_closed(previous: Option<&Poll>, current: Option<&Poll>) -> bool {
    let Some(current) = current else {
        return false;
    };
    if current.closing {
        return true;
    }
    match previous {
        Some(previous) => current.is_closed() && !previous.is_closed(),
        None => false,
    }
}

/// Drops pending queue items that reference a doomed entity. Callers run
/// this before the delete itself so nothing stale is dequeued afterwards.
pub(crate) async fn purge_queues(
    fx: &mut Effects<'_>,
    state: &State,
    targets: &[(QueueName, QueueKey, &str)],
) -> Result<(), ProcessError> {
    for &(queue, key, value) in targets {
        if value.is_empty() {
            continue;
        }
        let purged = fx
            .secondary(
                Effect::QueuePurge,
                "purge queued work",
                state.queues.purge(queue, key, value),
            )
            .await?;
        if let Some(n) = purged.filter(|n| *n > 0) {
            debug!(
                "purged {n} {} items by {}={value}",
                queue.as_str(),
                key.column()
            );
        }
    }
    Ok(())
}

/// Removes a status and everything hanging off it. The final delete is the
/// primary effect; the cleanup before it is best-effort. Returns false when
/// the row was already gone.
pub(crate) async fn wipe_status(
    fx: &mut Effects<'_>,
    p: &Processor,
    status: &Status,
    delete_attachments: bool,
) -> Result<bool, ProcessError> {
    let store = &p.state.store;

    for id in &status.attachment_ids {
        if delete_attachments {
            fx.secondary(Effect::Cleanup, "delete attachment", store.delete_attachment(id))
                .await?;
        } else {
            fx.secondary(
                Effect::Cleanup,
                "unattach attachment",
                store.unattach_attachment(id),
            )
            .await?;
        }
    }

    fx.secondary(
        Effect::Cleanup,
        "delete status notifications",
        store.delete_status_notifications(&status.id),
    )
    .await?;

    let boosts = fx
        .secondary(
            Effect::Cleanup,
            "get status boosts",
            store.get_status_boosts(&status.id),
        )
        .await?
        .unwrap_or_default();
    for boost in boosts {
        fx.secondary(
            Effect::Timeline,
            "remove boost from timelines",
            p.surface.delete_status_from_timelines(&boost.id),
        )
        .await?;
        fx.secondary(
            Effect::Cleanup,
            "delete boost",
            store.delete_status_by_id(&boost.id),
        )
        .await?;
        fx.secondary(
            Effect::Counters,
            "decrement booster statuses",
            counters::decrement_statuses(store.as_ref(), &boost.account_id),
        )
        .await?;
    }

    fx.secondary(
        Effect::Timeline,
        "remove status from timelines",
        p.surface.delete_status_from_timelines(&status.id),
    )
    .await?;

    fx.primary("delete status", store.delete_status_by_id(&status.id))
        .await
}

/// Purges each side's posts from the other's timelines and drops every
/// follow or request between them. All eight calls are always attempted.
pub(crate) async fn apply_block(
    fx: &mut Effects<'_>,
    p: &Processor,
    block: &Block,
) -> Result<(), ProcessError> {
    let timelines = &p.state.timelines;
    let store = &p.state.store;
    let blocker = block.account_id.as_str();
    let blocked = block.target_account_id.as_str();

    let wipes = [
        (TimelineKind::Home, blocker, blocked, "wipe blocked from blocker home"),
        (TimelineKind::Home, blocked, blocker, "wipe blocker from blocked home"),
        (TimelineKind::List, blocker, blocked, "wipe blocked from blocker lists"),
        (TimelineKind::List, blocked, blocker, "wipe blocker from blocked lists"),
    ];
    for (kind, owner, author, what) in wipes {
        fx.secondary(
            Effect::Timeline,
            what,
            timelines.wipe_items_from_account(kind, owner, author),
        )
        .await?;
    }

    fx.secondary(
        Effect::Relations,
        "delete follow blocker -> blocked",
        store.delete_follow(blocker, blocked),
    )
    .await?;
    fx.secondary(
        Effect::Relations,
        "delete follow blocked -> blocker",
        store.delete_follow(blocked, blocker),
    )
    .await?;
    fx.secondary(
        Effect::Relations,
        "delete follow request blocker -> blocked",
        store.delete_follow_request(blocker, blocked),
    )
    .await?;
    fx.secondary(
        Effect::Relations,
        "delete follow request blocked -> blocker",
        store.delete_follow_request(blocked, blocker),
    )
    .await?;
    Ok(())
}

/// Points every local follower of `origin` at `target`: a new follow
/// request for `target` plus an undo of the old follow, both queued as
/// client envelopes so they get the usual side effects.
pub(crate) async fn redirect_followers(
    fx: &mut Effects<'_>,
    p: &Processor,
    origin: &Account,
    target: &Account,
) -> Result<(), ProcessError> {
    let Some(follows) = fx
        .secondary(
            Effect::Relations,
            "get local followers",
            p.state.store.get_local_followers(&origin.id),
        )
        .await?
    else {
        return Ok(());
    };
    for follow in follows {
        fx.secondary(
            Effect::Relations,
            "redirect follower",
            redirect_one(&p.state, &follow, origin, target),
        )
        .await?;
    }
    Ok(())
}

async fn redirect_one(
    state: &State,
    follow: &Follow,
    origin: &Account,
    target: &Account,
) -> Result<()> {
    let store = &state.store;
    let Some(follower) = store.get_account_by_id(&follow.account_id).await? else {
        return Ok(());
    };
    if follower.id == target.id {
        return Ok(());
    }

    if !store.is_following(&follower.id, &target.id).await? {
        let id = new_id();
        let request = FollowRequest {
            uri: format!("{}/follows/{id}", follower.uri.trim_end_matches('/')),
            id,
            account_id: follower.id.clone(),
            target_account_id: target.id.clone(),
            notify: follow.notify,
        };
        store.put_follow_request(&request).await?;
        state
            .queues
            .enqueue_client(
                Envelope::new(
                    Verb::Create,
                    ObjectType::Follow,
                    follower.clone(),
                    Payload::FollowRequest(request),
                )
                .with_target(target.clone()),
            )
            .await?;
    }

    if store.delete_follow(&follower.id, &origin.id).await? {
        state
            .queues
            .enqueue_client(
                Envelope::new(
                    Verb::Undo,
                    ObjectType::Follow,
                    follower,
                    Payload::Follow(follow.clone()),
                )
                .with_target(origin.clone()),
            )
            .await?;
    }
    Ok(())
}
