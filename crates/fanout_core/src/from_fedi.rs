/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Handlers for envelopes that arrived from remote servers.

use crate::counters;
use crate::dispatch::Processor;
use crate::effects::{Effect, Effects, Fatality, Policy};
use crate::error::{is_unretrievable, ProcessError};
use crate::utils::{apply_block, now_ms, poll_newly_closed, purge_queues, redirect_followers, wipe_status};
use crate::work_queue::{QueueKey, QueueName};
use anyhow::anyhow;
use fanout_protocol::{Account, Envelope, Payload, Status};
use tracing::{debug, warn};

use Effect::*;
use Fatality::*;

fn receiving(env: &Envelope) -> Result<&Account, ProcessError> {
    env.receiving
        .as_ref()
        .ok_or_else(|| ProcessError::missing("receiving account"))
}

pub(crate) const CREATE_STATUS: Policy = &[
    (Counters, BestEffort),
    (Invalidate, BestEffort),
    (Timeline, BestEffort),
];

pub(crate) async fn create_status(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let receiving = receiving(env)?;
    let deref = &p.state.dereferencer;

    let (status, object) = match &env.payload {
        Payload::ApStatus(object) => {
            let bare = Status::bare_remote(&object.id);
            fx.primary(
                "process new status",
                deref.refresh_status(&receiving.username, bare, Some(object.clone())),
            )
            .await?
        }
        // Forwarded activity: only the IRI is trusted, fetch it.
        Payload::Iri(iri) => {
            fx.primary(
                "dereference forwarded status",
                deref.get_status_by_uri(&receiving.username, iri),
            )
            .await?
        }
        other => return Err(ProcessError::mismatch("status object or iri", other.kind())),
    };

    if object.is_none() {
        // Another worker created this status first and does the fan-out.
        debug!("status {} already processed", status.uri);
        return Ok(());
    }

    fx.secondary(
        Counters,
        "increment author statuses",
        counters::increment_statuses(p.state.store.as_ref(), &status.account_id, status.created_at_ms),
    )
    .await?;
    if let Some(parent) = status.in_reply_to() {
        fx.secondary(
            Invalidate,
            "invalidate replied status",
            p.surface.invalidate_status_from_timelines(parent),
        )
        .await?;
    }
    fx.secondary(
        Timeline,
        "timeline and notify status",
        p.surface.timeline_and_notify_status(&status),
    )
    .await?;
    Ok(())
}

pub(crate) const CREATE_POLL_VOTE: Policy = &[(Invalidate, BestEffort), (Federate, BestEffort)];

pub(crate) async fn create_poll_vote(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::PollVote(vote) = &env.payload else {
        return Err(ProcessError::mismatch("poll vote", env.payload.kind()));
    };
    let store = &p.state.store;

    fx.primary("insert poll vote", store.put_poll_vote(vote))
        .await?;

    let Some(mut poll) = fx.require("get voted poll", store.get_poll_by_id(&vote.poll_id)).await? else {
        return Ok(());
    };
    let Some(mut status) = fx
        .require("get poll status", store.get_status_by_id(&poll.status_id))
        .await?
    else {
        return Ok(());
    };

    fx.secondary(
        Invalidate,
        "invalidate poll status",
        p.surface.invalidate_status_from_timelines(&status.id),
    )
    .await?;

    if status.local {
        // Count the vote on our copy before sending the new totals out.
        poll.increment_votes(&vote.choices);
        status.poll = Some(poll);
        fx.secondary(
            Federate,
            "federate poll status update",
            p.state.federator.update_status(&status),
        )
        .await?;
    }
    Ok(())
}

pub(crate) const CREATE_FOLLOW_REQUEST: Policy = &[
    (Notify, BestEffort),
    (Counters, BestEffort),
    (Federate, BestEffort),
];

/// Locked targets get a notification; unlocked ones accept right away.
pub(crate) async fn create_follow_request(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::FollowRequest(request) = &env.payload else {
        return Err(ProcessError::mismatch("follow request", env.payload.kind()));
    };
    let store = p.state.store.as_ref();

    let Some(target) = fx
        .require(
            "get follow target",
            store.get_account_by_id(&request.target_account_id),
        )
        .await?
    else {
        debug!("follow target {} gone", request.target_account_id);
        return Ok(());
    };

    if target.locked {
        fx.secondary(
            Notify,
            "notify follow request",
            p.surface.notify_follow_request(request),
        )
        .await?;
        fx.secondary(
            Counters,
            "increment target follow requests",
            counters::increment_follow_requests(store, &target.id),
        )
        .await?;
        return Ok(());
    }

    let follow = fx
        .primary(
            "accept follow request",
            store.accept_follow_request(&request.account_id, &request.target_account_id),
        )
        .await?;

    fx.secondary(
        Counters,
        "increment target followers",
        counters::increment_followers(store, &target.id),
    )
    .await?;
    fx.secondary(
        Counters,
        "increment follower following",
        counters::increment_following(store, &request.account_id),
    )
    .await?;
    fx.secondary(
        Federate,
        "federate follow accept",
        p.state.federator.accept_follow(&follow),
    )
    .await?;
    fx.secondary(Notify, "notify follow", p.surface.notify_follow(&follow))
        .await?;
    Ok(())
}

pub(crate) const CREATE_LIKE: Policy = &[(Notify, BestEffort), (Invalidate, BestEffort)];

pub(crate) async fn create_like(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Fave(fave) = &env.payload else {
        return Err(ProcessError::mismatch("fave", env.payload.kind()));
    };

    fx.secondary(Notify, "notify fave", p.surface.notify_fave(fave))
        .await?;
    fx.secondary(
        Invalidate,
        "invalidate faved status",
        p.surface.invalidate_status_from_timelines(&fave.status_id),
    )
    .await?;
    Ok(())
}

pub(crate) const CREATE_ANNOUNCE: Policy = &[
    (Counters, BestEffort),
    (Timeline, BestEffort),
    (Notify, BestEffort),
    (Invalidate, BestEffort),
];

pub(crate) async fn create_announce(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Status(boost) = &env.payload else {
        return Err(ProcessError::mismatch("boost status", env.payload.kind()));
    };
    let receiving = receiving(env)?;

    // Stores the boost and fetches what it boosts.
    let enriched = fx
        .call(
            p.state
                .dereferencer
                .enrich_announce(boost.clone(), &receiving.username),
        )
        .await?;
    let boost = match enriched {
        Ok(b) => b,
        Err(e) if is_unretrievable(&e) => {
            debug!("skipping announce {}: {e:#}", boost.uri);
            return Ok(());
        }
        Err(cause) => {
            return Err(ProcessError::Primary {
                what: "dereference announce",
                cause,
            })
        }
    };

    fx.secondary(
        Counters,
        "increment booster statuses",
        counters::increment_statuses(p.state.store.as_ref(), &boost.account_id, boost.created_at_ms),
    )
    .await?;
    fx.secondary(
        Timeline,
        "timeline and notify boost",
        p.surface.timeline_and_notify_status(&boost),
    )
    .await?;
    fx.secondary(Notify, "notify boost", p.surface.notify_announce(&boost))
        .await?;
    if let Some(original) = boost.boost_of() {
        fx.secondary(
            Invalidate,
            "invalidate boosted status",
            p.surface.invalidate_status_from_timelines(original),
        )
        .await?;
    }
    Ok(())
}

pub(crate) const CREATE_BLOCK: Policy = &[(Timeline, BestEffort), (Relations, BestEffort)];

pub(crate) async fn create_block(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Block(block) = &env.payload else {
        return Err(ProcessError::mismatch("block", env.payload.kind()));
    };
    apply_block(fx, p, block).await
}

pub(crate) const CREATE_FLAG: Policy = &[(Email, BestEffort), (Notify, BestEffort)];

pub(crate) async fn create_flag(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Report(report) = &env.payload else {
        return Err(ProcessError::mismatch("report", env.payload.kind()));
    };

    fx.secondary(
        Email,
        "email report opened",
        p.surface.email_admin_report_opened(report),
    )
    .await?;
    fx.secondary(Notify, "notify moderators of report", p.surface.notify_report(report))
        .await?;
    Ok(())
}

pub(crate) const UPDATE_STATUS: Policy = &[
    (Dereference, BestEffort),
    (Invalidate, BestEffort),
    (Notify, BestEffort),
    (Stream, BestEffort),
];

pub(crate) async fn update_status(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::StatusUpdate { existing, ap } = &env.payload else {
        return Err(ProcessError::mismatch("status update", env.payload.kind()));
    };
    let receiving = receiving(env)?;

    // On a failed refresh carry on with what we have stored.
    let status = fx
        .secondary(
            Dereference,
            "refresh status",
            p.state
                .dereferencer
                .refresh_status(&receiving.username, existing.clone(), ap.clone()),
        )
        .await?
        .map(|(s, _)| s)
        .unwrap_or_else(|| existing.clone());

    fx.secondary(
        Invalidate,
        "invalidate edited status",
        p.surface.invalidate_status_from_timelines(&status.id),
    )
    .await?;
    if poll_newly_closed(existing.poll.as_ref(), status.poll.as_ref()) {
        fx.secondary(Notify, "notify poll close", p.surface.notify_poll_close(&status))
            .await?;
    }
    fx.secondary(
        Stream,
        "stream status edit",
        p.surface.timeline_status_update(&status),
    )
    .await?;
    Ok(())
}

pub(crate) const UPDATE_ACCOUNT: Policy = &[(Dereference, BestEffort)];

pub(crate) async fn update_account(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::AccountUpdate { existing, ap } = &env.payload else {
        return Err(ProcessError::mismatch("account update", env.payload.kind()));
    };
    let receiving = receiving(env)?;

    fx.secondary(
        Dereference,
        "refresh account",
        p.state.dereferencer.refresh_account(
            &receiving.username,
            existing.clone(),
            Some(ap.clone()),
        ),
    )
    .await?;
    Ok(())
}

pub(crate) const ACCEPT_FOLLOW: Policy = &[(Counters, BestEffort)];

/// The remote side accepted one of our follow requests; storage already
/// holds the follow, only counters are left.
pub(crate) async fn accept_follow(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    if !matches!(env.payload, Payload::None | Payload::Follow(_)) {
        return Err(ProcessError::mismatch("follow or nothing", env.payload.kind()));
    }
    let receiving = receiving(env)?;
    let store = p.state.store.as_ref();

    fx.secondary(
        Counters,
        "decrement accepter follow requests",
        counters::decrement_follow_requests(store, &env.origin.id),
    )
    .await?;
    fx.secondary(
        Counters,
        "increment accepter followers",
        counters::increment_followers(store, &env.origin.id),
    )
    .await?;
    fx.secondary(
        Counters,
        "increment follower following",
        counters::increment_following(store, &receiving.id),
    )
    .await?;
    Ok(())
}

pub(crate) const DELETE_STATUS: Policy = &[
    (QueuePurge, Fatal),
    (Cleanup, BestEffort),
    (Timeline, BestEffort),
    (Counters, BestEffort),
    (Invalidate, BestEffort),
];

pub(crate) async fn delete_status(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Status(status) = &env.payload else {
        return Err(ProcessError::mismatch("status", env.payload.kind()));
    };

    let Some(status) = fx
        .require("get status", p.state.store.get_status_by_id(&status.id))
        .await?
    else {
        debug!("status {} already deleted", status.id);
        return Ok(());
    };
    let uri = status.uri.as_str();

    purge_queues(
        fx,
        &p.state,
        &[
            (QueueName::Delivery, QueueKey::ObjectId, uri),
            (QueueName::Delivery, QueueKey::TargetId, uri),
            (QueueName::Client, QueueKey::TargetUri, uri),
            (QueueName::Federator, QueueKey::TargetUri, uri),
        ],
    )
    .await?;

    // No local redraft is possible for a remote post: drop its media.
    if !wipe_status(fx, p, &status, true).await? {
        debug!("status {} removed concurrently", status.id);
        return Ok(());
    }

    fx.secondary(
        Counters,
        "decrement author statuses",
        counters::decrement_statuses(p.state.store.as_ref(), &env.origin.id),
    )
    .await?;
    if let Some(parent) = status.in_reply_to() {
        fx.secondary(
            Invalidate,
            "invalidate replied status",
            p.surface.invalidate_status_from_timelines(parent),
        )
        .await?;
    }
    Ok(())
}

pub(crate) const DELETE_ACCOUNT: Policy = &[(QueuePurge, Fatal)];

pub(crate) async fn delete_account(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Account(account) = &env.payload else {
        return Err(ProcessError::mismatch("account", env.payload.kind()));
    };
    let (id, uri) = (account.id.as_str(), account.uri.as_str());

    purge_queues(
        fx,
        &p.state,
        &[
            (QueueName::Delivery, QueueKey::ObjectId, uri),
            (QueueName::Delivery, QueueKey::TargetId, uri),
            (QueueName::Client, QueueKey::TargetAccountId, id),
            (QueueName::Client, QueueKey::TargetUri, uri),
            (QueueName::Federator, QueueKey::OriginId, id),
            (QueueName::Federator, QueueKey::TargetUri, uri),
        ],
    )
    .await?;

    fx.primary(
        "delete account",
        p.state.store.delete_account_data(account, id),
    )
    .await?;
    Ok(())
}

pub(crate) const MOVE_ACCOUNT: Policy = &[(Relations, BestEffort)];

/// A remote account moved. The target must list the origin among its
/// aliases, otherwise anyone could hijack followers.
pub(crate) async fn move_account(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    if !matches!(env.payload, Payload::None | Payload::Account(_)) {
        return Err(ProcessError::mismatch("account or nothing", env.payload.kind()));
    }
    let receiving = receiving(env)?;
    let Some(target) = env.target.as_ref() else {
        return Err(ProcessError::missing("move target account"));
    };

    let target = fx
        .require(
            "refresh move target",
            p.state
                .dereferencer
                .refresh_account(&receiving.username, target.clone(), None),
        )
        .await?;
    let origin = &env.origin;
    if !target.also_known_as_uris.iter().any(|u| u == &origin.uri) {
        return Err(ProcessError::Prerequisite {
            what: "verify move target alias",
            cause: anyhow!("{} does not alias {}", target.uri, origin.uri),
        });
    }

    let mut moved = origin.clone();
    moved.moved_to_uri = Some(target.uri.clone());
    fx.primary("record account move", p.state.store.update_account(&moved))
        .await?;

    redirect_followers(fx, p, &moved, &target).await?;

    if let Some(move_id) = moved.move_id.as_deref() {
        let store = &p.state.store;
        let mv = fx
            .secondary(Relations, "get move", store.get_move_by_id(move_id))
            .await?
            .flatten();
        match mv {
            Some(mut mv) => {
                mv.succeeded_at_ms = Some(now_ms());
                fx.secondary(Relations, "mark move succeeded", store.update_move(&mv))
                    .await?;
            }
            None => warn!("move {move_id} of {} not found", moved.uri),
        }
    }
    Ok(())
}
