/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Handlers for envelopes produced by this instance's own users.

use crate::counters;
use crate::dispatch::Processor;
use crate::effects::{Effect, Effects, Fatality, Policy};
use crate::error::ProcessError;
use crate::utils::{apply_block, poll_newly_closed, purge_queues, redirect_followers, wipe_status};
use crate::work_queue::{QueueKey, QueueName};
use anyhow::anyhow;
use fanout_protocol::{Envelope, Payload};
use tracing::debug;

use Effect::*;
use Fatality::*;

pub(crate) const CREATE_ACCOUNT: Policy = &[(Notify, BestEffort), (Email, BestEffort)];

pub(crate) async fn create_account(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::User(user) = &env.payload else {
        return Err(ProcessError::mismatch("user", env.payload.kind()));
    };

    fx.secondary(Notify, "notify moderators of sign-up", p.surface.notify_signup(user))
        .await?;
    fx.secondary(Email, "email moderators of sign-up", p.surface.email_admin_new_signup(user))
        .await?;
    fx.secondary(Email, "email sign-up confirmation", p.surface.email_user_please_confirm(user))
        .await?;
    Ok(())
}

pub(crate) const CREATE_STATUS: Policy = &[
    (Counters, BestEffort),
    (Timeline, BestEffort),
    (Invalidate, BestEffort),
    (Federate, BestEffort),
];

pub(crate) async fn create_status(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Status(status) = &env.payload else {
        return Err(ProcessError::mismatch("status", env.payload.kind()));
    };
    let store = p.state.store.as_ref();

    fx.secondary(
        Counters,
        "increment author statuses",
        counters::increment_statuses(store, &env.origin.id, status.created_at_ms),
    )
    .await?;
    fx.secondary(
        Timeline,
        "timeline and notify status",
        p.surface.timeline_and_notify_status(status),
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
    fx.secondary(Federate, "federate status", p.state.federator.create_status(status))
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

    let Some(poll) = fx.require("get voted poll", store.get_poll_by_id(&vote.poll_id)).await? else {
        debug!("poll {} gone, nothing to do", vote.poll_id);
        return Ok(());
    };
    let Some(mut status) = fx
        .require("get poll status", store.get_status_by_id(&poll.status_id))
        .await?
    else {
        debug!("status {} gone, nothing to do", poll.status_id);
        return Ok(());
    };
    status.poll = Some(poll.clone());

    fx.secondary(
        Invalidate,
        "invalidate poll status",
        p.surface.invalidate_status_from_timelines(&status.id),
    )
    .await?;

    if status.local {
        // Local poll: counts live on our status, send the new totals out.
        fx.secondary(
            Federate,
            "federate poll status update",
            p.state.federator.update_status(&status),
        )
        .await?;
    } else {
        fx.secondary(
            Federate,
            "federate poll vote",
            p.state.federator.create_poll_vote(&poll, vote),
        )
        .await?;
    }
    Ok(())
}

pub(crate) const CREATE_FOLLOW_REQUEST: Policy = &[
    (Counters, BestEffort),
    (Notify, BestEffort),
    (Federate, BestEffort),
];

pub(crate) async fn create_follow_request(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::FollowRequest(request) = &env.payload else {
        return Err(ProcessError::mismatch("follow request", env.payload.kind()));
    };

    fx.secondary(
        Counters,
        "increment target follow requests",
        counters::increment_follow_requests(p.state.store.as_ref(), &request.target_account_id),
    )
    .await?;
    fx.secondary(
        Notify,
        "notify follow request",
        p.surface.notify_follow_request(request),
    )
    .await?;
    // Requests go out as plain Follow activities.
    fx.secondary(
        Federate,
        "federate follow",
        p.state.federator.follow(&request.to_follow()),
    )
    .await?;
    Ok(())
}

pub(crate) const CREATE_LIKE: Policy = &[
    (Notify, BestEffort),
    (Invalidate, BestEffort),
    (Federate, BestEffort),
];

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
    fx.secondary(Federate, "federate like", p.state.federator.like(fave))
        .await?;
    Ok(())
}

pub(crate) const CREATE_ANNOUNCE: Policy = &[
    (Counters, BestEffort),
    (Timeline, BestEffort),
    (Notify, BestEffort),
    (Invalidate, BestEffort),
    (Federate, BestEffort),
];

pub(crate) async fn create_announce(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Status(boost) = &env.payload else {
        return Err(ProcessError::mismatch("boost status", env.payload.kind()));
    };

    fx.secondary(
        Counters,
        "increment booster statuses",
        counters::increment_statuses(p.state.store.as_ref(), &env.origin.id, boost.created_at_ms),
    )
    .await?;
    fx.secondary(
        Timeline,
        "timeline and notify boost",
        p.surface.timeline_and_notify_status(boost),
    )
    .await?;
    fx.secondary(Notify, "notify boost", p.surface.notify_announce(boost))
        .await?;
    if let Some(original) = boost.boost_of() {
        fx.secondary(
            Invalidate,
            "invalidate boosted status",
            p.surface.invalidate_status_from_timelines(original),
        )
        .await?;
    }
    fx.secondary(Federate, "federate announce", p.state.federator.announce(boost))
        .await?;
    Ok(())
}

pub(crate) const CREATE_BLOCK: Policy = &[
    (Timeline, BestEffort),
    (Relations, BestEffort),
    (Federate, BestEffort),
];

pub(crate) async fn create_block(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Block(block) = &env.payload else {
        return Err(ProcessError::mismatch("block", env.payload.kind()));
    };

    apply_block(fx, p, block).await?;
    fx.secondary(Federate, "federate block", p.state.federator.block(block))
        .await?;
    Ok(())
}

pub(crate) const UPDATE_STATUS: Policy = &[
    (Federate, BestEffort),
    (Invalidate, BestEffort),
    (Notify, BestEffort),
    (Stream, BestEffort),
];

pub(crate) async fn update_status(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Status(status) = &env.payload else {
        return Err(ProcessError::mismatch("status", env.payload.kind()));
    };

    fx.secondary(
        Federate,
        "federate status update",
        p.state.federator.update_status(status),
    )
    .await?;
    fx.secondary(
        Invalidate,
        "invalidate edited status",
        p.surface.invalidate_status_from_timelines(&status.id),
    )
    .await?;
    if poll_newly_closed(None, status.poll.as_ref()) {
        fx.secondary(Notify, "notify poll close", p.surface.notify_poll_close(status))
            .await?;
    }
    fx.secondary(
        Stream,
        "stream status edit",
        p.surface.timeline_status_update(status),
    )
    .await?;
    Ok(())
}

pub(crate) const UPDATE_ACCOUNT: Policy = &[(Federate, BestEffort)];

pub(crate) async fn update_account(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Account(account) = &env.payload else {
        return Err(ProcessError::mismatch("account", env.payload.kind()));
    };

    fx.secondary(
        Federate,
        "federate account update",
        p.state.federator.update_account(account),
    )
    .await?;
    Ok(())
}

pub(crate) const UPDATE_REPORT: Policy = &[(Email, BestEffort)];

pub(crate) async fn update_report(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Report(report) = &env.payload else {
        return Err(ProcessError::mismatch("report", env.payload.kind()));
    };

    let Some(reporter) = fx
        .require(
            "get reporting account",
            p.state.store.get_account_by_id(&report.account_id),
        )
        .await?
    else {
        return Ok(());
    };
    if reporter.is_remote() {
        // Nobody to email on this instance.
        return Ok(());
    }

    fx.secondary(
        Email,
        "email report closed",
        p.surface.email_user_report_closed(report),
    )
    .await?;
    Ok(())
}

pub(crate) const ACCEPT_FOLLOW: Policy = &[
    (Counters, BestEffort),
    (Notify, BestEffort),
    (Federate, BestEffort),
];

pub(crate) async fn accept_follow(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Follow(follow) = &env.payload else {
        return Err(ProcessError::mismatch("follow", env.payload.kind()));
    };
    let store = p.state.store.as_ref();

    fx.secondary(
        Counters,
        "decrement target follow requests",
        counters::decrement_follow_requests(store, &follow.target_account_id),
    )
    .await?;
    fx.secondary(
        Counters,
        "increment target followers",
        counters::increment_followers(store, &follow.target_account_id),
    )
    .await?;
    fx.secondary(
        Counters,
        "increment follower following",
        counters::increment_following(store, &follow.account_id),
    )
    .await?;
    fx.secondary(Notify, "notify follow", p.surface.notify_follow(follow))
        .await?;
    fx.secondary(
        Federate,
        "federate follow accept",
        p.state.federator.accept_follow(follow),
    )
    .await?;
    Ok(())
}

pub(crate) const ACCEPT_ACCOUNT: Policy = &[(Email, BestEffort)];

pub(crate) async fn accept_account(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::User(user) = &env.payload else {
        return Err(ProcessError::mismatch("user", env.payload.kind()));
    };

    let mut user = user.clone();
    user.approved = true;
    user.sign_up_ip = None;
    // On failure the admin retries the approval; no email goes out.
    fx.primary("approve user", p.state.store.update_user(&user))
        .await?;

    fx.secondary(
        Email,
        "email sign-up approved",
        p.surface.email_user_signup_approved(&user),
    )
    .await?;
    Ok(())
}

pub(crate) const REJECT_FOLLOW_REQUEST: Policy = &[(Counters, BestEffort), (Federate, BestEffort)];

pub(crate) async fn reject_follow_request(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::FollowRequest(request) = &env.payload else {
        return Err(ProcessError::mismatch("follow request", env.payload.kind()));
    };

    fx.secondary(
        Counters,
        "decrement target follow requests",
        counters::decrement_follow_requests(p.state.store.as_ref(), &request.target_account_id),
    )
    .await?;
    fx.secondary(
        Federate,
        "federate follow reject",
        p.state.federator.reject_follow(&request.to_follow()),
    )
    .await?;
    Ok(())
}

pub(crate) const REJECT_ACCOUNT: Policy = &[(Cleanup, BestEffort), (Email, BestEffort)];

pub(crate) async fn reject_account(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::DeniedUser(denied) = &env.payload else {
        return Err(ProcessError::mismatch("denied user", env.payload.kind()));
    };
    let Some(target) = env.target.as_ref() else {
        return Err(ProcessError::missing("target account"));
    };
    let store = &p.state.store;

    fx.secondary(
        Cleanup,
        "delete rejected account",
        store.delete_account(&target.id),
    )
    .await?;
    fx.secondary(
        Cleanup,
        "delete rejected user",
        store.delete_user_by_id(&denied.id),
    )
    .await?;
    fx.secondary(Cleanup, "record denied user", store.put_denied_user(denied))
        .await?;
    if denied.send_email {
        fx.secondary(
            Email,
            "email sign-up rejected",
            p.surface.email_user_signup_rejected(denied),
        )
        .await?;
    }
    Ok(())
}

pub(crate) const UNDO_FOLLOW: Policy = &[(Counters, BestEffort), (Federate, BestEffort)];

pub(crate) async fn undo_follow(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Follow(follow) = &env.payload else {
        return Err(ProcessError::mismatch("follow", env.payload.kind()));
    };
    let store = p.state.store.as_ref();

    fx.secondary(
        Counters,
        "decrement follower following",
        counters::decrement_following(store, &follow.account_id),
    )
    .await?;
    fx.secondary(
        Counters,
        "decrement target followers",
        counters::decrement_followers(store, &follow.target_account_id),
    )
    .await?;
    fx.secondary(
        Federate,
        "federate follow undo",
        p.state.federator.undo_follow(follow),
    )
    .await?;
    Ok(())
}

pub(crate) const UNDO_BLOCK: Policy = &[(Federate, BestEffort)];

pub(crate) async fn undo_block(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Block(block) = &env.payload else {
        return Err(ProcessError::mismatch("block", env.payload.kind()));
    };

    fx.secondary(
        Federate,
        "federate block undo",
        p.state.federator.undo_block(block),
    )
    .await?;
    Ok(())
}

pub(crate) const UNDO_FAVE: Policy = &[(Invalidate, BestEffort), (Federate, BestEffort)];

pub(crate) async fn undo_fave(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Fave(fave) = &env.payload else {
        return Err(ProcessError::mismatch("fave", env.payload.kind()));
    };

    fx.secondary(
        Invalidate,
        "invalidate unfaved status",
        p.surface.invalidate_status_from_timelines(&fave.status_id),
    )
    .await?;
    fx.secondary(Federate, "federate like undo", p.state.federator.undo_like(fave))
        .await?;
    Ok(())
}

pub(crate) const UNDO_ANNOUNCE: Policy = &[
    (Counters, BestEffort),
    (Timeline, BestEffort),
    (Invalidate, BestEffort),
    (Federate, BestEffort),
];

pub(crate) async fn undo_announce(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Status(boost) = &env.payload else {
        return Err(ProcessError::mismatch("boost status", env.payload.kind()));
    };

    fx.primary("delete boost", p.state.store.delete_status_by_id(&boost.id))
        .await?;

    fx.secondary(
        Counters,
        "decrement booster statuses",
        counters::decrement_statuses(p.state.store.as_ref(), &env.origin.id),
    )
    .await?;
    fx.secondary(
        Timeline,
        "remove boost from timelines",
        p.surface.delete_status_from_timelines(&boost.id),
    )
    .await?;
    if let Some(original) = boost.boost_of() {
        fx.secondary(
            Invalidate,
            "invalidate unboosted status",
            p.surface.invalidate_status_from_timelines(original),
        )
        .await?;
    }
    fx.secondary(
        Federate,
        "federate announce undo",
        p.state.federator.undo_announce(boost),
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
    (Federate, BestEffort),
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

    // The poster may redraft, so attachments are only detached.
    if !wipe_status(fx, p, &status, false).await? {
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
    fx.secondary(
        Federate,
        "federate status delete",
        p.state.federator.delete_status(&status),
    )
    .await?;
    Ok(())
}

pub(crate) const DELETE_ACCOUNT: Policy = &[(QueuePurge, Fatal), (Federate, BestEffort)];

pub(crate) async fn delete_account(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    // Deletes caused by a domain block carry the block as their origin.
    let origin_id = match &env.payload {
        Payload::DomainBlock(block) => block.id.as_str(),
        Payload::None => env.origin.id.as_str(),
        other => return Err(ProcessError::mismatch("domain block or nothing", other.kind())),
    };
    let Some(account) = env.target.as_ref() else {
        return Err(ProcessError::missing("target account"));
    };
    let (id, uri) = (account.id.as_str(), account.uri.as_str());

    purge_queues(
        fx,
        &p.state,
        &[
            (QueueName::Delivery, QueueKey::ActorId, uri),
            (QueueName::Delivery, QueueKey::ObjectId, uri),
            (QueueName::Delivery, QueueKey::TargetId, uri),
            (QueueName::Client, QueueKey::OriginId, id),
            (QueueName::Client, QueueKey::TargetAccountId, id),
            (QueueName::Client, QueueKey::TargetUri, uri),
            (QueueName::Federator, QueueKey::ReceivingId, id),
            (QueueName::Federator, QueueKey::TargetUri, uri),
        ],
    )
    .await?;

    // Federate first: the delete needs the account's keys.
    fx.secondary(
        Federate,
        "federate account delete",
        p.state.federator.delete_account(account),
    )
    .await?;

    fx.primary(
        "delete account",
        p.state.store.delete_account_data(account, origin_id),
    )
    .await?;
    Ok(())
}

pub(crate) const REPORT_ACCOUNT: Policy = &[
    (Federate, BestEffort),
    (Email, BestEffort),
    (Notify, BestEffort),
];

pub(crate) async fn report_account(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    let Payload::Report(report) = &env.payload else {
        return Err(ProcessError::mismatch("report", env.payload.kind()));
    };

    if report.forwarded {
        fx.secondary(Federate, "federate flag", p.state.federator.flag(report))
            .await?;
    }
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

pub(crate) const MOVE_ACCOUNT: Policy = &[(Relations, BestEffort), (Federate, Fatal)];

/// The move record's success stamp is only written once the Move went out.
pub(crate) async fn move_account(
    fx: &mut Effects<'_>,
    p: &Processor,
    env: &Envelope,
) -> Result<(), ProcessError> {
    if !matches!(env.payload, Payload::None | Payload::Account(_)) {
        return Err(ProcessError::mismatch("account or nothing", env.payload.kind()));
    }
    let origin = &env.origin;
    let Some(target) = env.target.as_ref() else {
        return Err(ProcessError::missing("move target account"));
    };

    redirect_followers(fx, p, origin, target).await?;

    let move_id = origin.move_id.as_deref().unwrap_or_default();
    let mut mv = fx
        .require("get move", async {
            p.state
                .store
                .get_move_by_id(move_id)
                .await?
                .ok_or_else(|| anyhow!("account {} has no move {move_id:?}", origin.id))
        })
        .await?;

    fx.secondary(
        Federate,
        "federate account move",
        p.state.federator.move_account(origin),
    )
    .await?;

    mv.succeeded_at_ms = Some(mv.attempted_at_ms);
    fx.primary("mark move succeeded", p.state.store.update_move(&mv))
        .await?;
    Ok(())
}
