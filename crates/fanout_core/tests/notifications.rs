/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Notification dedup and surface reactions.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{local, remote, status, World};
use fanout_core::state::TimelineKind;
use fanout_core::{NotifyOutcome, Surface};
use fanout_protocol::{Mention, NotificationType, Poll, PollVote, Report, User};
use std::collections::HashSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_notifications_persist_once() {
    let world = World::new();
    let alice = world.add_account(local("alice"));
    let bob = world.add_account(remote("bob"));
    let surface = Surface::new(world.state());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let surface = surface.clone();
            let (alice, bob) = (alice.clone(), bob.clone());
            tokio::spawn(async move {
                surface
                    .notify(NotificationType::Favourite, &alice, &bob, Some("s1"))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut created = 0;
    let mut existed = 0;
    for h in handles {
        match h.await.unwrap() {
            NotifyOutcome::Created(_) => created += 1,
            NotifyOutcome::AlreadyExists => existed += 1,
            NotifyOutcome::SkippedRemote => panic!("target is local"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(existed, 15);
    assert_eq!(world.notifications_of(NotificationType::Favourite).len(), 1);
}

#[tokio::test]
async fn distinct_identities_are_not_deduplicated() {
    let world = World::new();
    let alice = world.add_account(local("alice"));
    let bob = world.add_account(remote("bob"));
    let surface = Surface::new(world.state());

    for status_id in [Some("s1"), Some("s2"), None] {
        let out = surface
            .notify(NotificationType::Favourite, &alice, &bob, status_id)
            .await
            .unwrap();
        assert!(out.created().is_some());
    }
    let out = surface
        .notify(NotificationType::Mention, &alice, &bob, Some("s1"))
        .await
        .unwrap();
    assert!(out.created().is_some());
    assert_eq!(world.with(|d| d.notifications.len()), 4);
}

#[tokio::test]
async fn remote_targets_are_skipped() {
    let world = World::new();
    let alice = world.add_account(local("alice"));
    let bob = world.add_account(remote("bob"));
    let surface = Surface::new(world.state());

    let out = surface
        .notify(NotificationType::Follow, &bob, &alice, None)
        .await
        .unwrap();
    assert_eq!(out, NotifyOutcome::SkippedRemote);
    assert!(world.with(|d| d.notifications.is_empty()));
}

#[tokio::test]
async fn stream_failure_keeps_the_notification() {
    let world = World::new();
    let alice = world.add_account(local("alice"));
    let bob = world.add_account(remote("bob"));
    world.fail_on("stream_notify");
    let surface = Surface::new(world.state());

    let out = surface
        .notify(NotificationType::Follow, &alice, &bob, None)
        .await
        .unwrap();
    assert!(out.created().is_some());
    assert_eq!(world.notifications_of(NotificationType::Follow).len(), 1);
}

#[tokio::test]
async fn failed_insert_surfaces_and_frees_the_lock() {
    let world = World::new();
    let alice = world.add_account(local("alice"));
    let bob = world.add_account(remote("bob"));
    let state = world.state();
    let locks = state.locks.clone();
    let surface = Surface::new(state);

    world.fail_on("put_notification");
    let err = surface
        .notify(NotificationType::Follow, &alice, &bob, None)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("injected failure"));
    assert_eq!(locks.live_keys(), 0);
}

#[tokio::test]
async fn invalidation_is_idempotent() {
    let world = World::new();
    let surface = Surface::new(world.state());

    surface.invalidate_status_from_timelines("s1").await.unwrap();
    let once: HashSet<_> = world.with(|d| d.unprepared.iter().cloned().collect());
    surface.invalidate_status_from_timelines("s1").await.unwrap();
    let twice: HashSet<_> = world.with(|d| d.unprepared.iter().cloned().collect());

    assert_eq!(once, twice);
    assert!(once.contains(&(TimelineKind::Home, "s1".to_string())));
    assert!(once.contains(&(TimelineKind::List, "s1".to_string())));

    surface.invalidate_status_from_timelines("").await.unwrap();
    assert_eq!(world.with(|d| d.unprepared.len()), 4);
}

#[tokio::test]
async fn mentions_skip_muted_threads_and_remote_targets() {
    let world = World::new();
    let alice = world.add_account(local("alice"));
    let carol = world.add_account(local("carol"));
    let bob = world.add_account(remote("bob"));
    let dave = world.add_account(remote("dave"));

    let mut post = status("s1", &bob);
    for (i, target) in [&alice, &carol, &dave].into_iter().enumerate() {
        post.mentions.push(Mention {
            id: format!("m{i}"),
            status_id: post.id.clone(),
            origin_account_id: bob.id.clone(),
            target_account_id: target.id.clone(),
        });
    }
    world.with(|d| {
        d.muted_threads
            .insert((post.thread_id.clone(), carol.id.clone()))
    });

    Surface::new(world.state())
        .notify_mentions(&post)
        .await
        .unwrap();

    let mentions = world.notifications_of(NotificationType::Mention);
    assert_eq!(mentions.len(), 1);
    assert_eq!(mentions[0].target_account_id, alice.id);
    assert_eq!(mentions[0].status_id.as_deref(), Some("s1"));
}

#[tokio::test]
async fn poll_close_notifies_author_and_each_local_voter_once() {
    let world = World::new();
    let alice = world.add_account(local("alice"));
    let carol = world.add_account(local("carol"));
    let bob = world.add_account(remote("bob"));

    let mut post = status("s1", &alice);
    post.poll = Some(Poll {
        id: "p1".into(),
        status_id: "s1".into(),
        closed_at_ms: Some(1),
        ..Default::default()
    });
    world.with(|d| {
        for (i, voter) in ["carol", "carol", "bob"].into_iter().enumerate() {
            d.poll_votes.push(PollVote {
                id: format!("v{i}"),
                poll_id: "p1".into(),
                account_id: voter.into(),
                choices: vec![i],
            });
        }
    });

    Surface::new(world.state())
        .notify_poll_close(&post)
        .await
        .unwrap();

    let targets: Vec<_> = world
        .notifications_of(NotificationType::Poll)
        .into_iter()
        .map(|n| n.target_account_id)
        .collect();
    assert_eq!(targets.len(), 2);
    assert!(targets.contains(&alice.id));
    assert!(targets.contains(&carol.id));
    assert!(!targets.contains(&bob.id));
}

#[tokio::test]
async fn signup_reaches_every_moderator() {
    let world = World::new();
    let admin = world.add_account(local("admin"));
    let moderator = world.add_account(local("moderator"));
    let newbie = world.add_account(local("newbie"));
    world.with(|d| d.moderators = vec![admin.id.clone(), moderator.id.clone()]);

    let user = User {
        id: "u-newbie".into(),
        account_id: newbie.id.clone(),
        ..Default::default()
    };
    Surface::new(world.state()).notify_signup(&user).await.unwrap();

    let signups = world.notifications_of(NotificationType::Signup);
    assert_eq!(signups.len(), 2);
    assert!(signups.iter().all(|n| n.origin_account_id == newbie.id));
}

#[tokio::test]
async fn repeat_reports_fold_into_one_notice() {
    let world = World::new();
    let admin = world.add_account(local("admin"));
    let bob = world.add_account(remote("bob"));
    let eve = world.add_account(remote("eve"));
    world.with(|d| d.moderators = vec![admin.id.clone()]);
    let surface = Surface::new(world.state());

    for id in ["r1", "r2"] {
        let report = Report {
            id: id.into(),
            account_id: bob.id.clone(),
            target_account_id: eve.id.clone(),
            ..Default::default()
        };
        surface.notify_report(&report).await.unwrap();
    }
    assert_eq!(world.notifications_of(NotificationType::AdminReport).len(), 1);
}

#[tokio::test]
async fn notifications_hide_when_their_subjects_are_gone() {
    use fanout_core::notify::notification_visible;

    let world = World::new();
    let alice = world.add_account(local("alice"));
    let bob = world.add_account(remote("bob"));
    world.add_status(status("s1", &alice));
    let state = world.state();
    let surface = Surface::new(state.clone());

    let fave = surface
        .notify(NotificationType::Favourite, &alice, &bob, Some("s1"))
        .await
        .unwrap();
    let fave = fave.created().unwrap().clone();
    assert!(notification_visible(&state, &fave, &alice).await.unwrap());

    world.with(|d| d.statuses.clear());
    assert!(!notification_visible(&state, &fave, &alice).await.unwrap());

    world.with(|d| d.accounts.remove("bob"));
    let follow = fanout_protocol::Notification {
        status_id: None,
        notification_type: NotificationType::Follow,
        ..fave
    };
    assert!(!notification_visible(&state, &follow, &alice).await.unwrap());
}

#[tokio::test]
async fn signup_notices_ignore_origin_visibility() {
    use fanout_core::notify::notification_visible;

    let world = World::new();
    let admin = world.add_account(local("admin"));
    let newbie = world.add_account(local("newbie"));
    let state = world.state();
    let signup = fanout_protocol::Notification {
        id: "n1".into(),
        notification_type: NotificationType::Signup,
        target_account_id: admin.id.clone(),
        origin_account_id: newbie.id.clone(),
        status_id: None,
        created_at_ms: 0,
    };
    let follow = fanout_protocol::Notification {
        notification_type: NotificationType::Follow,
        ..signup.clone()
    };

    world.with(|d| d.hidden.insert(newbie.id.clone()));
    assert!(notification_visible(&state, &signup, &admin).await.unwrap());
    assert!(!notification_visible(&state, &follow, &admin).await.unwrap());

    // A rejected sign-up can leave no account row behind.
    world.with(|d| d.accounts.remove("newbie"));
    assert!(notification_visible(&state, &signup, &admin).await.unwrap());
    assert!(!notification_visible(&state, &follow, &admin).await.unwrap());
}
