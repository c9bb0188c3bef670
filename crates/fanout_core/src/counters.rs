/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Account counters. Approximate by nature: callers log failures and move on.

use crate::state::{StatsDelta, Store};
use anyhow::{Context, Result};

async fn apply(store: &dyn Store, account_id: &str, delta: StatsDelta) -> Result<()> {
    store
        .update_account_stats(account_id, delta)
        .await
        .with_context(|| format!("update stats for account {account_id}"))
}

pub async fn increment_statuses(store: &dyn Store, account_id: &str, at_ms: i64) -> Result<()> {
    let delta = StatsDelta {
        statuses: 1,
        last_status_at_ms: Some(at_ms),
        ..Default::default()
    };
    apply(store, account_id, delta).await
}

pub async fn decrement_statuses(store: &dyn Store, account_id: &str) -> Result<()> {
    let delta = StatsDelta {
        statuses: -1,
        ..Default::default()
    };
    apply(store, account_id, delta).await
}

pub async fn increment_followers(store: &dyn Store, account_id: &str) -> Result<()> {
    let delta = StatsDelta {
        followers: 1,
        ..Default::default()
    };
    apply(store, account_id, delta).await
}

pub async fn decrement_followers(store: &dyn Store, account_id: &str) -> Result<()> {
    let delta = StatsDelta {
        followers: -1,
        ..Default::default()
    };
    apply(store, account_id, delta).await
}

pub async fn increment_following(store: &dyn Store, account_id: &str) -> Result<()> {
    let delta = StatsDelta {
        following: 1,
        ..Default::default()
    };
    apply(store, account_id, delta).await
}

pub async fn decrement_following(store: &dyn Store, account_id: &str) -> Result<()> {
    let delta = StatsDelta {
        following: -1,
        ..Default::default()
    };
    apply(store, account_id, delta).await
}

pub async fn increment_follow_requests(store: &dyn Store, account_id: &str) -> Result<()> {
    let delta = StatsDelta {
        follow_requests: 1,
        ..Default::default()
    };
    apply(store, account_id, delta).await
}

pub async fn decrement_follow_requests(store: &dyn Store, account_id: &str) -> Result<()> {
    let delta = StatsDelta {
        follow_requests: -1,
        ..Default::default()
    };
    apply(store, account_id, delta).await
}
