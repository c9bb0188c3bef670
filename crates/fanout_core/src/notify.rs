/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Idempotent notification creation.
//!
//! A notification is identified by (type, target, origin, status). Creation
//! for one identity is serialized on a keyed lock, so concurrent or repeated
//! deliveries of the same event persist at most one row.

use crate::state::State;
use crate::surface::Surface;
use crate::utils::{new_id, now_ms};
use anyhow::{Context, Result};
use fanout_protocol::{Account, Notification, NotificationType};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Created(Notification),
    AlreadyExists,
    /// Remote accounts never receive notifications here.
    SkippedRemote,
}

impl NotifyOutcome {
    pub fn created(&self) -> Option<&Notification> {
        match self {
            Self::Created(n) => Some(n),
            _ => None,
        }
    }
}

pub fn lock_key(
    notification_type: NotificationType,
    target: &Account,
    origin: &Account,
    status_id: Option<&str>,
) -> String {
    let mut key = String::from("notification:?");
    key.push_str("type=");
    key.push_str(notification_type.as_str());
    key.push_str("&target=");
    key.push_str(&target.uri);
    key.push_str("&origin=");
    key.push_str(&origin.uri);
    if let Some(id) = status_id.filter(|s| !s.is_empty()) {
        key.push_str("&status=");
        key.push_str(id);
    }
    key
}

impl Surface {
    /// Creates the notification unless one with the same identity exists.
    ///
    /// The lock is held across the existence check and the insert only;
    /// the realtime push happens after release and its failure is logged.
    pub async fn notify(
        &self,
        notification_type: NotificationType,
        target: &Account,
        origin: &Account,
        status_id: Option<&str>,
    ) -> Result<NotifyOutcome> {
        if target.is_remote() {
            return Ok(NotifyOutcome::SkippedRemote);
        }
        let status_id = status_id.filter(|s| !s.is_empty());
        let store = &self.state().store;

        let key = lock_key(notification_type, target, origin, status_id);
        let guard = self.state().locks.lock(&key).await;

        let existing = store
            .get_notification(notification_type, &target.id, &origin.id, status_id)
            .await
            .context("check existing notification")?;
        if existing.is_some() {
            debug!("notification exists: {key}");
            return Ok(NotifyOutcome::AlreadyExists);
        }

        let notification = Notification {
            id: new_id(),
            notification_type,
            target_account_id: target.id.clone(),
            origin_account_id: origin.id.clone(),
            status_id: status_id.map(str::to_string),
            created_at_ms: now_ms(),
        };
        store
            .put_notification(&notification)
            .await
            .with_context(|| format!("put {notification_type} notification for {}", target.id))?;
        drop(guard);

        if let Err(e) = self.state().streams.notify(target, &notification).await {
            warn!("stream notification {}: {e:#}", notification.id);
        }
        Ok(NotifyOutcome::Created(notification))
    }
}

/// Whether `viewer` may see `notification` when listing their notifications.
///
/// Sign-up notices skip the origin check: the new account is not visible
/// until it has been approved, and moderators still need to see it.
pub async fn notification_visible(
    state: &State,
    notification: &Notification,
    viewer: &Account,
) -> Result<bool> {
    if notification.notification_type != NotificationType::Signup {
        let Some(origin) = state
            .store
            .get_account_by_id(&notification.origin_account_id)
            .await?
        else {
            return Ok(false);
        };
        if !state.visibility.account_visible(viewer, &origin).await? {
            return Ok(false);
        }
    }
    if let Some(status_id) = notification.status_id.as_deref() {
        let Some(status) = state.store.get_status_by_id(status_id).await? else {
            return Ok(false);
        };
        return state.visibility.status_visible(viewer, &status).await;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(uri: &str) -> Account {
        Account {
            id: uri.rsplit('/').next().unwrap_or_default().to_string(),
            uri: uri.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn lock_key_includes_status_only_when_set() {
        let target = account("https://here.example/users/alice");
        let origin = account("https://there.example/users/bob");
        assert_eq!(
            lock_key(NotificationType::Follow, &target, &origin, None),
            "notification:?type=follow&target=https://here.example/users/alice&origin=https://there.example/users/bob"
        );
        assert_eq!(
            lock_key(NotificationType::Follow, &target, &origin, Some("")),
            lock_key(NotificationType::Follow, &target, &origin, None)
        );
        assert!(lock_key(NotificationType::Favourite, &target, &origin, Some("01S"))
            .ends_with("&status=01S"));
    }

    #[test]
    fn lock_key_differs_per_type() {
        let target = account("https://here.example/users/alice");
        let origin = account("https://there.example/users/bob");
        assert_ne!(
            lock_key(NotificationType::Follow, &target, &origin, None),
            lock_key(NotificationType::FollowRequest, &target, &origin, None)
        );
    }
}
