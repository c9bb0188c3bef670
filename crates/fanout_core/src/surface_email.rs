/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::state::Email;
use crate::surface::Surface;
use anyhow::{Context, Result};
use fanout_protocol::{DeniedUser, Report, User};
use serde_json::json;

impl Surface {
    async fn moderator_addresses(&self) -> Result<Vec<String>> {
        let users = self
            .state()
            .store
            .get_instance_moderator_users()
            .await
            .context("get instance moderator users")?;
        let mut out: Vec<String> = users
            .iter()
            .filter_map(|u| u.best_email().map(str::to_string))
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn send(&self, email: Email) -> Result<()> {
        let template = email.template;
        self.state()
            .mailer
            .send(email)
            .await
            .with_context(|| format!("send {template} email"))
    }

    pub async fn email_admin_report_opened(&self, report: &Report) -> Result<()> {
        let to = self.moderator_addresses().await?;
        if to.is_empty() {
            return Ok(());
        }
        self.send(Email {
            to,
            subject: "New report received".to_string(),
            template: "email_new_report",
            data: json!({
                "report_id": report.id,
                "reporter_account_id": report.account_id,
                "target_account_id": report.target_account_id,
                "status_count": report.status_ids.len(),
                "comment": report.comment,
            }),
        })
        .await
    }

    pub async fn email_admin_new_signup(&self, user: &User) -> Result<()> {
        let to = self.moderator_addresses().await?;
        if to.is_empty() {
            return Ok(());
        }
        self.send(Email {
            to,
            subject: "New sign-up awaiting approval".to_string(),
            template: "email_new_signup",
            data: json!({
                "user_id": user.id,
                "account_id": user.account_id,
                "email": user.best_email(),
                "reason": user.reason,
            }),
        })
        .await
    }

    pub async fn email_user_please_confirm(&self, user: &User) -> Result<()> {
        let Some(address) = user
            .unconfirmed_email
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return Ok(());
        };
        if user.email.as_deref() == Some(address) {
            return Ok(());
        }
        let Some(token) = user.confirmation_token.as_deref() else {
            return Ok(());
        };
        self.send(Email {
            to: vec![address.to_string()],
            subject: "Please confirm your email address".to_string(),
            template: "email_confirm",
            data: json!({ "account_id": user.account_id, "token": token }),
        })
        .await
    }

    pub async fn email_user_report_closed(&self, report: &Report) -> Result<()> {
        let Some(user) = self
            .state()
            .store
            .get_user_by_account_id(&report.account_id)
            .await
            .with_context(|| format!("get user for account {}", report.account_id))?
        else {
            return Ok(());
        };
        let Some(address) = user.best_email() else {
            return Ok(());
        };
        self.send(Email {
            to: vec![address.to_string()],
            subject: "Your report has been closed".to_string(),
            template: "email_report_closed",
            data: json!({
                "report_id": report.id,
                "action_taken": report.action_taken,
            }),
        })
        .await
    }

    pub async fn email_user_signup_approved(&self, user: &User) -> Result<()> {
        let Some(address) = user.best_email() else {
            return Ok(());
        };
        self.send(Email {
            to: vec![address.to_string()],
            subject: "Your sign-up has been approved".to_string(),
            template: "email_signup_approved",
            data: json!({ "account_id": user.account_id }),
        })
        .await
    }

    pub async fn email_user_signup_rejected(&self, denied: &DeniedUser) -> Result<()> {
        let address = denied.email.trim();
        if address.is_empty() {
            return Ok(());
        }
        self.send(Email {
            to: vec![address.to_string()],
            subject: "Your sign-up has been rejected".to_string(),
            template: "email_signup_rejected",
            data: json!({ "username": denied.username, "message": denied.message }),
        })
        .await
    }
}
