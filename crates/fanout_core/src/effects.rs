/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Declared side-effect policy and the runner that enforces it.
//!
//! Every route lists the secondary effects it performs together with their
//! fatality. Prerequisites and the primary effect always propagate; a
//! secondary effect propagates only when its route declares it `Fatal`.

use crate::error::ProcessError;
use std::{fmt, future::Future};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Counters,
    Invalidate,
    Timeline,
    Notify,
    Federate,
    Relations,
    Email,
    QueuePurge,
    Cleanup,
    Dereference,
    Stream,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counters => "counters",
            Self::Invalidate => "invalidate",
            Self::Timeline => "timeline",
            Self::Notify => "notify",
            Self::Federate => "federate",
            Self::Relations => "relations",
            Self::Email => "email",
            Self::QueuePurge => "queue_purge",
            Self::Cleanup => "cleanup",
            Self::Dereference => "dereference",
            Self::Stream => "stream",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fatality {
    Fatal,
    BestEffort,
}

pub type Policy = &'static [(Effect, Fatality)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectFailure {
    pub effect: Effect,
    pub what: &'static str,
    pub error: String,
}

/// What a successful handler run left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub handler: &'static str,
    pub failures: Vec<EffectFailure>,
}

impl Outcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self, effect: Effect) -> usize {
        self.failures.iter().filter(|f| f.effect == effect).count()
    }
}

pub struct Effects<'a> {
    handler: &'static str,
    policy: Policy,
    cancel: &'a CancellationToken,
    failures: Vec<EffectFailure>,
}

impl<'a> Effects<'a> {
    pub fn new(handler: &'static str, policy: Policy, cancel: &'a CancellationToken) -> Self {
        Self {
            handler,
            policy,
            cancel,
            failures: Vec::new(),
        }
    }

    pub fn fatality(&self, effect: Effect) -> Fatality {
        self.policy
            .iter()
            .find(|(e, _)| *e == effect)
            .map(|(_, f)| *f)
            .unwrap_or(Fatality::BestEffort)
    }

    /// Runs `fut` unless cancellation wins first. Errors are left untouched.
    pub async fn call<T, F>(&self, fut: F) -> Result<anyhow::Result<T>, ProcessError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProcessError::Cancelled),
            res = fut => Ok(res),
        }
    }

    /// Loads data the handler cannot continue without.
    pub async fn require<T, F>(&self, what: &'static str, fut: F) -> Result<T, ProcessError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        self.call(fut)
            .await?
            .map_err(|cause| ProcessError::Prerequisite { what, cause })
    }

    pub async fn primary<T, F>(&self, what: &'static str, fut: F) -> Result<T, ProcessError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        self.call(fut)
            .await?
            .map_err(|cause| ProcessError::Primary { what, cause })
    }

    /// Runs one secondary effect. `Ok(None)` means it failed and the route
    /// tolerates that; the failure is logged and kept for the outcome.
    pub async fn secondary<T, F>(
        &mut self,
        effect: Effect,
        what: &'static str,
        fut: F,
    ) -> Result<Option<T>, ProcessError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match self.call(fut).await? {
            Ok(v) => Ok(Some(v)),
            Err(cause) => match self.fatality(effect) {
                Fatality::Fatal => Err(ProcessError::Effect {
                    effect,
                    what,
                    cause,
                }),
                Fatality::BestEffort => {
                    warn!(handler = self.handler, %effect, "{what}: {cause:#}");
                    self.failures.push(EffectFailure {
                        effect,
                        what,
                        error: format!("{cause:#}"),
                    });
                    Ok(None)
                }
            },
        }
    }

    pub fn finish(self) -> Outcome {
        if !self.failures.is_empty() {
            debug!(
                handler = self.handler,
                failures = self.failures.len(),
                "finished with tolerated failures"
            );
        }
        Outcome {
            handler: self.handler,
            failures: self.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    const POLICY: Policy = &[
        (Effect::QueuePurge, Fatality::Fatal),
        (Effect::Notify, Fatality::BestEffort),
    ];

    #[tokio::test]
    async fn best_effort_failure_is_recorded() {
        let cancel = CancellationToken::new();
        let mut fx = Effects::new("test", POLICY, &cancel);
        let r = fx
            .secondary(Effect::Notify, "notify", async { Err::<(), _>(anyhow!("down")) })
            .await
            .unwrap();
        assert!(r.is_none());
        let out = fx.finish();
        assert_eq!(out.failed(Effect::Notify), 1);
        assert_eq!(out.failures[0].error, "down");
    }

    #[tokio::test]
    async fn fatal_failure_propagates() {
        let cancel = CancellationToken::new();
        let mut fx = Effects::new("test", POLICY, &cancel);
        let err = fx
            .secondary(Effect::QueuePurge, "purge", async {
                Err::<(), _>(anyhow!("locked"))
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessError::Effect {
                effect: Effect::QueuePurge,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn undeclared_effects_are_best_effort() {
        let cancel = CancellationToken::new();
        let fx = Effects::new("test", POLICY, &cancel);
        assert_eq!(fx.fatality(Effect::Email), Fatality::BestEffort);
    }

    #[tokio::test]
    async fn cancelled_token_stops_every_step() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let fx = Effects::new("test", POLICY, &cancel);
        let err = fx
            .primary("delete", async { Ok::<_, anyhow::Error>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled));
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_call() {
        let cancel = CancellationToken::new();
        let fx = Effects::new("test", POLICY, &cancel);
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let err = fx
            .require("slow", std::future::pending::<anyhow::Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled));
    }
}
