/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::effects::Effect;
use fanout_protocol::{ObjectType, PayloadKind, Verb};
use std::fmt;

/// Why processing an envelope did not succeed.
///
/// Only the variants below ever leave a handler; secondary effect failures
/// declared best-effort are logged and reported through `Outcome` instead.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// No handler is registered for this pair on this side.
    #[error("unhandled {origin} envelope: {verb} {object_type}")]
    Unhandled {
        verb: Verb,
        object_type: ObjectType,
        origin: &'static str,
    },

    /// The envelope carried a payload the route cannot consume.
    #[error("contract violation: expected {expected}, got {got}")]
    ContractViolation { expected: &'static str, got: String },

    /// Data the handler cannot proceed without could not be loaded.
    #[error("prerequisite failed ({what}): {cause:#}")]
    Prerequisite {
        what: &'static str,
        cause: anyhow::Error,
    },

    /// The activity's canonical effect failed.
    #[error("primary effect failed ({what}): {cause:#}")]
    Primary {
        what: &'static str,
        cause: anyhow::Error,
    },

    /// A secondary effect the route declares fatal failed.
    #[error("{effect} effect failed ({what}): {cause:#}")]
    Effect {
        effect: Effect,
        what: &'static str,
        cause: anyhow::Error,
    },

    #[error("processing cancelled")]
    Cancelled,
}

impl ProcessError {
    pub(crate) fn mismatch(expected: &'static str, got: PayloadKind) -> Self {
        Self::ContractViolation {
            expected,
            got: got.to_string(),
        }
    }

    pub(crate) fn missing(expected: &'static str) -> Self {
        Self::ContractViolation {
            expected,
            got: "nothing".to_string(),
        }
    }

    /// Terminal errors are never worth a second attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Unhandled { .. } | Self::ContractViolation { .. })
    }
}

/// Marker for remote objects that cannot be fetched, e.g. from a blocked domain.
#[derive(Debug, thiserror::Error)]
#[error("unretrievable: {0}")]
pub struct Unretrievable(pub String);

pub fn is_unretrievable(err: &anyhow::Error) -> bool {
    err.chain().any(|e| e.is::<Unretrievable>())
}

/// Collects failures from fan-out loops that must try every target.
#[derive(Default)]
pub struct ErrorList {
    errors: Vec<anyhow::Error>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: anyhow::Error) {
        self.errors.push(err);
    }

    pub fn push_context(&mut self, context: impl fmt::Display, err: anyhow::Error) {
        self.errors.push(err.context(context.to_string()));
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(mut self) -> anyhow::Result<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            n => {
                let joined = self
                    .errors
                    .iter()
                    .map(|e| format!("{e:#}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(anyhow::anyhow!("{n} errors: {joined}"))
            }
        }
    }
}

impl fmt::Debug for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.errors.iter().map(|e| format!("{e:#}")))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_list_combines_messages() {
        let mut errs = ErrorList::new();
        assert!(ErrorList::new().into_result().is_ok());
        errs.push(anyhow::anyhow!("first"));
        errs.push_context("notify voter 2", anyhow::anyhow!("second"));
        assert_eq!(errs.len(), 2);
        let msg = format!("{:#}", errs.into_result().unwrap_err());
        assert!(msg.starts_with("2 errors:"));
        assert!(msg.contains("first"));
        assert!(msg.contains("notify voter 2: second"));
    }

    #[test]
    fn unretrievable_is_found_through_context() {
        let err = anyhow::Error::new(Unretrievable("https://blocked.example/1".into()))
            .context("enrich announce");
        assert!(is_unretrievable(&err));
        assert!(!is_unretrievable(&anyhow::anyhow!("timeout")));
    }

    #[test]
    fn unhandled_names_both_fields() {
        let err = ProcessError::Unhandled {
            verb: Verb::Reject,
            object_type: ObjectType::Note,
            origin: "federated",
        };
        let msg = err.to_string();
        assert!(msg.contains("Reject"));
        assert!(msg.contains("Note"));
        assert!(err.is_terminal());
    }
}
