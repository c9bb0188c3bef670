/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod counters;
pub mod dispatch;
pub mod effects;
pub mod error;
mod from_client;
mod from_fedi;
pub mod locks;
pub mod notify;
pub mod state;
pub mod surface;
mod surface_email;
mod utils;
pub mod work_queue;
pub mod workers;

pub use dispatch::{validate_client, validate_fedi, ClientRoute, FediRoute, Processor};
pub use effects::{Effect, EffectFailure, Fatality, Outcome};
pub use error::{ErrorList, ProcessError, Unretrievable};
pub use notify::NotifyOutcome;
pub use state::State;
pub use surface::Surface;
pub use work_queue::{QueueKey, QueueName, WorkQueue, WorkQueues};
pub use workers::{Deliverer, QueueSettings, Workers, WorkersConfig};

