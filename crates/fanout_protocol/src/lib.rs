/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod envelope;
pub mod model;
pub mod notification;

pub use envelope::{DeliveryItem, Envelope, ObjectType, Payload, PayloadKind, Verb};
pub use model::*;
pub use notification::{Notification, NotificationType};
