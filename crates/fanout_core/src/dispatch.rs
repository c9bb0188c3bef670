/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Routing of envelopes to handlers.
//!
//! Client and federated envelopes have separate route tables: the same
//! (verb, object) pair can be legal on one side and absent on the other.
//! Resolution is a pure match; it performs no I/O.

use crate::effects::{Effects, Outcome, Policy};
use crate::error::ProcessError;
use crate::from_client;
use crate::from_fedi;
use crate::state::State;
use crate::surface::Surface;
use fanout_protocol::{Account, Envelope, ObjectType, Payload, PayloadKind, Verb};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientRoute {
    CreateAccount,
    CreateStatus,
    CreatePollVote,
    CreateFollowRequest,
    CreateLike,
    CreateAnnounce,
    CreateBlock,
    UpdateStatus,
    UpdateAccount,
    UpdateReport,
    AcceptFollow,
    AcceptAccount,
    RejectFollowRequest,
    RejectAccount,
    UndoFollow,
    UndoBlock,
    UndoFave,
    UndoAnnounce,
    DeleteStatus,
    DeleteAccount,
    ReportAccount,
    MoveAccount,
}

impl ClientRoute {
    pub fn resolve(verb: Verb, object_type: ObjectType) -> Option<Self> {
        use ObjectType as O;
        use Verb as V;
        Some(match (verb, object_type) {
            (V::Create, O::Profile | O::Person) => Self::CreateAccount,
            (V::Create, O::Note) => Self::CreateStatus,
            // Votes are not federated as Questions; the pairing only routes.
            (V::Create, O::Question) => Self::CreatePollVote,
            (V::Create, O::Follow) => Self::CreateFollowRequest,
            (V::Create, O::Like) => Self::CreateLike,
            (V::Create, O::Announce) => Self::CreateAnnounce,
            (V::Create, O::Block) => Self::CreateBlock,
            (V::Update, O::Note) => Self::UpdateStatus,
            (V::Update, O::Profile | O::Person) => Self::UpdateAccount,
            (V::Update, O::Flag) => Self::UpdateReport,
            (V::Accept, O::Follow) => Self::AcceptFollow,
            (V::Accept, O::Profile | O::Person) => Self::AcceptAccount,
            (V::Reject, O::Follow) => Self::RejectFollowRequest,
            (V::Reject, O::Profile | O::Person) => Self::RejectAccount,
            (V::Undo, O::Follow) => Self::UndoFollow,
            (V::Undo, O::Block) => Self::UndoBlock,
            (V::Undo, O::Like) => Self::UndoFave,
            (V::Undo, O::Announce) => Self::UndoAnnounce,
            (V::Delete, O::Note) => Self::DeleteStatus,
            (V::Delete, O::Profile | O::Person) => Self::DeleteAccount,
            (V::Flag, O::Profile) => Self::ReportAccount,
            (V::Move, O::Profile | O::Person) => Self::MoveAccount,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateAccount => "client.create_account",
            Self::CreateStatus => "client.create_status",
            Self::CreatePollVote => "client.create_poll_vote",
            Self::CreateFollowRequest => "client.create_follow_request",
            Self::CreateLike => "client.create_like",
            Self::CreateAnnounce => "client.create_announce",
            Self::CreateBlock => "client.create_block",
            Self::UpdateStatus => "client.update_status",
            Self::UpdateAccount => "client.update_account",
            Self::UpdateReport => "client.update_report",
            Self::AcceptFollow => "client.accept_follow",
            Self::AcceptAccount => "client.accept_account",
            Self::RejectFollowRequest => "client.reject_follow_request",
            Self::RejectAccount => "client.reject_account",
            Self::UndoFollow => "client.undo_follow",
            Self::UndoBlock => "client.undo_block",
            Self::UndoFave => "client.undo_fave",
            Self::UndoAnnounce => "client.undo_announce",
            Self::DeleteStatus => "client.delete_status",
            Self::DeleteAccount => "client.delete_account",
            Self::ReportAccount => "client.report_account",
            Self::MoveAccount => "client.move_account",
        }
    }

    /// Payload kinds this route consumes.
    pub fn expects(&self) -> &'static [PayloadKind] {
        use PayloadKind as K;
        match self {
            Self::CreateAccount | Self::AcceptAccount => &[K::User],
            Self::CreateStatus
            | Self::CreateAnnounce
            | Self::UpdateStatus
            | Self::UndoAnnounce
            | Self::DeleteStatus => &[K::Status],
            Self::CreatePollVote => &[K::PollVote],
            Self::CreateFollowRequest | Self::RejectFollowRequest => &[K::FollowRequest],
            Self::CreateLike | Self::UndoFave => &[K::Fave],
            Self::CreateBlock | Self::UndoBlock => &[K::Block],
            Self::UpdateAccount => &[K::Account],
            Self::UpdateReport | Self::ReportAccount => &[K::Report],
            Self::AcceptFollow | Self::UndoFollow => &[K::Follow],
            Self::RejectAccount => &[K::DeniedUser],
            Self::DeleteAccount => &[K::DomainBlock, K::None],
            Self::MoveAccount => &[K::Account, K::None],
        }
    }

    pub fn accepts(&self, payload: &Payload) -> bool {
        self.expects().contains(&payload.kind())
    }

    pub fn policy(&self) -> Policy {
        match self {
            Self::CreateAccount => from_client::CREATE_ACCOUNT,
            Self::CreateStatus => from_client::CREATE_STATUS,
            Self::CreatePollVote => from_client::CREATE_POLL_VOTE,
            Self::CreateFollowRequest => from_client::CREATE_FOLLOW_REQUEST,
            Self::CreateLike => from_client::CREATE_LIKE,
            Self::CreateAnnounce => from_client::CREATE_ANNOUNCE,
            Self::CreateBlock => from_client::CREATE_BLOCK,
            Self::UpdateStatus => from_client::UPDATE_STATUS,
            Self::UpdateAccount => from_client::UPDATE_ACCOUNT,
            Self::UpdateReport => from_client::UPDATE_REPORT,
            Self::AcceptFollow => from_client::ACCEPT_FOLLOW,
            Self::AcceptAccount => from_client::ACCEPT_ACCOUNT,
            Self::RejectFollowRequest => from_client::REJECT_FOLLOW_REQUEST,
            Self::RejectAccount => from_client::REJECT_ACCOUNT,
            Self::UndoFollow => from_client::UNDO_FOLLOW,
            Self::UndoBlock => from_client::UNDO_BLOCK,
            Self::UndoFave => from_client::UNDO_FAVE,
            Self::UndoAnnounce => from_client::UNDO_ANNOUNCE,
            Self::DeleteStatus => from_client::DELETE_STATUS,
            Self::DeleteAccount => from_client::DELETE_ACCOUNT,
            Self::ReportAccount => from_client::REPORT_ACCOUNT,
            Self::MoveAccount => from_client::MOVE_ACCOUNT,
        }
    }

    async fn run(
        &self,
        fx: &mut Effects<'_>,
        p: &Processor,
        env: &Envelope,
    ) -> Result<(), ProcessError> {
        match self {
            Self::CreateAccount => from_client::create_account(fx, p, env).await,
            Self::CreateStatus => from_client::create_status(fx, p, env).await,
            Self::CreatePollVote => from_client::create_poll_vote(fx, p, env).await,
            Self::CreateFollowRequest => from_client::create_follow_request(fx, p, env).await,
            Self::CreateLike => from_client::create_like(fx, p, env).await,
            Self::CreateAnnounce => from_client::create_announce(fx, p, env).await,
            Self::CreateBlock => from_client::create_block(fx, p, env).await,
            Self::UpdateStatus => from_client::update_status(fx, p, env).await,
            Self::UpdateAccount => from_client::update_account(fx, p, env).await,
            Self::UpdateReport => from_client::update_report(fx, p, env).await,
            Self::AcceptFollow => from_client::accept_follow(fx, p, env).await,
            Self::AcceptAccount => from_client::accept_account(fx, p, env).await,
            Self::RejectFollowRequest => from_client::reject_follow_request(fx, p, env).await,
            Self::RejectAccount => from_client::reject_account(fx, p, env).await,
            Self::UndoFollow => from_client::undo_follow(fx, p, env).await,
            Self::UndoBlock => from_client::undo_block(fx, p, env).await,
            Self::UndoFave => from_client::undo_fave(fx, p, env).await,
            Self::UndoAnnounce => from_client::undo_announce(fx, p, env).await,
            Self::DeleteStatus => from_client::delete_status(fx, p, env).await,
            Self::DeleteAccount => from_client::delete_account(fx, p, env).await,
            Self::ReportAccount => from_client::report_account(fx, p, env).await,
            Self::MoveAccount => from_client::move_account(fx, p, env).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FediRoute {
    CreateStatus,
    CreatePollVote,
    CreateFollowRequest,
    CreateLike,
    CreateAnnounce,
    CreateBlock,
    CreateFlag,
    UpdateStatus,
    UpdateAccount,
    AcceptFollow,
    DeleteStatus,
    DeleteAccount,
    MoveAccount,
}

impl FediRoute {
    pub fn resolve(verb: Verb, object_type: ObjectType) -> Option<Self> {
        use ObjectType as O;
        use Verb as V;
        Some(match (verb, object_type) {
            (V::Create, O::Note) => Self::CreateStatus,
            (V::Create, O::Question) => Self::CreatePollVote,
            (V::Create, O::Follow) => Self::CreateFollowRequest,
            (V::Create, O::Like) => Self::CreateLike,
            (V::Create, O::Announce) => Self::CreateAnnounce,
            (V::Create, O::Block) => Self::CreateBlock,
            (V::Create, O::Flag) => Self::CreateFlag,
            (V::Update, O::Note) => Self::UpdateStatus,
            (V::Update, O::Profile) => Self::UpdateAccount,
            (V::Accept, O::Follow) => Self::AcceptFollow,
            (V::Delete, O::Note) => Self::DeleteStatus,
            (V::Delete, O::Profile) => Self::DeleteAccount,
            (V::Move, O::Profile) => Self::MoveAccount,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateStatus => "fedi.create_status",
            Self::CreatePollVote => "fedi.create_poll_vote",
            Self::CreateFollowRequest => "fedi.create_follow_request",
            Self::CreateLike => "fedi.create_like",
            Self::CreateAnnounce => "fedi.create_announce",
            Self::CreateBlock => "fedi.create_block",
            Self::CreateFlag => "fedi.create_flag",
            Self::UpdateStatus => "fedi.update_status",
            Self::UpdateAccount => "fedi.update_account",
            Self::AcceptFollow => "fedi.accept_follow",
            Self::DeleteStatus => "fedi.delete_status",
            Self::DeleteAccount => "fedi.delete_account",
            Self::MoveAccount => "fedi.move_account",
        }
    }

    pub fn expects(&self) -> &'static [PayloadKind] {
        use PayloadKind as K;
        match self {
            Self::CreateStatus => &[K::ApStatus, K::Iri],
            Self::CreatePollVote => &[K::PollVote],
            Self::CreateFollowRequest => &[K::FollowRequest],
            Self::CreateLike => &[K::Fave],
            Self::CreateAnnounce | Self::DeleteStatus => &[K::Status],
            Self::CreateBlock => &[K::Block],
            Self::CreateFlag => &[K::Report],
            Self::UpdateStatus => &[K::StatusUpdate],
            Self::UpdateAccount => &[K::AccountUpdate],
            Self::AcceptFollow => &[K::Follow, K::None],
            Self::DeleteAccount => &[K::Account],
            Self::MoveAccount => &[K::Account, K::None],
        }
    }

    pub fn accepts(&self, payload: &Payload) -> bool {
        self.expects().contains(&payload.kind())
    }

    /// Handlers that act for a local inbox owner need to know who that is.
    pub fn needs_receiving(&self) -> bool {
        matches!(
            self,
            Self::CreateStatus
                | Self::CreateAnnounce
                | Self::UpdateStatus
                | Self::UpdateAccount
                | Self::AcceptFollow
                | Self::MoveAccount
        )
    }

    pub fn policy(&self) -> Policy {
        match self {
            Self::CreateStatus => from_fedi::CREATE_STATUS,
            Self::CreatePollVote => from_fedi::CREATE_POLL_VOTE,
            Self::CreateFollowRequest => from_fedi::CREATE_FOLLOW_REQUEST,
            Self::CreateLike => from_fedi::CREATE_LIKE,
            Self::CreateAnnounce => from_fedi::CREATE_ANNOUNCE,
            Self::CreateBlock => from_fedi::CREATE_BLOCK,
            Self::CreateFlag => from_fedi::CREATE_FLAG,
            Self::UpdateStatus => from_fedi::UPDATE_STATUS,
            Self::UpdateAccount => from_fedi::UPDATE_ACCOUNT,
            Self::AcceptFollow => from_fedi::ACCEPT_FOLLOW,
            Self::DeleteStatus => from_fedi::DELETE_STATUS,
            Self::DeleteAccount => from_fedi::DELETE_ACCOUNT,
            Self::MoveAccount => from_fedi::MOVE_ACCOUNT,
        }
    }

    async fn run(
        &self,
        fx: &mut Effects<'_>,
        p: &Processor,
        env: &Envelope,
    ) -> Result<(), ProcessError> {
        match self {
            Self::CreateStatus => from_fedi::create_status(fx, p, env).await,
            Self::CreatePollVote => from_fedi::create_poll_vote(fx, p, env).await,
            Self::CreateFollowRequest => from_fedi::create_follow_request(fx, p, env).await,
            Self::CreateLike => from_fedi::create_like(fx, p, env).await,
            Self::CreateAnnounce => from_fedi::create_announce(fx, p, env).await,
            Self::CreateBlock => from_fedi::create_block(fx, p, env).await,
            Self::CreateFlag => from_fedi::create_flag(fx, p, env).await,
            Self::UpdateStatus => from_fedi::update_status(fx, p, env).await,
            Self::UpdateAccount => from_fedi::update_account(fx, p, env).await,
            Self::AcceptFollow => from_fedi::accept_follow(fx, p, env).await,
            Self::DeleteStatus => from_fedi::delete_status(fx, p, env).await,
            Self::DeleteAccount => from_fedi::delete_account(fx, p, env).await,
            Self::MoveAccount => from_fedi::move_account(fx, p, env).await,
        }
    }
}

fn expected_label(kinds: &[PayloadKind]) -> &'static str {
    use PayloadKind as K;
    match kinds {
        [K::User] => "user",
        [K::Status] => "status",
        [K::PollVote] => "poll vote",
        [K::FollowRequest] => "follow request",
        [K::Fave] => "fave",
        [K::Block] => "block",
        [K::Account] => "account",
        [K::Report] => "report",
        [K::Follow] => "follow",
        [K::DeniedUser] => "denied user",
        [K::StatusUpdate] => "status update",
        [K::AccountUpdate] => "account update",
        [K::ApStatus, K::Iri] => "status object or iri",
        [K::DomainBlock, K::None] => "domain block or nothing",
        [K::Account, K::None] => "account or nothing",
        [K::Follow, K::None] => "follow or nothing",
        _ => "matching payload",
    }
}

/// Checks a client envelope before it is queued.
pub fn validate_client(env: &Envelope) -> Result<ClientRoute, ProcessError> {
    let route =
        ClientRoute::resolve(env.verb, env.object_type).ok_or(ProcessError::Unhandled {
            verb: env.verb,
            object_type: env.object_type,
            origin: "client",
        })?;
    if !route.accepts(&env.payload) {
        return Err(ProcessError::mismatch(
            expected_label(route.expects()),
            env.payload.kind(),
        ));
    }
    Ok(route)
}

/// Checks a federated envelope before it is queued.
pub fn validate_fedi(env: &Envelope) -> Result<FediRoute, ProcessError> {
    let route =
        FediRoute::resolve(env.verb, env.object_type).ok_or(ProcessError::Unhandled {
            verb: env.verb,
            object_type: env.object_type,
            origin: "federated",
        })?;
    if !route.accepts(&env.payload) {
        return Err(ProcessError::mismatch(
            expected_label(route.expects()),
            env.payload.kind(),
        ));
    }
    if route.needs_receiving() && env.receiving.is_none() {
        return Err(ProcessError::missing("receiving account"));
    }
    Ok(route)
}

/// Entry point for the queue workers.
#[derive(Clone)]
pub struct Processor {
    pub(crate) state: State,
    pub(crate) surface: Surface,
}

impl Processor {
    pub fn new(state: State) -> Self {
        let surface = Surface::new(state.clone());
        Self { state, surface }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub async fn process_from_client(
        &self,
        env: &Envelope,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ProcessError> {
        info!(
            verb = %env.verb,
            object_type = %env.object_type,
            from = %env.origin.handle(),
            "processing from client"
        );
        debug!(payload = %env.payload.kind(), "client envelope");
        let route = validate_client(env)?;
        let mut fx = Effects::new(route.name(), route.policy(), cancel);
        route.run(&mut fx, self, env).await?;
        Ok(fx.finish())
    }

    pub async fn process_from_fedi(
        &self,
        env: &Envelope,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ProcessError> {
        info!(
            verb = %env.verb,
            object_type = %env.object_type,
            from = %env.origin.uri,
            to = %env.receiving.as_ref().map(Account::handle).unwrap_or_default(),
            "processing from federator"
        );
        debug!(payload = %env.payload.kind(), "federated envelope");
        let route = validate_fedi(env)?;
        let mut fx = Effects::new(route.name(), route.policy(), cancel);
        route.run(&mut fx, self, env).await?;
        Ok(fx.finish())
    }
}
