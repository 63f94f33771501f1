//! Cross-channel relay for hublink hubs.
//!
//! A message posted in a connected channel is resolved to its hub, run
//! through the moderation gates, rendered per destination, fanned out to
//! every other connected channel's webhook and indexed so replies,
//! reactions and deletes can find all of its copies later.

pub mod actions;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod format;
pub mod index;
pub mod interactions;
pub mod moderation;
pub mod platform;
pub mod reactions;
pub mod registry;
pub mod service;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use {
    actions::{CrossCopyModerationActions, DeleteOutcome},
    dispatch::{BatchSummary, BroadcastDispatcher, Delivery, DeliveryResult},
    error::{Error, Result},
    events::{
        Attachment, Author, InboundEvent, InteractionInvoked, MessageCreated, ModerationAction,
        ModerationRequested, ReactionAdded, ReferencedMessage,
    },
    format::{MessageFormatter, RenderRequest, Rendered, ReplyContext},
    index::{BroadcastCopy, MessageIndex, OriginalMessage, ReactionTally, ReactionUpdate, ReplyLink},
    interactions::{InteractionHandler, InteractionReply, InteractionRouter},
    moderation::{Evaluation, ModerationPipeline, SideEffect, Verdict},
    platform::{LoggingHooks, ModeratorAlert, PlatformHooks},
    reactions::{ReactionOutcome, ReactionSync, Rejection},
    registry::ConnectionRegistry,
    service::{EventOutcome, Relay, RelayOutcome, RelaySummary},
};
