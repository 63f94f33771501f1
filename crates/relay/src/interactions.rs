//! Button presses routed by the action key in their custom id.

use std::{collections::HashMap, sync::Arc};

use {async_trait::async_trait, tracing::debug};

use crate::{
    actions::{CrossCopyModerationActions, DELETE_PREFIX, DeleteOutcome},
    error::Result,
    events::InteractionInvoked,
    reactions::{REACT_PREFIX, ReactionOutcome, ReactionSync, Rejection},
};

/// Reply shown only to the user who pressed the button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionReply {
    /// Acknowledge without a message.
    Ack,
    Ephemeral(String),
}

#[async_trait]
pub trait InteractionHandler: Send + Sync {
    /// `args` is the custom id with the action key and its separator removed.
    async fn handle(&self, interaction: &InteractionInvoked, args: &str) -> Result<InteractionReply>;
}

#[derive(Default)]
pub struct InteractionRouter {
    handlers: HashMap<String, Arc<dyn InteractionHandler>>,
}

impl InteractionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for custom ids of the form `{action}:...`. A later
    /// registration for the same action replaces the earlier one.
    pub fn register(&mut self, action: impl Into<String>, handler: Arc<dyn InteractionHandler>) -> &mut Self {
        self.handlers.insert(action.into(), handler);
        self
    }

    pub fn actions(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// `None` when no handler claims the custom id.
    pub async fn route(&self, interaction: &InteractionInvoked) -> Result<Option<InteractionReply>> {
        let (action, args) = interaction
            .custom_id
            .split_once(':')
            .unwrap_or((interaction.custom_id.as_str(), ""));
        let Some(handler) = self.handlers.get(action) else {
            debug!(custom_id = %interaction.custom_id, "no handler for interaction");
            return Ok(None);
        };
        handler.handle(interaction, args).await.map(Some)
    }
}

/// `react:{original_id}:{emoji}` toggles the presser's reaction.
pub struct ReactionButton {
    sync: Arc<ReactionSync>,
}

impl ReactionButton {
    pub fn new(sync: Arc<ReactionSync>) -> Self {
        Self { sync }
    }
}

#[async_trait]
impl InteractionHandler for ReactionButton {
    async fn handle(&self, interaction: &InteractionInvoked, args: &str) -> Result<InteractionReply> {
        let Some((original_id, emoji)) = args.split_once(':').filter(|(_, e)| !e.is_empty()) else {
            return Ok(InteractionReply::Ephemeral("This button is malformed.".into()));
        };
        let outcome = self
            .sync
            .toggle(original_id, &interaction.user_id, &interaction.server_id, emoji)
            .await?;
        Ok(match outcome {
            ReactionOutcome::Synced { .. } => InteractionReply::Ack,
            ReactionOutcome::Rejected(Rejection::ReactionsDisabled) => {
                InteractionReply::Ephemeral("Reactions are disabled in this hub.".into())
            },
            ReactionOutcome::Rejected(Rejection::Blacklisted) => {
                InteractionReply::Ephemeral("You cannot react while blacklisted from this hub.".into())
            },
            ReactionOutcome::Rejected(Rejection::TooManyKinds) => {
                InteractionReply::Ephemeral("This message has too many different reactions.".into())
            },
            ReactionOutcome::Unknown => {
                InteractionReply::Ephemeral("This message is too old to react to.".into())
            },
        })
    }
}

/// `delete:{message_id}` deletes every copy.
pub struct DeleteButton {
    actions: Arc<CrossCopyModerationActions>,
}

impl DeleteButton {
    pub fn new(actions: Arc<CrossCopyModerationActions>) -> Self {
        Self { actions }
    }
}

#[async_trait]
impl InteractionHandler for DeleteButton {
    async fn handle(&self, interaction: &InteractionInvoked, args: &str) -> Result<InteractionReply> {
        let message_id = if args.is_empty() {
            interaction.message_id.as_str()
        } else {
            args
        };
        let outcome = self
            .actions
            .delete_everywhere(message_id, &interaction.user_id)
            .await?;
        Ok(InteractionReply::Ephemeral(match outcome {
            DeleteOutcome::Deleted { deleted, total } => {
                format!("Deleted {deleted}/{total} copies of the message.")
            },
            DeleteOutcome::Unknown => "This message is too old or was never relayed.".into(),
            DeleteOutcome::Unauthorized => "You are not allowed to delete this message.".into(),
            DeleteOutcome::AlreadyInProgress => "This message is already being deleted.".into(),
        }))
    }
}

/// Router with the built-in buttons registered.
pub fn default_router(
    sync: Arc<ReactionSync>,
    actions: Arc<CrossCopyModerationActions>,
) -> InteractionRouter {
    let mut router = InteractionRouter::new();
    router
        .register(REACT_PREFIX, Arc::new(ReactionButton::new(sync)))
        .register(DELETE_PREFIX, Arc::new(DeleteButton::new(actions)));
    router
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::sync::Mutex};

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    #[async_trait]
    impl InteractionHandler for Capture {
        async fn handle(&self, _: &InteractionInvoked, args: &str) -> Result<InteractionReply> {
            self.0.lock().unwrap().push(args.to_string());
            Ok(InteractionReply::Ack)
        }
    }

    fn pressed(custom_id: &str) -> InteractionInvoked {
        InteractionInvoked {
            custom_id: custom_id.into(),
            message_id: "m".into(),
            channel_id: "c".into(),
            server_id: "s".into(),
            user_id: "u".into(),
        }
    }

    #[tokio::test]
    async fn routes_by_action_key() {
        let capture = Arc::new(Capture::default());
        let mut router = InteractionRouter::new();
        router.register("react", capture.clone());

        let reply = router.route(&pressed("react:orig:<:blob:123>")).await.unwrap();
        assert_eq!(reply, Some(InteractionReply::Ack));
        assert_eq!(*capture.0.lock().unwrap(), vec!["orig:<:blob:123>".to_string()]);

        assert_eq!(router.route(&pressed("vote:1")).await.unwrap(), None);
        assert_eq!(router.actions(), vec!["react"]);
    }

    #[tokio::test]
    async fn bare_action_gets_empty_args() {
        let capture = Arc::new(Capture::default());
        let mut router = InteractionRouter::new();
        router.register("delete", capture.clone());

        router.route(&pressed("delete")).await.unwrap();
        assert_eq!(*capture.0.lock().unwrap(), vec![String::new()]);
    }
}
