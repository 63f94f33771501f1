#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use {
    common::Harness,
    hublink_common::types::{HubSettings, InfractionKind, InfractionStatus, InfractionTarget, Infraction},
    hublink_relay::{
        BatchSummary, EventOutcome, InboundEvent, InteractionInvoked, InteractionReply,
        ReactionAdded, ReactionOutcome, Rejection,
    },
    hublink_store::InfractionStore,
};

fn reaction(message_id: &str, channel: &str, user: &str, emoji: &str) -> InboundEvent {
    InboundEvent::ReactionAdded(ReactionAdded {
        message_id: message_id.into(),
        channel_id: channel.into(),
        server_id: format!("server-{channel}"),
        user_id: user.into(),
        emoji: emoji.into(),
    })
}

#[tokio::test]
async fn reacting_on_one_copy_converges_every_copy() {
    let h = Harness::new(&["A", "B", "C"]).await;
    let summary = h.relayed("m1", "A", "hello").await;
    let copy_b = summary.copies[0].message_id.clone();

    let outcome = h
        .relay
        .handle_event(&reaction(&copy_b, "B", "user-B", "👍"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        EventOutcome::Reaction(ReactionOutcome::Synced {
            added: true,
            edits: BatchSummary {
                attempted: 2,
                succeeded: 2
            },
        })
    );

    let edits = h.sink.edits();
    let mut channels: Vec<&str> = edits.iter().map(|(c, _, _)| c.as_str()).collect();
    channels.sort_unstable();
    assert_eq!(channels, vec!["B", "C"]);
    for (_, _, payload) in &edits {
        let rows = payload.components.as_ref().unwrap();
        assert_eq!(rows[0].components[0].label, "👍 1");
        assert_eq!(rows[0].components[0].custom_id.as_deref(), Some("react:m1:👍"));
    }
    assert_eq!(h.hooks.removed(), vec![(copy_b, "👍".to_string())]);

    let tally = h.relay.index().get_original("m1").await.unwrap().unwrap().reactions;
    assert!(tally["👍"].contains("user-B"));
}

#[tokio::test]
async fn simultaneous_reactions_are_both_counted() {
    let h = Harness::new(&["A", "B", "C"]).await;
    h.relayed("m1", "A", "hello").await;

    let first = reaction("m1", "A", "u1", "👍");
    let second = reaction("m1", "A", "u2", "👍");
    let (a, b) = tokio::join!(h.relay.handle_event(&first), h.relay.handle_event(&second));
    for outcome in [a.unwrap(), b.unwrap()] {
        assert!(matches!(
            outcome,
            EventOutcome::Reaction(ReactionOutcome::Synced { added: true, .. })
        ));
    }

    let tally = h.relay.index().get_original("m1").await.unwrap().unwrap().reactions;
    assert_eq!(tally.get("👍").map(|users| users.len()), Some(2));
}

#[tokio::test]
async fn pressing_the_control_toggles_back_off() {
    let h = Harness::new(&["A", "B", "C"]).await;
    h.relayed("m1", "A", "hello").await;
    h.relay
        .handle_event(&reaction("m1", "A", "user-C", "🔥"))
        .await
        .unwrap();

    let outcome = h
        .relay
        .handle_event(&InboundEvent::InteractionInvoked(InteractionInvoked {
            custom_id: "react:m1:🔥".into(),
            message_id: "copy-whatever".into(),
            channel_id: "C".into(),
            server_id: "server-C".into(),
            user_id: "user-C".into(),
        }))
        .await
        .unwrap();
    assert_eq!(outcome, EventOutcome::Interaction(Some(InteractionReply::Ack)));

    let edits = h.sink.edits();
    assert_eq!(edits.len(), 4);
    for (_, _, payload) in &edits[2..] {
        assert_eq!(payload.components, Some(Vec::new()));
    }
    assert!(h.relay.index().get_original("m1").await.unwrap().unwrap().reactions.is_empty());
}

#[tokio::test]
async fn reaction_kinds_are_capped() {
    let mut config = hublink_config::HublinkConfig::default();
    config.relay.max_reaction_kinds = 2;
    let h = Harness::with_config(&config, &["A", "B"]).await;
    h.relayed("m1", "A", "hello").await;

    for emoji in ["1️⃣", "2️⃣"] {
        h.relay.handle_event(&reaction("m1", "A", "u", emoji)).await.unwrap();
    }
    let outcome = h.relay.handle_event(&reaction("m1", "A", "u", "3️⃣")).await.unwrap();
    assert_eq!(
        outcome,
        EventOutcome::Reaction(ReactionOutcome::Rejected(Rejection::TooManyKinds))
    );
    // An existing kind still accepts new users.
    let outcome = h.relay.handle_event(&reaction("m1", "A", "v", "1️⃣")).await.unwrap();
    assert!(matches!(
        outcome,
        EventOutcome::Reaction(ReactionOutcome::Synced { added: true, .. })
    ));
}

#[tokio::test]
async fn disabled_or_blacklisted_reactions_are_rejected() {
    let h = Harness::new(&["A", "B"]).await;
    h.relayed("m1", "A", "hello").await;

    h.store
        .issue(&Infraction {
            id: "i1".into(),
            hub_id: common::HUB.into(),
            target: InfractionTarget::Server("server-B".into()),
            kind: InfractionKind::Blacklist,
            reason: "raid".into(),
            moderator_id: "mod".into(),
            issued_at: 0,
            expires_at: None,
            status: InfractionStatus::Active,
        })
        .await
        .unwrap();
    assert_eq!(
        h.relay.handle_event(&reaction("m1", "B", "user-B", "👍")).await.unwrap(),
        EventOutcome::Reaction(ReactionOutcome::Rejected(Rejection::Blacklisted))
    );

    h.set_hub(|hub| hub.settings = hub.settings.without(HubSettings::REACTIONS))
        .await;
    assert_eq!(
        h.relay.handle_event(&reaction("m1", "A", "user-A", "👍")).await.unwrap(),
        EventOutcome::Reaction(ReactionOutcome::Rejected(Rejection::ReactionsDisabled))
    );
    assert!(h.sink.edits().is_empty());
}

#[tokio::test]
async fn unknown_messages_are_reported_not_errors() {
    let h = Harness::new(&["A", "B"]).await;
    assert_eq!(
        h.relay.handle_event(&reaction("never", "A", "u", "👍")).await.unwrap(),
        EventOutcome::Reaction(ReactionOutcome::Unknown)
    );
    assert!(h.hooks.removed().is_empty());
}
