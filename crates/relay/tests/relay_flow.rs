#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use {
    common::{HUB, Harness},
    hublink_cache::{SharedCache, keys},
    hublink_common::types::{
        BlockWordAction, BlockWordRule, HubModerator, Infraction, InfractionKind,
        InfractionStatus, InfractionTarget, ModeratorRole, now_ms,
    },
    hublink_relay::{
        DeleteOutcome, EventOutcome, InboundEvent, InteractionInvoked, InteractionReply,
        ModerationAction, ModerationRequested, ReactionAdded, ReferencedMessage, RelayOutcome,
    },
    hublink_store::{BlockWordStore, ConnectionStore, HubStore, InfractionStore, MessageAuditStore},
    hublink_webhook::DeliveryError,
};

fn infraction(target: InfractionTarget, expires_at: Option<i64>) -> Infraction {
    Infraction {
        id: format!("inf-{}", target.id()),
        hub_id: HUB.into(),
        target,
        kind: InfractionKind::Blacklist,
        reason: "rule breaking".into(),
        moderator_id: "mod".into(),
        issued_at: 0,
        expires_at,
        status: InfractionStatus::Active,
    }
}

#[tokio::test]
async fn hello_reaches_every_other_channel_and_deletes_everywhere() {
    let h = Harness::new(&["A", "B", "C"]).await;

    let summary = h.relayed("m1", "A", "hello").await;
    assert_eq!(summary.delivered, 2);
    assert_eq!(h.sink.executed_channels(), vec!["B", "C"]);

    let copies = h.relay.index().get_copies("m1", HUB).await.unwrap();
    assert_eq!(copies.keys().cloned().collect::<Vec<_>>(), vec!["B", "C"]);
    for copy in copies.values() {
        let original = h
            .relay
            .index()
            .find_original_by_copy(&copy.message_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(original.message_id, "m1");
    }

    let copy_b = copies["B"].message_id.clone();
    let outcome = h
        .relay
        .handle_event(&InboundEvent::ModerationRequested(ModerationRequested {
            message_id: copy_b,
            actor_id: "user-A".into(),
            action: ModerationAction::Delete,
        }))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        EventOutcome::Moderation(DeleteOutcome::Deleted {
            deleted: 2,
            total: 2
        })
    );
}

#[tokio::test]
async fn n_destinations_yield_n_minus_one_copies() {
    let h = Harness::new(&["A", "B", "C", "D", "E"]).await;
    let summary = h.relayed("m1", "C", "hi all").await;
    assert_eq!(summary.delivered, 4);
    assert!(summary.copies.iter().all(|c| c.channel_id != "C"));
}

#[tokio::test]
async fn relay_writes_audit_and_touches_source() {
    let h = Harness::new(&["A", "B"]).await;
    h.relayed("m1", "A", "hello").await;

    let audit = h.store.get_audit("m1").await.unwrap().unwrap();
    assert_eq!(audit.copy_count, 1);
    assert_eq!(audit.author_id, "user-A");
    assert!(h.store.get_connection("A").await.unwrap().unwrap().last_active_at > 0);
}

#[tokio::test]
async fn blacklisted_author_never_reaches_the_dispatcher() {
    let h = Harness::new(&["A", "B", "C"]).await;
    h.store
        .issue(&infraction(InfractionTarget::User("user-A".into()), None))
        .await
        .unwrap();

    let outcome = h.post("m1", "A", "hello").await;
    assert!(matches!(outcome, RelayOutcome::Vetoed { gate: "blacklist", .. }));
    assert!(h.sink.executed().is_empty());

    h.relay.drain_side_effects().await;
    assert_eq!(h.hooks.notices().len(), 1);
}

#[tokio::test]
async fn third_message_in_window_is_vetoed_and_fourth_after_passes() {
    let h = Harness::new(&["A", "B"]).await;
    let at = |id: &str, ms: i64| {
        let mut msg = h.message(id, "A", id);
        msg.created_at = 1_000_000 + ms;
        msg
    };

    for (id, ms) in [("m1", 0), ("m2", 1_000)] {
        let outcome = h.relay.handle_message(&at(id, ms)).await.unwrap();
        assert!(matches!(outcome, RelayOutcome::Relayed(_)));
    }
    let outcome = h.relay.handle_message(&at("m3", 2_000)).await.unwrap();
    assert!(matches!(outcome, RelayOutcome::Vetoed { gate: "antispam", .. }));
    assert_eq!(
        h.cache
            .hget(&keys::spam_strikes("user-A"), "strikes")
            .await
            .unwrap()
            .as_deref(),
        Some("1")
    );

    let outcome = h.relay.handle_message(&at("m4", 9_000)).await.unwrap();
    assert!(matches!(outcome, RelayOutcome::Relayed(_)));
    assert_eq!(h.sink.executed_channels(), vec!["B", "B", "B"]);
}

#[tokio::test]
async fn repeated_strikes_blacklist_the_author() {
    let h = Harness::new(&["A", "B"]).await;
    for i in 0..3 {
        let outcome = h.post(&format!("m{i}"), "A", "aaaaaaaaaaaaaaaa").await;
        assert!(matches!(outcome, RelayOutcome::Vetoed { gate: "antispam", .. }));
    }
    h.relay.drain_side_effects().await;

    let active = h
        .store
        .find_active(
            HUB,
            &InfractionTarget::User("user-A".into()),
            InfractionKind::Blacklist,
            now_ms(),
        )
        .await
        .unwrap();
    assert!(active.is_some_and(|i| i.expires_at.is_some()));
    assert!(matches!(
        h.post("m9", "A", "hello again").await,
        RelayOutcome::Vetoed { gate: "blacklist", .. }
    ));
}

#[tokio::test]
async fn block_rule_vetoes_matching_content_only() {
    let h = Harness::new(&["A", "B"]).await;
    h.store
        .upsert_rule(
            &BlockWordRule {
                id: "r1".into(),
                hub_id: HUB.into(),
                name: "no-crypto".into(),
                words: vec!["shitcoin".into(), "pump*".into()],
                actions: vec![BlockWordAction::Alert, BlockWordAction::Block],
                created_at: 0,
            },
            5,
        )
        .await
        .unwrap();

    let outcome = h.post("m1", "A", "Buy this ShitCoin now").await;
    let RelayOutcome::Vetoed { gate, reason } = outcome else {
        panic!("expected veto");
    };
    assert_eq!(gate, "blockwords");
    assert!(reason.contains("no-crypto"));

    h.relayed("m2", "A", "a perfectly normal coin").await;
    h.relay.drain_side_effects().await;
    assert_eq!(h.hooks.alerts().len(), 1);
}

#[tokio::test]
async fn locked_and_paused_channels_do_not_relay() {
    let h = Harness::new(&["A", "B"]).await;
    h.set_hub(|hub| hub.locked = true).await;
    assert_eq!(h.post("m1", "A", "hi").await, RelayOutcome::HubLocked);

    h.set_hub(|hub| hub.locked = false).await;
    h.relay.registry().set_connected("A", false).await.unwrap();
    assert_eq!(h.post("m2", "A", "hi").await, RelayOutcome::Paused);
    assert_eq!(h.post("m3", "Z", "hi").await, RelayOutcome::NotConnected);
    assert!(h.sink.executed().is_empty());
}

#[tokio::test]
async fn paused_destinations_are_skipped() {
    let h = Harness::new(&["A", "B", "C"]).await;
    h.relay.registry().set_connected("C", false).await.unwrap();
    h.relayed("m1", "A", "hello").await;
    assert_eq!(h.sink.executed_channels(), vec!["B"]);
}

#[tokio::test]
async fn permanent_failure_disables_the_connection() {
    let h = Harness::new(&["A", "B", "C"]).await;
    h.sink.fail_channel("B", DeliveryError::Status {
        status: 404,
        body: "Unknown Webhook".into(),
    });
    h.sink.fail_channel("C", DeliveryError::Status {
        status: 429,
        body: String::new(),
    });

    let summary = h.relayed("m1", "A", "hello").await;
    assert_eq!(summary.delivered, 0);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.disabled, 1);
    assert!(h.relay.registry().resolve("B").await.unwrap().is_none());
    assert!(h.relay.registry().resolve("C").await.unwrap().is_some());
}

#[tokio::test]
async fn delete_reports_partial_counts() {
    let h = Harness::new(&["A", "B", "C"]).await;
    h.relayed("m1", "A", "hello").await;
    h.sink.fail_channel("C", DeliveryError::Timeout);

    let outcome = h.relay.actions().delete_everywhere("m1", "owner").await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted {
        deleted: 1,
        total: 2
    });
}

#[tokio::test]
async fn delete_requires_authority_and_a_free_marker() {
    let h = Harness::new(&["A", "B"]).await;
    let summary = h.relayed("m1", "A", "hello").await;
    let copy = summary.copies[0].message_id.clone();
    let actions = h.relay.actions();

    assert_eq!(
        actions.delete_everywhere(&copy, "stranger").await.unwrap(),
        DeleteOutcome::Unauthorized
    );
    assert_eq!(
        actions.delete_everywhere("nope", "owner").await.unwrap(),
        DeleteOutcome::Unknown
    );

    h.store
        .add_moderator(&HubModerator {
            hub_id: HUB.into(),
            user_id: "mod-1".into(),
            role: ModeratorRole::Moderator,
        })
        .await
        .unwrap();
    h.cache
        .set_nx(
            &keys::delete_in_progress("m1"),
            "someone",
            std::time::Duration::from_secs(60),
        )
        .await
        .unwrap();
    assert_eq!(
        actions.delete_everywhere(&copy, "mod-1").await.unwrap(),
        DeleteOutcome::AlreadyInProgress
    );

    h.cache.delete(&[keys::delete_in_progress("m1")]).await.unwrap();
    assert!(matches!(
        actions.delete_everywhere(&copy, "mod-1").await.unwrap(),
        DeleteOutcome::Deleted { deleted: 1, total: 1 }
    ));
    assert!(h.cache.get(&keys::delete_in_progress("m1")).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_button_routes_through_interactions() {
    let h = Harness::new(&["A", "B", "C"]).await;
    let summary = h.relayed("m1", "A", "hello").await;
    let copy = summary.copies[1].message_id.clone();

    let outcome = h
        .relay
        .handle_event(&InboundEvent::InteractionInvoked(InteractionInvoked {
            custom_id: format!("delete:{copy}"),
            message_id: copy.clone(),
            channel_id: "C".into(),
            server_id: "server-C".into(),
            user_id: "owner".into(),
        }))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        EventOutcome::Interaction(Some(InteractionReply::Ephemeral(
            "Deleted 2/2 copies of the message.".into()
        )))
    );
}

#[tokio::test]
async fn replies_jump_to_the_local_copy() {
    let h = Harness::new(&["A", "B", "C"]).await;
    let first = h.relayed("m1", "A", "question?").await;
    let copy_in_b = first
        .copies
        .iter()
        .find(|c| c.channel_id == "B")
        .unwrap()
        .message_id
        .clone();
    let copy_in_c = first
        .copies
        .iter()
        .find(|c| c.channel_id == "C")
        .unwrap()
        .message_id
        .clone();

    let mut reply = h.message("m2", "B", "answer!");
    reply.referenced = Some(ReferencedMessage {
        message_id: copy_in_b,
        author_name: "user-A".into(),
        content: "question?".into(),
    });
    let outcome = h.relay.handle_message(&reply).await.unwrap();
    assert!(matches!(outcome, RelayOutcome::Relayed(ref s) if s.delivered == 2));

    let button_url = |channel: &str| {
        h.sink.payload_for(channel).components.unwrap()[0].components[0]
            .url
            .clone()
            .unwrap()
    };
    assert_eq!(
        button_url("C"),
        format!("https://discord.com/channels/server-C/C/{copy_in_c}")
    );
    assert_eq!(button_url("A"), "https://discord.com/channels/server-A/A/m1");

    let indexed = h.relay.index().get_original("m2").await.unwrap().unwrap();
    assert_eq!(indexed.referenced_message_id.as_deref(), Some("m1"));
}

#[tokio::test]
async fn reply_button_keeps_its_label_after_reaction_edits() {
    let h = Harness::new(&["A", "B", "C"]).await;
    let first = h.relayed("m1", "A", "question?").await;
    let copy_in_b = first
        .copies
        .iter()
        .find(|c| c.channel_id == "B")
        .unwrap()
        .message_id
        .clone();
    let mut reply = h.message("m2", "B", "answer!");
    reply.referenced = Some(ReferencedMessage {
        message_id: copy_in_b,
        author_name: "user-A".into(),
        content: "question?".into(),
    });
    h.relay.handle_message(&reply).await.unwrap();
    let rendered = h.sink.payload_for("C").components.unwrap()[0].components[0].clone();
    assert_eq!(rendered.label, "Reply to @user-A");

    h.relay
        .handle_event(&InboundEvent::ReactionAdded(ReactionAdded {
            message_id: "m2".into(),
            channel_id: "B".into(),
            server_id: "server-B".into(),
            user_id: "user-B".into(),
            emoji: "👍".into(),
        }))
        .await
        .unwrap();

    let edits = h.sink.edits();
    let (_, _, edit_c) = edits.iter().find(|(channel, _, _)| channel == "C").unwrap();
    let buttons = &edit_c.components.as_ref().unwrap()[0].components;
    assert_eq!(buttons[0].label, "👍 1");
    assert_eq!(buttons[1].label, rendered.label);
    assert_eq!(buttons[1].url, rendered.url);
}

#[tokio::test]
async fn sweep_expires_lapsed_infractions() {
    let h = Harness::new(&["A"]).await;
    h.store
        .issue(&infraction(InfractionTarget::Server("server-X".into()), Some(1)))
        .await
        .unwrap();
    h.store
        .issue(&infraction(InfractionTarget::User("user-Y".into()), None))
        .await
        .unwrap();

    assert_eq!(h.relay.sweep_infractions().await.unwrap(), 1);
    assert_eq!(h.relay.sweep_infractions().await.unwrap(), 0);
}

#[tokio::test]
async fn deleting_a_hub_clears_every_trace() {
    let h = Harness::new(&["A", "B"]).await;
    h.relayed("m1", "A", "hello").await;

    assert!(h.relay.delete_hub(HUB).await.unwrap());
    assert!(h.store.get_hub(HUB).await.unwrap().is_none());
    assert!(h.relay.registry().resolve("A").await.unwrap().is_none());
    assert!(h.relay.index().resolve("m1").await.unwrap().is_none());
    assert_eq!(h.post("m2", "A", "anyone?").await, RelayOutcome::NotConnected);
}

#[tokio::test]
async fn bots_are_ignored() {
    let h = Harness::new(&["A", "B"]).await;
    let mut msg = h.message("m1", "A", "beep");
    msg.author.bot = true;
    assert_eq!(
        h.relay.handle_message(&msg).await.unwrap(),
        RelayOutcome::IgnoredBot
    );
}
