//! Metric name and label definitions.
//!
//! Every metric the relay records is named here so dashboards and code agree.

/// Inbound message handling
pub mod relay {
    /// Messages that passed moderation and were fanned out
    pub const MESSAGES_RELAYED_TOTAL: &str = "hublink_relay_messages_relayed_total";
    /// Messages dropped before fan-out, labelled by gate
    pub const VETOES_TOTAL: &str = "hublink_relay_vetoes_total";
    /// Messages dropped because the hub is locked
    pub const LOCKED_TOTAL: &str = "hublink_relay_locked_total";
    /// Messages from channels that are not part of any hub
    pub const UNCONNECTED_TOTAL: &str = "hublink_relay_unconnected_total";
}

/// Moderation side effects
pub mod moderation {
    /// Anti-spam strikes issued
    pub const STRIKES_TOTAL: &str = "hublink_moderation_strikes_total";
    /// Blacklists issued automatically (anti-spam or block-word rule)
    pub const AUTO_BLACKLISTS_TOTAL: &str = "hublink_moderation_auto_blacklists_total";
    /// Side effects that failed and were only logged
    pub const SIDE_EFFECT_FAILURES_TOTAL: &str = "hublink_moderation_side_effect_failures_total";
    /// Infractions moved to expired by the sweep
    pub const INFRACTIONS_EXPIRED_TOTAL: &str = "hublink_moderation_infractions_expired_total";
    /// Copies removed through cross-copy delete
    pub const COPIES_DELETED_TOTAL: &str = "hublink_moderation_copies_deleted_total";
}

/// Webhook delivery
pub mod delivery {
    /// Delivery attempts, labelled by outcome
    pub const ATTEMPTS_TOTAL: &str = "hublink_delivery_attempts_total";
    /// Wall time of a whole fan-out in seconds
    pub const FANOUT_DURATION_SECONDS: &str = "hublink_delivery_fanout_duration_seconds";
    /// Connections removed after a permanent webhook failure
    pub const CONNECTIONS_DISABLED_TOTAL: &str = "hublink_delivery_connections_disabled_total";
}

/// Connection directory
pub mod registry {
    /// Lookups answered from the cache
    pub const CACHE_HITS_TOTAL: &str = "hublink_registry_cache_hits_total";
    /// Lookups that fell back to the store
    pub const CACHE_MISSES_TOTAL: &str = "hublink_registry_cache_misses_total";
    /// Cache operations that failed and were served from the store
    pub const CACHE_DEGRADED_TOTAL: &str = "hublink_registry_cache_degraded_total";
}

/// Message index
pub mod index {
    /// Lookups for a message that expired or was never relayed
    pub const MISSES_TOTAL: &str = "hublink_index_misses_total";
    /// Relayed messages recorded
    pub const RECORDS_TOTAL: &str = "hublink_index_records_total";
}

/// Reaction sync
pub mod reactions {
    /// Reaction toggles applied
    pub const TOGGLES_TOTAL: &str = "hublink_reactions_toggles_total";
    /// Reaction events rejected (disabled, blacklisted, too many kinds)
    pub const REJECTED_TOTAL: &str = "hublink_reactions_rejected_total";
}

/// Common label keys
pub mod labels {
    pub const GATE: &str = "gate";
    pub const OUTCOME: &str = "outcome";
    pub const REASON: &str = "reason";
    pub const MODE: &str = "mode";
    pub const EFFECT: &str = "effect";
}

/// Standard histogram buckets
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Fan-out duration buckets (in seconds), 5ms to 30s
    pub static FANOUT_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]
    });
}
