//! Prometheus metrics for fork choice.

use std::sync::LazyLock;

use prometheus::{
    Histogram, IntCounter, IntCounterVec, IntGauge, register_histogram, register_int_counter,
    register_int_counter_vec, register_int_gauge,
};

static LEAN_HEAD_SLOT: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!("lean_head_slot", "Latest slot of the lean chain").unwrap()
});

static LEAN_CURRENT_SLOT: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!("lean_current_slot", "Current slot of the lean chain").unwrap()
});

static LEAN_SAFE_TARGET_SLOT: LazyLock<IntGauge> =
    LazyLock::new(|| register_int_gauge!("lean_safe_target_slot", "Safe target slot").unwrap());

static LEAN_LATEST_JUSTIFIED_SLOT: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!("lean_latest_justified_slot", "Latest justified slot").unwrap()
});

static LEAN_LATEST_FINALIZED_SLOT: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!("lean_latest_finalized_slot", "Latest finalized slot").unwrap()
});

static LEAN_ATTESTATIONS_VALID_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "lean_attestations_valid_total",
        "Count of valid attestations",
        &["source"]
    )
    .unwrap()
});

static LEAN_ATTESTATIONS_INVALID_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "lean_attestations_invalid_total",
        "Count of attestations with invalid signatures",
        &["source"]
    )
    .unwrap()
});

static LEAN_ATTESTATIONS_REJECTED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "lean_attestations_rejected_total",
        "Count of attestations rejected during validation",
        &["source", "reason"]
    )
    .unwrap()
});

static LEAN_FORK_CHOICE_REORGS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "lean_fork_choice_reorgs_total",
        "Count of fork choice reorganizations"
    )
    .unwrap()
});

static LEAN_FORK_CHOICE_BLOCK_PROCESSING_TIME_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "lean_fork_choice_block_processing_time_seconds",
        "Duration to process a block",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 1.0]
    )
    .unwrap()
});

static LEAN_ATTESTATION_VALIDATION_TIME_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "lean_attestation_validation_time_seconds",
        "Duration to validate an attestation",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 1.0]
    )
    .unwrap()
});

pub fn update_head_slot(slot: u64) {
    LEAN_HEAD_SLOT.set(slot.try_into().unwrap_or(i64::MAX));
}

pub fn update_current_slot(slot: u64) {
    LEAN_CURRENT_SLOT.set(slot.try_into().unwrap_or(i64::MAX));
}

pub fn update_safe_target_slot(slot: u64) {
    LEAN_SAFE_TARGET_SLOT.set(slot.try_into().unwrap_or(i64::MAX));
}

pub fn update_latest_justified_slot(slot: u64) {
    LEAN_LATEST_JUSTIFIED_SLOT.set(slot.try_into().unwrap_or(i64::MAX));
}

pub fn update_latest_finalized_slot(slot: u64) {
    LEAN_LATEST_FINALIZED_SLOT.set(slot.try_into().unwrap_or(i64::MAX));
}

/// Increment the valid attestations counter.
pub fn inc_attestations_valid(source: &str) {
    LEAN_ATTESTATIONS_VALID_TOTAL
        .with_label_values(&[source])
        .inc();
}

/// Increment the invalid-signature attestations counter.
pub fn inc_attestations_invalid(source: &str) {
    LEAN_ATTESTATIONS_INVALID_TOTAL
        .with_label_values(&[source])
        .inc();
}

/// Increment the rejected attestations counter with a reason tag.
pub fn inc_attestations_rejected(source: &str, reason: &str) {
    LEAN_ATTESTATIONS_REJECTED_TOTAL
        .with_label_values(&[source, reason])
        .inc();
}

/// Increment the fork choice reorgs counter.
pub fn inc_fork_choice_reorgs() {
    LEAN_FORK_CHOICE_REORGS_TOTAL.inc();
}

/// Record block processing time in seconds.
pub fn observe_fork_choice_block_processing_time(duration_secs: f64) {
    LEAN_FORK_CHOICE_BLOCK_PROCESSING_TIME_SECONDS.observe(duration_secs);
}

/// Record attestation validation time in seconds.
pub fn observe_attestation_validation_time(duration_secs: f64) {
    LEAN_ATTESTATION_VALIDATION_TIME_SECONDS.observe(duration_secs);
}
