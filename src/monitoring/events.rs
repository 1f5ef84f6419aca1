use std::time::Duration;

use metrics::{counter, histogram};
use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};

use crate::engine::TransactionType;

use super::metrics::prometheus_enabled;

pub fn swap_built(
    user: &Pubkey,
    tx_type: TransactionType,
    attempt: u32,
    fee_amount: u64,
    slippage_bps: u16,
    elapsed: Duration,
) {
    let elapsed_ms = elapsed.as_secs_f64() * 1_000.0;
    info!(
        target: "monitoring::swap",
        event = "built",
        user = %user,
        tx_type = tx_type.as_str(),
        attempt,
        fee_amount,
        slippage_bps,
        elapsed_ms = format_args!("{elapsed_ms:.3}"),
        "swap 交易构建完成"
    );

    if prometheus_enabled() {
        counter!(
            "sponsor_swap_built_total",
            "tx_type" => tx_type.as_str(),
            "attempt" => attempt.to_string()
        )
        .increment(1);
        histogram!(
            "sponsor_swap_build_latency_ms",
            "tx_type" => tx_type.as_str()
        )
        .record(elapsed_ms);
    }
}

pub fn swap_build_failed(user: &Pubkey, attempt: u32, reason: &str, will_retry: bool) {
    warn!(
        target: "monitoring::swap",
        event = "build_failed",
        user = %user,
        attempt,
        will_retry,
        reason,
        "swap 交易构建失败"
    );

    if prometheus_enabled() {
        counter!(
            "sponsor_swap_build_failed_total",
            "retry" => if will_retry { "yes" } else { "no" }
        )
        .increment(1);
    }
}

pub fn transfer_built(user: &Pubkey, native: bool, amount: u64, fee_amount: u64) {
    info!(
        target: "monitoring::transfer",
        event = "built",
        user = %user,
        native,
        amount,
        fee_amount,
        "转账交易构建完成"
    );

    if prometheus_enabled() {
        counter!(
            "sponsor_transfer_built_total",
            "asset" => if native { "native" } else { "sponsored" }
        )
        .increment(1);
    }
}

pub fn submission_outcome(tx_type: TransactionType, outcome: &'static str, attempt: u32) {
    info!(
        target: "monitoring::submission",
        event = "outcome",
        tx_type = tx_type.as_str(),
        outcome,
        attempt,
        "交易提交结束"
    );

    if prometheus_enabled() {
        counter!(
            "sponsor_submission_total",
            "tx_type" => tx_type.as_str(),
            "outcome" => outcome
        )
        .increment(1);
    }
}

pub fn registry_evicted(reason: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    info!(
        target: "monitoring::registry",
        event = "evicted",
        reason,
        count,
        "registry 条目已淘汰"
    );

    if prometheus_enabled() {
        counter!("sponsor_registry_evicted_total", "reason" => reason).increment(count as u64);
    }
}

pub fn registry_size(size: usize) {
    if prometheus_enabled() {
        metrics::gauge!("sponsor_registry_entries").set(size as f64);
    }
}

pub fn stream_lifecycle(user_id: &str, event: &'static str, active_streams: usize) {
    info!(
        target: "monitoring::stream",
        event,
        user_id,
        active_streams,
        "swap stream 状态变更"
    );

    if prometheus_enabled() {
        counter!("sponsor_stream_events_total", "event" => event).increment(1);
        metrics::gauge!("sponsor_stream_active").set(active_streams as f64);
    }
}
