//! Abuse detection through the facade: attempt counting, flagging, blocking.
//!
//! Attempt recording runs on spawned tasks, decoupled from the admission
//! path, so these tests poll for ledger effects instead of asserting right
//! after a check returns.

use gateway_throttle::infrastructure::mocks::MockClock;
use gateway_throttle::{
    CheckRequest, GatewayThrottle, SuspiciousIpRecord, Tier, TierRegistry, TierRule,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

const START: u64 = 1_700_000_000;

fn test_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9))
}

fn engine_at(start_unix: u64, registry: TierRegistry) -> (GatewayThrottle, Arc<MockClock>) {
    let clock = Arc::new(MockClock::new(start_unix));
    let engine = GatewayThrottle::builder()
        .with_registry(registry)
        .with_clock(clock.clone())
        .build()
        .expect("engine configuration should be valid");
    (engine, clock)
}

async fn wait_for_flag(engine: &GatewayThrottle, ip: IpAddr) -> SuspiciousIpRecord {
    for _ in 0..100 {
        if let Some(record) = engine.suspicious_record(ip).await {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("suspicious record never materialized");
}

/// Let spawned attempt-recording tasks run to completion.
async fn drain_attempts() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_denied_attempts_count_toward_flagging() {
    // A two-request ip budget with a flagging threshold of five: two
    // admitted and three denied checks together cross the threshold.
    let registry = TierRegistry::default()
        .with_ip(TierRule::new(2, 3_600))
        .with_suspicious_threshold(5);
    let (engine, _clock) = engine_at(START, registry);
    let ip = test_ip();

    for i in 0..5 {
        let identifier = format!("account-{i}");
        engine.check(&CheckRequest::new(&identifier, ip)).await;
    }

    let record = wait_for_flag(&engine, ip).await;
    assert_eq!(record.ip, ip);
    assert_eq!(record.request_count, 5);
    assert_eq!(record.first_detected_at, START);
    assert!(!record.is_blocked);
    assert_eq!(record.block_reason, None);
    assert_eq!(engine.metrics().ips_flagged(), 1);
}

#[tokio::test]
async fn test_flagging_alone_never_blocks() {
    let registry = TierRegistry::default().with_suspicious_threshold(3);
    let (engine, _clock) = engine_at(START, registry);
    let ip = test_ip();

    for i in 0..3 {
        let identifier = format!("account-{i}");
        assert!(engine.check(&CheckRequest::new(&identifier, ip)).await.is_allowed());
    }

    let record = wait_for_flag(&engine, ip).await;
    assert!(!record.is_blocked);
    assert!(!engine.is_ip_blocked(ip).await);

    // Traffic keeps flowing for a flagged-but-unblocked address.
    assert!(engine.check(&CheckRequest::new("account-0", ip)).await.is_allowed());
}

#[tokio::test]
async fn test_later_crossings_update_the_record_in_place() {
    let registry = TierRegistry::default().with_suspicious_threshold(2);
    let (engine, clock) = engine_at(START, registry);
    let ip = test_ip();

    engine.check(&CheckRequest::new("account-0", ip)).await;
    engine.check(&CheckRequest::new("account-1", ip)).await;
    let first = wait_for_flag(&engine, ip).await;
    assert_eq!(first.request_count, 2);

    clock.advance(120);
    engine.check(&CheckRequest::new("account-2", ip)).await;

    let mut updated = first.clone();
    for _ in 0..100 {
        updated = engine.suspicious_record(ip).await.unwrap();
        if updated.last_detected_at > first.last_detected_at {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(updated.request_count, 3);
    assert_eq!(updated.first_detected_at, START);
    assert_eq!(updated.last_detected_at, START + 120);
    // Still one flagged address, not two.
    assert_eq!(engine.metrics().ips_flagged(), 1);
}

#[tokio::test]
async fn test_old_attempts_age_out_of_the_abuse_window() {
    // Attempt counting follows the ip-tier window, 60 seconds here: two
    // early attempts age out before the third, so the threshold is never
    // crossed.
    let registry = TierRegistry::default()
        .with_ip(TierRule::new(1_000, 60))
        .with_suspicious_threshold(3);
    let (engine, clock) = engine_at(START, registry);
    let ip = test_ip();

    engine.check(&CheckRequest::new("account-0", ip)).await;
    engine.check(&CheckRequest::new("account-1", ip)).await;
    drain_attempts().await;

    clock.advance(61);
    engine.check(&CheckRequest::new("account-2", ip)).await;
    drain_attempts().await;

    assert!(engine.suspicious_record(ip).await.is_none());
}

#[tokio::test]
async fn test_blocked_address_is_refused_on_arrival() {
    let (engine, _clock) = engine_at(START, TierRegistry::default());
    let ip = test_ip();

    engine.block_ip(ip, "credential stuffing").await.unwrap();

    let decision = engine.check(&CheckRequest::new("merchant-7", ip)).await;
    assert!(decision.is_denied());
    assert_eq!(decision.failing_tier(), Some(Tier::Ip));
    assert_eq!(decision.message(), Some("IP address blocked"));
    assert_eq!(decision.retry_after_seconds(), Some(3_600));

    // The refusal never touched rate-limit state.
    let report = engine.get_status("merchant-7", ip, None).await;
    assert_eq!(report.user.remaining, report.user.limit);

    let record = engine.suspicious_record(ip).await.unwrap();
    assert!(record.is_blocked);
    assert_eq!(record.block_reason.as_deref(), Some("credential stuffing"));

    engine.unblock_ip(ip).await.unwrap();
    assert!(!engine.is_ip_blocked(ip).await);
    assert!(engine.check(&CheckRequest::new("merchant-7", ip)).await.is_allowed());
}

#[tokio::test]
async fn test_refused_traffic_still_feeds_the_abuse_ledger() {
    let registry = TierRegistry::default().with_suspicious_threshold(3);
    let (engine, _clock) = engine_at(START, registry);
    let ip = test_ip();

    engine.block_ip(ip, "manual review").await.unwrap();
    for _ in 0..3 {
        assert!(engine.check(&CheckRequest::new("account-0", ip)).await.is_denied());
    }

    // The blocked attempts count toward the threshold; the crossing
    // increments the block-created record.
    let mut record = engine.suspicious_record(ip).await.unwrap();
    for _ in 0..100 {
        if record.request_count >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        record = engine.suspicious_record(ip).await.unwrap();
    }
    assert_eq!(record.request_count, 1);
    assert!(record.is_blocked);
}
