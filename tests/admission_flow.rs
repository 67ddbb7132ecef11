//! End-to-end admission flows through the public facade.
//!
//! Every test drives a `GatewayThrottle` with a mock clock, placing requests
//! at exact Unix seconds so the sliding-window arithmetic can be asserted to
//! the second.

use gateway_throttle::infrastructure::mocks::MockClock;
use gateway_throttle::{CheckRequest, GatewayThrottle, Tier, TierRegistry, TierRule};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

const START: u64 = 1_700_000_000;

fn test_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7))
}

fn spread_ip(i: u32) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, (i / 256) as u8, (i % 256) as u8))
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

#[tokio::test]
async fn test_global_budget_is_shared_across_callers() {
    // Global 10000/3600 with every other tier opened wide, so the shared
    // budget is the only one that can deny.
    let registry = TierRegistry::default()
        .with_global(TierRule::new(10_000, 3_600))
        .with_user(TierRule::new(1_000_000, 3_600))
        .with_ip(TierRule::new(1_000_000, 3_600));
    let (engine, _clock) = engine_at(START, registry);

    for i in 0..9_999u32 {
        let identifier = format!("tenant-{i}");
        let decision = engine.check(&CheckRequest::new(&identifier, spread_ip(i))).await;
        assert!(decision.is_allowed(), "request {i} should be admitted");
    }

    // The 10000th admission reports a single slot left before it commits.
    let decision = engine
        .check(&CheckRequest::new("tenant-9999", spread_ip(9_999)))
        .await;
    assert!(decision.is_allowed());
    assert_eq!(decision.remaining(), Some(1));

    let decision = engine.check(&CheckRequest::new("tenant-0", spread_ip(0))).await;
    assert!(decision.is_denied());
    assert_eq!(decision.failing_tier(), Some(Tier::Global));
    assert_eq!(decision.message(), Some("Global rate limit exceeded"));
    // With a frozen clock the oldest entry leaves the window a full hour out.
    assert_eq!(decision.retry_after_seconds(), Some(3_600));
}

#[tokio::test]
async fn test_user_burst_denies_fifty_first_within_minute() {
    let (engine, clock) = engine_at(START, TierRegistry::default());
    let ip = test_ip();

    // Fifty requests across seconds 0-49, all inside one burst window.
    for i in 0..50 {
        let decision = engine.check(&CheckRequest::new("merchant-7", ip)).await;
        assert!(decision.is_allowed(), "request {i} should be admitted");
        clock.advance(1);
    }

    // Second 59: the hourly user budget (1000) has plenty of room, the
    // burst budget (50/60) has none.
    clock.set(START + 59);
    let decision = engine.check(&CheckRequest::new("merchant-7", ip)).await;
    assert!(decision.is_denied());
    assert_eq!(decision.failing_tier(), Some(Tier::User));
    assert_eq!(decision.message(), Some("User burst limit exceeded"));
    assert_eq!(decision.retry_after_seconds(), Some(60));

    // Once the burst window clears, the same caller flows again.
    clock.set(START + 120);
    assert!(engine.check(&CheckRequest::new("merchant-7", ip)).await.is_allowed());
}

#[tokio::test]
async fn test_webhooks_endpoint_budget_denies_the_1001st_call() {
    // Outer tiers opened wide so the default webhooks rule (1000/60) is the
    // binding one.
    let registry = TierRegistry::default()
        .with_global(TierRule::new(1_000_000, 3_600))
        .with_user(TierRule::new(1_000_000, 3_600))
        .with_ip(TierRule::new(1_000_000, 3_600));
    let (engine, clock) = engine_at(START, registry);
    let ip = test_ip();

    for i in 0..1_000 {
        let request = CheckRequest::new("hook-consumer", ip).with_endpoint("webhooks");
        assert!(engine.check(&request).await.is_allowed(), "request {i} should be admitted");
    }

    clock.advance(30);
    let request = CheckRequest::new("hook-consumer", ip).with_endpoint("webhooks");
    let decision = engine.check(&request).await;
    assert!(decision.is_denied());
    assert_eq!(decision.failing_tier(), Some(Tier::Endpoint));
    assert_eq!(decision.message(), Some("Endpoint rate limit exceeded for webhooks"));
    // All 1000 entries sit at second 0, so the window clears 30s from now.
    assert_eq!(decision.retry_after_seconds(), Some(30));

    // One second past the minute window, traffic flows again.
    clock.advance(31);
    let request = CheckRequest::new("hook-consumer", ip).with_endpoint("webhooks");
    assert!(engine.check(&request).await.is_allowed());
}

#[tokio::test]
async fn test_ip_budget_denies_long_before_the_suspicious_threshold() {
    // Default ip tier: 2000/3600 with a flagging threshold of 5000. Global
    // and user opened wide so the address budget is the binding one.
    let registry = TierRegistry::default()
        .with_global(TierRule::new(1_000_000, 3_600))
        .with_user(TierRule::new(1_000_000, 3_600));
    let (engine, _clock) = engine_at(START, registry);
    let ip = test_ip();

    for i in 0..2_000u32 {
        let identifier = format!("account-{i}");
        let decision = engine.check(&CheckRequest::new(&identifier, ip)).await;
        assert!(decision.is_allowed(), "request {i} should be admitted");
    }

    let decision = engine.check(&CheckRequest::new("account-0", ip)).await;
    assert!(decision.is_denied());
    assert_eq!(decision.failing_tier(), Some(Tier::Ip));
    assert_eq!(decision.message(), Some("IP rate limit exceeded"));

    // 2001 attempts stay far below the 5000 flagging threshold: the address
    // was throttled, never flagged.
    assert!(engine.suspicious_record(ip).await.is_none());
    assert_eq!(engine.metrics().ips_flagged(), 0);
}

#[tokio::test]
async fn test_window_entry_ages_out_after_its_window() {
    let registry = TierRegistry::default().with_user(TierRule::new(1, 60));
    let (engine, clock) = engine_at(START, registry);
    let ip = test_ip();

    assert!(engine.check(&CheckRequest::new("merchant-7", ip)).await.is_allowed());

    // 59 seconds later the entry still counts and the hint says one second.
    clock.advance(59);
    let decision = engine.check(&CheckRequest::new("merchant-7", ip)).await;
    assert!(decision.is_denied());
    assert_eq!(decision.retry_after_seconds(), Some(1));

    // Waiting out the hint admits the caller: the entry has aged out.
    clock.advance(1);
    assert!(engine.check(&CheckRequest::new("merchant-7", ip)).await.is_allowed());
}

#[tokio::test]
async fn test_retry_hint_counts_down_while_denied() {
    let registry = TierRegistry::default().with_user(TierRule::new(1, 100));
    let (engine, clock) = engine_at(START, registry);
    let ip = test_ip();

    assert!(engine.check(&CheckRequest::new("merchant-7", ip)).await.is_allowed());

    // Denied probes never extend the window, so the hint slides toward 1.
    let mut hints = Vec::new();
    for offset in [1u64, 25, 60, 99] {
        clock.set(START + offset);
        let decision = engine.check(&CheckRequest::new("merchant-7", ip)).await;
        assert!(decision.is_denied());
        hints.push(decision.retry_after_seconds().unwrap());
    }
    assert_eq!(hints, vec![99, 75, 40, 1]);

    // Waiting out the final hint admits the caller.
    clock.advance(1);
    assert!(engine.check(&CheckRequest::new("merchant-7", ip)).await.is_allowed());
}

#[tokio::test]
async fn test_unconfigured_marketplace_is_unlimited() {
    // 1200 calls exceed every configured marketplace budget; a name with no
    // rule never denies.
    let registry = TierRegistry::default()
        .with_global(TierRule::new(1_000_000, 3_600))
        .with_user(TierRule::new(1_000_000, 3_600))
        .with_ip(TierRule::new(1_000_000, 3_600));
    let (engine, _clock) = engine_at(START, registry);
    let ip = test_ip();

    for i in 0..1_200 {
        let request = CheckRequest::new("merchant-7", ip).with_marketplace("etsy");
        assert!(engine.check(&request).await.is_allowed(), "request {i} should be admitted");
    }

    // No sub-report either: the tier does not exist for this name.
    let report = engine.get_status("merchant-7", ip, Some("etsy")).await;
    assert!(report.marketplace.is_none());
}

#[tokio::test]
async fn test_marketplace_budget_denies_with_named_message() {
    let registry = TierRegistry::default().with_marketplace("amazon", TierRule::new(2, 3_600));
    let (engine, _clock) = engine_at(START, registry);
    let ip = test_ip();

    for _ in 0..2 {
        let request = CheckRequest::new("merchant-7", ip).with_marketplace("amazon");
        assert!(engine.check(&request).await.is_allowed());
    }

    let request = CheckRequest::new("merchant-7", ip).with_marketplace("amazon");
    let decision = engine.check(&request).await;
    assert!(decision.is_denied());
    assert_eq!(decision.failing_tier(), Some(Tier::Marketplace));
    assert_eq!(decision.message(), Some("Marketplace rate limit exceeded for amazon"));
}

#[tokio::test]
async fn test_denied_requests_consume_no_quota() {
    let registry = TierRegistry::default().with_user(TierRule::new(2, 3_600));
    let (engine, _clock) = engine_at(START, registry);
    let ip = test_ip();

    assert!(engine.check(&CheckRequest::new("merchant-7", ip)).await.is_allowed());
    assert!(engine.check(&CheckRequest::new("merchant-7", ip)).await.is_allowed());

    let before = engine.get_status("merchant-7", ip, None).await;
    assert_eq!(before.user.remaining, 0);

    // Three denied probes leave every window untouched.
    for _ in 0..3 {
        assert!(engine.check(&CheckRequest::new("merchant-7", ip)).await.is_denied());
    }

    let after = engine.get_status("merchant-7", ip, None).await;
    assert_eq!(after.user.remaining, 0);
    assert_eq!(after.global.remaining, before.global.remaining);
    assert_eq!(after.ip.remaining, before.ip.remaining);
    assert_eq!(engine.metrics().requests_denied(), 3);
}

#[tokio::test]
async fn test_reset_restores_the_full_user_budget() {
    let registry = TierRegistry::default().with_user(TierRule::new(3, 3_600));
    let (engine, _clock) = engine_at(START, registry);
    let ip = test_ip();

    for _ in 0..3 {
        assert!(engine.check(&CheckRequest::new("merchant-7", ip)).await.is_allowed());
    }
    assert!(engine.check(&CheckRequest::new("merchant-7", ip)).await.is_denied());

    engine.reset_rate_limit("merchant-7").await.unwrap();

    // Only the user windows were cleared; shared tiers keep their entries.
    let report = engine.get_status("merchant-7", ip, None).await;
    assert_eq!(report.user.remaining, 3);
    assert_eq!(report.global.remaining, 10_000 - 3);
    assert!(engine.check(&CheckRequest::new("merchant-7", ip)).await.is_allowed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_enforce_the_exact_budget() {
    let registry = TierRegistry::default()
        .with_global(TierRule::new(1_000_000, 3_600))
        .with_user(TierRule::new(200, 3_600))
        .with_ip(TierRule::new(1_000_000, 3_600));
    let (engine, _clock) = engine_at(START, registry);
    let ip = test_ip();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let mut admitted = 0u32;
            for _ in 0..50 {
                if engine.check(&CheckRequest::new("merchant-7", ip)).await.is_allowed() {
                    admitted += 1;
                }
            }
            admitted
        }));
    }

    let mut total = 0u32;
    for handle in handles {
        total += handle.await.unwrap();
    }

    // Per-key locking keeps the budget exact even under contention.
    assert_eq!(total, 200);
    assert_eq!(engine.metrics().requests_allowed(), 200);
    assert_eq!(engine.metrics().requests_denied(), 200);
}
