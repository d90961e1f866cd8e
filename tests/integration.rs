use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tokengate::{
    Clock, Gate, HealthStatus, LimiterBuilder, LimiterConfig, LimiterError, ManualClock,
    RateLimiterEngine, RemoteAddrKey, SharedEngine,
};

fn manual(builder: LimiterBuilder) -> (SharedEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let engine = builder.clock(clock.clone()).build().unwrap();
    (Arc::new(engine), clock)
}

#[test]
fn test_concurrent_single_spend() {
    let (engine, _clock) = manual(LimiterBuilder::new(1).capacity(100).hours(1));
    let barrier = Arc::new(Barrier::new(32));
    let admitted = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let admitted = Arc::clone(&admitted);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..10 {
                    if engine.decide("hot-key").unwrap().allowed {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // 320 attempts against a frozen clock: exactly the capacity gets through.
    assert_eq!(admitted.load(Ordering::Relaxed), 100);
    let stats = engine.stats("hot-key");
    assert_eq!(stats.allowed, 100);
    assert_eq!(stats.denied, 220);
}

#[test]
fn test_capacity_bound_after_long_idle() {
    let (engine, clock) = manual(LimiterBuilder::new(10).capacity(10).burst(5).seconds(1));

    engine.decide("k").unwrap();
    clock.advance(Duration::from_secs(24 * 3600));
    assert_eq!(engine.available_tokens_at("k", clock.now()).unwrap(), 15.0);

    let mut admitted = 0;
    while engine.decide("k").unwrap().allowed {
        admitted += 1;
    }
    assert_eq!(admitted, 15);
}

#[test]
fn test_wait_time_matches_refill() {
    let (engine, clock) = manual(LimiterBuilder::new(2).capacity(1).seconds(1));

    assert!(engine.decide("k").unwrap().allowed);
    let denied = engine.decide("k").unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.wait_time, Duration::from_millis(500));
    assert_eq!(engine.wait_time("k").unwrap(), denied.wait_time);

    // Retrying before the hint elapses is still denied and costs nothing.
    clock.advance(Duration::from_millis(499));
    assert!(!engine.decide("k").unwrap().allowed);

    clock.advance(Duration::from_millis(1));
    assert!(engine.decide("k").unwrap().allowed);
}

#[test]
fn test_keys_do_not_interfere() {
    let (engine, _clock) = manual(LimiterBuilder::new(1).capacity(3).minutes(1));

    for _ in 0..3 {
        assert!(engine.decide("alice").unwrap().allowed);
    }
    assert!(!engine.decide("alice").unwrap().allowed);

    for _ in 0..3 {
        assert!(engine.decide("bob").unwrap().allowed);
    }
    assert_eq!(engine.stats("bob").denied, 0);

    let mut keys = engine.keys();
    keys.sort();
    assert_eq!(keys, vec!["alice", "bob"]);
}

#[test]
fn test_reset_is_idempotent() {
    let (engine, _clock) = manual(LimiterBuilder::new(1).capacity(2).minutes(1));
    engine.decide("k").unwrap();
    engine.decide("k").unwrap();

    engine.reset(Some("k"));
    engine.reset(Some("k"));
    engine.reset(Some("never-seen"));
    assert!(engine.keys().is_empty());

    engine.reset(None);
    engine.reset(None);
    assert_eq!(engine.store_stats().active_keys, 0);

    assert!(engine.decide("k").unwrap().allowed);
    assert!(engine.decide("k").unwrap().allowed);
    assert!(!engine.decide("k").unwrap().allowed);
}

#[test]
fn test_clock_going_backwards() {
    let (engine, clock) = manual(LimiterBuilder::new(1).capacity(2).seconds(10));
    clock.set(Duration::from_secs(100));

    engine.decide("k").unwrap();
    engine.decide("k").unwrap();

    clock.rewind(Duration::from_secs(50));
    let denied = engine.decide("k").unwrap();
    assert!(!denied.allowed, "no tokens accrue while time runs backwards");
    assert_eq!(denied.wait_time, Duration::from_secs(10));

    // Refill resumes from the latest instant seen, not the rewound one.
    clock.set(Duration::from_secs(105));
    assert!(!engine.decide("k").unwrap().allowed);
    clock.set(Duration::from_secs(110));
    assert!(engine.decide("k").unwrap().allowed);
}

#[test]
fn test_stats_window_slides() {
    let (engine, clock) = manual(
        LimiterBuilder::new(100)
            .capacity(100)
            .seconds(1)
            .stats_window(Duration::from_secs(60)),
    );

    engine.decide("k").unwrap();
    clock.advance(Duration::from_secs(30));
    engine.decide("k").unwrap();
    engine.decide("k").unwrap();

    assert_eq!(engine.stats("k").allowed, 3);

    clock.advance(Duration::from_secs(31));
    let stats = engine.stats("k");
    assert_eq!(stats.allowed, 2);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.lifetime_allowed, 3);
    assert_eq!(stats.since_last_allowed, Some(Duration::from_secs(31)));
    assert_eq!(stats.since_last_denied, None);

    clock.advance(Duration::from_secs(60));
    let stats = engine.stats("k");
    assert_eq!(stats.total, 0);
    assert_eq!(stats.success_rate(), 1.0);
    assert_eq!(stats.health_status(), HealthStatus::Healthy);
}

#[test]
fn test_stats_query_behind_latest_decision() {
    let (engine, clock) = manual(
        LimiterBuilder::new(100)
            .capacity(100)
            .seconds(1)
            .stats_window(Duration::from_secs(60)),
    );
    let t0 = clock.now();

    engine.decide_at("k", t0).unwrap();
    engine.decide_at("k", t0 + Duration::from_secs(100)).unwrap();

    assert_eq!(engine.stats_at("k", t0 + Duration::from_secs(30)).allowed, 1);
    assert_eq!(engine.stats_at("k", t0 + Duration::from_secs(100)).allowed, 1);
    assert_eq!(engine.stats_at("k", t0 + Duration::from_secs(100)).lifetime_allowed, 2);
}

#[test]
fn test_health_degrades_under_denials() {
    let (engine, _clock) = manual(LimiterBuilder::new(1).capacity(1).hours(1));

    for _ in 0..20 {
        engine.decide("abuser").unwrap();
    }
    let stats = engine.stats("abuser");
    assert_eq!(stats.allowed, 1);
    assert_eq!(stats.denied, 19);
    assert_eq!(stats.health_status(), HealthStatus::Critical);
    assert!(stats.health_status().is_unhealthy());
}

#[test]
fn test_config_updates_are_atomic_snapshots() {
    let (engine, _clock) = manual(LimiterBuilder::new(10).capacity(10).minutes(1));
    let running = Arc::new(AtomicBool::new(true));
    let barrier = Arc::new(Barrier::new(4));

    let rate_writer = {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for i in 0..2_000u32 {
                engine.update_rate(if i % 2 == 0 { 5 } else { 50 }).unwrap();
            }
            engine.update_rate(7).unwrap();
        })
    };

    let capacity_writer = {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for i in 0..2_000u64 {
                engine.update_capacity(if i % 2 == 0 { 5 } else { 50 }).unwrap();
            }
            engine.update_capacity(70).unwrap();
        })
    };

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let running = Arc::clone(&running);
            thread::spawn(move || {
                barrier.wait();
                while running.load(Ordering::Relaxed) {
                    let config = engine.config();
                    assert!(matches!(config.rate, 5 | 7 | 10 | 50), "rate {}", config.rate);
                    assert!(
                        matches!(config.capacity, 5 | 10 | 50 | 70),
                        "capacity {}",
                        config.capacity
                    );
                    assert_eq!(config.interval, Duration::from_secs(60));
                    engine.decide("reader").unwrap();
                }
            })
        })
        .collect();

    rate_writer.join().unwrap();
    capacity_writer.join().unwrap();
    running.store(false, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }

    // Neither writer's last update was lost to the other.
    let config = engine.config();
    assert_eq!(config.rate, 7);
    assert_eq!(config.capacity, 70);
}

#[test]
fn test_invalid_updates_leave_config_untouched() {
    let (engine, _clock) = manual(LimiterBuilder::new(10).capacity(10).minutes(1));
    let before = engine.config();

    assert_eq!(engine.update_rate(0), Err(LimiterError::InvalidRate));
    assert_eq!(engine.update_time(0, 0, 0), Err(LimiterError::InvalidInterval));
    assert_eq!(engine.update_capacity(0), Err(LimiterError::InvalidCapacity));

    assert_eq!(*engine.config(), *before);
}

#[test]
fn test_callbacks_observe_all_decisions_across_threads() {
    let (engine, _clock) = manual(LimiterBuilder::new(1).capacity(50).hours(1));
    let allowed = Arc::new(AtomicUsize::new(0));
    let denied = Arc::new(AtomicUsize::new(0));
    {
        let allowed = Arc::clone(&allowed);
        let denied = Arc::clone(&denied);
        engine.add_callback(move |ok, _key| {
            if ok {
                allowed.fetch_add(1, Ordering::Relaxed);
            } else {
                denied.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        });
    }
    engine.add_callback(|_, key| Err(format!("sink for {} unavailable", key).into()));
    engine.add_callback(|_, _| panic!("observer bug"));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..25 {
                    engine.decide("k").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(allowed.load(Ordering::Relaxed), 50);
    assert_eq!(denied.load(Ordering::Relaxed), 50);
}

#[test]
fn test_gate_per_ip() {
    let (engine, clock) = manual(LimiterBuilder::new(10).capacity(10).minutes(1));
    let gate: Gate<IpAddr> = Gate::new(Arc::clone(&engine), RemoteAddrKey);
    let first: IpAddr = "192.168.1.1".parse().unwrap();
    let second: IpAddr = "192.168.1.2".parse().unwrap();

    for _ in 0..10 {
        assert!(gate.check(&first).is_ok());
    }
    let rejection = gate.check(&first).unwrap_err();
    assert_eq!(rejection.status(), 429);
    assert_eq!(rejection.key, "192.168.1.1");
    assert_eq!(
        rejection.message(),
        "Rate limit exceeded. Try again in 6.00 seconds."
    );
    assert!(gate.check(&second).is_ok());

    clock.advance(Duration::from_secs(6));
    assert!(gate.check(&first).is_ok());
    assert_eq!(engine.stats("192.168.1.1").lifetime_denied, 1);
}

#[test]
fn test_system_clock_refill() {
    let engine = RateLimiterEngine::new(
        LimiterConfig::new(10, Duration::from_millis(100)).with_capacity(10),
    )
    .unwrap();

    for _ in 0..10 {
        assert!(engine.decide("k").unwrap().allowed);
    }
    assert!(!engine.decide("k").unwrap().allowed);

    thread::sleep(Duration::from_millis(120));
    assert!(engine.decide("k").unwrap().allowed);
}
