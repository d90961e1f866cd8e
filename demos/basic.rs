//! Basic usage example for the tokengate crate.
//!
//! Set `RUST_LOG=tokengate=debug` to watch the engine's own events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokengate::{LimiterBuilder, Result};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("=== Basic Admission Engine Example ===\n");

    simple_example()?;
    separator();
    burst_example()?;
    separator();
    refill_example()?;
    separator();
    stats_example()?;
    separator();
    reconfigure_example()?;

    Ok(())
}

fn separator() {
    println!("\n{}\n", "=".repeat(50));
}

fn simple_example() -> Result<()> {
    println!("1. Simple Limiter:");

    let engine = LimiterBuilder::new(10).capacity(10).minutes(1).build()?;
    println!("   10 requests per minute per key, capacity 10");

    let mut successful = 0;
    let mut failed = 0;
    for i in 1..=12 {
        let decision = engine.decide("client-a")?;
        if decision.allowed {
            successful += 1;
            println!("   Request {} - ✅ Allowed", i);
        } else {
            failed += 1;
            println!(
                "   Request {} - ❌ Limited, retry in {:.2}s",
                i,
                decision.retry_after_secs()
            );
        }
    }

    println!("   Results: {} successful, {} limited", successful, failed);
    println!("   Another key is unaffected: {}", engine.decide("client-b")?.allowed);
    Ok(())
}

fn burst_example() -> Result<()> {
    println!("2. Burst Headroom:");

    let engine = LimiterBuilder::new(100)
        .capacity(10)
        .burst(10)
        .seconds(1)
        .build()?;
    println!("   capacity 10 + burst 10, refilling 100/second");

    let mut first = 0;
    while engine.decide("bursty")?.allowed {
        first += 1;
    }
    println!("   Fresh key admitted {} immediately", first);

    thread::sleep(Duration::from_millis(300));
    let mut second = 0;
    while engine.decide("bursty")?.allowed {
        second += 1;
    }
    println!("   After idling 300ms, admitted {} (burst filled)", second);
    Ok(())
}

fn refill_example() -> Result<()> {
    println!("3. Refill and Wait Time:");

    let engine = LimiterBuilder::new(5).capacity(5).seconds(1).build()?;
    for _ in 0..5 {
        engine.decide("worker")?;
    }

    let wait = engine.wait_time("worker")?;
    println!("   Drained; next token in {:?}", wait);
    println!("   Immediate retry allowed? {}", engine.decide("worker")?.allowed);

    thread::sleep(wait);
    println!("   After waiting, allowed? {}", engine.decide("worker")?.allowed);

    engine.reset(Some("worker"));
    println!("   After reset, allowed? {}", engine.decide("worker")?.allowed);
    Ok(())
}

fn stats_example() -> Result<()> {
    println!("4. Statistics and Callbacks:");

    let engine = LimiterBuilder::new(20)
        .capacity(20)
        .minutes(1)
        .stats_window(Duration::from_secs(30))
        .build()?;

    let denials = Arc::new(AtomicU64::new(0));
    {
        let denials = Arc::clone(&denials);
        engine.add_callback(move |allowed, _key| {
            if !allowed {
                denials.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        });
    }

    for _ in 0..25 {
        engine.decide("api-key-42")?;
    }

    let stats = engine.stats("api-key-42");
    println!("{}", stats);
    println!("   Denials seen by callback: {}", denials.load(Ordering::Relaxed));
    Ok(())
}

fn reconfigure_example() -> Result<()> {
    println!("5. Live Reconfiguration:");

    let engine = LimiterBuilder::new(1).capacity(1).minutes(1).build()?;
    engine.decide("k")?;
    println!("   Wait at 1/minute: {:?}", engine.wait_time("k")?);

    engine.update_rate(60)?;
    println!("   Wait at 60/minute: {:?}", engine.wait_time("k")?);

    engine.update_time(0, 0, 1)?;
    println!("   Wait at 60/hour: {:?}", engine.wait_time("k")?);

    match engine.update_capacity(0) {
        Ok(()) => println!("   Unexpected: capacity 0 accepted"),
        Err(e) => println!("   Rejected update: {}", e),
    }
    println!("   Config now: {:?}", engine.config());
    Ok(())
}
