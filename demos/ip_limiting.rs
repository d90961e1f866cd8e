use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokengate::{Gate, LimiterBuilder, RemoteAddrKey, Result};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let engine = Arc::new(LimiterBuilder::new(10).capacity(10).seconds(1).build()?);
    let gate: Gate<Option<SocketAddr>> = Gate::new(Arc::clone(&engine), RemoteAddrKey);
    let handler = gate.wrap(|peer: &Option<SocketAddr>| match peer {
        Some(addr) => format!("200 OK for {}", addr),
        None => "200 OK for anonymous".to_owned(),
    });

    // Simulate requests from different IPs, plus one with no peer address
    let peers = vec![
        Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), 40001)),
        Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)), 40002)),
        Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 3)), 40003)),
        None,
    ];

    for peer in &peers {
        for i in 1..=12 {
            match handler(peer) {
                Ok(body) => println!("Request {} - {}", i, body),
                Err(rejection) => println!(
                    "Request {} - {} BLOCKED ({}): {}",
                    i,
                    rejection.key,
                    rejection.status(),
                    rejection
                ),
            }
        }
        println!();
    }

    for key in ["192.168.1.1", "default"] {
        println!("{} -> {}", key, engine.stats(key).summary());
    }
    println!("{}", engine.store_stats().summary());
    Ok(())
}
