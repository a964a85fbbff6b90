//! Watch the newest orders live
//!
//! Run with: cargo run --example watch_orders
//!
//! Environment:
//!   HTTP_API_ENDPOINT     REST base URL, e.g. https://api.example.com/dev
//!   WEB_SOCKET_ENDPOINT   push endpoint, e.g. wss://push.example.com/dev
//!   RUST_LOG              log filter (default: livesync_rs=info)
//!
//! Obtains a client token, subscribes to the order collection, and prints
//! the collection every time it changes. Ctrl-C to stop.

use livesync_rs::{ApiConfig, AuthToken, LiveQuery, Record, RestClient, SyncConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("livesync_rs=info".parse()?)
                .add_directive("watch_orders=info".parse()?),
        )
        .init();

    let token = AuthToken::default();
    let api = RestClient::new(ApiConfig::from_env()?, token.clone())?;
    api.create_client().await?;

    let query = LiveQuery::new(SyncConfig::from_env()?, api, token)?;
    let mut orders = query.subscribe();

    if let Some(snapshot) = orders.wait_until_loaded().await {
        if let Some(e) = &snapshot.error {
            eprintln!("Initial fetch failed: {}", e);
        }
        print_orders(snapshot.records());
    }

    loop {
        tokio::select! {
            changed = orders.changed() => match changed {
                Some(snapshot) => print_orders(snapshot.records()),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Stopping...");
                break;
            }
        }
    }

    let stats = query.stats();
    orders.unsubscribe();
    query.shutdown().await;

    if let Some(stats) = stats {
        println!("{:?}", stats);
    }
    Ok(())
}

fn print_orders(orders: &[Record]) {
    println!("=== {} orders ===", orders.len());
    for order in orders {
        println!(
            "{:<40} {:<10} {:>10} {}",
            order.id.as_str(),
            order.status.as_deref().unwrap_or("-"),
            order
                .total
                .map(|cents| format!("{}.{:02}", cents / 100, cents % 100))
                .unwrap_or_else(|| "-".into()),
            order.customer_name().unwrap_or_default(),
        );
    }
}
