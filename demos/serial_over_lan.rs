//! Example: Several controllers behind one serial gateway
//!
//! Run with: cargo run --example serial_over_lan -- 10.0.0.9 1 2 3
//!
//! This example demonstrates:
//! - Sharing one gateway socket between clients with a `SharedChannelRegistry`
//! - Polling several units concurrently over the shared line
//! - Releasing the socket when the last client closes

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use unitronics_pcom::{
    Client, ClientConfig, ErrorCategory, OperandKind, ReadOperandsRequest, SharedChannelRegistry,
};

#[tokio::main]
async fn main() -> unitronics_pcom::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let gateway = args.next().unwrap_or_else(|| "10.0.0.9".to_string());
    let mut units: Vec<u8> = args.filter_map(|arg| arg.parse().ok()).collect();
    if units.is_empty() {
        units = vec![1, 2];
    }

    let registry = Arc::new(SharedChannelRegistry::default());
    let cancel = CancellationToken::new();

    // =========================================================================
    // Connect every unit through the same gateway
    // =========================================================================

    let mut clients = Vec::new();
    for unit_id in units {
        let config = ClientConfig::new(gateway.clone(), unit_id).with_timeout(Duration::from_secs(1));
        match Client::connect_shared(config, Arc::clone(&registry), &cancel).await {
            Ok(client) => {
                println!("unit {unit_id}: {} {}", client.model(), client.version());
                clients.push(Arc::new(client));
            }
            Err(e) if e.category() == ErrorCategory::Throttled => {
                println!("unit {unit_id}: gateway cooling down ({e})");
            }
            Err(e) => println!("unit {unit_id}: {e}"),
        }
    }
    println!("{} shared channel(s) open\n", registry.len());

    // =========================================================================
    // Poll concurrently; exchanges are serialized on the line
    // =========================================================================

    let mut request = ReadOperandsRequest::new();
    request.add_range(OperandKind::MI, 0, 4)?;
    let request = Arc::new(request);

    let mut tasks = Vec::new();
    for client in &clients {
        let client = Arc::clone(client);
        let request = Arc::clone(&request);
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            let result = client.read_operands(&request, &cancel).await;
            (client.config().unit_id, result)
        }));
    }

    for task in tasks {
        let Ok((unit_id, result)) = task.await else {
            continue;
        };
        match result {
            Ok(result) => {
                let values: Vec<String> = result.values.values().map(ToString::to_string).collect();
                println!("unit {unit_id}: MI 0..4 = [{}]", values.join(", "));
            }
            Err(e) => println!("unit {unit_id}: {e}"),
        }
    }

    for client in &clients {
        client.close().await;
    }
    println!("\n{} shared channel(s) open", registry.len());
    Ok(())
}
