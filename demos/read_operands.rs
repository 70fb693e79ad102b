//! Example: Reading and writing operands on an Ethernet-enabled controller
//!
//! Run with: cargo run --example read_operands -- 192.168.1.20
//!
//! This example demonstrates:
//! - Connecting and inspecting the identified controller
//! - Batched reads across several operand kinds
//! - Writes with value conversion
//! - Reading and setting the controller clock
//!
//! Set `RUST_LOG=unitronics_pcom=debug` to see every frame on the wire.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use unitronics_pcom::{
    Client, ClientConfig, OperandKind, OperandValue, ReadOperandsRequest,
};

#[tokio::main]
async fn main() -> unitronics_pcom::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "192.168.1.20".to_string());

    // Ctrl-C cancels whatever is in flight
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    // =========================================================================
    // Connect
    // =========================================================================

    let config = ClientConfig::new(host, 0)
        .with_timeout(Duration::from_secs(3))
        .with_retries(2);
    let client = Client::connect(config, &cancel).await?;

    let profile = client.profile();
    println!("=== Controller ===\n");
    println!("Model:   {} ({:?})", profile.model(), profile.tier());
    println!("Version: {}", profile.version());
    println!("Buffer:  {} bytes", profile.buffer_size());
    println!("Binary:  read={} write={}", profile.supports_binary_read(), profile.supports_binary_write());

    // =========================================================================
    // Batched Read
    // =========================================================================

    println!("\n=== Reading ===\n");

    let mut request = ReadOperandsRequest::new();
    request.add_range(OperandKind::MB, 0, 16)?;
    request.add_range(OperandKind::MI, 0, 10)?;
    request.add_range(OperandKind::MF, 0, 4)?;
    request.add(OperandKind::TimerPreset, 0);
    request.add(OperandKind::SI, 0);

    let result = client.read_operands(&request, &cancel).await?;
    for (address, value) in &result.values {
        println!("{address:>8} = {value}");
    }
    println!(
        "\n{} values in {} messages, {} bytes sent, {} bytes received, {:?}",
        result.len(),
        result.stats.packets_sent,
        result.stats.bytes_sent,
        result.stats.bytes_received,
        result.stats.duration
    );

    if let Some(setpoint) = result.get_as::<f32>(OperandKind::MF, 0) {
        println!("MF 0 as f32 = {setpoint}");
    }

    // =========================================================================
    // Writes
    // =========================================================================

    println!("\n=== Writing ===\n");

    client.write_operand(OperandKind::MB, 100, true, &cancel).await?;
    client.write_operand(OperandKind::MI, 100, 1234i16, &cancel).await?;
    client.write_operand(OperandKind::MF, 100, 21.5f32, &cancel).await?;
    client
        .write_operand(OperandKind::TimerPreset, 10, Duration::from_millis(2500), &cancel)
        .await?;

    // Values are checked against the operand type before anything is sent
    match client
        .write_operand(OperandKind::MI, 101, OperandValue::I32(70_000), &cancel)
        .await
    {
        Ok(_) => println!("unexpected: 70000 accepted for MI"),
        Err(e) => println!("rejected as expected: {e}"),
    }

    // =========================================================================
    // Clock
    // =========================================================================

    println!("\n=== Clock ===\n");

    let clock = client.read_clock(&cancel).await?.clock;
    println!("Controller clock: {clock}");

    let now = chrono::Local::now().naive_local();
    client.write_clock(now, &cancel).await?;
    println!("Clock set to {now}");

    client.close().await;
    Ok(())
}
