//! Detection traffic simulator
//!
//! Drives the detect endpoint with synthetic entry/exit cycles for manual
//! testing and demos.
//!
//! Usage:
//!   cargo run --bin sim -- --url http://127.0.0.1:8080 --cycles 10

use clap::Parser;
use serde_json::json;
use std::time::Duration;

/// Synthetic sensor traffic against the detect API
#[derive(Parser, Debug)]
#[command(name = "sim", about)]
struct Args {
    /// Base URL of a running spotwatch instance
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Comma-separated sensor ids to cycle through
    #[arg(long, default_value = "sensor_001,sensor_002,sensor_003")]
    sensors: String,

    /// Number of entry/exit cycles to run
    #[arg(long, default_value_t = 5)]
    cycles: u32,

    /// Dwell between entry and exit (ms)
    #[arg(long, default_value_t = 1500)]
    dwell_ms: u64,

    /// Pause between cycles (ms)
    #[arg(long, default_value_t = 500)]
    pause_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let sensors: Vec<String> = args
        .sensors
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if sensors.is_empty() {
        anyhow::bail!("no sensors given");
    }

    let client = reqwest::Client::new();
    let endpoint = format!("{}/api/parking/detect", args.url.trim_end_matches('/'));
    println!("driving {} sensors against {endpoint}", sensors.len());

    for cycle in 1..=args.cycles {
        for sensor in &sensors {
            send(&client, &endpoint, sensor, "occupied").await?;
        }
        tokio::time::sleep(Duration::from_millis(args.dwell_ms)).await;
        for sensor in &sensors {
            send(&client, &endpoint, sensor, "free").await?;
        }
        println!("cycle {cycle}/{} complete", args.cycles);
        tokio::time::sleep(Duration::from_millis(args.pause_ms)).await;
    }

    Ok(())
}

async fn send(
    client: &reqwest::Client,
    endpoint: &str,
    sensor: &str,
    status: &str,
) -> anyhow::Result<()> {
    let timestamp =
        chrono::Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S").to_string();
    let body = json!({ "sensorId": sensor, "status": status, "timestamp": timestamp });

    let response = client.post(endpoint).json(&body).send().await?;
    let http_status = response.status();
    let outcome: serde_json::Value = response.json().await.unwrap_or_default();

    println!(
        "  {sensor} {status} -> {http_status} action={} cost={}",
        outcome["action"].as_str().unwrap_or("?"),
        outcome["totalCost"].as_f64().map_or("-".to_string(), |c| format!("{c:.2}")),
    );
    Ok(())
}
