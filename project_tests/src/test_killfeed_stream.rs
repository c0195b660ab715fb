use chrono::{Duration, Utc};
use clap::Parser;
use futures_util::StreamExt;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Watches a running killfeed relay and reports kill throughput", long_about = None)]
struct Args {
    /// Base HTTP address of the relay
    #[clap(short, long, default_value = "http://127.0.0.1:5000")]
    server: String,

    /// Report interval in seconds
    #[clap(short, long, default_value_t = 60)]
    report_interval_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct KillRecord {
    killer: Option<String>,
    victim: Option<String>,
    killer_guild: Option<String>,
    fame: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct KillMessage {
    #[serde(rename = "type")]
    msg_type: String,
    message: Option<KillRecord>,
}

struct Stats {
    timestamps: VecDeque<chrono::DateTime<Utc>>,
    guild_counts: HashMap<String, usize>,
    total: usize,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let base = args.server.trim_end_matches('/').to_string();

    // Snapshot first, as a fresh client would
    let snapshot_url = format!("{}/api/kills", base);
    println!("Fetching snapshot from {}...", snapshot_url);
    match reqwest::get(&snapshot_url).await {
        Ok(resp) => match resp.json::<Vec<KillRecord>>().await {
            Ok(kills) => {
                println!("Snapshot holds {} kills.", kills.len());
                for k in kills.iter().take(5) {
                    println!(
                        "  {} [{}] killed {} (fame {})",
                        k.killer.as_deref().unwrap_or("?"),
                        k.killer_guild.as_deref().unwrap_or("-"),
                        k.victim.as_deref().unwrap_or("?"),
                        k.fame.map_or("?".to_string(), |f| f.to_string())
                    );
                }
            }
            Err(e) => eprintln!("Snapshot is not a kill array: {}", e),
        },
        Err(e) => eprintln!("Snapshot request failed: {}", e),
    }

    let stats = Arc::new(Mutex::new(Stats {
        timestamps: VecDeque::new(),
        guild_counts: HashMap::new(),
        total: 0,
    }));

    // Clone for the reporter task
    let stats_reporter = Arc::clone(&stats);
    let report_interval = args.report_interval_seconds;
    tokio::spawn(async move {
        loop {
            sleep(std::time::Duration::from_secs(report_interval)).await;
            let one_minute_ago = Utc::now() - Duration::minutes(1);

            let (rate, total, guilds) = {
                let mut data = stats_reporter.lock().unwrap();
                while data.timestamps.front().map_or(false, |&t| t < one_minute_ago) {
                    data.timestamps.pop_front();
                }
                let mut guilds: Vec<(String, usize)> =
                    data.guild_counts.iter().map(|(g, c)| (g.clone(), *c)).collect();
                guilds.sort_by(|a, b| b.1.cmp(&a.1));
                guilds.truncate(5);
                (data.timestamps.len(), data.total, guilds)
            };

            let report = guilds
                .iter()
                .map(|(g, c)| format!("{}: {}", g, c))
                .collect::<Vec<_>>()
                .join(", ");

            println!("\n----- Killfeed Summary -----");
            println!("Last minute: {} kills/min", rate);
            println!("Total since start: {}", total);
            println!("Top guilds: {}", if report.is_empty() { "No data" } else { &report });
            println!("----------------------------\n");
        }
    });

    // Main WebSocket Loop
    let ws_url = format!("{}/ws", base.replacen("http", "ws", 1));
    println!("Connecting to {}...", ws_url);
    let (ws_stream, _) = connect_async(&ws_url).await.expect("Failed to connect");
    let (_write, mut read) = ws_stream.split();
    println!("Connected. Press Ctrl+C to stop.");

    while let Some(Ok(msg)) = read.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<KillMessage>(&text) {
                Ok(parsed) if parsed.msg_type == "new_kill" => {
                    if let Some(kill) = parsed.message {
                        println!(
                            "{} killed {} (fame {})",
                            kill.killer.as_deref().unwrap_or("?"),
                            kill.victim.as_deref().unwrap_or("?"),
                            kill.fame.unwrap_or_default()
                        );
                        let mut data = stats.lock().unwrap();
                        data.timestamps.push_back(Utc::now());
                        data.total += 1;
                        if let Some(guild) = kill.killer_guild {
                            *data.guild_counts.entry(guild).or_insert(0) += 1;
                        }
                    }
                }
                Ok(parsed) => println!("Ignoring frame of type {}", parsed.msg_type),
                Err(e) => eprintln!("Unparsable frame: {}", e),
            }
        }
    }
    println!("Server closed the connection.");
}
