//! FlowGuard - Main Entry Point
//!
//! Reads Event Records as JSON lines on stdin, runs the pipeline and
//! prints every verdict as a JSON line on stdout. Logging goes to stderr
//! (`RUST_LOG`, default `info`).
//!
//! ```text
//! {"src_ip":167772161,"dst_ip":167772162,"src_port":40000,"dst_port":443,"protocol":6,"packet_size":60,"timestamp":1,"tcp_flags":2}
//! ```

use std::io::BufRead;

use flowguard_core::constants::{APP_NAME, APP_VERSION};
use flowguard_core::logic::collector::EventSender;
use flowguard_core::logic::metrics;
use flowguard_core::{EngineConfig, EventRecord};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting {} v{}...", APP_NAME, APP_VERSION);

    let config = match EngineConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(2);
        }
    };

    let handle = match flowguard_core::start(config) {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("Failed to start pipeline: {}", e);
            std::process::exit(1);
        }
    };

    spawn_stdin_reader(handle.sender());

    let mut verdicts = handle.subscribe();
    let printer = tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match verdicts.recv().await {
                Ok(verdict) => match serde_json::to_string(&verdict) {
                    Ok(line) => println!("{}", line),
                    Err(e) => log::warn!("Cannot serialize verdict: {}", e),
                },
                Err(RecvError::Lagged(n)) => log::warn!("Verdict printer lagged, skipped {}", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for shutdown signal: {}", e);
    }

    handle.shutdown().await;
    printer.abort();

    match serde_json::to_string(&metrics::snapshot()) {
        Ok(summary) => log::info!("Final metrics: {}", summary),
        Err(e) => log::warn!("Cannot serialize metrics: {}", e),
    }
}

/// Blocking stdin reader on its own thread; malformed lines are counted and skipped
fn spawn_stdin_reader(sender: EventSender) {
    let spawned = std::thread::Builder::new()
        .name("flowguard-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log::error!("stdin read failed: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<EventRecord>(&line) {
                    Ok(event) => {
                        if sender.try_send(event).is_err() {
                            log::info!("Event queue closed, stopping stdin reader");
                            break;
                        }
                    }
                    Err(e) => {
                        metrics::record_parse_error();
                        log::debug!("Skipping malformed event: {}", e);
                    }
                }
            }
            log::info!(
                "stdin closed ({} events queued, {} dropped on a full queue)",
                sender.accepted(),
                sender.dropped()
            );
        });

    if let Err(e) = spawned {
        log::error!("Cannot start stdin reader: {}", e);
    }
}
