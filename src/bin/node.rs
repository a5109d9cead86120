//! Node daemon - connects to the coordinator, sends a periodic heartbeat,
//! and logs whatever the coordinator sends back
//!
//! While the coordinator is down the loop stays in the reconnect cycle,
//! backing off one update interval between attempts. The back-off lives
//! here, not in the library, so Ctrl-C stays responsive.

use setu_link::{
    ClientMultiplexer, ConnectOutcome, InboundHandler, LinkConfig, Message, ServerStatus,
};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "/etc/setu-link.toml".to_string()
}

/// Logs coordinator messages
struct LogHandler;

impl InboundHandler for LogHandler {
    fn on_message(&mut self, message: &Message) {
        log::info!(
            "Message from coordinator {}: {} bytes",
            message.peer_addr(),
            message.len()
        );
    }
}

fn main() -> setu_link::Result<()> {
    let config_path = parse_config_path();
    let config = LinkConfig::from_file(&config_path)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    )
    .init();

    log::info!("Setu-Link node starting (config: {})", config_path);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| setu_link::Error::Config(format!("Error setting Ctrl-C handler: {}", e)))?;

    let mut client = ClientMultiplexer::new(&config.network)?;
    let timeout = config.network.poll_timeout();
    let mut handler = LogHandler;
    let heartbeat_every = (config.network.update_hz.round() as u64).max(1);
    let mut ticks: u64 = 0;

    while running.load(Ordering::Relaxed) {
        if !client.is_connected() {
            match client.try_connect()? {
                ConnectOutcome::Connected => {}
                ConnectOutcome::NotYet => {
                    thread::sleep(timeout);
                    continue;
                }
            }
        }

        if client.poll_once(timeout)? == ServerStatus::Disconnected {
            continue;
        }
        client.process_inbound(&mut handler);

        ticks += 1;
        if ticks % heartbeat_every == 0 {
            // Roughly one heartbeat per second at the configured rate
            client.enqueue_outbound(format!("heartbeat {}", ticks).as_bytes());
        }
        client.flush_outbound();
    }

    client.shutdown();
    log::info!("Node stopped");
    Ok(())
}
