//! Coordinator daemon - accepts the robot's controller nodes and echoes
//! every inbound message back to its sender
//!
//! The echo handler stands in for application logic; a real deployment
//! replaces it with whatever consumes node telemetry and emits commands.

use setu_link::{InboundHandler, LinkConfig, Message, ServerMultiplexer};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `coordinator <path>` (positional)
/// - `coordinator --config <path>` (flag-based)
/// - `coordinator -c <path>` (short flag)
///
/// Defaults to `/etc/setu-link.toml` if not specified.
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

/// Logs each message and queues an acknowledgement back to its sender
struct EchoHandler {
    replies: Vec<(Vec<u8>, String)>,
}

impl InboundHandler for EchoHandler {
    fn on_message(&mut self, message: &Message) {
        log::info!(
            "Message from {}: {} bytes",
            message.peer_addr(),
            message.len()
        );
        self.replies
            .push((message.payload_bytes().to_vec(), message.peer_addr().to_string()));
    }
}

fn main() -> setu_link::Result<()> {
    let config_path = parse_config_path();
    let config = LinkConfig::from_file(&config_path)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    )
    .init();

    log::info!("Setu-Link coordinator starting (config: {})", config_path);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| setu_link::Error::Config(format!("Error setting Ctrl-C handler: {}", e)))?;

    let mut server = ServerMultiplexer::bind(&config.network)?;
    let timeout = config.network.poll_timeout();
    let mut handler = EchoHandler {
        replies: Vec::new(),
    };

    while running.load(Ordering::Relaxed) {
        server.poll_once(timeout)?;
        server.process_inbound(&mut handler);
        for (payload, dest) in handler.replies.drain(..) {
            server.enqueue_outbound(&payload, &dest);
        }
        server.flush_outbound();
    }

    server.shutdown();
    log::info!("Coordinator stopped");
    Ok(())
}
