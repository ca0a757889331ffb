//! Subscribe to one or more channels and print everything that arrives.
//!
//! ```sh
//! cargo run -p pubnub-client --example subscribe -- <CHANNEL> [CHANNEL...]
//! ```
//!
//! Keys are read from the environment:
//! ```sh
//! PUBNUB_PUBLISH_KEY=demo PUBNUB_SUBSCRIBE_KEY=demo \
//!     cargo run -p pubnub-client --example subscribe -- my-channel
//! ```

use pubnub_client::{Client, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let channels: Vec<String> = std::env::args().skip(1).collect();
    if channels.is_empty() {
        return Err("usage: subscribe <CHANNEL> [CHANNEL...]".into());
    }

    let publish_key = std::env::var("PUBNUB_PUBLISH_KEY").unwrap_or_else(|_| "demo".into());
    let subscribe_key = std::env::var("PUBNUB_SUBSCRIBE_KEY").unwrap_or_else(|_| "demo".into());

    let mut config = Config::new(publish_key, subscribe_key);
    config.reconnection_policy = pubnub_client::ReconnectionPolicy::Exponential;
    if let Ok(cipher_key) = std::env::var("PUBNUB_CIPHER_KEY") {
        config.cipher_key = Some(cipher_key);
    }

    let client = Client::new(config)?;
    let mut listener = client.add_listener();

    eprintln!("subscribing to {channels:?} ...");
    client
        .subscribe()
        .channels(channels)
        .with_presence(true)
        .execute()?;

    loop {
        tokio::select! {
            Some(status) = listener.status.recv() => {
                eprintln!(
                    "[status] {:?} op={:?} channels={:?} error={}",
                    status.category,
                    status.operation,
                    status.affected_channels,
                    status.error,
                );
            }
            Some(message) = listener.message.recv() => {
                eprintln!(
                    "[message] channel={} tt={} publisher={}",
                    message.channel,
                    message.timetoken,
                    message.publisher.as_deref().unwrap_or("-"),
                );
                println!("{}", message.payload);
            }
            Some(presence) = listener.presence.recv() => {
                eprintln!(
                    "[presence] channel={} action={:?} uuid={} occupancy={}",
                    presence.channel,
                    presence.action,
                    presence.uuid.as_deref().unwrap_or("-"),
                    presence.occupancy,
                );
            }
            else => break,
        }
    }

    Ok(())
}
