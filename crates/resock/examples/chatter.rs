//! Chatty client: greets the server with its process id, then sends a
//! random number every second and prints whatever comes back.
//!
//! Start a server first, then run the client:
//!
//! ```text
//! cargo run -p resock --features cli -- serve 8080 --echo
//! cargo run -p resock --example chatter -- 8080
//! ```
//!
//! Stop and restart the server while the client runs: messages sent in the
//! meantime are queued and delivered once it is back.

use std::time::Duration;

use rand::Rng;
use resock::client::{ClientConfig, ClientEvent, MessageClient};
use resock::transport::Endpoint;
use serde_json::json;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let endpoint: Endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "8080".to_string())
        .parse()?;

    let client: MessageClient = MessageClient::connect(endpoint, ClientConfig::default());
    let (handle, mut events) = client.spawn();

    handle.send(json!(format!("Hello everyone : {}", std::process::id())))?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    let mut rng = rand::thread_rng();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let message = json!({ "GOGGL: ": rng.gen_range(0..1000) });
                println!("{message}");
                handle.send(message)?;
            }
            _ = tokio::signal::ctrl_c() => {
                handle.destroy();
                break;
            }
            event = events.recv() => match event {
                Some(ClientEvent::Message(message)) => println!("{message}"),
                Some(ClientEvent::Connected) => eprintln!("connected"),
                Some(ClientEvent::Disconnected(cause)) => eprintln!("disconnected: {cause}"),
                Some(ClientEvent::Error(err)) => eprintln!("bad frame: {err}"),
                Some(ClientEvent::Closed) | None => break,
            },
        }
    }

    Ok(())
}
