use std::time::Duration;

use resock_client::{ClientConfig, ClientEvent, MessageClient};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{client_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let interval = parse_duration(&args.interval)?;
    let reconnect_delay = parse_duration(&args.reconnect_delay)?;
    let message = resolve_message(&args)?;

    let config = ClientConfig::default().with_reconnect_delay(reconnect_delay);
    let mut client: MessageClient = MessageClient::connect(args.endpoint.clone(), config);
    let mut session = Session {
        client: &mut client,
        peer: args.endpoint.to_string(),
        format,
        replies: 0,
    };

    let plan = Plan {
        message: &message,
        count: args.count,
        interval,
        wait: args.wait,
    };
    let outcome = tokio::time::timeout(timeout, session.run(plan)).await;
    client.destroy();

    match outcome {
        Ok(result) => result,
        Err(_) => Err(CliError::new(
            TIMEOUT,
            format!("timed out after {timeout:?} talking to {}", args.endpoint),
        )),
    }
}

fn resolve_message(args: &SendArgs) -> CliResult<Value> {
    if let Some(json) = &args.json {
        return serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")));
    }
    if let Some(data) = &args.data {
        return Ok(Value::String(data.clone()));
    }
    Err(CliError::new(USAGE, "one of --json or --data is required"))
}

struct Plan<'a> {
    message: &'a Value,
    count: usize,
    interval: Duration,
    wait: bool,
}

struct Session<'a> {
    client: &'a mut MessageClient,
    peer: String,
    format: OutputFormat,
    replies: usize,
}

impl Session<'_> {
    async fn run(&mut self, plan: Plan<'_>) -> CliResult<i32> {
        for n in 0..plan.count {
            if n > 0 {
                self.drive_until(Instant::now() + plan.interval).await?;
            }
            self.client
                .send(plan.message)
                .map_err(|err| client_error("send failed", err))?;
        }

        self.deliver().await?;
        info!(endpoint = %self.peer, count = plan.count, "messages delivered");

        if plan.wait {
            while self.replies == 0 {
                self.step().await?;
            }
        }
        Ok(SUCCESS)
    }

    /// Process events until every queued message has been written.
    async fn deliver(&mut self) -> CliResult<()> {
        loop {
            if self.client.is_connected() && self.client.queued() == 0 {
                match self.client.flush().await {
                    Ok(()) => return Ok(()),
                    Err(err) => debug!(error = %err, "flush failed; waiting for reconnect"),
                }
            }
            self.step().await?;
        }
    }

    async fn drive_until(&mut self, deadline: Instant) -> CliResult<()> {
        loop {
            match tokio::time::timeout_at(deadline, self.step()).await {
                Ok(result) => result?,
                Err(_) => return Ok(()),
            }
        }
    }

    async fn step(&mut self) -> CliResult<()> {
        match self.client.next_event().await {
            Some(ClientEvent::Connected) => {
                info!(endpoint = %self.peer, queued = self.client.queued(), "connected");
            }
            Some(ClientEvent::Disconnected(cause)) => {
                info!(endpoint = %self.peer, error = %cause, "disconnected; reconnecting");
            }
            Some(ClientEvent::Message(message)) => {
                print_message(&message, &self.peer, self.format);
                self.replies += 1;
            }
            Some(ClientEvent::Error(err)) => {
                warn!(endpoint = %self.peer, error = %err, "discarding malformed reply");
            }
            Some(ClientEvent::Closed) | None => {
                return Err(CliError::new(FAILURE, "client closed unexpectedly"));
            }
        }
        Ok(())
    }
}
