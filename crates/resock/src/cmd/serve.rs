use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use resock_frame::{DelimitedCodec, JsonTranslator, Translator};
use resock_transport::{SocketListener, SocketStream};
use serde_json::Value;
use tokio_util::codec::Framed;
use tracing::{info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

enum Session {
    /// The peer went away; accept the next one.
    Ended,
    /// `--count` reached or interrupted; exit.
    Finished,
}

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = SocketListener::bind(&args.endpoint)
        .await
        .map_err(|err| transport_error("bind failed", err))?;
    info!(endpoint = %listener.endpoint(), "listening");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let translator = JsonTranslator::<Value>::new();
    let mut received = 0usize;

    loop {
        let stream = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                accepted.map_err(|err| transport_error("accept failed", err))?
            }
        };

        let session = tokio::select! {
            _ = &mut shutdown => Session::Finished,
            session = serve_peer(stream, &translator, &args, format, &mut received) => session,
        };
        if let Session::Finished = session {
            break;
        }
    }

    info!(received, "server stopped");
    Ok(SUCCESS)
}

async fn serve_peer(
    stream: SocketStream,
    translator: &JsonTranslator<Value>,
    args: &ServeArgs,
    format: OutputFormat,
    received: &mut usize,
) -> Session {
    let peer = stream.peer_label();
    info!(%peer, "client connected");
    let mut framed = Framed::new(stream, DelimitedCodec::new());

    while let Some(next) = framed.next().await {
        let payload = match next {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%peer, error = %err, "dropping connection");
                return Session::Ended;
            }
        };

        let message = match translator.decode(&payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(%peer, error = %err, "malformed frame");
                continue;
            }
        };
        print_message(&message, &peer, format);
        *received += 1;

        if args.echo {
            let echoed = match translator.encode(&message) {
                Ok(encoded) => framed.send(Bytes::from(encoded)).await,
                Err(err) => Err(err),
            };
            if let Err(err) = echoed {
                warn!(%peer, error = %err, "echo failed");
                return Session::Ended;
            }
        }

        if args.count.is_some_and(|count| *received >= count) {
            return Session::Finished;
        }
    }

    info!(%peer, "client disconnected");
    Session::Ended
}
