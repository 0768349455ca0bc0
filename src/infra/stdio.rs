//! Newline-delimited JSON-RPC over stdin/stdout.

use std::io;

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    task::JoinSet,
};
use tracing::{info, warn};

use super::{
    error::InfraError,
    mcp::{McpServer, protocol::Reply},
};

/// Serve the process's own stdin and stdout until stdin reaches EOF.
pub async fn serve_stdio(server: McpServer) -> Result<(), InfraError> {
    info!(
        target = "infra::stdio",
        op = "stdio::serve",
        "Serving MCP over stdio"
    );
    serve(server, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Read one message per line from `reader`, answer on `writer`.
///
/// Messages are handled concurrently; replies are written as they complete,
/// one per line. Returns once the input is exhausted and every in-flight
/// message has been answered.
pub async fn serve<R, W>(server: McpServer, reader: R, mut writer: W) -> Result<(), InfraError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut in_flight: JoinSet<Option<Reply>> = JoinSet::new();
    let mut reading = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if reading => match line? {
                Some(line) => {
                    if !line.trim().is_empty() {
                        let server = server.clone();
                        in_flight.spawn(async move { server.handle_payload(line.as_bytes()).await });
                    }
                }
                None => reading = false,
            },
            Some(joined) = in_flight.join_next() => match joined {
                Ok(Some(reply)) => write_reply(&mut writer, &reply).await?,
                Ok(None) => {}
                Err(err) => warn!(
                    target = "infra::stdio",
                    op = "stdio::serve",
                    result = "error",
                    error = %err,
                    "Message handler task failed"
                ),
            },
            else => break,
        }
    }

    info!(
        target = "infra::stdio",
        op = "stdio::serve",
        "Input closed; stdio transport stopped"
    );
    Ok(())
}

async fn write_reply<W: AsyncWrite + Unpin>(writer: &mut W, reply: &Reply) -> Result<(), InfraError> {
    let mut encoded = serde_json::to_vec(reply).map_err(io::Error::from)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}
