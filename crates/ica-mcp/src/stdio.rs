//! Newline-delimited JSON-RPC over stdin/stdout.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use ica_core::Result;

use crate::{
    protocol::{respond_err, Reply, PARSE_ERROR},
    McpServer,
};

pub async fn serve(server: &McpServer, cancel: CancellationToken) -> Result<()> {
    tracing::info!("mcp stdio transport running");
    let stdin = BufReader::new(tokio::io::stdin());
    serve_io(server, stdin, tokio::io::stdout(), cancel).await
}

/// Serve until EOF or cancellation. Logs never touch `writer`.
pub async fn serve_io<R, W>(
    server: &McpServer,
    reader: R,
    mut writer: W,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::info!("stdin closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Value>(&line) {
            Ok(payload) => server.handle_payload(payload).await,
            Err(e) => {
                tracing::debug!(error = %e, "unparseable stdio line");
                Some(Reply::Single(respond_err(Value::Null, PARSE_ERROR, "Parse error")))
            }
        };
        let Some(reply) = reply else {
            continue;
        };

        let out = serde_json::to_string(&reply)?;
        writer.write_all(out.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}
