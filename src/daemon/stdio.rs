use anyhow::Result;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::{mpsc, oneshot},
};
use tokio_util::sync::CancellationToken;

use super::service::Command;

/// Serves the action protocol as JSON lines over stdio while the daemon runs in a console.
/// A detached daemon has a null stdin, so this loop ends at the immediate EOF and the daemon
/// keeps running on idle events alone.
pub async fn serve_stdio(sender: mpsc::Sender<Command>, shutdown: CancellationToken) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { return Ok(()) };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(&line) {
            Ok(body) => {
                let (reply, response) = oneshot::channel();
                if sender.send(Command::Message { body, reply }).await.is_err() {
                    return Ok(());
                }
                match response.await {
                    Ok(response) => response,
                    Err(_) => return Ok(()),
                }
            }
            // A line that isn't JSON can't reach the engine, but the channel contract still
            // holds: every request line gets a response line.
            Err(e) => json!({"ok": false, "error": e.to_string()}),
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }
}
