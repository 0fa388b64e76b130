//! The stdin control surface (spec.md §6): one command per newline.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::control::CommandRouter;

pub async fn serve(router: Arc<CommandRouter>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match router.dispatch(&line).await {
                    Ok(result) if result.is_empty() => tracing::info!(command = %line, "ok"),
                    Ok(result) => tracing::info!(command = %line, result = %result, "ok"),
                    Err(e) => tracing::error!(command = %line, error = %e, "command failed"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "stdin control surface read error");
                break;
            }
        }
    }
}
