use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use tgkit_botfather::{LoginPrompt, TransportError};

/// Asks on stdout, reads one line from stdin.
pub struct StdinPrompt;

#[async_trait]
impl LoginPrompt for StdinPrompt {
    async fn ask(&self, question: &str) -> Result<String, TransportError> {
        let io_err = |e: std::io::Error| TransportError(format!("terminal: {e}"));

        let mut stdout = tokio::io::stdout();
        stdout.write_all(question.as_bytes()).await.map_err(io_err)?;
        stdout.flush().await.map_err(io_err)?;

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(io_err)?;
        if read == 0 {
            return Err(TransportError("terminal: input closed".to_string()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}
