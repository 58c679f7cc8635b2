//! CLI channel — terminal REPL for local use.
//!
//! Everything typed here belongs to one user. With an engine attached, the
//! prompt shows the active dialogue and the step it is waiting on.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate};
use crate::conversation::{ConversationEngine, FlowStatus};
use crate::error::ChannelError;

/// User key for everything typed on the terminal.
pub const CLI_USER_ID: &str = "local-user";

#[derive(Default)]
pub struct CliChannel {
    engine: Option<Arc<ConversationEngine>>,
}

impl CliChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show the user's dialogue progress in the prompt.
    pub fn with_engine(engine: Arc<ConversationEngine>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    async fn prompt(&self) -> String {
        match &self.engine {
            Some(engine) => prompt_for(&engine.flow_status(CLI_USER_ID).await),
            None => prompt_for(&FlowStatus::Idle),
        }
    }
}

/// `> ` when idle, `[profile_creation 2/7: age] > ` mid-dialogue.
pub fn prompt_for(status: &FlowStatus) -> String {
    match status {
        FlowStatus::Idle => "> ".to_string(),
        FlowStatus::InFlow {
            flow,
            step,
            step_name,
        } => format!("[{flow} {}/{}: {step_name}] > ", step + 1, flow.steps().len()),
    }
}

/// Forward non-blank lines as messages until EOF or the receiver goes away.
async fn forward_lines<R>(reader: R, tx: UnboundedSender<IncomingMessage>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if tx.send(IncomingMessage::new("cli", CLI_USER_ID, line)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        eprint!("{}", self.prompt().await);
        tokio::spawn(forward_lines(BufReader::new(tokio::io::stdin()), tx));

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", response.content);
        eprint!("{}", self.prompt().await);
        Ok(())
    }

    async fn send_status(
        &self,
        status: StatusUpdate,
        _metadata: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        match status {
            StatusUpdate::Thinking(msg) => eprintln!("⏳ {}", msg),
            StatusUpdate::Status(msg) => eprintln!("ℹ️  {}", msg),
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
