//! Bot runtime — pulls messages off every channel and hands each user's
//! messages to that user's worker, in arrival order.
//!
//! Workers are spawned on a user's first message and exit after sitting idle
//! for `idle_timeout`. Messages from different users are handled
//! concurrently; messages from one user never overlap.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::channels::{ChannelManager, IncomingMessage, OutgoingResponse, StatusUpdate};
use crate::conversation::replies;
use crate::conversation::{Command, CommandParser, ConversationEngine, FlowKind, FlowStatus};
use crate::error::Error;

/// Runtime settings.
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Idle time before a user's worker exits and its engine slot is pruned.
    pub idle_timeout: Duration,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(1800),
        }
    }
}

pub struct Bot {
    engine: Arc<ConversationEngine>,
    channels: ChannelManager,
    settings: BotSettings,
    workers: Mutex<HashMap<String, UnboundedSender<IncomingMessage>>>,
    tasks: Mutex<JoinSet<()>>,
}

impl Bot {
    pub fn new(engine: Arc<ConversationEngine>, channels: ChannelManager, settings: BotSettings) -> Self {
        Self {
            engine,
            channels,
            settings,
            workers: Mutex::new(HashMap::new()),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Run until Ctrl+C or until every channel stream ends.
    pub async fn run(self: Arc<Self>) -> Result<(), Error> {
        let mut message_stream = self.channels.start_all().await?;

        let engine = Arc::clone(&self.engine);
        let prune_every = self.settings.idle_timeout.max(Duration::from_secs(1));
        let pruning_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(prune_every);
            interval.tick().await; // Skip immediate first tick
            loop {
                interval.tick().await;
                engine.prune_idle().await;
            }
        });

        info!(channels = ?self.channels.names(), "Fitness bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            self.dispatch(message).await;
        }

        pruning_handle.abort();
        let _ = pruning_handle.await;

        // Dropping the senders lets every worker finish its queue and exit.
        self.workers.lock().await.clear();
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Worker task failed");
            }
        }

        self.channels.shutdown_all().await?;
        info!("Fitness bot stopped");
        Ok(())
    }

    /// Queue a message on its user's worker, spawning one if needed.
    async fn dispatch(self: &Arc<Self>, message: IncomingMessage) {
        let mut workers = self.workers.lock().await;

        let message = match workers.get(&message.user_id) {
            Some(tx) => match tx.send(message) {
                Ok(()) => return,
                // Worker already gone; start a fresh one below.
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        let user_id = message.user_id.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(message);
        workers.insert(user_id.clone(), tx);
        drop(workers);

        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(Arc::clone(self).run_worker(user_id, rx));
    }

    async fn run_worker(self: Arc<Self>, user_id: String, mut rx: UnboundedReceiver<IncomingMessage>) {
        debug!(user_id = %user_id, "Worker started");
        loop {
            match tokio::time::timeout(self.settings.idle_timeout, rx.recv()).await {
                Ok(Some(message)) => self.process(message).await,
                Ok(None) => break,
                Err(_) => {
                    // Senders only run under the workers lock, so an empty
                    // queue here stays empty once the entry is gone.
                    let mut workers = self.workers.lock().await;
                    match rx.try_recv() {
                        Ok(message) => {
                            drop(workers);
                            self.process(message).await;
                        }
                        Err(_) => {
                            workers.remove(&user_id);
                            break;
                        }
                    }
                }
            }
        }
        debug!(user_id = %user_id, "Worker stopped");
    }

    async fn process(&self, message: IncomingMessage) {
        if self.is_slow(&message).await {
            if let Err(e) = self
                .channels
                .send_status(
                    &message.channel,
                    StatusUpdate::Thinking("Working on it...".into()),
                    &message.metadata,
                )
                .await
            {
                debug!(error = %e, "Status update failed");
            }
        }

        // A panic inside the engine must not take the worker down with it.
        let engine = Arc::clone(&self.engine);
        let user_id = message.user_id.clone();
        let content = message.content.clone();
        let reply =
            match tokio::spawn(async move { engine.handle_message(&user_id, &content).await }).await {
                Ok(reply) => reply.text,
                Err(e) => {
                    error!(user_id = %message.user_id, error = %e, "Message handler panicked");
                    replies::GENERIC_FAILURE.to_string()
                }
            };

        if let Err(e) = self
            .channels
            .respond(&message, OutgoingResponse::text(reply))
            .await
        {
            warn!(user_id = %message.user_id, channel = %message.channel, error = %e, "Failed to deliver reply");
        }
    }

    /// Whether this message will trigger a plan or prediction call.
    async fn is_slow(&self, message: &IncomingMessage) -> bool {
        match CommandParser::parse(&message.content) {
            Command::GeneratePlan => true,
            Command::Text(_) => match self.engine.flow_status(&message.user_id).await {
                FlowStatus::InFlow { flow, step, .. } => {
                    flow != FlowKind::ProfileCreation && step + 1 == flow.steps().len()
                }
                FlowStatus::Idle => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use futures::stream;

    use crate::channels::{Channel, MessageStream};
    use crate::conversation::EngineConfig;
    use crate::error::{ChannelError, LlmError};
    use crate::planner::{PlanGenerator, PlanRequest};
    use crate::profile::{FitnessGoal, FitnessLevel, Gender, ProfileFields};
    use crate::store::{LibSqlBackend, ProfileStore};

    type Log = Arc<StdMutex<Vec<(String, String)>>>;

    /// Replays a fixed script and records replies and status updates.
    struct ScriptedChannel {
        script: Vec<(&'static str, &'static str)>,
        replies: Log,
        statuses: Arc<StdMutex<Vec<StatusUpdate>>>,
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str {
            "script"
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            let msgs: Vec<IncomingMessage> = self
                .script
                .iter()
                .map(|(user, text)| IncomingMessage::new("script", *user, *text))
                .collect();
            Ok(Box::pin(stream::iter(msgs)))
        }

        async fn respond(
            &self,
            msg: &IncomingMessage,
            response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            self.replies
                .lock()
                .unwrap()
                .push((msg.user_id.clone(), response.content));
            Ok(())
        }

        async fn send_status(
            &self,
            status: StatusUpdate,
            _metadata: &serde_json::Value,
        ) -> Result<(), ChannelError> {
            self.statuses.lock().unwrap().push(status);
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    struct FixedPlanner;

    #[async_trait]
    impl PlanGenerator for FixedPlanner {
        async fn generate(&self, _request: PlanRequest<'_>) -> Result<String, LlmError> {
            Ok("Day 1: squats".into())
        }
    }

    struct PanickingPlanner;

    #[async_trait]
    impl PlanGenerator for PanickingPlanner {
        async fn generate(&self, _request: PlanRequest<'_>) -> Result<String, LlmError> {
            panic!("planner exploded");
        }
    }

    fn alice() -> ProfileFields {
        ProfileFields {
            name: "Alice".into(),
            age: 29,
            gender: Gender::Female,
            weight_kg: 65.0,
            height_cm: 170.0,
            fitness_goal: FitnessGoal::WeightLoss,
            fitness_level: FitnessLevel::Intermediate,
        }
    }

    async fn run_script(
        planner: Arc<dyn PlanGenerator>,
        script: Vec<(&'static str, &'static str)>,
    ) -> (Vec<(String, String)>, Vec<StatusUpdate>) {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        store.upsert_profile("carol", &alice()).await.unwrap();
        let engine = Arc::new(ConversationEngine::new(
            store,
            planner,
            None,
            EngineConfig::default(),
        ));

        let replies: Log = Arc::new(StdMutex::new(Vec::new()));
        let statuses = Arc::new(StdMutex::new(Vec::new()));
        let mut channels = ChannelManager::new();
        channels.add(Box::new(ScriptedChannel {
            script,
            replies: replies.clone(),
            statuses: statuses.clone(),
        }));

        let bot = Arc::new(Bot::new(engine, channels, BotSettings::default()));
        bot.run().await.unwrap();

        let replies = replies.lock().unwrap().clone();
        let statuses = statuses.lock().unwrap().clone();
        (replies, statuses)
    }

    fn replies_for<'a>(all: &'a [(String, String)], user: &str) -> Vec<&'a str> {
        all.iter()
            .filter(|(u, _)| u == user)
            .map(|(_, text)| text.as_str())
            .collect()
    }

    #[tokio::test]
    async fn each_user_is_answered_in_order() {
        let (replies, _) = run_script(
            Arc::new(FixedPlanner),
            vec![
                ("alice", "/start"),
                ("bob", "/help"),
                ("alice", "Alice"),
                ("bob", "hello"),
                ("alice", "29"),
            ],
        )
        .await;

        assert_eq!(
            replies_for(&replies, "alice"),
            vec![
                "Welcome! What is your name?",
                "How old are you?",
                "What is your gender? (Male/Female/Other)",
            ]
        );
        assert_eq!(
            replies_for(&replies, "bob"),
            vec![replies::HELP, replies::UNRECOGNIZED]
        );
    }

    #[tokio::test]
    async fn plan_request_shows_typing_status() {
        let (replies, statuses) = run_script(Arc::new(FixedPlanner), vec![("carol", "/plan")]).await;

        assert_eq!(
            replies_for(&replies, "carol"),
            vec!["Your Fitness Plan:\nDay 1: squats"]
        );
        assert!(matches!(statuses.as_slice(), [StatusUpdate::Thinking(_)]));
    }

    #[tokio::test]
    async fn panic_in_handler_becomes_generic_failure() {
        let (replies, _) = run_script(
            Arc::new(PanickingPlanner),
            vec![("carol", "/plan"), ("carol", "/help")],
        )
        .await;

        assert_eq!(
            replies_for(&replies, "carol"),
            vec![replies::GENERIC_FAILURE, replies::HELP]
        );
    }

    #[tokio::test]
    async fn run_releases_every_engine_handle() {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let engine = Arc::new(ConversationEngine::new(
            Arc::clone(&store) as Arc<dyn ProfileStore>,
            Arc::new(FixedPlanner),
            None,
            EngineConfig::default(),
        ));
        let mut channels = ChannelManager::new();
        channels.add(Box::new(ScriptedChannel {
            script: vec![("frank", "/start"), ("frank", "Frank")],
            replies: Arc::new(StdMutex::new(Vec::new())),
            statuses: Arc::new(StdMutex::new(Vec::new())),
        }));

        let bot = Arc::new(Bot::new(
            Arc::clone(&engine),
            channels,
            BotSettings::default(),
        ));
        bot.run().await.unwrap();

        assert_eq!(Arc::strong_count(&engine), 1);
        drop(engine);
        assert!(Arc::try_unwrap(store).is_ok());
    }

    #[tokio::test]
    async fn idle_worker_exits_and_is_replaced() {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let engine = Arc::new(ConversationEngine::new(
            store,
            Arc::new(FixedPlanner),
            None,
            EngineConfig::default(),
        ));
        let bot = Arc::new(Bot::new(
            engine,
            ChannelManager::new(),
            BotSettings {
                idle_timeout: Duration::from_millis(20),
            },
        ));

        bot.dispatch(IncomingMessage::new("script", "dave", "/help")).await;
        assert!(bot.workers.lock().await.contains_key("dave"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!bot.workers.lock().await.contains_key("dave"));

        bot.dispatch(IncomingMessage::new("script", "dave", "/help")).await;
        assert!(bot.workers.lock().await.contains_key("dave"));
    }

    #[tokio::test]
    async fn message_queued_during_idle_timeout_keeps_the_worker() {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let engine = Arc::new(ConversationEngine::new(
            store,
            Arc::new(FixedPlanner),
            None,
            EngineConfig::default(),
        ));
        let bot = Arc::new(Bot::new(
            Arc::clone(&engine),
            ChannelManager::new(),
            BotSettings {
                idle_timeout: Duration::from_millis(20),
            },
        ));

        bot.dispatch(IncomingMessage::new("script", "erin", "/help")).await;

        // Hold the registry past the idle timeout and queue a message the
        // way dispatch does, while the worker waits to unregister.
        let workers = bot.workers.lock().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        workers["erin"]
            .send(IncomingMessage::new("script", "erin", "/start"))
            .unwrap();
        drop(workers);

        bot.dispatch(IncomingMessage::new("script", "erin", "Erin")).await;
        assert_eq!(bot.tasks.lock().await.len(), 1);

        let reached_age = async {
            loop {
                if let FlowStatus::InFlow { step: 1, .. } = engine.flow_status("erin").await {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(2), reached_age)
            .await
            .expect("messages were not handled in order");
    }
}
