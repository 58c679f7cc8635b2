//! Inbound message parsing — slash commands versus free-text answers.

/// What an inbound message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start` — begin profile creation.
    StartProfile,
    ShowProfile,
    GeneratePlan,
    ImprovePlan,
    DeletePlan,
    StartPrediction,
    Cancel,
    Help,
    /// A slash command we don't know.
    Unknown(String),
    /// Anything else: an answer to the current step, or noise when idle.
    Text(String),
}

impl Command {
    /// Commands that may run while a flow is active without disturbing it.
    pub fn allowed_in_flow(&self) -> bool {
        matches!(self, Self::ShowProfile | Self::Help | Self::Cancel)
    }
}

/// Parses user input into Command values.
pub struct CommandParser;

impl CommandParser {
    /// Parse message content into a Command.
    pub fn parse(content: &str) -> Command {
        let trimmed = content.trim();
        if !trimmed.starts_with('/') {
            return Command::Text(content.to_string());
        }

        // Telegram appends the bot's username in groups: `/plan@FitBot`.
        let head = trimmed.split_whitespace().next().unwrap_or(trimmed);
        let name = head.split('@').next().unwrap_or(head).to_lowercase();

        match name.as_str() {
            "/start" | "/newprofile" => Command::StartProfile,
            "/profile" => Command::ShowProfile,
            "/plan" => Command::GeneratePlan,
            "/improve" | "/improveplan" => Command::ImprovePlan,
            "/deleteplan" | "/delete_plan" => Command::DeletePlan,
            "/predict" | "/progress" => Command::StartPrediction,
            "/cancel" | "/stop" => Command::Cancel,
            "/help" | "/?" => Command::Help,
            _ => Command::Unknown(name),
        }
    }
}
