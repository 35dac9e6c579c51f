use winnow::combinator::{alt, preceded};
use winnow::prelude::*;

use super::auth::AuthMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    NewStory,
    ToggleSidebar,
    OpenAuth(AuthMode),
    Logout,
    /// A slash command we don't know.
    Unknown(String),
    /// Anything else is the opening of a story.
    Prompt(String),
}

/// Commands understood while the sign-in dialog is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogCommand {
    SwitchMode,
    Cancel,
}

fn slash_command(input: &mut &str) -> PResult<Command> {
    preceded(
        '/',
        alt((
            "help".value(Command::Help),
            alt(("quit", "exit")).value(Command::Quit),
            "new".value(Command::NewStory),
            "sidebar".value(Command::ToggleSidebar),
            "login".value(Command::OpenAuth(AuthMode::Login)),
            "signup".value(Command::OpenAuth(AuthMode::Signup)),
            "logout".value(Command::Logout),
        )),
    )
    .parse_next(input)
}

fn dialog_command(input: &mut &str) -> PResult<DialogCommand> {
    preceded(
        '/',
        alt((
            "switch".value(DialogCommand::SwitchMode),
            "cancel".value(DialogCommand::Cancel),
        )),
    )
    .parse_next(input)
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let trimmed = line.trim();
        if !trimmed.starts_with('/') {
            // sent exactly as typed
            return Command::Prompt(line.to_string());
        }

        slash_command
            .parse(trimmed)
            .unwrap_or_else(|_| Command::Unknown(trimmed.to_string()))
    }
}

impl DialogCommand {
    pub fn parse(line: &str) -> Option<DialogCommand> {
        dialog_command.parse(line.trim()).ok()
    }
}
