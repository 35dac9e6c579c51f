pub mod auth;
pub mod command;
pub mod conversation_state;
pub mod prompt;
pub mod render;
pub mod session;
pub mod sidebar;

use std::io::{self, Write};
use std::process::ExitCode;

use auth::{AuthForm, AuthMode};
use command::{Command, DialogCommand};
use conversation_state::Role;
use crossterm::cursor::{MoveTo, MoveToColumn};
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use eyre::Result;
use prompt::{field_prompt, generate_prompt};
use rustyline::error::ReadlineError;
use rustyline::Editor;
use session::{ChatSession, ReplyEvent, SendOutcome};
use tracing::{debug, error};

use crate::story_client::StoryBackend;

const HELP_TEXT: &str = "
Kaf ki Kahani

Type the opening words of a story and press enter.
Ctrl-C while a story is being written stops it.

/new          Start a new story
/sidebar      Show or hide the sidebar
/login        Log in
/signup       Create an account
/logout       Log out
/help         Show this help dialogue
/quit         Quit the application
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct ChatContext {
    output: Box<dyn Write>,
    input: Option<String>,
    interactive: bool,
    session: ChatSession,
    backend: Box<dyn StoryBackend>,
}

impl ChatContext {
    pub fn new(
        output: Box<dyn Write>,
        input: Option<String>,
        interactive: bool,
        backend: Box<dyn StoryBackend>,
        terminal_columns: u16,
    ) -> Self {
        Self {
            output,
            input,
            interactive,
            session: ChatSession::new(terminal_columns),
            backend,
        }
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        // Single story from the command line
        if let Some(input) = self.input.take() {
            writeln!(self.output, "{}", render::message_from_user(&input))?;
            let outcome = self.send_prompt(&input).await?;
            return Ok(match outcome {
                SendOutcome::Completed | SendOutcome::Cancelled => ExitCode::SUCCESS,
                SendOutcome::Rejected | SendOutcome::Failed(_) => ExitCode::FAILURE,
            });
        }

        if self.interactive {
            self.render_screen()?;
            self.run_interactive().await?;
        }

        Ok(ExitCode::SUCCESS)
    }

    fn render_screen(&mut self) -> Result<()> {
        writeln!(self.output, "{}\n", render::header(self.session.auth().is_logged_in()))?;
        if self.session.sidebar().is_open() {
            writeln!(
                self.output,
                "{}",
                render::sidebar(self.session.sidebar(), self.session.auth().is_logged_in())
            )?;
        }
        for message in self.session.conversation().get_messages() {
            writeln!(self.output, "{}", render::message(message))?;
        }
        writeln!(self.output, "{}", prompt::INPUT_PLACEHOLDER)?;
        Ok(())
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;

        loop {
            if self.session.auth().is_open() {
                self.run_auth_dialog(&mut rl)?;
                continue;
            }

            let prompt_text = generate_prompt(None);
            match rl.readline(&prompt_text) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line.as_str());

                    match self.handle_input(&line).await {
                        Ok(Flow::Quit) => break,
                        Ok(Flow::Continue) => {}
                        Err(e) => {
                            error!("failed to handle input: {e}");
                            writeln!(self.output, "Error: {}", e)?;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_input(&mut self, input: &str) -> Result<Flow> {
        match Command::parse(input) {
            Command::Help => {
                writeln!(self.output, "{}", HELP_TEXT)?;
            }
            Command::Quit => return Ok(Flow::Quit),
            Command::NewStory => {
                self.session.new_story();
                execute!(self.output, Clear(ClearType::All), MoveTo(0, 0))?;
                self.render_screen()?;
            }
            Command::ToggleSidebar => {
                self.session.sidebar_mut().toggle();
                if self.session.sidebar().is_open() {
                    writeln!(
                        self.output,
                        "{}",
                        render::sidebar(self.session.sidebar(), self.session.auth().is_logged_in())
                    )?;
                } else {
                    writeln!(self.output, "Sidebar hidden.")?;
                }
            }
            Command::OpenAuth(mode) => {
                if self.session.auth().is_logged_in() {
                    writeln!(self.output, "You are already logged in.")?;
                } else {
                    self.session.auth_mut().open(mode);
                }
            }
            Command::Logout => {
                self.session.auth_mut().logout();
                writeln!(self.output, "{}", render::header(false))?;
            }
            Command::Unknown(command) => {
                writeln!(self.output, "Unknown command {command}. Type /help for the list.")?;
            }
            Command::Prompt(text) => {
                self.send_prompt(&text).await?;
            }
        }

        Ok(Flow::Continue)
    }

    /// Stream a story for `text`, printing chunks as they arrive.
    async fn send_prompt(&mut self, text: &str) -> Result<SendOutcome> {
        self.session.set_input(text);
        if !self.session.can_send() {
            return Ok(SendOutcome::Rejected);
        }

        writeln!(self.output, "{}", render::label(Role::Ai))?;
        write!(self.output, "{}", render::typing_indicator())?;
        self.output.flush()?;

        let output = &mut self.output;
        let mut printed_any = false;
        let mut write_result: io::Result<()> = Ok(());

        let outcome = self
            .session
            .send(&*self.backend, interrupted(), |event| {
                if write_result.is_ok() {
                    write_result = print_event(output, text, &mut printed_any, event);
                }
            })
            .await;

        write_result?;

        if let SendOutcome::Failed(err) = &outcome {
            debug!("story request failed: {err}");
        }
        Ok(outcome)
    }

    fn run_auth_dialog(&mut self, rl: &mut Editor<()>) -> Result<()> {
        let mode = self.session.auth().mode();
        writeln!(self.output, "\n{}", render::auth_dialog(mode))?;

        let full_name = if mode == AuthMode::Signup {
            match self.read_field(rl, "Full Name")? {
                Some(value) => value,
                None => return Ok(()),
            }
        } else {
            String::new()
        };
        let Some(email) = self.read_field(rl, "Email Address")? else {
            return Ok(());
        };
        let Some(password) = self.read_field(rl, "Password")? else {
            return Ok(());
        };

        writeln!(self.output, "[{}]", mode.submit_label())?;
        let form = AuthForm {
            full_name,
            email,
            password,
        };
        match self.session.auth_mut().submit(&form) {
            Ok(()) => writeln!(self.output, "{}\n", render::header(true))?,
            Err(e) => writeln!(self.output, "{}", render::error_text(&e.to_string()))?,
        }
        Ok(())
    }

    /// Read one form field. `None` means the dialog changed (switched mode
    /// or closed) and the form should start over.
    fn read_field(&mut self, rl: &mut Editor<()>, field: &str) -> Result<Option<String>> {
        let line = match rl.readline(&field_prompt(field)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                self.session.auth_mut().close();
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match DialogCommand::parse(&line) {
            Some(DialogCommand::SwitchMode) => {
                self.session.auth_mut().toggle_mode();
                Ok(None)
            }
            Some(DialogCommand::Cancel) => {
                self.session.auth_mut().close();
                Ok(None)
            }
            None => Ok(Some(line.trim().to_string())),
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler can't be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn print_event(
    output: &mut Box<dyn Write>,
    prompt: &str,
    printed_any: &mut bool,
    event: ReplyEvent<'_>,
) -> io::Result<()> {
    match event {
        ReplyEvent::Chunk(chunk) => {
            if !*printed_any {
                execute!(output, MoveToColumn(0), Clear(ClearType::UntilNewLine))?;
                write!(output, "{} ", render::content_start(prompt))?;
                *printed_any = true;
            }
            write!(output, "{chunk}")?;
        }
        ReplyEvent::Finished => {
            if !*printed_any {
                execute!(output, MoveToColumn(0), Clear(ClearType::UntilNewLine))?;
            }
            writeln!(output, "\n")?;
        }
        ReplyEvent::Cancelled => {
            writeln!(output, "\n(stopped)\n")?;
        }
        ReplyEvent::Failed(text) => {
            execute!(output, MoveToColumn(0), Clear(ClearType::UntilNewLine))?;
            if *printed_any {
                writeln!(output)?;
            }
            writeln!(output, "{}\n", render::error_text(text))?;
        }
    }
    output.flush()
}
