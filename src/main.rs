mod cli;
mod config;
mod story_client;
mod stream_decoder;

use std::io::{self, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use eyre::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::cli::chat::ChatContext;
use crate::config::StoryConfig;
use crate::story_client::StoryClient;

/// Used when the terminal size can't be read (output piped, no tty).
const FALLBACK_COLUMNS: u16 = 80;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Opening words of a single story to stream, then exit
    #[arg(short, long)]
    input: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Base url of the story service (overrides STORY_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Maximum number of tokens to generate (overrides STORY_MAX_LENGTH)
    #[arg(long, global = true)]
    max_length: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chat session
    Chat {
        /// Opening words of a single story to stream, then exit
        #[arg(short, long)]
        input: Option<String>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
    /// Generate one story and print it
    Generate {
        /// Opening words of the story
        #[arg(short, long)]
        prefix: String,

        /// Print the story as it streams in
        #[arg(long)]
        stream: bool,
    },
    /// Check whether the story service is up and has its model loaded
    Health,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    let verbose = match &cli.command {
        Some(Commands::Chat { verbose, .. }) => *verbose || cli.verbose,
        _ => cli.verbose,
    };

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // stderr, so log lines don't land in the middle of a streamed story
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = StoryConfig::from_env()?.with_overrides(cli.api_url.as_deref(), cli.max_length)?;
    info!(api_url = %config.api_url, max_length = config.max_length, "starting Kaf ki Kahani");

    let client = StoryClient::new(&config);

    match cli.command {
        Some(Commands::Generate { prefix, stream: true }) => {
            print_stream(&client, &prefix, &mut io::stdout().lock()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Generate { prefix, stream: false }) => {
            let story = client.generate(&prefix).await?;
            println!("{story}");
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Health) => {
            let health = client.health().await?;
            println!(
                "{}: status {}, model loaded: {}",
                client.base_url(),
                health.status,
                health.model_loaded
            );
            Ok(if health.model_loaded {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Some(Commands::Chat { input, .. }) => run_chat(client, input).await,
        // Default to chat if no subcommand is provided
        None => run_chat(client, cli.input).await,
    }
}

/// Write a streamed story to `out` as it arrives, prefix first.
async fn print_stream<W: Write>(client: &StoryClient, prefix: &str, out: &mut W) -> Result<()> {
    write!(out, "{prefix} ")?;
    out.flush()?;

    let mut write_result: io::Result<()> = Ok(());
    client
        .generate_stream_with(prefix, |chunk| {
            if write_result.is_ok() {
                write_result = write!(out, "{chunk}").and_then(|()| out.flush());
            }
        })
        .await?;
    write_result?;

    writeln!(out)?;
    Ok(())
}

async fn run_chat(client: StoryClient, input: Option<String>) -> Result<ExitCode> {
    let columns = crossterm::terminal::size()
        .map(|(columns, _)| columns)
        .unwrap_or(FALLBACK_COLUMNS);

    let mut chat_context = ChatContext::new(
        Box::new(io::stdout()),
        input,
        true,
        Box::new(client),
        columns,
    );
    chat_context.run().await
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::config::parse_base_url;

    /// Accepts `limit` bytes, then fails like a closed pipe.
    struct ClosedAfter {
        written: Vec<u8>,
        limit: usize,
    }

    impl Write for ClosedAfter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written.len() + buf.len() > self.limit {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    async fn client_streaming(body: &str) -> (StoryClient, MockServer) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate-stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = StoryClient::new(&StoryConfig {
            api_url: parse_base_url(&server.uri()).unwrap(),
            max_length: 200,
            idle_timeout: None,
        });
        (client, server)
    }

    #[tokio::test]
    async fn print_stream_writes_prefix_then_story() {
        let (client, _server) = client_streaming("دفعہ کا ذکر").await;
        let mut out = Vec::new();

        print_stream(&client, "ایک", &mut out).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "ایک دفعہ کا ذکر\n");
    }

    #[tokio::test]
    async fn print_stream_reports_closed_output() {
        let (client, _server) = client_streaming("دفعہ کا ذکر").await;
        let mut out = ClosedAfter {
            written: Vec::new(),
            limit: "ایک ".len(),
        };

        let err = print_stream(&client, "ایک", &mut out).await.unwrap_err();

        assert_eq!(
            err.downcast_ref::<io::Error>().map(io::Error::kind),
            Some(io::ErrorKind::BrokenPipe)
        );
        assert_eq!(out.written, "ایک ".as_bytes());
    }
}
