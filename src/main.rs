// src/main.rs
// tutor-stream - command line front end for the local Ollama tutor

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;
use tutor_stream::config::file::config_dir;
use tutor_stream::study::{Difficulty, EvaluationParams, MaterialParams, TaskParams};
use tutor_stream::{ChatSession, StudyGenerator, TutorConfig, TutorError};

#[derive(Parser)]
#[command(name = "tutor-stream")]
#[command(about = "Chat with a local Ollama tutor and generate study tasks")]
#[command(version)]
struct Cli {
    /// Ollama base URL (overrides OLLAMA_HOST and the config file)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Model tag (overrides TUTOR_MODEL and the config file)
    #[arg(long, global = true)]
    model: Option<String>,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default). Ctrl-C stops the current reply.
    Chat,

    /// Ask a single question and stream the reply
    Ask {
        /// The message to send
        text: String,

        /// Ask about this lesson instead (one-shot, outside the chat memory)
        #[arg(long)]
        lesson: Option<String>,

        /// Extra lesson context, used with --lesson
        #[arg(long, default_value = "")]
        context: String,
    },

    /// Generate an exercise as JSON
    Task {
        #[command(flatten)]
        topic: TopicArgs,

        /// easy, medium or hard
        #[arg(short, long, default_value = "medium")]
        difficulty: Difficulty,
    },

    /// Generate study material as JSON
    Material {
        #[command(flatten)]
        topic: TopicArgs,
    },

    /// Grade an answer as JSON
    Evaluate {
        #[arg(short, long)]
        question: String,

        #[arg(short, long)]
        answer: String,

        /// The exercise the question belongs to
        #[arg(short, long, default_value = "")]
        task: String,
    },

    /// Check that the Ollama server is reachable
    Ping,

    /// Show the resolved configuration and validation report
    Config,
}

#[derive(Args)]
struct TopicArgs {
    #[arg(short, long)]
    subject: String,

    #[arg(short, long)]
    topic: String,

    #[arg(long, default_value = "")]
    subtopic: String,

    /// Additional requirements
    #[arg(short, long, default_value = "")]
    custom: String,
}

/// Write one chunk to `out`. On the first failed write `closed` is raised so
/// the caller can stop the generation.
fn write_chunk<W: Write>(out: &mut W, chunk: &str, closed: &CancellationToken) {
    if closed.is_cancelled() {
        return;
    }
    if let Err(e) = out.write_all(chunk.as_bytes()).and_then(|_| out.flush()) {
        debug!(error = %e, "stdout write failed, stopping generation");
        closed.cancel();
    }
}

async fn reply_with_interrupt(session: &ChatSession, text: &str) -> tutor_stream::Result<String> {
    let stdout_closed = CancellationToken::new();
    let respond = session.respond(
        text,
        |chunk| write_chunk(&mut std::io::stdout().lock(), chunk, &stdout_closed),
        true,
    );
    tokio::pin!(respond);

    let reply = tokio::select! {
        res = &mut respond => res,
        _ = stdout_closed.cancelled() => {
            session.client().cancel().await;
            respond.await
        }
        _ = tokio::signal::ctrl_c() => {
            session.client().cancel().await;
            respond.await
        }
    };

    if stdout_closed.is_cancelled() {
        return Err(TutorError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "stdout closed",
        )));
    }
    reply
}

async fn run_chat(session: ChatSession) -> Result<()> {
    if !session.client().probe().await {
        warn!(host = %session.client().base_url(), "Ollama is not reachable, replies will fail");
    }

    eprintln!("Chatting with {} (empty line or Ctrl-D to quit)", session.client().model());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            break;
        }

        match reply_with_interrupt(&session, &line).await {
            Ok(_) => println!(),
            // Fallback message was already printed through the chunk callback
            Err(TutorError::Transport(_)) => println!(),
            Err(TutorError::Io(e)) => {
                warn!(error = %e, "Output closed, ending chat");
                break;
            }
            Err(e) => eprintln!("{}", e.user_message()),
        }
    }

    info!(turns = session.memory_len(), "Chat ended");
    Ok(())
}

async fn run_lesson(
    session: ChatSession,
    lesson: String,
    context: String,
    text: String,
) -> Result<()> {
    let generator = StudyGenerator::new(Arc::clone(session.client()));
    match generator.ask_lesson(&lesson, &context, &text).await {
        Ok(answer) => {
            println!("{}", answer);
            Ok(())
        }
        Err(e) => bail!(e.user_message()),
    }
}

async fn run_ask(session: ChatSession, text: String) -> Result<()> {
    match reply_with_interrupt(&session, &text).await {
        Ok(_) => {
            println!();
            Ok(())
        }
        Err(e) => {
            println!();
            bail!(e.user_message())
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_structured(session: ChatSession, command: Commands) -> Result<()> {
    let generator = StudyGenerator::new(Arc::clone(session.client()));

    let printed = match command {
        Commands::Task { topic, difficulty } => generator
            .generate_task(TaskParams {
                subject: topic.subject,
                topic: topic.topic,
                subtopic: topic.subtopic,
                difficulty,
                custom: topic.custom,
            })
            .await
            .map(|task| print_json(&task)),
        Commands::Material { topic } => generator
            .generate_material(MaterialParams {
                subject: topic.subject,
                topic: topic.topic,
                subtopic: topic.subtopic,
                custom: topic.custom,
            })
            .await
            .map(|material| print_json(&material)),
        Commands::Evaluate {
            question,
            answer,
            task,
        } => generator
            .evaluate_answer(EvaluationParams {
                task,
                question,
                answer,
            })
            .await
            .map(|result| print_json(&result)),
        _ => return Ok(()),
    };

    match printed {
        Ok(res) => res,
        Err(e) => {
            if let Some(raw) = e.raw_output() {
                info!(raw = %raw, "Unusable model output");
            }
            bail!(e.user_message())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env files (global first, then project - project overrides)
    let _ = dotenvy::from_path(config_dir().join(".env"));
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = TutorConfig::load();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(model) = cli.model {
        config.model = model;
    }

    let validation = config.validate();
    for warning in validation.warnings() {
        warn!("{}", warning);
    }

    let command = cli.command.unwrap_or(Commands::Chat);
    if let Commands::Config = command {
        println!("host:        {}", config.host);
        println!("model:       {}", config.model);
        println!("trim_limit:  {}", config.trim_limit);
        println!("trim_cut:    {}", config.trim_cut);
        println!("{}", validation.report());
        return Ok(());
    }

    if !validation.is_valid() {
        bail!("Invalid configuration\n{}", validation.report());
    }

    let session = ChatSession::from_config(&config)?;

    match command {
        Commands::Chat => run_chat(session).await?,
        Commands::Ask {
            text,
            lesson: Some(lesson),
            context,
        } => run_lesson(session, lesson, context, text).await?,
        Commands::Ask { text, .. } => run_ask(session, text).await?,
        Commands::Ping => {
            if session.client().probe().await {
                println!("Ollama reachable at {}", session.client().base_url());
            } else {
                bail!("Ollama not reachable at {}", session.client().base_url());
            }
        }
        structured => run_structured(session, structured).await?,
    }

    Ok(())
}
