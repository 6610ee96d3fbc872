mod config;
mod console;

use crate::config::Config;
use anyhow::{Context, Result};
use clap::Parser;
use interview_core::prompts::PromptSet;
use interview_core::{InterviewSetup, InterviewType, SessionController, UserAction};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::mpsc;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Rehearse a job interview in the terminal")]
struct Cli {
    /// Company you are interviewing with
    #[arg(long)]
    company: String,
    /// Role you are interviewing for
    #[arg(long)]
    role: String,
    /// technical, behavioral, system design, business, marketing or finance
    #[arg(long, default_value = "technical")]
    interview_type: String,
    /// Upper bound on the number of questions
    #[arg(long)]
    questions: Option<usize>,
    /// Skip the AI service and use prepared questions
    #[arg(long)]
    offline: bool,
    /// Start listening as soon as each question has been asked
    #[arg(long)]
    auto_listen: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Configuration loaded successfully. Starting interview coach...");
    if config.is_missing_credential() {
        tracing::warn!(
            "No API key set for {:?}; the session will ask for one",
            config.provider
        );
    }

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();

    // --- 4. Load Prompts ---
    let prompts = match &config.prompts_dir {
        Some(dir) => PromptSet::from_dir(dir).context("Failed to load LLM prompts")?,
        None => PromptSet::default(),
    };

    // --- 5. Build the Session ---
    let setup = InterviewSetup::new(
        args.company,
        args.role,
        InterviewType::parse(&args.interview_type),
    );
    let mut session_config = config.session_config(prompts);
    if let Some(questions) = args.questions {
        session_config.total_questions = questions;
    }
    session_config.offline |= args.offline;
    session_config.auto_listen |= args.auto_listen;

    let (synthesizer, synthesis_events) = console::ConsoleSynthesizer::new();
    let mut controller = SessionController::new(setup, session_config, config.model())
        .with_synthesizer(Box::new(synthesizer), synthesis_events);
    let mut events = controller.subscribe();

    let (action_tx, action_rx) = mpsc::channel::<UserAction>(32);
    action_tx
        .send(UserAction::Start)
        .await
        .context("Failed to start the session")?;
    println!("{}\n", console::HELP);

    // --- 6. Spawn the Terminal Tasks ---
    let advancing = Arc::new(AtomicBool::new(false));
    let printer_advancing = Arc::clone(&advancing);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            console::track_status(&event, &printer_advancing);
            if let Some(line) = console::render_event(&event) {
                println!("{line}");
            }
        }
    });

    // Plain thread: a blocked stdin read must not hold up runtime shutdown.
    let input_tx = action_tx.clone();
    std::thread::spawn(move || {
        console::forward_lines(std::io::stdin().lock(), &advancing, &input_tx);
    });

    let interrupt_tx = action_tx;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, ending the interview...");
            let _ = interrupt_tx.send(UserAction::End).await;
        }
    });

    // --- 7. Run to Completion ---
    let report = controller.run(action_rx).await;
    if let Err(e) = printer.await {
        tracing::warn!("Event printer stopped abnormally: {}", e);
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize the report")?
    );
    tracing::info!("Shutting down...");
    Ok(())
}
