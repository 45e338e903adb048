pub mod cli;
pub mod command;
pub mod config;
pub mod console;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod server;
pub mod speech;

use cli::{ Args, RunMode };
use config::prompt::{ load_prompts, PromptConfig };
use console::{ Console, TerminalSink };
use history::{ initialize_session_store, PersistTurn };
use llm::client::HttpRelayClient;
use llm::GenerationParams;
use log::{ info, warn };
use server::Server;
use speech::{ CommandSpeech, SpeechHook };
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Run Mode: {}", args.mode);
    match args.mode {
        RunMode::Serve => {
            info!("Server Address: {}", args.server_addr);
            info!("Upstream URL: {}", args.upstream_url);
            info!("Upstream API Key Set: {}", args.upstream_api_key.is_some());
            info!("Upstream Connect Timeout: {}s", args.upstream_connect_timeout_secs);
            info!("TLS Enabled: {}", args.enable_tls);
        }
        RunMode::Console => {
            info!("Relay URL: {}", args.relay_url);
            info!("Relay Connect Timeout: {}s", args.relay_connect_timeout_secs);
            info!("Chat Model: {}", args.chat_model);
            info!("Max Tokens: {}", args.max_tokens);
            info!("Temperature: {}", args.temperature);
            info!("Session Store Type: {}", args.history_type);
            info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("(built-in)"));
            info!("Speech Command: {}", args.speech_command.as_deref().unwrap_or("(off)"));
        }
    }
    info!("-------------------------");

    match args.mode {
        RunMode::Serve => {
            let server = Server::new(args)?;
            server.run().await
        }
        RunMode::Console => run_console(args).await,
    }
}

async fn run_console(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let prompts = match &args.prompts_path {
        Some(path) => load_prompts(path)?,
        None => PromptConfig::default(),
    };
    let params = GenerationParams {
        model: args.chat_model.clone(),
        max_tokens: args.max_tokens,
        temperature: args.temperature,
    };

    let transport = Arc::new(
        HttpRelayClient::new(
            args.relay_url.clone(),
            Duration::from_secs(args.relay_connect_timeout_secs)
        )?
    );
    let store = initialize_session_store(&args)?;

    let sink = TerminalSink::new(std::io::stdout(), prompts.assistant_label.clone());
    let mut console = Console::new(sink, transport, store.clone(), prompts, params).with_hook(
        Arc::new(PersistTurn::new(store))
    );

    if let Some(path) = &args.prompts_path {
        console = console.with_prompts_path(path);
    }

    match args.speech_command.as_deref().and_then(CommandSpeech::parse) {
        Some(speech) => {
            info!("Replies will be spoken with '{}'", speech.program());
            console = console.with_hook(Arc::new(SpeechHook::new(Arc::new(speech))));
        }
        None if args.speech_command.is_some() => {
            warn!("SPEECH_COMMAND is blank, speech output disabled");
        }
        None => {}
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    console.run(stdin).await;
    Ok(())
}
