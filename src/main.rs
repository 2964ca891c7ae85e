//! The Mirror
//!
//! Journaling, guided meditation and a council of mentor personas.
//!
//! Run with: cargo run -- --serve
//! Or chat from the terminal: cargo run

use anyhow::{Context, Result};
use mirror_council::{
    config::{Settings, DEMO_USER_ID},
    meditation,
    personas::PersonaRegistry,
    selector::{KeywordSelector, MentorSelector},
    server::{self, AppState},
    CouncilError,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let settings = Settings::from_env()?;

    // COMMAND MODE
    if args.len() > 1 {
        match args[1].as_str() {
            "--serve" => {
                let mut settings = settings;
                if let Some(port) = args
                    .iter()
                    .find_map(|a| a.strip_prefix("--port="))
                    .and_then(|p| p.parse::<u16>().ok())
                {
                    settings.bind_addr = rebind_port(&settings.bind_addr, port);
                }
                return run_server(settings).await;
            }
            "--personas" => {
                let registry = PersonaRegistry::load_or_builtins(settings.personas_path.as_deref());
                println!("{}", serde_json::to_string_pretty(&registry.summaries())?);
                return Ok(());
            }
            "--select" => {
                let text = args[2..].join(" ");
                if text.trim().is_empty() {
                    println!("Usage: --select <text>");
                    return Ok(());
                }
                let registry = PersonaRegistry::load_or_builtins(settings.personas_path.as_deref());
                let picked = KeywordSelector.select(&registry, &text, "");
                println!("{} ({}) score {}", picked.persona.name, picked.persona.id, picked.score);
                return Ok(());
            }
            "--stages" => {
                println!("{}", serde_json::to_string_pretty(&meditation::plan())?);
                return Ok(());
            }
            "--repl" => {}
            other => {
                println!("Unknown option {}\n", other);
                print_usage();
                return Ok(());
            }
        }
    }

    // REPL MODE: only if explicitly requested or no args
    settings.require_api_key()?;
    let state = AppState::from_settings(settings)?;
    tracing::info!("Journal at {:?}", state.settings.db_path());
    run_repl(&state).await
}

fn print_usage() {
    println!("Usage: mirror [--serve [--port=N] | --personas | --select <text> | --stages | --repl]");
}

/// Replace the port in a host:port address
fn rebind_port(addr: &str, port: u16) -> String {
    let host = addr.rsplit_once(':').map(|(host, _)| host).unwrap_or(addr);
    format!("{}:{}", host, port)
}

async fn run_server(settings: Settings) -> Result<()> {
    settings.require_api_key()?;
    if settings.is_production() {
        tracing::info!("Running in production mode");
    }
    let addr = settings.bind_addr.clone();
    let state = Arc::new(AppState::from_settings(settings)?);
    server::serve(state, &addr).await
}

async fn run_repl(state: &AppState) -> Result<()> {
    use std::io::{self, BufRead, Write};

    println!("The Mirror");
    println!("==========");
    println!("Share what's on your mind, /help for commands, or 'quit' to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("Failed to read input")? == 0 {
            break;
        }
        let line = line.trim();

        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }

        if line.starts_with('/') {
            handle_command(state, line).await?;
            continue;
        }

        match state.council.handle_message(DEMO_USER_ID, line).await {
            Ok(reply) => {
                let speaker = reply
                    .persona_id
                    .as_deref()
                    .and_then(|id| state.council.registry().get(id))
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| "Guide".to_string());
                println!("\n[{}] {}:\n{}\n", reply.stage, speaker, reply.assistant_text);
            }
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    Ok(())
}

async fn handle_command(state: &AppState, line: &str) -> Result<()> {
    let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
    let arg = arg.trim();

    match cmd {
        "/reset" => {
            state.council.reset_session(DEMO_USER_ID).await;
            println!("Session cleared. The next message starts fresh.");
        }
        "/mentor" => {
            if arg.is_empty() {
                println!("Usage: /mentor <persona_id>");
                return Ok(());
            }
            match state.council.select_mentor_explicitly(DEMO_USER_ID, arg).await {
                Ok(persona) => println!("{}, {} is listening.", persona.name, persona.title),
                Err(e) => println!("{}", e),
            }
        }
        "/exit-mentor" => match state.council.exit_mentor(DEMO_USER_ID).await {
            Ok(()) => println!("Back to the beginning. Tell me what's on your mind."),
            Err(CouncilError::NoActiveSession(_)) => println!("No conversation yet."),
            Err(e) => println!("{}", e),
        },
        "/personas" => {
            for persona in state.council.list_personas() {
                println!("  {:<16} {} - {} ({})", persona.id, persona.name, persona.title, persona.era);
            }
        }
        "/session" => match state.council.get_session(DEMO_USER_ID).await {
            Ok(session) => println!(
                "{:?}, {} turn(s), mentor: {}",
                session.phase(),
                session.turns().len(),
                session.pinned_persona().unwrap_or("none")
            ),
            Err(e) => println!("{}", e),
        },
        "/help" => {
            println!("Commands:");
            println!("  /reset            Start over");
            println!("  /mentor <id>      Talk to a specific mentor");
            println!("  /exit-mentor      Leave the current mentor");
            println!("  /personas         List mentors");
            println!("  /session          Show conversation state");
            println!("  quit              Exit");
        }
        _ => println!("Unknown command: {} (try /help)", cmd),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebind_port() {
        assert_eq!(rebind_port("0.0.0.0:8000", 9000), "0.0.0.0:9000");
        assert_eq!(rebind_port("localhost", 9000), "localhost:9000");
    }
}
