use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::{self, ExitCode};

use clap::Parser;
use tracing::{error, info, warn};

use eraflow::bridge::{bridge, BridgeIo, Frontend, GameEvent, Poll};
use eraflow::{Config, GameHost, HostHandle};

#[derive(Parser, Debug)]
#[command(name = "eraflow")]
#[command(about = "Run an era-style game from a directory of Lua scripts")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "eraflow.toml")]
    config: PathBuf,

    /// Override the scripts directory
    #[arg(short, long)]
    scripts: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", args.config.display());
            eprintln!("Using default configuration.");
            Config::default()
        }
    };
    config.apply_env_overrides();
    if let Some(dir) = args.scripts {
        config.game.scripts_dir = dir.display().to_string();
    }

    // Initialize logging
    if let Err(e) = eraflow::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        eraflow::logging::init_console_only(&config.logging.level);
    }

    info!("eraflow - {}", config.game.title);
    info!("Scripts directory: {}", config.game.scripts_dir);

    let (frontend, game_io) = bridge();
    let host = HostHandle::new();

    // The game owns a Lua state, so it lives on its own blocking thread.
    let game_host = host.clone();
    let _game = tokio::task::spawn_blocking(move || run_game(config, game_io, game_host));
    let ui = tokio::task::spawn_blocking(move || drive_console(frontend));

    tokio::select! {
        outcome = ui => match outcome {
            Ok(Some(Ok(()))) => ExitCode::SUCCESS,
            Ok(Some(Err(message))) => {
                eprintln!("Game ended with error: {message}");
                ExitCode::FAILURE
            }
            Ok(None) => {
                error!("game thread exited without reporting");
                ExitCode::FAILURE
            }
            Err(e) => {
                error!("UI thread failed: {}", e);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling game");
            host.cancel();
            // The UI thread may be parked on stdin; do not wait for it.
            process::exit(130);
        }
    }
}

fn run_game(config: Config, io: BridgeIo, host: HostHandle) {
    let reporter = io.reporter();
    let result = GameHost::new(config, io, host).and_then(|mut game| {
        game.load_configured_scripts()?;
        game.run()
    });
    reporter.report(&result);
}

/// Relay game output to stdout and stdin lines to the game.
///
/// Returns the game's outcome once it reports one, `None` if it vanished.
fn drive_console(frontend: Frontend) -> Option<Result<(), String>> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    loop {
        let event = match frontend.next_event() {
            Poll::Event(event) => event,
            Poll::Closed => return None,
        };
        match event {
            GameEvent::Print(text) => {
                print!("{text}");
                let _ = stdout.flush();
            }
            GameEvent::Caution(text) => eprintln!("[caution] {text}"),
            GameEvent::Prompt(prompt) => {
                if let Some(prompt) = prompt {
                    print!("{prompt}");
                    let _ = stdout.flush();
                }
                let mut line = String::new();
                let input = match stdin.lock().read_line(&mut line) {
                    Ok(0) | Err(_) => None,
                    Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
                };
                frontend.answer(input);
            }
            GameEvent::Finished(outcome) => return Some(outcome),
        }
    }
}
