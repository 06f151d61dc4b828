//! Interactive session loop shared by `host`, `join` and `resume`.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use sync_client::{
    ConnectionState, LobbyCode, Role, Session, SessionEnd, SessionEvent, SessionHandle,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::DeviceConfig;
use crate::game::LifeTable;
use crate::store::FileSessionStore;

/// How to enter the session.
#[derive(Debug, Clone)]
pub enum Mode {
    /// Create a lobby and host a fresh table.
    Host {
        /// Saved session name.
        name: String,
        /// Number of players at the table.
        players: usize,
        /// Starting life.
        life: i64,
    },
    /// Join a lobby by code.
    Join {
        /// Lobby code.
        code: String,
    },
    /// Resume a saved session as host.
    Resume {
        /// Saved session id.
        session_id: String,
    },
}

/// A parsed line of user input.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Submit a game action.
    Action(Value),
    /// Print the table.
    Show,
    /// Start the game (host).
    Start,
    /// Pause the lobby (host).
    Suspend,
    /// End the lobby for everyone (host).
    Close,
    /// Leave the session.
    Leave,
    /// Print the command list.
    Help,
    /// Blank line.
    Empty,
    /// Anything else.
    Unknown(String),
}

impl Input {
    /// Parse one line.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Input::Empty,
            "show" | "s" => Input::Show,
            "start" => Input::Start,
            "suspend" => Input::Suspend,
            "close" => Input::Close,
            "leave" | "quit" | "exit" => Input::Leave,
            "help" | "?" => Input::Help,
            other => match LifeTable::parse_action(other) {
                Some(action) => Input::Action(action),
                None => Input::Unknown(other.to_string()),
            },
        }
    }
}

const HELP: &str = "\
Commands:
  p1 -3     change a player's life
  show      print the table
  start     start the game (host)
  suspend   pause the lobby for a later resume (host)
  close     end the lobby for everyone (host)
  leave     leave the session";

/// Run the interactive loop.
pub async fn run(data_dir: &Path, relay_url: &str, mode: Mode) -> Result<()> {
    let device = DeviceConfig::load(data_dir).await?;
    let session = Session::new(device.session_config(relay_url))
        .with_session_store(Arc::new(FileSessionStore::new(data_dir)));

    let mut handle = match mode {
        Mode::Host {
            name,
            players,
            life,
        } => session
            .create(&name, Box::new(LifeTable::new(players, life)))
            .await
            .context("Could not create lobby")?,
        Mode::Join { code } => {
            let code = LobbyCode::parse(&code).context("Invalid lobby code")?;
            session
                .join(&code, Box::new(LifeTable::default()))
                .await
                .with_context(|| format!("Could not join lobby {}", code))?
        }
        Mode::Resume { session_id } => session
            .resume(&session_id, Box::new(LifeTable::default()))
            .await
            .with_context(|| format!("Could not resume session {}", session_id))?,
    };

    print_banner(&handle);
    if handle.role() == Role::Host {
        println!("{}", LifeTable::render(&handle.snapshot().await?));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    handle.leave().await?;
                    break;
                };
                if let Err(e) = on_input(&handle, Input::parse(&line)).await {
                    println!("! {}", e);
                }
            }
            event = handle.next_event() => {
                let Some(event) = event else { break };
                if let Some(text) = describe(&event) {
                    println!("{}", text);
                }
                if matches!(event, SessionEvent::Ended(_)) {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn print_banner(handle: &SessionHandle) {
    println!();
    match handle.role() {
        Role::Host => {
            println!("Hosting lobby {}", handle.code());
            if let Some(id) = handle.session_id() {
                println!("Session id: {} (use 'tablesync resume {}' later)", id, id);
            }
            println!("Share the code with the other players.");
        }
        Role::Client => println!("Joined lobby {}", handle.code()),
    }
    println!("Type 'help' for commands.");
    println!();
}

async fn on_input(handle: &SessionHandle, input: Input) -> Result<()> {
    match input {
        Input::Action(action) => handle.submit(action).await?,
        Input::Show => println!("{}", LifeTable::render(&handle.snapshot().await?)),
        Input::Start => handle.start_game().await?,
        Input::Suspend => handle.suspend().await?,
        Input::Close => handle.close().await?,
        Input::Leave => handle.leave().await?,
        Input::Help => println!("{}", HELP),
        Input::Empty => {}
        Input::Unknown(text) => println!("Unknown command '{}'. Type 'help'.", text),
    }
    Ok(())
}

/// Text to print for a session event, if any.
pub fn describe(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::StateChanged(ConnectionState::Connected) => Some("* connected".into()),
        SessionEvent::StateChanged(_) => None,
        SessionEvent::Reconnecting { attempt, delay } => Some(format!(
            "* connection lost, retry {} in {:.1}s",
            attempt,
            delay.as_secs_f64()
        )),
        SessionEvent::SnapshotApplied(snapshot) => Some(LifeTable::render(snapshot)),
        SessionEvent::GameStarted => Some("* game started".into()),
        SessionEvent::PeersChanged(roster) => {
            let names: Vec<&str> = roster.iter().map(|m| m.display_name.as_str()).collect();
            Some(format!("* players: {}", names.join(", ")))
        }
        SessionEvent::Ended(end) => Some(match end {
            SessionEnd::Left => "* left the session".to_string(),
            SessionEnd::HostDisconnected => "* the host disconnected".to_string(),
            SessionEnd::HostSuspended => "* the host paused the lobby".to_string(),
            SessionEnd::Closed(reason) => format!("* lobby closed ({:?})", reason),
            SessionEnd::Failed(failure) => format!("* session failed: {:?}", failure),
        }),
    }
}
