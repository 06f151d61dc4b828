//! List saved sessions.

use anyhow::Result;
use std::path::Path;
use sync_client::{SavedSession, SessionStore};

use crate::config::now_secs;
use crate::store::FileSessionStore;

/// Run the sessions command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let sessions = FileSessionStore::new(data_dir).list().await?;
    if sessions.is_empty() {
        println!("No saved sessions.");
        println!();
        println!("Run 'tablesync host --name <name>' to start one.");
        return Ok(());
    }
    for session in &sessions {
        println!("{}", summary(session, now_secs()));
    }
    Ok(())
}

/// One-line description of a saved session.
pub fn summary(session: &SavedSession, now: u64) -> String {
    let code = session
        .lobby_code
        .as_ref()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "local".to_string());
    format!(
        "{}  {:<6}  {:<20}  {} players  {}",
        session.id,
        code,
        session.name,
        session.game_state.players.len(),
        format_timestamp(session.created_at, now)
    )
}

/// Format a Unix timestamp relative to `now`.
fn format_timestamp(ts: u64, now: u64) -> String {
    let diff = now.saturating_sub(ts);

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_client::{GameSnapshot, LobbyCode};
    use tempfile::tempdir;

    #[tokio::test]
    async fn sessions_without_any_saved() {
        let dir = tempdir().unwrap();
        assert!(run(dir.path()).await.is_ok());
    }

    #[test]
    fn summary_shows_code_or_local() {
        let mut session = SavedSession::new("Friday", 1_000, GameSnapshot::empty());
        assert!(summary(&session, 1_030).contains("local"));

        session.lobby_code = Some(LobbyCode::parse("ABC234").unwrap());
        let line = summary(&session, 1_000 + 7200);
        assert!(line.contains("ABC234"));
        assert!(line.contains("Friday"));
        assert!(line.contains("2 hours ago"));
    }

    #[test]
    fn format_timestamp_works() {
        let now = 1_000_000;
        assert_eq!(format_timestamp(now, now), "just now");
        assert!(format_timestamp(now - 120, now).contains("minutes"));
        assert!(format_timestamp(now - 7200, now).contains("hours"));
        assert!(format_timestamp(now - 172800, now).contains("days"));
    }
}
