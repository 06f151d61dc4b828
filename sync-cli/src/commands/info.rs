//! Show a lobby's roster without attaching.

use anyhow::{Context, Result};
use sync_client::{HttpLobbyApi, LobbyApi, LobbyCode, LobbyInfo};

/// Run the info command.
pub async fn run(relay_url: &str, code: &str) -> Result<()> {
    let code = LobbyCode::parse(code).context("Invalid lobby code")?;
    let info = HttpLobbyApi::new(relay_url)
        .lobby_info(&code)
        .await
        .with_context(|| format!("Could not fetch lobby {}", code))?;
    print!("{}", render(&info));
    Ok(())
}

/// Human-readable lobby summary.
pub fn render(info: &LobbyInfo) -> String {
    let mut out = format!("=== lobby {} ===\n", info.code);
    let status = if info.suspended { "suspended" } else { "open" };
    out.push_str(&format!("  Status:  {}\n", status));
    out.push_str(&format!(
        "  Members: {}/{}\n",
        info.members.len(),
        info.capacity
    ));
    for member in &info.members {
        let tag = if member.is_host { " (host)" } else { "" };
        out.push_str(&format!(
            "    {} [{}]{}\n",
            member.display_name, member.peer_id, tag
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_client::{Member, PeerId};

    #[test]
    fn renders_roster() {
        let info = LobbyInfo {
            code: LobbyCode::parse("ABC234").unwrap(),
            host_id: Some(PeerId::new("h")),
            created_at: 1,
            suspended: false,
            capacity: 6,
            members: vec![
                Member {
                    peer_id: PeerId::new("h"),
                    display_name: "Ada".into(),
                    avatar_ref: None,
                    is_host: true,
                },
                Member {
                    peer_id: PeerId::new("b"),
                    display_name: "Bob".into(),
                    avatar_ref: None,
                    is_host: false,
                },
            ],
        };
        let text = render(&info);
        assert!(text.contains("lobby ABC234"));
        assert!(text.contains("Members: 2/6"));
        assert!(text.contains("Ada [h] (host)"));
        assert!(text.contains("Bob [b]\n"));
    }

    #[tokio::test]
    async fn bad_code_is_rejected_before_any_request() {
        let err = run("http://127.0.0.1:1", "O0O0O0").await.unwrap_err();
        assert!(err.to_string().contains("Invalid lobby code"));
    }
}
