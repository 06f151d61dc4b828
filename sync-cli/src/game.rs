//! A toy life-total table to drive sessions from the terminal.

use serde_json::{json, Value};
use sync_client::{GameError, GameSnapshot, GameStore, PlayerEntry};

/// Life totals per player.
///
/// Actions are `{"player": "<id>", "delta": <n>}`.
#[derive(Debug, Default)]
pub struct LifeTable {
    snapshot: GameSnapshot,
}

impl LifeTable {
    /// A table of `players` players starting at `life`.
    pub fn new(players: usize, life: i64) -> Self {
        Self {
            snapshot: GameSnapshot {
                players: (1..=players)
                    .map(|n| {
                        PlayerEntry::new(format!("p{}", n))
                            .with_field("name", format!("Player {}", n))
                            .with_field("life", life)
                    })
                    .collect(),
                settings: json!({ "startingLife": life, "playerCount": players }),
                game_started: false,
                extra_mode_state: None,
            },
        }
    }

    /// Parse `"p1 -3"` into an action.
    pub fn parse_action(line: &str) -> Option<Value> {
        let mut parts = line.split_whitespace();
        let player = parts.next()?;
        let delta: i64 = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(json!({ "player": player, "delta": delta }))
    }

    /// One line per player.
    pub fn render(snapshot: &GameSnapshot) -> String {
        snapshot
            .players
            .iter()
            .map(|p| {
                let name = p.fields.get("name").and_then(Value::as_str).unwrap_or(&p.id);
                let life = p.fields.get("life").and_then(Value::as_i64).unwrap_or(0);
                format!("  {:<4} {:<12} {:>4}", p.id, name, life)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl GameStore for LifeTable {
    fn apply_action(&mut self, action: &Value) -> Result<(), GameError> {
        let id = action
            .get("player")
            .and_then(Value::as_str)
            .ok_or_else(|| GameError::Rejected("missing player".into()))?;
        let delta = action
            .get("delta")
            .and_then(Value::as_i64)
            .ok_or_else(|| GameError::Rejected("missing delta".into()))?;
        let player = self
            .snapshot
            .players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| GameError::Rejected(format!("no player {}", id)))?;
        let life = player.fields.get("life").and_then(Value::as_i64).unwrap_or(0);
        player.fields.insert("life".into(), json!(life + delta));
        Ok(())
    }

    fn current_snapshot(&self) -> GameSnapshot {
        self.snapshot.clone()
    }

    fn restore_snapshot(&mut self, snapshot: GameSnapshot) {
        self.snapshot = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_has_named_players() {
        let table = LifeTable::new(3, 20);
        let snapshot = table.current_snapshot();
        assert_eq!(snapshot.players.len(), 3);
        assert_eq!(snapshot.players[2].id, "p3");
        assert_eq!(snapshot.players[2].fields["life"], 20);
        assert_eq!(snapshot.settings["startingLife"], 20);
    }

    #[test]
    fn applies_deltas() {
        let mut table = LifeTable::new(2, 40);
        table
            .apply_action(&json!({"player": "p2", "delta": -7}))
            .unwrap();
        assert_eq!(table.current_snapshot().players[1].fields["life"], 33);
        assert!(table
            .apply_action(&json!({"player": "p9", "delta": 1}))
            .is_err());
        assert!(table.apply_action(&json!({"player": "p1"})).is_err());
    }

    #[test]
    fn parses_action_lines() {
        assert_eq!(
            LifeTable::parse_action("p1 -3"),
            Some(json!({"player": "p1", "delta": -3}))
        );
        assert_eq!(LifeTable::parse_action("p1"), None);
        assert_eq!(LifeTable::parse_action("p1 x"), None);
        assert_eq!(LifeTable::parse_action("p1 1 2"), None);
    }

    #[test]
    fn renders_rows() {
        let rendered = LifeTable::render(&LifeTable::new(2, 40).current_snapshot());
        assert_eq!(rendered.lines().count(), 2);
        assert!(rendered.contains("Player 1"));
        assert!(rendered.contains("40"));
    }
}
