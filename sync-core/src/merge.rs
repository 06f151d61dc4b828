//! Client-side snapshot merge.
//!
//! A client overwrites its mirror with every incoming snapshot, except for
//! device-local player fields (e.g. which counter this screen shows), which
//! are kept per player id.

use sync_types::{GameSnapshot, PlayerEntry};

/// Player fields preserved from the local mirror by default.
pub const DEFAULT_LOCAL_FIELDS: &[&str] = &["activeCounter"];

/// Merge incoming players over the local ones.
///
/// For each incoming player with a matching local id, every field listed in
/// `local_fields` that the local entry has is kept; all other fields come
/// from the incoming entry. Players without a local match are taken as-is.
/// Order and membership follow the incoming list.
pub fn merge_players<S: AsRef<str>>(
    local: &[PlayerEntry],
    incoming: Vec<PlayerEntry>,
    local_fields: &[S],
) -> Vec<PlayerEntry> {
    incoming
        .into_iter()
        .map(|mut player| {
            if let Some(mine) = local.iter().find(|p| p.id == player.id) {
                for field in local_fields {
                    if let Some(value) = mine.fields.get(field.as_ref()) {
                        player
                            .fields
                            .insert(field.as_ref().to_string(), value.clone());
                    }
                }
            }
            player
        })
        .collect()
}

/// Merge a whole snapshot: players via [`merge_players`], everything else replaced.
pub fn merge_snapshot<S: AsRef<str>>(
    local: &GameSnapshot,
    incoming: GameSnapshot,
    local_fields: &[S],
) -> GameSnapshot {
    GameSnapshot {
        players: merge_players(&local.players, incoming.players, local_fields),
        settings: incoming.settings,
        game_started: incoming.game_started,
        extra_mode_state: incoming.extra_mode_state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn player(id: &str, life: i64, active: &str) -> PlayerEntry {
        PlayerEntry::new(id)
            .with_field("life", life)
            .with_field("activeCounter", active)
    }

    #[test]
    fn keeps_local_display_field_takes_the_rest() {
        let local = vec![player("p1", 40, "poison")];
        let incoming = vec![player("p1", 33, "life")];
        let merged = merge_players(&local, incoming, DEFAULT_LOCAL_FIELDS);
        assert_eq!(merged[0].fields["life"], json!(33));
        assert_eq!(merged[0].fields["activeCounter"], json!("poison"));
    }

    #[test]
    fn new_players_taken_as_is() {
        let merged = merge_players(&[], vec![player("p2", 20, "life")], DEFAULT_LOCAL_FIELDS);
        assert_eq!(merged, vec![player("p2", 20, "life")]);
    }

    #[test]
    fn local_without_field_takes_incoming_value() {
        let local = vec![PlayerEntry::new("p1").with_field("life", 1)];
        let merged = merge_players(&local, vec![player("p1", 5, "energy")], DEFAULT_LOCAL_FIELDS);
        assert_eq!(merged[0].fields["activeCounter"], json!("energy"));
    }

    #[test]
    fn departed_players_are_dropped() {
        let local = vec![player("p1", 1, "life"), player("gone", 1, "life")];
        let merged = merge_players(&local, vec![player("p1", 2, "life")], DEFAULT_LOCAL_FIELDS);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "p1");
    }

    #[test]
    fn snapshot_equals_incoming_except_local_fields() {
        let local = GameSnapshot {
            players: vec![player("p1", 40, "tax"), player("p2", 40, "life")],
            settings: json!({"start": 40}),
            game_started: false,
            extra_mode_state: None,
        };
        let incoming = GameSnapshot {
            players: vec![player("p1", 31, "life"), player("p2", 38, "life")],
            settings: json!({"start": 20}),
            game_started: true,
            extra_mode_state: Some(json!({"planechase": 3})),
        };

        let merged = merge_snapshot(&local, incoming.clone(), DEFAULT_LOCAL_FIELDS);

        let strip = |s: &GameSnapshot| {
            let mut s = s.clone();
            for p in &mut s.players {
                p.fields.remove("activeCounter");
            }
            s
        };
        assert_eq!(strip(&merged), strip(&incoming));
        assert_eq!(merged.players[0].fields["activeCounter"], json!("tax"));
    }

    #[test]
    fn custom_field_list() {
        let local = vec![PlayerEntry::new("p1").with_field("zoom", 2)];
        let incoming = vec![PlayerEntry::new("p1").with_field("zoom", 1).with_field("life", 3)];
        let fields = vec!["zoom".to_string()];
        let merged = merge_players(&local, incoming, &fields[..]);
        assert_eq!(merged[0].fields["zoom"], json!(2));
        assert_eq!(merged[0].fields["life"], json!(3));
    }
}
