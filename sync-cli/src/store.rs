//! Saved sessions as JSON files, one per session id.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use sync_client::{SavedSession, SessionStore, StoreError};

/// [`SessionStore`] backed by `<data_dir>/sessions/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Store rooted at `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("sessions"),
        }
    }

    fn path(&self, id: &str) -> PathBuf {
        // Ids are generated UUIDs; keep anything else from escaping the directory.
        let name: String = id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, id: &str) -> Result<Option<SavedSession>, StoreError> {
        match tokio::fs::read_to_string(self.path(id)).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, session: SavedSession) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let contents = serde_json::to_string_pretty(&session)?;
        let path = self.path(&session.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<SavedSession>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<SavedSession>(&contents) {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!("Skipping unreadable session {}: {}", path.display(), e),
            }
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_client::{GameSnapshot, LobbyCode, PlayerEntry};
    use tempfile::tempdir;

    fn session(name: &str, created_at: u64) -> SavedSession {
        let snapshot = GameSnapshot {
            players: vec![PlayerEntry::new("p1").with_field("life", 40)],
            ..GameSnapshot::empty()
        };
        SavedSession::new(name, created_at, snapshot)
    }

    #[tokio::test]
    async fn put_get_delete() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let mut saved = session("Friday", 10);
        saved.lobby_code = Some(LobbyCode::parse("ABC234").unwrap());

        assert_eq!(store.get(&saved.id).await.unwrap(), None);
        store.put(saved.clone()).await.unwrap();
        assert_eq!(store.get(&saved.id).await.unwrap(), Some(saved.clone()));

        store.delete(&saved.id).await.unwrap();
        store.delete(&saved.id).await.unwrap();
        assert_eq!(store.get(&saved.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_empty_without_dir() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        assert!(store.list().await.unwrap().is_empty());

        store.put(session("old", 1)).await.unwrap();
        store.put(session("new", 2)).await.unwrap();
        tokio::fs::write(dir.path().join("sessions/notes.txt"), "x")
            .await
            .unwrap();

        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn ids_cannot_escape_the_directory() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        assert_eq!(
            store.path("../../etc/passwd"),
            dir.path().join("sessions").join("etcpasswd.json")
        );
    }
}
