//! JSON-file conversation store.
//!
//! Two tiers on disk: `index.json` maps session ids to summaries, and each
//! session body lives in `<id>.json`. Every mutation rewrites the affected
//! body and the index so neither tier names a session the other lacks.
//! Appends to one session are serialized; other sessions proceed in parallel.

mod export;
pub mod types;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::config::ConversationConfig;
use crate::core::errors::RagError;
use crate::core::persist::{read_json, remove_file_if_exists, write_json_atomic};
use crate::core::text::truncate_chars;
use crate::pipeline::{AnswerMetadata, HistoryTurn, Role};

pub use types::{
    ConversationSession, ConversationStats, MatchType, Message, SearchHit, SessionListItem,
    SessionSummary,
};

pub const INDEX_FILE: &str = "index.json";
const ID_LEN: usize = 12;

type SummaryIndex = BTreeMap<String, SessionSummary>;

pub struct ConversationStore {
    dir: PathBuf,
    config: ConversationConfig,
    index: Mutex<SummaryIndex>,
    session_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationStore {
    /// Opens the store in `dir`, reconciling the index with the body files.
    pub async fn open(dir: impl Into<PathBuf>, config: ConversationConfig) -> Result<Self, RagError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(RagError::storage)?;

        let index = match read_json::<SummaryIndex>(&dir.join(INDEX_FILE)).await {
            Ok(index) => index.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "Conversation index unreadable, rebuilding from session files");
                SummaryIndex::new()
            }
        };

        let store = Self {
            dir,
            config,
            index: Mutex::new(index),
            session_locks: std::sync::Mutex::new(HashMap::new()),
        };
        store.reconcile().await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_list_limit(&self) -> usize {
        self.config.default_list_limit
    }

    /// Creates an empty session and returns its id.
    pub async fn create(&self, title: Option<&str>) -> Result<String, RagError> {
        let title = self.normalize_title(title);
        let now = Utc::now();

        let mut index = self.index.lock().await;
        let id = self.generate_id(&title, &now.to_rfc3339(), &index);

        let session = ConversationSession {
            id: id.clone(),
            title,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            turn_count: 0,
        };

        let body_path = self.body_path(&id);
        write_json_atomic(&body_path, &session).await?;

        let mut next = index.clone();
        next.insert(id.clone(), session.summary());
        if let Err(err) = self.save_index(&next).await {
            let _ = remove_file_if_exists(&body_path).await;
            return Err(err);
        }
        *index = next;

        info!(session_id = %id, "Created conversation");
        Ok(id)
    }

    /// Appends one message. Unknown sessions are a logged no-op returning
    /// `Ok(false)`.
    pub async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: Option<AnswerMetadata>,
    ) -> Result<bool, RagError> {
        if !self.exists(session_id).await {
            warn!(session_id, "Append to unknown conversation ignored");
            return Ok(false);
        }
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let Some(mut session) = self.load_body(session_id).await? else {
            self.forget_lock(session_id);
            warn!(session_id, "Append to unknown conversation ignored");
            return Ok(false);
        };

        let now = Utc::now();
        session.messages.push(Message {
            role,
            content: content.to_string(),
            timestamp: now,
            metadata,
        });
        session.updated_at = now;
        session.turn_count = session
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .count();

        write_json_atomic(&self.body_path(session_id), &session).await?;
        self.upsert_summary(session_id, session.summary()).await?;

        debug!(session_id, role = role.as_str(), "Appended message");
        Ok(true)
    }

    /// `(role, content)` pairs in order. Unknown sessions have no history.
    pub async fn get_history(&self, session_id: &str) -> Result<Vec<HistoryTurn>, RagError> {
        Ok(self
            .load_body(session_id)
            .await?
            .map(|s| s.history())
            .unwrap_or_default())
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<ConversationSession>, RagError> {
        self.load_body(session_id).await
    }

    pub async fn messages(&self, session_id: &str) -> Result<Vec<Message>, RagError> {
        Ok(self
            .load_body(session_id)
            .await?
            .map(|s| s.messages)
            .unwrap_or_default())
    }

    pub async fn exists(&self, session_id: &str) -> bool {
        self.index.lock().await.contains_key(session_id)
    }

    /// Summaries, most recently updated first.
    pub async fn list(&self, limit: usize) -> Vec<SessionListItem> {
        let index = self.index.lock().await;
        let mut items: Vec<SessionListItem> = index
            .iter()
            .map(|(id, summary)| SessionListItem::new(id, summary))
            .collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        items.truncate(limit);
        items
    }

    /// Case-insensitive substring search. Title matches come first, then
    /// sessions whose messages contain the text.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, RagError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut ordered: Vec<(String, SessionSummary)> = self
            .index
            .lock()
            .await
            .iter()
            .map(|(id, summary)| (id.clone(), summary.clone()))
            .collect();
        ordered.sort_by(|a, b| b.1.updated_at.cmp(&a.1.updated_at));

        let mut title_hits = Vec::new();
        let mut content_hits = Vec::new();

        for (id, summary) in ordered {
            let hit = |match_type| SearchHit {
                id: id.clone(),
                title: summary.title.clone(),
                updated_at: summary.updated_at,
                match_type,
            };

            if summary.title.to_lowercase().contains(&needle) {
                title_hits.push(hit(MatchType::Title));
                continue;
            }

            let Some(session) = self.load_body(&id).await? else {
                continue;
            };
            if session
                .messages
                .iter()
                .any(|m| m.content.to_lowercase().contains(&needle))
            {
                content_hits.push(hit(MatchType::Content));
            }
        }

        title_hits.extend(content_hits);
        Ok(title_hits)
    }

    /// Removes a session. Returns `false` if it did not exist.
    pub async fn delete(&self, session_id: &str) -> Result<bool, RagError> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut index = self.index.lock().await;
        let in_index = index.contains_key(session_id);
        let removed_body = if Self::is_body_id(session_id) {
            remove_file_if_exists(&self.body_path(session_id)).await?
        } else {
            false
        };

        if in_index {
            let mut next = index.clone();
            next.remove(session_id);
            self.save_index(&next).await?;
            *index = next;
        }
        drop(index);
        self.forget_lock(session_id);

        let deleted = in_index || removed_body;
        if deleted {
            info!(session_id, "Deleted conversation");
        }
        Ok(deleted)
    }

    /// Renames a session. Returns `false` for unknown ids.
    pub async fn rename(&self, session_id: &str, new_title: &str) -> Result<bool, RagError> {
        if !self.exists(session_id).await {
            return Ok(false);
        }
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let Some(mut session) = self.load_body(session_id).await? else {
            self.forget_lock(session_id);
            return Ok(false);
        };

        session.title = self.normalize_title(Some(new_title));
        write_json_atomic(&self.body_path(session_id), &session).await?;
        self.upsert_summary(session_id, session.summary()).await?;
        Ok(true)
    }

    pub async fn stats(&self) -> ConversationStats {
        let index = self.index.lock().await;
        ConversationStats {
            total_conversations: index.len(),
            total_queries: index.values().map(|s| s.turn_count).sum(),
        }
    }

    /// Markdown transcript, or `None` for unknown ids.
    pub async fn export_markdown(&self, session_id: &str) -> Result<Option<String>, RagError> {
        Ok(self
            .load_body(session_id)
            .await?
            .map(|session| export::render_markdown(&session)))
    }

    fn normalize_title(&self, title: Option<&str>) -> String {
        match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => truncate_chars(title, self.config.max_title_chars).to_string(),
            None => format!("Conversation {}", Local::now().format("%Y-%m-%d %H:%M")),
        }
    }

    fn generate_id(&self, title: &str, timestamp: &str, index: &SummaryIndex) -> String {
        let mut salt = 0u32;
        loop {
            let mut hasher = Sha256::new();
            hasher.update(title.as_bytes());
            hasher.update(b"_");
            hasher.update(timestamp.as_bytes());
            if salt > 0 {
                hasher.update(salt.to_le_bytes());
            }
            let digest = hex::encode(hasher.finalize());
            let id = digest[..ID_LEN].to_string();

            if Self::is_body_id(&id)
                && !index.contains_key(&id)
                && !self.body_path(&id).exists()
            {
                return id;
            }
            salt += 1;
        }
    }

    /// Ids that may name a body file: safe characters only, and never the
    /// stem of the summary index.
    fn is_body_id(id: &str) -> bool {
        !id.is_empty()
            && id != INDEX_FILE.trim_end_matches(".json")
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    fn body_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn session_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    fn forget_lock(&self, id: &str) {
        self.session_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }

    async fn load_body(&self, id: &str) -> Result<Option<ConversationSession>, RagError> {
        if !Self::is_body_id(id) {
            return Ok(None);
        }
        read_json(&self.body_path(id)).await
    }

    async fn save_index(&self, index: &SummaryIndex) -> Result<(), RagError> {
        write_json_atomic(&self.dir.join(INDEX_FILE), index).await
    }

    async fn upsert_summary(&self, id: &str, summary: SessionSummary) -> Result<(), RagError> {
        let mut index = self.index.lock().await;
        let mut next = index.clone();
        next.insert(id.to_string(), summary);
        self.save_index(&next).await?;
        *index = next;
        Ok(())
    }

    /// Drops index entries without a body and re-indexes bodies missing from
    /// the index.
    async fn reconcile(&self) -> Result<(), RagError> {
        let mut bodies: BTreeMap<String, SessionSummary> = BTreeMap::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(RagError::storage)?;

        while let Some(entry) = entries.next_entry().await.map_err(RagError::storage)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if path.file_name().and_then(|n| n.to_str()) == Some(INDEX_FILE) {
                continue;
            }

            match read_json::<ConversationSession>(&path).await {
                Ok(Some(session)) if session.id == id => {
                    bodies.insert(id.to_string(), session.summary());
                }
                Ok(_) => warn!(path = %path.display(), "Skipping session file with mismatched id"),
                Err(err) => warn!(error = %err, "Skipping unreadable session file"),
            }
        }

        let mut index = self.index.lock().await;
        let dangling: Vec<String> = index
            .keys()
            .filter(|id| !bodies.contains_key(*id))
            .cloned()
            .collect();
        let orphans: Vec<String> = bodies
            .keys()
            .filter(|id| !index.contains_key(*id))
            .cloned()
            .collect();

        if dangling.is_empty() && orphans.is_empty() {
            return Ok(());
        }

        let mut next = index.clone();
        for id in &dangling {
            next.remove(id);
        }
        for id in &orphans {
            if let Some(summary) = bodies.get(id) {
                next.insert(id.clone(), summary.clone());
            }
        }
        self.save_index(&next).await?;
        *index = next;

        info!(
            dropped = dangling.len(),
            restored = orphans.len(),
            "Reconciled conversation index"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Citation;

    async fn open_store(dir: &Path) -> ConversationStore {
        ConversationStore::open(dir, ConversationConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_writes_both_tiers() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;

        let id = store.create(Some("Soil bacteria")).await.unwrap();
        assert_eq!(id.len(), 12);
        assert!(tmp.path().join(format!("{}.json", id)).exists());

        let raw = std::fs::read_to_string(tmp.path().join(INDEX_FILE)).unwrap();
        let index: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(index[&id]["title"], "Soil bacteria");
        assert_eq!(index[&id]["turn_count"], 0);
    }

    #[tokio::test]
    async fn default_title_is_timestamped() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;

        let id = store.create(None).await.unwrap();
        let session = store.get(&id).await.unwrap().unwrap();
        assert!(session.title.starts_with("Conversation "));
    }

    #[tokio::test]
    async fn ids_are_unique_for_identical_titles() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;

        let mut ids = std::collections::HashSet::new();
        for _ in 0..20 {
            ids.insert(store.create(Some("same")).await.unwrap());
        }
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test]
    async fn append_counts_user_turns() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;
        let id = store.create(Some("t")).await.unwrap();

        let metadata = AnswerMetadata {
            reasoning: "because".to_string(),
            suggestions: vec!["next".to_string()],
            sources: vec![Citation {
                index: 1,
                source: "a.pdf".to_string(),
                page: None,
                excerpt: None,
                kind: None,
                origin_file: None,
            }],
            confidence: 0.8,
            ..AnswerMetadata::default()
        };

        assert!(store.append(&id, Role::User, "q1", None).await.unwrap());
        assert!(store
            .append(&id, Role::Assistant, "a1", Some(metadata.clone()))
            .await
            .unwrap());
        assert!(store.append(&id, Role::User, "q2", None).await.unwrap());

        let session = store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.turn_count, 2);
        assert_eq!(session.messages[1].metadata.as_ref(), Some(&metadata));
        assert!(session.updated_at >= session.created_at);

        let history = store.get_history(&id).await.unwrap();
        assert_eq!(
            history,
            vec![
                HistoryTurn::new(Role::User, "q1"),
                HistoryTurn::new(Role::Assistant, "a1"),
                HistoryTurn::new(Role::User, "q2"),
            ]
        );
        assert_eq!(store.list(10).await[0].turn_count, 2);
    }

    #[tokio::test]
    async fn append_to_unknown_session_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;
        store.create(Some("existing")).await.unwrap();
        let before = std::fs::read_to_string(tmp.path().join(INDEX_FILE)).unwrap();

        let appended = store
            .append("deadbeef0000", Role::User, "hello", None)
            .await
            .unwrap();

        assert!(!appended);
        let after = std::fs::read_to_string(tmp.path().join(INDEX_FILE)).unwrap();
        assert_eq!(before, after);
        assert!(!tmp.path().join("deadbeef0000.json").exists());
    }

    #[tokio::test]
    async fn list_is_most_recent_first() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;

        let first = store.create(Some("first")).await.unwrap();
        let second = store.create(Some("second")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.append(&first, Role::User, "bump", None).await.unwrap();

        let listed = store.list(10).await;
        assert_eq!(listed[0].id, first);
        assert_eq!(listed[1].id, second);
        assert_eq!(store.list(1).await.len(), 1);
    }

    #[tokio::test]
    async fn search_reports_title_matches_before_content() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;

        let by_content = store.create(Some("Growth media")).await.unwrap();
        store
            .append(&by_content, Role::User, "Does nitrogen limit growth?", None)
            .await
            .unwrap();
        let by_title = store.create(Some("Nitrogen fixation")).await.unwrap();
        store.create(Some("Unrelated")).await.unwrap();

        let hits = store.search("NITROGEN").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, by_title);
        assert_eq!(hits[0].match_type, MatchType::Title);
        assert_eq!(hits[1].id, by_content);
        assert_eq!(hits[1].match_type, MatchType::Content);

        assert!(store.search("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;
        let id = store.create(Some("gone soon")).await.unwrap();

        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
        assert!(!tmp.path().join(format!("{}.json", id)).exists());
        assert!(store.list(10).await.is_empty());
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rename_updates_both_tiers() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;
        let id = store.create(Some("old")).await.unwrap();

        assert!(store.rename(&id, "new title").await.unwrap());
        assert!(!store.rename("missing00000", "x").await.unwrap());

        assert_eq!(store.get(&id).await.unwrap().unwrap().title, "new title");
        assert_eq!(store.list(10).await[0].title, "new title");
    }

    #[tokio::test]
    async fn stats_sum_user_turns() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;
        let a = store.create(Some("a")).await.unwrap();
        let b = store.create(Some("b")).await.unwrap();
        store.append(&a, Role::User, "q", None).await.unwrap();
        store.append(&a, Role::Assistant, "r", None).await.unwrap();
        store.append(&b, Role::User, "q", None).await.unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.total_conversations, 2);
        assert_eq!(stats.total_queries, 2);
    }

    #[tokio::test]
    async fn reopen_reconciles_tiers() {
        let tmp = tempfile::tempdir().unwrap();
        let (kept, dropped) = {
            let store = open_store(tmp.path()).await;
            let kept = store.create(Some("kept")).await.unwrap();
            let dropped = store.create(Some("body lost")).await.unwrap();
            (kept, dropped)
        };

        std::fs::remove_file(tmp.path().join(format!("{}.json", dropped))).unwrap();
        let mut index: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(tmp.path().join(INDEX_FILE)).unwrap())
                .unwrap();
        index.as_object_mut().unwrap().remove(&kept);
        std::fs::write(tmp.path().join(INDEX_FILE), index.to_string()).unwrap();

        let store = open_store(tmp.path()).await;
        let ids: Vec<String> = store.list(10).await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![kept]);
    }

    #[tokio::test]
    async fn concurrent_appends_are_all_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(open_store(tmp.path()).await);
        let id = store.create(Some("busy")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append(&id, Role::User, &format!("q{}", i), None)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let session = store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 10);
        assert_eq!(session.turn_count, 10);
    }

    #[tokio::test]
    async fn path_like_ids_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;
        assert!(store.get("../index").await.unwrap().is_none());
        assert!(!store
            .append("../escape", Role::User, "x", None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn index_file_stem_is_not_a_session_id() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;
        let id = store.create(Some("real")).await.unwrap();

        assert!(!store.delete("index").await.unwrap());
        assert!(!store.rename("index", "x").await.unwrap());
        assert!(store.get("index").await.unwrap().is_none());
        assert!(tmp.path().join(INDEX_FILE).exists());

        let reopened = open_store(tmp.path()).await;
        assert!(reopened.exists(&id).await);
    }

    #[tokio::test]
    async fn unknown_ids_leave_no_lock_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;
        let id = store.create(Some("known")).await.unwrap();
        store.append(&id, Role::User, "q", None).await.unwrap();
        let baseline = store.session_locks.lock().unwrap().len();

        for i in 0..50 {
            let missing = format!("missing{:05}", i);
            assert!(!store.rename(&missing, "x").await.unwrap());
            assert!(!store.append(&missing, Role::User, "x", None).await.unwrap());
            assert!(!store.delete(&missing).await.unwrap());
        }

        assert_eq!(store.session_locks.lock().unwrap().len(), baseline);
    }
}
