use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stratagem_core::types::StrategyData;

use crate::embedder::Embedder;
use crate::error::Result;

/// One row heading into the index. `text_key` is what gets embedded;
/// `payload` is opaque to the index (in practice a serialized
/// [`StrategyData`]).
#[derive(Debug, Clone)]
pub struct VectorInsert {
    pub reference_id: String,
    pub session_id: String,
    pub text_key: String,
    pub payload: String,
    pub created_at: String,
}

/// A ranked query hit. Smaller distance is closer (cosine).
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub payload: String,
    pub distance: f32,
}

/// The retrieval seam the orchestrator uses; implemented by the local
/// disk-shard index and the remote HTTP index.
#[async_trait]
pub trait StrategyRag: Send + Sync {
    /// Index a batch of strategies (embedding their summarized text).
    /// Already-indexed ids are skipped, so drivers can re-offer the latest
    /// strategy every cycle.
    async fn save_strategies(&self, strategies: &[StrategyData]) -> Result<()>;

    /// Top-k most similar past strategies for the query text.
    async fn relevant_strategies(&self, query: &str, top_k: usize) -> Result<Vec<StrategyData>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    reference_id: String,
    agent_id: String,
    session_id: String,
    text_key: String,
    payload: String,
    created_at: String,
    embedding: Vec<f32>,
}

/// Per-agent vector store persisted as JSON shards on disk.
///
/// Two partition conventions coexist: the per-agent shard
/// (`{agent}.json`), which new upserts target, and per-session shards
/// (`{agent}__{session}.json`). Queries union every partition known for
/// the agent before ranking, so history written under either convention
/// stays reachable. Shards load lazily; a missing file is an empty
/// partition, and a shard file is only created when it does not yet
/// exist on disk.
pub struct StrategyIndex {
    agent_id: String,
    embedder: Arc<dyn Embedder>,
    storage_dir: PathBuf,
    shards: Mutex<HashMap<String, Vec<StoredRecord>>>,
}

impl StrategyIndex {
    pub fn new(
        agent_id: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        storage_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let storage_dir = storage_dir.into();
        std::fs::create_dir_all(&storage_dir)?;
        Ok(Self {
            agent_id: agent_id.into(),
            embedder,
            storage_dir,
            shards: Mutex::new(HashMap::new()),
        })
    }

    fn agent_shard(&self) -> String {
        format!("{}.json", self.agent_id)
    }

    fn session_shard(&self, session_id: &str) -> String {
        format!("{}__{}.json", self.agent_id, session_id)
    }

    /// All shard file names currently on disk or cached for this agent.
    fn known_shards(&self) -> Vec<String> {
        let mut names = vec![self.agent_shard()];
        let session_prefix = format!("{}__", self.agent_id);

        if let Ok(entries) = std::fs::read_dir(&self.storage_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with(&session_prefix) && name.ends_with(".json") {
                    names.push(name);
                }
            }
        }

        let cached = self.shards.lock().unwrap();
        for name in cached.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    fn load_shard(&self, name: &str) -> Vec<StoredRecord> {
        if let Some(records) = self.shards.lock().unwrap().get(name) {
            return records.clone();
        }

        let path = self.storage_dir.join(name);
        let records: Vec<StoredRecord> = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        self.shards
            .lock()
            .unwrap()
            .insert(name.to_string(), records.clone());
        records
    }

    fn persist_shard(&self, name: &str, records: &[StoredRecord]) -> Result<()> {
        let path = self.storage_dir.join(name);
        if !path.exists() {
            info!(shard = name, "creating new index shard");
        }
        std::fs::write(&path, serde_json::to_string(records)?)?;
        self.shards
            .lock()
            .unwrap()
            .insert(name.to_string(), records.to_vec());
        Ok(())
    }

    async fn upsert_into(&self, shard: String, batch: Vec<VectorInsert>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = batch.iter().map(|r| r.text_key.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        let mut records = self.load_shard(&shard);
        for (insert, embedding) in batch.into_iter().zip(embeddings) {
            let record = StoredRecord {
                reference_id: insert.reference_id,
                agent_id: self.agent_id.clone(),
                session_id: insert.session_id,
                text_key: insert.text_key,
                payload: insert.payload,
                created_at: insert.created_at,
                embedding,
            };
            match records
                .iter_mut()
                .find(|r| r.reference_id == record.reference_id)
            {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
        }
        self.persist_shard(&shard, &records)
    }

    /// Batched upsert into the per-agent partition.
    pub async fn upsert(&self, batch: Vec<VectorInsert>) -> Result<()> {
        self.upsert_into(self.agent_shard(), batch).await
    }

    /// Batched upsert into a per-session partition.
    pub async fn upsert_session(
        &self,
        session_id: &str,
        batch: Vec<VectorInsert>,
    ) -> Result<()> {
        self.upsert_into(self.session_shard(session_id), batch).await
    }

    /// Whether any partition already holds `reference_id`.
    pub fn contains(&self, reference_id: &str) -> bool {
        self.known_shards()
            .iter()
            .any(|shard| self.load_shard(shard).iter().any(|r| r.reference_id == reference_id))
    }

    /// Cosine-ranked top-k across every partition for this agent. No
    /// shards means an empty result, not an error.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<VectorMatch>> {
        let mut all: Vec<StoredRecord> = Vec::new();
        for shard in self.known_shards() {
            all.extend(self.load_shard(&shard));
        }
        if all.is_empty() || text.is_empty() {
            return Ok(Vec::new());
        }

        let query_text = vec![text.to_string()];
        let query_embedding = self
            .embedder
            .embed(&query_text)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let mut matches: Vec<VectorMatch> = all
            .into_iter()
            .map(|record| VectorMatch {
                distance: cosine_distance(&query_embedding, &record.embedding),
                payload: record.payload,
            })
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(top_k);

        debug!(agent_id = %self.agent_id, hits = matches.len(), "index query");
        Ok(matches)
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return f32::MAX;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return f32::MAX;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl StrategyRag for StrategyIndex {
    async fn save_strategies(&self, strategies: &[StrategyData]) -> Result<()> {
        let batch: Vec<VectorInsert> = strategies
            .iter()
            .filter(|s| !s.summarized_desc.is_empty())
            .filter(|s| !self.contains(&s.strategy_id))
            .map(|s| {
                Ok(VectorInsert {
                    reference_id: s.strategy_id.clone(),
                    session_id: String::new(),
                    text_key: s.summarized_desc.clone(),
                    payload: serde_json::to_string(s)?,
                    created_at: s.created_at.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.upsert(batch).await
    }

    async fn relevant_strategies(&self, query: &str, top_k: usize) -> Result<Vec<StrategyData>> {
        let matches = self.query(query, top_k).await?;
        Ok(matches
            .into_iter()
            .filter_map(|m| serde_json::from_str(&m.payload).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use std::collections::HashMap as StdHashMap;

    fn strategy(id: &str, summary: &str) -> StrategyData {
        StrategyData {
            strategy_id: id.to_string(),
            agent_id: "phi".to_string(),
            summarized_desc: summary.to_string(),
            full_desc: format!("full text of {}", summary),
            parameters: StdHashMap::new(),
            strategy_result: "success".to_string(),
            created_at: "2025-03-01 10:00:00".to_string(),
        }
    }

    fn index_in(dir: &std::path::Path) -> StrategyIndex {
        StrategyIndex::new("phi", Arc::new(HashEmbedder::new()), dir).unwrap()
    }

    #[tokio::test]
    async fn upsert_then_query_round_trips_payload() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(dir.path());

        index
            .save_strategies(&[strategy("1", "post thread about L2 scaling")])
            .await
            .unwrap();

        let hits = index
            .relevant_strategies("post thread about L2 scaling", 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].strategy_id, "1");
        assert_eq!(hits[0].summarized_desc, "post thread about L2 scaling");
    }

    #[tokio::test]
    async fn query_with_no_shards_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(dir.path());
        let hits = index.query("anything", 3).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn closest_strategy_ranks_first() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(dir.path());

        index
            .save_strategies(&[
                strategy("1", "buy trending memecoins on the dip"),
                strategy("2", "post a thread about L2 scaling tech"),
            ])
            .await
            .unwrap();

        let hits = index
            .relevant_strategies("thread about scaling", 2)
            .await
            .unwrap();
        assert_eq!(hits[0].strategy_id, "2");
    }

    #[tokio::test]
    async fn union_covers_session_and_agent_shards() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(dir.path());

        // one record in the per-agent shard, one in a per-session shard
        index
            .save_strategies(&[strategy("1", "rotate into stablecoins")])
            .await
            .unwrap();
        index
            .upsert_session(
                "sess-9",
                vec![VectorInsert {
                    reference_id: "2".to_string(),
                    session_id: "sess-9".to_string(),
                    text_key: "farm airdrops with idle eth".to_string(),
                    payload: serde_json::to_string(&strategy("2", "farm airdrops with idle eth"))
                        .unwrap(),
                    created_at: "2025-03-01 10:00:00".to_string(),
                }],
            )
            .await
            .unwrap();

        let hits = index.query("farm airdrops with idle eth", 10).await.unwrap();
        assert_eq!(hits.len(), 2);

        let best: StrategyData = serde_json::from_str(&hits[0].payload).unwrap();
        assert_eq!(best.strategy_id, "2");
    }

    #[tokio::test]
    async fn reupserting_same_reference_id_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(dir.path());

        index
            .save_strategies(&[strategy("1", "first version")])
            .await
            .unwrap();
        // save_strategies skips known ids; raw upsert replaces
        index
            .upsert(vec![VectorInsert {
                reference_id: "1".to_string(),
                session_id: String::new(),
                text_key: "second version".to_string(),
                payload: serde_json::to_string(&strategy("1", "second version")).unwrap(),
                created_at: "2025-03-01 10:00:01".to_string(),
            }])
            .await
            .unwrap();

        let hits = index.query("second version", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn shards_survive_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = index_in(dir.path());
            index
                .save_strategies(&[strategy("1", "hold and wait")])
                .await
                .unwrap();
        }

        let reopened = index_in(dir.path());
        let hits = reopened.relevant_strategies("hold and wait", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].strategy_id, "1");
    }
}
