use crate::cache::key::{embedding_key, sha256_hex};
use crate::errors::SelectionError;
use crate::model::{Example, PatternTag, SelectionStrategy};
use crate::providers::embedder::Embedder;
use crate::storage::Store;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Picks few-shot examples from a fixed pool.
///
/// Pool embeddings are computed once, on first use, and query embeddings are
/// memoized for the selector's lifetime. When a [`Store`] is attached, both
/// are also persisted under a key that includes the embedder's model id.
pub struct ExampleSelector {
    pool: Vec<Example>,
    embedder: Option<Arc<dyn Embedder>>,
    store: Option<Store>,
    seed: u64,
    pool_vectors: OnceCell<Vec<Vec<f32>>>,
    query_cache: Mutex<HashMap<String, Vec<f32>>>,
}

impl ExampleSelector {
    pub fn new(pool: Vec<Example>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            pool,
            embedder,
            store: None,
            seed: 42,
            pool_vectors: OnceCell::new(),
            query_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn pool(&self) -> &[Example] {
        &self.pool
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Returns at most `max_examples` examples, best first. Zero returns an
    /// empty selection without touching the embedder.
    pub async fn select(
        &self,
        query: &str,
        max_examples: usize,
        strategy: SelectionStrategy,
    ) -> Result<Vec<Example>, SelectionError> {
        if max_examples == 0 || self.pool.is_empty() {
            return Ok(Vec::new());
        }
        let order: Vec<usize> = match strategy {
            SelectionStrategy::FirstN => (0..self.pool.len()).collect(),
            SelectionStrategy::Random => self.seeded_order(),
            SelectionStrategy::PatternBased => self.pattern_order(),
            SelectionStrategy::Similarity => self
                .rank_by_similarity(query)
                .await?
                .into_iter()
                .map(|(i, _)| i)
                .collect(),
        };
        Ok(order
            .into_iter()
            .take(max_examples)
            .map(|i| self.pool[i].clone())
            .collect())
    }

    /// Pool indices with cosine scores, sorted descending. The sort is stable,
    /// so ties keep pool order.
    pub async fn rank_by_similarity(&self, query: &str) -> Result<Vec<(usize, f64)>, SelectionError> {
        let pool_vecs = self.pool_vectors().await?;
        let q = self.query_vector(query).await?;

        let mut scored = Vec::with_capacity(pool_vecs.len());
        for (i, v) in pool_vecs.iter().enumerate() {
            scored.push((i, cosine_similarity(&q, v)?));
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        Ok(scored)
    }

    fn embedder(&self) -> Result<&Arc<dyn Embedder>, SelectionError> {
        self.embedder
            .as_ref()
            .ok_or_else(|| SelectionError::ExternalDependency("no embedder configured".into()))
    }

    async fn pool_vectors(&self) -> Result<&Vec<Vec<f32>>, SelectionError> {
        self.pool_vectors
            .get_or_try_init(|| async {
                let embedder = self.embedder()?;
                let model = embedder.model_id();
                let mut out: Vec<Option<Vec<f32>>> = self
                    .pool
                    .iter()
                    .map(|e| self.cached_vector(&model, &e.question))
                    .collect();

                let missing: Vec<usize> = (0..out.len()).filter(|i| out[*i].is_none()).collect();
                if !missing.is_empty() {
                    let texts: Vec<String> =
                        missing.iter().map(|i| self.pool[*i].question.clone()).collect();
                    let vecs = embedder
                        .embed_batch(&texts)
                        .await
                        .map_err(|e| SelectionError::ExternalDependency(e.to_string()))?;
                    for (i, v) in missing.into_iter().zip(vecs) {
                        self.persist_vector(&model, &self.pool[i].question, &v);
                        out[i] = Some(v);
                    }
                }
                tracing::debug!(
                    event = "nl2sql.selector.pool_embedded",
                    model = %model,
                    examples = out.len()
                );
                Ok(out.into_iter().flatten().collect())
            })
            .await
    }

    async fn query_vector(&self, query: &str) -> Result<Vec<f32>, SelectionError> {
        let mut cache = self.query_cache.lock().await;
        if let Some(v) = cache.get(query) {
            return Ok(v.clone());
        }
        let embedder = self.embedder()?;
        let model = embedder.model_id();
        let v = match self.cached_vector(&model, query) {
            Some(v) => v,
            None => {
                let v = embedder
                    .embed(query)
                    .await
                    .map_err(|e| SelectionError::ExternalDependency(e.to_string()))?;
                self.persist_vector(&model, query, &v);
                v
            }
        };
        cache.insert(query.to_string(), v.clone());
        Ok(v)
    }

    fn cached_vector(&self, model: &str, text: &str) -> Option<Vec<f32>> {
        let store = self.store.as_ref()?;
        match store.get_embedding(&embedding_key(model, text)) {
            Ok(Some((stored_model, v))) if stored_model == model => Some(v),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(event = "nl2sql.selector.cache_read_failed", error = %e);
                None
            }
        }
    }

    fn persist_vector(&self, model: &str, text: &str, v: &[f32]) {
        if let Some(store) = &self.store {
            if let Err(e) = store.put_embedding(&embedding_key(model, text), model, v) {
                tracing::warn!(event = "nl2sql.selector.cache_write_failed", error = %e);
            }
        }
    }

    /// Reproducible shuffle: pool order keyed on a hash of the seed and the
    /// example text. The same seed gives the same order for every question.
    fn seeded_order(&self) -> Vec<usize> {
        let mut keyed: Vec<(String, usize)> = self
            .pool
            .iter()
            .enumerate()
            .map(|(i, e)| (sha256_hex(&format!("{}|{}", self.seed, e.question)), i))
            .collect();
        keyed.sort();
        keyed.into_iter().map(|(_, i)| i).collect()
    }

    /// One example per pattern first (in order of first appearance), then
    /// the rest in pool order.
    fn pattern_order(&self) -> Vec<usize> {
        let mut seen: HashSet<PatternTag> = HashSet::new();
        let mut first = Vec::new();
        let mut rest = Vec::new();
        for (i, e) in self.pool.iter().enumerate() {
            if seen.insert(e.pattern) {
                first.push(i);
            } else {
                rest.push(i);
            }
        }
        first.extend(rest);
        first
    }
}

/// `(a·b) / (‖a‖‖b‖)`. A zero-norm vector scores 0.0 against everything;
/// empty or mismatched vectors are errors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, SelectionError> {
    if a.is_empty() || a.len() != b.len() {
        return Err(SelectionError::Similarity(format!(
            "embedding dims mismatch (a={}, b={})",
            a.len(),
            b.len()
        )));
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fewshot::pool::default_pool;
    use crate::providers::embedder::HashingEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct CountingEmbedder {
        inner: HashingEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.inner.embed(text).await
        }
        fn model_id(&self) -> String {
            self.inner.model_id()
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("connection refused")
        }
        fn model_id(&self) -> String {
            "down".into()
        }
    }

    fn counting() -> Arc<CountingEmbedder> {
        Arc::new(CountingEmbedder {
            inner: HashingEmbedder::default(),
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-12);
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_err());
        assert!(cosine_similarity(&[], &[]).is_err());
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).unwrap(), 0.0);
    }

    #[tokio::test]
    async fn stopword_only_question_falls_back_to_pool_order() -> anyhow::Result<()> {
        let sel = ExampleSelector::new(default_pool(), Some(counting()));
        for question in ["How was it?", "What is it?", "¿?"] {
            let got = sel.select(question, 3, SelectionStrategy::Similarity).await?;
            assert_eq!(got, default_pool()[..3].to_vec(), "{}", question);
        }
        Ok(())
    }

    #[tokio::test]
    async fn size_is_min_of_k_and_pool() -> anyhow::Result<()> {
        let sel = ExampleSelector::new(default_pool(), Some(counting()));
        for k in [1usize, 5, 15, 40] {
            let got = sel
                .select("revenue trend", k, SelectionStrategy::Similarity)
                .await?;
            assert_eq!(got.len(), k.min(15));
        }
        Ok(())
    }

    #[tokio::test]
    async fn zero_shot_skips_embedder() -> anyhow::Result<()> {
        let emb = counting();
        let sel = ExampleSelector::new(default_pool(), Some(emb.clone()));
        let got = sel.select("anything", 0, SelectionStrategy::Similarity).await?;
        assert!(got.is_empty());
        assert_eq!(emb.calls.load(AtomicOrdering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn selection_is_deterministic_and_cached() -> anyhow::Result<()> {
        let emb = counting();
        let sel = ExampleSelector::new(default_pool(), Some(emb.clone()));
        let a = sel
            .select("What is the current ratio?", 5, SelectionStrategy::Similarity)
            .await?;
        let calls_after_first = emb.calls.load(AtomicOrdering::SeqCst);
        let b = sel
            .select("What is the current ratio?", 5, SelectionStrategy::Similarity)
            .await?;
        assert_eq!(a, b);
        // 15 pool vectors + 1 query, and nothing on the second call.
        assert_eq!(calls_after_first, 16);
        assert_eq!(emb.calls.load(AtomicOrdering::SeqCst), 16);
        assert!(a[0].question.contains("current ratio"));
        Ok(())
    }

    #[tokio::test]
    async fn identical_pool_entries_keep_pool_order() -> anyhow::Result<()> {
        let mk = |sql: &str| Example {
            question: "same question".into(),
            sql: sql.into(),
            pattern: PatternTag::SimpleSelect,
        };
        let pool = vec![mk("SELECT 1"), mk("SELECT 2"), mk("SELECT 3")];
        let sel = ExampleSelector::new(pool, Some(counting()));
        let got = sel
            .select("same question", 3, SelectionStrategy::Similarity)
            .await?;
        let sqls: Vec<_> = got.iter().map(|e| e.sql.as_str()).collect();
        assert_eq!(sqls, vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
        Ok(())
    }

    #[tokio::test]
    async fn unavailable_embedder_is_external_dependency() {
        let sel = ExampleSelector::new(default_pool(), Some(Arc::new(DownEmbedder)));
        let err = sel
            .select("q", 3, SelectionStrategy::Similarity)
            .await
            .unwrap_err();
        assert!(matches!(err, SelectionError::ExternalDependency(_)));

        // Strategies without embeddings still work.
        let got = sel.select("q", 3, SelectionStrategy::FirstN).await.unwrap();
        assert_eq!(got.len(), 3);
    }

    #[tokio::test]
    async fn pattern_based_covers_patterns_first() -> anyhow::Result<()> {
        let sel = ExampleSelector::new(default_pool(), None);
        let got = sel.select("q", 7, SelectionStrategy::PatternBased).await?;
        let tags: HashSet<_> = got.iter().map(|e| e.pattern).collect();
        assert_eq!(tags.len(), 7);
        Ok(())
    }

    #[tokio::test]
    async fn random_is_seeded() -> anyhow::Result<()> {
        let a = ExampleSelector::new(default_pool(), None).with_seed(42);
        let b = ExampleSelector::new(default_pool(), None).with_seed(42);
        let c = ExampleSelector::new(default_pool(), None).with_seed(7);
        let ra = a.select("x", 10, SelectionStrategy::Random).await?;
        let rb = b.select("y", 10, SelectionStrategy::Random).await?;
        let rc = c.select("x", 10, SelectionStrategy::Random).await?;
        assert_eq!(ra, rb);
        assert_ne!(ra, rc);
        Ok(())
    }

    #[tokio::test]
    async fn persisted_vectors_are_reused() -> anyhow::Result<()> {
        let store = Store::memory()?;
        let first = counting();
        ExampleSelector::new(default_pool(), Some(first.clone()))
            .with_store(store.clone())
            .select("net profit", 3, SelectionStrategy::Similarity)
            .await?;
        assert_eq!(first.calls.load(AtomicOrdering::SeqCst), 16);

        let second = counting();
        ExampleSelector::new(default_pool(), Some(second.clone()))
            .with_store(store)
            .select("net profit", 3, SelectionStrategy::Similarity)
            .await?;
        assert_eq!(second.calls.load(AtomicOrdering::SeqCst), 0);
        Ok(())
    }
}
