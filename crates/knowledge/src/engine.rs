//! In-process retrieval engine over the loaded corpus.

use std::{collections::BTreeSet, sync::Arc};

use {
    supportdesk_config::KnowledgeConfig,
    tokio::sync::{OnceCell, RwLock},
    tracing::{debug, info},
};

use crate::{
    corpus::{Document, load_corpus},
    error::{Error, Result},
    tfidf::{SparseVector, Vectorizer},
};

/// Tunables copied out of [`KnowledgeConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalSettings {
    pub min_similarity: f32,
    pub tool_min_similarity: f32,
    pub max_top_k: usize,
    pub max_features: usize,
    pub max_ngram: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self::from(&KnowledgeConfig::default())
    }
}

impl From<&KnowledgeConfig> for RetrievalSettings {
    fn from(cfg: &KnowledgeConfig) -> Self {
        Self {
            min_similarity: cfg.min_similarity,
            tool_min_similarity: cfg.tool_min_similarity,
            max_top_k: cfg.max_top_k,
            max_features: cfg.max_features,
            max_ngram: cfg.max_ngram,
        }
    }
}

/// A search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Result of [`KnowledgeBase::get_by_topic`].
#[derive(Debug, Clone, PartialEq)]
pub enum TopicLookup {
    Found(Document),
    NotFound { suggestions: Vec<String> },
}

#[derive(Debug)]
struct VectorIndex {
    vectorizer: Vectorizer,
    vectors: Vec<SparseVector>,
}

impl VectorIndex {
    fn build(documents: &[Document], settings: RetrievalSettings) -> Result<Self> {
        let texts: Vec<String> = documents.iter().map(Document::searchable_text).collect();
        let vectorizer = Vectorizer::fit(&texts, settings.max_features, settings.max_ngram)?;
        let vectors = texts.iter().map(|t| vectorizer.transform(t)).collect();
        Ok(Self {
            vectorizer,
            vectors,
        })
    }
}

type IndexCell = Arc<OnceCell<Arc<VectorIndex>>>;

/// Corpus plus a lazily built TF–IDF index.
///
/// The index is built on the blocking pool the first time a search needs
/// it. Concurrent first callers share the same build.
pub struct KnowledgeBase {
    documents: Arc<Vec<Document>>,
    settings: RetrievalSettings,
    index: RwLock<IndexCell>,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("documents", &self.documents.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl KnowledgeBase {
    /// Load every configured corpus file. Fails if a file is missing or no
    /// usable rows remain.
    pub fn load(config: &KnowledgeConfig) -> Result<Self> {
        let documents = load_corpus(&config.corpus)?;
        Ok(Self::from_documents(documents, RetrievalSettings::from(config)))
    }

    pub fn from_documents(documents: Vec<Document>, settings: RetrievalSettings) -> Self {
        Self {
            documents: Arc::new(documents),
            settings,
            index: RwLock::new(Arc::new(OnceCell::new())),
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn settings(&self) -> RetrievalSettings {
        self.settings
    }

    /// Drop the built index; the next search rebuilds it.
    pub async fn clear_index(&self) {
        *self.index.write().await = Arc::new(OnceCell::new());
        debug!("knowledge index cleared");
    }

    pub async fn is_indexed(&self) -> bool {
        self.index.read().await.initialized()
    }

    async fn index(&self) -> Result<Arc<VectorIndex>> {
        let cell = self.index.read().await.clone();
        let index = cell
            .get_or_try_init(|| async {
                let documents = Arc::clone(&self.documents);
                let settings = self.settings;
                let started = std::time::Instant::now();
                let index = tokio::task::spawn_blocking(move || {
                    VectorIndex::build(&documents, settings)
                })
                .await
                .map_err(|e| Error::Index(format!("index build task failed: {e}")))??;
                info!(
                    documents = self.documents.len(),
                    features = index.vectorizer.vocabulary_len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "knowledge index built"
                );
                Ok::<_, Error>(Arc::new(index))
            })
            .await?;
        Ok(Arc::clone(index))
    }

    /// Cosine-similarity search. `k` is clamped to `max_top_k`; hits below
    /// `min_score` are dropped. Ties keep corpus order.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredDocument>> {
        let k = k.min(self.settings.max_top_k);
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let index = self.index().await?;
        let query_vec = index.vectorizer.transform(query);
        if query_vec.is_empty() {
            debug!(query, "query has no indexed terms");
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = index
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, query_vec.dot(v)))
            .collect();
        // Stable sort keeps corpus order for equal scores.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let hits: Vec<ScoredDocument> = scored
            .into_iter()
            .take(k)
            .filter(|(_, score)| *score >= min_score && *score > 0.0)
            .map(|(i, score)| ScoredDocument {
                document: self.documents[i].clone(),
                score,
            })
            .collect();
        debug!(query, k, min_score, hits = hits.len(), "knowledge search");
        Ok(hits)
    }

    /// Exact (case-insensitive) title match, then first title containing the
    /// topic, then up to three similarity suggestions.
    pub async fn get_by_topic(&self, topic: &str) -> Result<TopicLookup> {
        let needle = topic.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(TopicLookup::NotFound {
                suggestions: Vec::new(),
            });
        }
        let exact = self
            .documents
            .iter()
            .find(|d| d.title.to_lowercase() == needle);
        let partial = || {
            self.documents
                .iter()
                .find(|d| d.title.to_lowercase().contains(&needle))
        };
        if let Some(doc) = exact.or_else(partial) {
            return Ok(TopicLookup::Found(doc.clone()));
        }

        let suggestions = self
            .search(topic, 3, self.settings.min_similarity)
            .await?
            .into_iter()
            .map(|hit| hit.document.title)
            .collect();
        Ok(TopicLookup::NotFound { suggestions })
    }

    /// Sorted unique titles, optionally filtered by a case-insensitive
    /// substring.
    pub fn list_topics(&self, category: Option<&str>) -> Vec<String> {
        let filter = category
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty());
        self.documents
            .iter()
            .filter(|d| {
                filter
                    .as_deref()
                    .is_none_or(|c| d.title.to_lowercase().contains(c))
            })
            .map(|d| d.title.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn doc(id: &str, title: &str, body: &str) -> Document {
        Document {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            answer_summary: format!("summary of {title}"),
            source_tag: "ground_truth".into(),
        }
    }

    fn kb() -> KnowledgeBase {
        KnowledgeBase::from_documents(
            vec![
                doc(
                    "1",
                    "How do I dispute a charge?",
                    "Open the transaction in the app and tap dispute. Provide merchant details.",
                ),
                doc(
                    "2",
                    "Replacing a lost debit card",
                    "Freeze the card, then order a replacement card from settings.",
                ),
                doc(
                    "3",
                    "Monthly account fees",
                    "Maintenance fees are waived with a qualifying direct deposit.",
                ),
                doc(
                    "4",
                    "Card activation",
                    "Activate your new card by scanning the code on the sleeve.",
                ),
            ],
            RetrievalSettings::default(),
        )
    }

    #[tokio::test]
    async fn title_retrieves_its_own_document_first() {
        let kb = kb();
        for d in kb.documents().to_vec() {
            let hits = kb.search(&d.title, 3, 0.0).await.unwrap();
            assert_eq!(hits[0].document.id, d.id, "query {:?}", d.title);
        }
    }

    #[tokio::test]
    async fn scores_are_non_increasing_and_bounded() {
        let kb = kb();
        let hits = kb.search("card replacement fees", 10, 0.0).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(hits.iter().all(|h| h.score > 0.0 && h.score <= 1.0 + 1e-5));
    }

    #[tokio::test]
    async fn k_is_clamped_and_min_score_filters() {
        let settings = RetrievalSettings {
            max_top_k: 1,
            ..RetrievalSettings::default()
        };
        let kb = KnowledgeBase::from_documents(kb().documents().to_vec(), settings);
        assert_eq!(kb.search("card", 10, 0.0).await.unwrap().len(), 1);
        assert!(kb.search("card", 10, 1.1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_and_stop_word_queries_return_nothing() {
        let kb = kb();
        assert!(kb.search("", 5, 0.0).await.unwrap().is_empty());
        assert!(kb.search("   ", 5, 0.0).await.unwrap().is_empty());
        assert!(kb.search("how do I", 5, 0.0).await.unwrap().is_empty());
        assert!(kb.search("zzyzx", 5, 0.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn index_is_built_lazily_and_rebuilt_after_clear() {
        let kb = kb();
        assert!(!kb.is_indexed().await);
        let before = kb.search("dispute", 1, 0.0).await.unwrap();
        assert!(kb.is_indexed().await);
        kb.clear_index().await;
        assert!(!kb.is_indexed().await);
        let after = kb.search("dispute", 1, 0.0).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_searches_share_one_index() {
        let kb = Arc::new(kb());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let kb = Arc::clone(&kb);
                tokio::spawn(async move { kb.search("debit card", 2, 0.0).await.unwrap() })
            })
            .collect();
        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(results[0][0].document.id, "2");
    }

    #[tokio::test]
    async fn topic_lookup_prefers_exact_then_substring() {
        let kb = kb();
        match kb.get_by_topic("card activation").await.unwrap() {
            TopicLookup::Found(d) => assert_eq!(d.id, "4"),
            other => panic!("unexpected {other:?}"),
        }
        match kb.get_by_topic("lost debit").await.unwrap() {
            TopicLookup::Found(d) => assert_eq!(d.id, "2"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_topic_suggests_similar_titles() {
        let kb = kb();
        match kb.get_by_topic("merchant dispute process").await.unwrap() {
            TopicLookup::NotFound { suggestions } => {
                assert!(suggestions.len() <= 3);
                assert_eq!(suggestions[0], "How do I dispute a charge?");
            },
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            kb.get_by_topic("").await.unwrap(),
            TopicLookup::NotFound {
                suggestions: vec![]
            }
        );
    }

    #[test]
    fn topics_are_sorted_unique_and_filterable() {
        let mut docs = kb().documents().to_vec();
        docs.push(doc("5", "Card activation", "duplicate title"));
        let kb = KnowledgeBase::from_documents(docs, RetrievalSettings::default());
        let all = kb.list_topics(None);
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(kb.list_topics(Some("CARD")), vec![
            "Card activation".to_string(),
            "Replacing a lost debit card".to_string(),
        ]);
        assert!(kb.list_topics(Some("mortgage")).is_empty());
        assert_eq!(kb.list_topics(Some("  ")).len(), 4);
    }
}
