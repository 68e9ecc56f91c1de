//! Sparse TF–IDF vectorizer.
//!
//! Tokens are lowercased `\b\w\w+\b` matches with English stop words removed;
//! features are word n-grams; weights use raw term frequency and smoothed IDF
//! `ln((1 + n) / (1 + df)) + 1`; every vector is L2-normalised so a dot
//! product is the cosine similarity.

use std::{
    collections::{HashMap, HashSet},
    sync::LazyLock,
};

use regex::Regex;

use crate::{
    error::{Error, Result},
    stopwords::is_stop_word,
};

#[allow(clippy::expect_used)]
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("token regex is valid"));

/// Lowercase, split into word tokens and drop stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|t| !is_stop_word(t))
        .map(str::to_string)
        .collect()
}

/// All contiguous n-grams of length `1..=max_n`, space-joined.
pub fn ngrams(tokens: &[String], max_n: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len() * max_n.max(1));
    for n in 1..=max_n.max(1) {
        if n > tokens.len() {
            break;
        }
        out.extend(tokens.windows(n).map(|w| w.join(" ")));
    }
    out
}

/// L2-normalised sparse vector, entries sorted by feature index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(u32, f32)>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Dot product over two sorted sparse vectors.
    pub fn dot(&self, other: &Self) -> f32 {
        let (mut i, mut j, mut sum) = (0, 0, 0.0_f32);
        while i < self.entries.len() && j < other.entries.len() {
            let (a, wa) = self.entries[i];
            let (b, wb) = other.entries[j];
            match a.cmp(&b) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += wa * wb;
                    i += 1;
                    j += 1;
                },
            }
        }
        sum
    }

    fn normalized(mut entries: Vec<(u32, f32)>) -> Self {
        entries.sort_unstable_by_key(|(idx, _)| *idx);
        let norm = entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (_, w) in &mut entries {
                *w /= norm;
            }
        } else {
            entries.clear();
        }
        Self { entries }
    }
}

/// Fitted vocabulary plus IDF weights.
#[derive(Debug, Clone)]
pub struct Vectorizer {
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
    max_ngram: usize,
}

impl Vectorizer {
    /// Fit on a corpus. The vocabulary keeps the `max_features` terms with
    /// the highest corpus frequency, ties broken alphabetically.
    pub fn fit<S: AsRef<str>>(docs: &[S], max_features: usize, max_ngram: usize) -> Result<Self> {
        let mut term_freq: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for doc in docs {
            let grams = ngrams(&tokenize(doc.as_ref()), max_ngram);
            let mut seen = HashSet::new();
            for gram in grams {
                *term_freq.entry(gram.clone()).or_default() += 1;
                if seen.insert(gram.clone()) {
                    *doc_freq.entry(gram).or_default() += 1;
                }
            }
        }

        if term_freq.is_empty() {
            return Err(Error::Index(
                "empty vocabulary: corpus contains only stop words".into(),
            ));
        }

        let mut ranked: Vec<(String, usize)> = term_freq.into_iter().collect();
        ranked.sort_by(|(ta, ca), (tb, cb)| cb.cmp(ca).then_with(|| ta.cmp(tb)));
        ranked.truncate(max_features.max(1));
        let mut kept: Vec<String> = ranked.into_iter().map(|(t, _)| t).collect();
        kept.sort();

        let n = docs.len() as f32;
        let mut vocabulary = HashMap::with_capacity(kept.len());
        let mut idf = Vec::with_capacity(kept.len());
        for (idx, term) in kept.into_iter().enumerate() {
            let df = doc_freq.get(&term).copied().unwrap_or(0) as f32;
            idf.push(((1.0 + n) / (1.0 + df)).ln() + 1.0);
            vocabulary.insert(term, idx as u32);
        }

        Ok(Self {
            vocabulary,
            idf,
            max_ngram,
        })
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.vocabulary.contains_key(term)
    }

    /// Vectorize text against the fitted vocabulary. Unknown terms are
    /// dropped; text with no known terms yields an empty vector.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        for gram in ngrams(&tokenize(text), self.max_ngram) {
            if let Some(&idx) = self.vocabulary.get(&gram) {
                *counts.entry(idx).or_default() += 1.0;
            }
        }
        let entries = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx as usize]))
            .collect();
        SparseVector::normalized(entries)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_drops_stop_words_and_short_tokens() {
        assert_eq!(
            tokenize("How do I dispute a Charge on my card?"),
            vec!["dispute", "charge", "card"]
        );
    }

    #[test]
    fn ngrams_cover_every_length() {
        let tokens: Vec<String> = ["lost", "debit", "card"].map(String::from).to_vec();
        let grams = ngrams(&tokens, 3);
        assert_eq!(grams, vec![
            "lost",
            "debit",
            "card",
            "lost debit",
            "debit card",
            "lost debit card",
        ]);
        assert_eq!(ngrams(&tokens[..1], 3), vec!["lost"]);
    }

    #[test]
    fn identical_text_has_unit_similarity() {
        let docs = ["dispute a card charge", "order replacement card"];
        let v = Vectorizer::fit(&docs, 5000, 3).unwrap();
        let a = v.transform(docs[0]);
        let b = v.transform(docs[0]);
        assert!((a.dot(&b) - 1.0).abs() < 1e-5);
        let c = v.transform(docs[1]);
        assert!(a.dot(&c) < 0.5);
    }

    #[test]
    fn unknown_and_stop_word_queries_are_empty() {
        let v = Vectorizer::fit(&["dispute a card charge"], 5000, 3).unwrap();
        assert!(v.transform("the and of").is_empty());
        assert!(v.transform("zebra").is_empty());
    }

    #[test]
    fn vocabulary_cap_keeps_most_frequent_terms() {
        let docs = ["card card card fee", "card fee statement"];
        let v = Vectorizer::fit(&docs, 2, 1).unwrap();
        assert_eq!(v.vocabulary_len(), 2);
        assert!(v.contains("card"));
        assert!(v.contains("fee"));
        assert!(!v.contains("statement"));
    }

    #[test]
    fn stop_word_corpus_fails_to_fit() {
        assert!(matches!(
            Vectorizer::fit(&["the and of a"], 5000, 3),
            Err(Error::Index(_))
        ));
    }
}
