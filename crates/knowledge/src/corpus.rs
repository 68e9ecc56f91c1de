//! Corpus loading from JSONL and CSV files.
//!
//! Each JSONL line, or each CSV record under a header row, is one article
//! with the fields `question`|`title`, `retrieved_chunks`|`body`,
//! `answer`|`answer_summary` and an optional `id`. Files ending in `.csv` are
//! read as CSV; everything else as JSONL.

use std::path::Path;

use {
    serde::{Deserialize, Serialize},
    supportdesk_config::CorpusSource,
    tracing::{debug, info, warn},
};

use crate::error::{Error, Result};

/// One knowledge-base article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub body: String,
    pub answer_summary: String,
    pub source_tag: String,
}

impl Document {
    /// Text fed to the vectorizer.
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.body)
    }
}

#[derive(Deserialize)]
struct CorpusRow {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default, alias = "question")]
    title: Option<String>,
    #[serde(default, alias = "retrieved_chunks")]
    body: Option<String>,
    #[serde(default, alias = "answer")]
    answer_summary: Option<String>,
}

#[derive(Deserialize)]
struct CsvRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "question")]
    title: Option<String>,
    #[serde(default, alias = "retrieved_chunks")]
    body: Option<String>,
    #[serde(default, alias = "answer")]
    answer_summary: Option<String>,
}

impl From<CsvRow> for CorpusRow {
    fn from(row: CsvRow) -> Self {
        Self {
            id: row.id.map(serde_json::Value::String),
            title: row.title,
            body: row.body,
            answer_summary: row.answer_summary,
        }
    }
}

impl CorpusRow {
    fn into_document(self, source_tag: &str, origin: &str, line_no: u64) -> Option<Document> {
        let title = self.title.map(|t| t.trim().to_string()).unwrap_or_default();
        let body = self.body.unwrap_or_default();
        if title.is_empty() || body.trim().is_empty() {
            warn!(file = origin, line = line_no, "skipping corpus row without title or body");
            return None;
        }
        let id = match self.id {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => format!("{source_tag}-{line_no}"),
        };
        Some(Document {
            id,
            title,
            body,
            answer_summary: self.answer_summary.unwrap_or_default(),
            source_tag: source_tag.to_string(),
        })
    }
}

/// Parse JSONL text. Blank lines are ignored; malformed rows are skipped
/// with a warning.
pub fn parse_jsonl(raw: &str, source_tag: &str, origin: &str) -> Vec<Document> {
    let mut docs = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        let line_no = index as u64 + 1;
        if line.trim().is_empty() {
            continue;
        }
        let row: CorpusRow = match serde_json::from_str(line) {
            Ok(row) => row,
            Err(e) => {
                warn!(file = origin, line = line_no, error = %e, "skipping malformed corpus row");
                continue;
            },
        };
        docs.extend(row.into_document(source_tag, origin, line_no));
    }
    docs
}

/// Parse CSV text with a header row. Unknown columns are ignored; records
/// that fail to parse are skipped with a warning.
pub fn parse_csv(raw: &str, source_tag: &str, origin: &str) -> Vec<Document> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw.as_bytes());
    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            warn!(file = origin, error = %e, "corpus file has no readable header row");
            return Vec::new();
        },
    };
    let mut docs = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(file = origin, error = %e, "skipping malformed corpus record");
                continue;
            },
        };
        let line_no = record.position().map_or(0, |p| p.line());
        match record.deserialize::<CsvRow>(Some(&headers)) {
            Ok(row) => docs.extend(CorpusRow::from(row).into_document(source_tag, origin, line_no)),
            Err(e) => {
                warn!(file = origin, line = line_no, error = %e, "skipping malformed corpus record");
            },
        }
    }
    docs
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// Load one corpus file. An unreadable file is an error.
pub fn load_file(path: &Path, source_tag: &str) -> Result<Vec<Document>> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::load(path, e))?;
    let origin = path.display().to_string();
    let docs = if is_csv(path) {
        parse_csv(&raw, source_tag, &origin)
    } else {
        parse_jsonl(&raw, source_tag, &origin)
    };
    debug!(path = %path.display(), source_tag, count = docs.len(), "loaded corpus file");
    Ok(docs)
}

/// Load every configured corpus file, in order.
pub fn load_corpus(sources: &[CorpusSource]) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    for source in sources {
        docs.extend(load_file(&source.path, &source.source_tag)?);
    }
    if docs.is_empty() {
        return Err(Error::EmptyCorpus {
            files: sources.len(),
        });
    }
    info!(
        documents = docs.len(),
        files = sources.len(),
        "knowledge corpus loaded"
    );
    Ok(docs)
}
