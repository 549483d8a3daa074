//! The Datastore Engine: an in-memory, indexed document map persisted as one
//! JSON file per key, with user-defined views, range/view queries with
//! pagination, and optimistic-concurrency (`_rev`) semantics. Every
//! operation — reads included — runs behind the same lock, which is the
//! simplest correct way to guarantee every queued operation observes the
//! writes of the one before it.

use crate::error::{Error, ResultExt};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A document is a JSON object; the reserved `_rev` key carries the
/// optimistic-concurrency revision.
pub type Document = serde_json::Value;

/// A user-defined view mapping function: receives a document and an
/// `emit(key, value)` callback, and may call it zero or more times. Keys are
/// `String` since every range/comparison operation in this engine compares
/// keys as strings.
pub type ViewMap = Arc<dyn Fn(&Document, &mut dyn FnMut(String, serde_json::Value)) + Send + Sync>;

const FILENAME_ENCODE_SET: &AsciiSet =
    &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

struct EngineState {
    /// Backed by a `BTreeMap` rather than a `HashMap` so that iteration
    /// order (used to break ties between same-key index entries) is
    /// deterministic.
    documents: BTreeMap<String, Document>,
    views: HashMap<String, ViewMap>,
}

/// In-memory document map with file-per-document persistence. Every
/// operation — reads included — takes the same `Mutex`, the single logical
/// lock that keeps every queued operation consistent with the one before it.
pub struct DatastoreEngine {
    dir: PathBuf,
    state: Mutex<EngineState>,
}

/// Options shared by [`DatastoreEngine::query_keys`] and
/// [`DatastoreEngine::query_view`].
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// An exact key to match; overrides `start_key`/`end_key` when present.
    pub key: Option<String>,
    pub start_key: Option<String>,
    pub end_key: Option<String>,
    pub descending: bool,
    pub inclusive_start_index: usize,
    pub limit: usize,
    pub include_documents: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            key: None,
            start_key: None,
            end_key: None,
            descending: false,
            inclusive_start_index: 0,
            limit: usize::MAX,
            include_documents: false,
        }
    }
}

/// One row of a query result: an index entry, optionally augmented with its
/// document.
#[derive(Debug, Clone)]
pub struct QueryItem {
    pub key: String,
    pub value: serde_json::Value,
    pub document_key: String,
    pub document: Option<Document>,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub items: Vec<QueryItem>,
    /// `indexOfLastEmitted + 1` if more items may remain past `limit`, or
    /// `None` if the scan reached the end of the index.
    pub exclusive_end_index: Option<usize>,
}

impl DatastoreEngine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DatastoreEngine {
            dir: dir.into(),
            state: Mutex::new(EngineState { documents: BTreeMap::new(), views: HashMap::new() }),
        }
    }

    fn file_path(&self, key: &str) -> PathBuf {
        let encoded = percent_encoding::utf8_percent_encode(key, FILENAME_ENCODE_SET).to_string();
        self.dir.join(format!("{encoded}.json"))
    }

    fn decode_key(file_stem: &str) -> crate::Result<String> {
        percent_encoding::percent_decode_str(file_stem)
            .decode_utf8()
            .map(|cow| cow.into_owned())
            .map_err(|e| Error::wrap("could not percent-decode document filename", e))
    }

    /// Reads every `*.json` file in the configured directory into memory.
    /// All later reads are served from memory.
    pub async fn load(&self) -> crate::Result<()> {
        let mut state = self.state.lock().await;
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .context(&format!("could not read datastore directory {}", self.dir.display()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .context("could not read datastore directory entry")?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let key = Self::decode_key(stem)?;

            let contents = tokio::fs::read_to_string(&path)
                .await
                .context(&format!("could not read document file {}", path.display()))?;
            let document: Document = serde_json::from_str(&contents)
                .context(&format!("could not parse document file {}", path.display()))?;

            state.documents.insert(key, document);
        }

        Ok(())
    }

    /// Pure memory lookup.
    pub async fn get_item(&self, key: &str) -> (String, Option<Document>) {
        let state = self.state.lock().await;
        (key.to_string(), state.documents.get(key).cloned())
    }

    /// Writes `document` to `key`'s file, then updates the in-memory map.
    /// Enforces optimistic concurrency: the incoming `_rev` must equal the
    /// currently stored `_rev`, or the write fails with [`Error::Conflict`].
    /// The very first store of a key assigns `_rev = 0` regardless of what
    /// the caller passed.
    pub async fn set_item(&self, key: &str, mut document: Document) -> crate::Result<Document> {
        if !document.is_object() {
            return Err(Error::bad_request("a document must be a JSON object"));
        }

        let mut state = self.state.lock().await;
        let current_rev = state.documents.get(key).and_then(doc_rev);
        let incoming_rev = doc_rev(&document);

        match current_rev {
            None => set_rev(&mut document, 0),
            Some(current) => match incoming_rev {
                Some(incoming) if incoming == current => set_rev(&mut document, current + 1),
                _ => {
                    return Err(Error::conflict(format!(
                        "revision mismatch for {key}: expected _rev {current}, got {incoming_rev:?}"
                    )));
                }
            },
        }

        let path = self.file_path(key);
        let serialized = serde_json::to_string(&document).map_err(|e| Error::internal(e))?;
        tokio::fs::write(&path, serialized)
            .await
            .context(&format!("could not write document file {}", path.display()))?;

        state.documents.insert(key.to_string(), document.clone());
        Ok(document)
    }

    /// Reads the current document, applies `f`, and writes back the result
    /// with the correct `_rev`. Retries internally on a concurrent conflict.
    pub async fn update_item<F>(&self, key: &str, f: F) -> crate::Result<Document>
    where
        F: Fn(Option<Document>) -> Document,
    {
        loop {
            let (_, current) = self.get_item(key).await;
            let mut next = f(current.clone());
            if let Some(rev) = current.as_ref().and_then(doc_rev) {
                set_rev(&mut next, rev);
            } else if let Some(obj) = next.as_object_mut() {
                obj.remove("_rev");
            }

            match self.set_item(key, next).await {
                Ok(document) => return Ok(document),
                Err(Error::Conflict { .. }) => continue,
                Err(other) => return Err(other),
            }
        }
    }

    /// Removes `key`'s file, then deletes it from the in-memory map.
    pub async fn delete_item(&self, key: &str) -> crate::Result<()> {
        let mut state = self.state.lock().await;
        if state.documents.contains_key(key) {
            let path = self.file_path(key);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::wrap(format!("could not remove document file {}", path.display()), e)),
            }
        }
        state.documents.remove(key);
        Ok(())
    }

    /// Registers a named view.
    pub async fn set_view(&self, id: impl Into<String>, view: ViewMap) {
        let mut state = self.state.lock().await;
        state.views.insert(id.into(), view);
    }

    /// Queries the implicit "by document key" index.
    pub async fn query_keys(&self, options: &QueryOptions) -> QueryResult {
        let state = self.state.lock().await;
        let index: Vec<(String, serde_json::Value, String)> = state
            .documents
            .keys()
            .map(|key| (key.clone(), serde_json::Value::Null, key.clone()))
            .collect();
        execute_query(index, options, &state.documents)
    }

    /// Recomputes `view_id` against every in-memory document and queries the
    /// resulting index. Views are recomputed on demand at query time, never
    /// cached.
    pub async fn query_view(&self, view_id: &str, options: &QueryOptions) -> crate::Result<QueryResult> {
        let state = self.state.lock().await;
        let view = state
            .views
            .get(view_id)
            .ok_or_else(|| Error::bad_request(format!("no such view: {view_id}")))?
            .clone();

        let mut index = Vec::new();
        for (document_key, document) in state.documents.iter() {
            let mut emit = |key: String, value: serde_json::Value| {
                index.push((key, value, document_key.clone()));
            };
            view(document, &mut emit);
        }

        Ok(execute_query(index, options, &state.documents))
    }
}

fn doc_rev(document: &Document) -> Option<i64> {
    document.get("_rev").and_then(|v| v.as_i64())
}

fn set_rev(document: &mut Document, rev: i64) {
    if let Some(obj) = document.as_object_mut() {
        obj.insert("_rev".to_string(), serde_json::json!(rev));
    }
}

/// Shared pagination/range logic for [`DatastoreEngine::query_keys`] and
/// [`DatastoreEngine::query_view`].
fn execute_query(
    mut index: Vec<(String, serde_json::Value, String)>,
    options: &QueryOptions,
    documents: &BTreeMap<String, Document>,
) -> QueryResult {
    // A stable sort with a reversed comparator keeps same-key ties in
    // iteration order regardless of direction; sorting ascending and then
    // reversing the whole vector would flip that tie-break in descending
    // queries instead of preserving it.
    if options.descending {
        index.sort_by(|a, b| b.0.cmp(&a.0));
    } else {
        index.sort_by(|a, b| a.0.cmp(&b.0));
    }

    let start_key = options
        .key
        .clone()
        .or_else(|| options.start_key.clone())
        .unwrap_or_else(|| crate::constants::KEY_RANGE_START.to_string());
    let end_key = options
        .key
        .clone()
        .or_else(|| options.end_key.clone())
        .unwrap_or_else(|| crate::constants::KEY_RANGE_END.to_string());

    let mut items = Vec::new();
    let mut last_emitted_index: Option<usize> = None;
    let mut i = options.inclusive_start_index.min(index.len());

    while i < index.len() && items.len() < options.limit {
        let (key, value, document_key) = &index[i];
        if *key >= start_key && *key <= end_key {
            let document = if options.include_documents { documents.get(document_key).cloned() } else { None };
            items.push(QueryItem {
                key: key.clone(),
                value: value.clone(),
                document_key: document_key.clone(),
                document,
            });
            last_emitted_index = Some(i);
        }
        i += 1;
    }

    let exclusive_end_index = if items.len() >= options.limit {
        last_emitted_index.and_then(|idx| if idx + 1 < index.len() { Some(idx + 1) } else { None })
    } else {
        None
    };

    QueryResult { items, exclusive_end_index }
}
