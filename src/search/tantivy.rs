//! Tantivy-backed lexical index
//!
//! Reference [`LexicalBackend`] over an in-RAM (or on-disk) tantivy index.
//! Candidates are gathered with tantivy's own BM25; the lexical searcher then
//! re-scores them over the candidate set. Document lengths are tracked at
//! index time so the backend can report real corpus statistics.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use parking_lot::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::tokenizer::{
    AsciiFoldingFilter, LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer,
};
use tantivy::{DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::debug;

use crate::core::fragment::{FragmentMetadata, KnowledgeFragment};
use crate::error::{RagError, Result};
use crate::search::lexical::{CorpusStats, LexicalBackend, LexicalHit, LexicalQuery};
use crate::search::tokenize::tokenize;

const FRAGMENT_TOKENIZER: &str = "fragment_text";

/// Lexical index of knowledge fragments
pub struct TantivyFragmentIndex {
    reader: IndexReader,
    writer: RwLock<IndexWriter>,
    fields: FragmentFields,
    /// Token count per committed fragment id, for corpus statistics
    doc_lengths: Mutex<HashMap<String, usize>>,
    /// Length changes applied to `doc_lengths` on the next commit
    pending_lengths: Mutex<Vec<LengthChange>>,
}

enum LengthChange {
    Upsert(String, usize),
    Remove(String),
}

#[derive(Clone, Copy)]
struct FragmentFields {
    id: Field,
    content: Field,
    interpreter: Field,
    source: Field,
    themes: Field,
    metadata_json: Field,
}

impl TantivyFragmentIndex {
    /// Open or create an index at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let schema = build_schema();
        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)?
        } else {
            Index::create_in_dir(path, schema)?
        };
        Self::from_index(index, 50_000_000)
    }

    /// Open an in-memory index
    pub fn open_in_memory() -> Result<Self> {
        Self::from_index(Index::create_in_ram(build_schema()), 15_000_000)
    }

    fn from_index(index: Index, writer_budget: usize) -> Result<Self> {
        index
            .tokenizers()
            .register(FRAGMENT_TOKENIZER, fragment_analyzer());
        let fields = extract_fields(&index.schema())?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer(writer_budget)?;

        let this = Self {
            reader,
            writer: RwLock::new(writer),
            fields,
            doc_lengths: Mutex::new(HashMap::new()),
            pending_lengths: Mutex::new(Vec::new()),
        };
        this.rebuild_doc_lengths()?;
        Ok(this)
    }

    /// Index (or replace) a fragment. Visible after [`commit`](Self::commit).
    pub fn index_fragment(&self, fragment: &KnowledgeFragment) -> Result<()> {
        let mut doc = TantivyDocument::new();
        doc.add_text(self.fields.id, &fragment.id);
        doc.add_text(self.fields.content, &fragment.content);
        doc.add_text(self.fields.interpreter, fragment.interpreter.as_str());
        doc.add_text(self.fields.source, &fragment.metadata.source);
        for theme in &fragment.themes {
            doc.add_text(self.fields.themes, theme);
        }
        doc.add_text(
            self.fields.metadata_json,
            serde_json::to_string(&fragment.metadata)?,
        );

        let id_term = Term::from_field_text(self.fields.id, &fragment.id);
        let writer = self.write_lock()?;
        writer.delete_term(id_term);
        writer.add_document(doc)?;
        drop(writer);

        self.pending_lengths.lock().push(LengthChange::Upsert(
            fragment.id.clone(),
            tokenize(&fragment.content).len(),
        ));
        Ok(())
    }

    pub fn index_fragments(&self, fragments: &[KnowledgeFragment]) -> Result<usize> {
        for fragment in fragments {
            self.index_fragment(fragment)?;
        }
        Ok(fragments.len())
    }

    /// Commit pending changes and reload the reader
    pub fn commit(&self) -> Result<()> {
        let mut writer = self.write_lock()?;
        writer.commit()?;
        drop(writer);

        self.reader.reload()?;

        let changes = std::mem::take(&mut *self.pending_lengths.lock());
        let mut lengths = self.doc_lengths.lock();
        for change in changes {
            match change {
                LengthChange::Upsert(id, len) => {
                    lengths.insert(id, len);
                }
                LengthChange::Remove(id) => {
                    lengths.remove(&id);
                }
            }
        }
        Ok(())
    }

    pub fn delete_fragment(&self, fragment_id: &str) -> Result<()> {
        let id_term = Term::from_field_text(self.fields.id, fragment_id);
        self.write_lock()?.delete_term(id_term);
        self.pending_lengths
            .lock()
            .push(LengthChange::Remove(fragment_id.to_string()));
        Ok(())
    }

    /// Remove every document and commit
    pub fn clear(&self) -> Result<()> {
        let mut writer = self.write_lock()?;
        writer.delete_all_documents()?;
        writer.commit()?;
        drop(writer);

        self.reader.reload()?;
        self.pending_lengths.lock().clear();
        self.doc_lengths.lock().clear();
        Ok(())
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.num_docs() == 0
    }

    /// Synchronous search used by the backend impl
    pub fn search(&self, query: &LexicalQuery) -> Result<Vec<LexicalHit>> {
        if query.terms.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }

        let term_clauses: Vec<(Occur, Box<dyn Query>)> = query
            .terms
            .iter()
            .map(|term| {
                let q: Box<dyn Query> = Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.content, term),
                    IndexRecordOption::WithFreqs,
                ));
                (Occur::Should, q)
            })
            .collect();

        let terms_query: Box<dyn Query> = Box::new(BooleanQuery::new(term_clauses));
        let interpreter_query: Box<dyn Query> = Box::new(TermQuery::new(
            Term::from_field_text(self.fields.interpreter, query.interpreter.as_str()),
            IndexRecordOption::Basic,
        ));
        let mut clauses = vec![
            (Occur::Must, terms_query),
            (Occur::Must, interpreter_query),
        ];
        if !query.theme_codes.is_empty() {
            let theme_clauses: Vec<(Occur, Box<dyn Query>)> = query
                .theme_codes
                .iter()
                .map(|code| {
                    let q: Box<dyn Query> = Box::new(TermQuery::new(
                        Term::from_field_text(self.fields.themes, code),
                        IndexRecordOption::Basic,
                    ));
                    (Occur::Should, q)
                })
                .collect();
            let themes_query: Box<dyn Query> = Box::new(BooleanQuery::new(theme_clauses));
            clauses.push((Occur::Must, themes_query));
        }

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(
            &BooleanQuery::new(clauses),
            &TopDocs::with_limit(query.limit),
        )?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            hits.push(self.hit_from_doc(&doc, score));
        }
        debug!(terms = query.terms.len(), hits = hits.len(), "tantivy lexical search");
        Ok(hits)
    }

    fn hit_from_doc(&self, doc: &TantivyDocument, score: f32) -> LexicalHit {
        let text = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let metadata = serde_json::from_str::<FragmentMetadata>(&text(self.fields.metadata_json))
            .unwrap_or_else(|_| FragmentMetadata::new(text(self.fields.source)));

        LexicalHit {
            fragment_id: text(self.fields.id),
            raw_score: score,
            content: text(self.fields.content),
            metadata,
            themes: doc
                .get_all(self.fields.themes)
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect(),
        }
    }

    fn rebuild_doc_lengths(&self) -> Result<()> {
        let searcher = self.reader.searcher();
        let mut lengths = self.doc_lengths.lock();
        for (ord, segment) in searcher.segment_readers().iter().enumerate() {
            let segment_ord = u32::try_from(ord).map_err(|_| {
                RagError::SearchIndex(tantivy::TantivyError::InternalError(
                    "segment ordinal overflow".into(),
                ))
            })?;
            for doc_id in segment.doc_ids_alive() {
                let doc: TantivyDocument = searcher.doc(DocAddress::new(segment_ord, doc_id))?;
                let id = doc.get_first(self.fields.id).and_then(|v| v.as_str());
                let content = doc.get_first(self.fields.content).and_then(|v| v.as_str());
                if let (Some(id), Some(content)) = (id, content) {
                    lengths.insert(id.to_string(), tokenize(content).len());
                }
            }
        }
        Ok(())
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, IndexWriter>> {
        self.writer.write().map_err(|e| {
            RagError::SearchIndex(tantivy::TantivyError::InternalError(format!(
                "Failed to acquire write lock: {e}"
            )))
        })
    }
}

#[async_trait]
impl LexicalBackend for TantivyFragmentIndex {
    async fn lexical_search(&self, query: &LexicalQuery) -> Result<Vec<LexicalHit>> {
        self.search(query)
    }

    #[allow(clippy::cast_precision_loss)]
    fn corpus_stats(&self) -> Option<CorpusStats> {
        let lengths = self.doc_lengths.lock();
        if lengths.is_empty() {
            return None;
        }
        let total: usize = lengths.values().sum();
        Some(CorpusStats {
            doc_count: lengths.len() as u64,
            avg_doc_len: total as f32 / lengths.len() as f32,
        })
    }

    fn name(&self) -> &str {
        "tantivy"
    }
}

fn fragment_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(AsciiFoldingFilter)
        .build()
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    let text_options = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(FRAGMENT_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();

    builder.add_text_field("id", STRING | STORED);
    builder.add_text_field("content", text_options);
    builder.add_text_field("interpreter", STRING | STORED);
    builder.add_text_field("source", STRING | STORED);
    builder.add_text_field("themes", STRING | STORED);
    builder.add_text_field("metadata_json", STORED);

    builder.build()
}

fn extract_fields(schema: &Schema) -> Result<FragmentFields> {
    let field = |name: &str| {
        schema.get_field(name).map_err(|_| {
            RagError::SearchIndex(tantivy::TantivyError::SchemaError(format!(
                "missing {name} field"
            )))
        })
    };
    Ok(FragmentFields {
        id: field("id")?,
        content: field("content")?,
        interpreter: field("interpreter")?,
        source: field("source")?,
        themes: field("themes")?,
        metadata_json: field("metadata_json")?,
    })
}
