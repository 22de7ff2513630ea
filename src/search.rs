use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy};

use crate::blocks;
use crate::pages::{Page, PageStore};
use crate::tags::TagStore;

// Search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub modified: i64,
    pub score: f32,
}

// RAM-only Tantivy index over pages; rebuilt on demand, never persisted
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id_field: Field,
    title_field: Field,
    body_field: Field,
    tags_field: Field,
    modified_field: Field,
}

// Utility: Generate preview from page body text
fn generate_preview(body: &str) -> String {
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(100).collect())
        .unwrap_or_default()
}

// Utility: Text indexed as a page's body (blocks plus property values)
fn page_body(page: &Page) -> String {
    let mut body = blocks::plain_text(&page.content);
    for value in page.properties.values() {
        body.push('\n');
        body.push_str(&value.to_plain_string());
    }
    body
}

impl SearchIndex {
    pub fn new() -> Result<Self> {
        // Build schema
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let title_field = schema_builder.add_text_field("title", TEXT | STORED);
        let body_field = schema_builder.add_text_field("body", TEXT | STORED);
        let tags_field = schema_builder.add_text_field("tags", TEXT);
        let modified_field = schema_builder.add_i64_field("modified", INDEXED | STORED);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        // Reload explicitly after each commit so results are visible immediately
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        let writer = index.writer_with_num_threads(1, 20_000_000)?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            id_field,
            title_field,
            body_field,
            tags_field,
            modified_field,
        })
    }

    fn add_page(&self, writer: &mut IndexWriter, page: &Page, tags: &TagStore) -> Result<()> {
        let tag_names: Vec<&str> = tags
            .resolve(&page.tags)
            .iter()
            .map(|t| t.name.as_str())
            .collect();

        writer.add_document(doc!(
            self.id_field => page.id.as_str(),
            self.title_field => page.title.as_str(),
            self.body_field => page_body(page),
            self.tags_field => tag_names.join(" "),
            self.modified_field => page.updated_at.timestamp(),
        ))?;
        Ok(())
    }

    pub fn index_page(&self, page: &Page, tags: &TagStore) -> Result<()> {
        let mut writer = self.writer.lock().expect("search writer mutex");

        // Delete existing document with this ID
        let id_term = tantivy::Term::from_field_text(self.id_field, &page.id);
        writer.delete_term(id_term);

        self.add_page(&mut writer, page, tags)?;
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    pub fn delete_page(&self, id: &str) -> Result<()> {
        let mut writer = self.writer.lock().expect("search writer mutex");
        let id_term = tantivy::Term::from_field_text(self.id_field, id);
        writer.delete_term(id_term);
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(
            &self.index,
            vec![self.title_field, self.body_field, self.tags_field],
        );

        // Parse query, fall back to prefix query if parsing fails
        let query = query_parser
            .parse_query(query_str)
            .or_else(|_| query_parser.parse_query(&format!("{}*", query_str)))?;

        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;

            let id = doc
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            let title = doc
                .get_first(self.title_field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            let body = doc
                .get_first(self.body_field)
                .and_then(|v| v.as_str())
                .unwrap_or("");

            let modified = doc
                .get_first(self.modified_field)
                .and_then(|v| v.as_i64())
                .unwrap_or(0);

            results.push(SearchResult {
                id,
                title,
                preview: generate_preview(body),
                modified,
                score,
            });
        }

        Ok(results)
    }

    pub fn rebuild(&self, pages: &PageStore, tags: &TagStore) -> Result<()> {
        let mut writer = self.writer.lock().expect("search writer mutex");
        writer.delete_all_documents()?;

        for page in pages.list() {
            self.add_page(&mut writer, page, tags)?;
        }

        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }
}

// Fallback search when the Tantivy index isn't available
pub fn fallback_search(pages: &PageStore, query: &str, limit: usize) -> Vec<SearchResult> {
    let query_lower = query.to_lowercase();

    let mut results: Vec<SearchResult> = pages
        .list()
        .iter()
        .filter_map(|page| {
            let body = page_body(page);

            let mut score = 0.0f32;
            if page.title.to_lowercase().contains(&query_lower) {
                score += 50.0;
            }
            if body.to_lowercase().contains(&query_lower) {
                score += 10.0;
            }

            if score > 0.0 {
                Some(SearchResult {
                    id: page.id.clone(),
                    title: page.title.clone(),
                    preview: generate_preview(&body),
                    modified: page.updated_at.timestamp(),
                    score,
                })
            } else {
                None
            }
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results
}
