//! Copy-on-write quad store
//!
//! `GraphStore` is the single-writer mutable handle; `GraphSnapshot` is the
//! immutable view evaluations hold. An ingest parses into a fresh store
//! seeded with the current snapshot's quads and swaps the pointer only once
//! the whole source parsed, so a failed parse leaves the store untouched and
//! no reader ever sees a half-applied ingest. Blank nodes are scoped per
//! parse, re-scoped across ingests by the parser.

use crate::error::{GraphError, GraphResult};
use crate::query::{detect_query_form, QueryForm};
use crate::term::term_to_json;
use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::Quad;
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// One row of SELECT bindings: variable name to JSON value
pub type BindingRow = BTreeMap<String, Value>;

/// Immutable view of the quad set at a point in time
pub struct GraphSnapshot {
    store: Store,
    generation: u64,
    len: usize,
}

impl GraphSnapshot {
    fn empty() -> GraphResult<Self> {
        Ok(Self {
            store: Store::new().map_err(|e| GraphError::Store(e.to_string()))?,
            generation: 0,
            len: 0,
        })
    }

    /// Number of quads in this snapshot
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ingest generation this snapshot was produced by
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Evaluate a SELECT query; rows follow ORDER BY when present
    pub fn select(&self, sparql: &str) -> GraphResult<Vec<BindingRow>> {
        match self.query(sparql)? {
            QueryResults::Solutions(solutions) => {
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution.map_err(|e| GraphError::Query(e.to_string()))?;
                    let mut row = BTreeMap::new();
                    for (var, term) in &solution {
                        row.insert(var.as_str().to_string(), term_to_json(term));
                    }
                    rows.push(row);
                }
                Ok(rows)
            }
            _ => Err(GraphError::Query(
                "Expected SELECT query results".to_string(),
            )),
        }
    }

    /// Evaluate an ASK query
    pub fn ask(&self, sparql: &str) -> GraphResult<bool> {
        match self.query(sparql)? {
            QueryResults::Boolean(b) => Ok(b),
            _ => Err(GraphError::Query("Expected ASK query results".to_string())),
        }
    }

    /// Evaluate a CONSTRUCT (or DESCRIBE) query into JSON triples
    pub fn construct(&self, sparql: &str) -> GraphResult<Vec<Value>> {
        match self.query(sparql)? {
            QueryResults::Graph(triples) => {
                let mut out = Vec::new();
                for triple in triples {
                    let triple = triple.map_err(|e| GraphError::Query(e.to_string()))?;
                    out.push(serde_json::json!({
                        "subject": triple.subject.to_string(),
                        "predicate": triple.predicate.as_str(),
                        "object": term_to_json(&triple.object),
                    }));
                }
                Ok(out)
            }
            _ => Err(GraphError::Query(
                "Expected CONSTRUCT query results".to_string(),
            )),
        }
    }

    fn query(&self, sparql: &str) -> GraphResult<QueryResults> {
        self.store
            .query(sparql)
            .map_err(|e| GraphError::Query(e.to_string()))
    }

    /// Query form the evaluator would pick for this text
    pub fn classify(&self, sparql: &str) -> QueryForm {
        detect_query_form(sparql)
    }

    /// Serialize the snapshot as sorted N-Quads, one statement per line
    pub fn to_nquads(&self) -> GraphResult<String> {
        let mut lines = Vec::with_capacity(self.len);
        for quad in self.store.iter() {
            let quad = quad.map_err(|e| GraphError::Store(e.to_string()))?;
            lines.push(format!("{} .", quad));
        }
        lines.sort();
        Ok(lines.join("\n"))
    }
}

/// Mutable store handle; the orchestrator is the sole writer
pub struct GraphStore {
    current: RwLock<Arc<GraphSnapshot>>,
}

impl GraphStore {
    pub fn new() -> GraphResult<Self> {
        Ok(Self {
            current: RwLock::new(Arc::new(GraphSnapshot::empty()?)),
        })
    }

    /// Take the current snapshot; the caller holds it for the whole evaluation
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Parse Turtle and insert its quads; returns the number of quads added
    pub fn ingest_turtle(&self, text: &str, base_iri: Option<&str>) -> GraphResult<usize> {
        self.ingest(RdfFormat::Turtle, text, base_iri, None)
    }

    /// Parse a named Turtle file's content; the name feeds syntax errors
    pub fn ingest_turtle_file(
        &self,
        text: &str,
        base_iri: Option<&str>,
        file: &str,
    ) -> GraphResult<usize> {
        self.ingest(RdfFormat::Turtle, text, base_iri, Some(file))
    }

    /// Parse N-Quads and insert; returns the number of quads added
    pub fn ingest_nquads(&self, text: &str) -> GraphResult<usize> {
        self.ingest(RdfFormat::NQuads, text, None, None)
    }

    fn ingest(
        &self,
        format: RdfFormat,
        text: &str,
        base_iri: Option<&str>,
        file: Option<&str>,
    ) -> GraphResult<usize> {
        // The write lock is held across the whole rebuild: single writer,
        // and readers keep serving the previous snapshot meanwhile.
        let mut current = self.current.write();
        let next = Self::seeded_from(&current)?;

        let mut parser = RdfParser::from_format(format);
        if let Some(base) = base_iri {
            parser = parser
                .with_base_iri(base)
                .map_err(|e| GraphError::InvalidIri(e.to_string()))?;
        }
        next.load_from_reader(parser, text.as_bytes())
            .map_err(|e| GraphError::syntax(file, e.to_string()))?;

        let len = next.len().map_err(|e| GraphError::Store(e.to_string()))?;
        let added = len.saturating_sub(current.len);
        debug!(added, total = len, "ingested RDF source");
        *current = Arc::new(GraphSnapshot {
            store: next,
            generation: current.generation + 1,
            len,
        });
        Ok(added)
    }

    /// Insert already-built quads (CSV adapter, derived triples)
    pub fn insert_quads(&self, quads: &[Quad]) -> GraphResult<usize> {
        let mut current = self.current.write();
        let next = Self::seeded_from(&current)?;
        for quad in quads {
            next.insert(quad)
                .map_err(|e| GraphError::Store(e.to_string()))?;
        }
        let len = next.len().map_err(|e| GraphError::Store(e.to_string()))?;
        let added = len.saturating_sub(current.len);
        *current = Arc::new(GraphSnapshot {
            store: next,
            generation: current.generation + 1,
            len,
        });
        Ok(added)
    }

    /// Drop all quads
    pub fn clear(&self) -> GraphResult<()> {
        let mut current = self.current.write();
        *current = Arc::new(GraphSnapshot {
            store: Store::new().map_err(|e| GraphError::Store(e.to_string()))?,
            generation: current.generation + 1,
            len: 0,
        });
        Ok(())
    }

    fn seeded_from(snapshot: &GraphSnapshot) -> GraphResult<Store> {
        let next = Store::new().map_err(|e| GraphError::Store(e.to_string()))?;
        for quad in snapshot.store.iter() {
            let quad = quad.map_err(|e| GraphError::Store(e.to_string()))?;
            next.insert(&quad)
                .map_err(|e| GraphError::Store(e.to_string()))?;
        }
        Ok(next)
    }
}
