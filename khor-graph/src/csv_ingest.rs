//! CSV to RDF adapter
//!
//! One entity per data row: the row becomes a fresh blank node typed with
//! the entity class, one quad per non-empty cell. Literal datatypes are
//! detected per cell: integer, decimal, boolean, date, else string.

use crate::error::{GraphError, GraphResult};
use crate::store::GraphStore;
use chrono::NaiveDate;
use oxigraph::model::vocab::{rdf, xsd};
use oxigraph::model::{BlankNode, GraphName, Literal, NamedNode, Quad, Term};

impl GraphStore {
    /// Convert RFC 4180 CSV text into quads and insert them.
    ///
    /// The first record names the columns; each column maps to the predicate
    /// `base_iri + column_name` (whitespace folded to `_`). Returns the
    /// number of quads added.
    pub fn ingest_csv(
        &self,
        text: &str,
        base_iri: &str,
        entity_class_iri: &str,
    ) -> GraphResult<usize> {
        let quads = csv_to_quads(text, base_iri, entity_class_iri)?;
        self.insert_quads(&quads)
    }
}

/// Build the quads for a CSV source without touching any store
pub fn csv_to_quads(text: &str, base_iri: &str, entity_class_iri: &str) -> GraphResult<Vec<Quad>> {
    let entity_class =
        NamedNode::new(entity_class_iri).map_err(|e| GraphError::InvalidIri(e.to_string()))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| GraphError::Csv(e.to_string()))?
        .clone();
    let predicates: Vec<NamedNode> = headers
        .iter()
        .map(|column| {
            let local = column.trim().replace(char::is_whitespace, "_");
            NamedNode::new(format!("{}{}", base_iri, local))
                .map_err(|e| GraphError::InvalidIri(e.to_string()))
        })
        .collect::<GraphResult<_>>()?;

    let mut quads = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| GraphError::Csv(e.to_string()))?;
        let row = BlankNode::default();
        quads.push(Quad::new(
            row.clone(),
            NamedNode::from(rdf::TYPE),
            entity_class.clone(),
            GraphName::DefaultGraph,
        ));
        for (index, cell) in record.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let Some(predicate) = predicates.get(index) else {
                continue;
            };
            quads.push(Quad::new(
                row.clone(),
                predicate.clone(),
                detect_literal(cell),
                GraphName::DefaultGraph,
            ));
        }
    }
    Ok(quads)
}

/// Type a cell by simple detection; the lexical form is kept verbatim
fn detect_literal(cell: &str) -> Term {
    if cell.parse::<i64>().is_ok() {
        return Literal::new_typed_literal(cell, xsd::INTEGER).into();
    }
    if cell.contains('.') && cell.parse::<f64>().is_ok() {
        return Literal::new_typed_literal(cell, xsd::DECIMAL).into();
    }
    if cell == "true" || cell == "false" {
        return Literal::new_typed_literal(cell, xsd::BOOLEAN).into();
    }
    if NaiveDate::parse_from_str(cell, "%Y-%m-%d").is_ok() {
        return Literal::new_typed_literal(cell, xsd::DATE).into();
    }
    Literal::new_typed_literal(cell, xsd::STRING).into()
}
