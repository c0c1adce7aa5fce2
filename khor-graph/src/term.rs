//! RDF term to JSON conversion for query bindings

use oxigraph::model::vocab::xsd;
use oxigraph::model::{Literal, Term};
use serde_json::Value;

/// Convert a term into the JSON value stored in contexts and receipts.
///
/// Numeric and boolean literals become JSON numbers/booleans so predicate
/// thresholds and template filters can work on them directly; IRIs become
/// their string form, blank nodes keep the `_:` prefix.
pub fn term_to_json(term: &Term) -> Value {
    match term {
        Term::NamedNode(named) => Value::String(named.as_str().to_string()),
        Term::BlankNode(blank) => Value::String(format!("_:{}", blank.as_str())),
        Term::Literal(literal) => literal_to_json(literal),
    }
}

fn literal_to_json(literal: &Literal) -> Value {
    let datatype = literal.datatype();
    let lexical = literal.value();
    if datatype == xsd::BOOLEAN {
        if let Ok(b) = lexical.parse::<bool>() {
            return Value::Bool(b);
        }
    } else if datatype == xsd::INTEGER
        || datatype == xsd::LONG
        || datatype == xsd::INT
        || datatype == xsd::SHORT
        || datatype == xsd::BYTE
        || datatype == xsd::NON_NEGATIVE_INTEGER
        || datatype == xsd::POSITIVE_INTEGER
        || datatype == xsd::UNSIGNED_LONG
        || datatype == xsd::UNSIGNED_INT
    {
        if let Ok(i) = lexical.parse::<i64>() {
            return Value::from(i);
        }
    } else if datatype == xsd::DECIMAL || datatype == xsd::DOUBLE || datatype == xsd::FLOAT {
        if let Ok(f) = lexical.parse::<f64>() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(lexical.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::NamedNode;

    #[test]
    fn integer_literal_becomes_number() {
        let term = Term::Literal(Literal::new_typed_literal("28", xsd::INTEGER));
        assert_eq!(term_to_json(&term), Value::from(28));
    }

    #[test]
    fn boolean_literal_becomes_bool() {
        let term = Term::Literal(Literal::new_typed_literal("true", xsd::BOOLEAN));
        assert_eq!(term_to_json(&term), Value::Bool(true));
    }

    #[test]
    fn decimal_literal_becomes_number() {
        let term = Term::Literal(Literal::new_typed_literal("2.5", xsd::DECIMAL));
        assert_eq!(term_to_json(&term), Value::from(2.5));
    }

    #[test]
    fn plain_literal_stays_string() {
        let term = Term::Literal(Literal::new_simple_literal("Alice"));
        assert_eq!(term_to_json(&term), Value::String("Alice".into()));
    }

    #[test]
    fn iri_becomes_plain_string() {
        let term = Term::NamedNode(NamedNode::new("https://example.org/x").unwrap());
        assert_eq!(term_to_json(&term), Value::String("https://example.org/x".into()));
    }

    #[test]
    fn malformed_numeric_lexical_falls_back_to_string() {
        let term = Term::Literal(Literal::new_typed_literal("not-a-number", xsd::INTEGER));
        assert_eq!(term_to_json(&term), Value::String("not-a-number".into()));
    }
}
