//! SPARQL query form detection

/// The query forms the store evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryForm {
    Select,
    Ask,
    Construct,
    Describe,
    Unknown,
}

/// Detect the query form from the first keyword after the prologue.
///
/// `PREFIX pfx: <iri>` and `BASE <iri>` declarations are skipped so queries
/// with a prologue classify the same as bare ones.
pub fn detect_query_form(query: &str) -> QueryForm {
    let mut tokens = query.split_whitespace();
    while let Some(token) = tokens.next() {
        let upper = token.to_ascii_uppercase();
        match upper.as_str() {
            "PREFIX" => {
                // prefix name and IRI
                tokens.next();
                tokens.next();
            }
            "BASE" => {
                tokens.next();
            }
            _ => {
                return match upper.as_str() {
                    s if s.starts_with("SELECT") => QueryForm::Select,
                    s if s.starts_with("ASK") => QueryForm::Ask,
                    s if s.starts_with("CONSTRUCT") => QueryForm::Construct,
                    s if s.starts_with("DESCRIBE") => QueryForm::Describe,
                    _ => QueryForm::Unknown,
                };
            }
        }
    }
    QueryForm::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_bare_forms() {
        assert_eq!(detect_query_form("SELECT * WHERE { ?s ?p ?o }"), QueryForm::Select);
        assert_eq!(detect_query_form("ask { ?s ?p ?o }"), QueryForm::Ask);
        assert_eq!(
            detect_query_form("CONSTRUCT { ?s ?p ?o } WHERE { ?s ?p ?o }"),
            QueryForm::Construct
        );
    }

    #[test]
    fn skips_prologue() {
        let query = "PREFIX ex: <https://example.org/>\nPREFIX foaf: <http://xmlns.com/foaf/0.1/>\nASK { ?s ex:p ?o }";
        assert_eq!(detect_query_form(query), QueryForm::Ask);
    }

    #[test]
    fn skips_base() {
        let query = "BASE <https://example.org/> SELECT ?s WHERE { ?s ?p ?o }";
        assert_eq!(detect_query_form(query), QueryForm::Select);
    }

    #[test]
    fn unknown_for_garbage() {
        assert_eq!(detect_query_form("DELETE WHERE { ?s ?p ?o }"), QueryForm::Unknown);
        assert_eq!(detect_query_form(""), QueryForm::Unknown);
    }

    #[test]
    fn ask_with_brace_attached() {
        assert_eq!(detect_query_form("ASK{ ?s ?p ?o }"), QueryForm::Ask);
    }
}
