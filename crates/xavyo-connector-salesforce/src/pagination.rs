//! Cursor-based pagination.
//!
//! The remote API pages query results through `nextRecordsUrl`. That URL is
//! surfaced to callers as an opaque page token: an empty token starts a
//! fresh, bounded query and an empty token on output ends the listing.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::query::{Query, PRIMARY_KEY};

/// Page size used when a caller passes a non-positive size.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Clamp a caller-supplied page size.
#[must_use]
pub fn effective_page_size(requested: i64) -> u32 {
    if requested <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        u32::try_from(requested).unwrap_or(u32::MAX)
    }
}

/// What the transport should fetch for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    /// Continuation URL returned by a previous page, used verbatim.
    Cursor(String),
    /// Rendered query text for a fresh listing.
    Query(String),
}

/// Decide between a continuation cursor and a fresh bounded query.
///
/// With a non-empty cursor the query is ignored. Otherwise the query is
/// ordered by primary key and limited to the page size.
pub fn resolve_query_target(query: &Query, cursor: &str, page_size: i64) -> FetchTarget {
    if !cursor.is_empty() {
        return FetchTarget::Cursor(cursor.to_string());
    }

    let bounded = query
        .clone()
        .order_by(PRIMARY_KEY)
        .limit(effective_page_size(page_size));
    FetchTarget::Query(bounded.to_string())
}

/// Response shape of the query endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub total_size: Option<i64>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub next_records_url: Option<String>,
    #[serde(default)]
    pub records: Vec<Value>,
}

impl QueryResponse {
    /// Page token for the next call.
    #[must_use]
    pub fn continuation(&self) -> Continuation {
        interpret_response(self.done, self.next_records_url.as_deref().unwrap_or(""))
    }
}

/// Whether a listing continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    Terminal,
    More(String),
}

impl Continuation {
    /// Page token form: empty for terminal.
    #[must_use]
    pub fn into_token(self) -> String {
        match self {
            Continuation::Terminal => String::new(),
            Continuation::More(cursor) => cursor,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Continuation::Terminal)
    }
}

/// Map the remote `done` flag and next cursor onto a continuation.
///
/// `done = false` with no cursor cannot be followed and is treated as the end
/// of the listing.
pub fn interpret_response(done: bool, next_cursor: &str) -> Continuation {
    if done {
        return Continuation::Terminal;
    }
    if next_cursor.is_empty() {
        warn!("query response not done but carries no next cursor, ending listing");
        return Continuation::Terminal;
    }
    Continuation::More(next_cursor.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::tables;

    #[test]
    fn test_cursor_wins_over_query() {
        let query = Query::new(tables::USER);
        let target = resolve_query_target(&query, "/services/data/v64.0/query/01g-2000", 50);
        assert_eq!(
            target,
            FetchTarget::Cursor("/services/data/v64.0/query/01g-2000".to_string())
        );
    }

    #[test]
    fn test_fresh_query_is_bounded_and_ordered() {
        let query = Query::new(tables::USER_ROLE);
        let target = resolve_query_target(&query, "", 25);
        assert_eq!(
            target,
            FetchTarget::Query("SELECT Name,Id FROM UserRole ORDER BY Id LIMIT 25".to_string())
        );
        // the caller's query is untouched
        assert!(query.limit_value().is_none());
    }

    #[test]
    fn test_non_positive_page_size_defaults() {
        assert_eq!(effective_page_size(0), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_page_size(-5), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_page_size(7), 7);

        let target = resolve_query_target(&Query::new(tables::USER_ROLE), "", 0);
        assert_eq!(
            target,
            FetchTarget::Query("SELECT Name,Id FROM UserRole ORDER BY Id LIMIT 100".to_string())
        );
    }

    #[test]
    fn test_interpret_response() {
        assert_eq!(interpret_response(true, "/next"), Continuation::Terminal);
        assert_eq!(
            interpret_response(false, "/next"),
            Continuation::More("/next".to_string())
        );
        assert_eq!(interpret_response(false, ""), Continuation::Terminal);
        assert_eq!(Continuation::Terminal.into_token(), "");
    }

    #[test]
    fn test_query_response_deserialize() {
        let response: QueryResponse = serde_json::from_str(
            r#"{
                "totalSize": 3,
                "done": false,
                "nextRecordsUrl": "/services/data/v64.0/query/01gD-2",
                "records": [{"Id": "0051"}, {"Id": "0052"}]
            }"#,
        )
        .unwrap();

        assert_eq!(response.total_size, Some(3));
        assert_eq!(response.records.len(), 2);
        assert_eq!(
            response.continuation().into_token(),
            "/services/data/v64.0/query/01gD-2"
        );
    }
}
