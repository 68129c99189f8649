//! XPath 1.0 query engine
//!
//! Supports location paths over all axes except `following`, `preceding`
//! and `namespace`, predicates, the operators, and the core function library
//! minus `id()`, `lang()`, `translate()` and the namespace functions.
//! Variables are not supported.
//!
//! Compiled expressions are kept in a small LRU cache, so evaluating the same
//! expression string repeatedly only parses it once.

mod eval;
mod lexer;
mod parser;
mod value;

pub use value::{NodeRef, Value};

use crate::document::Document;
use crate::error::Result;
use crate::node::Node;
use lru::LruCache;
use parser::Expr;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Evaluates path expressions against a [`Document`].
///
/// [`DocumentSession`](crate::DocumentSession) is generic over this trait,
/// so another expression language can be plugged in.
pub trait QueryEngine {
    /// Evaluates `expression` with `scope` as the context node.
    ///
    /// Node-set results must be in document order without duplicates.
    fn evaluate(&self, document: &Document, expression: &str, scope: Node) -> Result<Value>;
}

const DEFAULT_CACHE_CAPACITY: usize = 64;

/// The default [`QueryEngine`].
pub struct XPathEngine {
    cache: Mutex<LruCache<String, Arc<Expr>>>,
}

impl XPathEngine {
    pub fn new() -> XPathEngine {
        XPathEngine::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Creates an engine caching up to `capacity` compiled expressions (at least 1).
    pub fn with_capacity(capacity: usize) -> XPathEngine {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        XPathEngine {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn compile(&self, expression: &str) -> Result<Arc<Expr>> {
        // a poisoned lock only means another thread panicked mid-lookup
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(expr) = cache.get(expression) {
            return Ok(Arc::clone(expr));
        }
        let expr = Arc::new(parser::parse(expression)?);
        tracing::trace!(expression, "compiled xpath expression");
        cache.put(expression.to_string(), Arc::clone(&expr));
        Ok(expr)
    }
}

impl Default for XPathEngine {
    fn default() -> Self {
        XPathEngine::new()
    }
}

impl std::fmt::Debug for XPathEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XPathEngine").finish_non_exhaustive()
    }
}

impl QueryEngine for XPathEngine {
    fn evaluate(&self, document: &Document, expression: &str, scope: Node) -> Result<Value> {
        let expr = self.compile(expression)?;
        eval::evaluate(document, &expr, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::str::FromStr;

    #[test]
    fn test_cache_reuses_compiled_expression() {
        let engine = XPathEngine::with_capacity(1);
        let first = engine.compile("/a/b").unwrap();
        let second = engine.compile("/a/b").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        // evicted by the next expression
        engine.compile("/c").unwrap();
        let third = engine.compile("/a/b").unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_zero_capacity() {
        let engine = XPathEngine::with_capacity(0);
        let doc = Document::from_str("<a><b/></a>").unwrap();
        let value = engine.evaluate(&doc, "/a/b", doc.container()).unwrap();
        assert_eq!(value.as_nodes().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_expression_not_cached() {
        let engine = XPathEngine::new();
        let doc = Document::new();
        for _ in 0..2 {
            assert!(matches!(
                engine.evaluate(&doc, "/a[", doc.container()),
                Err(Error::Query(_))
            ));
        }
    }
}
