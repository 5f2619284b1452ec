//! Parent span tracking for deferred queries.
//!
//! A [`PendingQuery`](crate::PendingQuery) is built eagerly and executed
//! whenever it is awaited. By then the span that was current at build time
//! may no longer be entered, so the registry remembers it per query object
//! and hands it back as the fallback parent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::Span;

/// Identity of a deferred query object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(u64);

/// Owned identity handle for one query object.
///
/// Dropping the token removes the query's association. The token only holds
/// a weak reference to its registry, so neither side keeps the other alive.
#[derive(Debug)]
pub struct QueryToken {
    id: QueryId,
    registry: Weak<RegistryInner>,
}

impl QueryToken {
    pub fn id(&self) -> QueryId {
        self.id
    }
}

impl Drop for QueryToken {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            let removed = inner.parents.lock().remove(&self.id);
            drop(removed);
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    parents: Mutex<HashMap<QueryId, Span>>,
}

/// Side table from query identity to the span current when it was built.
#[derive(Debug, Clone, Default)]
pub struct ParentSpanRegistry {
    inner: Arc<RegistryInner>,
}

impl ParentSpanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh identity for a new query object.
    pub fn register(&self) -> QueryToken {
        let id = QueryId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        QueryToken {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Remember `ambient` as the fallback parent of `token`'s query.
    ///
    /// Without an ambient span this keeps whatever was stored before. A
    /// different span replaces the stored one.
    pub fn associate(&self, token: &QueryToken, ambient: Option<&Span>) {
        if !self.owns(token) {
            return;
        }
        let Some(span) = ambient.filter(|span| span.id().is_some()) else {
            return;
        };

        let mut parents = self.inner.parents.lock();
        let unchanged = parents
            .get(&token.id)
            .is_some_and(|stored| stored.id() == span.id());
        if !unchanged {
            let stale = parents.insert(token.id, span.clone());
            drop(parents);
            drop(stale);
        }
    }

    /// Parent for a query about to execute: the current span if there is
    /// one, otherwise the span stored at build time.
    pub fn resolve_parent(&self, token: &QueryToken) -> Option<Span> {
        current_span().or_else(|| {
            if !self.owns(token) {
                return None;
            }
            self.inner.parents.lock().get(&token.id).cloned()
        })
    }

    /// Number of live associations.
    pub fn len(&self) -> usize {
        self.inner.parents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.parents.lock().is_empty()
    }

    /// Drop every association.
    pub fn clear(&self) {
        let parents = std::mem::take(&mut *self.inner.parents.lock());
        drop(parents);
    }

    fn owns(&self, token: &QueryToken) -> bool {
        std::ptr::eq(token.registry.as_ptr(), Arc::as_ptr(&self.inner))
    }
}

/// The current span, if it is a real one.
pub(crate) fn current_span() -> Option<Span> {
    let span = Span::current();
    span.id().map(|_| span)
}
