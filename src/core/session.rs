use crate::core::form::{Fingerprint, FormState};
use crate::dom::{Document, Node};
use crate::errors::{BrowserError, Result};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Active(u64),
    /// The backend moved on to `live` while `cached` is still held.
    Stale { cached: u64, live: u64 },
}

/// What every backend caches between interactions: one parsed snapshot and
/// the form state parsed from it.
#[derive(Debug, Default)]
pub struct SessionCache {
    snapshot: Option<Rc<Document>>,
    forms: HashMap<Fingerprint, FormState>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `live` is the backend's current response generation, `None` before
    /// anything was loaded.
    pub fn state(&self, live: Option<u64>) -> SessionState {
        let live = match live {
            Some(live) => live,
            None => return SessionState::NotStarted,
        };
        match self.snapshot.as_ref().and_then(|doc| doc.generation()) {
            Some(cached) if cached == live => SessionState::Active(live),
            Some(cached) => SessionState::Stale { cached, live },
            // nothing parsed yet for this response
            None => SessionState::Stale { cached: 0, live },
        }
    }

    /// The snapshot for `live`, loading a fresh one (and dropping every
    /// cached form) when the generation moved.
    pub fn document(
        &mut self,
        live: Option<u64>,
        load: impl FnOnce(u64) -> Result<Document>,
    ) -> Result<Rc<Document>> {
        match self.state(live) {
            SessionState::NotStarted => Err(BrowserError::NotStarted),
            SessionState::Active(_) => self.snapshot.clone().ok_or(BrowserError::NotStarted),
            SessionState::Stale { cached, live } => {
                debug!(cached, live, forms = self.forms.len(), "snapshot stale, reloading");
                self.clear();
                let document = Rc::new(load(live)?);
                self.snapshot = Some(document.clone());
                Ok(document)
            }
        }
    }

    /// Swaps in a re-read of the same generation, keeping cached forms.
    pub fn refresh(&mut self, document: Document) -> Rc<Document> {
        let document = Rc::new(document);
        self.snapshot = Some(document.clone());
        document
    }

    pub fn snapshot(&self) -> Option<&Rc<Document>> {
        self.snapshot.as_ref()
    }

    /// Rejects nodes parsed from an older response.
    pub fn ensure_current(&self, node: &Node, live: Option<u64>) -> Result<()> {
        let live = live.ok_or(BrowserError::NotStarted)?;
        match node.generation() {
            Some(generation) if generation == live => Ok(()),
            Some(generation) => Err(BrowserError::StaleNode {
                node: generation,
                current: live,
            }),
            None => Err(BrowserError::Detached),
        }
    }

    /// Form state for `scope`, parsed on first use.
    pub fn form(&mut self, scope: &Node) -> &mut FormState {
        let fingerprint = Fingerprint::of(scope);
        self.forms.entry(fingerprint).or_insert_with(|| {
            debug!(form = %scope.path(), "parsing form state");
            FormState::parse(scope)
        })
    }

    pub fn forget_form(&mut self, scope: &Node) {
        self.forms.remove(&Fingerprint::of(scope));
    }

    pub fn cached_forms(&self) -> usize {
        self.forms.len()
    }

    pub fn clear(&mut self) {
        self.snapshot = None;
        self.forms.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Crawler;

    const PAGE: &str = "<form><input name=a value=1></form>";

    fn load(generation: u64) -> Result<Document> {
        Ok(Document::parse_snapshot(PAGE, generation, None))
    }

    #[test]
    fn test_not_started() {
        let mut cache = SessionCache::new();
        assert_eq!(cache.state(None), SessionState::NotStarted);
        assert!(matches!(cache.document(None, load), Err(BrowserError::NotStarted)));
    }

    #[test]
    fn test_generation_change_drops_forms() {
        let mut cache = SessionCache::new();
        let first = cache.document(Some(1), load).unwrap();
        assert_eq!(cache.state(Some(1)), SessionState::Active(1));

        let form = Crawler::new(first.clone(), None).filter("form").first().unwrap();
        cache.form(&form);
        assert_eq!(cache.cached_forms(), 1);

        // same generation: same snapshot, forms kept
        let again = cache.document(Some(1), load).unwrap();
        assert!(Rc::ptr_eq(&first, &again));
        assert_eq!(cache.cached_forms(), 1);

        assert_eq!(cache.state(Some(2)), SessionState::Stale { cached: 1, live: 2 });
        let second = cache.document(Some(2), load).unwrap();
        assert_eq!(second.generation(), Some(2));
        assert_eq!(cache.cached_forms(), 0);
    }

    #[test]
    fn test_stale_nodes_are_rejected() {
        let mut cache = SessionCache::new();
        let first = cache.document(Some(1), load).unwrap();
        let input = Crawler::new(first, None).filter("input").first().unwrap();

        assert!(cache.ensure_current(&input, Some(1)).is_ok());
        assert!(matches!(
            cache.ensure_current(&input, Some(2)),
            Err(BrowserError::StaleNode { node: 1, current: 2 })
        ));
        assert!(matches!(cache.ensure_current(&input, None), Err(BrowserError::NotStarted)));

        let static_node = Crawler::parse(PAGE).filter("input").first().unwrap();
        assert!(matches!(
            cache.ensure_current(&static_node, Some(1)),
            Err(BrowserError::Detached)
        ));
    }
}
