//! Core data types for Quasar.
//!
//! These are the values that flow between the session and the providers:
//! the search term, the results themselves, and the plain-data descriptions a
//! front end needs to draw a row or a preview pane.

use crate::provider::Provider;
use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

/// The text being searched for, or no active search.
///
/// Surrounding whitespace is trimmed; input with nothing else is treated as
/// no search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SearchTerm(Option<Arc<str>>);

impl SearchTerm {
    /// Create a term from user input.
    pub fn new(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            SearchTerm(None)
        } else {
            SearchTerm(Some(Arc::from(text)))
        }
    }

    /// The "no active search" term.
    pub fn none() -> Self {
        SearchTerm(None)
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// The query string, if a search is active.
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(text) => write!(f, "{}", text),
            None => write!(f, "<none>"),
        }
    }
}

impl From<&str> for SearchTerm {
    fn from(s: &str) -> Self {
        SearchTerm::new(s)
    }
}

/// A single result produced by a provider.
///
/// The payload is opaque to the session; only the provider that produced it
/// knows its concrete type. The item remembers that provider through a weak
/// handle: it can be used to dispatch `score`/`select`/bind calls, but never
/// keeps the provider alive.
#[derive(Clone)]
pub struct ResultItem {
    payload: Arc<dyn Any + Send + Sync>,
    origin: Weak<dyn Provider>,
    score: u64,
}

impl ResultItem {
    pub fn new<T>(payload: T, origin: Weak<dyn Provider>) -> Self
    where
        T: Any + Send + Sync,
    {
        ResultItem {
            payload: Arc::new(payload),
            origin,
            score: 0,
        }
    }

    /// Borrow the payload as its concrete type.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// The provider that produced this item, if it is still alive.
    pub fn provider(&self) -> Option<Arc<dyn Provider>> {
        self.origin.upgrade()
    }

    /// Cached score; 0 means not computed yet.
    pub fn cached_score(&self) -> u64 {
        self.score
    }

    /// Score against `term`, asking the owning provider on first use.
    ///
    /// The cached value is only meaningful within the session that computed
    /// it.
    pub fn score(&mut self, term: &SearchTerm) -> u64 {
        if self.score == 0 {
            if let Some(provider) = self.provider() {
                let score = provider.score(self, term);
                self.score = score;
            }
        }
        self.score
    }

    /// Whether two items carry the same payload.
    pub fn same_item(&self, other: &ResultItem) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.payload) as *const (),
            Arc::as_ptr(&other.payload) as *const (),
        )
    }

    pub fn with_score(mut self, score: u64) -> Self {
        self.score = score;
        self
    }
}

impl fmt::Debug for ResultItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let provider = self.provider();
        f.debug_struct("ResultItem")
            .field("provider", &provider.as_ref().map(|p| p.name()))
            .field("score", &self.score)
            .finish()
    }
}

/// How a result is shown in the list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListRow {
    /// Primary label (application name, file name)
    pub title: String,

    /// Secondary, dimmed label (desktop id, parent directory)
    pub subtitle: String,

    /// Icon name or path, if the source has one
    pub icon: Option<String>,
}

impl ListRow {
    pub fn new(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        ListRow {
            title: title.into(),
            subtitle: subtitle.into(),
            icon: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// What the preview pane should show for a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    /// Nothing to show
    Empty,

    /// Text content (e.g. the head of a text file)
    Text { content: String, truncated: bool },

    /// An image on disk
    Image { path: PathBuf },

    /// A status page with a title, a call to action and an icon
    Status {
        title: String,
        description: String,
        icon: Option<String>,
    },

    /// The preview could not be produced
    Error { message: String },
}

impl Default for Preview {
    fn default() -> Self {
        Preview::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_term() {
        assert!(SearchTerm::new("").is_none());
        assert!(SearchTerm::new("   ").is_none());
        assert_eq!(SearchTerm::new("  fire ").as_str(), Some("fire"));
        assert_eq!(SearchTerm::none(), SearchTerm::default());

        let term = SearchTerm::from("fire");
        assert_eq!(term.as_str(), Some("fire"));
        assert_eq!(term.to_string(), "fire");
        assert_eq!(SearchTerm::none().to_string(), "<none>");
    }

    #[test]
    fn test_dead_origin() {
        let origin: Weak<dyn Provider> = Weak::<crate::provider::NullProvider>::new();
        let mut item = ResultItem::new(PathBuf::from("/tmp/a.txt"), origin);

        assert!(item.provider().is_none());
        assert_eq!(
            item.payload::<PathBuf>(),
            Some(&PathBuf::from("/tmp/a.txt"))
        );
        assert!(item.payload::<String>().is_none());
        assert_eq!(item.score(&SearchTerm::new("a")), 0);
        assert_eq!(item.clone().with_score(5).cached_score(), 5);
    }
}
