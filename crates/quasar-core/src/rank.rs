//! Ranked merge of streamed results.
//!
//! Results arrive from many providers in no particular order. Each one is
//! inserted into an already-sorted list: descending score, ties kept in
//! arrival order.
//!
//! Scores are only comparable as far as providers agree on a scale. Core
//! exports [`SCORE_SCALE`] and [`ratio_score`] so the built-in providers land
//! in the same range, but nothing normalizes a provider's numbers after the
//! fact.

use crate::types::{ResultItem, SearchTerm};

/// Score given to a candidate whose matched field is exactly the needle.
pub const SCORE_SCALE: u64 = 100_000;

/// `1 + SCORE_SCALE * needle_len / field_len`, never 0 for a real match.
///
/// Lengths are character counts. A shorter field containing the same needle
/// is a tighter match and scores higher.
pub fn ratio_score(needle_len: usize, field_len: usize) -> u64 {
    if field_len == 0 {
        return 1;
    }
    let ratio = (SCORE_SCALE as u128 * needle_len as u128) / field_len as u128;
    1u64.saturating_add(u64::try_from(ratio).unwrap_or(u64::MAX))
}

/// A result list kept in rank order.
#[derive(Debug, Clone, Default)]
pub struct RankedList {
    items: Vec<ResultItem>,
}

impl RankedList {
    pub fn new() -> Self {
        RankedList::default()
    }

    /// Score `item` (lazily) and insert it after every item scoring at least
    /// as high. Returns the index it landed at.
    pub fn insert(&mut self, mut item: ResultItem, term: &SearchTerm) -> usize {
        let score = item.score(term);
        let index = self.items.partition_point(|x| x.cached_score() >= score);
        self.items.insert(index, item);
        index
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ResultItem> {
        self.items.get(index)
    }

    pub fn as_slice(&self) -> &[ResultItem] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultItem> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{NullProvider, Provider};
    use std::sync::{Arc, Weak};

    fn detached(tag: &'static str, score: u64) -> ResultItem {
        let origin: Weak<dyn Provider> = Weak::<NullProvider>::new();
        ResultItem::new(tag, origin).with_score(score)
    }

    fn tags(list: &RankedList) -> Vec<&'static str> {
        list.iter()
            .map(|item| *item.payload::<&'static str>().unwrap())
            .collect()
    }

    #[test]
    fn test_ratio_score() {
        assert_eq!(ratio_score(3, 3), SCORE_SCALE + 1);
        assert_eq!(ratio_score(1, 4), SCORE_SCALE / 4 + 1);
        assert!(ratio_score(2, 10) > ratio_score(2, 20));
        assert_eq!(ratio_score(0, 0), 1);
    }

    #[test]
    fn test_merge_across_providers() {
        let term = SearchTerm::new("q");
        let mut list = RankedList::new();
        list.insert(detached("x", 5), &term);
        list.insert(detached("z", 7), &term);
        list.insert(detached("y", 9), &term);

        assert_eq!(tags(&list), vec!["y", "z", "x"]);
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let term = SearchTerm::new("q");
        let mut list = RankedList::new();
        assert_eq!(list.insert(detached("first", 4), &term), 0);
        assert_eq!(list.insert(detached("second", 4), &term), 1);
        assert_eq!(list.insert(detached("top", 8), &term), 0);
        assert_eq!(list.insert(detached("third", 4), &term), 3);

        assert_eq!(tags(&list), vec!["top", "first", "second", "third"]);
    }

    struct Lengthy;

    impl Provider for Lengthy {
        fn name(&self) -> &str {
            "lengthy"
        }

        fn score(&self, item: &ResultItem, _term: &SearchTerm) -> u64 {
            item.payload::<&'static str>().map_or(0, |s| s.len() as u64)
        }
    }

    #[test]
    fn test_lazy_scoring_asks_the_provider() {
        let provider: Arc<dyn Provider> = Arc::new(Lengthy);
        let term = SearchTerm::new("q");
        let mut list = RankedList::new();
        list.insert(ResultItem::new("ab", Arc::downgrade(&provider)), &term);
        list.insert(ResultItem::new("abcd", Arc::downgrade(&provider)), &term);

        assert_eq!(tags(&list), vec!["abcd", "ab"]);
        assert_eq!(list.get(0).map(|i| i.cached_score()), Some(4));
    }
}
