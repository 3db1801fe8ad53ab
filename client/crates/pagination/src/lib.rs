//! Offset and limit pagination primitives for listing endpoints.
//!
//! Listing calls learn the full ordered key set first and then materialize
//! only the rows inside a [`Window`]. The window normalises caller input so
//! that negative offsets start at the beginning and oversized or
//! non-positive limits fall back to [`DEFAULT_LIMIT`].
//!
//! # Example
//!
//! ```
//! use pagination::{Page, Window};
//!
//! let keys = ["a", "b", "c", "d"];
//! let window = Window::new(2, -5);
//! assert_eq!(window.offset(), 0);
//! assert_eq!(window.slice(&keys), &["a", "b"]);
//!
//! let page = Page::new(vec!["a", "b"], keys.len(), window);
//! assert!(page.has_more());
//! ```

use serde::{Deserialize, Serialize};

/// Items per page used when the caller asks for zero, a negative count, or
/// more than the cap.
pub const DEFAULT_LIMIT: usize = 20;

/// Effective offset/limit pair after normalisation.
///
/// ## Invariants
/// - `limit` is in `1..=cap`, where the cap is the default limit used to
///   build the window.
/// - `offset` is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    limit: usize,
    offset: usize,
}

impl Window {
    /// Normalise raw caller input against [`DEFAULT_LIMIT`].
    ///
    /// # Examples
    /// ```
    /// use pagination::{DEFAULT_LIMIT, Window};
    ///
    /// let window = Window::new(i64::from(i32::MAX), -1);
    /// assert_eq!(window.limit(), DEFAULT_LIMIT);
    /// assert_eq!(window.offset(), 0);
    /// ```
    #[must_use]
    pub fn new(limit: i64, offset: i64) -> Self {
        Self::with_default(limit, offset, DEFAULT_LIMIT)
    }

    /// Normalise raw caller input against a custom default limit.
    ///
    /// The default doubles as the upper bound, so callers can never
    /// materialize more than `default_limit` rows per page. A zero default
    /// is treated as one.
    #[must_use]
    pub fn with_default(limit: i64, offset: i64, default_limit: usize) -> Self {
        let cap = default_limit.max(1);
        let limit = match usize::try_from(limit) {
            Ok(requested) if (1..=cap).contains(&requested) => requested,
            _ => cap,
        };
        let offset = if offset <= 0 {
            0
        } else {
            usize::try_from(offset).unwrap_or(usize::MAX)
        };
        Self { limit, offset }
    }

    /// Maximum number of rows in the page.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Number of leading rows skipped.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Borrow the rows of `items` that fall inside this window.
    ///
    /// Offsets past the end yield an empty slice.
    #[must_use]
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.offset.min(items.len());
        let end = start.saturating_add(self.limit).min(items.len());
        items.get(start..end).unwrap_or_default()
    }
}

impl Default for Window {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// One page of a listing together with the collection-wide total.
///
/// `total` is the count reported for the whole collection, so it may exceed
/// `items().len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    items: Vec<T>,
    total: usize,
    window: Window,
}

impl<T> Page<T> {
    /// Assemble a page from materialized rows.
    #[must_use]
    pub const fn new(items: Vec<T>, total: usize, window: Window) -> Self {
        Self {
            items,
            total,
            window,
        }
    }

    /// Rows in this page.
    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Consume the page and return its rows.
    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Count of the whole collection.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Window the page was cut with.
    #[must_use]
    pub const fn window(&self) -> Window {
        self.window
    }

    /// Whether rows exist beyond this page.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.window.offset.saturating_add(self.items.len()) < self.total
    }
}

#[cfg(test)]
mod tests {
    //! Window normalisation and slicing coverage.

    use super::*;
    use rstest::rstest;

    fn letters() -> Vec<String> {
        ["a", "b", "c"].into_iter().map(str::to_owned).collect()
    }

    fn numbered(count: usize) -> Vec<String> {
        (1..=count).map(|n| n.to_string()).collect()
    }

    #[rstest]
    #[case::first_row(letters(), 1, 0, &["a"])]
    #[case::tail_from_offset(letters(), 10, 1, &["b", "c"])]
    #[case::offset_past_end(letters(), 0, 10, &[])]
    #[case::empty_source(Vec::new(), 1, 0, &[])]
    #[case::exact_fit(letters(), 3, 0, &["a", "b", "c"])]
    #[case::middle(letters(), 2, 1, &["b", "c"])]
    #[case::single_offset_past_end(vec!["a".to_owned()], 1, 10, &[])]
    #[case::single_offset_at_end(vec!["a".to_owned()], 100, 1, &[])]
    fn slices_requested_range(
        #[case] source: Vec<String>,
        #[case] limit: i64,
        #[case] offset: i64,
        #[case] expected: &[&str],
    ) {
        let window = Window::new(limit, offset);
        let actual: Vec<&str> = window.slice(&source).iter().map(String::as_str).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn negative_input_falls_back_to_first_default_page() {
        let source = numbered(23);
        let window = Window::new(-10, -10);

        let actual = window.slice(&source);
        assert_eq!(actual.len(), DEFAULT_LIMIT);
        assert_eq!(actual.first().map(String::as_str), Some("1"));
        assert_eq!(actual.last().map(String::as_str), Some("20"));
    }

    #[rstest]
    #[case::zero(0)]
    #[case::negative(-1)]
    #[case::above_cap(21)]
    #[case::max_i32(i64::from(i32::MAX))]
    #[case::max_i64(i64::MAX)]
    fn out_of_range_limits_use_default(#[case] limit: i64) {
        assert_eq!(Window::new(limit, 0).limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn huge_offset_yields_empty_slice() {
        let window = Window::new(-1, i64::MAX);
        assert!(window.slice(&numbered(5)).is_empty());
    }

    #[test]
    fn custom_default_caps_limit() {
        let window = Window::with_default(50, 0, 5);
        assert_eq!(window.limit(), 5);
        assert_eq!(Window::with_default(3, 0, 0).limit(), 1);
    }

    #[test]
    fn page_reports_remaining_rows() {
        let window = Window::new(2, 0);
        let page = Page::new(vec![1, 2], 3, window);
        assert!(page.has_more());
        assert_eq!(page.total(), 3);

        let last = Page::new(vec![3], 3, Window::new(2, 2));
        assert!(!last.has_more());
    }

    #[test]
    fn page_serialises_with_window() {
        let page = Page::new(vec!["x"], 7, Window::new(1, 4));
        let json = serde_json::to_value(&page).unwrap_or_default();
        assert_eq!(
            json,
            serde_json::json!({
                "items": ["x"],
                "total": 7,
                "window": { "limit": 1, "offset": 4 }
            })
        );
    }
}
