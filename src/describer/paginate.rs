//! Pagination helpers
//!
//! Providers page either by page number (stop on a short page) or by an opaque
//! cursor (stop when the cursor is absent). [`paginate`] turns a single-page
//! fetcher into a stream of pages and applies a [`PagePolicy`] cap.

use anyhow::Result;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Continuation marker for the next request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageToken {
    Cursor(String),
    Number(u32),
}

impl PageToken {
    pub fn as_cursor(&self) -> Option<&str> {
        match self {
            PageToken::Cursor(c) => Some(c),
            PageToken::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<u32> {
        match self {
            PageToken::Number(n) => Some(*n),
            PageToken::Cursor(_) => None,
        }
    }
}

/// One page of raw items
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<PageToken>,
}

impl<T> Page<T> {
    /// Page-number pagination: a page shorter than `per_page` is the last one
    pub fn numbered(items: Vec<T>, page: u32, per_page: usize) -> Self {
        let next = if per_page > 0 && items.len() >= per_page {
            Some(PageToken::Number(page + 1))
        } else {
            None
        };
        Self { items, next }
    }

    /// Cursor pagination: an absent or empty cursor ends the listing
    pub fn cursor(items: Vec<T>, next: Option<String>) -> Self {
        let next = next.filter(|c| !c.is_empty()).map(PageToken::Cursor);
        Self { items, next }
    }

    /// A listing that is never paged
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// How many pages one logical query may consult
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePolicy {
    #[serde(default)]
    pub max_pages: Option<usize>,
}

impl PagePolicy {
    pub fn unbounded() -> Self {
        Self { max_pages: None }
    }

    pub fn capped(max_pages: usize) -> Self {
        Self {
            max_pages: Some(max_pages),
        }
    }

    fn allows(&self, fetched: usize) -> bool {
        self.max_pages.map_or(true, |max| fetched < max)
    }
}

struct PagerState<F> {
    fetch: F,
    token: Option<PageToken>,
    fetched: usize,
    done: bool,
}

/// Stream pages from `fetch`, starting at `first`.
///
/// Ends after the page without a next token, or once the policy cap is
/// reached. No request is made beyond the cap. The first error ends the
/// stream.
pub fn paginate<T, F, Fut>(
    policy: PagePolicy,
    first: Option<PageToken>,
    fetch: F,
) -> impl Stream<Item = Result<Vec<T>>>
where
    F: FnMut(Option<PageToken>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let state = PagerState {
        fetch,
        token: first,
        fetched: 0,
        done: false,
    };

    stream::unfold(state, move |mut state| async move {
        if state.done || !policy.allows(state.fetched) {
            return None;
        }

        match (state.fetch)(state.token.take()).await {
            Ok(page) => {
                state.fetched += 1;
                match page.next {
                    Some(next) => state.token = Some(next),
                    None => state.done = true,
                }
                if state.done {
                    tracing::trace!(pages = state.fetched, "Pagination finished");
                } else if !policy.allows(state.fetched) {
                    tracing::debug!(pages = state.fetched, "Page cap reached, more pages available");
                }
                Some((Ok(page.items), state))
            }
            Err(e) => {
                state.done = true;
                Some((Err(e), state))
            }
        }
    })
}

/// Keep at most `limit` items, in their original order
pub fn sample_first<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    if items.len() > limit {
        tracing::debug!(total = items.len(), limit, "Sampling first items");
        items.truncate(limit);
    }
    items
}
