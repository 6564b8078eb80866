use super::schema::Page;
use super::transport::Transport;
use crate::error::Result;
use log::debug;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Start walking a paginated collection at `first_url`.
pub fn walk<T: DeserializeOwned>(transport: &Transport, first_url: impl Into<String>) -> PageWalker<'_, T> {
    PageWalker {
        transport,
        next: Some(first_url.into()),
        pages: 0,
        _item: PhantomData,
    }
}

/// Follows the server's `next` pointers one page per call.
///
/// The walker owns the cursor: once a page has been requested it cannot be
/// requested again, and nothing is fetched ahead of the consumer. A failed
/// request ends the walk.
pub struct PageWalker<'a, T> {
    transport: &'a Transport,
    next: Option<String>,
    pages: u32,
    _item: PhantomData<fn() -> T>,
}

impl<'a, T: DeserializeOwned> PageWalker<'a, T> {
    /// Fetch the next page. `Ok(None)` once the collection is exhausted.
    ///
    /// Null items and items that do not decode as `T` are dropped.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<T>>> {
        let url = match self.next.take() {
            Some(u) => u,
            None => return Ok(None),
        };
        let page: Page = self.transport.get(&url).await?;
        self.pages += 1;
        self.next = page.next.filter(|n| !n.is_empty());

        let raw = page.items.len();
        let items: Vec<T> = page
            .items
            .into_iter()
            .filter(|v| !v.is_null())
            .filter_map(|v| match serde_json::from_value::<T>(v) {
                Ok(item) => Some(item),
                Err(e) => {
                    debug!("dropping page item with unexpected shape: {}", e);
                    None
                }
            })
            .collect();
        debug!(
            "page {} of {}: {} of {} items kept (total {:?}), more={}",
            self.pages,
            url,
            items.len(),
            raw,
            page.total,
            self.next.is_some()
        );
        Ok(Some(items))
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages
    }

    pub fn is_exhausted(&self) -> bool {
        self.next.is_none()
    }
}
