// src/watchlist.rs
use crate::api::Backend;
use crate::error::ApiError;
use crate::loader::fetch_quote_map;
use crate::models::{normalize_symbol, Quote, WatchlistItem};
use log::info;

#[derive(Debug, Clone, PartialEq)]
pub struct WatchlistEntry {
    pub item: WatchlistItem,
    /// `None` when the quote could not be fetched.
    pub quote: Option<Quote>,
}

/// Load the watchlist and quote every entry concurrently.
pub async fn load_watchlist<B: Backend + ?Sized>(
    backend: &B,
) -> Result<Vec<WatchlistEntry>, ApiError> {
    let items = backend.watchlist().await?;
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let symbols: Vec<String> = items.iter().map(|i| i.symbol.clone()).collect();
    let quotes = fetch_quote_map(backend, &symbols).await;

    Ok(items
        .into_iter()
        .map(|item| {
            let quote = quotes.get(&item.symbol).and_then(|q| q.as_ref().ok()).copied();
            WatchlistEntry { item, quote }
        })
        .collect())
}

pub async fn add<B: Backend + ?Sized>(backend: &B, symbol: &str) -> Result<WatchlistItem, ApiError> {
    let symbol = normalize_symbol(symbol)?;
    let item = backend.add_to_watchlist(&symbol).await?;
    info!("{} added to watchlist", item.symbol);
    Ok(item)
}

pub async fn remove<B: Backend + ?Sized>(backend: &B, symbol: &str) -> Result<(), ApiError> {
    let symbol = normalize_symbol(symbol)?;
    backend.remove_from_watchlist(&symbol).await?;
    info!("{} removed from watchlist", symbol);
    Ok(())
}
