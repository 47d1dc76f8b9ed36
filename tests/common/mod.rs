// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use portfolio_tracker::models::{
    Holding, NewHolding, NewTransaction, Portfolio, Quote, Transaction, TransactionType,
    WatchlistItem,
};
use portfolio_tracker::{ApiError, Backend};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory backend that mimics the REST service closely enough for load
/// cycle tests.
#[derive(Default)]
pub struct FakeBackend {
    portfolios: Mutex<HashMap<i64, Portfolio>>,
    quotes: Mutex<HashMap<String, Result<Quote, ApiError>>>,
    portfolio_error: Mutex<Option<ApiError>>,
    portfolio_delays: Mutex<VecDeque<Duration>>,
    quote_delay: Mutex<Option<Duration>>,
    watchlist: Mutex<Vec<WatchlistItem>>,
    next_id: AtomicI64,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub portfolio_calls: AtomicUsize,
    pub quote_calls: AtomicUsize,
}

pub fn holding(id: i64, symbol: &str, quantity: f64) -> Holding {
    Holding {
        id,
        symbol: symbol.to_string(),
        quantity,
        portfolio_id: 1,
    }
}

pub fn portfolio(id: i64, name: &str, holdings: Vec<Holding>) -> Portfolio {
    Portfolio {
        id,
        name: name.to_string(),
        user_id: 1,
        holdings,
        transactions: vec![],
    }
}

pub fn price(c: f64) -> Quote {
    Quote {
        current_price: c,
        ..Quote::zero()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            ..Self::default()
        }
    }

    pub fn with_portfolio(self, portfolio: Portfolio) -> Self {
        self.portfolios
            .lock()
            .unwrap()
            .insert(portfolio.id, portfolio);
        self
    }

    pub fn with_quote(self, symbol: &str, quote: Quote) -> Self {
        self.quotes
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Ok(quote));
        self
    }

    pub fn with_quote_error(self, symbol: &str, error: ApiError) -> Self {
        self.quotes
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Err(error));
        self
    }

    pub fn with_watchlist(self, symbols: &[&str]) -> Self {
        *self.watchlist.lock().unwrap() = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| WatchlistItem {
                id: i as i64 + 1,
                symbol: s.to_string(),
                user_id: Some(1),
            })
            .collect();
        self
    }

    pub fn fail_portfolio(&self, error: ApiError) {
        *self.portfolio_error.lock().unwrap() = Some(error);
    }

    /// Each queued delay applies to one `get_portfolio` call, in order.
    pub fn delay_next_portfolio(&self, delay: Duration) {
        self.portfolio_delays.lock().unwrap().push_back(delay);
    }

    pub fn delay_quotes(&self, delay: Duration) {
        *self.quote_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_quote(&self, symbol: &str, quote: Quote) {
        self.quotes
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Ok(quote));
    }

    pub fn watchlist_symbols(&self) -> Vec<String> {
        self.watchlist
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.symbol.clone())
            .collect()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn quote_of(&self, symbol: &str) -> Result<Quote, ApiError> {
        self.quotes
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| Err(ApiError::NotFound("Stock not found".to_string())))
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn get_portfolio(&self, portfolio_id: i64) -> Result<Portfolio, ApiError> {
        self.portfolio_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.portfolio_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = self.portfolio_error.lock().unwrap().clone() {
            return Err(e);
        }
        self.portfolios
            .lock()
            .unwrap()
            .get(&portfolio_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound("Portfolio not found".to_string()))
    }

    async fn list_portfolios(&self) -> Result<Vec<Portfolio>, ApiError> {
        let mut all: Vec<Portfolio> = self.portfolios.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|p| p.id);
        Ok(all)
    }

    async fn add_stock(&self, portfolio_id: i64, stock: &NewHolding) -> Result<Holding, ApiError> {
        self.quote_of(&stock.symbol)
            .map_err(|_| ApiError::Validation("Invalid stock symbol".to_string()))?;
        let id = self.next_id();
        let mut portfolios = self.portfolios.lock().unwrap();
        let portfolio = portfolios
            .get_mut(&portfolio_id)
            .ok_or_else(|| ApiError::NotFound("Portfolio not found".to_string()))?;

        if let Some(existing) = portfolio
            .holdings
            .iter_mut()
            .find(|h| h.symbol == stock.symbol)
        {
            existing.quantity += stock.quantity;
            return Ok(existing.clone());
        }
        let created = Holding {
            id,
            symbol: stock.symbol.clone(),
            quantity: stock.quantity,
            portfolio_id,
        };
        portfolio.holdings.push(created.clone());
        Ok(created)
    }

    async fn remove_stock(&self, portfolio_id: i64, stock_id: i64) -> Result<(), ApiError> {
        let mut portfolios = self.portfolios.lock().unwrap();
        let portfolio = portfolios
            .get_mut(&portfolio_id)
            .ok_or_else(|| ApiError::NotFound("Portfolio not found".to_string()))?;
        let before = portfolio.holdings.len();
        portfolio.holdings.retain(|h| h.id != stock_id);
        if portfolio.holdings.len() == before {
            return Err(ApiError::NotFound("Stock not found".to_string()));
        }
        Ok(())
    }

    async fn add_transaction(
        &self,
        portfolio_id: i64,
        transaction: &NewTransaction,
    ) -> Result<Transaction, ApiError> {
        let quote = self
            .quote_of(&transaction.symbol)
            .map_err(|_| ApiError::Validation("Invalid stock symbol".to_string()))?;
        let id = self.next_id();
        let mut portfolios = self.portfolios.lock().unwrap();
        let portfolio = portfolios
            .get_mut(&portfolio_id)
            .ok_or_else(|| ApiError::NotFound("Portfolio not found".to_string()))?;

        let position = portfolio
            .holdings
            .iter()
            .position(|h| h.symbol == transaction.symbol);
        let quantity = match transaction.kind {
            TransactionType::Sell => {
                let current = position.map(|i| portfolio.holdings[i].quantity).unwrap_or(0.0);
                if current < transaction.quantity {
                    return Err(ApiError::Validation(format!(
                        "Insufficient holdings. Current: {}, Requested: {}",
                        current, transaction.quantity
                    )));
                }
                if let Some(i) = position {
                    if current - transaction.quantity <= 0.0 {
                        portfolio.holdings.remove(i);
                    } else {
                        portfolio.holdings[i].quantity -= transaction.quantity;
                    }
                }
                -transaction.quantity
            }
            TransactionType::Buy => {
                match position {
                    Some(i) => portfolio.holdings[i].quantity += transaction.quantity,
                    None => portfolio.holdings.push(Holding {
                        id,
                        symbol: transaction.symbol.clone(),
                        quantity: transaction.quantity,
                        portfolio_id,
                    }),
                }
                transaction.quantity
            }
        };

        let recorded = Transaction {
            id,
            portfolio_id: Some(portfolio_id),
            symbol: transaction.symbol.clone(),
            quantity,
            kind: transaction.kind,
            price: quote.current_price,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::days(id),
        };
        portfolio.transactions.push(recorded.clone());
        Ok(recorded)
    }

    async fn quote(&self, symbol: &str) -> Result<Quote, ApiError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.quote_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.quote_of(symbol)
    }

    async fn watchlist(&self) -> Result<Vec<WatchlistItem>, ApiError> {
        Ok(self.watchlist.lock().unwrap().clone())
    }

    async fn add_to_watchlist(&self, symbol: &str) -> Result<WatchlistItem, ApiError> {
        let mut watchlist = self.watchlist.lock().unwrap();
        if watchlist.iter().any(|i| i.symbol == symbol) {
            return Err(ApiError::Validation("Stock already in watchlist".to_string()));
        }
        let item = WatchlistItem {
            id: self.next_id(),
            symbol: symbol.to_string(),
            user_id: Some(1),
        };
        watchlist.push(item.clone());
        Ok(item)
    }

    async fn remove_from_watchlist(&self, symbol: &str) -> Result<(), ApiError> {
        let mut watchlist = self.watchlist.lock().unwrap();
        let before = watchlist.len();
        watchlist.retain(|i| i.symbol != symbol);
        if watchlist.len() == before {
            return Err(ApiError::NotFound("Stock not found in watchlist".to_string()));
        }
        Ok(())
    }
}
