// src/loader.rs
use crate::api::Backend;
use crate::error::ApiError;
use crate::models::{Holding, NewHolding, NewTransaction, Portfolio, Quote, Transaction};
use crate::valuation::{aggregate, Performance, Valuation};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Where the most recent load cycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    /// Holdings loaded, at least one quote zero-filled.
    PartialSuccess,
    FullSuccess,
    /// The portfolio itself could not be loaded.
    Failed,
}

/// A fully valued portfolio as produced by one load cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioView {
    pub id: i64,
    pub name: String,
    pub user_id: i64,
    pub valuation: Valuation,
    /// Newest first.
    pub transactions: Vec<Transaction>,
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
}

impl PortfolioView {
    fn new(portfolio: Portfolio, quotes: Vec<Result<Quote, ApiError>>, generation: u64) -> Self {
        let mut transactions = portfolio.transactions;
        transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Self {
            id: portfolio.id,
            name: portfolio.name,
            user_id: portfolio.user_id,
            valuation: aggregate(portfolio.holdings, quotes),
            transactions,
            generation,
            loaded_at: Utc::now(),
        }
    }

    pub fn total_value(&self) -> f64 {
        self.valuation.total_value
    }

    pub fn state(&self) -> LoadState {
        if self.valuation.is_complete() {
            LoadState::FullSuccess
        } else {
            LoadState::PartialSuccess
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(PortfolioView),
    /// A newer cycle started before this one settled; its result was dropped.
    Superseded { generation: u64 },
}

impl LoadOutcome {
    pub fn view(&self) -> Option<&PortfolioView> {
        match self {
            LoadOutcome::Loaded(view) => Some(view),
            LoadOutcome::Superseded { .. } => None,
        }
    }

    pub fn into_view(self) -> Option<PortfolioView> {
        match self {
            LoadOutcome::Loaded(view) => Some(view),
            LoadOutcome::Superseded { .. } => None,
        }
    }
}

struct Published {
    state: LoadState,
    view: Option<Arc<PortfolioView>>,
}

/// Runs load cycles against a backend and keeps the latest snapshot.
///
/// Every cycle takes a generation number. Only the cycle holding the newest
/// generation when it settles may publish its result.
pub struct PortfolioLoader<B: ?Sized> {
    backend: Arc<B>,
    generation: AtomicU64,
    published: Mutex<Published>,
}

impl<B: Backend + ?Sized> PortfolioLoader<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            generation: AtomicU64::new(0),
            published: Mutex::new(Published {
                state: LoadState::Idle,
                view: None,
            }),
        }
    }

    pub fn backend(&self) -> &B {
        self.backend.as_ref()
    }

    pub fn state(&self) -> LoadState {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// The last published view, if the latest finished cycle succeeded.
    pub fn snapshot(&self) -> Option<Arc<PortfolioView>> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .view
            .clone()
    }

    fn begin(&self) -> u64 {
        let mut published = self
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        published.state = LoadState::Loading;
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn finish(&self, generation: u64, state: LoadState, view: Option<Arc<PortfolioView>>) -> bool {
        let mut published = self
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if generation != self.generation.load(Ordering::SeqCst) {
            return false;
        }
        published.state = state;
        published.view = view;
        true
    }

    /// One full cycle: portfolio, then every quote concurrently, then valuation.
    ///
    /// Quote failures never fail the cycle. A loader failure is returned and
    /// no quote is requested, unless a newer cycle has started meanwhile, in
    /// which case the failure is dropped like any superseded result.
    pub async fn load(&self, portfolio_id: i64) -> Result<LoadOutcome, ApiError> {
        let generation = self.begin();
        info!("Loading portfolio {} (cycle {})", portfolio_id, generation);

        let portfolio = match self.backend.get_portfolio(portfolio_id).await {
            Ok(portfolio) => portfolio,
            Err(e) => {
                if !self.finish(generation, LoadState::Failed, None) {
                    debug!(
                        "Discarding failure of portfolio {} from superseded cycle {}: {}",
                        portfolio_id, generation, e
                    );
                    return Ok(LoadOutcome::Superseded { generation });
                }
                error!("Failed to load portfolio {}: {}", portfolio_id, e);
                return Err(e);
            }
        };

        let quotes = fetch_quotes(self.backend.as_ref(), &portfolio.holdings).await;
        let view = PortfolioView::new(portfolio, quotes, generation);
        let state = view.state();

        if !self.finish(generation, state, Some(Arc::new(view.clone()))) {
            debug!(
                "Discarding portfolio {} from superseded cycle {}",
                portfolio_id, generation
            );
            return Ok(LoadOutcome::Superseded { generation });
        }

        match state {
            LoadState::PartialSuccess => warn!(
                "Portfolio {} loaded with {} unavailable quote(s), total {:.2}",
                portfolio_id,
                view.valuation.unavailable,
                view.total_value()
            ),
            _ => info!(
                "Portfolio {} loaded, total {:.2}",
                portfolio_id,
                view.total_value()
            ),
        }
        Ok(LoadOutcome::Loaded(view))
    }

    /// Submit a buy or sell, then reload. The backend owns the quantity math.
    ///
    /// The outer error means nothing was recorded. Once the backend accepts
    /// the write, the recorded transaction is always returned and the reload
    /// result travels next to it.
    pub async fn apply_transaction(
        &self,
        portfolio_id: i64,
        transaction: NewTransaction,
    ) -> Result<(Transaction, Result<LoadOutcome, ApiError>), ApiError> {
        let recorded = self
            .backend
            .add_transaction(portfolio_id, &transaction)
            .await
            .map_err(|e| {
                error!("Failed to process transaction: {}", e);
                e
            })?;
        info!(
            "{} {} {} recorded at {:.2}",
            recorded.kind, transaction.quantity, recorded.symbol, recorded.price
        );

        let outcome = self.load(portfolio_id).await;
        Ok((recorded, outcome))
    }

    /// Same contract as [`apply_transaction`](Self::apply_transaction).
    pub async fn add_stock(
        &self,
        portfolio_id: i64,
        stock: NewHolding,
    ) -> Result<(Holding, Result<LoadOutcome, ApiError>), ApiError> {
        let holding = self
            .backend
            .add_stock(portfolio_id, &stock)
            .await
            .map_err(|e| {
                error!("Failed to add stock: {}", e);
                e
            })?;
        info!("Stock {} added to portfolio {}", holding.symbol, portfolio_id);

        let outcome = self.load(portfolio_id).await;
        Ok((holding, outcome))
    }

    pub async fn remove_stock(
        &self,
        portfolio_id: i64,
        stock_id: i64,
    ) -> Result<LoadOutcome, ApiError> {
        self.backend
            .remove_stock(portfolio_id, stock_id)
            .await
            .map_err(|e| {
                error!("Failed to remove stock: {}", e);
                e
            })?;
        info!("Stock {} removed from portfolio {}", stock_id, portfolio_id);

        self.load(portfolio_id).await
    }

    /// Value every portfolio of the current user. Does not touch the
    /// published snapshot.
    pub async fn performance(&self) -> Result<Performance, ApiError> {
        let portfolios = self.backend.list_portfolios().await?;
        let backend = self.backend.as_ref();

        let valuations: Vec<Valuation> = join_all(portfolios.iter().map(|p| async move {
            let quotes = fetch_quotes(backend, &p.holdings).await;
            aggregate(p.holdings.clone(), quotes)
        }))
        .await;

        Ok(Performance::from_valuations(
            portfolios.iter().zip(valuations.iter()),
        ))
    }
}

/// Fetch one quote per distinct symbol, all in flight together.
///
/// Failures are logged and come back as `QuoteUnavailable`.
pub async fn fetch_quote_map<B: Backend + ?Sized>(
    backend: &B,
    symbols: &[String],
) -> HashMap<String, Result<Quote, ApiError>> {
    let mut distinct: Vec<&str> = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        if !distinct.contains(&symbol.as_str()) {
            distinct.push(symbol);
        }
    }

    let results = join_all(distinct.into_iter().map(|symbol| async move {
        let outcome = backend.quote(symbol).await.map_err(|e| {
            warn!("Failed to fetch quote for {}: {}", symbol, e);
            ApiError::quote_unavailable(symbol, &e)
        });
        (symbol.to_string(), outcome)
    }))
    .await;

    results.into_iter().collect()
}

/// Quote outcomes aligned by index with `holdings`.
pub async fn fetch_quotes<B: Backend + ?Sized>(
    backend: &B,
    holdings: &[Holding],
) -> Vec<Result<Quote, ApiError>> {
    if holdings.is_empty() {
        return Vec::new();
    }

    let symbols: Vec<String> = holdings.iter().map(|h| h.symbol.clone()).collect();
    let quotes = fetch_quote_map(backend, &symbols).await;

    symbols
        .iter()
        .map(|symbol| {
            quotes.get(symbol).cloned().unwrap_or_else(|| {
                Err(ApiError::QuoteUnavailable {
                    symbol: symbol.clone(),
                    reason: "not requested".to_string(),
                })
            })
        })
        .collect()
}
