// src/valuation.rs
//! Combines holdings with their quotes into per-holding and portfolio-wide
//! figures.
//!
//! A failed or missing quote contributes exactly zero, every number that
//! leaves this module is finite, and values and totals are never negative.

use crate::error::ApiError;
use crate::models::{Holding, Portfolio, Quote};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum QuoteStatus {
    Available,
    /// The quote fetch failed; the holding is valued at zero.
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedHolding {
    #[serde(flatten)]
    pub holding: Holding,
    pub quote: Quote,
    pub quote_status: QuoteStatus,
    pub value: f64,
    pub allocation_percent: f64,
}

impl EnrichedHolding {
    pub fn is_unavailable(&self) -> bool {
        matches!(self.quote_status, QuoteStatus::Unavailable(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Valuation {
    pub holdings: Vec<EnrichedHolding>,
    pub total_value: f64,
    pub total_shares: f64,
    /// Sum of quantity x daily price change over holdings with a quote.
    pub day_change: f64,
    pub unavailable: usize,
}

impl Valuation {
    pub fn holding_count(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_complete(&self) -> bool {
        self.unavailable == 0
    }
}

fn finite_or_zero(n: f64) -> f64 {
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

// Quantities and prices below zero are malformed and count as nothing.
fn positive_or_zero(n: f64) -> f64 {
    if n.is_finite() && n > 0.0 {
        n
    } else {
        0.0
    }
}

/// Enrich one holding. Allocation is filled in by [`aggregate`] once the
/// total is known.
pub fn enrich(holding: Holding, outcome: Option<Result<Quote, ApiError>>) -> EnrichedHolding {
    let (quote, quote_status) = match outcome {
        Some(Ok(quote)) => (quote, QuoteStatus::Available),
        Some(Err(e)) => (Quote::zero(), QuoteStatus::Unavailable(e.to_string())),
        None => (
            Quote::zero(),
            QuoteStatus::Unavailable("no quote requested".to_string()),
        ),
    };

    let price = positive_or_zero(quote.current_price);
    let value = positive_or_zero(positive_or_zero(holding.quantity) * price);

    EnrichedHolding {
        holding,
        quote,
        quote_status,
        value,
        allocation_percent: 0.0,
    }
}

/// Pair holdings with quote outcomes by index and sum them up.
///
/// Quotes are aligned by position, not by symbol. A shorter quote list leaves
/// the trailing holdings unavailable.
pub fn aggregate(holdings: Vec<Holding>, quotes: Vec<Result<Quote, ApiError>>) -> Valuation {
    let mut quotes = quotes.into_iter();
    let mut enriched: Vec<EnrichedHolding> = holdings
        .into_iter()
        .map(|holding| enrich(holding, quotes.next()))
        .collect();

    let total_value = finite_or_zero(enriched.iter().map(|h| h.value).sum()).max(0.0);
    let total_shares = finite_or_zero(
        enriched
            .iter()
            .map(|h| positive_or_zero(h.holding.quantity))
            .sum(),
    );
    let day_change = finite_or_zero(
        enriched
            .iter()
            .filter(|h| !h.is_unavailable())
            .map(|h| {
                positive_or_zero(h.holding.quantity) * finite_or_zero(h.quote.price_change)
            })
            .sum(),
    );
    let unavailable = enriched.iter().filter(|h| h.is_unavailable()).count();

    if total_value > 0.0 {
        for h in enriched.iter_mut() {
            h.allocation_percent = h.value * 100.0 / total_value;
        }
    }

    Valuation {
        holdings: enriched,
        total_value,
        total_shares,
        day_change,
        unavailable,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioValue {
    pub id: i64,
    pub name: String,
    pub value: f64,
    pub unavailable: usize,
}

/// Value of every portfolio a user owns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Performance {
    pub portfolios: Vec<PortfolioValue>,
    pub total_value: f64,
}

impl Performance {
    pub fn from_valuations<'a, I>(valued: I) -> Self
    where
        I: IntoIterator<Item = (&'a Portfolio, &'a Valuation)>,
    {
        let portfolios: Vec<PortfolioValue> = valued
            .into_iter()
            .map(|(portfolio, valuation)| PortfolioValue {
                id: portfolio.id,
                name: portfolio.name.clone(),
                value: valuation.total_value,
                unavailable: valuation.unavailable,
            })
            .collect();
        let total_value = finite_or_zero(portfolios.iter().map(|p| p.value).sum());

        Self {
            portfolios,
            total_value,
        }
    }
}
