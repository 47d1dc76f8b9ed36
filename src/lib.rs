// src/lib.rs
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod loader;
pub mod models;
pub mod valuation;
pub mod watchlist;

pub use api::{ApiClient, Backend};
pub use auth::{Session, TokenStore};
pub use config::Config;
pub use error::ApiError;
pub use loader::{LoadOutcome, LoadState, PortfolioLoader, PortfolioView};
pub use valuation::{EnrichedHolding, Performance, QuoteStatus, Valuation};
