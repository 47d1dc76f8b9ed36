// src/models.rs
use crate::error::ApiError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One symbol + quantity line item of a portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub id: i64,
    pub symbol: String,
    #[serde(deserialize_with = "lenient_number")]
    pub quantity: f64,
    pub portfolio_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: i64,
    pub name: String,
    pub user_id: i64,
    #[serde(rename = "stocks", default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// Market snapshot for a symbol, in the backend's short field names.
///
/// Every number is optional on the wire. Missing, null and non-finite values
/// become 0 so downstream arithmetic never sees NaN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(rename = "c", default, deserialize_with = "lenient_number")]
    pub current_price: f64,
    #[serde(rename = "d", default, deserialize_with = "lenient_number")]
    pub price_change: f64,
    #[serde(rename = "dp", default, deserialize_with = "lenient_number")]
    pub percent_change: f64,
    #[serde(rename = "v", default, deserialize_with = "lenient_number")]
    pub volume: f64,
    #[serde(rename = "h", default, deserialize_with = "lenient_number")]
    pub day_high: f64,
    #[serde(rename = "l", default, deserialize_with = "lenient_number")]
    pub day_low: f64,
}

impl Quote {
    pub fn zero() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Buy,
    Sell,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Buy => write!(f, "BUY"),
            TransactionType::Sell => write!(f, "SELL"),
        }
    }
}

/// A recorded buy or sell. Sells come back from the backend with a negative
/// quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    #[serde(default)]
    pub portfolio_id: Option<i64>,
    pub symbol: String,
    #[serde(deserialize_with = "lenient_number")]
    pub quantity: f64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(default, deserialize_with = "lenient_number")]
    pub price: f64,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewHolding {
    pub symbol: String,
    pub quantity: f64,
}

impl NewHolding {
    pub fn new(symbol: &str, quantity: f64) -> Result<Self, ApiError> {
        Ok(Self {
            symbol: normalize_symbol(symbol)?,
            quantity: positive_quantity(quantity)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTransaction {
    pub symbol: String,
    pub quantity: f64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
}

impl NewTransaction {
    pub fn new(symbol: &str, quantity: f64, kind: TransactionType) -> Result<Self, ApiError> {
        Ok(Self {
            symbol: normalize_symbol(symbol)?,
            quantity: positive_quantity(quantity)?,
            kind,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPortfolio {
    pub name: String,
    pub stocks: Vec<NewHolding>,
}

impl NewPortfolio {
    pub fn new(name: &str, stocks: Vec<NewHolding>) -> Result<Self, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::Validation(
                "portfolio name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name: name.to_string(),
            stocks,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistItem {
    pub id: i64,
    pub symbol: String,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub category: String,
    /// Unix seconds.
    #[serde(default)]
    pub datetime: i64,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub related: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub url: String,
}

impl NewsItem {
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.datetime, 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub result: Vec<SearchResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub description: String,
    #[serde(rename = "displaySymbol", default)]
    pub display_symbol: String,
    pub symbol: String,
    #[serde(rename = "type", default)]
    pub security_type: String,
}

/// Company details. Unknown symbols come back as an empty object, so every
/// field defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub finnhub_industry: String,
    /// Millions, in `currency`.
    #[serde(default, deserialize_with = "lenient_number")]
    pub market_capitalization: f64,
    #[serde(default)]
    pub weburl: String,
    #[serde(default)]
    pub logo: String,
}

impl CompanyProfile {
    pub fn is_empty(&self) -> bool {
        self.ticker.is_empty() && self.name.is_empty()
    }
}

/// Trim and upper-case a ticker, rejecting empty input.
pub fn normalize_symbol(symbol: &str) -> Result<String, ApiError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(ApiError::Validation("symbol must not be empty".to_string()));
    }
    Ok(symbol.to_uppercase())
}

fn positive_quantity(quantity: f64) -> Result<f64, ApiError> {
    if quantity.is_finite() && quantity > 0.0 {
        Ok(quantity)
    } else {
        Err(ApiError::Validation(format!(
            "quantity must be a positive number, got {}",
            quantity
        )))
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.filter(|n| n.is_finite()).unwrap_or(0.0))
}

// The backend emits naive ISO timestamps; offsets are honoured when present.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {:?}: {}", raw, e)))
}
