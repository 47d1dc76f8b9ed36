// src/api.rs
use crate::auth::Session;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::{
    AccessToken, CompanyProfile, Credentials, Holding, NewHolding, NewPortfolio, NewTransaction,
    NewsItem, Portfolio, Quote, Registration, SearchResponse, Transaction, User, WatchlistItem,
};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

/// The backend operations the load cycle and watchlist depend on.
///
/// `ApiClient` talks HTTP; tests substitute an in-memory implementation.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get_portfolio(&self, portfolio_id: i64) -> Result<Portfolio, ApiError>;
    async fn list_portfolios(&self) -> Result<Vec<Portfolio>, ApiError>;
    async fn add_stock(&self, portfolio_id: i64, stock: &NewHolding)
        -> Result<Holding, ApiError>;
    async fn remove_stock(&self, portfolio_id: i64, stock_id: i64) -> Result<(), ApiError>;
    async fn add_transaction(
        &self,
        portfolio_id: i64,
        transaction: &NewTransaction,
    ) -> Result<Transaction, ApiError>;
    async fn quote(&self, symbol: &str) -> Result<Quote, ApiError>;
    async fn watchlist(&self) -> Result<Vec<WatchlistItem>, ApiError>;
    async fn add_to_watchlist(&self, symbol: &str) -> Result<WatchlistItem, ApiError>;
    async fn remove_from_watchlist(&self, symbol: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    session: Option<Session>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        Self::with_timeout(&config.api_url, config.timeout)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ApiError::Config(format!("invalid API URL {:?}: {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(ApiError::Config(format!(
                "API URL {:?} cannot take a path",
                base_url
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: parsed,
            session: None,
        })
    }

    /// Attach the credential used by every subsequent request.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Append `segments` to the base path, percent-encoding each one.
    /// An empty last segment yields a trailing slash.
    pub fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Config(format!("API URL {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let url = self.url(segments)?;
        debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        Ok(match &self.session {
            Some(session) => builder.header(reqwest::header::AUTHORIZATION, session.authorization()),
            None => builder,
        })
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = builder.send().await.map_err(|e| {
            error!("HTTP request failed: {}", e);
            ApiError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = ApiError::from_status(status, &body);
        debug!("Backend answered HTTP {}: {}", status, err);
        Err(err)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let response = self.execute(self.request(Method::GET, segments)?).await?;
        Ok(response.json::<T>().await?)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .execute(self.request(Method::POST, segments)?.json(body))
            .await?;
        Ok(response.json::<T>().await?)
    }

    async fn delete(&self, segments: &[&str]) -> Result<(), ApiError> {
        self.execute(self.request(Method::DELETE, segments)?).await?;
        Ok(())
    }

    /// Exchange credentials for a session. Does not persist anything.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, ApiError> {
        let token: AccessToken = self.post(&["auth", "login"], credentials).await?;
        Ok(Session::from(token))
    }

    pub async fn register(&self, registration: &Registration) -> Result<User, ApiError> {
        self.post(&["auth", "register"], registration).await
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get(&["users", "me"]).await
    }

    /// The first portfolio owned by the current user.
    pub async fn my_portfolio(&self) -> Result<Portfolio, ApiError> {
        self.get(&["portfolios", "me"]).await
    }

    pub async fn create_portfolio(&self, portfolio: &NewPortfolio) -> Result<Portfolio, ApiError> {
        self.post(&["portfolios", ""], portfolio).await
    }

    pub async fn delete_portfolio(&self, portfolio_id: i64) -> Result<(), ApiError> {
        self.delete(&["portfolios", &portfolio_id.to_string()]).await
    }

    pub async fn market_news(&self) -> Result<Vec<NewsItem>, ApiError> {
        self.get(&["stocks", "market-news"]).await
    }

    pub async fn company_profile(&self, symbol: &str) -> Result<CompanyProfile, ApiError> {
        self.get(&["stocks", "profile", symbol]).await
    }

    pub async fn search(&self, query: &str) -> Result<SearchResponse, ApiError> {
        let builder = self
            .request(Method::GET, &["stocks", "search"])?
            .query(&[("q", query)]);
        let response = self.execute(builder).await?;
        Ok(response.json::<SearchResponse>().await?)
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn get_portfolio(&self, portfolio_id: i64) -> Result<Portfolio, ApiError> {
        self.get(&["portfolios", &portfolio_id.to_string()]).await
    }

    async fn list_portfolios(&self) -> Result<Vec<Portfolio>, ApiError> {
        self.get(&["portfolios", ""]).await
    }

    async fn add_stock(
        &self,
        portfolio_id: i64,
        stock: &NewHolding,
    ) -> Result<Holding, ApiError> {
        self.post(&["portfolios", &portfolio_id.to_string(), "stocks"], stock)
            .await
    }

    async fn remove_stock(&self, portfolio_id: i64, stock_id: i64) -> Result<(), ApiError> {
        self.delete(&[
            "portfolios",
            &portfolio_id.to_string(),
            "stocks",
            &stock_id.to_string(),
        ])
        .await
    }

    async fn add_transaction(
        &self,
        portfolio_id: i64,
        transaction: &NewTransaction,
    ) -> Result<Transaction, ApiError> {
        self.post(
            &["portfolios", &portfolio_id.to_string(), "transaction"],
            transaction,
        )
        .await
    }

    async fn quote(&self, symbol: &str) -> Result<Quote, ApiError> {
        self.get(&["stocks", "quote", symbol]).await
    }

    async fn watchlist(&self) -> Result<Vec<WatchlistItem>, ApiError> {
        self.get(&["stocks", "watchlist"]).await
    }

    async fn add_to_watchlist(&self, symbol: &str) -> Result<WatchlistItem, ApiError> {
        self.post(&["stocks", "watchlist"], &json!({ "symbol": symbol }))
            .await
    }

    async fn remove_from_watchlist(&self, symbol: &str) -> Result<(), ApiError> {
        self.delete(&["stocks", "watchlist", symbol]).await
    }
}
