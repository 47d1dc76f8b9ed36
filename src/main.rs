// src/main.rs
use clap::{Parser, Subcommand};
use env_logger::Builder;
use log::{error, info, LevelFilter};
use portfolio_tracker::config::{API_URL_VAR, TOKEN_PATH_VAR};
use portfolio_tracker::models::{
    Credentials, NewHolding, NewPortfolio, NewTransaction, Registration, TransactionType,
};
use portfolio_tracker::valuation::Performance;
use portfolio_tracker::watchlist::{self, WatchlistEntry};
use portfolio_tracker::{
    ApiClient, ApiError, Backend, Config, LoadOutcome, PortfolioLoader, PortfolioView, Session,
    TokenStore,
};
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(author, version, about = "Personal stock portfolio dashboard", long_about = None)]
struct Cli {
    /// Backend base URL (overrides PORTFOLIO_API_URL).
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Where the session token is kept (overrides PORTFOLIO_TOKEN_PATH).
    #[arg(long, global = true, value_name = "FILE")]
    token_path: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and store the session token.
    Login {
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session token.
    Logout,
    Register {
        email: String,
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Show the logged in user.
    Whoami,
    /// List portfolios.
    Portfolios,
    /// Load and value one portfolio. Defaults to your first portfolio.
    Show { id: Option<i64> },
    /// Create a portfolio, optionally seeded with `--stock SYMBOL:QTY`.
    Create {
        name: String,
        #[arg(long = "stock", value_parser = parse_stock)]
        stocks: Vec<NewHolding>,
    },
    Delete { id: i64 },
    /// Add shares of a symbol to a portfolio.
    Add { id: i64, symbol: String, quantity: f64 },
    /// Remove a holding by its stock id.
    Remove { id: i64, stock_id: i64 },
    Buy { id: i64, symbol: String, quantity: f64 },
    Sell { id: i64, symbol: String, quantity: f64 },
    Watchlist {
        #[command(subcommand)]
        action: Option<WatchlistAction>,
    },
    News {
        #[arg(long, default_value_t = 3)]
        limit: usize,
    },
    Search { query: String },
    Quote { symbol: String },
    /// Company name, industry and market cap.
    Profile { symbol: String },
    /// Value of every portfolio and the grand total.
    Performance,
}

#[derive(Debug, Subcommand)]
enum WatchlistAction {
    Add { symbol: String },
    Remove { symbol: String },
}

fn parse_stock(s: &str) -> Result<NewHolding, String> {
    let (symbol, quantity) = s
        .split_once(':')
        .ok_or_else(|| format!("expected SYMBOL:QTY, got {:?}", s))?;
    let quantity: f64 = quantity
        .trim()
        .parse()
        .map_err(|_| format!("invalid quantity in {:?}", s))?;
    NewHolding::new(symbol, quantity).map_err(|e| e.to_string())
}

fn load_config(cli: &Cli) -> Result<Config, ApiError> {
    Config::from_lookup(|key| match key {
        API_URL_VAR if cli.api_url.is_some() => cli.api_url.clone(),
        TOKEN_PATH_VAR if cli.token_path.is_some() => cli
            .token_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned()),
        _ => std::env::var(key).ok(),
    })
}

struct App {
    client: ApiClient,
    store: TokenStore,
}

impl App {
    fn new(config: &Config) -> Result<Self, ApiError> {
        let store = TokenStore::new(config.token_path.clone());
        let mut client = ApiClient::new(config)?;
        if let Some(session) = store.load()? {
            client = client.with_session(session);
        }
        Ok(Self { client, store })
    }

    fn authed(&self) -> Result<&ApiClient, ApiError> {
        match self.client.session() {
            Some(_) => Ok(&self.client),
            None => Err(ApiError::Auth(
                "not logged in, run `portfolio-tracker login`".to_string(),
            )),
        }
    }

    fn loader(&self) -> Result<PortfolioLoader<ApiClient>, ApiError> {
        Ok(PortfolioLoader::new(Arc::new(self.authed()?.clone())))
    }

    async fn run(&self, command: Command) -> Result<(), ApiError> {
        match command {
            Command::Login { username, password } => {
                let session: Session = self
                    .client
                    .login(&Credentials { username, password })
                    .await?;
                self.store.save(&session)?;
                println!("Logged in.");
            }
            Command::Logout => {
                self.store.clear()?;
                println!("Logged out.");
            }
            Command::Register {
                email,
                username,
                password,
            } => {
                let user = self
                    .client
                    .register(&Registration {
                        email,
                        username,
                        password,
                    })
                    .await?;
                println!("Registered {} (id {}). Log in to continue.", user.email, user.id);
            }
            Command::Whoami => {
                let user = self.authed()?.current_user().await?;
                match user.username {
                    Some(name) => println!("{} <{}> (id {})", name, user.email, user.id),
                    None => println!("{} (id {})", user.email, user.id),
                }
            }
            Command::Portfolios => {
                for p in self.authed()?.list_portfolios().await? {
                    println!(
                        "{:<6} {:<24} {} holding(s), {} transaction(s)",
                        p.id,
                        p.name,
                        p.holdings.len(),
                        p.transactions.len()
                    );
                }
            }
            Command::Show { id } => {
                let id = match id {
                    Some(id) => id,
                    None => self.authed()?.my_portfolio().await?.id,
                };
                let outcome = self.loader()?.load(id).await?;
                print_outcome(&outcome);
            }
            Command::Create { name, stocks } => {
                let portfolio = self
                    .authed()?
                    .create_portfolio(&NewPortfolio::new(&name, stocks)?)
                    .await?;
                info!("Portfolio {} created", portfolio.id);
                println!("Created portfolio {} (id {}).", portfolio.name, portfolio.id);
            }
            Command::Delete { id } => {
                self.authed()?.delete_portfolio(id).await?;
                println!("Portfolio {} deleted.", id);
            }
            Command::Add {
                id,
                symbol,
                quantity,
            } => {
                let stock = NewHolding::new(&symbol, quantity)?;
                let (added, outcome) = self.loader()?.add_stock(id, stock).await?;
                println!("{} added to portfolio {}.", added.symbol, id);
                print_reload(&outcome);
            }
            Command::Remove { id, stock_id } => {
                let outcome = self.loader()?.remove_stock(id, stock_id).await?;
                print_outcome(&outcome);
            }
            Command::Buy {
                id,
                symbol,
                quantity,
            } => self.transact(id, &symbol, quantity, TransactionType::Buy).await?,
            Command::Sell {
                id,
                symbol,
                quantity,
            } => self.transact(id, &symbol, quantity, TransactionType::Sell).await?,
            Command::Watchlist { action } => {
                let client = self.authed()?;
                match action {
                    Some(WatchlistAction::Add { symbol }) => {
                        let item = watchlist::add(client, &symbol).await?;
                        println!("{} added to watchlist.", item.symbol);
                    }
                    Some(WatchlistAction::Remove { symbol }) => {
                        watchlist::remove(client, &symbol).await?;
                        println!("{} removed from watchlist.", symbol.to_uppercase());
                    }
                    None => print_watchlist(&watchlist::load_watchlist(client).await?),
                }
            }
            Command::News { limit } => {
                for item in self.authed()?.market_news().await?.iter().take(limit) {
                    let when = item
                        .published_at()
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default();
                    println!("{}  {} ({})", when, item.headline, item.source);
                    println!("    {}", item.url);
                }
            }
            Command::Search { query } => {
                let results = self.client.search(&query).await?;
                for r in &results.result {
                    println!("{:<12} {:<16} {}", r.symbol, r.security_type, r.description);
                }
                println!("{} result(s)", results.count.max(results.result.len()));
            }
            Command::Quote { symbol } => {
                let symbol = portfolio_tracker::models::normalize_symbol(&symbol)?;
                let q = self.client.quote(&symbol).await?;
                println!(
                    "{}  ${:.2}  {:+.2} ({:+.2}%)  H {:.2}  L {:.2}  Vol {:.0}",
                    symbol,
                    q.current_price,
                    q.price_change,
                    q.percent_change,
                    q.day_high,
                    q.day_low,
                    q.volume
                );
            }
            Command::Profile { symbol } => {
                let symbol = portfolio_tracker::models::normalize_symbol(&symbol)?;
                let profile = self.client.company_profile(&symbol).await?;
                if profile.is_empty() {
                    return Err(ApiError::NotFound(format!("No profile for {}", symbol)));
                }
                println!("{} ({})  {}", profile.name, profile.ticker, profile.exchange);
                println!(
                    "Industry: {}   Country: {}   Market cap: {:.0}M {}",
                    profile.finnhub_industry,
                    profile.country,
                    profile.market_capitalization,
                    profile.currency
                );
                if !profile.weburl.is_empty() {
                    println!("{}", profile.weburl);
                }
            }
            Command::Performance => {
                let performance = self.loader()?.performance().await?;
                print_performance(&performance);
            }
        }
        Ok(())
    }

    async fn transact(
        &self,
        id: i64,
        symbol: &str,
        quantity: f64,
        kind: TransactionType,
    ) -> Result<(), ApiError> {
        let transaction = NewTransaction::new(symbol, quantity, kind)?;
        let (recorded, outcome) = self.loader()?.apply_transaction(id, transaction).await?;
        println!(
            "{} {} {} at ${:.2}",
            recorded.kind,
            recorded.quantity.abs(),
            recorded.symbol,
            recorded.price
        );
        print_reload(&outcome);
        Ok(())
    }
}

fn money(n: f64) -> String {
    format!("${:.2}", n)
}

fn print_outcome(outcome: &LoadOutcome) {
    match outcome.view() {
        Some(view) => print_view(view),
        None => println!("A newer load replaced this one."),
    }
}

// The write already went through, so a failed refresh is reported but not fatal.
fn print_reload(outcome: &Result<LoadOutcome, ApiError>) {
    match outcome {
        Ok(outcome) => print_outcome(outcome),
        Err(e) => eprintln!("Recorded, but refreshing the portfolio failed: {}", e),
    }
}

fn print_view(view: &PortfolioView) {
    let v = &view.valuation;
    println!("{} (id {})", view.name, view.id);
    println!(
        "Total value: {}   Day change: {:+.2}   Holdings: {}   Shares: {}",
        money(v.total_value),
        v.day_change,
        v.holding_count(),
        v.total_shares
    );
    println!();
    println!(
        "{:<6} {:<8} {:>10} {:>12} {:>14} {:>7} {:>8}",
        "ID", "SYMBOL", "QTY", "PRICE", "VALUE", "ALLOC", "CHANGE"
    );
    for h in &v.holdings {
        let (price, change) = if h.is_unavailable() {
            ("n/a".to_string(), "n/a".to_string())
        } else {
            (
                money(h.quote.current_price),
                format!("{:+.2}%", h.quote.percent_change),
            )
        };
        println!(
            "{:<6} {:<8} {:>10} {:>12} {:>14} {:>6.1}% {:>8}",
            h.holding.id,
            h.holding.symbol,
            h.holding.quantity,
            price,
            money(h.value),
            h.allocation_percent,
            change
        );
    }
    if v.unavailable > 0 {
        println!("({} quote(s) unavailable, valued at $0.00)", v.unavailable);
    }

    if !view.transactions.is_empty() {
        println!();
        println!(
            "{:<12} {:<8} {:<5} {:>10} {:>12}",
            "DATE", "SYMBOL", "TYPE", "QTY", "PRICE"
        );
        for t in &view.transactions {
            println!(
                "{:<12} {:<8} {:<5} {:>10} {:>12}",
                t.timestamp.format("%Y-%m-%d"),
                t.symbol,
                t.kind,
                t.quantity,
                money(t.price)
            );
        }
    }
}

fn print_performance(performance: &Performance) {
    for p in &performance.portfolios {
        let note = if p.unavailable > 0 {
            format!("  ({} quote(s) unavailable)", p.unavailable)
        } else {
            String::new()
        };
        println!("{:<6} {:<24} {:>14}{}", p.id, p.name, money(p.value), note);
    }
    println!("{:<31} {:>14}", "TOTAL", money(performance.total_value));
}

fn print_watchlist(entries: &[WatchlistEntry]) {
    for entry in entries {
        match &entry.quote {
            Some(q) => println!(
                "{:<8} {:>12} {:>+10.2} {:>+8.2}%",
                entry.item.symbol,
                money(q.current_price),
                q.price_change,
                q.percent_change
            ),
            None => println!("{:<8} {:>12}", entry.item.symbol, "n/a"),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(2);
        }
    };

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        config.log_level
    };
    Builder::new()
        .filter_level(level)
        .format_timestamp_secs()
        .init();

    let app = match App::new(&config) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialise client: {}", e);
            eprintln!("Error: {}", e);
            exit(2);
        }
    };

    if let Err(e) = app.run(cli.command).await {
        error!("Command failed: {}", e);
        eprintln!("Error: {}", e);
        if e.is_auth() {
            eprintln!("Your session is missing or expired. Run `portfolio-tracker login`.");
        }
        exit(1);
    }
}
