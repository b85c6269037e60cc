//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::{FileConfigAdapter, IniStrategyStore};
use crate::adapters::json_store::JsonFileStore;
use crate::domain::automation::AutoTradeOutcome;
use crate::domain::backtest::{BacktestConfig, BacktestReport};
use crate::domain::backtest_cache::{BacktestCache, CacheKey};
use crate::domain::config_store::ConfigStore;
use crate::domain::config_validation::validate_settings;
use crate::domain::error::TraderError;
use crate::domain::jobs::{self, BacktestJob, JobHandle, JobProgress, RunLock};
use crate::domain::ledger::Ledger;
use crate::domain::live::{LiveSession, LiveSettings, TickReport};
use crate::domain::optimizer::{GeneticOptimizer, OptimizeRequest, OptimizerSettings};
use crate::domain::portfolio::{DEFAULT_INITIAL_CASH, PortfolioSummary};
use crate::domain::universe::parse_tickers;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use crate::ports::state_port::StatePort;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(
    name = "papertrader",
    about = "Paper trading on rule-based signals, with backtests and a genetic coefficient search"
)]
pub struct Cli {
    /// Settings file; built-in defaults apply when it does not exist
    #[arg(short, long, global = true, default_value = "settings.ini")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score the latest bar of a ticker
    Signal { ticker: String },
    /// Buy at the last close
    Buy {
        ticker: String,
        #[arg(short, long, default_value_t = 1)]
        quantity: i64,
    },
    /// Sell at the last close
    Sell {
        ticker: String,
        #[arg(short, long, default_value_t = 1)]
        quantity: i64,
    },
    /// Reset the paper portfolio to its starting cash
    Reset,
    /// Show the portfolio valued at last closes
    Portfolio,
    /// Poll tickers and trade on signal changes
    Auto {
        /// Tickers, space or comma separated
        #[arg(required = true)]
        tickers: Vec<String>,
        #[arg(short, long)]
        quantity: Option<i64>,
        /// Stop after this many polling rounds
        #[arg(long)]
        iterations: Option<u64>,
    },
    /// Replay the strategy over stored history
    Backtest {
        #[arg(required = true)]
        tickers: Vec<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(short, long)]
        quantity: Option<i64>,
        /// Ignore cached results
        #[arg(long)]
        fresh: bool,
    },
    /// Search strategy coefficients with the genetic optimizer
    Optimize {
        #[arg(short, long, default_value_t = 10)]
        generations: usize,
        #[arg(short, long, default_value_t = 20)]
        population: usize,
    },
    /// Inspect or manage optimizer state
    Optimizer {
        #[command(subcommand)]
        action: OptimizerAction,
    },
    /// Inspect or edit the live strategy coefficients
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum OptimizerAction {
    Progress,
    /// Merge the best config found so far into the live config
    Apply,
    Reset,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    Show,
    /// Set coefficients, e.g. `coef_rsi=2.0 buy_sell_threshold=1.2`
    Set {
        #[arg(required = true)]
        assignments: Vec<String>,
    },
    /// Restore the values loaded at startup
    Reset,
    Hash,
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn execute(cli: Cli) -> Result<(), TraderError> {
    let app = App::open(&cli.config)?;
    match cli.command {
        Command::Signal { ticker } => run_signal(&app, &ticker),
        Command::Buy { ticker, quantity } => run_buy(&app, &ticker, quantity),
        Command::Sell { ticker, quantity } => run_sell(&app, &ticker, quantity),
        Command::Reset => run_reset(&app),
        Command::Portfolio => run_portfolio(&app),
        Command::Auto {
            tickers,
            quantity,
            iterations,
        } => run_auto(&app, &tickers, quantity, iterations),
        Command::Backtest {
            tickers,
            start,
            end,
            quantity,
            fresh,
        } => run_backtest(&app, &tickers, start, end, quantity, fresh),
        Command::Optimize {
            generations,
            population,
        } => run_optimize(&app, generations, population),
        Command::Optimizer { action } => run_optimizer_action(&app, action),
        Command::Config { action } => run_config_action(&app, action),
    }
}

/// Read the settings file; a missing file yields an empty (all defaults) config.
pub fn load_settings(path: &Path) -> Result<FileConfigAdapter, TraderError> {
    if !path.exists() {
        info!(path = %path.display(), "no settings file, using defaults");
        return Ok(FileConfigAdapter::empty());
    }
    let settings = FileConfigAdapter::from_file(path).map_err(|e| TraderError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Parse `key=value` pairs into a partial coefficient map.
pub fn parse_assignments(assignments: &[String]) -> Result<BTreeMap<String, f64>, TraderError> {
    let mut partial = BTreeMap::new();
    for item in assignments {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| TraderError::invalid(format!("expected key=value, got '{item}'")))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| TraderError::invalid(format!("'{}' is not a number", value.trim())))?;
        partial.insert(key.trim().to_lowercase(), value);
    }
    Ok(partial)
}

fn parse_ticker_args(args: &[String]) -> Result<Vec<String>, TraderError> {
    Ok(parse_tickers(&args.join(","))?)
}

struct App {
    settings: FileConfigAdapter,
    data: Arc<dyn MarketDataPort>,
    strategy_store: IniStrategyStore,
    config: Arc<ConfigStore>,
}

impl App {
    fn open(path: &Path) -> Result<Self, TraderError> {
        let settings = load_settings(path)?;
        let data_dir = settings.get_string_or("paths", "data_dir", "data");
        let strategy_store =
            IniStrategyStore::new(settings.get_string_or("paths", "strategy_file", "strategy.ini"));
        let config = Arc::new(ConfigStore::load(&strategy_store)?);
        Ok(App {
            data: Arc::new(CsvAdapter::new(PathBuf::from(data_dir))),
            settings,
            strategy_store,
            config,
        })
    }

    fn path(&self, key: &str, default: &str) -> PathBuf {
        PathBuf::from(self.settings.get_string_or("paths", key, default))
    }

    fn session(&self) -> LiveSession {
        let store = JsonFileStore::new(self.path("portfolio_file", "portfolio_data.json"));
        let initial_cash = self
            .settings
            .get_double("portfolio", "initial_cash", DEFAULT_INITIAL_CASH);
        let defaults = LiveSettings::default();
        let settings = LiveSettings {
            period: self.settings.get_string_or("live", "period", &defaults.period),
            interval: self.settings.get_string_or("live", "interval", &defaults.interval),
        };
        LiveSession::new(
            Arc::clone(&self.data),
            Arc::clone(&self.config),
            Ledger::open(Box::new(store), initial_cash),
            settings,
        )
    }

    fn optimizer(&self) -> Result<GeneticOptimizer, TraderError> {
        let store = JsonFileStore::new(self.path("optimizer_file", "optimizer_state.json"));
        Ok(GeneticOptimizer::new(
            Arc::clone(&self.data),
            Arc::new(store),
            OptimizerSettings::from_config(&self.settings)?,
        ))
    }
}

fn report_persist_error(ledger: &Ledger) {
    if let Some(e) = ledger.last_persist_error() {
        eprintln!("warning: portfolio not saved: {e}");
    }
}

fn print_tick(report: &TickReport) {
    let marker = if report.changed() { "*" } else { " " };
    println!(
        "{marker} {:<8} {}  close {:>10.2}  {:<7} buy {:.2} / sell {:.2}",
        report.ticker,
        report.bar_time.format("%Y-%m-%d %H:%M"),
        report.close,
        report.evaluation.signal,
        report.evaluation.buy_score,
        report.evaluation.sell_score,
    );
    if let Some(outcome) = &report.trade {
        match outcome {
            AutoTradeOutcome::Bought { quantity, price } => {
                println!("    bought {quantity} at {price:.2}")
            }
            AutoTradeOutcome::Sold {
                quantity,
                price,
                realized_pnl,
            } => println!("    sold {quantity} at {price:.2}, realized {realized_pnl:+.2}"),
            AutoTradeOutcome::Rejected(e) => println!("    rejected: {e}"),
            AutoTradeOutcome::Repeated | AutoTradeOutcome::Observed => {}
        }
    }
}

fn print_summary(summary: &PortfolioSummary) {
    println!("Cash:           {:>14.2}", summary.cash);
    println!("Positions:      {:>14.2}", summary.positions_value);
    println!("Total value:    {:>14.2}", summary.total_value);
    println!("Initial cash:   {:>14.2}", summary.initial_cash);
    println!("PnL:            {:>13.2}%", summary.pnl_pct);
    println!("Realized PnL:   {:>14.2}", summary.realized_pnl);
    if summary.rows.is_empty() {
        println!("No open positions.");
        return;
    }
    println!();
    println!(
        "{:<8} {:>8} {:>12} {:>12} {:>14} {:>12}",
        "Ticker", "Qty", "Avg price", "Price", "Value", "Unrealized"
    );
    for row in &summary.rows {
        println!(
            "{:<8} {:>8} {:>12.2} {:>12.2} {:>14.2} {:>12.2}",
            row.ticker,
            row.quantity,
            row.average_price,
            row.price,
            row.market_value,
            row.unrealized_pnl
        );
    }
    println!("Total shares: {}", summary.total_shares);
}

fn print_backtest(report: &BacktestReport, cached: bool) {
    if report.is_empty() {
        println!("{:<8} no bars in range", report.ticker);
        return;
    }
    println!(
        "{:<8} {:>+9.2}% {:>6} {:>14.2} {:>14.2} {:>8} {:>14.2}{}",
        report.ticker,
        report.profit_pct,
        report.trade_count,
        report.money_spent,
        report.money_retrieved,
        report.shares_still_held,
        report.final_equity,
        if cached { "  (cached)" } else { "" }
    );
}

fn wait_with_progress<T>(label: &str, handle: &JobHandle<T>) {
    let progress: &JobProgress = handle.progress();
    let mut last_reported = usize::MAX;
    while !handle.is_finished() {
        let done = progress.completed();
        if done != last_reported {
            eprintln!("{label}: {done}/{} ({:.0}%)", progress.total(), progress.progress_pct());
            last_reported = done;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn run_signal(app: &App, ticker: &str) -> Result<(), TraderError> {
    let mut session = app.session();
    let report = session.tick(&ticker.to_uppercase(), 0, false)?;
    print_tick(&report);
    Ok(())
}

fn run_buy(app: &App, ticker: &str, quantity: i64) -> Result<(), TraderError> {
    let ticker = ticker.to_uppercase();
    let mut session = app.session();
    let price = session.buy(&ticker, quantity)?;
    println!(
        "Bought {quantity} {ticker} at {price:.2}. Cash: {:.2}",
        session.ledger().portfolio().cash()
    );
    report_persist_error(session.ledger());
    Ok(())
}

fn run_sell(app: &App, ticker: &str, quantity: i64) -> Result<(), TraderError> {
    let ticker = ticker.to_uppercase();
    let mut session = app.session();
    let (price, pnl) = session.sell(&ticker, quantity)?;
    println!(
        "Sold {quantity} {ticker} at {price:.2}, realized {pnl:+.2}. Cash: {:.2}",
        session.ledger().portfolio().cash()
    );
    report_persist_error(session.ledger());
    Ok(())
}

fn run_reset(app: &App) -> Result<(), TraderError> {
    let mut session = app.session();
    session.ledger_mut().reset();
    println!(
        "Portfolio reset. Cash: {:.2}",
        session.ledger().portfolio().cash()
    );
    report_persist_error(session.ledger());
    Ok(())
}

fn run_portfolio(app: &App) -> Result<(), TraderError> {
    print_summary(&app.session().summary());
    Ok(())
}

fn run_auto(
    app: &App,
    tickers: &[String],
    quantity: Option<i64>,
    iterations: Option<u64>,
) -> Result<(), TraderError> {
    let tickers = parse_ticker_args(tickers)?;
    let quantity = quantity.unwrap_or_else(|| app.settings.get_int("live", "trade_quantity", 1));
    if quantity <= 0 {
        return Err(TraderError::invalid("quantity must be positive"));
    }
    let pause = Duration::from_secs(app.settings.get_int("live", "poll_seconds", 300).max(1) as u64);

    let mut session = app.session();
    info!(tickers = tickers.len(), quantity, poll_seconds = pause.as_secs(), "automation started");
    let mut round = 0u64;
    loop {
        for ticker in &tickers {
            match session.tick(ticker, quantity, true) {
                Ok(report) => print_tick(&report),
                Err(e @ TraderError::NoData { .. }) => warn!(ticker = %ticker, error = %e, "no data this round"),
                Err(e) => return Err(e),
            }
        }
        report_persist_error(session.ledger());
        round += 1;
        if iterations.is_some_and(|limit| round >= limit) {
            break;
        }
        thread::sleep(pause);
    }
    Ok(())
}

fn run_backtest(
    app: &App,
    tickers: &[String],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    quantity: Option<i64>,
    fresh: bool,
) -> Result<(), TraderError> {
    let tickers = parse_ticker_args(tickers)?;
    let interval = app.settings.get_string_or("backtest", "interval", "15m");
    let period = app.settings.get_string_or("backtest", "period", "max");
    let config = BacktestConfig {
        initial_cash: app
            .settings
            .get_double("portfolio", "initial_cash", DEFAULT_INITIAL_CASH),
        trade_quantity: quantity
            .unwrap_or_else(|| app.settings.get_int("backtest", "trade_quantity", 10)),
        start,
        end,
    };

    let cache_store: JsonFileStore<BacktestCache> =
        JsonFileStore::new(app.path("backtest_cache_file", "backtest_cache.json"));
    let mut cache = cache_store.load().unwrap_or_default();
    let strategy = app.config.get();
    let live_hash = strategy.content_hash();

    let mut cached = BTreeMap::new();
    let mut pending = Vec::new();
    for ticker in &tickers {
        let key = CacheKey::new(ticker, &interval, start, end);
        let hit = if fresh {
            None
        } else {
            match cache.get(&key, &live_hash) {
                Ok(hit) => hit.cloned(),
                Err(e) => {
                    info!(ticker = %ticker, error = %e, "recomputing");
                    None
                }
            }
        };
        match hit {
            Some(report) => {
                cached.insert(ticker.clone(), report);
            }
            None => pending.push(ticker.clone()),
        }
    }

    let mut computed = BTreeMap::new();
    if !pending.is_empty() {
        let lock = RunLock::new("backtest");
        let job = BacktestJob {
            tickers: pending,
            period,
            interval: interval.clone(),
            config: config.clone(),
        };
        let handle = jobs::spawn_backtest(&lock, Arc::clone(&app.data), job, strategy)?;
        wait_with_progress("backtest", &handle);
        for outcome in handle.join()? {
            match outcome.result {
                Ok(report) => {
                    cache.insert(
                        CacheKey::new(&outcome.ticker, &interval, start, end),
                        &live_hash,
                        report.clone(),
                    );
                    computed.insert(outcome.ticker, Ok(report));
                }
                Err(e) => {
                    computed.insert(outcome.ticker, Err(e));
                }
            }
        }
        if let Err(e) = cache_store.save(&cache) {
            eprintln!("warning: backtest cache not saved: {e}");
        }
    }

    println!(
        "{:<8} {:>10} {:>6} {:>14} {:>14} {:>8} {:>14}",
        "Ticker", "Profit", "Trades", "Spent", "Retrieved", "Held", "Equity"
    );
    let mut any_data = false;
    for ticker in &tickers {
        if let Some(report) = cached.get(ticker) {
            any_data = true;
            print_backtest(report, true);
        } else if let Some(result) = computed.get(ticker) {
            match result {
                Ok(report) => {
                    any_data = true;
                    print_backtest(report, false);
                }
                Err(e) => println!("{ticker:<8} {e}"),
            }
        }
    }
    if !any_data {
        return Err(TraderError::no_data(tickers.join(","), "no ticker had data"));
    }
    Ok(())
}

fn run_optimize(app: &App, generations: usize, population: usize) -> Result<(), TraderError> {
    let optimizer = Arc::new(app.optimizer()?);
    let lock = RunLock::new("optimizer");
    let request = OptimizeRequest::new(generations, population);
    let handle = jobs::spawn_optimizer(&lock, Arc::clone(&optimizer), request, app.config.get())?;
    wait_with_progress("optimizer", &handle);
    let best = handle.join()?;

    let progress = optimizer.progress();
    println!(
        "Best score: {}",
        progress
            .best_score
            .map_or_else(|| "-".to_string(), |s| format!("{s:.4}"))
    );
    for (key, value) in best.to_map() {
        println!("  {key} = {value:.4}");
    }
    println!("Run `papertrader optimizer apply` to use it.");
    Ok(())
}

fn run_optimizer_action(app: &App, action: OptimizerAction) -> Result<(), TraderError> {
    let optimizer = app.optimizer()?;
    match action {
        OptimizerAction::Progress => {
            let progress = optimizer.progress();
            println!("Generations: {}", progress.iterations);
            match (&progress.best_score, &progress.best_config) {
                (Some(score), Some(config)) => {
                    println!("Best score:  {score:.4}");
                    for (key, value) in config.to_map() {
                        println!("  {key} = {value:.4}");
                    }
                }
                _ => println!("Best score:  -"),
            }
            if let Some(score) = progress.last_score {
                println!("Last score:  {score:.4}");
            }
            if !progress.recent.is_empty() {
                println!();
                println!("{:>6} {:>12} {:>10} {:>10}", "Gen", "Score", "Trades", "Profit %");
                for entry in &progress.recent {
                    println!(
                        "{:>6} {:>12.4} {:>10.2} {:>10.2}",
                        entry.generation, entry.score, entry.trades, entry.profit_pct
                    );
                }
            }
        }
        OptimizerAction::Apply => {
            if optimizer.apply_best(&app.config, &app.strategy_store)? {
                println!("Applied best config. Hash: {}", app.config.hash());
            } else {
                println!("No optimizer result to apply yet.");
            }
        }
        OptimizerAction::Reset => {
            optimizer.reset()?;
            println!("Optimizer state cleared.");
        }
    }
    Ok(())
}

fn run_config_action(app: &App, action: ConfigAction) -> Result<(), TraderError> {
    match action {
        ConfigAction::Show => {
            for (key, value) in app.config.get().to_map() {
                println!("{key} = {value}");
            }
        }
        ConfigAction::Set { assignments } => {
            let partial = parse_assignments(&assignments)?;
            app.config.update(&partial)?;
            app.config.persist(&app.strategy_store)?;
            println!("Updated. Hash: {}", app.config.hash());
        }
        ConfigAction::Reset => {
            app.config.reset();
            app.config.persist(&app.strategy_store)?;
            println!("Reset. Hash: {}", app.config.hash());
        }
        ConfigAction::Hash => println!("{}", app.config.hash()),
    }
    Ok(())
}
