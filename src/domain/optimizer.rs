//! Genetic search over strategy coefficients.
//!
//! Individuals are fixed-order gene vectors, one gene per searched
//! coefficient, each bounded by its range. Fitness is the summed backtest
//! profit over a random sample of tickers. A size-1 hall of fame carries the
//! best individual ever seen into every generation, and persisted state keeps
//! the best-so-far across restarts.

use crate::domain::backtest::{self, BacktestConfig};
use crate::domain::config_store::ConfigStore;
use crate::domain::config_validation::validate_range;
use crate::domain::error::TraderError;
use crate::domain::jobs::JobProgress;
use crate::domain::ohlcv::IndicatorBar;
use crate::domain::portfolio::DEFAULT_INITIAL_CASH;
use crate::domain::strategy::{CoefficientKey, StrategyConfig};
use crate::domain::universe::Universe;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use crate::ports::state_port::StatePort;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// Number of history entries returned by [`GeneticOptimizer::progress`].
pub const RECENT_HISTORY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoefficientRange {
    pub key: CoefficientKey,
    pub min: f64,
    pub max: f64,
}

impl CoefficientRange {
    pub const fn new(key: CoefficientKey, min: f64, max: f64) -> Self {
        CoefficientRange { key, min, max }
    }

    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

pub fn default_ranges() -> Vec<CoefficientRange> {
    use CoefficientKey as K;
    vec![
        CoefficientRange::new(K::CoefBollinger, 0.5, 2.0),
        CoefficientRange::new(K::CoefRsi, 0.5, 3.0),
        CoefficientRange::new(K::CoefMacd, 0.5, 3.0),
        CoefficientRange::new(K::CoefStoch, 0.5, 3.0),
        CoefficientRange::new(K::CoefAdxSma, 0.5, 2.0),
        CoefficientRange::new(K::CoefVolume, 0.5, 2.0),
        CoefficientRange::new(K::AdxTrendThreshold, 10.0, 40.0),
        CoefficientRange::new(K::BuySellThreshold, 0.5, 2.5),
        CoefficientRange::new(K::RsiOverbought, 60.0, 80.0),
        CoefficientRange::new(K::RsiOversold, 10.0, 40.0),
        CoefficientRange::new(K::StochOverbought, 70.0, 90.0),
        CoefficientRange::new(K::StochOversold, 10.0, 40.0),
        CoefficientRange::new(K::VolumeSmaMultiplier, 1.0, 3.0),
    ]
}

/// Ranges must be non-empty, valid, and name each key at most once.
pub fn validate_ranges(ranges: &[CoefficientRange]) -> Result<(), TraderError> {
    if ranges.is_empty() {
        return Err(TraderError::invalid("at least one coefficient range is required"));
    }
    let mut seen = HashSet::new();
    for range in ranges {
        validate_range(range.key, range.min, range.max)?;
        if !seen.insert(range.key) {
            return Err(TraderError::invalid(format!(
                "coefficient {} has more than one range",
                range.key
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerSettings {
    pub universe: Universe,
    pub tickers_per_eval: usize,
    pub period: String,
    pub interval: String,
    pub trade_quantity: i64,
    pub initial_cash: f64,
    pub crossover_prob: f64,
    pub mutation_prob: f64,
    pub blend_alpha: f64,
    pub mutation_sigma: f64,
    pub gene_mutation_prob: f64,
    pub tournament_size: usize,
    pub history_limit: usize,
    pub seed: Option<u64>,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        OptimizerSettings {
            universe: Universe::default(),
            tickers_per_eval: 3,
            period: "60d".to_string(),
            interval: "5m".to_string(),
            trade_quantity: 10,
            initial_cash: DEFAULT_INITIAL_CASH,
            crossover_prob: 0.5,
            mutation_prob: 0.2,
            blend_alpha: 0.5,
            mutation_sigma: 0.2,
            gene_mutation_prob: 0.2,
            tournament_size: 3,
            history_limit: 1000,
            seed: None,
        }
    }
}

impl OptimizerSettings {
    /// Read `[optimizer]` (and `[portfolio] initial_cash`); assumes the
    /// settings already passed `validate_settings`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let d = OptimizerSettings::default();
        let universe = Universe::from_list(&config.get_string_or("optimizer", "tickers", ""))?;
        let seed = match config.get_string("optimizer", "seed") {
            Some(raw) if !raw.trim().is_empty() => {
                Some(raw.trim().parse::<u64>().map_err(|e| TraderError::ConfigInvalid {
                    section: "optimizer".into(),
                    key: "seed".into(),
                    reason: e.to_string(),
                })?)
            }
            _ => None,
        };
        Ok(OptimizerSettings {
            universe,
            tickers_per_eval: config.get_int("optimizer", "tickers_per_eval", d.tickers_per_eval as i64).max(1) as usize,
            period: config.get_string_or("optimizer", "period", &d.period),
            interval: config.get_string_or("optimizer", "interval", &d.interval),
            trade_quantity: config.get_int("optimizer", "trade_quantity", d.trade_quantity),
            initial_cash: config.get_double("portfolio", "initial_cash", d.initial_cash),
            crossover_prob: config.get_double("optimizer", "crossover_prob", d.crossover_prob),
            mutation_prob: config.get_double("optimizer", "mutation_prob", d.mutation_prob),
            blend_alpha: config.get_double("optimizer", "blend_alpha", d.blend_alpha),
            mutation_sigma: config.get_double("optimizer", "mutation_sigma", d.mutation_sigma),
            gene_mutation_prob: config.get_double("optimizer", "gene_mutation_prob", d.gene_mutation_prob),
            tournament_size: config.get_int("optimizer", "tournament_size", d.tournament_size as i64).max(1) as usize,
            history_limit: config.get_int("optimizer", "history_limit", d.history_limit as i64).max(1) as usize,
            seed,
        })
    }
}

/// (score, avg_trades, avg_profit_pct). Only `score` drives selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fitness {
    pub score: f64,
    pub avg_trades: f64,
    pub avg_profit_pct: f64,
}

impl Fitness {
    pub fn better_than(&self, other: &Fitness) -> bool {
        self.score > other.score
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    pub genes: Vec<f64>,
    pub fitness: Option<Fitness>,
}

impl Individual {
    /// Unevaluated and non-finite fitness both rank below every real score.
    fn score(&self) -> f64 {
        match self.fitness {
            Some(f) if f.score.is_finite() => f.score,
            _ => f64::NEG_INFINITY,
        }
    }

    fn is_ranked(&self) -> bool {
        self.fitness.is_some_and(|f| f.score.is_finite())
    }
}

/// Size-1 hall of fame. `config` is the full strategy the fitness was earned
/// with, which may hold values outside the current run's ranges when the
/// entry was carried over from saved state.
#[derive(Debug, Clone)]
struct Champion {
    individual: Individual,
    config: StrategyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestRecord {
    pub score: f64,
    pub config: StrategyConfig,
    pub trades: f64,
    pub profit_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(rename = "gen")]
    pub generation: u64,
    pub score: f64,
    pub config: StrategyConfig,
    pub trades: f64,
    pub profit_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    #[serde(default)]
    pub best: Option<BestRecord>,
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
}

impl OptimizerState {
    /// Replace `best` only on strict improvement by a finite score. Returns
    /// whether it changed.
    pub fn offer_best(&mut self, candidate: BestRecord) -> bool {
        if !candidate.score.is_finite() {
            return false;
        }
        let improves = self
            .best
            .as_ref()
            .is_none_or(|b| !b.score.is_finite() || candidate.score > b.score);
        if improves {
            self.best = Some(candidate);
        }
        improves
    }

    /// Append a generation record, dropping the oldest beyond `limit`.
    pub fn record(&mut self, entry: HistoryRecord, limit: usize) {
        self.history.push(entry);
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
    }

    pub fn next_generation(&self) -> u64 {
        self.history.last().map_or(1, |h| h.generation + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerProgress {
    pub iterations: usize,
    pub best_score: Option<f64>,
    pub best_config: Option<StrategyConfig>,
    pub last_score: Option<f64>,
    pub last_config: Option<StrategyConfig>,
    pub recent: Vec<HistoryRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeRequest {
    pub generations: usize,
    pub population_size: usize,
    pub ranges: Vec<CoefficientRange>,
}

impl OptimizeRequest {
    pub fn new(generations: usize, population_size: usize) -> Self {
        OptimizeRequest {
            generations,
            population_size,
            ranges: default_ranges(),
        }
    }

    fn validate(&self) -> Result<(), TraderError> {
        if self.generations == 0 {
            return Err(TraderError::invalid("generations must be at least 1"));
        }
        if self.population_size < 2 {
            return Err(TraderError::invalid("population size must be at least 2"));
        }
        validate_ranges(&self.ranges)
    }
}

type BarCache = HashMap<String, Option<Arc<Vec<IndicatorBar>>>>;

/// One optimize call's working set: rng, bar cache, and the snapshot config.
struct Run<'a> {
    optimizer: &'a GeneticOptimizer,
    request: &'a OptimizeRequest,
    base: &'a StrategyConfig,
    rng: StdRng,
    mutation: Normal<f64>,
    bars: BarCache,
    saw_data: bool,
}

impl Run<'_> {
    fn config_for(&self, genes: &[f64]) -> StrategyConfig {
        let mut cfg = self.base.clone();
        for (range, value) in self.request.ranges.iter().zip(genes) {
            cfg.set(range.key, *value);
        }
        cfg
    }

    fn genes_of(&self, cfg: &StrategyConfig) -> Vec<f64> {
        self.request.ranges.iter().map(|r| cfg.get(r.key)).collect()
    }

    fn random_individual(&mut self) -> Individual {
        let genes = self
            .request
            .ranges
            .iter()
            .map(|r| {
                if r.min < r.max {
                    self.rng.gen_range(r.min..=r.max)
                } else {
                    r.min
                }
            })
            .collect();
        Individual { genes, fitness: None }
    }

    fn bars_for(&mut self, ticker: &str) -> Option<Arc<Vec<IndicatorBar>>> {
        if let Some(cached) = self.bars.get(ticker) {
            return cached.clone();
        }
        let settings = &self.optimizer.settings;
        let fetched = match backtest::fetch_bars(
            self.optimizer.data.as_ref(),
            ticker,
            &settings.period,
            &settings.interval,
        ) {
            Ok(bars) => Some(Arc::new(bars)),
            Err(e) => {
                warn!(ticker, error = %e, "no data for sampled ticker");
                None
            }
        };
        self.bars.insert(ticker.to_string(), fetched.clone());
        fetched
    }

    fn evaluate(&mut self, genes: &[f64]) -> Fitness {
        let settings = &self.optimizer.settings;
        let sampled = settings.universe.sample(&mut self.rng, settings.tickers_per_eval);
        let config = BacktestConfig {
            initial_cash: settings.initial_cash,
            trade_quantity: settings.trade_quantity,
            start: None,
            end: None,
        };
        let strategy = self.config_for(genes);

        let mut total_profit = 0.0;
        let mut total_trades = 0.0;
        for ticker in &sampled {
            let Some(bars) = self.bars_for(ticker) else {
                continue;
            };
            match backtest::run(ticker, &bars, &strategy, &config) {
                Ok(report) => {
                    self.saw_data = true;
                    total_profit += report.profit_pct;
                    total_trades += report.trade_count as f64;
                }
                Err(e) => warn!(ticker = %ticker, error = %e, "backtest failed during evaluation"),
            }
        }

        let n = sampled.len().max(1) as f64;
        Fitness {
            score: total_profit,
            avg_trades: total_trades / n,
            avg_profit_pct: total_profit / n,
        }
    }

    fn evaluate_pending(&mut self, population: &mut [Individual]) {
        for individual in population.iter_mut().filter(|i| i.fitness.is_none()) {
            individual.fitness = Some(self.evaluate(&individual.genes));
        }
    }

    fn tournament(&mut self, population: &[Individual]) -> Individual {
        let k = self.optimizer.settings.tournament_size.max(1);
        let mut best = &population[self.rng.gen_range(0..population.len())];
        for _ in 1..k {
            let challenger = &population[self.rng.gen_range(0..population.len())];
            if challenger.score() > best.score() {
                best = challenger;
            }
        }
        best.clone()
    }

    /// Blend crossover: each gene pair is mixed with a factor drawn from
    /// `[-alpha, 1 + alpha]`, then clipped to its range.
    fn blend(&mut self, a: &mut Individual, b: &mut Individual) {
        let alpha = self.optimizer.settings.blend_alpha;
        for (i, range) in self.request.ranges.iter().enumerate() {
            let gamma = (1.0 + 2.0 * alpha) * self.rng.gen_range(0.0..1.0) - alpha;
            let (x1, x2) = (a.genes[i], b.genes[i]);
            a.genes[i] = range.clip((1.0 - gamma) * x1 + gamma * x2);
            b.genes[i] = range.clip(gamma * x1 + (1.0 - gamma) * x2);
        }
        a.fitness = None;
        b.fitness = None;
    }

    fn mutate(&mut self, individual: &mut Individual) {
        let gene_prob = self.optimizer.settings.gene_mutation_prob.clamp(0.0, 1.0);
        for (gene, range) in individual.genes.iter_mut().zip(&self.request.ranges) {
            if self.rng.gen_bool(gene_prob) {
                *gene = range.clip(*gene + self.mutation.sample(&mut self.rng));
            }
        }
        individual.fitness = None;
    }

    /// Elite to re-inject into the next population. A carried-over champion
    /// whose config cannot be expressed by the current genes stays out of the
    /// population so its score is never attributed to a different config.
    fn elite<'c>(&self, champion: &'c Champion) -> Option<&'c Individual> {
        (self.config_for(&champion.individual.genes) == champion.config)
            .then_some(&champion.individual)
    }

    fn next_generation(&mut self, population: &[Individual]) -> Vec<Individual> {
        let mut offspring: Vec<Individual> = (0..population.len())
            .map(|_| self.tournament(population))
            .collect();

        let cx_prob = self.optimizer.settings.crossover_prob;
        for pair in offspring.chunks_mut(2) {
            if let [a, b] = pair {
                if self.rng.gen_bool(cx_prob.clamp(0.0, 1.0)) {
                    self.blend(a, b);
                }
            }
        }

        let mut_prob = self.optimizer.settings.mutation_prob;
        for individual in offspring.iter_mut() {
            if self.rng.gen_bool(mut_prob.clamp(0.0, 1.0)) {
                self.mutate(individual);
            }
        }
        offspring
    }
}

fn best_of(population: &[Individual]) -> Option<&Individual> {
    population
        .iter()
        .filter(|i| i.is_ranked())
        .max_by(|a, b| a.score().total_cmp(&b.score()))
}

pub struct GeneticOptimizer {
    data: Arc<dyn MarketDataPort>,
    store: Arc<dyn StatePort<OptimizerState>>,
    settings: OptimizerSettings,
    state: RwLock<OptimizerState>,
}

impl GeneticOptimizer {
    pub fn new(
        data: Arc<dyn MarketDataPort>,
        store: Arc<dyn StatePort<OptimizerState>>,
        settings: OptimizerSettings,
    ) -> Self {
        let state = store.load().unwrap_or_else(|| {
            info!(location = %store.location(), "no optimizer state, starting empty");
            OptimizerState::default()
        });
        GeneticOptimizer {
            data,
            store,
            settings,
            state: RwLock::new(state),
        }
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    pub fn state(&self) -> OptimizerState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn persist(&self, state: &OptimizerState) {
        if let Err(e) = self.store.save(state) {
            error!(location = %self.store.location(), error = %e, "failed to save optimizer state");
        }
    }

    /// Evolve `request.generations` generations starting from `base`.
    ///
    /// `base` supplies every coefficient that has no range in the request.
    /// Returns the best config ever observed, including a best carried over
    /// from earlier runs. State is saved after each generation; cancellation
    /// is honored between generations.
    pub fn optimize(
        &self,
        request: &OptimizeRequest,
        base: &StrategyConfig,
        progress: &JobProgress,
    ) -> Result<StrategyConfig, TraderError> {
        request.validate()?;
        let mutation = Normal::new(0.0, self.settings.mutation_sigma).map_err(|e| {
            TraderError::ConfigInvalid {
                section: "optimizer".into(),
                key: "mutation_sigma".into(),
                reason: e.to_string(),
            }
        })?;

        let rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut run = Run {
            optimizer: self,
            request,
            base,
            rng,
            mutation,
            bars: BarCache::new(),
            saw_data: false,
        };

        let mut hall_of_fame: Option<Champion> = self
            .state()
            .best
            .filter(|best| best.score.is_finite())
            .map(|best| Champion {
                individual: Individual {
                    genes: run.genes_of(&best.config),
                    fitness: Some(Fitness {
                        score: best.score,
                        avg_trades: best.trades,
                        avg_profit_pct: best.profit_pct,
                    }),
                },
                config: best.config,
            });

        info!(
            generations = request.generations,
            population = request.population_size,
            genes = request.ranges.len(),
            "starting optimization"
        );

        let mut population: Vec<Individual> = (0..request.population_size)
            .map(|_| run.random_individual())
            .collect();
        run.evaluate_pending(&mut population);

        if !run.saw_data {
            return Err(TraderError::no_data(
                "optimizer",
                "none of the sampled tickers returned data",
            ));
        }
        update_hall_of_fame(&run, &mut hall_of_fame, &population);

        for _ in 0..request.generations {
            if progress.is_cancelled() {
                info!("optimization cancelled");
                break;
            }

            let mut offspring = run.next_generation(&population);
            run.evaluate_pending(&mut offspring);

            if let Some(elite) = hall_of_fame.as_ref().and_then(|c| run.elite(c)) {
                if let Some(worst) = offspring
                    .iter_mut()
                    .min_by(|a, b| a.score().total_cmp(&b.score()))
                {
                    *worst = elite.clone();
                }
            }
            population = offspring;
            update_hall_of_fame(&run, &mut hall_of_fame, &population);

            if let Some(hof) = &hall_of_fame {
                self.record_generation(hof);
            }
            progress.advance();
        }

        let best = hall_of_fame
            .map(|hof| hof.config)
            .unwrap_or_else(|| base.clone());
        info!(hash = %best.content_hash(), "optimization finished");
        Ok(best)
    }

    fn record_generation(&self, hof: &Champion) {
        let Some(fitness) = hof.individual.fitness else {
            return;
        };
        let config = hof.config.clone();
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let generation = state.next_generation();
        state.record(
            HistoryRecord {
                generation,
                score: fitness.score,
                config: config.clone(),
                trades: fitness.avg_trades,
                profit_pct: fitness.avg_profit_pct,
            },
            self.settings.history_limit,
        );
        let improved = state.offer_best(BestRecord {
            score: fitness.score,
            config,
            trades: fitness.avg_trades,
            profit_pct: fitness.avg_profit_pct,
        });
        info!(
            generation,
            score = fitness.score,
            avg_trades = fitness.avg_trades,
            avg_profit_pct = fitness.avg_profit_pct,
            improved,
            "generation complete"
        );
        let snapshot = state.clone();
        drop(state);
        self.persist(&snapshot);
    }

    pub fn progress(&self) -> OptimizerProgress {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let last = state.history.last();
        let skip = state.history.len().saturating_sub(RECENT_HISTORY);
        OptimizerProgress {
            iterations: state.history.len(),
            best_score: state.best.as_ref().map(|b| b.score),
            best_config: state.best.as_ref().map(|b| b.config.clone()),
            last_score: last.map(|h| h.score),
            last_config: last.map(|h| h.config.clone()),
            recent: state.history[skip..].to_vec(),
        }
    }

    /// Merge the best config into `config` and persist it through
    /// `strategy_store`. Returns `false` when there is no best yet.
    pub fn apply_best(
        &self,
        config: &ConfigStore,
        strategy_store: &dyn StatePort<StrategyConfig>,
    ) -> Result<bool, TraderError> {
        let Some(best) = self.state().best else {
            return Ok(false);
        };
        let partial: BTreeMap<String, f64> = best.config.to_map();
        config.update(&partial)?;
        config.persist(strategy_store)?;
        info!(score = best.score, "applied optimizer best config");
        Ok(true)
    }

    /// Forget the best and all history, on disk as well.
    pub fn reset(&self) -> Result<(), TraderError> {
        let cleared = OptimizerState::default();
        self.store.save(&cleared)?;
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = cleared;
        info!("optimizer state reset");
        Ok(())
    }
}

fn update_hall_of_fame(
    run: &Run<'_>,
    hall_of_fame: &mut Option<Champion>,
    population: &[Individual],
) {
    let Some(candidate) = best_of(population) else {
        return;
    };
    let replace = match hall_of_fame {
        None => true,
        Some(current) => candidate.score() > current.individual.score(),
    };
    if replace {
        debug!(score = candidate.score(), "new hall of fame");
        *hall_of_fame = Some(Champion {
            individual: candidate.clone(),
            config: run.config_for(&candidate.genes),
        });
    }
}
