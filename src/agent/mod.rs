//! Agent Module
//!
//! Provides the decision pipeline that ties the engines together:
//! - Per-candidate regime, fusion, leverage and Kelly sizing (no I/O)
//! - Serialized admission against open positions and the daily risk budget
//! - Position closing with failure attribution and trade history
//! - Learning cadence and atomic parameter publication

pub mod correlation;
pub mod risk_budget;

pub use correlation::{CorrelationDecision, CorrelationModel, HeuristicCorrelation, PositionLedger};
pub use risk_budget::{BudgetRejection, DailyRiskBudget, RiskLedger};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::agentic::{
    ExitContext, FailureClassifier, LearnError, LearnOutcome, ParamChange, ParameterLearner,
    PerformanceMetrics, TradeHistory,
};
use crate::config::AppConfig;
use crate::engines::{annualized_volatility, recommend_leverage, size_position, RegimeAdjustment, RegimeDetector, SignalFusion};
use crate::params::ParameterSet;
use crate::state::SharedParameters;
use crate::store::{StateStore, StoreError};
use crate::telemetry;
use crate::utils::helpers::Clock;
use crate::utils::types::{
    Candidate, Direction, MarketSnapshot, Position, PositionStatus, TradePlan, TradeRecord, WinEstimate,
};

/// Why an actionable plan was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// A position in the symbol is already open
    DuplicateSymbol,
    /// Correlated exposure leaves less than the minimum size
    CorrelationLimit,
    /// The plan's risk does not fit in today's budget
    DailyRiskBudget,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::DuplicateSymbol => "duplicate_symbol",
            RejectReason::CorrelationLimit => "correlation_limit",
            RejectReason::DailyRiskBudget => "daily_risk_budget",
        }
    }
}

/// Final outcome for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Admitted {
        plan: TradePlan,
        position_id: String,
    },
    /// Admitted at a smaller size because of correlated exposure
    Resized {
        plan: TradePlan,
        position_id: String,
        requested_size: f64,
    },
    Rejected {
        plan: TradePlan,
        reason: RejectReason,
        detail: String,
    },
    /// No direction; never sized or ledgered
    Flat { reasons: Vec<String> },
    /// Inputs could not produce a plan
    NoPlan { reason: String },
}

impl DecisionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DecisionOutcome::Admitted { .. } => "admitted",
            DecisionOutcome::Resized { .. } => "resized",
            DecisionOutcome::Rejected { .. } => "rejected",
            DecisionOutcome::Flat { .. } => "flat",
            DecisionOutcome::NoPlan { .. } => "no_plan",
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, DecisionOutcome::Admitted { .. } | DecisionOutcome::Resized { .. })
    }

    pub fn plan(&self) -> Option<&TradePlan> {
        match self {
            DecisionOutcome::Admitted { plan, .. }
            | DecisionOutcome::Resized { plan, .. }
            | DecisionOutcome::Rejected { plan, .. } => Some(plan),
            DecisionOutcome::Flat { .. } | DecisionOutcome::NoPlan { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub symbol: String,
    #[serde(flatten)]
    pub outcome: DecisionOutcome,
}

/// Summary of a learner run triggered by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningReport {
    pub outcome: String,
    pub samples: usize,
    pub parameter_version: u64,
    pub changes: Vec<ParamChange>,
}

/// Result of one decision cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub timestamp: DateTime<Utc>,
    /// Version of the parameter snapshot the cycle used
    pub parameter_version: u64,
    /// In evaluation order: unplanned candidates first, then by reward-to-risk
    pub decisions: Vec<Decision>,
    pub daily_risk_used: f64,
    pub daily_risk_limit: f64,
    pub open_positions: usize,
    /// A write failed and the cycle continued in memory
    pub degraded: bool,
    pub learning: Option<LearningReport>,
}

impl CycleReport {
    pub fn admitted(&self) -> impl Iterator<Item = &Decision> {
        self.decisions.iter().filter(|d| d.outcome.is_admitted())
    }

    pub fn decision(&self, symbol: &str) -> Option<&Decision> {
        self.decisions.iter().find(|d| d.symbol == symbol)
    }
}

/// Current quote for an open position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    #[serde(default)]
    pub snapshot: MarketSnapshot,
}

/// Single-writer state guarded by the admission lock
struct Book {
    positions: PositionLedger,
    budget: DailyRiskBudget,
    degraded: bool,
    closed_since_learn: usize,
}

/// Decision agent that coordinates all components
pub struct DecisionAgent {
    config: Arc<AppConfig>,
    params: Arc<SharedParameters>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    correlation: Arc<dyn CorrelationModel>,
    regime: RegimeDetector,
    fusion: SignalFusion,
    classifier: FailureClassifier,
    learner: ParameterLearner,
    /// Lock order: book, then history
    book: Mutex<Book>,
    history: RwLock<TradeHistory>,
    /// Serializes parameter publication
    publish_lock: Mutex<()>,
}

impl DecisionAgent {
    /// Create an agent with fresh in-memory state. Call [`DecisionAgent::load`] to restore persisted documents.
    pub fn new(config: AppConfig, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        let correlation: Arc<dyn CorrelationModel> =
            Arc::new(HeuristicCorrelation::new(&config.risk.correlation_overrides));
        let params = ParameterSet::default().with_history_capacity(config.storage.parameter_history_capacity);
        let book = Book {
            positions: PositionLedger::default(),
            budget: DailyRiskBudget::new(
                config.risk.daily_risk_limit,
                config.risk.ledger_retention_days,
                RiskLedger::default(),
            ),
            degraded: false,
            closed_since_learn: 0,
        };

        Self {
            params: Arc::new(SharedParameters::new(params)),
            store,
            clock,
            correlation,
            regime: RegimeDetector::new(&config.regime),
            fusion: SignalFusion::new(config.fusion.clone()),
            classifier: FailureClassifier::new(config.attribution.clone()),
            learner: ParameterLearner::new(config.learner.clone()),
            book: Mutex::new(book),
            history: RwLock::new(TradeHistory::new(config.storage.trade_history_capacity)),
            publish_lock: Mutex::new(()),
            config: Arc::new(config),
        }
    }

    /// Replace the correlation source
    pub fn with_correlation_model(mut self, model: Arc<dyn CorrelationModel>) -> Self {
        self.correlation = model;
        self
    }

    /// Restore persisted documents. Missing documents start fresh; unreadable ones are logged and replaced.
    pub async fn load(&self) {
        match self.store.load_parameters().await {
            Ok(Some(persisted)) => {
                let merged = ParameterSet::merge_persisted(persisted, self.config.storage.parameter_history_capacity);
                telemetry::record_parameter_version(merged.version);
                self.params.publish(merged);
            }
            Ok(None) => debug!("No persisted parameters, using defaults"),
            Err(e) => warn!("Failed to load parameters, using defaults: {}", e),
        }

        let mut book = self.book.lock().await;
        self.reload_book(&mut book).await;
        info!(
            "Agent state loaded: {} open positions, {} trades in history, parameters v{}",
            book.positions.len(),
            self.history.read().await.len(),
            self.params.snapshot().version
        );
    }

    /// Replace positions, ledger and history with the last durable documents
    async fn reload_book(&self, book: &mut Book) {
        book.positions = load_or_fresh(self.store.load_positions().await, "positions");
        book.budget.replace_ledger(load_or_fresh(self.store.load_risk_ledger().await, "risk ledger"));
        let history: TradeHistory = load_or_fresh(self.store.load_trade_history().await, "trade history");
        *self.history.write().await = history.with_capacity(self.config.storage.trade_history_capacity);
        book.degraded = false;
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Currently published parameter set
    pub fn parameters(&self) -> Arc<ParameterSet> {
        self.params.snapshot()
    }

    pub fn shared_parameters(&self) -> Arc<SharedParameters> {
        self.params.clone()
    }

    pub async fn open_positions(&self) -> Vec<Position> {
        self.book.lock().await.positions.iter().cloned().collect()
    }

    pub async fn daily_risk_used(&self) -> f64 {
        let today = self.clock.today();
        self.book.lock().await.budget.used(today)
    }

    pub async fn is_degraded(&self) -> bool {
        self.book.lock().await.degraded
    }

    pub async fn performance(&self) -> PerformanceMetrics {
        self.history.read().await.metrics()
    }

    pub async fn trade_history(&self) -> Vec<TradeRecord> {
        self.history.read().await.records().cloned().collect()
    }

    /// Run one decision cycle over a batch of candidates
    pub async fn run_cycle(&self, candidates: Vec<Candidate>) -> CycleReport {
        let started = Instant::now();
        let params = self.params.snapshot();
        let now = self.clock.now();
        let today = self.clock.today();
        let history_win_rate = self.history.read().await.attributable_win_rate().unwrap_or(0.5);

        let mut decisions = Vec::with_capacity(candidates.len());
        let mut planned: Vec<(TradePlan, Candidate)> = Vec::new();

        for candidate in candidates {
            let candidate = sanitize_candidate(candidate);
            match self.plan(&candidate, &params, history_win_rate, now) {
                Ok(plan) => planned.push((plan, candidate)),
                Err(outcome) => {
                    telemetry::record_decision(outcome.label());
                    decisions.push(Decision { symbol: candidate.symbol, outcome });
                }
            }
        }

        planned.sort_by(|(a, _), (b, _)| b.rr.total_cmp(&a.rr).then_with(|| a.symbol.cmp(&b.symbol)));

        let mut book = self.book.lock().await;
        if book.degraded {
            info!("Previous cycle ran degraded, reloading durable state");
            self.reload_book(&mut book).await;
        }
        book.budget.roll_to(today);

        for (plan, candidate) in planned {
            let symbol = plan.symbol.clone();
            let outcome = self.admit(&mut book, plan, candidate, &params, now).await;
            telemetry::record_decision(outcome.label());
            decisions.push(Decision { symbol, outcome });
        }

        let daily_risk_used = book.budget.used(today);
        let open_positions = book.positions.len();
        let degraded = book.degraded;
        let learn_due = self.config.learner.enabled
            && book.closed_since_learn >= self.config.learner.cadence_closed_trades.max(1);
        drop(book);

        telemetry::record_daily_risk(daily_risk_used);
        telemetry::record_open_positions(open_positions);

        let learning = if learn_due {
            match self.learn_now().await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("Learning run failed, keeping parameters v{}: {}", params.version, e);
                    None
                }
            }
        } else {
            None
        };

        telemetry::record_cycle_latency(started.elapsed().as_secs_f64() * 1000.0);
        info!(
            "Cycle complete: {} decisions, {} admitted, daily risk {:.4}/{:.4}{}",
            decisions.len(),
            decisions.iter().filter(|d| d.outcome.is_admitted()).count(),
            daily_risk_used,
            self.config.risk.daily_risk_limit,
            if degraded { " (degraded)" } else { "" }
        );

        CycleReport {
            timestamp: now,
            parameter_version: params.version,
            decisions,
            daily_risk_used,
            daily_risk_limit: self.config.risk.daily_risk_limit,
            open_positions,
            degraded,
            learning,
        }
    }

    /// Build a sized plan for a candidate, or the flat/no-plan outcome
    fn plan(
        &self,
        candidate: &Candidate,
        params: &ParameterSet,
        history_win_rate: f64,
        now: DateTime<Utc>,
    ) -> Result<TradePlan, DecisionOutcome> {
        let sizing = &self.config.sizing;
        let snapshot = &candidate.snapshot;

        let reading = self.regime.observe(&candidate.symbol, snapshot, &candidate.signals, params);
        let draft = self
            .fusion
            .fuse(candidate, &reading, params, now)
            .ok_or_else(|| DecisionOutcome::NoPlan { reason: "No valid stop distance".to_string() })?;

        if !draft.is_actionable() {
            return Err(DecisionOutcome::Flat { reasons: draft.reasons });
        }
        if snapshot.price <= 0.0 {
            return Err(DecisionOutcome::NoPlan { reason: "No entry price".to_string() });
        }

        let leverage = recommend_leverage(
            draft.rr,
            annualized_volatility(snapshot.volatility_hourly),
            candidate.asset_class,
            &self.config.leverage,
        );

        let estimate = candidate.win_estimate.unwrap_or(WinEstimate {
            probability: history_win_rate,
            confidence: sizing.history_confidence,
        });
        let kelly = size_position(&estimate, draft.rr, params, sizing);
        let adjustment = RegimeAdjustment::for_reading(&reading, params);
        let size_fraction = (kelly.size_fraction * adjustment.size_multiplier)
            .clamp(sizing.min_position_size, sizing.max_position_size);

        let (stop_price, target_price) = draft.price_levels(snapshot.price);

        Ok(TradePlan {
            symbol: candidate.symbol.clone(),
            asset_class: candidate.asset_class,
            direction: draft.direction,
            expected_return_pct: draft.expected_return_pct,
            expected_profit_pct: draft.expected_profit_pct,
            stop_pct: draft.stop_pct,
            rr: draft.rr,
            leverage,
            size_fraction,
            entry_price: snapshot.price,
            stop_price,
            target_price,
            regime: reading,
            win_probability: kelly.win_probability,
            news_count: candidate.signals.news_count,
            correlation_limited: false,
        })
    }

    /// Admission critical section for one plan
    async fn admit(
        &self,
        book: &mut Book,
        mut plan: TradePlan,
        candidate: Candidate,
        params: &ParameterSet,
        now: DateTime<Utc>,
    ) -> DecisionOutcome {
        let today = self.clock.today();

        if book.positions.contains(&plan.symbol) {
            debug!("{} rejected: position already open", plan.symbol);
            return DecisionOutcome::Rejected {
                plan,
                reason: RejectReason::DuplicateSymbol,
                detail: "Position already open".to_string(),
            };
        }

        let requested_size = plan.size_fraction;
        let decision = correlation::check_exposure(
            &plan.symbol,
            requested_size,
            &book.positions,
            self.correlation.as_ref(),
            params,
            self.config.sizing.min_position_size,
        );
        match decision {
            CorrelationDecision::Accept { .. } => {}
            CorrelationDecision::Resize { size, exposure } => {
                info!(
                    "{} resized {:.4} -> {:.4} (correlated exposure {:.4})",
                    plan.symbol, requested_size, size, exposure
                );
                plan.size_fraction = size;
                plan.correlation_limited = true;
            }
            CorrelationDecision::Reject { exposure, cap } => {
                info!("{} rejected: correlated exposure {:.4} vs cap {:.4}", plan.symbol, exposure, cap);
                return DecisionOutcome::Rejected {
                    plan,
                    reason: RejectReason::CorrelationLimit,
                    detail: format!("Correlated exposure {:.4} leaves no room under cap {:.4}", exposure, cap),
                };
            }
        }

        let risk = plan.risk();
        if let Err(BudgetRejection { used, requested, limit }) = book.budget.check(today, risk) {
            info!(
                "{} rejected: daily risk {:.4} + {:.4} exceeds {:.4}",
                plan.symbol, used, requested, limit
            );
            return DecisionOutcome::Rejected {
                plan,
                reason: RejectReason::DailyRiskBudget,
                detail: format!("Daily risk {:.4} + {:.4} exceeds limit {:.4}", used, requested, limit),
            };
        }

        let position = Position::from_plan(&plan, candidate.signals, &candidate.snapshot, now);
        let position_id = position.id.clone();
        book.budget.commit(today, risk);
        book.positions.insert(position);
        info!(
            "Admitted {} {} size {:.4} leverage {}x rr {:.2} stop {:.4}",
            plan.direction, plan.symbol, plan.size_fraction, plan.leverage, plan.rr, plan.stop_pct
        );

        self.persist_book(book).await;

        if plan.correlation_limited {
            DecisionOutcome::Resized { plan, position_id, requested_size }
        } else {
            DecisionOutcome::Admitted { plan, position_id }
        }
    }

    /// Close positions whose target or stop was hit
    pub async fn evaluate_positions(&self, quotes: &[Quote]) -> Vec<TradeRecord> {
        let hits: Vec<(String, PositionStatus, MarketSnapshot)> = {
            let book = self.book.lock().await;
            quotes
                .iter()
                .filter_map(|quote| {
                    let symbol = normalize_symbol(&quote.symbol);
                    let snapshot = quote.snapshot.clone().sanitized();
                    let position = book.positions.get(&symbol)?;
                    exit_status(position, snapshot.price).map(|status| (symbol, status, snapshot))
                })
                .collect()
        };

        let mut closed = Vec::with_capacity(hits.len());
        for (symbol, status, snapshot) in hits {
            if let Some(record) = self.close_position(&symbol, &snapshot, status).await {
                closed.push(record);
            }
        }
        closed
    }

    /// Close an open position, attribute the outcome and append it to the history.
    /// An `Open` outcome is resolved from the sign of the realized return.
    pub async fn close_position(
        &self,
        symbol: &str,
        exit: &MarketSnapshot,
        outcome: PositionStatus,
    ) -> Option<TradeRecord> {
        let symbol = normalize_symbol(symbol);
        let exit = exit.clone().sanitized();
        let now = self.clock.now();

        let mut book = self.book.lock().await;
        let Some(mut position) = book.positions.remove(&symbol) else {
            warn!("Close requested for {} but no position is open", symbol);
            return None;
        };

        let exit_price = if exit.price > 0.0 {
            exit.price
        } else if outcome == PositionStatus::Win {
            position.target_price
        } else {
            position.stop_price
        };
        let return_pct = position.return_at(exit_price);
        position.status = match outcome {
            PositionStatus::Open if return_pct > 0.0 => PositionStatus::Win,
            PositionStatus::Open => PositionStatus::Loss,
            status => status,
        };
        let hold_hours = ((now - position.entry_time).num_seconds() as f64 / 3600.0).max(0.0);

        let attribution = self.classifier.classify(
            &position,
            &ExitContext {
                return_pct,
                hold_hours,
                exit_volatility: exit.volatility_hourly,
                exit_atr_pct: exit.atr_pct,
            },
        );
        info!(
            "Closed {} {:?} return {:.4} after {:.1}h: {}",
            symbol,
            position.status,
            return_pct,
            hold_hours,
            attribution.failure_type.as_str()
        );

        let record = TradeRecord {
            position,
            exit_price,
            exit_time: now,
            exit_volatility: exit.volatility_hourly,
            exit_atr_pct: exit.atr_pct,
            return_pct,
            hold_hours,
            failure_type: attribution.failure_type,
            attribution_reasons: attribution.reasons,
        };

        book.closed_since_learn += 1;
        self.persist_book(&mut book).await;

        let mut history = self.history.write().await;
        history.push(record.clone());
        if !book.degraded {
            if let Err(e) = self.store.save_trade_history(&history).await {
                degrade(&mut book, e);
            }
        }

        telemetry::record_closed_trade(record.failure_type.as_str());
        telemetry::record_open_positions(book.positions.len());
        Some(record)
    }

    /// Run the learner now and publish its result
    pub async fn learn_now(&self) -> Result<LearningReport, LearnError> {
        let _publishing = self.publish_lock.lock().await;
        let current = self.params.snapshot();
        let records = self.history.read().await.attributable_window(self.config.learner.window);

        let outcome = match self.learner.learn(&records, &current, self.clock.now()) {
            Ok(outcome) => outcome,
            Err(e) => {
                telemetry::record_learner_run("failed");
                return Err(e);
            }
        };

        let (label, report) = match outcome {
            LearnOutcome::Skipped { samples, .. } => (
                "skipped",
                LearningReport {
                    outcome: "skipped".to_string(),
                    samples,
                    parameter_version: current.version,
                    changes: Vec::new(),
                },
            ),
            LearnOutcome::Unchanged { samples, .. } => (
                "unchanged",
                LearningReport {
                    outcome: "unchanged".to_string(),
                    samples,
                    parameter_version: current.version,
                    changes: Vec::new(),
                },
            ),
            LearnOutcome::Updated { params, changes, samples, .. } => {
                let staged = *params;
                let version = staged.version;
                if !self.params.publish_if_current(&current, staged.clone()) {
                    telemetry::record_learner_run("failed");
                    return Err(LearnError::Superseded);
                }
                telemetry::record_parameter_version(version);
                self.persist_parameters(&staged).await;
                (
                    "updated",
                    LearningReport {
                        outcome: "updated".to_string(),
                        samples,
                        parameter_version: version,
                        changes,
                    },
                )
            }
        };

        self.book.lock().await.closed_since_learn = 0;
        telemetry::record_learner_run(label);
        Ok(report)
    }

    /// Publish research defaults with an audit snapshot. Returns the new version.
    pub async fn reset_parameters(&self) -> u64 {
        let _publishing = self.publish_lock.lock().await;
        let mut params = (*self.params.snapshot()).clone();
        params.reset_to_defaults(self.clock.now());
        let version = params.version;
        self.params.publish(params.clone());
        telemetry::record_parameter_version(version);
        self.persist_parameters(&params).await;
        info!("Parameters reset to defaults (v{})", version);
        version
    }

    async fn persist_parameters(&self, params: &ParameterSet) {
        if let Err(e) = self.store.save_parameters(params).await {
            warn!("Failed to persist parameters v{}, keeping them in memory: {}", params.version, e);
            telemetry::record_persistence_failure();
        }
    }

    /// Whole-document writes of positions and the risk ledger
    async fn persist_book(&self, book: &mut Book) {
        if book.degraded {
            debug!("Persistence degraded, skipping writes until next cycle");
            return;
        }
        if let Err(e) = self.store.save_positions(&book.positions).await {
            degrade(book, e);
            return;
        }
        if let Err(e) = self.store.save_risk_ledger(book.budget.ledger()).await {
            degrade(book, e);
        }
    }
}

fn degrade(book: &mut Book, error: StoreError) {
    warn!("Persistence failed, continuing in memory until next cycle: {}", error);
    telemetry::record_persistence_failure();
    book.degraded = true;
}

fn load_or_fresh<T: Default>(loaded: Result<Option<T>, StoreError>, what: &str) -> T {
    match loaded {
        Ok(Some(doc)) => doc,
        Ok(None) => T::default(),
        Err(e) => {
            warn!("Unreadable {} document, starting fresh: {}", what, e);
            T::default()
        }
    }
}

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

fn sanitize_candidate(candidate: Candidate) -> Candidate {
    Candidate {
        symbol: normalize_symbol(&candidate.symbol),
        asset_class: candidate.asset_class,
        signals: candidate.signals.sanitized(),
        snapshot: candidate.snapshot.sanitized(),
        win_estimate: candidate.win_estimate,
    }
}

/// Target or stop hit at a price
fn exit_status(position: &Position, price: f64) -> Option<PositionStatus> {
    if price <= 0.0 {
        return None;
    }
    match position.direction {
        Direction::Long if price >= position.target_price => Some(PositionStatus::Win),
        Direction::Long if price <= position.stop_price => Some(PositionStatus::Loss),
        Direction::Short if price <= position.target_price => Some(PositionStatus::Win),
        Direction::Short if price >= position.stop_price => Some(PositionStatus::Loss),
        _ => None,
    }
}
