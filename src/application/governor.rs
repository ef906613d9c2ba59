//! The strategy governor: single writer for the active plan card, dwell and
//! cooldown timers, the partial-rotation rebalance cadence, and the
//! append-only change log. Reads are served from a cloned snapshot so the
//! fast loop and the snapshot writer never contend with a proposal in
//! flight; writes are serialized behind one lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GovernorEnvConfig;
use crate::domain::errors::GovernanceError;
use crate::domain::plan_card::{ChangeLogEntry, Decision, PlanCard, PlanMetrics, PlanStatus};
use crate::domain::rebalancer::{self, RebalanceConstraints};
use crate::domain::regime::Regime;
use crate::domain::repositories::GovernorRepository;
use crate::domain::types::{ActionType, PortfolioState, RebalancingPlan, TradeAction};

/// A proposed-but-not-activated strategy tracked read-only so the governor
/// can report hypothetical performance alongside the active plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowPortfolio {
    pub plan_id: Uuid,
    pub strategy_id: String,
    pub metrics: PlanMetrics,
}

/// The governor's full persisted lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GovernorState {
    pub active_plan: Option<PlanCard>,
    pub last_change_at: Option<DateTime<Utc>>,
    pub cooldown_deadline: Option<DateTime<Utc>>,
    pub rebalance_progress: f64,
    pub change_log: Vec<ChangeLogEntry>,
    pub shadow_portfolios: Vec<ShadowPortfolio>,
    pub plan_metrics: HashMap<Uuid, PlanMetrics>,
}

impl GovernorState {
    /// Discards a plan restored from disk that can no longer be trusted:
    /// anything not left mid-lifecycle, or a dwell deadline that predates
    /// its own creation (a corrupt record).
    fn retire_if_invalid(mut self) -> Self {
        if let Some(plan) = &self.active_plan {
            let corrupt = plan.dwell_deadline < plan.created_at;
            let terminal = matches!(plan.status, PlanStatus::Completed);
            if corrupt || terminal {
                warn!(plan_id = %plan.plan_id, "discarding restored plan that failed startup validation");
                self.active_plan = None;
            }
        }
        self
    }
}

pub struct StrategyGovernor {
    state: Mutex<GovernorState>,
    repo: Arc<dyn GovernorRepository>,
    cfg: GovernorEnvConfig,
}

impl StrategyGovernor {
    /// Builds a governor from whatever the repository has on disk,
    /// retiring anything that fails a basic startup sanity check.
    pub async fn load_or_init(repo: Arc<dyn GovernorRepository>, cfg: GovernorEnvConfig) -> anyhow::Result<Self> {
        let state = repo.load().await?.map(GovernorState::retire_if_invalid).unwrap_or_default();
        Ok(Self { state: Mutex::new(state), repo, cfg })
    }

    async fn persist(&self, state: &GovernorState) {
        if let Err(err) = self.repo.save(state).await {
            warn!(%err, "governor state persist failed, continuing with in-memory state");
        }
    }

    /// A read-only clone for callers that must not hold the write lock
    /// (fast loop, snapshot writer, CLI).
    pub async fn snapshot(&self) -> GovernorState {
        self.state.lock().await.clone()
    }

    pub async fn can_review(&self, now: DateTime<Utc>, event_locked: bool) -> bool {
        let state = self.state.lock().await;
        let Some(plan) = &state.active_plan else { return true };
        let cooldown_passed = state.cooldown_deadline.map(|d| now >= d).unwrap_or(true);
        now >= plan.dwell_deadline && cooldown_passed && state.rebalance_progress >= 1.0 && !event_locked
    }

    /// Renders a decision on a freshly proposed plan card.
    ///
    /// `expected_edge_bps` and `observed_costs_from_current_bps` are supplied
    /// by the caller (the advisor's own edge estimate and the execution
    /// service's running cost tally for the currently active plan,
    /// respectively) since the governor itself tracks neither.
    #[allow(clippy::too_many_arguments)]
    pub async fn evaluate_proposal(
        &self,
        proposed: PlanCard,
        current_regime: Regime,
        signal_confidence: f64,
        expected_edge_bps: f64,
        observed_costs_from_current_bps: f64,
        now: DateTime<Utc>,
        tripwire_override: bool,
        event_locked: bool,
    ) -> Decision {
        let mut state = self.state.lock().await;

        if proposed.avoid_regimes.contains(&current_regime) {
            let reason = GovernanceError::RegimeExcluded { regime: current_regime.to_string() }.to_string();
            return Decision::Rejected { reason };
        }

        if signal_confidence < self.cfg.minimum_confidence_to_approve {
            let reason = GovernanceError::LowConfidence { confidence: signal_confidence }.to_string();
            return Decision::Rejected { reason };
        }

        let net_advantage_bps = expected_edge_bps
            - proposed.expected_switching_cost_bps.to_string().parse::<f64>().unwrap_or(0.0)
            - observed_costs_from_current_bps;
        if net_advantage_bps < self.cfg.minimum_advantage_over_cost_bps {
            let reason = GovernanceError::InsufficientAdvantage {
                net_advantage_bps,
                minimum_bps: self.cfg.minimum_advantage_over_cost_bps,
            }
            .to_string();
            return Decision::Rejected { reason };
        }

        let invalidation_fired = state
            .active_plan
            .as_ref()
            .map(|p| p.status == PlanStatus::Retiring)
            .unwrap_or(false);
        let reviewable = state.active_plan.is_none()
            || (now >= state.active_plan.as_ref().unwrap().dwell_deadline
                && state.cooldown_deadline.map(|d| now >= d).unwrap_or(true)
                && state.rebalance_progress >= 1.0
                && !event_locked)
            || tripwire_override
            || invalidation_fired;
        if !reviewable {
            let reason = GovernanceError::ReviewBlocked { reason: "dwell/cooldown/rebalance in progress".to_string() }.to_string();
            return Decision::Rejected { reason };
        }

        let mut plan = proposed;
        plan.activate(now, self.cfg.cooldown_after_change_minutes);
        let plan_id = plan.plan_id;
        let from_plan_id = state.active_plan.as_ref().map(|p| p.plan_id);

        state.change_log.push(ChangeLogEntry {
            timestamp: now,
            reason: "proposal approved".to_string(),
            from_plan_id,
            to_plan_id: Some(plan_id),
        });
        state.active_plan = Some(plan);
        state.last_change_at = Some(now);
        state.cooldown_deadline = Some(now + chrono::Duration::minutes(self.cfg.cooldown_after_change_minutes));
        state.rebalance_progress = 0.0;
        state.plan_metrics.entry(plan_id).or_default();

        info!(%plan_id, net_advantage_bps, "plan approved");
        self.persist(&state).await;
        Decision::Approved { plan_id }
    }

    /// Computes the full rebalance toward the active plan's target, then
    /// emits only `partial_rotation_pct_per_cycle` of each trade's size this
    /// cycle. `Close` actions are left whole: a partial close has no
    /// well-defined size without the underlying position, so closes settle
    /// in one cycle while buys/sells ladder in over several.
    pub async fn step_rebalance(
        &self,
        current: &PortfolioState,
        prices: &HashMap<String, Decimal>,
        size_decimals: &HashMap<String, u32>,
        slippage_bps: &HashMap<String, Decimal>,
        constraints: &RebalanceConstraints,
        now: DateTime<Utc>,
    ) -> RebalancingPlan {
        let mut state = self.state.lock().await;
        let Some(plan) = state.active_plan.clone() else {
            return RebalancingPlan::empty("no active plan");
        };

        let full = rebalancer::rebalance(current, &plan.target_allocations, prices, size_decimals, slippage_bps, constraints);
        if full.is_empty() {
            state.rebalance_progress = 1.0;
            if let Some(active) = state.active_plan.as_mut() {
                active.rebalance_progress = 1.0;
                active.status = PlanStatus::Active;
            }
            self.persist(&state).await;
            return full;
        }

        let pct = self.cfg.partial_rotation_pct_per_cycle.clamp(0.0, 1.0);
        let pct_decimal = Decimal::from_f64(pct).unwrap_or(Decimal::new(25, 2));
        let scaled_actions: Vec<TradeAction> = full
            .actions
            .iter()
            .cloned()
            .map(|mut action| {
                if action.action_type != ActionType::Close {
                    if let Some(size) = action.size {
                        let decimals = size_decimals.get(&action.coin).copied().unwrap_or(4);
                        let scaled = (size * pct_decimal).round_dp_with_strategy(decimals, rust_decimal::RoundingStrategy::ToZero);
                        action.size = Some(scaled);
                    }
                }
                action
            })
            .filter(|a| a.action_type == ActionType::Close || a.size.map(|s| !s.is_zero()).unwrap_or(false))
            .collect();

        let progress = (state.rebalance_progress + pct).min(1.0);
        state.rebalance_progress = progress;
        if let Some(active) = state.active_plan.as_mut() {
            active.rebalance_progress = progress;
            active.status = if progress >= 1.0 { PlanStatus::Active } else { PlanStatus::Rebalancing };
        }
        self.persist(&state).await;

        if scaled_actions.is_empty() {
            return RebalancingPlan::empty("partial rotation slice rounded to zero this cycle");
        }

        RebalancingPlan {
            actions: scaled_actions,
            estimated_cost_bps: full.estimated_cost_bps * pct_decimal,
            reasoning: format!("partial rotation ({:.0}% this cycle, {:.0}% total): {}", pct * 100.0, progress * 100.0, full.reasoning),
        }
        .tap_logged(now, plan.plan_id)
    }

    /// Marks the active plan retiring: dwell is cleared so the next
    /// proposal cycle may replace it immediately.
    pub async fn invalidate(&self, reason: String, now: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        let Some(plan) = state.active_plan.as_mut() else { return };
        plan.status = PlanStatus::Retiring;
        plan.dwell_deadline = now;
        state.rebalance_progress = 1.0;
        let plan_id = plan.plan_id;
        state.change_log.push(ChangeLogEntry { timestamp: now, reason, from_plan_id: Some(plan_id), to_plan_id: None });
        self.persist(&state).await;
    }

    /// Tracks a proposed-but-unactivated strategy's hypothetical metrics,
    /// evicting the oldest entry once the configured cap is reached.
    pub async fn track_shadow(&self, plan_id: Uuid, strategy_id: String, metrics: PlanMetrics) {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.shadow_portfolios.iter_mut().find(|s| s.plan_id == plan_id) {
            existing.metrics = metrics;
        } else {
            if state.shadow_portfolios.len() >= self.cfg.max_shadow_portfolios {
                state.shadow_portfolios.remove(0);
            }
            state.shadow_portfolios.push(ShadowPortfolio { plan_id, strategy_id, metrics });
        }
        self.persist(&state).await;
    }

    pub fn compatible_regime_set(plan: &PlanCard) -> HashSet<Regime> {
        plan.compatible_regimes.clone()
    }
}

#[async_trait::async_trait]
impl crate::domain::ports::PlanInvalidator for StrategyGovernor {
    async fn invalidate_plan(&self, reason: String, now: DateTime<Utc>) {
        self.invalidate(reason, now).await;
    }
}

trait LogTap {
    fn tap_logged(self, now: DateTime<Utc>, plan_id: Uuid) -> Self;
}

impl LogTap for RebalancingPlan {
    fn tap_logged(self, now: DateTime<Utc>, plan_id: Uuid) -> Self {
        info!(%plan_id, at = %now, trades = self.actions.len(), cost_bps = %self.estimated_cost_bps, "rebalance slice emitted");
        self
    }
}
