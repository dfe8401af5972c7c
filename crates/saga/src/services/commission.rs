//! Commission rule and line persistence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CommissionLineId, CommissionRuleId, OrderId};
use domain::{
    CommissionError, CommissionLine, CommissionRule, DomainError, LineContext, RuleReference,
    ensure_no_active_duplicate,
};
use parking_lot::RwLock;

use crate::error::SagaError;

/// Storage for commission rules and the lines computed from them.
#[async_trait]
pub trait CommissionStore: Send + Sync {
    /// Inserts a rule, failing with a conflict if an active rule already
    /// targets the same (reference, reference_id). Check and insert are atomic.
    async fn insert_rule(&self, rule: CommissionRule) -> Result<CommissionRule, SagaError>;

    /// Activates or deactivates a rule; activation applies the duplicate guard.
    async fn set_rule_active(
        &self,
        id: CommissionRuleId,
        active: bool,
    ) -> Result<CommissionRule, SagaError>;

    async fn get_rule(&self, id: CommissionRuleId) -> Result<Option<CommissionRule>, SagaError>;

    async fn list_rules(&self) -> Result<Vec<CommissionRule>, SagaError>;

    /// Active rules that could apply to the line at any level.
    async fn rules_for_line(&self, line: &LineContext) -> Result<Vec<CommissionRule>, SagaError>;

    /// Inserts lines atomically. Fails if any item already has a line.
    async fn insert_lines(&self, lines: Vec<CommissionLine>) -> Result<(), SagaError>;

    async fn delete_lines(&self, ids: &[CommissionLineId]) -> Result<(), SagaError>;

    async fn lines_for_order(&self, order_id: OrderId) -> Result<Vec<CommissionLine>, SagaError>;
}

const LEVELS: [RuleReference; 5] = [
    RuleReference::Product,
    RuleReference::ProductType,
    RuleReference::ProductCollection,
    RuleReference::Seller,
    RuleReference::Site,
];

#[derive(Debug, Default)]
struct InMemoryCommissionState {
    rules: Vec<CommissionRule>,
    lines: HashMap<CommissionLineId, CommissionLine>,
    unavailable: bool,
}

/// In-memory commission store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommissionStore {
    state: Arc<RwLock<InMemoryCommissionState>>,
}

impl InMemoryCommissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes rule lookups fail with a transient error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }

    pub fn line_count(&self) -> usize {
        self.state.read().lines.len()
    }
}

fn commission_error(error: CommissionError) -> SagaError {
    SagaError::Domain(DomainError::Commission(error))
}

#[async_trait]
impl CommissionStore for InMemoryCommissionStore {
    async fn insert_rule(&self, rule: CommissionRule) -> Result<CommissionRule, SagaError> {
        let mut state = self.state.write();
        ensure_no_active_duplicate(&state.rules, &rule).map_err(commission_error)?;
        state.rules.push(rule.clone());
        Ok(rule)
    }

    async fn set_rule_active(
        &self,
        id: CommissionRuleId,
        active: bool,
    ) -> Result<CommissionRule, SagaError> {
        let mut state = self.state.write();
        let index = state
            .rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| commission_error(CommissionError::RuleNotFound(id)))?;

        let mut candidate = state.rules[index].clone();
        candidate.is_active = active;
        ensure_no_active_duplicate(&state.rules, &candidate).map_err(commission_error)?;
        state.rules[index] = candidate.clone();
        Ok(candidate)
    }

    async fn get_rule(&self, id: CommissionRuleId) -> Result<Option<CommissionRule>, SagaError> {
        Ok(self.state.read().rules.iter().find(|r| r.id == id).cloned())
    }

    async fn list_rules(&self) -> Result<Vec<CommissionRule>, SagaError> {
        Ok(self.state.read().rules.clone())
    }

    async fn rules_for_line(&self, line: &LineContext) -> Result<Vec<CommissionRule>, SagaError> {
        let state = self.state.read();
        if state.unavailable {
            return Err(SagaError::transient("commission", "rule store unavailable"));
        }
        Ok(state
            .rules
            .iter()
            .filter(|r| r.is_active)
            .filter(|r| {
                LEVELS.iter().any(|level| {
                    r.same_target(*level, line.reference_id(*level).as_deref())
                })
            })
            .cloned()
            .collect())
    }

    async fn insert_lines(&self, lines: Vec<CommissionLine>) -> Result<(), SagaError> {
        let mut state = self.state.write();
        if let Some(line) = lines.iter().find(|new| {
            state
                .lines
                .values()
                .any(|existing| existing.item_line_id == new.item_line_id)
        }) {
            return Err(commission_error(CommissionError::DuplicateLine {
                item_line_id: line.item_line_id,
            }));
        }
        for line in lines {
            state.lines.insert(line.id, line);
        }
        Ok(())
    }

    async fn delete_lines(&self, ids: &[CommissionLineId]) -> Result<(), SagaError> {
        let mut state = self.state.write();
        for id in ids {
            state.lines.remove(id);
        }
        Ok(())
    }

    async fn lines_for_order(&self, order_id: OrderId) -> Result<Vec<CommissionLine>, SagaError> {
        let mut lines: Vec<CommissionLine> = self
            .state
            .read()
            .lines
            .values()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect();
        lines.sort_by_key(|l| l.created_at);
        Ok(lines)
    }
}
