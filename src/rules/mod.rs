//! Évaluateurs de règles : fonctions pures, sans état, un par type de conflit.

mod coverage;
mod cross_bureau;
mod double_booking;
mod overtime;
mod rest_period;
mod types;
mod util;

pub use coverage::{SkillGap, Understaffed};
pub use cross_bureau::CrossBureau;
pub use double_booking::DoubleBooking;
pub use overtime::OvertimeWarning;
pub use rest_period::RestPeriod;
pub use types::{week_start, EvaluationScope, RuleContext, RuleOptions};

use crate::conflict::{ConflictCandidate, ConflictType};
use crate::error::EvaluationError;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Un évaluateur ne lit ni n'écrit jamais l'état des conflits.
///
/// Mêmes shifts en entrée, mêmes candidats en sortie : la déduplication par identité en dépend.
pub trait Rule: Send + Sync {
    fn kind(&self) -> ConflictType;
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<ConflictCandidate>, EvaluationError>;
}

/// Résultat d'un passage de toutes les règles.
#[derive(Debug, Clone, Default)]
pub struct EvaluationBatch {
    pub candidates: Vec<ConflictCandidate>,
    /// Types évalués avec succès ; seuls leurs conflits existants peuvent être auto-résolus.
    pub evaluated: BTreeSet<ConflictType>,
    pub failures: Vec<EvaluationError>,
}

pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.kind()))
            .finish()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleSet {
    /// Les six règles, dans l'ordre de priorité (double booking avant repos).
    pub fn standard() -> Self {
        Self {
            rules: vec![
                Box::new(DoubleBooking),
                Box::new(RestPeriod),
                Box::new(SkillGap),
                Box::new(Understaffed),
                Box::new(OvertimeWarning),
                Box::new(CrossBureau),
            ],
        }
    }

    pub fn with_rules(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    /// Exécute chaque règle ; l'échec de l'une n'empêche pas les autres.
    ///
    /// Les candidats hors portée sont écartés, les noms d'employés renseignés,
    /// et la sortie est triée pour rester déterministe.
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> EvaluationBatch {
        let mut batch = EvaluationBatch::default();

        for rule in &self.rules {
            let kind = rule.kind();
            match rule.evaluate(ctx) {
                Ok(candidates) => {
                    let before = candidates.len();
                    batch.candidates.extend(candidates.into_iter().filter(|c| {
                        ctx.scope
                            .covers(c.kind, c.employee_id.as_ref(), c.bureau_id.as_ref(), c.date)
                    }));
                    debug!(rule = %kind, produced = before, "rule evaluated");
                    batch.evaluated.insert(kind);
                }
                Err(err) => {
                    warn!(rule = %kind, error = %err, "rule failed, candidates dropped for this cycle");
                    batch.failures.push(err);
                }
            }
        }

        for candidate in &mut batch.candidates {
            if candidate.employee_name.is_none() {
                candidate.employee_name = candidate
                    .employee_id
                    .as_ref()
                    .and_then(|id| ctx.employees.get(id))
                    .map(|e| e.full_name.clone());
            }
        }
        batch
            .candidates
            .sort_by(|a, b| (a.kind, a.date, a.shift_ids.as_slice()).cmp(&(b.kind, b.date, b.shift_ids.as_slice())));
        batch
    }
}
