//! Cycle de vie des conflits : `unresolved → acknowledged → resolved`,
//! `unresolved | acknowledged → dismissed`.
//!
//! `resolved` et `dismissed` sont terminaux. Rejouer une transition déjà
//! atteinte est un succès sans effet, de même que `dismiss` sur un conflit résolu.

use crate::conflict::{Conflict, ConflictId, ConflictStatus, Severity};
use crate::error::EngineError;
use crate::rules::EvaluationScope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Acknowledge,
    Resolve,
    Dismiss,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Acknowledge => "acknowledge",
            Action::Resolve => "resolve",
            Action::Dismiss => "dismiss",
        }
    }
}

/// Filtres de `GET /api/conflicts`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictQuery {
    #[serde(default)]
    pub status: Option<ConflictStatus>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ConflictQuery {
    fn matches(&self, conflict: &Conflict) -> bool {
        let status_ok = match self.status {
            Some(status) => conflict.status == status,
            // les conflits écartés restent en base pour l'audit, hors des vues actives
            None => conflict.status != ConflictStatus::Dismissed,
        };
        status_ok && self.severity.map_or(true, |s| conflict.severity == s)
    }
}

/// Résultat d'une transition ; `changed == false` pour une transition rejouée.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub conflict: Conflict,
    pub changed: bool,
}

/// Registre des conflits (Lifecycle Manager).
#[derive(Debug, Clone, Default)]
pub struct ConflictBook {
    conflicts: BTreeMap<ConflictId, Conflict>,
}

impl ConflictBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_conflicts(conflicts: Vec<Conflict>) -> Self {
        Self {
            conflicts: conflicts.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn get(&self, id: &ConflictId) -> Option<&Conflict> {
        self.conflicts.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.values()
    }

    /// Plus récents d'abord, puis par sévérité.
    pub fn list(&self, query: &ConflictQuery) -> Vec<Conflict> {
        let mut out: Vec<Conflict> = self
            .conflicts
            .values()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.detected_at
                .cmp(&a.detected_at)
                .then(a.severity.cmp(&b.severity))
                .then(a.date.cmp(&b.date))
                .then(a.id.cmp(&b.id))
        });
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        out
    }

    /// Conflits que la réévaluation de `scope` a le droit de modifier.
    pub fn in_scope(
        &self,
        scope: &EvaluationScope,
        evaluated: &BTreeSet<crate::conflict::ConflictType>,
    ) -> Vec<Conflict> {
        self.conflicts
            .values()
            .filter(|c| evaluated.contains(&c.kind))
            .filter(|c| scope.covers(c.kind, c.employee_id.as_ref(), c.bureau_id.as_ref(), c.date))
            .cloned()
            .collect()
    }

    /// Remplace les entrées issues d'un cycle de réconciliation.
    pub fn apply(&mut self, conflicts: Vec<Conflict>) {
        for conflict in conflicts {
            self.conflicts.insert(conflict.id.clone(), conflict);
        }
    }

    pub fn acknowledge(&mut self, id: &ConflictId, now: DateTime<Utc>) -> Result<Transition, EngineError> {
        self.transition(id, Action::Acknowledge, now)
    }

    pub fn resolve(&mut self, id: &ConflictId, now: DateTime<Utc>) -> Result<Transition, EngineError> {
        self.transition(id, Action::Resolve, now)
    }

    pub fn dismiss(&mut self, id: &ConflictId, now: DateTime<Utc>) -> Result<Transition, EngineError> {
        self.transition(id, Action::Dismiss, now)
    }

    /// Vérifie puis applique sous le même emprunt `&mut` : deux transitions concurrentes
    /// sur un même id sont sérialisées par le verrou qui protège le registre.
    pub fn transition(
        &mut self,
        id: &ConflictId,
        action: Action,
        now: DateTime<Utc>,
    ) -> Result<Transition, EngineError> {
        let conflict = self
            .conflicts
            .get_mut(id)
            .ok_or_else(|| EngineError::not_found("conflict", id))?;
        let from = conflict.status;

        let target = match (action, from) {
            (Action::Acknowledge, ConflictStatus::Unresolved) => Some(ConflictStatus::Acknowledged),
            (Action::Acknowledge, ConflictStatus::Acknowledged) => None,
            (Action::Resolve, ConflictStatus::Unresolved | ConflictStatus::Acknowledged) => {
                Some(ConflictStatus::Resolved)
            }
            (Action::Resolve, ConflictStatus::Resolved) => None,
            (Action::Dismiss, ConflictStatus::Unresolved | ConflictStatus::Acknowledged) => {
                Some(ConflictStatus::Dismissed)
            }
            (Action::Dismiss, ConflictStatus::Dismissed | ConflictStatus::Resolved) => None,
            (action, from) => {
                return Err(EngineError::InvalidTransition {
                    action: action.as_str(),
                    from,
                })
            }
        };

        let Some(target) = target else {
            return Ok(Transition {
                conflict: conflict.clone(),
                changed: false,
            });
        };

        conflict.status = target;
        conflict.resolved_at = (target == ConflictStatus::Resolved).then_some(now);
        info!(conflict_id = %id, from = %from, to = %target, "conflict transition");
        Ok(Transition {
            conflict: conflict.clone(),
            changed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{ConflictCandidate, ConflictType};
    use crate::model::{BureauId, Shift};
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    fn book() -> (ConflictBook, ConflictId) {
        let shift = Shift::new(
            BureauId::new("rome"),
            NaiveDate::from_ymd_opt(2025, 11, 6).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        )
        .unwrap();
        let cand = ConflictCandidate::new(
            ConflictType::Understaffed,
            None,
            Some(BureauId::new("rome")),
            shift.date,
            &[&shift],
            "Only one".into(),
        );
        let conflict = Conflict::from_candidate(cand, now());
        let id = conflict.id.clone();
        (ConflictBook::from_conflicts(vec![conflict]), id)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn dismiss_twice_then_resolve_fails() {
        let (mut book, id) = book();
        assert!(book.dismiss(&id, now()).unwrap().changed);
        assert!(!book.dismiss(&id, now()).unwrap().changed);
        let err = book.resolve(&id, now()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition { from: ConflictStatus::Dismissed, .. }
        ));
    }

    #[test]
    fn resolve_sets_timestamp_and_dismiss_is_noop_after() {
        let (mut book, id) = book();
        book.acknowledge(&id, now()).unwrap();
        let resolved = book.resolve(&id, now()).unwrap().conflict;
        assert_eq!(resolved.status, ConflictStatus::Resolved);
        assert_eq!(resolved.resolved_at, Some(now()));

        let after = book.dismiss(&id, now()).unwrap();
        assert!(!after.changed);
        assert_eq!(after.conflict.status, ConflictStatus::Resolved);
        assert!(matches!(
            book.acknowledge(&id, now()),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn unknown_id_is_not_found() {
        let (mut book, _) = book();
        assert!(matches!(
            book.acknowledge(&ConflictId::new("missing"), now()),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn dismissed_hidden_from_default_listing() {
        let (mut book, id) = book();
        book.dismiss(&id, now()).unwrap();
        assert!(book.list(&ConflictQuery::default()).is_empty());
        let audit = ConflictQuery {
            status: Some(ConflictStatus::Dismissed),
            ..Default::default()
        };
        assert_eq!(book.list(&audit).len(), 1);
    }
}
