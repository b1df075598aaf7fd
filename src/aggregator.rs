//! Agrégateur : fusionne les candidats frais avec les conflits connus.

use crate::conflict::{Conflict, ConflictCandidate, ConflictId, ConflictStatus, Situation};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Bilan d'un cycle de réconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Tous les conflits du périmètre après le cycle, triés par id.
    pub conflicts: Vec<Conflict>,
    pub created: Vec<ConflictId>,
    pub auto_resolved: Vec<ConflictId>,
    pub superseded: Vec<ConflictId>,
    pub refreshed: Vec<ConflictId>,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.auto_resolved.is_empty()
            && self.superseded.is_empty()
            && self.refreshed.is_empty()
    }
}

/// `reconcile(candidates, existing) -> conflicts` ; voir [`reconcile_detailed`].
pub fn reconcile(
    candidates: &[ConflictCandidate],
    existing: &[Conflict],
    now: DateTime<Utc>,
) -> Vec<Conflict> {
    reconcile_detailed(candidates, existing, now).conflicts
}

/// Règles appliquées, par identité :
/// - candidat connu : le statut est conservé (seul un `unresolved` voit son texte rafraîchi) ;
/// - candidat inconnu : nouveau conflit `unresolved`, `detected_at = now` ;
/// - conflit connu sans candidat : auto-résolu sauf s'il est déjà `resolved` ou `dismissed` ;
///   s'il existe un nouveau conflit pour la même situation, il est marqué remplacé.
pub fn reconcile_detailed(
    candidates: &[ConflictCandidate],
    existing: &[Conflict],
    now: DateTime<Utc>,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    let mut by_id: BTreeMap<ConflictId, Conflict> =
        existing.iter().map(|c| (c.id.clone(), c.clone())).collect();
    let mut matched: BTreeSet<ConflictId> = BTreeSet::new();
    let mut fresh: BTreeMap<ConflictId, Conflict> = BTreeMap::new();

    for candidate in candidates {
        let id = candidate.conflict_id();
        if let Some(known) = by_id.get_mut(&id) {
            matched.insert(id.clone());
            if known.status == ConflictStatus::Unresolved && refresh(known, candidate) {
                outcome.refreshed.push(id);
            }
            continue;
        }
        if fresh.contains_key(&id) {
            continue;
        }
        fresh.insert(id.clone(), Conflict::from_candidate(candidate.clone(), now));
        outcome.created.push(id);
    }

    let mut replacements: BTreeMap<Situation, ConflictId> = BTreeMap::new();
    for conflict in fresh.values() {
        replacements
            .entry(conflict.situation())
            .or_insert_with(|| conflict.id.clone());
    }

    for (id, conflict) in by_id.iter_mut() {
        if matched.contains(id) {
            continue;
        }
        if conflict.status.is_open() {
            conflict.status = ConflictStatus::Resolved;
            conflict.resolved_at = Some(now);
            outcome.auto_resolved.push(id.clone());
        }
        if conflict.superseded_by.is_none() {
            if let Some(replacement) = replacements.get(&conflict.situation()) {
                conflict.superseded_by = Some(replacement.clone());
                outcome.superseded.push(id.clone());
            }
        }
    }

    by_id.extend(fresh);
    outcome.conflicts = by_id.into_values().collect();
    outcome
}

fn refresh(known: &mut Conflict, candidate: &ConflictCandidate) -> bool {
    let changed = known.severity != candidate.severity
        || known.description != candidate.description
        || known.shifts != candidate.shifts
        || known.employee_name != candidate.employee_name
        || known.bureau_id != candidate.bureau_id;
    if changed {
        known.severity = candidate.severity;
        known.description = candidate.description.clone();
        known.shifts = candidate.shifts.clone();
        known.employee_name = candidate.employee_name.clone();
        known.bureau_id = candidate.bureau_id.clone();
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{ConflictType, Severity};
    use crate::model::{BureauId, EmployeeId, Shift, ShiftId};
    use chrono::{Duration, NaiveDate, NaiveTime, TimeZone};

    fn shift(id: &str) -> Shift {
        Shift::new(
            BureauId::new("milan"),
            NaiveDate::from_ymd_opt(2025, 11, 2).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        )
        .unwrap()
        .with_id(ShiftId::new(id))
    }

    fn candidate(ids: &[&str]) -> ConflictCandidate {
        let shifts: Vec<Shift> = ids.iter().map(|i| shift(i)).collect();
        let refs: Vec<&Shift> = shifts.iter().collect();
        ConflictCandidate::new(
            ConflictType::DoubleBooking,
            Some(EmployeeId::new("e1")),
            Some(BureauId::new("milan")),
            shifts[0].date,
            &refs,
            "overlap".into(),
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn running_twice_is_idempotent() {
        let cands = vec![candidate(&["a", "b"])];
        let first = reconcile(&cands, &[], t0());
        let second = reconcile(&cands, &first, t0() + Duration::hours(1));
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, ConflictStatus::Unresolved);
        assert_eq!(first[0].detected_at, t0());
    }

    #[test]
    fn duplicate_candidates_collapse() {
        let cands = vec![candidate(&["a", "b"]), candidate(&["b", "a"])];
        assert_eq!(reconcile(&cands, &[], t0()).len(), 1);
    }

    #[test]
    fn acknowledged_stays_acknowledged() {
        let cands = vec![candidate(&["a", "b"])];
        let mut known = reconcile(&cands, &[], t0());
        known[0].status = ConflictStatus::Acknowledged;
        let again = reconcile(&cands, &known, t0());
        assert_eq!(again[0].status, ConflictStatus::Acknowledged);
    }

    #[test]
    fn vanished_condition_auto_resolves() {
        let known = reconcile(&[candidate(&["a", "b"])], &[], t0());
        let later = t0() + Duration::minutes(5);
        let outcome = reconcile_detailed(&[], &known, later);
        assert_eq!(outcome.conflicts[0].status, ConflictStatus::Resolved);
        assert_eq!(outcome.conflicts[0].resolved_at, Some(later));
        assert_eq!(outcome.auto_resolved.len(), 1);
    }

    #[test]
    fn dismissed_is_neither_resolved_nor_reopened() {
        let cands = vec![candidate(&["a", "b"])];
        let mut known = reconcile(&cands, &[], t0());
        known[0].status = ConflictStatus::Dismissed;
        assert_eq!(reconcile(&cands, &known, t0())[0].status, ConflictStatus::Dismissed);
        let gone = reconcile(&[], &known, t0());
        assert_eq!(gone[0].status, ConflictStatus::Dismissed);
        assert!(gone[0].resolved_at.is_none());
    }

    #[test]
    fn changed_shift_set_supersedes() {
        let mut known = reconcile(&[candidate(&["a", "b"])], &[], t0());
        known[0].status = ConflictStatus::Acknowledged;
        let outcome = reconcile_detailed(&[candidate(&["a", "b", "c"])], &known, t0());
        assert_eq!(outcome.conflicts.len(), 2);
        assert_eq!(outcome.created.len(), 1);
        let old = outcome.conflicts.iter().find(|c| c.id == known[0].id).unwrap();
        assert_eq!(old.superseded_by.as_ref(), Some(&outcome.created[0]));
        assert_eq!(old.status, ConflictStatus::Resolved);
        let new = outcome.conflicts.iter().find(|c| c.id == outcome.created[0]).unwrap();
        assert_eq!(new.status, ConflictStatus::Unresolved);
    }

    #[test]
    fn unresolved_picks_up_new_severity() {
        let known = reconcile(&[candidate(&["a", "b"])], &[], t0());
        let escalated = candidate(&["a", "b"]).with_severity(Severity::Medium);
        let outcome = reconcile_detailed(&[escalated], &known, t0());
        assert_eq!(outcome.refreshed.len(), 1);
        assert_eq!(outcome.conflicts[0].severity, Severity::Medium);
    }
}
