use crate::conflict::ConflictType;
use crate::error::EvaluationError;
use crate::model::{BureauId, EmployeeId, Shift, ShiftId};
use chrono::{Duration, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};

pub(super) fn overlaps(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Shifts actifs, validés, triés par (début, fin, id).
pub(super) fn active_shifts(
    shifts: &[Shift],
    kind: ConflictType,
) -> Result<Vec<&Shift>, EvaluationError> {
    let mut out = Vec::with_capacity(shifts.len());
    for shift in shifts.iter().filter(|s| s.is_active()) {
        shift
            .check_time_range()
            .map_err(|reason| EvaluationError::new(kind, reason))?;
        out.push(shift);
    }
    out.sort_by(|a, b| (a.start(), a.end(), &a.id).cmp(&(b.start(), b.end(), &b.id)));
    Ok(out)
}

/// Regroupe par employé assigné, en conservant l'ordre chronologique.
pub(super) fn by_employee<'a>(shifts: &[&'a Shift]) -> BTreeMap<&'a EmployeeId, Vec<&'a Shift>> {
    let mut out: BTreeMap<&EmployeeId, Vec<&Shift>> = BTreeMap::new();
    for shift in shifts {
        if let Some(employee) = shift.employee_id.as_ref() {
            out.entry(employee).or_default().push(shift);
        }
    }
    out
}

pub(super) fn by_bureau<'a>(shifts: &[&'a Shift]) -> BTreeMap<&'a BureauId, Vec<&'a Shift>> {
    let mut out: BTreeMap<&BureauId, Vec<&Shift>> = BTreeMap::new();
    for shift in shifts {
        out.entry(&shift.bureau_id).or_default().push(shift);
    }
    out
}

/// Bureau commun à tous les shifts, s'il existe.
pub(super) fn common_bureau(shifts: &[&Shift]) -> Option<BureauId> {
    let first = shifts.first()?;
    shifts
        .iter()
        .all(|s| s.bureau_id == first.bureau_id)
        .then(|| first.bureau_id.clone())
}

/// Fenêtre de couverture : l'intervalle d'un shift et tous les shifts du bureau qui le chevauchent.
#[derive(Debug, Clone)]
pub(super) struct Window<'a> {
    pub(super) bureau: &'a BureauId,
    pub(super) anchor: &'a Shift,
    pub(super) shifts: Vec<&'a Shift>,
}

impl<'a> Window<'a> {
    pub(super) fn employees(&self) -> Vec<&'a EmployeeId> {
        let mut out: Vec<&EmployeeId> = self
            .shifts
            .iter()
            .filter_map(|s| s.employee_id.as_ref())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub(super) fn date(&self) -> chrono::NaiveDate {
        self.anchor.date
    }

    pub(super) fn label(&self) -> String {
        self.anchor.time_label()
    }
}

/// Une fenêtre par shift ; deux fenêtres au même ensemble de shifts n'en font qu'une
/// (la première dans l'ordre de `shifts`, qui doit être trié par début).
///
/// Une fenêtre ne dépend que des shifts voisins de son ancre : le résultat est le même
/// pour une portée réduite et pour un balayage complet.
pub(super) fn coverage_windows<'a>(shifts: &[&'a Shift]) -> Vec<Window<'a>> {
    let mut out = Vec::new();
    for (bureau, list) in by_bureau(shifts) {
        let mut seen: BTreeSet<Vec<&ShiftId>> = BTreeSet::new();
        for &anchor in &list {
            let members: Vec<&Shift> = list
                .iter()
                .copied()
                .filter(|s| overlaps(anchor.start(), anchor.end(), s.start(), s.end()))
                .collect();
            let mut key: Vec<&ShiftId> = members.iter().map(|s| &s.id).collect();
            key.sort();
            if !seen.insert(key) {
                continue;
            }
            out.push(Window {
                bureau,
                anchor,
                shifts: members,
            });
        }
    }
    out
}

/// `8h`, `7h30`
pub(super) fn format_duration(d: Duration) -> String {
    let minutes = d.num_minutes();
    let (h, m) = (minutes / 60, minutes % 60);
    if m == 0 {
        format!("{h}h")
    } else {
        format!("{h}h{m:02}")
    }
}

/// `45`, `45.5`
pub(super) fn format_hours(minutes: i64) -> String {
    if minutes % 60 == 0 {
        (minutes / 60).to_string()
    } else {
        format!("{:.1}", minutes as f64 / 60.0)
    }
}
