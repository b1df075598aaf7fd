use super::{util, Rule, RuleContext};
use crate::conflict::{ConflictCandidate, ConflictType};
use crate::error::EvaluationError;
use crate::model::{Shift, ShiftId};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};

/// Chevauchements pour un même employé, un candidat par grappe et par jour.
#[derive(Debug, Default, Clone, Copy)]
pub struct DoubleBooking;

impl Rule for DoubleBooking {
    fn kind(&self) -> ConflictType {
        ConflictType::DoubleBooking
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<ConflictCandidate>, EvaluationError> {
        let shifts = util::active_shifts(ctx.shifts, self.kind())?;
        let mut out = Vec::new();

        for (employee, list) in util::by_employee(&shifts) {
            // segments bornés à la journée : un shift de nuit compte sur ses deux jours
            let mut days: BTreeMap<NaiveDate, Vec<(NaiveDateTime, NaiveDateTime, &Shift)>> =
                BTreeMap::new();
            for &shift in &list {
                for (day, start, end) in shift.day_segments() {
                    days.entry(day).or_default().push((start, end, shift));
                }
            }

            let mut seen: BTreeSet<Vec<ShiftId>> = BTreeSet::new();
            for (day, mut segments) in days {
                segments.sort_by(|a, b| (a.0, a.1, &a.2.id).cmp(&(b.0, b.1, &b.2.id)));
                for cluster in clusters(&segments) {
                    let mut ids: Vec<ShiftId> = cluster.iter().map(|s| s.id.clone()).collect();
                    ids.sort();
                    // même grappe de part et d'autre de minuit : signalée une seule fois
                    if !seen.insert(ids) {
                        continue;
                    }
                    let description = format!(
                        "Employee is scheduled for {} overlapping shifts on the same day",
                        cluster.len()
                    );
                    out.push(ConflictCandidate::new(
                        self.kind(),
                        Some(employee.clone()),
                        util::common_bureau(&cluster),
                        day,
                        &cluster,
                        description,
                    ));
                }
            }
        }

        Ok(out)
    }
}

/// Grappes contiguës de segments qui se chevauchent (au moins deux shifts distincts).
fn clusters<'a>(segments: &[(NaiveDateTime, NaiveDateTime, &'a Shift)]) -> Vec<Vec<&'a Shift>> {
    let mut out = Vec::new();
    let mut current: Vec<&Shift> = Vec::new();
    let mut current_end: Option<NaiveDateTime> = None;

    for &(start, end, shift) in segments {
        match current_end {
            Some(cur_end) if start < cur_end => {
                current.push(shift);
                current_end = Some(cur_end.max(end));
            }
            _ => {
                if current.len() >= 2 {
                    out.push(std::mem::take(&mut current));
                }
                current.clear();
                current.push(shift);
                current_end = Some(end);
            }
        }
    }
    if current.len() >= 2 {
        out.push(current);
    }
    out
}
