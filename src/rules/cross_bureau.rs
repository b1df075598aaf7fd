use super::{util, Rule, RuleContext};
use crate::conflict::{ConflictCandidate, ConflictType};
use crate::error::EvaluationError;
use crate::model::{BureauId, Shift};
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};

/// Même employé dans deux bureaux différents sur deux jours calendaires consécutifs.
///
/// Les shifts d'un même jour relèvent du double booking, pas de cette règle.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossBureau;

impl Rule for CrossBureau {
    fn kind(&self) -> ConflictType {
        ConflictType::CrossBureau
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<ConflictCandidate>, EvaluationError> {
        let shifts = util::active_shifts(ctx.shifts, self.kind())?;
        let mut out = Vec::new();

        for (employee, list) in util::by_employee(&shifts) {
            let mut days: BTreeMap<NaiveDate, Vec<&Shift>> = BTreeMap::new();
            for &shift in &list {
                days.entry(shift.date).or_default().push(shift);
            }

            for (day, today) in &days {
                let next_day = *day + Duration::days(1);
                let Some(tomorrow) = days.get(&next_day) else {
                    continue;
                };

                let mut involved: Vec<&Shift> = Vec::new();
                let mut from_bureaus: BTreeSet<&BureauId> = BTreeSet::new();
                let mut to_bureaus: BTreeSet<&BureauId> = BTreeSet::new();
                for &a in today {
                    for &b in tomorrow {
                        if a.bureau_id != b.bureau_id {
                            involved.push(a);
                            involved.push(b);
                            from_bureaus.insert(&a.bureau_id);
                            to_bureaus.insert(&b.bureau_id);
                        }
                    }
                }
                if involved.is_empty() {
                    continue;
                }

                let description = format!(
                    "Employee scheduled in different bureaus on consecutive days ({} → {})",
                    join(&from_bureaus),
                    join(&to_bureaus)
                );
                out.push(ConflictCandidate::new(
                    self.kind(),
                    Some(employee.clone()),
                    None,
                    next_day,
                    &involved,
                    description,
                ));
            }
        }

        Ok(out)
    }
}

fn join(bureaus: &BTreeSet<&BureauId>) -> String {
    bureaus
        .iter()
        .map(|b| b.as_str())
        .collect::<Vec<_>>()
        .join("/")
}
