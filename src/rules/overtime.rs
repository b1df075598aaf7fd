use super::{util, Rule, RuleContext};
use crate::conflict::{ConflictCandidate, ConflictType, Severity};
use crate::error::EvaluationError;
use crate::model::Shift;
use chrono::{Duration, NaiveTime};

/// Heures planifiées sur une semaine ISO proches du plafond de l'employé.
///
/// `low` à partir de `overtime_ratio` du plafond, `medium` une fois le plafond atteint.
/// Un plafond à 0 désactive la règle pour l'employé.
#[derive(Debug, Default, Clone, Copy)]
pub struct OvertimeWarning;

impl Rule for OvertimeWarning {
    fn kind(&self) -> ConflictType {
        ConflictType::OvertimeWarning
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<ConflictCandidate>, EvaluationError> {
        let shifts = util::active_shifts(ctx.shifts, self.kind())?;
        let weeks = ctx.scope.iso_weeks();
        let mut out = Vec::new();

        for (employee, list) in util::by_employee(&shifts) {
            let record = ctx.employees.get(employee).ok_or_else(|| {
                EvaluationError::new(self.kind(), format!("unknown employee {employee}"))
            })?;
            if record.weekly_hour_cap == 0 {
                continue;
            }
            let cap_minutes = i64::from(record.weekly_hour_cap) * 60;
            // seuil arrondi à la minute
            let threshold = (ctx.options.overtime_ratio * cap_minutes as f64).round() as i64;

            for &monday in &weeks {
                let week_start = monday.and_time(NaiveTime::MIN);
                let week_end = week_start + Duration::days(7);

                let mut minutes = 0i64;
                let mut contributing: Vec<&Shift> = Vec::new();
                for &shift in &list {
                    let start = shift.start().max(week_start);
                    let end = shift.end().min(week_end);
                    if start < end {
                        minutes += (end - start).num_minutes();
                        contributing.push(shift);
                    }
                }

                if minutes < threshold {
                    continue;
                }
                let (severity, verb) = if minutes >= cap_minutes {
                    (Severity::Medium, "exceeds")
                } else {
                    (Severity::Low, "approaching")
                };
                let description = format!(
                    "Employee {verb} maximum weekly hours ({}/{})",
                    util::format_hours(minutes),
                    record.weekly_hour_cap
                );
                out.push(
                    ConflictCandidate::new(
                        self.kind(),
                        Some(employee.clone()),
                        util::common_bureau(&contributing),
                        monday,
                        &contributing,
                        description,
                    )
                    .with_severity(severity),
                );
            }
        }

        Ok(out)
    }
}
