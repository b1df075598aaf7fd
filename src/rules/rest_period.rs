use super::{util, Rule, RuleContext};
use crate::conflict::{ConflictCandidate, ConflictType};
use crate::error::EvaluationError;
use crate::model::Shift;
use chrono::Duration;

/// Repos insuffisant entre la fin d'un shift et le début du suivant.
///
/// Un écart négatif relève du double booking : les deux règles s'excluent.
#[derive(Debug, Default, Clone, Copy)]
pub struct RestPeriod;

impl Rule for RestPeriod {
    fn kind(&self) -> ConflictType {
        ConflictType::RestPeriodViolation
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<ConflictCandidate>, EvaluationError> {
        let shifts = util::active_shifts(ctx.shifts, self.kind())?;
        let min_rest = Duration::hours(i64::from(ctx.options.min_rest_hours));
        let mut out = Vec::new();

        for (employee, list) in util::by_employee(&shifts) {
            // shift qui se termine le plus tard parmi ceux déjà vus
            let mut latest: Option<&Shift> = None;
            for shift in list {
                if let Some(prev) = latest {
                    let gap = shift.start() - prev.end();
                    if gap >= Duration::zero() && gap < min_rest {
                        let pair = [prev, shift];
                        out.push(ConflictCandidate::new(
                            self.kind(),
                            Some(employee.clone()),
                            util::common_bureau(&pair),
                            shift.date,
                            &pair,
                            format!(
                                "Less than {} hours rest between consecutive shifts ({})",
                                ctx.options.min_rest_hours,
                                util::format_duration(gap)
                            ),
                        ));
                    }
                }
                latest = match latest {
                    Some(prev) if prev.end() >= shift.end() => Some(prev),
                    _ => Some(shift),
                };
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::{ctx_for, shift_on, Fixture};

    #[test]
    fn eight_hours_overnight_gap() {
        let fx = Fixture::new();
        let e2 = fx.employee("e2");
        let shifts = vec![
            shift_on("a", &e2, "rome", 2, (15, 0), (23, 0)),
            shift_on("b", &e2, "rome", 3, (7, 0), (15, 0)),
        ];
        let got = RestPeriod.evaluate(&ctx_for(&fx, &shifts)).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].date, shifts[1].date);
        assert!(got[0].description.contains("(8h)"));
    }

    #[test]
    fn overlap_is_not_a_rest_violation() {
        let fx = Fixture::new();
        let e2 = fx.employee("e2");
        let shifts = vec![
            shift_on("a", &e2, "rome", 2, (8, 0), (16, 0)),
            shift_on("b", &e2, "rome", 2, (15, 0), (20, 0)),
        ];
        assert!(RestPeriod.evaluate(&ctx_for(&fx, &shifts)).unwrap().is_empty());
    }

    #[test]
    fn exactly_eleven_hours_is_fine() {
        let fx = Fixture::new();
        let e2 = fx.employee("e2");
        let shifts = vec![
            shift_on("a", &e2, "rome", 2, (12, 0), (20, 0)),
            shift_on("b", &e2, "rome", 3, (7, 0), (15, 0)),
        ];
        assert!(RestPeriod.evaluate(&ctx_for(&fx, &shifts)).unwrap().is_empty());
    }

    #[test]
    fn gap_measured_from_longest_running_shift() {
        let fx = Fixture::new();
        let e2 = fx.employee("e2");
        let shifts = vec![
            shift_on("long", &e2, "rome", 2, (8, 0), (22, 0)),
            shift_on("short", &e2, "rome", 2, (9, 0), (10, 0)),
            shift_on("next", &e2, "rome", 3, (6, 0), (12, 0)),
        ];
        let got = RestPeriod.evaluate(&ctx_for(&fx, &shifts)).unwrap();
        assert_eq!(got.len(), 1);
        let ids: Vec<&str> = got[0].shift_ids.iter().map(|s| s.as_str()).collect();
        assert_eq!(ids, vec!["long", "next"]);
    }
}
