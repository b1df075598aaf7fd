use super::{util, Rule, RuleContext};
use crate::conflict::{ConflictCandidate, ConflictType};
use crate::error::EvaluationError;

/// Shift pendant lequel aucun `senior` ni `lead` n'est présent.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkillGap;

impl Rule for SkillGap {
    fn kind(&self) -> ConflictType {
        ConflictType::SkillGap
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<ConflictCandidate>, EvaluationError> {
        let shifts = util::active_shifts(ctx.shifts, self.kind())?;
        let mut out = Vec::new();

        for window in util::coverage_windows(&shifts) {
            let mut covered = false;
            for employee in window.employees() {
                let record = ctx.employees.get(employee).ok_or_else(|| {
                    EvaluationError::new(self.kind(), format!("unknown employee {employee}"))
                })?;
                covered |= record.role.is_senior();
            }
            if covered {
                continue;
            }
            out.push(ConflictCandidate::new(
                self.kind(),
                None,
                Some(window.bureau.clone()),
                window.date(),
                &window.shifts,
                format!("No senior or lead scheduled during {}", window.label()),
            ));
        }

        Ok(out)
    }
}

/// Moins d'employés distincts que le minimum configuré pour le bureau.
#[derive(Debug, Default, Clone, Copy)]
pub struct Understaffed;

impl Rule for Understaffed {
    fn kind(&self) -> ConflictType {
        ConflictType::Understaffed
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<ConflictCandidate>, EvaluationError> {
        let shifts = util::active_shifts(ctx.shifts, self.kind())?;
        let mut out = Vec::new();

        for window in util::coverage_windows(&shifts) {
            let minimum = ctx.options.min_staff_for(window.bureau);
            let staffed = window.employees().len();
            if staffed >= minimum as usize {
                continue;
            }
            out.push(ConflictCandidate::new(
                self.kind(),
                None,
                Some(window.bureau.clone()),
                window.date(),
                &window.shifts,
                format!(
                    "Only {staffed} employee(s) scheduled during {}, minimum requirement is {minimum}",
                    window.label()
                ),
            ));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BureauId;
    use crate::rules::testing::{ctx_for, shift_on, unassigned_on, Fixture};

    #[test]
    fn lone_junior_triggers_both_rules() {
        let fx = Fixture::new();
        let j1 = fx.employee("j1");
        let shifts = vec![shift_on("night", &j1, "rome", 5, (0, 0), (8, 0))];
        let ctx = ctx_for(&fx, &shifts);
        let gap = SkillGap.evaluate(&ctx).unwrap();
        let under = Understaffed.evaluate(&ctx).unwrap();
        assert_eq!(gap.len(), 1);
        assert_eq!(under.len(), 1);
        assert_eq!(gap[0].bureau_id, Some(BureauId::new("rome")));
        assert_eq!(under[0].severity, ConflictType::Understaffed.default_severity());
    }

    #[test]
    fn overlapping_senior_covers_window() {
        let fx = Fixture::new();
        let (j1, e1) = (fx.employee("j1"), fx.employee("e1"));
        let shifts = vec![
            shift_on("a", &j1, "rome", 5, (8, 0), (16, 0)),
            shift_on("b", &e1, "rome", 5, (12, 0), (20, 0)),
        ];
        let ctx = ctx_for(&fx, &shifts);
        assert!(SkillGap.evaluate(&ctx).unwrap().is_empty());
        assert!(Understaffed.evaluate(&ctx).unwrap().is_empty());
    }

    #[test]
    fn unassigned_shift_counts_as_nobody() {
        let fx = Fixture::new();
        let shifts = vec![unassigned_on("open", "milan", 5, (8, 0), (16, 0))];
        let got = Understaffed.evaluate(&ctx_for(&fx, &shifts)).unwrap();
        assert_eq!(got.len(), 1);
        assert!(got[0].description.starts_with("Only 0 employee(s)"));
    }

    #[test]
    fn unknown_employee_is_an_evaluation_error() {
        let fx = Fixture::new();
        let ghost = crate::model::EmployeeId::new("ghost");
        let shifts = vec![shift_on("a", &ghost, "rome", 5, (8, 0), (16, 0))];
        let err = SkillGap.evaluate(&ctx_for(&fx, &shifts)).unwrap_err();
        assert_eq!(err.kind, ConflictType::SkillGap);
    }

    #[test]
    fn lead_later_in_the_day_does_not_cover_the_night() {
        let fx = Fixture::new();
        let (j1, j2, e3) = (fx.employee("j1"), fx.employee("j2"), fx.employee("e3"));
        let shifts = vec![
            shift_on("night", &j1, "rome", 5, (0, 0), (8, 0)),
            shift_on("day", &j2, "rome", 5, (7, 0), (15, 0)),
            shift_on("eve", &e3, "rome", 5, (14, 0), (22, 0)),
        ];
        let gap = SkillGap.evaluate(&ctx_for(&fx, &shifts)).unwrap();
        assert_eq!(gap.len(), 1);
        assert_eq!(gap[0].description, "No senior or lead scheduled during 00:00 - 08:00");
        let ids: Vec<&str> = gap[0].shift_ids.iter().map(|s| s.as_str()).collect();
        assert_eq!(ids, ["day", "night"]);
    }

    #[test]
    fn identical_overlap_sets_collapse() {
        let fx = Fixture::new();
        let (j1, j2) = (fx.employee("j1"), fx.employee("j2"));
        let shifts = vec![
            shift_on("a", &j1, "rome", 5, (8, 0), (16, 0)),
            shift_on("b", &j2, "rome", 5, (9, 0), (17, 0)),
        ];
        let gap = SkillGap.evaluate(&ctx_for(&fx, &shifts)).unwrap();
        assert_eq!(gap.len(), 1);
        assert_eq!(gap[0].date, crate::rules::testing::day(5));
    }

    #[test]
    fn handover_chain_counts_staff_per_shift() {
        let mut fx = Fixture::new();
        fx.options.min_staff = 3;
        let (j1, j2, e3) = (fx.employee("j1"), fx.employee("j2"), fx.employee("e3"));
        let shifts = vec![
            shift_on("night", &j1, "rome", 5, (0, 0), (8, 0)),
            shift_on("day", &j2, "rome", 5, (7, 0), (15, 0)),
            shift_on("eve", &e3, "rome", 5, (14, 0), (22, 0)),
        ];
        let under = Understaffed.evaluate(&ctx_for(&fx, &shifts)).unwrap();
        // « day » voit les trois employés, « night » et « eve » seulement deux
        assert_eq!(under.len(), 2);
        assert!(under.iter().all(|c| c.description.starts_with("Only 2 employee(s)")));
    }
}
