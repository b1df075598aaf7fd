use crate::conflict::ConflictType;
use crate::model::{BureauId, Employee, EmployeeId, Shift};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Options des règles de détection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleOptions {
    pub min_rest_hours: u32,
    pub min_staff: u32,
    /// Minimum par bureau, prioritaire sur `min_staff`.
    pub min_staff_by_bureau: BTreeMap<BureauId, u32>,
    /// Part du plafond hebdomadaire à partir de laquelle on avertit.
    pub overtime_ratio: f64,
}

impl Default for RuleOptions {
    fn default() -> Self {
        Self {
            min_rest_hours: 11,
            min_staff: 2,
            min_staff_by_bureau: BTreeMap::new(),
            overtime_ratio: 0.9,
        }
    }
}

impl RuleOptions {
    pub fn min_staff_for(&self, bureau: &BureauId) -> u32 {
        self.min_staff_by_bureau
            .get(bureau)
            .copied()
            .unwrap_or(self.min_staff)
    }
}

/// Périmètre d'une réévaluation : employés, bureaux et jours `[from, to]` inclus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationScope {
    pub employees: BTreeSet<EmployeeId>,
    pub bureaus: BTreeSet<BureauId>,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Tous les employés et bureaux de la fenêtre.
    pub all: bool,
}

impl EvaluationScope {
    pub fn full(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            employees: BTreeSet::new(),
            bureaus: BTreeSet::new(),
            from,
            to,
            all: true,
        }
    }

    /// Portée d'une mutation : les jours des shifts touchés, élargis d'un jour de chaque côté
    /// (repos et changement de bureau concernent le jour voisin).
    pub fn for_shifts(shifts: &[&Shift]) -> Self {
        let from = shifts.iter().map(|s| s.date).min();
        let to = shifts.iter().map(|s| s.end_date()).max();
        let (Some(from), Some(to)) = (from, to) else {
            return Self::full(NaiveDate::MAX, NaiveDate::MIN);
        };
        Self {
            employees: shifts.iter().filter_map(|s| s.employee_id.clone()).collect(),
            bureaus: shifts.iter().map(|s| s.bureau_id.clone()).collect(),
            from: from.pred_opt().unwrap_or(from),
            to: to.succ_opt().unwrap_or(to),
            all: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from > self.to || (!self.all && self.employees.is_empty() && self.bureaus.is_empty())
    }

    pub fn covers_date(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Lundis des semaines ISO qui intersectent `[from, to]`.
    pub fn iso_weeks(&self) -> Vec<NaiveDate> {
        if self.from > self.to {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut monday = week_start(self.from);
        while monday <= self.to {
            out.push(monday);
            monday += Duration::days(7);
        }
        out
    }

    /// Décide si un conflit (ou candidat) relève de cette portée.
    pub fn covers(
        &self,
        kind: ConflictType,
        employee: Option<&EmployeeId>,
        bureau: Option<&BureauId>,
        date: NaiveDate,
    ) -> bool {
        let date_ok = match kind {
            ConflictType::OvertimeWarning => {
                self.from <= self.to && date <= self.to && self.from <= date + Duration::days(6)
            }
            _ => self.covers_date(date),
        };
        if !date_ok {
            return false;
        }
        if self.all {
            return true;
        }
        if kind.is_bureau_scoped() {
            bureau.is_some_and(|b| self.bureaus.contains(b))
        } else {
            employee.is_some_and(|e| self.employees.contains(e))
        }
    }

    /// Un shift est utile au contexte s'il concerne un employé ou un bureau de la portée.
    pub fn touches_shift(&self, shift: &Shift) -> bool {
        self.all
            || self.bureaus.contains(&shift.bureau_id)
            || shift
                .employee_id
                .as_ref()
                .is_some_and(|e| self.employees.contains(e))
    }

    /// Jours de shifts à charger : semaines ISO complètes, plus deux jours de marge.
    pub fn context_range(&self) -> (NaiveDate, NaiveDate) {
        if self.from > self.to {
            return (self.from, self.to);
        }
        let start = week_start(self.from) - Duration::days(2);
        let end = week_start(self.to) + Duration::days(8);
        (start, end)
    }
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Entrée commune à tous les évaluateurs.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub shifts: &'a [Shift],
    pub employees: &'a BTreeMap<EmployeeId, Employee>,
    pub scope: &'a EvaluationScope,
    pub options: &'a RuleOptions,
}
