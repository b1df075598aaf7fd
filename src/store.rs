use crate::error::EngineError;
use crate::model::{clock, Bureau, BureauId, Employee, EmployeeId, Role, Shift, ShiftId, ShiftStatus};
use crate::rules::EvaluationScope;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Données d'un shift à créer ou à remplacer (`POST` / `PUT`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewShift {
    #[serde(default)]
    pub employee_id: Option<EmployeeId>,
    pub bureau_id: BureauId,
    pub date: NaiveDate,
    #[serde(with = "crate::model::clock")]
    pub start_time: NaiveTime,
    #[serde(with = "crate::model::clock")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub status: Option<ShiftStatus>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewShift {
    fn into_shift(self, id: ShiftId) -> Shift {
        Shift {
            id,
            employee_id: self.employee_id,
            bureau_id: self.bureau_id,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            status: self.status.unwrap_or_default(),
            notes: self.notes,
        }
    }
}

/// Déplacement d'un shift (`PATCH`) : nouveau jour, horaires optionnels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftMove {
    pub date: NaiveDate,
    #[serde(default, with = "crate::model::clock::option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "crate::model::clock::option")]
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShiftFilter {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub bureau_id: Option<BureauId>,
    #[serde(default)]
    pub employee_id: Option<EmployeeId>,
}

impl ShiftFilter {
    pub fn matches(&self, shift: &Shift) -> bool {
        self.start_date.map_or(true, |d| shift.date >= d)
            && self.end_date.map_or(true, |d| shift.date <= d)
            && self.bureau_id.as_ref().map_or(true, |b| &shift.bureau_id == b)
            && self
                .employee_id
                .as_ref()
                .map_or(true, |e| shift.employee_id.as_ref() == Some(e))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmployeeFilter {
    #[serde(default)]
    pub bureau: Option<BureauId>,
    #[serde(default)]
    pub role: Option<Role>,
    /// `active` | `inactive`
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

impl EmployeeFilter {
    pub fn matches(&self, employee: &Employee) -> bool {
        let status_ok = match self.status.as_deref() {
            Some("active") => employee.active,
            Some("inactive") => !employee.active,
            _ => true,
        };
        let search_ok = self.search.as_ref().map_or(true, |needle| {
            employee
                .full_name
                .to_lowercase()
                .contains(&needle.trim().to_lowercase())
        });
        status_ok
            && search_ok
            && self.bureau.as_ref().map_or(true, |b| &employee.bureau_id == b)
            && self.role.map_or(true, |r| employee.role == r)
    }
}

/// Évènement émis par chaque mutation : état avant et après.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftChange {
    pub previous: Option<Shift>,
    pub current: Option<Shift>,
}

impl ShiftChange {
    /// Portée de réévaluation : employés et bureaux touchés, jours avant/après.
    pub fn scope(&self) -> EvaluationScope {
        let touched: Vec<&Shift> = self.previous.iter().chain(self.current.iter()).collect();
        EvaluationScope::for_shifts(&touched)
    }
}

/// Shift Store : ensemble canonique des shifts, avec les registres d'employés et de bureaux.
#[derive(Debug, Clone, Default)]
pub struct ShiftStore {
    bureaus: BTreeMap<BureauId, Bureau>,
    employees: BTreeMap<EmployeeId, Employee>,
    shifts: BTreeMap<ShiftId, Shift>,
}

impl ShiftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstruit un store depuis un snapshot, en revalidant chaque shift.
    pub fn from_parts(
        bureaus: Vec<Bureau>,
        employees: Vec<Employee>,
        shifts: Vec<Shift>,
    ) -> Result<Self, EngineError> {
        let mut store = Self::new();
        for bureau in bureaus {
            store.add_bureau(bureau)?;
        }
        for employee in employees {
            store.upsert_employee(employee)?;
        }
        for shift in shifts {
            store.upsert_shift(shift)?;
        }
        Ok(store)
    }

    pub fn add_bureau(&mut self, bureau: Bureau) -> Result<&Bureau, EngineError> {
        if bureau.id.as_str().trim().is_empty() {
            return Err(EngineError::validation("bureau id cannot be empty"));
        }
        let id = bureau.id.clone();
        self.bureaus.insert(id.clone(), bureau);
        Ok(&self.bureaus[&id])
    }

    pub fn bureaus(&self) -> impl Iterator<Item = &Bureau> {
        self.bureaus.values()
    }

    pub fn has_bureau(&self, id: &BureauId) -> bool {
        self.bureaus.contains_key(id)
    }

    pub fn upsert_employee(&mut self, employee: Employee) -> Result<&Employee, EngineError> {
        if employee.full_name.trim().is_empty() {
            return Err(EngineError::validation("employee full_name cannot be empty"));
        }
        if !self.has_bureau(&employee.bureau_id) {
            return Err(EngineError::validation(format!(
                "employee {} references unknown bureau {}",
                employee.id, employee.bureau_id
            )));
        }
        let id = employee.id.clone();
        self.employees.insert(id.clone(), employee);
        Ok(&self.employees[&id])
    }

    pub fn employee(&self, id: &EmployeeId) -> Option<&Employee> {
        self.employees.get(id)
    }

    pub fn employees(&self) -> &BTreeMap<EmployeeId, Employee> {
        &self.employees
    }

    pub fn list_employees(&self, filter: &EmployeeFilter) -> Vec<&Employee> {
        let mut out: Vec<&Employee> = self.employees.values().filter(|e| filter.matches(e)).collect();
        out.sort_by(|a, b| a.full_name.cmp(&b.full_name).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn shift(&self, id: &ShiftId) -> Option<&Shift> {
        self.shifts.get(id)
    }

    pub fn shifts(&self) -> impl Iterator<Item = &Shift> {
        self.shifts.values()
    }

    pub fn len(&self) -> usize {
        self.shifts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shifts.is_empty()
    }

    fn validate(&self, shift: &Shift) -> Result<(), EngineError> {
        shift.check_time_range().map_err(EngineError::Validation)?;
        if !self.has_bureau(&shift.bureau_id) {
            return Err(EngineError::validation(format!(
                "shift {} references unknown bureau {}",
                shift.id, shift.bureau_id
            )));
        }
        if let Some(employee) = &shift.employee_id {
            if !self.employees.contains_key(employee) {
                return Err(EngineError::validation(format!(
                    "shift {} references unknown employee {}",
                    shift.id, employee
                )));
            }
        }
        Ok(())
    }

    /// Insère ou remplace un shift par id. Rien n'est écrit si la validation échoue.
    ///
    /// Les heures sont ramenées à la minute avant validation, comme sur disque.
    pub fn upsert_shift(&mut self, mut shift: Shift) -> Result<ShiftChange, EngineError> {
        shift.start_time = clock::truncate(shift.start_time);
        shift.end_time = clock::truncate(shift.end_time);
        self.validate(&shift)?;
        let previous = self.shifts.insert(shift.id.clone(), shift.clone());
        Ok(ShiftChange {
            previous,
            current: Some(shift),
        })
    }

    pub fn create_shift(&mut self, new: NewShift) -> Result<ShiftChange, EngineError> {
        self.upsert_shift(new.into_shift(ShiftId::random()))
    }

    /// Remplacement complet des champs d'un shift existant.
    pub fn update_shift(&mut self, id: &ShiftId, new: NewShift) -> Result<ShiftChange, EngineError> {
        if !self.shifts.contains_key(id) {
            return Err(EngineError::not_found("shift", id));
        }
        self.upsert_shift(new.into_shift(id.clone()))
    }

    pub fn move_shift(&mut self, id: &ShiftId, mv: ShiftMove) -> Result<ShiftChange, EngineError> {
        let mut moved = self
            .shifts
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("shift", id))?;
        moved.date = mv.date;
        if let Some(start) = mv.start_time {
            moved.start_time = start;
        }
        if let Some(end) = mv.end_time {
            moved.end_time = end;
        }
        self.upsert_shift(moved)
    }

    pub fn delete_shift(&mut self, id: &ShiftId) -> Result<ShiftChange, EngineError> {
        let previous = self
            .shifts
            .remove(id)
            .ok_or_else(|| EngineError::not_found("shift", id))?;
        Ok(ShiftChange {
            previous: Some(previous),
            current: None,
        })
    }

    /// Shifts actifs de `employee` qui chevauchent `[start, end)`.
    pub fn shifts_overlapping(
        &self,
        employee: &EmployeeId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Vec<&Shift> {
        let mut out: Vec<&Shift> = self
            .shifts
            .values()
            .filter(|s| s.is_active() && s.employee_id.as_ref() == Some(employee))
            .filter(|s| s.start() < end && start < s.end())
            .collect();
        out.sort_by_key(|s| (s.start(), s.id.clone()));
        out
    }

    /// Tous les shifts (annulés compris) qui intersectent `[start, end)`.
    pub fn shifts_in_range(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<&Shift> {
        let mut out: Vec<&Shift> = self
            .shifts
            .values()
            .filter(|s| s.start() < end && start < s.end())
            .collect();
        out.sort_by_key(|s| (s.start(), s.id.clone()));
        out
    }

    pub fn list_shifts(&self, filter: &ShiftFilter) -> Vec<&Shift> {
        let mut out: Vec<&Shift> = self.shifts.values().filter(|s| filter.matches(s)).collect();
        out.sort_by_key(|s| (s.start(), s.id.clone()));
        out
    }

    /// Shifts non annulés qui démarrent dans `[from, from + days)`.
    ///
    /// `from` est comparé tel quel aux heures locales des bureaux, sans fuseau.
    pub fn upcoming_shifts(&self, from: NaiveDateTime, days: u32) -> Vec<&Shift> {
        let until = from + chrono::Duration::days(i64::from(days));
        let mut out: Vec<&Shift> = self
            .shifts
            .values()
            .filter(|s| s.is_active() && s.start() >= from && s.start() < until)
            .collect();
        out.sort_by_key(|s| (s.start(), s.id.clone()));
        out
    }

    /// Sous-ensemble utile à l'évaluation d'une portée (voir [`EvaluationScope::context_range`]).
    pub fn evaluation_context(&self, scope: &EvaluationScope) -> Vec<Shift> {
        let (from, to) = scope.context_range();
        self.shifts
            .values()
            .filter(|s| s.date >= from && s.date <= to)
            .filter(|s| scope.touches_shift(s))
            .cloned()
            .collect()
    }
}
