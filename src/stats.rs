use crate::conflict::{ConflictStatus, Severity};
use crate::lifecycle::ConflictBook;
use crate::store::ShiftStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fenêtre des shifts « à venir » du tableau de bord, en jours.
pub const UPCOMING_DAYS: u32 = 7;

/// Agrégats du tableau de bord, dérivés de l'état courant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_employees: usize,
    pub active_employees: usize,
    pub upcoming_shifts: usize,
    pub unresolved_conflicts: usize,
    pub acknowledged_conflicts: usize,
    /// Conflits ouverts de sévérité haute.
    pub high_severity_conflicts: usize,
    /// Pourcentage de shifts à venir qui ont un employé assigné.
    pub coverage_rate: f64,
}

impl DashboardStats {
    /// `now` est ramené à son heure murale UTC pour la fenêtre des shifts à venir
    /// (voir [`Engine::upcoming_shifts`](crate::engine::Engine::upcoming_shifts)).
    pub fn compute(store: &ShiftStore, book: &ConflictBook, now: DateTime<Utc>) -> Self {
        let employees = store.employees();
        let upcoming = store.upcoming_shifts(now.naive_utc(), UPCOMING_DAYS);
        let assigned = upcoming.iter().filter(|s| s.employee_id.is_some()).count();
        let coverage_rate = if upcoming.is_empty() {
            100.0
        } else {
            let rate = assigned as f64 * 100.0 / upcoming.len() as f64;
            (rate * 10.0).round() / 10.0
        };

        let count = |status: ConflictStatus| book.iter().filter(|c| c.status == status).count();
        Self {
            total_employees: employees.len(),
            active_employees: employees.values().filter(|e| e.active).count(),
            upcoming_shifts: upcoming.len(),
            unresolved_conflicts: count(ConflictStatus::Unresolved),
            acknowledged_conflicts: count(ConflictStatus::Acknowledged),
            high_severity_conflicts: book
                .iter()
                .filter(|c| c.status.is_open() && c.severity == Severity::High)
                .count(),
            coverage_rate,
        }
    }
}

/// Corps de `GET /api/dashboard/stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsEnvelope {
    pub stats: DashboardStats,
}
