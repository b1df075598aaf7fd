//! Orchestration : écritures du store, réévaluation asynchrone par portée, transitions.
//!
//! Verrous, toujours pris dans cet ordre : `gate` (partagé pour une portée,
//! exclusif pour un balayage complet), verrous par employé/bureau triés, `store`, `book`.

use crate::aggregator::reconcile_detailed;
use crate::config::EngineConfig;
use crate::conflict::{Conflict, ConflictId};
use crate::error::{EngineError, EvaluationError};
use crate::lifecycle::{Action, ConflictBook, ConflictQuery};
use crate::model::{Bureau, BureauId, Employee, EmployeeId, Shift, ShiftId};
use crate::rules::{EvaluationScope, RuleContext, RuleOptions, RuleSet};
use crate::stats::DashboardStats;
use crate::storage::{Snapshot, Storage};
use crate::store::{EmployeeFilter, NewShift, ShiftChange, ShiftFilter, ShiftMove, ShiftStore};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Bilan d'une réévaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub candidates: usize,
    pub created: Vec<ConflictId>,
    pub auto_resolved: Vec<ConflictId>,
    pub superseded: Vec<ConflictId>,
    pub refreshed: Vec<ConflictId>,
    /// Règles en échec pour ce cycle ; leurs conflits existants n'ont pas été touchés.
    pub failures: Vec<EvaluationError>,
}

impl ReconcileReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Réévaluation lancée en tâche de fond après une mutation.
#[derive(Debug)]
pub struct PendingEvaluation {
    handle: JoinHandle<Result<ReconcileReport, EngineError>>,
}

impl PendingEvaluation {
    /// Attend la convergence de l'état des conflits pour cette mutation.
    pub async fn wait(self) -> Result<ReconcileReport, EngineError> {
        self.handle
            .await
            .map_err(|e| EngineError::Other(anyhow::Error::new(e)))?
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum LockKey {
    Bureau(BureauId),
    Employee(EmployeeId),
}

#[derive(Default)]
struct KeyLocks {
    map: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    /// Prend les verrous de la portée dans un ordre total (pas d'interblocage).
    async fn acquire(&self, scope: &EvaluationScope) -> Vec<OwnedMutexGuard<()>> {
        let keys: BTreeSet<LockKey> = scope
            .bureaus
            .iter()
            .cloned()
            .map(LockKey::Bureau)
            .chain(scope.employees.iter().cloned().map(LockKey::Employee))
            .collect();
        let handles: Vec<Arc<Mutex<()>>> = {
            let mut map = self.map.lock().await;
            keys.into_iter()
                .map(|k| map.entry(k).or_default().clone())
                .collect()
        };
        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }
        guards
    }
}

struct Inner {
    store: RwLock<ShiftStore>,
    book: Mutex<ConflictBook>,
    rules: RuleSet,
    options: RuleOptions,
    sweep_horizon_days: u32,
    gate: RwLock<()>,
    locks: KeyLocks,
    storage: Option<Arc<dyn Storage>>,
}

/// Moteur de détection de conflits ; clonable, partagé entre tâches.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("rules", &self.inner.rules)
            .field("persistent", &self.inner.storage.is_some())
            .finish()
    }
}

impl Engine {
    /// Moteur en mémoire, sans persistance.
    pub fn new(config: &EngineConfig) -> Self {
        Self::from_parts(config, ShiftStore::new(), ConflictBook::new(), None)
    }

    /// Charge le dernier snapshot de `storage` s'il existe.
    pub fn open(config: &EngineConfig, storage: Arc<dyn Storage>) -> Result<Self, EngineError> {
        let (store, book) = match storage.load().map_err(EngineError::Storage)? {
            Some(snapshot) => (
                ShiftStore::from_parts(snapshot.bureaus, snapshot.employees, snapshot.shifts)?,
                ConflictBook::from_conflicts(snapshot.conflicts),
            ),
            None => (ShiftStore::new(), ConflictBook::new()),
        };
        info!(shifts = store.len(), conflicts = book.len(), "engine state loaded");
        Ok(Self::from_parts(config, store, book, Some(storage)))
    }

    fn from_parts(
        config: &EngineConfig,
        store: ShiftStore,
        book: ConflictBook,
        storage: Option<Arc<dyn Storage>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: RwLock::new(store),
                book: Mutex::new(book),
                rules: RuleSet::standard(),
                options: config.rules.clone(),
                sweep_horizon_days: config.sweep_horizon_days,
                gate: RwLock::new(()),
                locks: KeyLocks::default(),
                storage,
            }),
        }
    }

    // -- écritures -------------------------------------------------------------

    /// Applique `f` sur une copie du store, persiste, puis publie ; rien n'est écrit en cas d'erreur.
    async fn write_store<T>(
        &self,
        f: impl FnOnce(&mut ShiftStore) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut store = self.inner.store.write().await;
        if self.inner.storage.is_none() {
            return f(&mut store);
        }
        let mut next = store.clone();
        let out = f(&mut next)?;
        {
            let book = self.inner.book.lock().await;
            self.persist(&next, &book).await?;
        }
        *store = next;
        Ok(out)
    }

    async fn persist(&self, store: &ShiftStore, book: &ConflictBook) -> Result<(), EngineError> {
        let Some(storage) = self.inner.storage.clone() else {
            return Ok(());
        };
        let snapshot = Snapshot {
            bureaus: store.bureaus().cloned().collect(),
            employees: store.employees().values().cloned().collect(),
            shifts: store.shifts().cloned().collect(),
            conflicts: book.iter().cloned().collect(),
        };
        tokio::task::spawn_blocking(move || storage.save(&snapshot))
            .await
            .map_err(|e| EngineError::Storage(anyhow::Error::new(e)))?
            .map_err(EngineError::Storage)
    }

    fn schedule(&self, scope: EvaluationScope) -> PendingEvaluation {
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let result = engine.reevaluate(&scope).await;
            if let Err(err) = &result {
                error!(error = %err, from = %scope.from, to = %scope.to, "re-evaluation failed");
            }
            result
        });
        PendingEvaluation { handle }
    }

    async fn commit_shift_change(
        &self,
        f: impl FnOnce(&mut ShiftStore) -> Result<ShiftChange, EngineError>,
    ) -> Result<(ShiftChange, PendingEvaluation), EngineError> {
        let change = self.write_store(f).await?;
        let pending = self.schedule(change.scope());
        Ok((change, pending))
    }

    pub async fn add_bureau(&self, bureau: Bureau) -> Result<Bureau, EngineError> {
        self.write_store(|store| store.add_bureau(bureau).cloned()).await
    }

    /// Crée ou remplace un employé ; ses shifts sont réévalués (rôle et plafond comptent).
    pub async fn upsert_employee(
        &self,
        employee: Employee,
    ) -> Result<(Employee, PendingEvaluation), EngineError> {
        let (saved, shifts) = self
            .write_store(|store| {
                let saved = store.upsert_employee(employee)?.clone();
                let filter = ShiftFilter {
                    employee_id: Some(saved.id.clone()),
                    ..Default::default()
                };
                let shifts: Vec<Shift> = store.list_shifts(&filter).into_iter().cloned().collect();
                Ok((saved, shifts))
            })
            .await?;
        let refs: Vec<&Shift> = shifts.iter().collect();
        let mut scope = EvaluationScope::for_shifts(&refs);
        scope.employees.insert(saved.id.clone());
        Ok((saved, self.schedule(scope)))
    }

    pub async fn create_shift(&self, new: NewShift) -> Result<(Shift, PendingEvaluation), EngineError> {
        let (change, pending) = self.commit_shift_change(|store| store.create_shift(new)).await?;
        let shift = change
            .current
            .ok_or_else(|| EngineError::Other(anyhow::anyhow!("create produced no shift")))?;
        debug!(shift_id = %shift.id, "shift created");
        Ok((shift, pending))
    }

    /// Insère ou remplace un shift complet (import, restauration).
    pub async fn upsert_shift(&self, shift: Shift) -> Result<(Shift, PendingEvaluation), EngineError> {
        let (change, pending) = self.commit_shift_change(|store| store.upsert_shift(shift)).await?;
        let shift = change
            .current
            .ok_or_else(|| EngineError::Other(anyhow::anyhow!("upsert produced no shift")))?;
        Ok((shift, pending))
    }

    pub async fn update_shift(
        &self,
        id: &ShiftId,
        new: NewShift,
    ) -> Result<(Shift, PendingEvaluation), EngineError> {
        let (change, pending) = self
            .commit_shift_change(|store| store.update_shift(id, new))
            .await?;
        let shift = change
            .current
            .ok_or_else(|| EngineError::Other(anyhow::anyhow!("update produced no shift")))?;
        Ok((shift, pending))
    }

    pub async fn move_shift(
        &self,
        id: &ShiftId,
        mv: ShiftMove,
    ) -> Result<(Shift, PendingEvaluation), EngineError> {
        let (change, pending) = self.commit_shift_change(|store| store.move_shift(id, mv)).await?;
        let shift = change
            .current
            .ok_or_else(|| EngineError::Other(anyhow::anyhow!("move produced no shift")))?;
        Ok((shift, pending))
    }

    /// Les conflits qui référencent le shift sont conservés (leurs snapshots restent lisibles).
    pub async fn delete_shift(&self, id: &ShiftId) -> Result<(Shift, PendingEvaluation), EngineError> {
        let (change, pending) = self.commit_shift_change(|store| store.delete_shift(id)).await?;
        let shift = change
            .previous
            .ok_or_else(|| EngineError::Other(anyhow::anyhow!("delete produced no shift")))?;
        debug!(shift_id = %shift.id, "shift deleted");
        Ok((shift, pending))
    }

    // -- réévaluation ------------------------------------------------------------

    /// Évalue les règles sur la portée puis réconcilie, en un seul lot tout-ou-rien.
    ///
    /// Jamais relancée automatiquement : un échec est remonté, la prochaine mutation
    /// ou le prochain balayage réessaiera.
    pub async fn reevaluate(&self, scope: &EvaluationScope) -> Result<ReconcileReport, EngineError> {
        if scope.is_empty() {
            return Ok(ReconcileReport::default());
        }
        let (_exclusive, _shared, _keys) = if scope.all {
            (Some(self.inner.gate.write().await), None, Vec::new())
        } else {
            let shared = self.inner.gate.read().await;
            (None, Some(shared), self.inner.locks.acquire(scope).await)
        };

        let (context, employees) = {
            let store = self.inner.store.read().await;
            (store.evaluation_context(scope), store.employees().clone())
        };
        let batch = self.inner.rules.evaluate(&RuleContext {
            shifts: &context,
            employees: &employees,
            scope,
            options: &self.inner.options,
        });

        let now = Utc::now();
        let store = self.inner.store.read().await;
        let mut book = self.inner.book.lock().await;
        let existing = book.in_scope(scope, &batch.evaluated);
        let outcome = reconcile_detailed(&batch.candidates, &existing, now);

        if !outcome.is_noop() {
            if self.inner.storage.is_some() {
                let mut next = book.clone();
                next.apply(outcome.conflicts.clone());
                self.persist(&store, &next).await?;
                *book = next;
            } else {
                book.apply(outcome.conflicts.clone());
            }
        }

        let report = ReconcileReport {
            candidates: batch.candidates.len(),
            created: outcome.created,
            auto_resolved: outcome.auto_resolved,
            superseded: outcome.superseded,
            refreshed: outcome.refreshed,
            failures: batch.failures,
        };
        if report.is_partial() {
            warn!(failed = report.failures.len(), "re-evaluation completed with failed rules");
        }
        info!(
            from = %scope.from,
            to = %scope.to,
            candidates = report.candidates,
            created = report.created.len(),
            auto_resolved = report.auto_resolved.len(),
            "reconcile cycle"
        );
        Ok(report)
    }

    /// Balayage complet de `[hier, aujourd'hui + horizon]`.
    pub async fn sweep(&self) -> Result<ReconcileReport, EngineError> {
        let today = Utc::now().date_naive();
        let scope = EvaluationScope::full(
            today - Duration::days(1),
            today + Duration::days(i64::from(self.inner.sweep_horizon_days)),
        );
        self.reevaluate(&scope).await
    }

    /// Lance le balayage périodique ; le premier passage est immédiat.
    pub fn spawn_sweeper(&self, every: std::time::Duration) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match engine.sweep().await {
                    Ok(report) => debug!(created = report.created.len(), "sweep done"),
                    Err(err) => error!(error = %err, "sweep failed"),
                }
            }
        })
    }

    // -- cycle de vie ------------------------------------------------------------

    /// Transition atomique : vérification et écriture sous le même verrou du registre.
    pub async fn transition(&self, id: &ConflictId, action: Action) -> Result<Conflict, EngineError> {
        let now = Utc::now();
        let store = self.inner.store.read().await;
        let mut book = self.inner.book.lock().await;
        if self.inner.storage.is_none() {
            return Ok(book.transition(id, action, now)?.conflict);
        }
        let mut next = book.clone();
        let transition = next.transition(id, action, now)?;
        if transition.changed {
            self.persist(&store, &next).await?;
            *book = next;
        }
        Ok(transition.conflict)
    }

    pub async fn acknowledge(&self, id: &ConflictId) -> Result<Conflict, EngineError> {
        self.transition(id, Action::Acknowledge).await
    }

    pub async fn resolve(&self, id: &ConflictId) -> Result<Conflict, EngineError> {
        self.transition(id, Action::Resolve).await
    }

    pub async fn dismiss(&self, id: &ConflictId) -> Result<Conflict, EngineError> {
        self.transition(id, Action::Dismiss).await
    }

    // -- lectures ------------------------------------------------------------------

    pub async fn list_conflicts(&self, query: &ConflictQuery) -> Vec<Conflict> {
        self.inner.book.lock().await.list(query)
    }

    pub async fn conflict(&self, id: &ConflictId) -> Result<Conflict, EngineError> {
        self.inner
            .book
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("conflict", id))
    }

    pub async fn list_shifts(&self, filter: &ShiftFilter) -> Vec<Shift> {
        let store = self.inner.store.read().await;
        store.list_shifts(filter).into_iter().cloned().collect()
    }

    pub async fn shift(&self, id: &ShiftId) -> Result<Shift, EngineError> {
        let store = self.inner.store.read().await;
        store
            .shift(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("shift", id))
    }

    /// Shifts à venir sur `days` jours à partir de `now`.
    ///
    /// Les bureaux n'ont pas de fuseau : l'heure murale UTC de `now` sert de
    /// référence pour tous, un shift local peut donc apparaître ou disparaître
    /// avec le décalage du bureau.
    pub async fn upcoming_shifts(&self, now: DateTime<Utc>, days: u32) -> Vec<Shift> {
        let store = self.inner.store.read().await;
        store
            .upcoming_shifts(now.naive_utc(), days)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn list_employees(&self, filter: &EmployeeFilter) -> Vec<Employee> {
        let store = self.inner.store.read().await;
        store.list_employees(filter).into_iter().cloned().collect()
    }

    pub async fn employee(&self, id: &EmployeeId) -> Result<Employee, EngineError> {
        let store = self.inner.store.read().await;
        store
            .employee(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("employee", id))
    }

    pub async fn bureaus(&self) -> Vec<Bureau> {
        self.inner.store.read().await.bureaus().cloned().collect()
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> DashboardStats {
        let store = self.inner.store.read().await;
        let book = self.inner.book.lock().await;
        DashboardStats::compute(&store, &book, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{ConflictStatus, ConflictType};
    use crate::model::Role;
    use chrono::{NaiveDate, NaiveTime};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, day).unwrap()
    }

    async fn engine_with_staff() -> (Engine, EmployeeId) {
        let engine = Engine::new(&EngineConfig::default());
        engine.add_bureau(Bureau::new("milan", "Milan")).await.unwrap();
        let e = Employee::new("Marco Rossi", BureauId::new("milan"), Role::Senior, 40)
            .with_id(EmployeeId::new("e1"));
        let (e, pending) = engine.upsert_employee(e).await.unwrap();
        pending.wait().await.unwrap();
        (engine, e.id)
    }

    fn on(employee: &EmployeeId, day: u32, start: NaiveTime, end: NaiveTime) -> NewShift {
        NewShift {
            employee_id: Some(employee.clone()),
            bureau_id: BureauId::new("milan"),
            date: d(day),
            start_time: start,
            end_time: end,
            status: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn mutation_triggers_scoped_reevaluation() {
        let (engine, e1) = engine_with_staff().await;
        let (_, p1) = engine.create_shift(on(&e1, 2, t(8, 0), t(16, 0))).await.unwrap();
        p1.wait().await.unwrap();
        let (_, p2) = engine.create_shift(on(&e1, 2, t(12, 0), t(20, 0))).await.unwrap();
        let report = p2.wait().await.unwrap();
        assert!(!report.is_partial());

        let conflicts = engine.list_conflicts(&ConflictQuery::default()).await;
        let double: Vec<_> = conflicts
            .iter()
            .filter(|c| c.kind == ConflictType::DoubleBooking)
            .collect();
        assert_eq!(double.len(), 1);
        assert_eq!(double[0].employee_name.as_deref(), Some("Marco Rossi"));
    }

    #[tokio::test]
    async fn deleting_shift_auto_resolves() {
        let (engine, e1) = engine_with_staff().await;
        engine.create_shift(on(&e1, 2, t(8, 0), t(16, 0))).await.unwrap().1.wait().await.unwrap();
        let (b, p) = engine.create_shift(on(&e1, 2, t(12, 0), t(20, 0))).await.unwrap();
        p.wait().await.unwrap();

        engine.delete_shift(&b.id).await.unwrap().1.wait().await.unwrap();
        let all = engine
            .list_conflicts(&ConflictQuery {
                status: Some(ConflictStatus::Resolved),
                ..Default::default()
            })
            .await;
        assert!(all.iter().any(|c| c.kind == ConflictType::DoubleBooking && c.resolved_at.is_some()));
    }

    #[tokio::test]
    async fn concurrent_resolve_and_dismiss_apply_once() {
        let (engine, e1) = engine_with_staff().await;
        engine.create_shift(on(&e1, 2, t(8, 0), t(16, 0))).await.unwrap().1.wait().await.unwrap();
        engine.create_shift(on(&e1, 2, t(12, 0), t(20, 0))).await.unwrap().1.wait().await.unwrap();
        let id = engine.list_conflicts(&ConflictQuery::default()).await[0].id.clone();

        let (a, b) = tokio::join!(engine.resolve(&id), engine.dismiss(&id));
        let final_status = engine.conflict(&id).await.unwrap().status;
        match final_status {
            // resolve d'abord : dismiss est un no-op
            ConflictStatus::Resolved => {
                assert!(a.is_ok());
                assert_eq!(b.unwrap().status, ConflictStatus::Resolved);
            }
            // dismiss d'abord : resolve est refusé
            ConflictStatus::Dismissed => {
                assert!(matches!(a, Err(EngineError::InvalidTransition { .. })));
                assert!(b.is_ok());
            }
            other => panic!("unexpected status {other}"),
        }
    }

    #[tokio::test]
    async fn unknown_references_write_nothing() {
        let (engine, _) = engine_with_staff().await;
        let ghost = EmployeeId::new("ghost");
        let err = engine.create_shift(on(&ghost, 2, t(8, 0), t(16, 0))).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(engine.list_shifts(&ShiftFilter::default()).await.is_empty());
    }
}
