#![forbid(unsafe_code)]
//! Garde : moteur de détection de conflits pour plannings multi-bureaux.
//!
//! - Store de shifts en mémoire, snapshot JSON optionnel.
//! - Six évaluateurs indépendants : double booking, repos, compétences,
//!   effectif minimal, heures sup., changement de bureau.
//! - Réconciliation idempotente et cycle de vie des conflits.
//! - Réévaluation asynchrone par portée après chaque mutation, balayage périodique.
//! - API REST (axum) et CLI.
//!
//! Dates calendaires et heures locales du bureau ; horodatages de conflits en UTC.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod io;
pub mod lifecycle;
pub mod model;
pub mod rules;
pub mod stats;
pub mod storage;
pub mod store;

pub use aggregator::{reconcile, reconcile_detailed, ReconcileOutcome};
pub use config::{EngineConfig, ServerConfig};
pub use conflict::{Conflict, ConflictCandidate, ConflictId, ConflictStatus, ConflictType, Severity};
pub use engine::{Engine, PendingEvaluation, ReconcileReport};
pub use error::{EngineError, EvaluationError};
pub use lifecycle::{Action, ConflictBook, ConflictQuery};
pub use model::{Bureau, BureauId, Employee, EmployeeId, Role, Shift, ShiftId, ShiftStatus};
pub use rules::{EvaluationScope, Rule, RuleOptions, RuleSet};
pub use stats::DashboardStats;
pub use storage::{JsonStorage, Snapshot, Storage};
pub use store::{EmployeeFilter, NewShift, ShiftFilter, ShiftMove, ShiftStore};
