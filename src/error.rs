use crate::conflict::{ConflictStatus, ConflictType};
use thiserror::Error;

/// Échec d'un évaluateur sur un état en mémoire incohérent.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} evaluator failed: {reason}")]
pub struct EvaluationError {
    pub kind: ConflictType,
    pub reason: String,
}

impl EvaluationError {
    pub fn new<R: Into<String>>(kind: ConflictType, reason: R) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// Rien n'a été écrit.
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid transition: cannot {action} a {from} conflict")]
    InvalidTransition {
        action: &'static str,
        from: ConflictStatus,
    },
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    /// Le lot n'a pas été appliqué.
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found<I: ToString>(entity: &'static str, id: I) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation<M: Into<String>>(msg: M) -> Self {
        EngineError::Validation(msg.into())
    }
}
