use crate::model::{BureauId, EmployeeId, Shift, ShiftId};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Espace de noms des identités de conflit (UUID v5).
const CONFLICT_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_4c2e_9b7d_4e51_8c3a_2d90_f1e6_b7c4);

/// Identifiant déterministe d'un conflit, dérivé de sa clé d'identité.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConflictId(String);

impl ConflictId {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_owned())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConflictType {
    #[serde(rename = "Double Booking")]
    DoubleBooking,
    #[serde(rename = "Rest Period Violation")]
    RestPeriodViolation,
    #[serde(rename = "Skill Gap")]
    SkillGap,
    #[serde(rename = "Understaffed")]
    Understaffed,
    #[serde(rename = "Overtime Warning")]
    OvertimeWarning,
    #[serde(rename = "Cross-Bureau Conflict")]
    CrossBureau,
}

impl ConflictType {
    pub const ALL: [ConflictType; 6] = [
        ConflictType::DoubleBooking,
        ConflictType::RestPeriodViolation,
        ConflictType::SkillGap,
        ConflictType::Understaffed,
        ConflictType::OvertimeWarning,
        ConflictType::CrossBureau,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ConflictType::DoubleBooking => "Double Booking",
            ConflictType::RestPeriodViolation => "Rest Period Violation",
            ConflictType::SkillGap => "Skill Gap",
            ConflictType::Understaffed => "Understaffed",
            ConflictType::OvertimeWarning => "Overtime Warning",
            ConflictType::CrossBureau => "Cross-Bureau Conflict",
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            ConflictType::DoubleBooking | ConflictType::RestPeriodViolation => Severity::High,
            ConflictType::SkillGap | ConflictType::Understaffed | ConflictType::CrossBureau => {
                Severity::Medium
            }
            ConflictType::OvertimeWarning => Severity::Low,
        }
    }

    /// Types rattachés à un bureau plutôt qu'à un employé.
    pub fn is_bureau_scoped(self) -> bool {
        matches!(self, ConflictType::SkillGap | ConflictType::Understaffed)
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    Unresolved,
    Acknowledged,
    Resolved,
    Dismissed,
}

impl ConflictStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictStatus::Unresolved => "unresolved",
            ConflictStatus::Acknowledged => "acknowledged",
            ConflictStatus::Resolved => "resolved",
            ConflictStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "unresolved" => Some(ConflictStatus::Unresolved),
            "acknowledged" => Some(ConflictStatus::Acknowledged),
            "resolved" => Some(ConflictStatus::Resolved),
            "dismissed" => Some(ConflictStatus::Dismissed),
            _ => None,
        }
    }

    /// Encore affiché comme « à traiter ».
    pub fn is_open(self) -> bool {
        matches!(self, ConflictStatus::Unresolved | ConflictStatus::Acknowledged)
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copie figée d'un shift au moment de la détection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftSnapshot {
    pub shift_id: ShiftId,
    pub bureau_id: BureauId,
    pub date: NaiveDate,
    #[serde(with = "crate::model::clock")]
    pub start_time: NaiveTime,
    #[serde(with = "crate::model::clock")]
    pub end_time: NaiveTime,
}

impl From<&Shift> for ShiftSnapshot {
    fn from(shift: &Shift) -> Self {
        Self {
            shift_id: shift.id.clone(),
            bureau_id: shift.bureau_id.clone(),
            date: shift.date,
            start_time: shift.start_time,
            end_time: shift.end_time,
        }
    }
}

/// Sortie brute d'un évaluateur, avant identité et réconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictCandidate {
    pub kind: ConflictType,
    pub severity: Severity,
    pub employee_id: Option<EmployeeId>,
    pub employee_name: Option<String>,
    pub bureau_id: Option<BureauId>,
    pub date: NaiveDate,
    /// Triés et sans doublon (voir [`ConflictCandidate::new`]).
    pub shift_ids: Vec<ShiftId>,
    pub shifts: Vec<ShiftSnapshot>,
    pub description: String,
}

impl ConflictCandidate {
    /// Construit un candidat à partir des shifts concernés ; ids triés, dédoublonnés.
    pub fn new(
        kind: ConflictType,
        employee_id: Option<EmployeeId>,
        bureau_id: Option<BureauId>,
        date: NaiveDate,
        shifts: &[&Shift],
        description: String,
    ) -> Self {
        let mut sorted: Vec<&Shift> = shifts.to_vec();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        sorted.dedup_by(|a, b| a.id == b.id);
        let shift_ids = sorted.iter().map(|s| s.id.clone()).collect();
        let mut snapshots: Vec<ShiftSnapshot> = sorted.iter().map(|s| ShiftSnapshot::from(*s)).collect();
        snapshots.sort_by(|a, b| {
            (a.date, a.start_time, &a.shift_id).cmp(&(b.date, b.start_time, &b.shift_id))
        });
        Self {
            kind,
            severity: kind.default_severity(),
            employee_id,
            employee_name: None,
            bureau_id,
            date,
            shift_ids,
            shifts: snapshots,
            description,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_employee_name(mut self, name: Option<String>) -> Self {
        self.employee_name = name;
        self
    }

    pub fn identity_key(&self) -> String {
        identity_key(self.kind, self.employee_id.as_ref(), self.date, &self.shift_ids)
    }

    pub fn conflict_id(&self) -> ConflictId {
        conflict_id_for(&self.identity_key())
    }

    pub fn situation(&self) -> Situation {
        Situation {
            kind: self.kind,
            employee_id: self.employee_id.clone(),
            bureau_id: self.bureau_id.clone(),
            date: self.date,
        }
    }
}

/// Clé `(type, employé, date, ids triés)` ; l'appelant fournit des ids déjà triés.
pub fn identity_key(
    kind: ConflictType,
    employee: Option<&EmployeeId>,
    date: NaiveDate,
    sorted_shift_ids: &[ShiftId],
) -> String {
    let shifts: Vec<&str> = sorted_shift_ids.iter().map(ShiftId::as_str).collect();
    format!(
        "{}|{}|{}|{}",
        kind.label(),
        employee.map(EmployeeId::as_str).unwrap_or("-"),
        date.format("%Y-%m-%d"),
        shifts.join(",")
    )
}

pub fn conflict_id_for(identity_key: &str) -> ConflictId {
    ConflictId(Uuid::new_v5(&CONFLICT_NAMESPACE, identity_key.as_bytes()).to_string())
}

/// Même situation métier, indépendamment de l'ensemble de shifts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Situation {
    pub kind: ConflictType,
    pub employee_id: Option<EmployeeId>,
    pub bureau_id: Option<BureauId>,
    pub date: NaiveDate,
}

/// Conflit persistant, porteur d'un statut.
///
/// Invariant : `resolved_at` est renseigné si et seulement si `status == Resolved`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: ConflictId,
    #[serde(rename = "type")]
    pub kind: ConflictType,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<EmployeeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bureau_id: Option<BureauId>,
    pub date: NaiveDate,
    pub affected_shift_ids: Vec<ShiftId>,
    #[serde(default)]
    pub shifts: Vec<ShiftSnapshot>,
    pub description: String,
    pub status: ConflictStatus,
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Renseigné quand le conflit a été remplacé par une nouvelle identité (shifts modifiés).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<ConflictId>,
}

impl Conflict {
    pub fn from_candidate(candidate: ConflictCandidate, now: DateTime<Utc>) -> Self {
        Self {
            id: candidate.conflict_id(),
            kind: candidate.kind,
            severity: candidate.severity,
            employee_id: candidate.employee_id,
            employee_name: candidate.employee_name,
            bureau_id: candidate.bureau_id,
            date: candidate.date,
            affected_shift_ids: candidate.shift_ids,
            shifts: candidate.shifts,
            description: candidate.description,
            status: ConflictStatus::Unresolved,
            detected_at: now,
            resolved_at: None,
            superseded_by: None,
        }
    }

    pub fn identity_key(&self) -> String {
        let mut ids = self.affected_shift_ids.clone();
        ids.sort();
        identity_key(self.kind, self.employee_id.as_ref(), self.date, &ids)
    }

    pub fn situation(&self) -> Situation {
        Situation {
            kind: self.kind,
            employee_id: self.employee_id.clone(),
            bureau_id: self.bureau_id.clone(),
            date: self.date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BureauId;

    fn shift(id: &str) -> Shift {
        Shift::new(
            BureauId::new("milan"),
            NaiveDate::from_ymd_opt(2025, 11, 2).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        )
        .unwrap()
        .with_id(ShiftId::new(id))
    }

    #[test]
    fn identity_ignores_shift_order() {
        let (a, b) = (shift("a"), shift("b"));
        let date = a.date;
        let c1 = ConflictCandidate::new(
            ConflictType::DoubleBooking,
            Some(EmployeeId::new("e1")),
            None,
            date,
            &[&a, &b],
            String::new(),
        );
        let c2 = ConflictCandidate::new(
            ConflictType::DoubleBooking,
            Some(EmployeeId::new("e1")),
            None,
            date,
            &[&b, &a, &b],
            "other text".into(),
        );
        assert_eq!(c1.conflict_id(), c2.conflict_id());
        assert_eq!(c2.shift_ids.len(), 2);
    }

    #[test]
    fn identity_depends_on_type() {
        let a = shift("a");
        let mk = |kind| {
            ConflictCandidate::new(kind, None, Some(BureauId::new("milan")), a.date, &[&a], String::new())
        };
        assert_ne!(
            mk(ConflictType::SkillGap).conflict_id(),
            mk(ConflictType::Understaffed).conflict_id()
        );
    }

    #[test]
    fn conflict_serializes_ui_labels() {
        let a = shift("a");
        let cand = ConflictCandidate::new(
            ConflictType::CrossBureau,
            Some(EmployeeId::new("e1")),
            None,
            a.date,
            &[&a],
            "x".into(),
        );
        let now = Utc::now();
        let conflict = Conflict::from_candidate(cand, now);
        let json = serde_json::to_value(&conflict).unwrap();
        assert_eq!(json["type"], "Cross-Bureau Conflict");
        assert_eq!(json["severity"], "medium");
        assert_eq!(json["status"], "unresolved");
        assert!(json.get("resolved_at").is_none());
        assert_eq!(conflict.identity_key(), "Cross-Bureau Conflict|e1|2025-11-02|a");
    }
}
