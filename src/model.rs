use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new<S: AsRef<str>>(s: S) -> Self {
                Self(s.as_ref().to_owned())
            }
            pub fn random() -> Self {
                Self(Uuid::new_v4().to_string())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifiant fort pour Shift
    ShiftId
);
string_id!(
    /// Identifiant fort pour Employee
    EmployeeId
);
string_id!(
    /// Identifiant fort pour Bureau (ex. `milan`, `rome`)
    BureauId
);

/// Bureau : lieu physique auquel sont rattachés shifts et employés.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bureau {
    pub id: BureauId,
    pub name: String,
}

impl Bureau {
    pub fn new<I: AsRef<str>, N: Into<String>>(id: I, name: N) -> Self {
        Self {
            id: BureauId::new(id),
            name: name.into(),
        }
    }
}

/// Rôle d'un employé ; `Lead` et `Senior` comptent pour la couverture de compétences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Lead,
    Senior,
    Junior,
    Support,
}

impl Role {
    pub fn is_senior(self) -> bool {
        matches!(self, Role::Lead | Role::Senior)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Lead => "lead",
            Role::Senior => "senior",
            Role::Junior => "junior",
            Role::Support => "support",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lead" => Some(Role::Lead),
            "senior" => Some(Role::Senior),
            "junior" => Some(Role::Junior),
            "support" => Some(Role::Support),
            _ => None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Employé (référencé par les shifts et les conflits, jamais possédé).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub full_name: String,
    /// Bureau de rattachement
    pub bureau_id: BureauId,
    pub role: Role,
    pub weekly_hour_cap: u32,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Employee {
    pub fn new<N: Into<String>>(full_name: N, bureau_id: BureauId, role: Role, cap: u32) -> Self {
        Self {
            id: EmployeeId::random(),
            full_name: full_name.into(),
            bureau_id,
            role,
            weekly_hour_cap: cap,
            active: true,
        }
    }

    pub fn with_id(mut self, id: EmployeeId) -> Self {
        self.id = id;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShiftStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
}

impl ShiftStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(ShiftStatus::Pending),
            "confirmed" => Some(ShiftStatus::Confirmed),
            "cancelled" | "canceled" => Some(ShiftStatus::Cancelled),
            _ => None,
        }
    }
}

/// Créneau planifié, en heure locale du bureau.
///
/// `date` est le jour où le shift commence. Si `end_time < start_time` le shift
/// passe minuit et se termine le lendemain ; `end_time == start_time` est refusé.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub id: ShiftId,
    #[serde(default)]
    pub employee_id: Option<EmployeeId>,
    pub bureau_id: BureauId,
    pub date: NaiveDate,
    #[serde(with = "clock")]
    pub start_time: NaiveTime,
    #[serde(with = "clock")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub status: ShiftStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Shift {
    /// Crée un shift non assigné, en statut `pending`.
    pub fn new(
        bureau_id: BureauId,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Self, String> {
        let shift = Self {
            id: ShiftId::random(),
            employee_id: None,
            bureau_id,
            date,
            start_time,
            end_time,
            status: ShiftStatus::Pending,
            notes: None,
        };
        shift.check_time_range()?;
        Ok(shift)
    }

    pub fn assigned_to(mut self, employee: EmployeeId) -> Self {
        self.employee_id = Some(employee);
        self
    }

    pub fn with_id(mut self, id: ShiftId) -> Self {
        self.id = id;
        self
    }

    pub fn is_overnight(&self) -> bool {
        self.end_time < self.start_time
    }

    /// Un shift annulé n'occupe plus personne.
    pub fn is_active(&self) -> bool {
        self.status != ShiftStatus::Cancelled
    }

    pub fn start(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// Fin normalisée (lendemain pour un shift de nuit).
    pub fn end(&self) -> NaiveDateTime {
        let end = self.date.and_time(self.end_time);
        if self.is_overnight() {
            end + Duration::days(1)
        } else {
            end
        }
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end().date()
    }

    pub fn duration(&self) -> Duration {
        self.end() - self.start()
    }

    pub fn check_time_range(&self) -> Result<(), String> {
        if self.start() >= self.end() {
            return Err(format!(
                "shift {} has a non-positive duration ({} - {})",
                self.id, self.start_time, self.end_time
            ));
        }
        Ok(())
    }

    /// Découpe le shift en segments bornés à la journée ; un shift de nuit en produit deux.
    pub fn day_segments(&self) -> Vec<(NaiveDate, NaiveDateTime, NaiveDateTime)> {
        let (start, end) = (self.start(), self.end());
        let mut out = Vec::with_capacity(2);
        let mut cursor = start;
        while cursor < end {
            let day = cursor.date();
            let next_midnight = (day + Duration::days(1)).and_time(NaiveTime::MIN);
            let seg_end = end.min(next_midnight);
            out.push((day, cursor, seg_end));
            cursor = seg_end;
        }
        out
    }

    /// Libellé `HH:MM - HH:MM`
    pub fn time_label(&self) -> String {
        format!(
            "{} - {}",
            self.start_time.format(clock::FORMAT),
            self.end_time.format(clock::FORMAT)
        )
    }
}

/// Sérialisation `HH:MM` des heures, avec `HH:MM:SS` accepté en entrée.
///
/// Les secondes sont tronquées à la lecture : une heure lue est toujours
/// réécrite à l'identique.
pub mod clock {
    use chrono::{NaiveTime, Timelike};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    pub fn parse(raw: &str) -> Result<NaiveTime, chrono::ParseError> {
        let raw = raw.trim();
        let time = NaiveTime::parse_from_str(raw, FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))?;
        Ok(truncate(time))
    }

    /// Ramène une heure à la minute.
    pub fn truncate(time: NaiveTime) -> NaiveTime {
        NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
            match time {
                Some(t) => s.serialize_some(&t.format(super::FORMAT).to_string()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
            let raw = Option::<String>::deserialize(d)?;
            raw.map(|r| super::parse(&r).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
