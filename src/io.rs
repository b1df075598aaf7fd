use crate::conflict::Conflict;
use crate::model::{clock, BureauId, Employee, EmployeeId, Role, ShiftStatus};
use crate::store::NewShift;
use anyhow::{bail, Context};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::io::Write;
use std::path::Path;

/// Import d'employés : header `id,full_name,bureau_id,role,weekly_hour_cap[,active]`
pub fn import_employees_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Employee>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut out = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let employee = parse_employee(&rec).with_context(|| format!("employees row {}", line + 2))?;
        out.push(employee);
    }
    Ok(out)
}

fn parse_employee(rec: &StringRecord) -> anyhow::Result<Employee> {
    let id = field(rec, 0, "id")?;
    let name = field(rec, 1, "full_name")?;
    let bureau = field(rec, 2, "bureau_id")?;
    let raw_role = field(rec, 3, "role")?;
    let role = Role::parse(raw_role).with_context(|| format!("unknown role {raw_role}"))?;
    let cap: u32 = field(rec, 4, "weekly_hour_cap")?
        .parse()
        .context("weekly_hour_cap must be a whole number of hours")?;
    let mut employee = Employee::new(name, BureauId::new(bureau), role, cap).with_id(EmployeeId::new(id));
    if let Some(flag) = optional(rec, 5) {
        employee.active = parse_bool(flag).with_context(|| format!("invalid active value for {id}"))?;
    }
    Ok(employee)
}

/// Import de shifts : header `employee_id,bureau_id,date,start_time,end_time[,status][,notes]`
///
/// `employee_id` vide = shift non assigné ; horaires `HH:MM`, date `YYYY-MM-DD`.
pub fn import_shifts_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<NewShift>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut out = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let shift = parse_shift(&rec).with_context(|| format!("shifts row {}", line + 2))?;
        out.push(shift);
    }
    Ok(out)
}

fn parse_shift(rec: &StringRecord) -> anyhow::Result<NewShift> {
    let employee_id = optional(rec, 0).map(EmployeeId::new);
    let bureau = field(rec, 1, "bureau_id")?;
    let date = NaiveDate::parse_from_str(field(rec, 2, "date")?, "%Y-%m-%d").context("date YYYY-MM-DD")?;
    let start_time = clock::parse(field(rec, 3, "start_time")?).context("start_time HH:MM")?;
    let end_time = clock::parse(field(rec, 4, "end_time")?).context("end_time HH:MM")?;
    let status = match optional(rec, 5) {
        Some(raw) => Some(ShiftStatus::parse(raw).with_context(|| format!("unknown status {raw}"))?),
        None => None,
    };
    Ok(NewShift {
        employee_id,
        bureau_id: BureauId::new(bureau),
        date,
        start_time,
        end_time,
        status,
        notes: optional(rec, 6).map(str::to_string),
    })
}

fn field<'r>(rec: &'r StringRecord, idx: usize, name: &str) -> anyhow::Result<&'r str> {
    match rec.get(idx).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => bail!("missing {name}"),
    }
}

fn optional(rec: &StringRecord, idx: usize) -> Option<&str> {
    rec.get(idx).map(str::trim).filter(|v| !v.is_empty())
}

fn parse_bool(s: &str) -> anyhow::Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "oui" => Ok(true),
        "false" | "0" | "no" | "n" | "non" => Ok(false),
        _ => bail!("expected boolean"),
    }
}

/// Rapport CSV : header `id,type,severity,status,employee,bureau_id,date,shift_ids,description`
pub fn write_conflicts_csv<W: Write>(out: W, conflicts: &[Conflict]) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_writer(out);
    w.write_record([
        "id",
        "type",
        "severity",
        "status",
        "employee",
        "bureau_id",
        "date",
        "shift_ids",
        "description",
    ])?;
    for c in conflicts {
        let employee = c
            .employee_name
            .as_deref()
            .or(c.employee_id.as_ref().map(EmployeeId::as_str))
            .unwrap_or("");
        let shift_ids = c
            .affected_shift_ids
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let date = c.date.to_string();
        w.write_record([
            c.id.as_str(),
            c.kind.label(),
            c.severity.as_str(),
            c.status.as_str(),
            employee,
            c.bureau_id.as_ref().map_or("", BureauId::as_str),
            date.as_str(),
            shift_ids.as_str(),
            c.description.as_str(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_conflicts_csv<P: AsRef<Path>>(path: P, conflicts: &[Conflict]) -> anyhow::Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_conflicts_csv(file, conflicts)
}
