//! API REST (axum) au-dessus de [`Engine`].
//!
//! Les erreurs sont rendues en `{"error": "..."}` : 400 validation, 404 inconnu,
//! 409 transition interdite, 500 sinon.

use crate::conflict::{Conflict, ConflictId, ConflictStatus, Severity};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::lifecycle::{Action, ConflictQuery};
use crate::model::{Bureau, BureauId, Employee, EmployeeId, Role, Shift, ShiftId};
use crate::stats::StatsEnvelope;
use crate::store::{EmployeeFilter, NewShift, ShiftFilter, ShiftMove};
use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

#[derive(Debug)]
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(EngineError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
            EngineError::Evaluation(_) | EngineError::Storage(_) | EngineError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn present(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_date(raw: Option<String>, name: &str) -> ApiResult<Option<NaiveDate>> {
    present(raw)
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|_| ApiError::from(EngineError::validation(format!("{name} must be YYYY-MM-DD, got {s}"))))
        })
        .transpose()
}

// -- conflits ------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ConflictParams {
    status: Option<String>,
    severity: Option<String>,
    limit: Option<String>,
}

impl TryFrom<ConflictParams> for ConflictQuery {
    type Error = ApiError;

    fn try_from(p: ConflictParams) -> ApiResult<Self> {
        let status = present(p.status)
            .map(|s| {
                ConflictStatus::parse(&s)
                    .ok_or_else(|| EngineError::validation(format!("unknown status {s}")))
            })
            .transpose()?;
        let severity = present(p.severity)
            .map(|s| Severity::parse(&s).ok_or_else(|| EngineError::validation(format!("unknown severity {s}"))))
            .transpose()?;
        let limit = present(p.limit)
            .map(|s| {
                s.parse::<usize>()
                    .map_err(|_| EngineError::validation(format!("limit must be a positive integer, got {s}")))
            })
            .transpose()?;
        Ok(ConflictQuery {
            status,
            severity,
            limit,
        })
    }
}

#[derive(Debug, Serialize)]
struct ConflictList {
    conflicts: Vec<Conflict>,
}

#[derive(Debug, Deserialize)]
struct ActionBody {
    action: Action,
}

async fn list_conflicts(
    State(engine): State<Engine>,
    Query(params): Query<ConflictParams>,
) -> ApiResult<Json<ConflictList>> {
    let query = ConflictQuery::try_from(params)?;
    Ok(Json(ConflictList {
        conflicts: engine.list_conflicts(&query).await,
    }))
}

async fn get_conflict(State(engine): State<Engine>, Path(id): Path<String>) -> ApiResult<Json<Conflict>> {
    Ok(Json(engine.conflict(&ConflictId::new(id)).await?))
}

async fn patch_conflict(
    State(engine): State<Engine>,
    Path(id): Path<String>,
    body: Result<Json<ActionBody>, JsonRejection>,
) -> ApiResult<Json<Conflict>> {
    let Json(body) = body?;
    let conflict = engine.transition(&ConflictId::new(id), body.action).await?;
    Ok(Json(conflict))
}

async fn dismiss_conflict(State(engine): State<Engine>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    engine.dismiss(&ConflictId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- shifts ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ShiftParams {
    start_date: Option<String>,
    end_date: Option<String>,
    bureau_id: Option<String>,
    employee_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpcomingParams {
    days: Option<String>,
}

#[derive(Debug, Serialize)]
struct ShiftList {
    shifts: Vec<Shift>,
}

async fn list_shifts(
    State(engine): State<Engine>,
    Query(p): Query<ShiftParams>,
) -> ApiResult<Json<ShiftList>> {
    let filter = ShiftFilter {
        start_date: parse_date(p.start_date, "start_date")?,
        end_date: parse_date(p.end_date, "end_date")?,
        bureau_id: present(p.bureau_id).map(BureauId::new),
        employee_id: present(p.employee_id).map(EmployeeId::new),
    };
    Ok(Json(ShiftList {
        shifts: engine.list_shifts(&filter).await,
    }))
}

async fn upcoming_shifts(
    State(engine): State<Engine>,
    Query(p): Query<UpcomingParams>,
) -> ApiResult<Json<ShiftList>> {
    let days = present(p.days)
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| EngineError::validation(format!("days must be a positive integer, got {s}")))
        })
        .transpose()?
        .unwrap_or(crate::stats::UPCOMING_DAYS);
    Ok(Json(ShiftList {
        shifts: engine.upcoming_shifts(Utc::now(), days).await,
    }))
}

async fn get_shift(State(engine): State<Engine>, Path(id): Path<String>) -> ApiResult<Json<Shift>> {
    Ok(Json(engine.shift(&ShiftId::new(id)).await?))
}

// La réévaluation continue en tâche de fond ; le handle est relâché.
async fn create_shift(
    State(engine): State<Engine>,
    body: Result<Json<NewShift>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Shift>)> {
    let Json(new) = body?;
    let (shift, _pending) = engine.create_shift(new).await?;
    Ok((StatusCode::CREATED, Json(shift)))
}

async fn update_shift(
    State(engine): State<Engine>,
    Path(id): Path<String>,
    body: Result<Json<NewShift>, JsonRejection>,
) -> ApiResult<Json<Shift>> {
    let Json(new) = body?;
    let (shift, _pending) = engine.update_shift(&ShiftId::new(id), new).await?;
    Ok(Json(shift))
}

async fn move_shift(
    State(engine): State<Engine>,
    Path(id): Path<String>,
    body: Result<Json<ShiftMove>, JsonRejection>,
) -> ApiResult<Json<Shift>> {
    let Json(mv) = body?;
    let (shift, _pending) = engine.move_shift(&ShiftId::new(id), mv).await?;
    Ok(Json(shift))
}

async fn delete_shift(State(engine): State<Engine>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    engine.delete_shift(&ShiftId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- employés et bureaux --------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EmployeeParams {
    bureau: Option<String>,
    role: Option<String>,
    status: Option<String>,
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewEmployee {
    #[serde(default)]
    id: Option<EmployeeId>,
    full_name: String,
    bureau_id: BureauId,
    role: Role,
    weekly_hour_cap: u32,
    #[serde(default)]
    active: Option<bool>,
}

impl NewEmployee {
    fn into_employee(self) -> Employee {
        let mut employee = Employee::new(self.full_name, self.bureau_id, self.role, self.weekly_hour_cap);
        if let Some(id) = self.id {
            employee = employee.with_id(id);
        }
        employee.active = self.active.unwrap_or(true);
        employee
    }
}

#[derive(Debug, Serialize)]
struct EmployeeList {
    employees: Vec<Employee>,
}

#[derive(Debug, Serialize)]
struct EmployeeEnvelope {
    employee: Employee,
}

#[derive(Debug, Serialize)]
struct BureauList {
    bureaus: Vec<Bureau>,
}

async fn list_employees(
    State(engine): State<Engine>,
    Query(p): Query<EmployeeParams>,
) -> ApiResult<Json<EmployeeList>> {
    let role = present(p.role)
        .map(|r| Role::parse(&r).ok_or_else(|| EngineError::validation(format!("unknown role {r}"))))
        .transpose()?;
    let status = present(p.status);
    if let Some(s) = status.as_deref() {
        if s != "active" && s != "inactive" {
            return Err(EngineError::validation(format!("status must be active or inactive, got {s}")).into());
        }
    }
    let filter = EmployeeFilter {
        bureau: present(p.bureau).map(BureauId::new),
        role,
        status,
        search: present(p.search),
    };
    Ok(Json(EmployeeList {
        employees: engine.list_employees(&filter).await,
    }))
}

async fn get_employee(
    State(engine): State<Engine>,
    Path(id): Path<String>,
) -> ApiResult<Json<EmployeeEnvelope>> {
    let employee = engine.employee(&EmployeeId::new(id)).await?;
    Ok(Json(EmployeeEnvelope { employee }))
}

async fn upsert_employee(
    State(engine): State<Engine>,
    body: Result<Json<NewEmployee>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<EmployeeEnvelope>)> {
    let Json(new) = body?;
    let (employee, _pending) = engine.upsert_employee(new.into_employee()).await?;
    Ok((StatusCode::CREATED, Json(EmployeeEnvelope { employee })))
}

/// Remplace (ou crée) l'employé à l'id du chemin ; un `id` contradictoire dans le corps est refusé.
async fn put_employee(
    State(engine): State<Engine>,
    Path(id): Path<String>,
    body: Result<Json<NewEmployee>, JsonRejection>,
) -> ApiResult<Json<EmployeeEnvelope>> {
    let Json(mut new) = body?;
    let id = EmployeeId::new(id);
    if let Some(other) = new.id.as_ref().filter(|other| **other != id) {
        return Err(EngineError::validation(format!("body id {other} does not match path id {id}")).into());
    }
    new.id = Some(id);
    let (employee, _pending) = engine.upsert_employee(new.into_employee()).await?;
    Ok(Json(EmployeeEnvelope { employee }))
}

async fn list_bureaus(State(engine): State<Engine>) -> Json<BureauList> {
    Json(BureauList {
        bureaus: engine.bureaus().await,
    })
}

async fn add_bureau(
    State(engine): State<Engine>,
    body: Result<Json<Bureau>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Bureau>)> {
    let Json(bureau) = body?;
    Ok((StatusCode::CREATED, Json(engine.add_bureau(bureau).await?)))
}

async fn dashboard_stats(State(engine): State<Engine>) -> Json<StatsEnvelope> {
    Json(StatsEnvelope {
        stats: engine.stats(Utc::now()).await,
    })
}

pub fn router(engine: Engine) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/api/conflicts", get(list_conflicts))
        .route(
            "/api/conflicts/:id",
            get(get_conflict).patch(patch_conflict).delete(dismiss_conflict),
        )
        .route("/api/shifts", get(list_shifts).post(create_shift))
        .route("/api/shifts/upcoming", get(upcoming_shifts))
        .route(
            "/api/shifts/:id",
            get(get_shift).put(update_shift).patch(move_shift).delete(delete_shift),
        )
        .route("/api/employees", get(list_employees).post(upsert_employee))
        .route("/api/employees/:id", get(get_employee).put(put_employee))
        .route("/api/bureaus", get(list_bureaus).post(add_bureau))
        .route("/api/dashboard/stats", get(dashboard_stats))
        .with_state(engine)
        .layer(cors)
}

/// Sert l'API sur `listener` jusqu'à ce que `shutdown` se termine.
pub async fn serve<F>(engine: Engine, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("reading listener address")?;
    info!(%addr, "REST API listening");
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown)
        .await
        .context("REST API server failed")?;
    info!("REST API stopped");
    Ok(())
}
