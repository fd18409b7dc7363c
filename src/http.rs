//! HTTP surface: thin axum handlers over the repository and the batch
//! ingestion pipeline. Input validation happens here, before anything
//! touches storage.

use crate::db::{self, PatchOutcome, Pool, StorageError};
use crate::ingest::{self, BatchOutcome};
use crate::lookup::LookupService;
use crate::model::{Filter, VehiclePatch, VehicleWithOwner, YearRange};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub lookup: Arc<dyn LookupService>,
    pub unique_reg_num: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/car/add", post(add_cars))
        .route("/cars", get(get_cars))
        .route("/car/patch/:id", patch(patch_car))
        .route("/car/delete/:id", delete(delete_car))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_json(message: impl Into<String>) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: message.into(),
    })
}

fn storage_error(err: StorageError, message: &str) -> Response {
    match err {
        StorageError::NotFound => (
            StatusCode::NOT_FOUND,
            error_json("car with this id was not found"),
        )
            .into_response(),
        StorageError::Conflict(_) => {
            (StatusCode::CONFLICT, error_json(err.to_string())).into_response()
        }
        StorageError::Unavailable(_) => {
            error!(%err, "storage operation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, error_json(message)).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddRequest {
    reg_nums: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AddResponse {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed_cars: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
    cars_id: Vec<i64>,
}

async fn add_cars(
    State(state): State<AppState>,
    body: Result<Json<AddRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            error_json("failed to decode request body"),
        )
            .into_response();
    };

    let report = ingest::ingest_registrations(
        &state.pool,
        state.lookup.as_ref(),
        &req.reg_nums,
        state.unique_reg_num,
    )
    .await;

    let cars_id: Vec<i64> = report.created.iter().map(|c| c.id).collect();
    match report.outcome() {
        BatchOutcome::FullSuccess => (
            StatusCode::CREATED,
            Json(AddResponse {
                failed_cars: Vec::new(),
                errors: Vec::new(),
                cars_id,
            }),
        )
            .into_response(),
        BatchOutcome::Partial => (
            StatusCode::PARTIAL_CONTENT,
            Json(AddResponse {
                failed_cars: report.failed.iter().map(|f| f.reg_num.clone()).collect(),
                errors: report.failed.iter().map(|f| f.message.clone()).collect(),
                cars_id,
            }),
        )
            .into_response(),
        BatchOutcome::TotalFailure { status } => {
            let status =
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, error_json("failed to add cars")).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    page_size: Option<i64>,
    page_token: Option<i64>,
    year: Option<String>,
    reg_num: Option<String>,
    model: Option<String>,
    mark: Option<String>,
    name: Option<String>,
    surname: Option<String>,
    patronymic: Option<String>,
}

#[derive(Debug, Serialize)]
struct PageInfo {
    total: i64,
    page: i64,
    last_page: i64,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    car_with_owner: Vec<VehicleWithOwner>,
    info: PageInfo,
}

async fn get_cars(State(state): State<AppState>, Query(params): Query<ListParams>) -> Response {
    let page_size = params.page_size.unwrap_or(100);
    if page_size < 1 {
        return (
            StatusCode::BAD_REQUEST,
            error_json("incorrect page_size, page_size must be greater than 0"),
        )
            .into_response();
    }
    let page_token = params.page_token.unwrap_or(1);
    if page_token < 1 {
        return (
            StatusCode::BAD_REQUEST,
            error_json("incorrect page_token, page_token must be greater than 0"),
        )
            .into_response();
    }

    // Empty query values mean "no predicate", same as an absent parameter.
    let year = match params
        .year
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(YearRange::parse)
        .transpose()
    {
        Ok(year) => year,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, error_json(err.to_string())).into_response()
        }
    };
    let filter = Filter {
        year,
        reg_num: non_empty(params.reg_num),
        mark: non_empty(params.mark),
        model: non_empty(params.model),
        name: non_empty(params.name),
        surname: non_empty(params.surname),
        patronymic: non_empty(params.patronymic),
    };

    let cars = match db::list_vehicles(&state.pool, page_size, page_token, &filter).await {
        Ok(cars) => cars,
        Err(err) => return storage_error(err, "failed to get cars. Try later"),
    };
    let total = match db::count_vehicles(&state.pool, &filter).await {
        Ok(total) => total,
        Err(err) => return storage_error(err, "failed to get cars. Try later"),
    };

    (
        StatusCode::OK,
        Json(ListResponse {
            car_with_owner: cars,
            info: PageInfo {
                total,
                page: page_token,
                last_page: last_page(total, page_size),
            },
        }),
    )
        .into_response()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// `ceil(total / page_size)` without the `total + page_size - 1`
/// intermediate, which overflows for request-supplied page sizes near
/// `i64::MAX`. Callers guarantee `page_size >= 1` and `total >= 0`.
fn last_page(total: i64, page_size: i64) -> i64 {
    if total == 0 {
        0
    } else {
        (total - 1) / page_size + 1
    }
}

async fn patch_car(
    State(state): State<AppState>,
    Path(car_id): Path<i64>,
    body: Result<Json<VehiclePatch>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            error_json("failed to decode request body"),
        )
            .into_response();
    };

    match db::patch_vehicle(&state.pool, car_id, &req).await {
        Ok(PatchOutcome::Updated) => StatusCode::OK.into_response(),
        Ok(PatchOutcome::NoChange) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => storage_error(err, "failed to patch car"),
    }
}

async fn delete_car(State(state): State<AppState>, Path(car_id): Path<i64>) -> Response {
    match db::delete_vehicle(&state.pool, car_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => storage_error(err, "failed to delete car"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_page_rounds_up() {
        assert_eq!(last_page(0, 100), 0);
        assert_eq!(last_page(1, 100), 1);
        assert_eq!(last_page(100, 100), 1);
        assert_eq!(last_page(101, 100), 2);
        assert_eq!(last_page(7, 3), 3);
    }

    #[test]
    fn last_page_handles_extreme_page_sizes() {
        assert_eq!(last_page(7, i64::MAX), 1);
        assert_eq!(last_page(i64::MAX, 1), i64::MAX);
        assert_eq!(last_page(i64::MAX, i64::MAX), 1);
    }
}
