//! HTTP routes of the catalog

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use super::CatalogState;
use super::registration::{DeviceRegistration, ServiceRegistration, UserRegistration};
use crate::Error;

/// Build the catalog router
pub fn router(state: Arc<CatalogState>) -> Router {
    Router::new()
        .route("/catalog/devices", post(register_device))
        .route("/catalog/devices/{id}", get(get_devices))
        .route("/catalog/services", post(register_service))
        .route("/catalog/services/{id}", get(get_services))
        .route("/catalog/users", post(register_user))
        .route("/catalog/users/{id}", get(get_users))
        .route("/catalog/broker", get(broker_info))
        .with_state(state)
}

/// Map an error onto a status and a JSON body.
/// Storage failures come back as a generic message, validation failures
/// carry the reason.
fn error_response(err: &Error) -> Response {
    let (status, message) = match err {
        Error::Validation(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
        Error::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
        _ => (
            StatusCode::BAD_REQUEST,
            "something went wrong while updating the catalog".to_string(),
        ),
    };
    (status, axum::Json(json!({ "error": message }))).into_response()
}

async fn register_device(
    State(state): State<Arc<CatalogState>>,
    axum::Json(payload): axum::Json<serde_json::Value>,
) -> Response {
    let registration = match DeviceRegistration::parse(&payload) {
        Ok(registration) => registration,
        Err(e) => return error_response(&e),
    };

    let device = registration.into_device(Utc::now().timestamp());
    let device_id = device.device_id.clone();
    if let Err(e) = state.devices.upsert(&device) {
        return error_response(&e);
    }

    debug!(device = %device_id, "device registered");
    axum::Json(json!({ "device": "added" })).into_response()
}

async fn get_devices(State(state): State<Arc<CatalogState>>, Path(id): Path<String>) -> Response {
    if id == "all" {
        return match state.devices.list_all() {
            Ok(devices) if devices.is_empty() => {
                error_response(&Error::NotFound("devices".to_string()))
            }
            Ok(devices) => axum::Json(devices).into_response(),
            Err(e) => error_response(&e),
        };
    }

    match state.devices.find(&id) {
        Ok(Some(device)) => axum::Json(device).into_response(),
        Ok(None) => error_response(&Error::NotFound("devices".to_string())),
        Err(e) => error_response(&e),
    }
}

async fn register_service(
    State(state): State<Arc<CatalogState>>,
    axum::Json(payload): axum::Json<serde_json::Value>,
) -> Response {
    let registration = match ServiceRegistration::parse(&payload) {
        Ok(registration) => registration,
        Err(e) => return error_response(&e),
    };

    let record = registration.into_record(Utc::now().timestamp());
    let service_id = record.service_id.clone();
    if let Err(e) = state.services.upsert(&record) {
        return error_response(&e);
    }

    debug!(service = %service_id, "service registered");
    axum::Json(json!({ "service": "added" })).into_response()
}

async fn get_services(State(state): State<Arc<CatalogState>>, Path(id): Path<String>) -> Response {
    if id == "all" {
        return match state.services.list_all() {
            Ok(services) if services.is_empty() => {
                error_response(&Error::NotFound("services".to_string()))
            }
            Ok(services) => axum::Json(services).into_response(),
            Err(e) => error_response(&e),
        };
    }

    match state.services.find(&id) {
        Ok(Some(service)) => axum::Json(service).into_response(),
        Ok(None) => error_response(&Error::NotFound("services".to_string())),
        Err(e) => error_response(&e),
    }
}

async fn register_user(
    State(state): State<Arc<CatalogState>>,
    axum::Json(payload): axum::Json<serde_json::Value>,
) -> Response {
    let registration = match UserRegistration::parse(&payload) {
        Ok(registration) => registration,
        Err(e) => return error_response(&e),
    };

    let user = registration.into_user();
    let user_id = user.user_id.clone();
    if let Err(e) = state.users.upsert(&user) {
        return error_response(&e);
    }

    debug!(user = %user_id, "user registered");
    axum::Json(json!({ "user": "added" })).into_response()
}

async fn get_users(State(state): State<Arc<CatalogState>>, Path(id): Path<String>) -> Response {
    if id == "all" {
        return match state.users.list_all() {
            Ok(users) if users.is_empty() => error_response(&Error::NotFound("users".to_string())),
            Ok(users) => axum::Json(users).into_response(),
            Err(e) => error_response(&e),
        };
    }

    match state.users.find(&id) {
        Ok(Some(user)) => axum::Json(user).into_response(),
        Ok(None) => error_response(&Error::NotFound("users".to_string())),
        Err(e) => error_response(&e),
    }
}

/// Broker the testbed is coordinated on, for clients that bootstrap over HTTP
async fn broker_info(State(state): State<Arc<CatalogState>>) -> Response {
    axum::Json(&state.broker).into_response()
}
