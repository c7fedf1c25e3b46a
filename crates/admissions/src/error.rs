use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::admissions::{
    AdmissionServiceError, CatalogError, EnrollmentError, LifecycleError, RepositoryError,
};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Admission(AdmissionServiceError),
    Catalog(CatalogError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Admission(err) => write!(f, "admission workflow error: {}", err),
            AppError::Catalog(err) => write!(f, "period catalog error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Admission(err) => Some(err),
            AppError::Catalog(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Admission(AdmissionServiceError::Lifecycle(LifecycleError::Guard(_))) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Admission(AdmissionServiceError::Lifecycle(_)) => StatusCode::CONFLICT,
            AppError::Admission(AdmissionServiceError::Repository(RepositoryError::NotFound)) => {
                StatusCode::NOT_FOUND
            }
            AppError::Admission(AdmissionServiceError::Repository(RepositoryError::Conflict)) => {
                StatusCode::CONFLICT
            }
            AppError::Admission(AdmissionServiceError::Enrollment(
                EnrollmentError::UnknownPeriod(_),
            )) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Catalog(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Admission(_)
            | AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<AdmissionServiceError> for AppError {
    fn from(value: AdmissionServiceError) -> Self {
        Self::Admission(value)
    }
}

impl From<CatalogError> for AppError {
    fn from(value: CatalogError) -> Self {
        Self::Catalog(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::admissions::{
        ActionKind, AdmissionRequestId, AdmissionState, GuardViolation, PeriodId,
    };

    #[test]
    fn admission_errors_map_to_client_statuses() {
        let invalid = AppError::from(AdmissionServiceError::from(
            LifecycleError::InvalidTransition {
                state: AdmissionState::Rejected,
                action: ActionKind::Schedule,
            },
        ));
        assert_eq!(invalid.into_response().status(), StatusCode::CONFLICT);

        let guard = AppError::from(AdmissionServiceError::from(LifecycleError::from(
            GuardViolation::EmptySlotList,
        )));
        assert_eq!(
            guard.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let missing = AppError::from(AdmissionServiceError::from(RepositoryError::NotFound));
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let enrolled = AppError::from(AdmissionServiceError::from(
            LifecycleError::AlreadyEnrolled(AdmissionRequestId("adm-1".to_string())),
        ));
        assert!(enrolled.to_string().contains("already enrolled"));
    }

    #[test]
    fn collaborator_errors_map_to_statuses() {
        let conflict = AppError::from(AdmissionServiceError::from(RepositoryError::Conflict));
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);

        let unknown = AppError::from(AdmissionServiceError::from(
            EnrollmentError::UnknownPeriod(PeriodId("2031".to_string())),
        ));
        assert_eq!(
            unknown.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let offline = AppError::from(AdmissionServiceError::from(
            RepositoryError::Unavailable("database offline".to_string()),
        ));
        assert_eq!(
            offline.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let catalog = AppError::from(CatalogError::Unavailable("feed down".to_string()));
        assert_eq!(
            catalog.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
