use db::RepositoryError;
use thiserror::Error;
use utils::response::FieldError;

/// Error returned by every domain service.
///
/// Each variant carries a stable machine-readable `code` and a
/// human-readable (Russian) message; the HTTP layer maps variants to
/// status codes.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<FieldError>,
    },
    #[error("{message}")]
    Unauthorized { code: &'static str, message: String },
    #[error("{message}")]
    Forbidden { code: &'static str, message: String },
    #[error("{message}")]
    NotFound { code: &'static str, message: String },
    #[error("{message}")]
    Conflict { code: &'static str, message: String },
    #[error("{message}")]
    Unprocessable { code: &'static str, message: String },
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl ServiceError {
    pub fn validation(details: Vec<FieldError>) -> Self {
        Self::Validation {
            message: "Ошибка валидации данных".to_string(),
            details,
        }
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: message.into(),
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn unprocessable(code: &'static str, message: impl Into<String>) -> Self {
        Self::Unprocessable {
            code,
            message: message.into(),
        }
    }

    pub fn insufficient_permissions() -> Self {
        Self::forbidden(
            "INSUFFICIENT_PERMISSIONS",
            "Недостаточно прав для выполнения операции",
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Unauthorized { code, .. }
            | Self::Forbidden { code, .. }
            | Self::NotFound { code, .. }
            | Self::Conflict { code, .. }
            | Self::Unprocessable { code, .. } => code,
            Self::Internal(_) | Self::Repository(_) => "INTERNAL_ERROR",
        }
    }

    pub fn details(&self) -> &[FieldError] {
        match self {
            Self::Validation { details, .. } => details,
            _ => &[],
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::not_found("NOT_FOUND", "Запись не найдена"),
            RepositoryError::Conflict(constraint) => {
                tracing::debug!(%constraint, "unique constraint violated");
                Self::conflict("CONFLICT", "Запись уже существует")
            }
            other => Self::Repository(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            ServiceError::validation(vec![FieldError::new("name", "x")]).code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            ServiceError::conflict("COLUMN_TITLE_EXISTS", "dup").code(),
            "COLUMN_TITLE_EXISTS"
        );
        assert_eq!(ServiceError::insufficient_permissions().code(), "INSUFFICIENT_PERMISSIONS");
        assert_eq!(ServiceError::Internal("boom".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_repository_errors_map_to_domain_errors() {
        let err: ServiceError = RepositoryError::NotFound.into();
        assert!(matches!(err, ServiceError::NotFound { .. }));

        let err: ServiceError = RepositoryError::Conflict("users_email_live_key".into()).into();
        assert!(matches!(err, ServiceError::Conflict { code: "CONFLICT", .. }));
    }

    #[test]
    fn test_details_only_for_validation() {
        let err = ServiceError::validation(vec![FieldError::new("title", "required")]);
        assert_eq!(err.details().len(), 1);
        assert!(ServiceError::not_found("X", "y").details().is_empty());
    }
}
