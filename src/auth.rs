use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;

use crate::error::ApiError;
use crate::settings::Settings;

/// Admin-only activity operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOperation {
    Create,
    Update,
    Remove,
}

impl AdminOperation {
    fn as_str(self) -> &'static str {
        match self {
            AdminOperation::Create => "create activities",
            AdminOperation::Update => "update activities",
            AdminOperation::Remove => "remove activities",
        }
    }
}

/// Checks the admin token for `operation`. The header wins over the `token`
/// query parameter when both are present.
pub fn verify_token(
    settings: &Settings,
    operation: AdminOperation,
    auth: Option<Authorization<Bearer>>,
    query_token: Option<&str>,
) -> Result<(), ApiError> {
    let authorized = match (&auth, query_token) {
        (Some(header), _) => tokens_match(header.token(), &settings.auth_token),
        (None, Some(token)) => tokens_match(token, &settings.auth_token),
        (None, None) => false,
    };

    if authorized {
        Ok(())
    } else {
        tracing::debug!(operation = operation.as_str(), "rejected admin token");
        Err(ApiError::Unauthorized(format!(
            "A valid admin token is required to {}",
            operation.as_str()
        )))
    }
}

/// Compares every byte regardless of where the first mismatch is.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let (provided, expected) = (provided.as_bytes(), expected.as_bytes());
    provided.len() == expected.len()
        && provided
            .iter()
            .zip(expected)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}
