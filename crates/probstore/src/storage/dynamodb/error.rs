//! DynamoDB error mapping.
//!
//! Maps AWS SDK errors to `RepositoryError` from `probstore_core::storage`.

use std::fmt::Debug;

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use probstore_core::storage::RepositoryError;

/// Error codes DynamoDB documents as safe to retry.
const TRANSIENT_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "ThrottlingException",
    "InternalServerError",
    "ServiceUnavailable",
];

/// Map any DynamoDB SDK error to RepositoryError.
///
/// Timeouts, dispatch failures, throttling and 5xx responses are transient;
/// everything else fails the operation.
pub fn map_sdk_error<E>(err: SdkError<E>, operation: &'static str) -> RepositoryError
where
    E: ProvideErrorMetadata + Debug,
{
    match &err {
        SdkError::TimeoutError(_) => {
            return RepositoryError::Transient(format!("{} timed out", operation));
        }
        SdkError::DispatchFailure(_) => {
            return RepositoryError::Transient(format!("{} connection error: {:?}", operation, err));
        }
        SdkError::ConstructionFailure(_) => {
            return RepositoryError::ConnectionFailed(format!(
                "{} could not be constructed: {:?}",
                operation, err
            ));
        }
        _ => {}
    }

    let code = err.code();
    let status = match &err {
        SdkError::ServiceError(service_err) => Some(service_err.raw().status().as_u16()),
        _ => None,
    };

    if code.is_some_and(|c| TRANSIENT_CODES.contains(&c))
        || matches!(status, Some(429 | 500 | 502 | 503 | 504))
    {
        return RepositoryError::Transient(format!(
            "{} failed with {} (HTTP {:?})",
            operation,
            code.unwrap_or("unknown error"),
            status
        ));
    }

    match code {
        Some("ResourceNotFoundException") => {
            RepositoryError::QueryFailed(format!("{} failed: table not found", operation))
        }
        _ => RepositoryError::QueryFailed(format!("{} failed: {:?}", operation, err)),
    }
}

/// Check if a PutItem error is a conditional check failure
pub fn is_put_conditional_check_failed(err: &SdkError<PutItemError>) -> bool {
    match err {
        SdkError::ServiceError(service_err) => matches!(
            service_err.err(),
            PutItemError::ConditionalCheckFailedException(_)
        ),
        _ => false,
    }
}

/// Check if an UpdateItem error is a conditional check failure
pub fn is_update_conditional_check_failed(err: &SdkError<UpdateItemError>) -> bool {
    match err {
        SdkError::ServiceError(service_err) => matches!(
            service_err.err(),
            UpdateItemError::ConditionalCheckFailedException(_)
        ),
        _ => false,
    }
}

/// Map a build error from a request builder to RepositoryError.
pub fn map_build_error(err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Serialization(format!("Invalid request: {}", err))
}
