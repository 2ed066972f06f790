use serde_json::{json, Value};
use thiserror::Error;

use super::common::{db_error_kind, DomainError};
use super::ErrorKind;

/// Durable broker errors
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Failed to encode or decode message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message {0} not found")]
    MessageNotFound(i64),

    /// The lease ran out and the message was reclaimed or settled elsewhere.
    #[error("Lease on message {0} was lost")]
    LeaseLost(i64),

    #[error("Broker storage error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl DomainError for BrokerError {
    fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::Serialization(_) => ErrorKind::InvalidInput,
            BrokerError::MessageNotFound(_) => ErrorKind::NotFound,
            BrokerError::LeaseLost(_) => ErrorKind::Conflict,
            BrokerError::Database(err) => match db_error_kind(err) {
                ErrorKind::Internal => ErrorKind::Transient,
                other => other,
            },
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            BrokerError::Serialization(_) => "MESSAGE_MALFORMED",
            BrokerError::MessageNotFound(_) => "MESSAGE_NOT_FOUND",
            BrokerError::LeaseLost(_) => "MESSAGE_LEASE_LOST",
            BrokerError::Database(_) => "BROKER_UNAVAILABLE",
        }
    }

    fn details(&self) -> Value {
        match self {
            BrokerError::MessageNotFound(id) | BrokerError::LeaseLost(id) => json!({ "message_id": id }),
            _ => Value::Null,
        }
    }
}
