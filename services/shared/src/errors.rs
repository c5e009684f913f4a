/// Shared error types for the referral payout services
///
/// Design Philosophy:
/// - Standardized error codes so every aborted payout is logged the same way
/// - Categorized by error domain (Configuration, Chain, Reconciliation)
/// - Includes context fields for debugging (error_code, message, context)
///
/// Usage:
/// - Recoverable payout aborts (the claim is released and a later run may
///   succeed) are described with a ServiceError and logged with its code
/// - Error codes follow pattern: <CATEGORY>_<SPECIFIC>_<DETAIL>
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error categories that map to logging severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Deployment misconfiguration (missing chain, contract, key or settings)
    /// Fixed by an operator, retried on the next trigger
    Configuration,

    /// Chain/RPC errors
    /// Balance reads, contract calls or transaction submission failed
    Chain,

    /// Chain and database disagree about a payout
    /// Needs a human before the referral can be retried
    Reconciliation,
}

impl ErrorCategory {
    /// Map error category to log level
    pub fn log_level(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "warn",
            ErrorCategory::Chain => "warn",
            ErrorCategory::Reconciliation => "error",
        }
    }
}

/// Standard error codes used across all services
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    // Configuration errors
    pub const CONFIG_CHAIN_NOT_FOUND: ErrorCode = ErrorCode("CONFIG_CHAIN_NOT_FOUND");
    pub const CONFIG_CONTRACT_UNSET: ErrorCode = ErrorCode("CONFIG_CONTRACT_UNSET");
    pub const CONFIG_REWARDS_INVALID: ErrorCode = ErrorCode("CONFIG_REWARDS_INVALID");
    pub const CONFIG_OPERATOR_KEY_MISSING: ErrorCode = ErrorCode("CONFIG_OPERATOR_KEY_MISSING");

    // Chain errors
    pub const CHAIN_CLIENT_UNAVAILABLE: ErrorCode = ErrorCode("CHAIN_CLIENT_UNAVAILABLE");
    pub const CHAIN_INSUFFICIENT_BALANCE: ErrorCode = ErrorCode("CHAIN_INSUFFICIENT_BALANCE");
    pub const CHAIN_ID_MISMATCH: ErrorCode = ErrorCode("CHAIN_ID_MISMATCH");
    pub const CHAIN_SUBMISSION_FAILED: ErrorCode = ErrorCode("CHAIN_SUBMISSION_FAILED");

    // Reconciliation errors
    pub const CHAIN_ALREADY_PAID: ErrorCode = ErrorCode("CHAIN_ALREADY_PAID");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Standardized error structure used across all services
///
/// This provides consistent error reporting with:
/// - Structured error codes for programmatic handling
/// - Human-readable messages
/// - Optional context for debugging
/// - Category-based classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceError {
    /// Error category (determines log level)
    pub category: ErrorCategory,

    /// Structured error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context (e.g., chain ids, addresses, amounts)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ServiceError {
    /// Create a new ServiceError
    pub fn new(category: ErrorCategory, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.as_str().to_string(),
            message: message.into(),
            context: None,
        }
    }

    /// Add context to an error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn is(&self, code: &ErrorCode) -> bool {
        self.code == code.as_str()
    }

    // Configuration error constructors
    pub fn chain_not_found(chain_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Configuration,
            ErrorCode::CONFIG_CHAIN_NOT_FOUND,
            format!("Chain configuration not found: {}", chain_id),
        )
    }

    pub fn contract_unset(chain_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Configuration,
            ErrorCode::CONFIG_CONTRACT_UNSET,
            "Referral payout contract address is not configured",
        )
        .with_context(format!("chain: {}", chain_id))
    }

    pub fn rewards_invalid() -> Self {
        Self::new(
            ErrorCategory::Configuration,
            ErrorCode::CONFIG_REWARDS_INVALID,
            "Referral reward amounts are missing or not positive",
        )
    }

    pub fn operator_key_missing() -> Self {
        Self::new(
            ErrorCategory::Configuration,
            ErrorCode::CONFIG_OPERATOR_KEY_MISSING,
            "Payout operator private key is not configured",
        )
    }

    // Chain error constructors
    pub fn chain_client_unavailable(error: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Chain,
            ErrorCode::CHAIN_CLIENT_UNAVAILABLE,
            "Could not construct chain client",
        )
        .with_context(error.to_string())
    }

    pub fn insufficient_balance(required: impl fmt::Display, available: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Chain,
            ErrorCode::CHAIN_INSUFFICIENT_BALANCE,
            "Insufficient operator balance",
        )
        .with_context(format!("required: {}, available: {}", required, available))
    }

    pub fn chain_id_mismatch(expected: u64, reported: u64) -> Self {
        Self::new(
            ErrorCategory::Chain,
            ErrorCode::CHAIN_ID_MISMATCH,
            "RPC endpoint serves a different chain than configured",
        )
        .with_context(format!("expected: {}, reported: {}", expected, reported))
    }

    pub fn submission_failed(error: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Chain,
            ErrorCode::CHAIN_SUBMISSION_FAILED,
            "Reward transaction submission failed",
        )
        .with_context(error.to_string())
    }

    // Reconciliation error constructors
    pub fn already_paid_on_chain(referrer: impl fmt::Display, referee: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Reconciliation,
            ErrorCode::CHAIN_ALREADY_PAID,
            "Payout contract reports this pair as already paid",
        )
        .with_context(format!("referrer: {}, referee: {}", referrer, referee))
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "[{}] {}: {}", self.code, self.message, context)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}

impl std::error::Error for ServiceError {}
