//! Centralized Error Handling Module
//!
//! Every hard failure carries a unique code so logs can be filtered by category.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - RPC_xxx: chain reader errors
//! - CFG_xxx: configuration errors
//! - DB_xxx: rug database errors
//! - MARKET_xxx: market statistics errors
//!
//! Public operations report expected failure modes (RPC outage, pair mismatch,
//! missing code) through result objects. Inside, providers classify failures
//! with these codes: the RPC client retries only retryable codes, and the market
//! check tells an unknown pair apart from an unreachable API. Invalid
//! configuration and rug database I/O surface directly as `AppError`.

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // RPC Errors
    // ============================================
    /// RPC connection failed
    RpcConnectionFailed,
    /// RPC request timeout
    RpcTimeout,
    /// RPC rate limited (HTTP 429)
    RpcRateLimited,
    /// RPC returned error response
    RpcError,
    /// No RPC endpoints configured
    RpcNoEndpoints,
    /// Invalid RPC response (bad hex, bad ABI)
    RpcInvalidResponse,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Invalid configuration value
    ConfigInvalidValue,
    /// Unsupported chain ID
    ConfigUnsupportedChain,

    // ============================================
    // Rug Database Errors
    // ============================================
    /// Database file could not be read
    DbReadFailed,
    /// Database file could not be written
    DbWriteFailed,
    /// Database content is not valid JSON
    DbCorrupted,

    // ============================================
    // Market Statistics Errors
    // ============================================
    /// DexScreener API error
    MarketApiError,
    /// Pair unknown to the statistics provider
    MarketPairNotFound,

    // ============================================
    // Generic Errors
    // ============================================
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RpcConnectionFailed => "RPC_CONNECTION_FAILED",
            Self::RpcTimeout => "RPC_TIMEOUT",
            Self::RpcRateLimited => "RPC_RATE_LIMITED",
            Self::RpcError => "RPC_ERROR",
            Self::RpcNoEndpoints => "RPC_NO_ENDPOINTS",
            Self::RpcInvalidResponse => "RPC_INVALID_RESPONSE",

            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",
            Self::ConfigUnsupportedChain => "CFG_UNSUPPORTED_CHAIN",

            Self::DbReadFailed => "DB_READ_FAILED",
            Self::DbWriteFailed => "DB_WRITE_FAILED",
            Self::DbCorrupted => "DB_CORRUPTED",

            Self::MarketApiError => "MARKET_API_ERROR",
            Self::MarketPairNotFound => "MARKET_PAIR_NOT_FOUND",

            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RpcTimeout
                | Self::RpcRateLimited
                | Self::RpcConnectionFailed
                | Self::RpcError
                | Self::MarketApiError
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    /// Invalid configuration value
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalidValue, msg)
    }

    /// Unsupported chain
    pub fn unsupported_chain(chain_id: u64) -> Self {
        Self::new(
            ErrorCode::ConfigUnsupportedChain,
            format!("Unsupported chain_id: {}", chain_id),
        )
    }

    /// No RPC endpoints
    pub fn no_endpoints() -> Self {
        Self::new(ErrorCode::RpcNoEndpoints, "No RPC endpoints configured")
    }

    /// Database write failed
    pub fn db_write(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DbWriteFailed, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let (code, message) = if err.is_timeout() {
            (ErrorCode::RpcTimeout, "Request timeout")
        } else if err.is_connect() {
            (ErrorCode::RpcConnectionFailed, "Connection failed")
        } else if err.is_decode() {
            (ErrorCode::RpcInvalidResponse, "Malformed response body")
        } else {
            (ErrorCode::Unknown, "HTTP request failed")
        };
        Self::with_source(code, message, err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::DbCorrupted, "JSON parse error", err)
    }
}
