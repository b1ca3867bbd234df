use thiserror::Error;

/// Everything a core operation can fail with. Business-rule rejections
/// (`SaleNotOpen` through `InsufficientStock`) are expected and frequent
/// under load; `Consistency` means an invariant was violated and must be
/// surfaced, never patched over.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("the sale has not started or has already ended")]
    SaleNotOpen,

    #[error("the product is sold out")]
    SoldOut,

    #[error("you already have an order in progress for this sale")]
    DuplicateOrder,

    #[error("insufficient stock")]
    InsufficientStock,

    #[error("consistency violation: {0}")]
    Consistency(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CoreError {
    /// Client-fixable or load-expected rejections, as opposed to faults.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidRequest(_)
                | CoreError::NotFound(_)
                | CoreError::SaleNotOpen
                | CoreError::SoldOut
                | CoreError::DuplicateOrder
                | CoreError::InsufficientStock
        )
    }

    /// Transient storage failures the caller may re-run the whole operation
    /// for: deadlock detected, serialization failure, lock not available.
    pub fn retryable(&self) -> bool {
        match self {
            CoreError::Database(sqlx::Error::PoolTimedOut) => true,
            CoreError::Database(sqlx::Error::Database(db)) => matches!(
                db.code().as_deref(),
                Some("40001") | Some("40P01") | Some("55P03")
            ),
            _ => false,
        }
    }
}

/// True if the error is a unique-constraint violation on the named
/// constraint (Postgres error 23505).
pub fn violates_unique(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("23505") && db.constraint() == Some(constraint)
        }
        _ => false,
    }
}
