pub mod error;
pub mod types;

#[cfg(feature = "analytics")]
pub mod analytics;

#[cfg(feature = "optimization")]
pub mod optimization;

#[cfg(feature = "market")]
pub mod market;

#[cfg(feature = "sampling")]
pub mod sampling;

#[cfg(feature = "simulation")]
pub mod simulation;

pub use error::PortfolioError;
pub use types::*;

/// Standard result type for all portfolio operations
pub type PortfolioResult<T> = Result<T, PortfolioError>;
