//! HTTP handlers, one module per API area

pub mod admin;
pub mod health;
pub mod loan_requests;
pub mod loans;
pub mod members;
pub mod months;
pub mod notices;
pub mod payments;
pub mod records;

pub use admin::*;
pub use health::health_check;
pub use loan_requests::*;
pub use loans::*;
pub use members::*;
pub use months::*;
pub use notices::*;
pub use payments::*;
pub use records::*;

use crate::error::ApiError;
use crate::period::PeriodKey;

/// Period keys arrive as path segments; reject anything but `YYYY-MM`.
pub(crate) fn parse_period_key(raw: &str) -> Result<PeriodKey, ApiError> {
    raw.parse::<PeriodKey>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_period_key() {
        assert_eq!(parse_period_key("2024-03").unwrap().to_string(), "2024-03");
        assert!(matches!(
            parse_period_key("2024-3"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(parse_period_key("2024-13").is_err());
    }
}
