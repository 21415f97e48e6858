use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Header carrying the call budget as `<used>/<total>`.
pub const RATE_LIMIT_HEADER: &str = "x-shopify-shop-api-call-limit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub used: u32,
    pub total: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitParseError {
    #[error("rate limit value is missing a '/' separator")]
    MissingSeparator,
    #[error("rate limit value is not a number: {0}")]
    InvalidNumber(String),
}

impl RateLimit {
    /// True when fewer than `reserve` calls remain, so that `reserve` concurrent callers could
    /// still exhaust the budget.
    pub fn is_near_limit(&self, reserve: u32) -> bool {
        self.used > self.total.saturating_sub(reserve)
    }
}

impl FromStr for RateLimit {
    type Err = RateLimitParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (used, total) = value
            .trim()
            .split_once('/')
            .ok_or(RateLimitParseError::MissingSeparator)?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| RateLimitParseError::InvalidNumber(part.to_string()))
        };
        Ok(Self {
            used: parse(used)?,
            total: parse(total)?,
        })
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.used, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_used_and_total() {
        let limit: RateLimit = "39/40".parse().unwrap();
        assert_eq!(limit, RateLimit { used: 39, total: 40 });
        assert_eq!(limit.to_string(), "39/40");
    }

    #[test]
    fn rejects_malformed_values() {
        assert_eq!(
            "40".parse::<RateLimit>(),
            Err(RateLimitParseError::MissingSeparator)
        );
        assert!(matches!(
            "a/40".parse::<RateLimit>(),
            Err(RateLimitParseError::InvalidNumber(_))
        ));
    }

    #[test]
    fn near_limit_reserves_headroom_for_other_callers() {
        let limit = RateLimit { used: 38, total: 40 };
        assert!(!limit.is_near_limit(2));
        assert!(limit.is_near_limit(3));

        let exhausted = RateLimit { used: 2, total: 1 };
        assert!(exhausted.is_near_limit(5));
    }
}
