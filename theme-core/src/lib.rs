mod client;
mod rate_limit;

pub use client::{
    ApiErrorClass, ApiResponse, Asset, AssetSummary, AssetUpload, ThemeClient, ThemeError,
};
pub use reqwest::StatusCode;
pub use rate_limit::{RATE_LIMIT_HEADER, RateLimit, RateLimitParseError};
