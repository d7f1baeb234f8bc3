// 中间件：令牌校验、5xx 日志、限流

mod auth;
mod error_log;
mod rate_limit;

pub use auth::auth_middleware;
pub use error_log::log_errors;
pub use rate_limit::{RateLimiter, rate_limit};
