use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::AsyncCommands;

use crate::{
    config::Config,
    utils::{error_codes, error_to_api_response},
};

const RATE_LIMIT_PREFIX: &str = "friendex:rate_limit:";

/// 基于 Redis 计数器的固定窗口限流
#[derive(Clone)]
pub struct RateLimiter {
    redis: Arc<redis::Client>,
    config: Arc<Config>,
}

impl RateLimiter {
    pub fn new(redis: Arc<redis::Client>, config: Config) -> Self {
        Self {
            redis,
            config: Arc::new(config),
        }
    }

    /// 优先使用代理头中的IP，没有时使用连接IP
    fn client_ip(req: &Request) -> String {
        let remote_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string());

        req.headers()
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .or_else(|| {
                req.headers()
                    .get("x-forwarded-for")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
            })
            .or(remote_ip.as_deref())
            .unwrap_or("unknown")
            .trim()
            .to_string()
    }

    /// 当前窗口内的请求数
    async fn hit(&self, ip: &str) -> redis::RedisResult<i64> {
        let key = format!("{}{}", RATE_LIMIT_PREFIX, ip);
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let count: i64 = conn.incr(&key, 1).await?;
        if count == 1 {
            // 第一次请求时设置窗口过期时间
            let _: () = conn
                .expire(&key, self.config.rate_limit_window().as_secs() as i64)
                .await?;
        }
        Ok(count)
    }

    pub async fn check_rate_limit(&self, req: Request, next: Next) -> Response {
        let ip = Self::client_ip(&req);

        match self.hit(&ip).await {
            Ok(count) if count > self.config.rate_limit_requests as i64 => {
                tracing::debug!(ip = %ip, count, "Rate limit exceeded");
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    error_to_api_response::<()>(
                        error_codes::RATE_LIMIT,
                        format!(
                            "请求过于频繁，请在{}秒后重试",
                            self.config.rate_limit_window().as_secs()
                        ),
                    ),
                )
                    .into_response();
            }
            Ok(_) => {}
            // Redis 不可用时放行，不影响位置上报
            Err(e) => tracing::warn!(ip = %ip, "Rate limiter unavailable: {}", e),
        }

        next.run(req).await
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    limiter.check_rate_limit(req, next).await
}
