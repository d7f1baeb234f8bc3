use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use friendex::{
    AppState,
    config::Config,
    middleware::{RateLimiter, log_errors, rate_limit},
    routes,
    store::{PgUserStore, UserStore},
    tracker::{Tracker, ticker},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'friendex_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    // 设置 Redis 客户端（限流使用）
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");

    // 创建追踪引擎，并根据持久化的“已选好友”重建会话
    let store: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool));
    let tracker = Arc::new(Tracker::new(config.tracker.clone(), store.clone()));
    if let Err(e) = tracker.rehydrate().await {
        tracing::error!("Failed to rehydrate tracking sessions: {}", e);
    }

    // 启动 tick 循环
    let shutdown = CancellationToken::new();
    let ticker_handle = ticker::spawn(tracker.clone(), shutdown.clone());

    // 设置应用状态
    let state = AppState {
        config: config.clone(),
        store,
        tracker,
    };

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(Arc::new(redis_client), config.clone()));

    // 添加日志中间件和限流中间件
    let router = routes::router(state).layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn(log_errors))
            .layer(axum::middleware::from_fn_with_state(rate_limiter, rate_limit)),
    );

    // 开发模式下允许所有来源跨域
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await
    .expect("Failed to start server");

    // 等待 tick 循环退出
    shutdown.cancel();
    if let Err(e) = ticker_handle.await {
        tracing::error!("Tick loop terminated abnormally: {}", e);
    }
    tracing::info!("Server stopped");
}

// Ctrl-C 或 SIGTERM 时触发关闭
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
