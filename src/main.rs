//! notes-auth 主入口

use notes_auth::{
    config::AppConfig,
    db,
    middleware::AppState,
    repository::PgUserRepository,
    routes,
    session::{RedisSessionBackend, SessionStore},
    telemetry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("notes-auth {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("未知参数: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    if let Ok(env) = std::env::var("NOTES_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();
    }

    // 1. 加载配置，缺少密钥时直接退出
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "notes-auth starting...");

    // 3. 数据库连接池 + 迁移
    let db_pool = db::create_pool(&config.database).await?;
    db::run_migrations(&db_pool).await?;

    // 4. 会话存储
    let sessions = if config.session.enabled {
        let backend = RedisSessionBackend::connect(&config.session.redis_url).await?;
        Some(SessionStore::new(
            Arc::new(backend),
            Duration::from_secs(config.session.ttl_secs),
            Duration::from_millis(config.session.op_timeout_ms),
        ))
    } else {
        tracing::info!("Server-side sessions disabled, using bearer tokens only");
        None
    };

    // 5. 构建应用状态与路由
    let addr = config.server.addr.clone();
    let shutdown_timeout = config.server.graceful_shutdown_timeout_secs;
    let users = Arc::new(PgUserRepository::new(db_pool.clone()));
    let state = Arc::new(AppState::new(config, users, sessions)?);
    let app = routes::create_router(state);

    // 6. 启动服务器
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_timeout))
        .await?;

    db_pool.close().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 收到信号后开始排空连接，超时仍未完成则强制退出。
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
        tracing::warn!("Graceful shutdown timeout reached, forcing exit");
        std::process::exit(1);
    });
}

/// 打印帮助信息
fn print_help() {
    println!("notes-auth {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: notes-auth [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过 NOTES_ 前缀的环境变量完成");
    println!("  可用选项请参考 .env.example");
}
