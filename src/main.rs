//! 服务入口
//!
//! 环境变量：
//! - `BOOKCAST_BOOKS_DIR`: 书库根目录，默认 `books`
//! - `BOOKCAST_HOST` / `BOOKCAST_PORT`: 监听地址，默认 `127.0.0.1:8123`
//! - `BOOKCAST_CACHE_SIZE`: 书籍缓存容量，默认 10
//! - `BOOKCAST_CONVERTER`: EPUB 转换命令（空格分隔），未设置时上传返回错误
//! - `BOOKCAST_FRONTEND_DIR`: 前端静态目录，默认 `frontend`
//! - 模型配置的环境回退见 `config` 模块

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bookcast_lib::config::ConfigStore;
use bookcast_lib::server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let books_dir = env_or("BOOKCAST_BOOKS_DIR", "books");
    let host = env_or("BOOKCAST_HOST", "127.0.0.1");
    let port: u16 = env_or("BOOKCAST_PORT", "8123")
        .parse()
        .context("BOOKCAST_PORT 不是合法端口")?;
    let cache_size: usize = env_or("BOOKCAST_CACHE_SIZE", "10")
        .parse()
        .context("BOOKCAST_CACHE_SIZE 不是合法数字")?;
    let converter: Vec<String> = std::env::var("BOOKCAST_CONVERTER")
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let config = ConfigStore::with_default_path().context("无法定位配置文件")?;
    info!(
        books_dir = %books_dir,
        cache_size,
        config = %config.path().display(),
        "bookcast 启动"
    );

    let state = AppState::new(&books_dir, config, cache_size, converter);

    let frontend = PathBuf::from(env_or("BOOKCAST_FRONTEND_DIR", "frontend"));
    let app = router(state, frontend.is_dir().then_some(frontend.as_path()));

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听 {addr}"))?;
    info!("服务地址 http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务异常退出")?;
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("收到退出信号，开始优雅关闭");
    }
}
