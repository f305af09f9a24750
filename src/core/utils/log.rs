//! logging utilities

/// 日志级别环境变量, 如 `CREATOR_KIT_LOG=debug`
pub const LOG_LEVEL_ENV: &str = "CREATOR_KIT_LOG";

// 初始化日志
// 每个扩展模块都有自己的全局变量，因此所使用的记录器也与其他 Rust 原生扩展无关。
pub fn init_logger() {
    let level = parse_level(std::env::var(LOG_LEVEL_ENV).ok().as_deref());
    let _ = tracing_subscriber::fmt()
        .with_ansi(true)
        .with_max_level(level)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .try_init();
}

/// 解析日志级别, 未设置或无法识别时为 INFO
pub fn parse_level(value: Option<&str>) -> tracing::Level {
    value
        .and_then(|v| v.trim().parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO)
}
