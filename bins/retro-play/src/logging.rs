//! 日志初始化模块.
//!
//! 双输出 (统一级别):
//! - console: 彩色, 输出到 stderr
//! - file: 无色, 带 target
//!
//! 级别体系 (优先级: RETRO_LOG 环境变量 > 命令行 > 默认):
//! - 默认:   info  (加载/播放/结束等生命周期事件)
//! - `-v`:   debug (会话与播放状态切换)
//! - `-vv`:  trace (仅 retro crate, 含逐帧解码日志, SDL 等依赖保持 info)
//! - `-vvv`: trace (全局)
//!
//! 库 crate 通过 `log` 门面输出, 由 tracing-subscriber 的 log 桥接统一收集.
//!
//! 日志文件输出到 $cwd/logs/{prefix}.{date}.log

use anyhow::{Context, Result};
use chrono::Local;
use std::sync::OnceLock;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 环境变量名, 设置后覆盖命令行级别
const LOG_ENV: &str = "RETRO_LOG";

/// 本项目所有 crate 的 target 前缀 (用于 -vv 级别的定向 trace)
const RETRO_CRATE_TARGETS: &[&str] = &[
    "retro",
    "retro_core",
    "retro_codec",
    "retro_audio",
    "retro_play",
];

/// 根据 verbosity 生成过滤指令
///
/// `-vv` 只放开 retro crate 的 trace, SDL 等依赖保持 info.
fn filter_directives(verbosity: u8) -> String {
    match verbosity {
        0 => "info".into(),
        1 => "debug".into(),
        2 => RETRO_CRATE_TARGETS
            .iter()
            .map(|t| format!("{t}=trace"))
            .chain(std::iter::once("info".to_string()))
            .collect::<Vec<_>>()
            .join(","),
        _ => "trace".into(),
    }
}

/// RETRO_LOG 优先, 否则使用命令行级别
fn level_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(filter_directives(verbosity)))
}

/// 初始化日志系统, 日志文件名形如 `logs/{file_prefix}.{date}.log`
pub fn init(file_prefix: &str, verbosity: u8) -> Result<()> {
    std::fs::create_dir_all("logs").context("创建日志目录失败")?;
    let appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(file_prefix)
        .filename_suffix("log")
        .build("logs")
        .context("创建日志文件失败")?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    // 重复初始化时保留第一个 guard
    let _ = LOG_GUARD.set(guard);

    // stdout 留给 --probe 的 JSON
    let console = fmt::Layer::default()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .event_format(LineFormatter { console: true })
        .with_filter(level_filter(verbosity));
    let file = fmt::Layer::default()
        .with_writer(file_writer)
        .with_ansi(false)
        .event_format(LineFormatter { console: false })
        .with_filter(level_filter(verbosity));

    Registry::default()
        .with(console)
        .with(file)
        .try_init()
        .context("安装日志订阅器失败")
}

/// 单行日志格式
///
/// 控制台按级别着色; 文件无色, 额外记录 target 便于定位模块.
struct LineFormatter {
    console: bool,
}

impl LineFormatter {
    fn level_color(level: &Level) -> &'static str {
        match *level {
            Level::ERROR => "\x1b[31m",
            Level::WARN => "\x1b[33m",
            Level::INFO => "\x1b[32m",
            _ => "\x1b[34m",
        }
    }
}

impl<S, N> FormatEvent<S, N> for LineFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        write!(writer, "[{}] ", Local::now().format("%m-%d %H:%M:%S%.3f"))?;
        if self.console {
            write!(writer, "{}{:5}\x1b[0m > ", Self::level_color(meta.level()), meta.level())?;
        } else {
            write!(writer, "{:5} {} > ", meta.level(), meta.target())?;
        }
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_by_verbosity() {
        assert_eq!(filter_directives(0), "info");
        assert_eq!(filter_directives(1), "debug");
        assert_eq!(filter_directives(5), "trace");
        let vv = filter_directives(2);
        assert!(vv.starts_with("retro=trace,"));
        assert!(vv.contains("retro_codec=trace"));
        assert!(vv.ends_with(",info"));
    }
}
