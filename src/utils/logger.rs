//! 日志：env_logger 写 stderr（stdout 留给 NDJSON 协议），同时追加到按大小轮转的日志文件。
//!
//! 所有模块统一通过 `log_*!` 宏输出；`tracing` 事件经 `log` feature 落到同一个 logger。
//! stderr 不是终端时（被宿主进程接管）不输出颜色转义。

use env_logger::fmt::Formatter;
use env_logger::{Builder, Target, WriteStyle};
use log::{LevelFilter, Record};
use std::fs::{self, File, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once, OnceLock};

const LOG_DIR: &str = "LOG_DIR";
const LOG_LEVEL: &str = "LOG_LEVEL";
const DEFAULT_LOG_DIR: &str = "logs";
const LOG_FILE_NAME: &str = "signing-core.log";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_ROTATIONS: usize = 5;
/// 依赖库只保留告警
const QUIET_CRATES: [&str; 3] = ["ethers_providers", "hyper", "reqwest"];

static INIT: Once = Once::new();
static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();

/// 解析 `LOG_LEVEL`，大小写不敏感
pub fn level_filter(name: &str) -> Option<LevelFilter> {
    name.trim().parse().ok()
}

/// 全局只初始化一次，重复调用无效果
pub fn init_logger() {
    INIT.call_once(|| {
        let dir = std::env::var(LOG_DIR).unwrap_or_else(|_| DEFAULT_LOG_DIR.to_string());
        let requested = std::env::var(LOG_LEVEL).unwrap_or_default();
        let level = match level_filter(&requested) {
            Some(level) => level,
            None if requested.is_empty() => LevelFilter::Info,
            None => {
                eprintln!("⚠️ 无效日志级别「{}」，使用默认 INFO", requested);
                LevelFilter::Info
            }
        };

        let file_path = Path::new(&dir).join(LOG_FILE_NAME);
        match open_log_file(&file_path) {
            Ok(file) => {
                let _ = LOG_FILE.set(Mutex::new(file));
            }
            Err(e) => eprintln!("❌ 日志文件 {} 不可用: {}", file_path.display(), e),
        }

        let colored = io::stderr().is_terminal();
        let mut builder = Builder::from_default_env();
        builder.filter(None, level);
        for name in QUIET_CRATES {
            builder.filter(Some(name), LevelFilter::Warn);
        }
        builder
            .target(Target::Stderr)
            .write_style(if colored { WriteStyle::Auto } else { WriteStyle::Never })
            .format(move |f, record| write_record(f, record, colored));

        match builder.try_init() {
            Ok(()) => log::info!(
                "✅ 日志系统初始化完成 | 级别: {} | 日志文件: {}",
                level,
                file_path.display()
            ),
            Err(e) => eprintln!("❌ 日志初始化失败: {}", e),
        }
    });
}

fn write_record(f: &mut Formatter, record: &Record, colored: bool) -> io::Result<()> {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let level = record.level();
    let module = record.module_path().unwrap_or("unknown");

    if colored {
        let style = f.default_level_style(level);
        writeln!(f, "[{}] [{style}{:>5}{style:#}] [{}] - {}", now, level, module, record.args())?;
    } else {
        writeln!(f, "[{}] [{:>5}] [{}] - {}", now, level, module, record.args())?;
    }

    // 文件写失败不影响 stderr
    if let Some(file) = LOG_FILE.get() {
        let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(
            file,
            "{} {:<5} [{}] {} - {}",
            now,
            level,
            std::thread::current().name().unwrap_or("-"),
            module,
            record.args()
        );
    }
    Ok(())
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    if let Err(e) = rotate(path, ROTATE_AT_BYTES, KEEP_ROTATIONS) {
        eprintln!("⚠️ 日志轮转失败: {}", e);
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// 超过 `max_bytes` 时整体后移一位：`x.log` -> `x.log.1` -> ... -> `x.log.{keep}`，
/// 最旧的一份被覆盖。返回是否发生了轮转。
fn rotate(path: &Path, max_bytes: u64, keep: usize) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size < max_bytes || keep == 0 {
        return Ok(false);
    }

    for i in (1..keep).rev() {
        let older = numbered(path, i);
        if older.exists() {
            fs::rename(&older, numbered(path, i + 1))?;
        }
    }
    fs::rename(path, numbered(path, 1))?;
    Ok(true)
}

fn numbered(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}

#[macro_export]
macro_rules! log_debug { ($($arg:tt)*) => { log::debug!($($arg)*) }; }
#[macro_export]
macro_rules! log_info  { ($($arg:tt)*) => { log::info!($($arg)*) }; }
#[macro_export]
macro_rules! log_warn  { ($($arg:tt)*) => { log::warn!($($arg)*) }; }
#[macro_export]
macro_rules! log_error { ($($arg:tt)*) => { log::error!($($arg)*) }; }
