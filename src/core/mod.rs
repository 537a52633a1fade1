// 核心数据结构和类型定义

pub mod types;
pub mod config;
pub mod error;

pub use types::*;
pub use config::*;
pub use error::*;

use std::{process, thread};

/// 日志前缀：进程号 + 线程名/ID
pub fn log_ctx() -> String {
    let current = thread::current();
    match current.name() {
        Some(name) => format!("[pid:{} {}]", process::id(), name),
        None => format!("[pid:{} tid:{:?}]", process::id(), current.id()),
    }
}
