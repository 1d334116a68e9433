//! 各阶段命令行程序依赖的通用组件.

use std::io::{self, Write};

use log::LevelFilter;
use simple_logger::SimpleLogger;

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 向 `w` 写一条简单分隔线.
#[inline]
pub fn sep_to<W: Write>(mut w: W) -> io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 初始化日志. 默认 `Info`, `verbose` 时为 `Debug`; `$RUST_LOG` 优先.
pub fn init_logger(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).env().init()?;
    Ok(())
}
