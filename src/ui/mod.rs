//! 交互层。目前只有无 UI 的命令行驱动。

pub mod noui;
