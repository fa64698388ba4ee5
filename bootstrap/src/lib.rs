//! anybiz-bootstrap - 统一服务启动骨架
//!
//! 加载配置与日志，运行 HTTP 服务器并处理 graceful shutdown。

mod idle;
mod runtime;
mod server;
mod shutdown;
mod starter;

pub use idle::*;
pub use runtime::*;
pub use server::*;
pub use shutdown::*;
pub use starter::*;
