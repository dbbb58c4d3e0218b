// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了 servlet 容器在整个生命周期中可能出现的各类异常情况。
//!
//! ## 错误分类
//! - **协议解析错误**：由内嵌引擎在读取请求报文时产生，直接转换为 4xx 响应。
//! - **配置拒绝**：注册表中的 servlet 缺少或声明了非法的 context root、无法获取实例、
//!   与已安装的 servlet 冲突。记录日志后跳过，容器保持健康。
//! - **监听器启动失败**：`start` 返回错误，容器保持停止状态。
//! - **用户代码错误**：servlet 的 `service` 返回的错误，在适配器边界被捕获。
//! - **清理错误**：临时目录删除失败，仅记录日志，不会中断 `stop`。

use std::fmt;

/// 容器处理过程中发生的异常类型。
///
/// 该枚举通常作为 `Result` 的 `Err` 部分返回，用于指示处理失败的具体原因。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 客户端使用了引擎不支持的 HTTP 方法。
    UnSupportedRequestMethod,
    /// 客户端使用了引擎不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 请求行或请求头的格式不合法（例如缺失请求行、`Content-Length` 无法解析）。
    MalformedRequest,
    /// 请求大小超过了配置的上限。对应 `413 Content Too Large`。
    PayloadTooLarge,
    /// 内嵌监听器无法绑定到任何地址。
    ListenerStartFailure(String),
    /// 无法创建或访问上传文件的暂存目录。
    TempDirFailure(String),
    /// 注册表中的 servlet 没有声明 context root 属性。
    MissingContextRoot,
    /// 声明的 context root 不是合法的 URI 路径。
    InvalidContextRoot(String),
    /// 该 context root 已经被另一个处于活动状态的 servlet 占用。
    ContextRootConflict(String),
    /// 注册表无法提供可用的 servlet 实例（通常是服务已被注销）。
    ServletUnavailable,
    /// servlet 试图设置一个未知的状态码。
    InvalidStatusCode(u16),
    /// 响应已经提交，不能再修改状态或头部。
    ResponseCommitted,
    /// 暂存上传文件时发生的 I/O 错误。
    PartIo(String),
    /// 用户 servlet 代码报告的错误。
    Servlet(String),
}

use Exception::*;

impl Exception {
    /// 该异常是否属于“配置拒绝”一类：记录后跳过注册，不影响容器状态。
    pub fn is_configuration_rejection(&self) -> bool {
        matches!(
            self,
            MissingContextRoot | InvalidContextRoot(_) | ContextRootConflict(_) | ServletUnavailable
        )
    }
}

/// 为 `Exception` 实现 `Display` 特性，使其支持字符串格式化输出。
impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            MalformedRequest => write!(f, "Malformed request (400)"),
            PayloadTooLarge => write!(f, "Request is too large (413)"),
            ListenerStartFailure(reason) => {
                write!(f, "Servlet container could not be started: {}", reason)
            }
            TempDirFailure(reason) => write!(f, "Temporary directory failure: {}", reason),
            MissingContextRoot => write!(f, "Servlet is missing the context root property"),
            InvalidContextRoot(root) => write!(f, "Invalid context root: {:?}", root),
            ContextRootConflict(root) => {
                write!(f, "Context root {} is already claimed by another servlet", root)
            }
            ServletUnavailable => write!(f, "Servlet instance is not available"),
            InvalidStatusCode(code) => write!(f, "Invalid status code: {}", code),
            ResponseCommitted => write!(f, "Response has already been committed"),
            PartIo(reason) => write!(f, "Couldn't spool uploaded part: {}", reason),
            Servlet(reason) => write!(f, "Servlet error: {}", reason),
        }
    }
}

impl std::error::Error for Exception {}

impl From<std::io::Error> for Exception {
    fn from(e: std::io::Error) -> Self {
        PartIo(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_rejections() {
        assert!(MissingContextRoot.is_configuration_rejection());
        assert!(ContextRootConflict("/dup".to_string()).is_configuration_rejection());
        assert!(ServletUnavailable.is_configuration_rejection());
        assert!(!ListenerStartFailure("port".to_string()).is_configuration_rejection());
        assert!(!Servlet("boom".to_string()).is_configuration_rejection());
    }

    #[test]
    fn test_display_mentions_root() {
        let text = ContextRootConflict("/dup".to_string()).to_string();
        assert!(text.contains("/dup"));
    }

    #[test]
    fn test_io_error_maps_to_part_io() {
        let err: Exception = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert_eq!(err, PartIo("disk full".to_string()));
    }
}
