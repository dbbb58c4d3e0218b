// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 容器协议参数与常量模块
//!
//! 该模块定义了 servlet 容器及其内嵌 HTTP 引擎共用的常量和数据结构，包括：
//! - 常见的 HTTP 状态码及其原因短语（Reason Phrase）。
//! - 常用文件后缀的 MIME 类型映射表（`ServletContext::mime_type` 的数据来源）。
//! - HTTP 方法、版本及编码格式的强类型枚举。
//! - 容器默认启动参数以及服务注册属性名。

use std::collections::HashMap;
use lazy_static::lazy_static;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "shaneyale-servlet-container";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// servlet 在注册表中声明自身 context root 时使用的属性名
pub const PROP_CONTEXT_ROOT: &str = "http.servlet.context.root";

/// `Start()` 未指定参数时监听的端口
pub const DEFAULT_PORT: u16 = 8080;

/// `Start()` 未指定参数时的工作线程数
pub const DEFAULT_WORKER_THREADS: usize = 50;

/// 上传文件暂存目录名的默认前缀
pub const DEFAULT_TEMP_PREFIX: &str = "servlet-container-";

/// 单个请求（请求头 + 请求体）允许的默认最大字节数
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 16 * 1024 * 1024;

/// 请求头部分允许的最大字节数，超过即视为畸形请求
pub const MAX_HEADER_SIZE: usize = 64 * 1024;

lazy_static! {
    /// 引擎对外声明的 HTTP 方法列表，用于 `OPTIONS` 与 `405` 响应的 `Allow` 头。
    ///
    /// `HEAD` 与 `OPTIONS` 由引擎自身处理，其余方法转交给已安装的 servlet。
    pub static ref ALLOWED_METHODS: Vec<HttpRequestMethod> = {
        vec![
            HttpRequestMethod::Get,
            HttpRequestMethod::Head,
            HttpRequestMethod::Options,
            HttpRequestMethod::Post,
            HttpRequestMethod::Put,
            HttpRequestMethod::Delete,
        ]
    };
}

lazy_static! {
    /// HTTP 状态码与其对应的标准原因短语映射表。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        // 1xx: 信息响应 (Informational)
        map.insert(100, "Continue");
        map.insert(101, "Switching Protocols");
        
        // 2xx: 成功响应 (Successful)
        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(202, "Accepted");
        map.insert(203, "Non-Authoritative Information");
        map.insert(204, "No Content");
        map.insert(205, "Reset Content");
        map.insert(206, "Partial Content");
        
        // 3xx: 重定向 (Redirection)
        map.insert(300, "Multiple Choices");
        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(303, "See Other");
        map.insert(304, "Not Modified");
        map.insert(305, "Use Proxy");
        // 306 已弃用 (Reserved)
        map.insert(307, "Temporary Redirect");
        map.insert(308, "Permanent Redirect");
        
        // 4xx: 客户端错误 (Client Error)
        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(402, "Payment Required");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(406, "Not Acceptable");
        map.insert(407, "Proxy Authentication Required");
        map.insert(408, "Request Timeout");
        map.insert(409, "Conflict");
        map.insert(410, "Gone");
        map.insert(411, "Length Required");
        map.insert(412, "Precondition Failed");
        map.insert(413, "Content Too Large");
        map.insert(414, "URI Too Long");
        map.insert(415, "Unsupported Media Type");
        map.insert(416, "Range Not Satisfiable");
        map.insert(417, "Expectation Failed");
        map.insert(418, "I'm a teapot");
        map.insert(421, "Misdirected Request");
        map.insert(422, "Unprocessable Content");
        map.insert(426, "Upgrade Required");
        
        // 5xx: 服务端错误 (Server Error)
        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(502, "Bad Gateway");
        map.insert(503, "Service Unavailable");
        map.insert(504, "Gateway Timeout");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

lazy_static! {
    /// 文件后缀名（小写）到 MIME 类型的映射表，未收录的后缀查询结果为空串。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let entries: [(&str, &str); 44] = [
            // 文本与页面
            ("html", "text/html;charset=utf-8"),
            ("htm", "text/html;charset=utf-8"),
            ("css", "text/css;charset=utf-8"),
            ("js", "text/javascript;charset=utf-8"),
            ("mjs", "text/javascript;charset=utf-8"),
            ("txt", "text/plain"),
            ("csv", "text/csv"),
            ("md", "text/markdown"),
            ("xml", "text/xml"),
            ("xhtml", "application/xhtml+xml"),
            ("json", "application/json"),
            ("jsonld", "application/ld+json"),
            // 图片
            ("png", "image/png"),
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("gif", "image/gif"),
            ("bmp", "image/bmp"),
            ("webp", "image/webp"),
            ("avif", "image/avif"),
            ("svg", "image/svg+xml"),
            ("ico", "image/x-icon"),
            // 字体
            ("woff", "font/woff"),
            ("woff2", "font/woff2"),
            ("ttf", "font/ttf"),
            ("otf", "font/otf"),
            // 音视频
            ("mp3", "audio/mpeg"),
            ("wav", "audio/wav"),
            ("ogg", "audio/ogg"),
            ("mp4", "video/mp4"),
            ("webm", "video/webm"),
            // 文档
            ("pdf", "application/pdf"),
            ("rtf", "application/rtf"),
            ("doc", "application/msword"),
            ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
            ("xls", "application/vnd.ms-excel"),
            ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
            // 压缩包与二进制
            ("zip", "application/zip"),
            ("gz", "application/gzip"),
            ("tar", "application/x-tar"),
            ("7z", "application/x-7z-compressed"),
            ("rar", "application/vnd.rar"),
            ("wasm", "application/wasm"),
            ("bin", "application/octet-stream"),
            ("exe", "application/octet-stream"),
        ];
        entries.into_iter().collect()
    };
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    /// HTTP/1.0 版本（仅用于兼容老旧客户端）
    V1_0,
    /// HTTP/1.1 版本
    V1_1,
}

/// 标准 HTTP 请求方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpRequestMethod {
    /// 获取资源
    Get,
    /// 获取资源的元数据（不包含响应体）
    Head,
    /// 查询服务器支持的选项
    Options,
    /// 提交数据或执行操作
    Post,
    /// 替换目标资源
    Put,
    /// 删除目标资源
    Delete,
}

impl HttpRequestMethod {
    /// 该方法是否携带需要暂存的请求体（表单、multipart 上传）。
    pub fn has_body(&self) -> bool {
        matches!(
            self,
            HttpRequestMethod::Post | HttpRequestMethod::Put | HttpRequestMethod::Delete
        )
    }
}

/// 支持的内容编码（压缩）格式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpEncoding {
    /// GNU zip 压缩
    Gzip,
    /// zlib 压缩
    Deflate,
    /// Brotli 压缩
    Br,
}

use std::fmt;

impl fmt::Display for HttpVersion {
    /// 将枚举格式化为 HTTP 报文中的版本字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "1.0"),
            HttpVersion::V1_1 => write!(f, "1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Options => write!(f, "OPTIONS"),
            HttpRequestMethod::Post => write!(f, "POST"),
            HttpRequestMethod::Put => write!(f, "PUT"),
            HttpRequestMethod::Delete => write!(f, "DELETE"),
        }
    }
}

impl fmt::Display for HttpEncoding {
    /// 将枚举格式化为 `Content-Encoding` 头所使用的标识符
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpEncoding::Gzip => write!(f, "gzip"),
            HttpEncoding::Deflate => write!(f, "deflate"),
            HttpEncoding::Br => write!(f, "br"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_methods() {
        assert!(HttpRequestMethod::Post.has_body());
        assert!(HttpRequestMethod::Put.has_body());
        assert!(HttpRequestMethod::Delete.has_body());
        assert!(!HttpRequestMethod::Get.has_body());
        assert!(!HttpRequestMethod::Head.has_body());
    }

    #[test]
    fn test_method_display() {
        let names: Vec<String> = ALLOWED_METHODS.iter().map(|m| m.to_string()).collect();
        assert_eq!(names, ["GET", "HEAD", "OPTIONS", "POST", "PUT", "DELETE"]);
    }

    #[test]
    fn test_status_table_has_common_codes() {
        for code in [200, 204, 400, 404, 405, 413, 500] {
            assert!(STATUS_CODES.contains_key(&code));
        }
    }
}
