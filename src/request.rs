// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求解析模块
//!
//! 内嵌引擎使用该模块将 TCP 流中读取的原始字节解析为强类型的 `Request`。
//! 它涵盖了：
//! 1. 请求行（Request-Line）的解析（方法、请求目标、版本），并将请求目标拆分为
//!    本地 URI 与查询字符串。
//! 2. 请求头（Headers）的保存与常用字段的提取。
//! 3. 内容协商（Content Negotiation）相关的编码解析。
//! 4. 请求体（Body）的切分，由 `Content-Length` 决定长度。
//!
//! 这里只做 servlet 容器需要的最小解析，不处理分块传输编码与 URI 解码。

use crate::{exception::Exception, param::*};
use bytes::Bytes;
use log::error;

/// 表示一个完整的 HTTP 请求。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法
    method: HttpRequestMethod,
    /// 原始请求目标（包含查询字符串）
    target: String,
    /// 请求目标中 `?` 之前的部分
    path: String,
    /// 请求目标中 `?` 之后的部分，没有则为 `None`
    query_string: Option<String>,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 全部请求头，保持到达顺序
    headers: Vec<(String, String)>,
    /// 客户端标识字符串
    user_agent: String,
    /// 客户端支持的压缩编码列表（按解析顺序排列）
    accept_encoding: Vec<HttpEncoding>,
    /// 请求体声明的长度
    content_length: usize,
    /// 请求体
    body: Bytes,
}

/// 查找请求头结束标记 `\r\n\r\n` 的位置，返回请求体起始下标。
pub fn header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

impl Request {
    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 逻辑步骤
    /// 1. 定位请求头与请求体的分界，并验证请求头是合法的 UTF-8 字符串。
    /// 2. 解析请求行：提取方法、请求目标和协议版本。
    /// 3. 迭代解析请求头，识别 `User-Agent`、`Accept-Encoding`、`Content-Length`。
    /// 4. 按照 `Content-Length` 截取请求体。
    ///
    /// # 参数
    /// * `buffer` - 从网络 Socket 读取的原始数据。
    /// * `id` - 连接 ID，用于在多线程环境下追踪日志。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let body_start = header_end(buffer).unwrap_or(buffer.len());
        let head = &buffer[..body_start];

        // 1. 将请求头转换为字符串，失败则判定为非法的 HTTP 请求
        let request_string = match std::str::from_utf8(head) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let request_lines: Vec<&str> = request_string.split(CRLF).collect();

        // 2. 解析请求行 (e.g., "GET /index.html HTTP/1.1")
        let first_line_parts: Vec<&str> = request_lines[0].split(' ').collect();

        if first_line_parts.len() < 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_lines[0]);
            return Err(Exception::MalformedRequest);
        }

        let method_str = first_line_parts[0].to_uppercase();
        let method = match method_str.as_str() {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "OPTIONS" => HttpRequestMethod::Options,
            "POST" => HttpRequestMethod::Post,
            "PUT" => HttpRequestMethod::Put,
            "DELETE" => HttpRequestMethod::Delete,
            _ => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, &method_str);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = first_line_parts[first_line_parts.len() - 1].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        // 路径中可能包含空格（虽然不规范），通过 join 尝试恢复
        let target = if first_line_parts.len() == 3 {
            first_line_parts[1].to_string()
        } else {
            first_line_parts[1..first_line_parts.len() - 1].join(" ")
        };
        let (path, query_string) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.clone(), None),
        };

        // 3. 迭代各行解析 Headers
        let mut headers = Vec::new();
        let mut user_agent = String::new();
        let mut accept_encoding = vec![];
        let mut content_length = 0usize;
        for line in request_lines.iter().skip(1) {
            if line.is_empty() {
                continue;
            }
            let (name, value) = match line.split_once(':') {
                Some((name, value)) => (name.trim(), value.trim()),
                None => {
                    error!("[ID{}]无法解析的请求头：{}", id, line);
                    return Err(Exception::MalformedRequest);
                }
            };
            let name_lower = name.to_lowercase();
            match name_lower.as_str() {
                "user-agent" => user_agent = value.to_string(),
                "content-length" => {
                    content_length = match value.parse::<usize>() {
                        Ok(len) => len,
                        Err(_) => {
                            error!("[ID{}]非法的Content-Length：{}", id, value);
                            return Err(Exception::MalformedRequest);
                        }
                    }
                }
                // 这里的逻辑比较简单，只要包含关键词即视为支持
                "accept-encoding" => {
                    if value.contains("gzip") {
                        accept_encoding.push(HttpEncoding::Gzip);
                    }
                    if value.contains("deflate") {
                        accept_encoding.push(HttpEncoding::Deflate);
                    }
                    if value.contains("br") {
                        accept_encoding.push(HttpEncoding::Br);
                    }
                }
                _ => {}
            }
            headers.push((name.to_string(), value.to_string()));
        }

        // 4. 截取请求体，数据不足时取已到达的部分，由引擎决定是否继续读取
        let available = &buffer[body_start..];
        let body = Bytes::copy_from_slice(&available[..content_length.min(available.len())]);

        Ok(Self {
            method,
            target,
            path,
            query_string,
            version,
            headers,
            user_agent,
            accept_encoding,
            content_length,
            body,
        })
    }
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取 HTTP 协议版本
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 获取原始请求目标（含查询参数）
    pub fn target(&self) -> &str {
        &self.target
    }

    /// 获取请求路径（不含查询参数）
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 获取查询字符串
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// 获取请求方法
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 获取用户代理字符串
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// 获取客户端支持的压缩算法列表
    pub fn accept_encoding(&self) -> &Vec<HttpEncoding> {
        &self.accept_encoding
    }

    /// 按名称（大小写不敏感）查找请求头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 获取全部请求头
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// 获取 `Host` 请求头
    pub fn host(&self) -> Option<&str> {
        self.header("host")
    }

    /// 获取 `Content-Type` 请求头
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// 获取请求体声明的长度
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// 获取请求体
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}
