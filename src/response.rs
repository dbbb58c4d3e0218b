// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use crate::{param::*, util::HtmlBuilder};

use brotli::enc::{self, backward_references::BrotliEncoderParams};
use bytes::Bytes;
use chrono::prelude::*;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, error};

use std::{
    io::{self, Write},
    str,
};

/// 引擎写回客户端的 HTTP 响应报文。
#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    content_type: Option<String>,
    content_length: u64,
    date: DateTime<Utc>,
    content_encoding: Option<HttpEncoding>,
    server_name: String,
    allow: Option<Vec<HttpRequestMethod>>,
    headers: Vec<(String, String)>,
    content: Option<Bytes>,
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            content_type: None,
            content_length: 0,
            date: Utc::now(),
            content_encoding: None,
            server_name: SERVER_NAME.to_string(),
            allow: None,
            headers: Vec::new(),
            content: None,
        }
    }

    /// 由 servlet 产生的状态、头部与正文构建响应报文。
    ///
    /// 正文按客户端声明的编码压缩；已经声明了 `Content-Encoding` 的响应、
    /// 不适合压缩的 MIME 类型以及空正文均原样发送。
    pub fn from_servlet(
        status_code: u16,
        content_type: Option<String>,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        accept_encoding: &[HttpEncoding],
        enable_compression: bool,
        id: u128,
    ) -> Self {
        let mut response = Self::new();
        response.set_code(status_code);
        response.headers = headers;

        let already_encoded = response
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-encoding"));
        let skip_compression = match &content_type {
            Some(mime) => should_skip_compression(mime),
            None => true,
        };
        response.content_type = content_type;

        if enable_compression && !already_encoded && !skip_compression && !body.is_empty() {
            response.content_encoding = decide_encoding(accept_encoding);
        }
        match response.content_encoding {
            Some(HttpEncoding::Gzip) => debug!("[ID{}]使用Gzip压缩编码", id),
            Some(HttpEncoding::Br) => debug!("[ID{}]使用Brotli压缩编码", id),
            Some(HttpEncoding::Deflate) => debug!("[ID{}]使用Deflate压缩编码", id),
            None => debug!("[ID{}]不进行压缩", id),
        };

        let contents = match compress(body.clone(), response.content_encoding) {
            Ok(c) => c,
            Err(e) => {
                error!("[ID{}]压缩servlet响应失败: {}，返回未压缩内容", id, e);
                response.content_encoding = None;
                body
            }
        };
        response.content_length = contents.len() as u64;
        response.content = match contents.is_empty() {
            true => None,
            false => Some(Bytes::from(contents)),
        };
        response
    }

    /// 引擎自身产生的错误页（404、405、413 等）。
    pub fn from_status_code(code: u16, accept_encoding: &[HttpEncoding], id: u128) -> Self {
        let mut response = Self::new();
        if code == 204 {
            response.allow = Some(ALLOWED_METHODS.to_vec());
            response.set_code(code);
            return response;
        }
        response.content_encoding = decide_encoding(accept_encoding);
        if code == 405 {
            response.allow = Some(ALLOWED_METHODS.to_vec());
        }
        let content = match code {
            404 => HtmlBuilder::from_status_code(404, Some(
                r"<h2>噢！</h2><p>没有任何servlet注册在你请求的路径上。</p>"
            )),
            405 => HtmlBuilder::from_status_code(405, Some(
                r"<h2>噢！</h2><p>该路径上的servlet不支持这个HTTP方法。</p>"
            )),
            413 => HtmlBuilder::from_status_code(413, Some(
                r"<h2>噢！</h2><p>请求体超过了服务器允许的大小。</p>"
            )),
            500 => HtmlBuilder::from_status_code(500, Some(
                r"<h2>噢！</h2><p>服务器出现了一个内部错误。</p>"
            )),
            _ => HtmlBuilder::from_status_code(code, None),
        }
        .build();
        let content_compressed = match compress(content.clone().into_bytes(), response.content_encoding) {
            Ok(c) => c,
            Err(e) => {
                error!("[ID{}]压缩错误页失败: {}，返回未压缩内容", id, e);
                response.content_encoding = None;
                content.into_bytes()
            }
        };
        let bytes = Bytes::from(content_compressed);
        response.content_length = bytes.len() as u64;
        response.content = Some(bytes);
        response.content_type = Some("text/html;charset=utf-8".to_string());
        response.set_code(code);
        response
    }

    pub fn response_400(accept_encoding: &[HttpEncoding], id: u128) -> Self {
        Self::from_status_code(400, accept_encoding, id)
    }

    pub fn response_404(accept_encoding: &[HttpEncoding], id: u128) -> Self {
        Self::from_status_code(404, accept_encoding, id)
    }

    pub fn response_405(accept_encoding: &[HttpEncoding], id: u128) -> Self {
        Self::from_status_code(405, accept_encoding, id)
    }

    pub fn response_413(accept_encoding: &[HttpEncoding], id: u128) -> Self {
        Self::from_status_code(413, accept_encoding, id)
    }

    pub fn response_500(accept_encoding: &[HttpEncoding], id: u128) -> Self {
        Self::from_status_code(500, accept_encoding, id)
    }

    /// `OPTIONS` 请求的应答：204 + `Allow`
    pub fn response_options(id: u128) -> Self {
        debug!("[ID{}]请求方法为OPTIONS", id);
        Self::from_status_code(204, &[], id)
    }

    /// HEAD 请求只保留头部，`Content-Length` 仍然反映完整正文的长度
    pub fn strip_body(&mut self) -> &mut Self {
        self.content = None;
        self
    }

    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&info) => info.to_string(),
            None => {
                error!("未知的状态码：{}", code);
                "Unknown Status".to_string()
            }
        };
        self
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let version: &str = match self.version {
            HttpVersion::V1_0 => "HTTP/1.0",
            HttpVersion::V1_1 => "HTTP/1.1",
        };
        let status_code: &str = &self.status_code.to_string();
        let information: &str = &self.information;
        let content_length: &str = &self.content_length.to_string();
        let date: &str = &format_date(&self.date);
        let server: &str = &self.server_name;

        let mut header = [
            version,
            " ",
            status_code,
            " ",
            information,
            CRLF,
            match &self.content_type {
                Some(t) => ["Content-Type: ", t, CRLF].concat(),
                None => "".to_string(),
            }
            .as_str(),
            match self.content_encoding {
                Some(e) => ["Content-Encoding: ", &e.to_string(), CRLF].concat(),
                None => "".to_string(),
            }
            .as_str(),
            "Content-Length: ",
            content_length,
            CRLF,
            "Date: ",
            date,
            CRLF,
            "Server: ",
            server,
            CRLF,
            "Connection: close",
            CRLF,
            match &self.allow {
                Some(a) => {
                    let allow_str = a
                        .iter()
                        .map(|m| m.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    ["Allow: ", &allow_str, CRLF].concat()
                }
                None => "".to_string(),
            }
            .as_str(),
        ]
        .concat();
        for (name, value) in &self.headers {
            // 由引擎负责的头部不允许 servlet 覆盖
            if is_reserved_header(name) {
                continue;
            }
            header.push_str(&[name.as_str(), ": ", value.as_str(), CRLF].concat());
        }
        header.push_str(CRLF);
        [
            header.as_bytes(),
            match &self.content {
                Some(c) => c.as_ref(),
                None => &b""[..],
            },
        ]
        .concat()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_encoding(&self) -> Option<HttpEncoding> {
        self.content_encoding
    }

    pub fn get_content_length(&self) -> u64 {
        self.content_length
    }
}

fn is_reserved_header(name: &str) -> bool {
    ["content-length", "content-type", "date", "server", "connection", "transfer-encoding"]
        .iter()
        .any(|h| name.eq_ignore_ascii_case(h))
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc2822()
}

fn compress(data: Vec<u8>, mode: Option<HttpEncoding>) -> io::Result<Vec<u8>> {
    let original_size = data.len();
    let result = match mode {
        Some(HttpEncoding::Gzip) => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Deflate) => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Br) => {
            let params = BrotliEncoderParams::default();
            let mut output = Vec::new();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
        None => return Ok(data),
    };

    if let Ok(ref compressed) = result {
        debug!(
            "压缩完成: {:?}, 原始大小: {} bytes, 压缩后: {} bytes",
            mode,
            original_size,
            compressed.len()
        );
    }

    result
}

fn should_skip_compression(mime_type: &str) -> bool {
    let skip_types = [
        "image/jpeg",
        "image/jpg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/bmp",
        "image/x-icon",
        "video/",
        "audio/",
        "application/zip",
        "application/x-rar",
        "application/x-7z-compressed",
        "application/gzip",
        "application/x-gzip",
        "application/octet-stream",
        "font/woff",
        "font/woff2",
        "application/vnd.ms-fontobject",
    ];

    skip_types
        .iter()
        .any(|&skip_type| mime_type.starts_with(skip_type))
}

// gzip 优先，其次 deflate，最后才考虑 brotli（压缩慢）
fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    if accept_encoding.contains(&HttpEncoding::Gzip) {
        Some(HttpEncoding::Gzip)
    } else if accept_encoding.contains(&HttpEncoding::Deflate) {
        Some(HttpEncoding::Deflate)
    } else if accept_encoding.contains(&HttpEncoding::Br) {
        Some(HttpEncoding::Br)
    } else {
        None
    }
}
