// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 表单解码模块
//!
//! 内嵌引擎的表单处理部分：
//! - 查询字符串与 `application/x-www-form-urlencoded` 请求体按 `&`、`=` 切分。
//!   输入被视为已经由引擎清洗过，这里不做任何百分号解码。
//! - `multipart/form-data` 请求体按边界切分为普通字段与文件部件。
//!
//! 文件部件在这里只是内存中的原始数据，落盘由请求门面按需完成。

use bytes::Bytes;
use log::warn;

/// multipart 请求体中的一个文件部件（尚未落盘）。
#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub data: Bytes,
}

/// 解码后的表单：普通字段保持出现顺序，文件部件单独存放。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FormPart>,
}

/// 将 `a=1&b=2` 形式的字符串切分为键值对，保持出现顺序。
///
/// 没有 `=` 的片段视为值为空字符串的键，空片段被忽略。
pub fn split_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// 从 `Content-Type` 中提取 multipart 边界。
pub fn multipart_boundary(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let mime = params.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .filter_map(|p| p.trim().split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

/// 根据 `Content-Type` 解码请求体。不认识的内容类型返回空表单。
pub fn decode_body(content_type: Option<&str>, body: &Bytes) -> FormData {
    let content_type = match content_type {
        Some(t) => t,
        None => return FormData::default(),
    };
    let mime = content_type.split(';').next().unwrap_or("").trim();
    if mime.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        return FormData {
            fields: split_query(&String::from_utf8_lossy(body)),
            files: Vec::new(),
        };
    }
    match multipart_boundary(content_type) {
        Some(boundary) => parse_multipart(body, &boundary),
        None => FormData::default(),
    }
}

/// 切分 multipart 请求体。格式错误的部件被跳过并记录警告。
pub fn parse_multipart(body: &Bytes, boundary: &str) -> FormData {
    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();
    let mut form = FormData::default();

    let mut positions = Vec::new();
    let mut offset = 0;
    while let Some(pos) = find(&body[offset..], delimiter) {
        positions.push(offset + pos);
        offset += pos + delimiter.len();
    }

    for window in positions.windows(2) {
        let mut start = window[0] + delimiter.len();
        let mut end = window[1];
        if body[start..end].starts_with(b"\r\n") {
            start += 2;
        }
        if body[start..end].ends_with(b"\r\n") {
            end -= 2;
        }
        let section = &body[start..end];

        let split = match find(section, b"\r\n\r\n") {
            Some(split) => split,
            None => {
                warn!("multipart部件缺少头部结束标记，已跳过");
                continue;
            }
        };
        let head = String::from_utf8_lossy(&section[..split]);
        let data = body.slice(start + split + 4..end);

        let mut headers = Vec::new();
        let mut name = None;
        let mut filename = None;
        let mut content_type = None;
        for line in head.split("\r\n") {
            let (key, value) = match line.split_once(':') {
                Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
                None => continue,
            };
            if key.eq_ignore_ascii_case("content-disposition") {
                name = disposition_param(&value, "name");
                filename = disposition_param(&value, "filename");
            } else if key.eq_ignore_ascii_case("content-type") {
                content_type = Some(value.clone());
            }
            headers.push((key, value));
        }

        let name = match name {
            Some(n) => n,
            None => {
                warn!("multipart部件缺少name参数，已跳过");
                continue;
            }
        };
        match filename {
            Some(filename) => form.files.push(FormPart {
                name,
                filename: Some(filename),
                content_type,
                headers,
                data,
            }),
            None => form
                .fields
                .push((name, String::from_utf8_lossy(&data).into_owned())),
        }
    }
    form
}

fn disposition_param(value: &str, key: &str) -> Option<String> {
    value
        .split(';')
        .filter_map(|p| p.trim().split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
