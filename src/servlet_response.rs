// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 响应门面
//!
//! servlet 看到的响应对象。正文先写入内存缓冲，`service` 返回后由适配器交给引擎，
//! 引擎负责压缩与写回。响应一旦提交（`send_error` 或 `flush_buffer`），
//! 状态码和头部就不能再修改。

use std::io;

use crate::{engine::HandlerReply, exception::Exception, param::STATUS_CODES, util::HtmlBuilder};

#[derive(Debug, Clone)]
pub struct HttpServletResponse {
    status: u16,
    content_type: Option<String>,
    content_length: Option<u64>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    committed: bool,
}

impl Default for HttpServletResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpServletResponse {
    /// 新响应的状态码预设为 200
    pub fn new() -> Self {
        Self {
            status: 200,
            content_type: None,
            content_length: None,
            headers: Vec::new(),
            body: Vec::new(),
            committed: false,
        }
    }

    fn ensure_uncommitted(&self) -> Result<(), Exception> {
        match self.committed {
            true => Err(Exception::ResponseCommitted),
            false => Ok(()),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, code: u16) -> Result<(), Exception> {
        self.ensure_uncommitted()?;
        if !STATUS_CODES.contains_key(&code) {
            return Err(Exception::InvalidStatusCode(code));
        }
        self.status = code;
        Ok(())
    }

    /// 以错误页替换当前内容并提交响应
    pub fn send_error(&mut self, code: u16, message: Option<&str>) -> Result<(), Exception> {
        self.set_status(code)?;
        self.body = HtmlBuilder::from_status_code(code, message).build().into_bytes();
        self.content_type = Some("text/html;charset=utf-8".to_string());
        self.content_length = None;
        self.committed = true;
        Ok(())
    }

    /// 设置头部，替换同名（不区分大小写）的已有值
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), Exception> {
        self.ensure_uncommitted()?;
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    pub fn add_header(&mut self, name: &str, value: &str) -> Result<(), Exception> {
        self.ensure_uncommitted()?;
        self.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_header(&self, name: &str) -> bool {
        self.get_header(name).is_some()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn set_content_type(&mut self, content_type: &str) -> Result<(), Exception> {
        self.ensure_uncommitted()?;
        self.content_type = Some(content_type.to_string());
        Ok(())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// 声明的正文长度。引擎总是按实际写出的字节数发送 `Content-Length`。
    pub fn set_content_length(&mut self, length: u64) -> Result<(), Exception> {
        self.ensure_uncommitted()?;
        self.content_length = Some(length);
        Ok(())
    }

    pub fn content_length(&self) -> u64 {
        self.content_length.unwrap_or(self.body.len() as u64)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// 清空状态、头部与正文，恢复为新建时的样子
    pub fn reset(&mut self) -> Result<(), Exception> {
        self.ensure_uncommitted()?;
        *self = Self::new();
        Ok(())
    }

    pub fn flush_buffer(&mut self) {
        self.committed = true;
    }

    pub fn into_reply(self) -> HandlerReply {
        HandlerReply {
            status: self.status,
            content_type: self.content_type,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl io::Write for HttpServletResponse {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer();
        Ok(())
    }
}
