// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 集成测试共用的原始 TCP 客户端与辅助函数

#![allow(dead_code)]

use std::{
    io::{Read, Write},
    net::TcpStream,
    time::Duration,
};

use serde_json::json;
use servlet_container::{Properties, ServerOptions, PROP_CONTEXT_ROOT};

/// 套接字读写操作的超时时间，防止服务端异常时测试无限期阻塞
const READ_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// 发送原始报文并读取到连接关闭为止。服务端直接关闭连接时返回空字符串。
pub fn send_raw(port: u16, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("连接失败");
    stream.set_read_timeout(Some(READ_WRITE_TIMEOUT)).unwrap();
    stream.set_write_timeout(Some(READ_WRITE_TIMEOUT)).unwrap();
    stream.write_all(raw).unwrap();

    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response);
    String::from_utf8_lossy(&response).into_owned()
}

pub fn request(port: u16, method: &str, target: &str) -> String {
    let raw = format!("{} {} HTTP/1.1\r\nHost: localhost:{}\r\n\r\n", method, target, port);
    send_raw(port, raw.as_bytes())
}

pub fn get(port: u16, target: &str) -> String {
    request(port, "GET", target)
}

/// 状态行中的状态码，空响应返回 0
pub fn status_of(response: &str) -> u16 {
    response
        .split("\r\n")
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0)
}

pub fn header_of<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    let head = response.split("\r\n\r\n").next()?;
    head.split("\r\n")
        .skip(1)
        .filter_map(|line| line.split_once(": "))
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

pub fn body_of(response: &str) -> &str {
    match response.split_once("\r\n\r\n") {
        Some((_, body)) => body,
        None => "",
    }
}

pub fn rooted(root: &str) -> Properties {
    let mut properties = Properties::new();
    properties.insert(PROP_CONTEXT_ROOT.to_string(), json!(root));
    properties
}

pub fn options() -> ServerOptions {
    ServerOptions::with_port(0).worker_threads(2)
}
