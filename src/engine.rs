// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 内嵌 HTTP 引擎
//!
//! 基于 Tokio 多线程运行时的小型 HTTP 引擎，servlet 容器只通过下面几个入口使用它：
//! - [`HttpEngine::start`]：按照 [`ServerOptions`] 创建运行时并绑定全部监听端口。
//! - [`HttpEngine::add_handler`] / [`HttpEngine::remove_handler`]：维护引擎内部的
//!   路径前缀 → 处理器表。请求到达时按最长前缀匹配分发。
//! - [`HttpEngine::listening_ports`]：实际绑定的端口（端口 0 会被替换为系统分配的端口）。
//!
//! 每个连接在独立的 Tokio 任务中读取和解析，处理器本身是同步代码，
//! 通过 `spawn_blocking` 在阻塞线程池中执行，避免长时间运行的 servlet 卡住 I/O 线程。
//! 每个连接只处理一个请求，响应后关闭。

use std::{
    collections::HashMap,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, RwLock,
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    runtime::{Builder, Handle, Runtime},
    sync::watch,
};

use crate::{
    config::ServerOptions,
    exception::Exception,
    param::{HttpEncoding, HttpRequestMethod, MAX_HEADER_SIZE},
    request::{header_end, Request},
    response::Response,
};

/// 停止引擎时等待仍在执行的处理器的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// 处理器交给引擎的响应内容。引擎负责压缩、补全标准头部并写回客户端。
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// 一次回调的处理结果。
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// 请求已处理，引擎写回响应
    Handled(HandlerReply),
    /// 请求视为已处理，但不写回任何内容
    Ignored,
    /// 处理器没有实现该 HTTP 方法，引擎返回 405
    NotImplemented,
    /// 处理器失败，引擎直接关闭连接
    Failed(String),
}

/// 引擎按路径回调的处理器。未覆盖的方法默认返回 [`DispatchOutcome::NotImplemented`]。
pub trait EngineHandler: Send + Sync {
    fn handle_get(&self, _conn: &Connection) -> DispatchOutcome {
        DispatchOutcome::NotImplemented
    }

    fn handle_post(&self, _conn: &Connection) -> DispatchOutcome {
        DispatchOutcome::NotImplemented
    }

    fn handle_put(&self, _conn: &Connection) -> DispatchOutcome {
        DispatchOutcome::NotImplemented
    }

    fn handle_delete(&self, _conn: &Connection) -> DispatchOutcome {
        DispatchOutcome::NotImplemented
    }
}

/// 一个已解析请求的连接信息。
#[derive(Debug, Clone)]
pub struct Connection {
    id: u128,
    request: Request,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
}

impl Connection {
    pub fn new(id: u128, request: Request, local_addr: SocketAddr, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            request,
            local_addr,
            remote_addr,
        }
    }

    /// 直接由原始报文构建连接，便于在没有网络的情况下驱动处理器。
    pub fn from_raw(raw: &[u8], id: u128) -> Result<Self, Exception> {
        let request = Request::try_from(raw, id)?;
        let local = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8080));
        let remote = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 50000));
        Ok(Self::new(id, request, local, remote))
    }

    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.request.method()
    }

    /// 本地 URI（不含查询字符串）。请求目标不是以 `/` 开头的绝对路径时为 `None`，
    /// 例如 `OPTIONS *`。
    pub fn local_uri(&self) -> Option<&str> {
        let path = self.request.path();
        match path.starts_with('/') {
            true => Some(path),
            false => None,
        }
    }

    pub fn query_string(&self) -> Option<&str> {
        self.request.query_string()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn headers(&self) -> &[(String, String)] {
        self.request.headers()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.request.content_type()
    }

    pub fn body(&self) -> &Bytes {
        self.request.body()
    }

    pub fn accept_encoding(&self) -> &[HttpEncoding] {
        self.request.accept_encoding()
    }

    pub fn scheme(&self) -> &'static str {
        "http"
    }

    /// `Host` 头中的主机名，缺失时使用本地地址
    pub fn server_name(&self) -> String {
        match self.request.host() {
            Some(host) => match host.rsplit_once(':') {
                Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name.to_string(),
                _ => host.to_string(),
            },
            None => self.local_addr.ip().to_string(),
        }
    }

    pub fn server_port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

/// 引擎内部的路径前缀 → 处理器表
#[derive(Default)]
struct HandlerTable {
    handlers: HashMap<String, Arc<dyn EngineHandler>>,
}

impl HandlerTable {
    /// 最长前缀匹配。前缀必须落在路径段边界上：`/svc` 匹配 `/svc` 与 `/svc/x`，不匹配 `/svcx`。
    fn lookup(&self, uri: &str) -> Option<(String, Arc<dyn EngineHandler>)> {
        self.handlers
            .iter()
            .filter(|(prefix, _)| matches_prefix(prefix, uri))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(prefix, handler)| (prefix.clone(), Arc::clone(handler)))
    }
}

pub fn matches_prefix(prefix: &str, uri: &str) -> bool {
    if !uri.starts_with(prefix) {
        return false;
    }
    uri.len() == prefix.len() || prefix.ends_with('/') || uri.as_bytes()[prefix.len()] == b'/'
}

/// 所有连接任务共享的引擎状态
struct EngineShared {
    handlers: RwLock<HandlerTable>,
    max_request_size: usize,
    enable_compression: bool,
    next_id: AtomicU64,
    active_connections: AtomicUsize,
}

impl EngineShared {
    fn lookup(&self, uri: &str) -> Option<(String, Arc<dyn EngineHandler>)> {
        let table = match self.handlers.read() {
            Ok(table) => table,
            Err(poisoned) => {
                warn!("处理器表读锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        };
        table.lookup(uri)
    }
}

/// 运行中的内嵌 HTTP 引擎
pub struct HttpEngine {
    runtime: Option<Runtime>,
    shared: Arc<EngineShared>,
    ports: Vec<u16>,
    shutdown_tx: watch::Sender<bool>,
}

impl HttpEngine {
    /// 创建运行时并绑定全部监听端口。任何一个端口绑定失败都会使整个启动失败。
    pub fn start(options: &ServerOptions) -> Result<Self, Exception> {
        if options.listening_ports.is_empty() {
            return Err(Exception::ListenerStartFailure("没有指定监听端口".to_string()));
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(options.worker_threads.max(1))
            .thread_name("servlet-engine")
            .enable_all()
            .build()
            .map_err(|e| Exception::ListenerStartFailure(e.to_string()))?;

        let address = match options.local {
            true => Ipv4Addr::new(127, 0, 0, 1),
            false => Ipv4Addr::new(0, 0, 0, 0),
        };

        let mut listeners = Vec::new();
        let mut ports = Vec::new();
        for &port in &options.listening_ports {
            let socket = SocketAddrV4::new(address, port);
            let bound = std::net::TcpListener::bind(socket).and_then(|l| {
                l.set_nonblocking(true)?;
                let _guard = runtime.enter();
                TcpListener::from_std(l)
            });
            match bound {
                Ok(listener) => {
                    let local = listener
                        .local_addr()
                        .map_err(|e| Exception::ListenerStartFailure(e.to_string()));
                    match local {
                        Ok(local) => ports.push(local.port()),
                        Err(e) => {
                            runtime.shutdown_background();
                            return Err(e);
                        }
                    }
                    listeners.push(listener);
                }
                Err(e) => {
                    error!("无法绑定端口：{}，错误：{}", port, e);
                    runtime.shutdown_background();
                    return Err(Exception::ListenerStartFailure(format!("{}: {}", socket, e)));
                }
            }
        }

        let shared = Arc::new(EngineShared {
            handlers: RwLock::new(HandlerTable::default()),
            max_request_size: options.max_request_size,
            enable_compression: options.enable_compression,
            next_id: AtomicU64::new(0),
            active_connections: AtomicUsize::new(0),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        for listener in listeners {
            runtime.spawn(accept_loop(listener, Arc::clone(&shared), shutdown_rx.clone()));
        }
        debug!("引擎已启动，工作线程数：{}", options.worker_threads.max(1));

        Ok(Self {
            runtime: Some(runtime),
            shared,
            ports,
            shutdown_tx,
        })
    }

    /// 注册处理器。同一路径重复注册会替换旧的处理器。
    pub fn add_handler(&self, path: &str, handler: Arc<dyn EngineHandler>) {
        let mut table = match self.shared.handlers.write() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };
        if table.handlers.insert(path.to_string(), handler).is_some() {
            warn!("路径{}上的处理器被替换", path);
        }
        debug!("引擎注册处理器：{}", path);
    }

    /// 移除处理器。移除后引擎不会再为该路径发起新的回调。
    pub fn remove_handler(&self, path: &str) -> bool {
        let mut table = match self.shared.handlers.write() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };
        let removed = table.handlers.remove(path).is_some();
        debug!("引擎移除处理器：{}（存在：{}）", path, removed);
        removed
    }

    /// 当前注册在引擎上的全部路径
    pub fn handler_paths(&self) -> Vec<String> {
        let table = match self.shared.handlers.read() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut paths: Vec<String> = table.handlers.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn listening_ports(&self) -> Vec<u16> {
        self.ports.clone()
    }

    pub fn active_connections(&self) -> usize {
        self.shared.active_connections.load(Ordering::SeqCst)
    }

    /// 停止接受新连接并关闭运行时。
    ///
    /// 已经进入处理器的请求最多等待 `SHUTDOWN_GRACE`；在异步上下文中调用时无法等待，
    /// 只能让运行时在后台关闭。
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        let runtime = match self.runtime.take() {
            Some(runtime) => runtime,
            None => return,
        };
        let _ = self.shutdown_tx.send(true);
        match Handle::try_current() {
            Ok(_) => runtime.shutdown_background(),
            Err(_) => runtime.shutdown_timeout(SHUTDOWN_GRACE),
        }
        if let Ok(mut table) = self.shared.handlers.write() {
            table.handlers.clear();
        }
        info!("引擎已停止，端口{:?}已释放", self.ports);
    }
}

impl Drop for HttpEngine {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

/// 活跃连接计数。任务结束或展开时都会归还。
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(shared: &'a EngineShared) -> Self {
        shared.active_connections.fetch_add(1, Ordering::SeqCst);
        Self(&shared.active_connections)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<EngineShared>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("监听循环接收到停机指令，正在退出...");
                break;
            }
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("接受TCP连接失败：{}", e);
                        continue;
                    }
                };
                let id = shared.next_id.fetch_add(1, Ordering::SeqCst) as u128;
                debug!("[ID{}]新的连接：{}", id, addr);
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _guard = ActiveGuard::enter(&shared);
                    handle_connection(stream, addr, id, &shared).await;
                });
            }
        }
    }
}

/// 读取一个完整的请求：先读到请求头结束，再按 `Content-Length` 读完请求体
async fn read_request(
    stream: &mut TcpStream,
    id: u128,
    max_request_size: usize,
) -> Result<Option<Request>, Exception> {
    let mut buffer = Vec::with_capacity(4096);
    let mut chunk = vec![0u8; 4096];

    let body_start = loop {
        let n = stream.read(&mut chunk).await.map_err(|_| Exception::MalformedRequest)?;
        if n == 0 {
            if buffer.is_empty() {
                // 客户端主动关闭连接
                return Ok(None);
            }
            return Err(Exception::MalformedRequest);
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = header_end(&buffer) {
            break pos;
        }
        if buffer.len() > MAX_HEADER_SIZE {
            error!("[ID{}]请求头超过{}字节", id, MAX_HEADER_SIZE);
            return Err(Exception::MalformedRequest);
        }
    };

    let head = Request::try_from(&buffer, id)?;
    let total = match body_start.checked_add(head.content_length()) {
        Some(total) if total <= max_request_size => total,
        Some(total) => {
            warn!("[ID{}]请求大小{}超过上限{}", id, total, max_request_size);
            return Err(Exception::PayloadTooLarge);
        }
        None => {
            warn!("[ID{}]Content-Length {}溢出", id, head.content_length());
            return Err(Exception::PayloadTooLarge);
        }
    };
    while buffer.len() < total {
        let n = stream.read(&mut chunk).await.map_err(|_| Exception::MalformedRequest)?;
        if n == 0 {
            error!("[ID{}]请求体不完整：{}/{}", id, buffer.len(), total);
            return Err(Exception::MalformedRequest);
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    debug!("[ID{}]HTTP请求接收完毕，共{}字节", id, buffer.len());
    Request::try_from(&buffer, id).map(Some)
}

/// # 连接处理器
///
/// 负责单个 TCP 流的生命周期：读取解析请求、查找处理器、在阻塞线程池中执行回调、写回响应。
async fn handle_connection(mut stream: TcpStream, remote: SocketAddr, id: u128, shared: &EngineShared) {
    let start_time = Instant::now();
    let local = match stream.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("[ID{}]无法获取本地地址：{}", id, e);
            return;
        }
    };

    let request = match read_request(&mut stream, id, shared.max_request_size).await {
        Ok(Some(request)) => request,
        Ok(None) => return,
        Err(e) => {
            warn!("[ID{}]解析HTTP请求失败: {}", id, e);
            let response = match e {
                Exception::PayloadTooLarge => Response::response_413(&[], id),
                Exception::UnSupportedRequestMethod => Response::response_405(&[], id),
                _ => Response::response_400(&[], id),
            };
            let _ = stream.write_all(&response.as_bytes()).await;
            let _ = stream.shutdown().await;
            return;
        }
    };
    let method = request.method();
    let accept_encoding = request.accept_encoding().to_vec();

    if method == HttpRequestMethod::Options {
        let response = Response::response_options(id);
        let _ = stream.write_all(&response.as_bytes()).await;
        let _ = stream.shutdown().await;
        return;
    }

    let route = shared.lookup(request.path());
    let response = match route {
        None => {
            warn!("[ID{}]路径{}上没有注册处理器，返回404", id, request.path());
            Some(Response::response_404(&accept_encoding, id))
        }
        Some((prefix, handler)) => {
            debug!("[ID{}]路径{}匹配处理器{}", id, request.path(), prefix);
            let conn = Connection::new(id, request.clone(), local, remote);
            let outcome = tokio::task::spawn_blocking(move || dispatch(handler.as_ref(), &conn)).await;
            match outcome {
                Ok(DispatchOutcome::Handled(reply)) => {
                    let mut response = Response::from_servlet(
                        reply.status,
                        reply.content_type,
                        reply.headers,
                        reply.body,
                        &accept_encoding,
                        shared.enable_compression,
                        id,
                    );
                    if method == HttpRequestMethod::Head {
                        response.strip_body();
                    }
                    Some(response)
                }
                Ok(DispatchOutcome::Ignored) => None,
                Ok(DispatchOutcome::NotImplemented) => Some(Response::response_405(&accept_encoding, id)),
                Ok(DispatchOutcome::Failed(reason)) => {
                    error!("[ID{}]处理器执行失败，关闭连接：{}", id, reason);
                    None
                }
                Err(e) => {
                    error!("[ID{}]处理器任务异常终止：{}", id, e);
                    Some(Response::response_500(&accept_encoding, id))
                }
            }
        }
    };

    if let Some(response) = response {
        info!(
            "[ID{}] {}, {}, {}, {}, {}, {}",
            id,
            request.version(),
            request.target(),
            method,
            response.status_code(),
            response.information(),
            request.user_agent(),
        );
        let response_bytes = response.as_bytes();
        debug!("[ID{}]发送全量响应，长度: {}", id, response_bytes.len());
        if let Err(e) = stream.write_all(&response_bytes).await {
            error!("[ID{}]发送响应失败: {}", id, e);
        }
        let _ = stream.flush().await;
    }
    let _ = stream.shutdown().await;
    debug!(
        "[ID{}]连接处理完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );
}

/// 按请求方法回调处理器。HEAD 按 GET 处理，正文由引擎剥离。
pub fn dispatch(handler: &dyn EngineHandler, conn: &Connection) -> DispatchOutcome {
    match conn.method() {
        HttpRequestMethod::Get | HttpRequestMethod::Head => handler.handle_get(conn),
        HttpRequestMethod::Post => handler.handle_post(conn),
        HttpRequestMethod::Put => handler.handle_put(conn),
        HttpRequestMethod::Delete => handler.handle_delete(conn),
        HttpRequestMethod::Options => DispatchOutcome::NotImplemented,
    }
}
