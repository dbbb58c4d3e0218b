// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Servlet 适配器
//!
//! 每个已安装的 servlet 对应一个 [`ServletHandler`]，注册在引擎的处理器表中。
//! 它把引擎按方法发起的回调转换成对 `Servlet::service` 的调用：
//! 计算 servlet path 与 path info，构建请求与响应门面，捕获用户代码的错误与 panic。
//!
//! 适配器同时维护 servlet 的生命周期状态，保证 `destroy` 只在 `init` 成功后调用且只调用一次。

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, error};

use crate::{
    engine::{Connection, DispatchOutcome, EngineHandler},
    exception::Exception,
    router::ContextRoot,
    servlet::{Servlet, ServletConfig, ServletContext},
    servlet_request::HttpServletRequest,
    servlet_response::HttpServletResponse,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum LifecycleState {
    /// 已占用路由，`init` 尚未完成
    Initializing,
    Active,
    /// `init` 期间收到了销毁请求，由 `init` 完成后负责销毁
    DestroyPending,
    Destroyed,
}

/// 从 URI 中去掉容器前缀与 servlet path，得到 path info。
/// URI 不以这两者为前缀时返回 `None`。
pub fn path_info<'a>(uri: &'a str, context_path: &str, servlet_path: &str) -> Option<&'a str> {
    uri.strip_prefix(context_path)?.strip_prefix(servlet_path)
}

pub struct ServletHandler {
    servlet: Arc<dyn Servlet>,
    context: Arc<ServletContext>,
    root: ContextRoot,
    engine_path: String,
    temp_dir: PathBuf,
    state: Mutex<LifecycleState>,
}

impl ServletHandler {
    pub(crate) fn new(
        servlet: Arc<dyn Servlet>,
        context: Arc<ServletContext>,
        root: ContextRoot,
        temp_dir: &Path,
    ) -> Self {
        let engine_path = root.engine_path(context.context_path());
        Self {
            servlet,
            context,
            root,
            engine_path,
            temp_dir: temp_dir.to_path_buf(),
            state: Mutex::new(LifecycleState::Initializing),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LifecycleState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn context_root(&self) -> &ContextRoot {
        &self.root
    }

    /// 该 servlet 在引擎中注册的路径
    pub fn engine_path(&self) -> &str {
        &self.engine_path
    }

    pub fn context(&self) -> &Arc<ServletContext> {
        &self.context
    }

    /// 调用 `Servlet::init`。初始化期间已被要求销毁时，初始化成功后立即销毁并返回错误。
    pub(crate) fn init(&self) -> Result<(), Exception> {
        let config = ServletConfig::new(Arc::clone(&self.context));
        let result = match panic::catch_unwind(AssertUnwindSafe(|| self.servlet.init(config))) {
            Ok(result) => result,
            Err(payload) => Err(Exception::Servlet(panic_message(payload.as_ref()))),
        };

        let mut state = self.lock();
        match (result, *state) {
            (Ok(()), LifecycleState::Initializing) => {
                *state = LifecycleState::Active;
                Ok(())
            }
            (Ok(()), _) => {
                *state = LifecycleState::Destroyed;
                drop(state);
                debug!("{}在初始化期间被移除，立即销毁", self.root);
                self.servlet.destroy();
                Err(Exception::ServletUnavailable)
            }
            (Err(e), _) => {
                *state = LifecycleState::Destroyed;
                Err(e)
            }
        }
    }

    /// 调用 `Servlet::destroy`，重复调用无效果
    pub(crate) fn destroy(&self) {
        let mut state = self.lock();
        match *state {
            LifecycleState::Active => {
                *state = LifecycleState::Destroyed;
                drop(state);
                if panic::catch_unwind(AssertUnwindSafe(|| self.servlet.destroy())).is_err() {
                    error!("{}的destroy发生panic", self.root);
                }
                debug!("{}已销毁", self.root);
            }
            LifecycleState::Initializing => *state = LifecycleState::DestroyPending,
            LifecycleState::DestroyPending | LifecycleState::Destroyed => {}
        }
    }

    fn dispatch(&self, conn: &Connection, bind_temp_dir: bool) -> DispatchOutcome {
        let uri = match conn.local_uri() {
            Some(uri) => uri,
            None => {
                debug!("[ID{}]连接没有本地URI，忽略", conn.id());
                return DispatchOutcome::Ignored;
            }
        };
        let context_path = self.context.context_path();
        let servlet_path = self.root.servlet_path();
        debug_assert!(
            path_info(uri, context_path, servlet_path).is_some(),
            "{} 不以 {}{} 开头",
            uri,
            context_path,
            servlet_path
        );
        let info = match path_info(uri, context_path, servlet_path) {
            Some(info) => info,
            None => {
                error!(
                    "[ID{}]路由错误：{}不以{}{}开头",
                    conn.id(),
                    uri,
                    context_path,
                    servlet_path
                );
                return DispatchOutcome::Failed(format!("{} is outside {}", uri, self.engine_path));
            }
        };

        let temp_dir = match bind_temp_dir {
            true => Some(self.temp_dir.clone()),
            false => None,
        };
        let mut request =
            HttpServletRequest::new(conn.clone(), Arc::clone(&self.context), servlet_path, info, temp_dir);
        let mut response = HttpServletResponse::new();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.servlet.service(&mut request, &mut response)
        }));
        match result {
            Ok(Ok(())) => DispatchOutcome::Handled(response.into_reply()),
            Ok(Err(e)) => {
                error!("[ID{}]{}处理请求失败：{}", conn.id(), self.root, e);
                DispatchOutcome::Failed(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("[ID{}]{}处理请求时发生panic：{}", conn.id(), self.root, message);
                DispatchOutcome::Failed(message)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    match payload.downcast_ref::<&str>() {
        Some(s) => s.to_string(),
        None => match payload.downcast_ref::<String>() {
            Some(s) => s.clone(),
            None => "unknown panic".to_string(),
        },
    }
}

impl EngineHandler for ServletHandler {
    fn handle_get(&self, conn: &Connection) -> DispatchOutcome {
        self.dispatch(conn, false)
    }

    fn handle_post(&self, conn: &Connection) -> DispatchOutcome {
        self.dispatch(conn, true)
    }

    fn handle_put(&self, conn: &Connection) -> DispatchOutcome {
        self.handle_post(conn)
    }

    fn handle_delete(&self, conn: &Connection) -> DispatchOutcome {
        self.handle_post(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dispatch;
    use proptest::prelude::*;
    use std::{
        io::Write,
        sync::{atomic::AtomicUsize, atomic::Ordering, Weak},
    };

    /// 把 servlet path 与 path info 写回正文
    struct Echo {
        destroyed: AtomicUsize,
    }

    impl Servlet for Echo {
        fn service(
            &self,
            request: &mut HttpServletRequest,
            response: &mut HttpServletResponse,
        ) -> Result<(), Exception> {
            write!(
                response,
                "{}|{}|{}|{}",
                request.context_path(),
                request.servlet_path(),
                request.path_info(),
                request.method()
            )?;
            Ok(())
        }

        fn destroy(&self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Faulty;

    impl Servlet for Faulty {
        fn service(&self, request: &mut HttpServletRequest, _: &mut HttpServletResponse) -> Result<(), Exception> {
            match request.path_info() {
                "/panic" => panic!("boom"),
                _ => Err(Exception::Servlet("bad".to_string())),
            }
        }
    }

    fn handler(servlet: Arc<dyn Servlet>, prefix: &str, root: &str) -> ServletHandler {
        let context = Arc::new(ServletContext::new(Weak::new(), prefix));
        let root = ContextRoot::parse(root).unwrap();
        ServletHandler::new(servlet, context, root, &std::env::temp_dir())
    }

    fn body(outcome: DispatchOutcome) -> String {
        match outcome {
            DispatchOutcome::Handled(reply) => String::from_utf8(reply.body).unwrap(),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    fn echo() -> Arc<Echo> {
        Arc::new(Echo {
            destroyed: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_path_info_with_extra_segment() {
        let h = handler(echo(), "/app", "/svc");
        assert_eq!(h.engine_path(), "/app/svc");
        let conn = Connection::from_raw(b"GET /app/svc/extra HTTP/1.1\r\n\r\n", 1).unwrap();
        assert_eq!(body(dispatch(&h, &conn)), "/app|/svc|/extra|GET");
    }

    #[test]
    fn test_path_info_empty_on_exact_match() {
        let h = handler(echo(), "/app", "/svc");
        let conn = Connection::from_raw(b"GET /app/svc HTTP/1.1\r\n\r\n", 1).unwrap();
        assert_eq!(body(dispatch(&h, &conn)), "/app|/svc||GET");
    }

    #[test]
    fn test_root_servlet_gets_whole_path_as_info() {
        let h = handler(echo(), "", "/");
        assert_eq!(h.engine_path(), "/");
        let conn = Connection::from_raw(b"GET /a/b HTTP/1.1\r\n\r\n", 1).unwrap();
        assert_eq!(body(dispatch(&h, &conn)), "||/a/b|GET");
    }

    #[test]
    fn test_put_and_delete_take_the_post_path() {
        let h = handler(echo(), "", "/svc");
        for method in ["PUT", "DELETE", "POST"] {
            let raw = format!("{} /svc/x HTTP/1.1\r\n\r\n", method);
            let conn = Connection::from_raw(raw.as_bytes(), 1).unwrap();
            assert_eq!(body(dispatch(&h, &conn)), format!("|/svc|/x|{}", method));
        }
    }

    #[test]
    fn test_missing_local_uri_is_ignored() {
        let h = handler(echo(), "", "/svc");
        let conn = Connection::from_raw(b"GET * HTTP/1.1\r\n\r\n", 1).unwrap();
        assert_eq!(h.handle_get(&conn), DispatchOutcome::Ignored);
    }

    #[test]
    fn test_errors_and_panics_become_failures() {
        let h = handler(Arc::new(Faulty), "", "/f");
        let conn = Connection::from_raw(b"GET /f/err HTTP/1.1\r\n\r\n", 1).unwrap();
        assert!(matches!(dispatch(&h, &conn), DispatchOutcome::Failed(_)));

        let conn = Connection::from_raw(b"GET /f/panic HTTP/1.1\r\n\r\n", 2).unwrap();
        assert_eq!(dispatch(&h, &conn), DispatchOutcome::Failed("boom".to_string()));

        // 处理器仍然可用
        let conn = Connection::from_raw(b"GET /f HTTP/1.1\r\n\r\n", 3).unwrap();
        assert!(matches!(dispatch(&h, &conn), DispatchOutcome::Failed(_)));
    }

    #[test]
    fn test_destroy_only_after_successful_init() {
        let servlet = echo();
        let h = handler(servlet.clone(), "", "/svc");
        h.init().unwrap();
        h.destroy();
        h.destroy();
        assert_eq!(servlet.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destroy_requested_during_init() {
        let servlet = echo();
        let h = handler(servlet.clone(), "", "/svc");
        h.destroy();
        assert_eq!(servlet.destroyed.load(Ordering::SeqCst), 0);
        assert_eq!(h.init(), Err(Exception::ServletUnavailable));
        assert_eq!(servlet.destroyed.load(Ordering::SeqCst), 1);
        h.destroy();
        assert_eq!(servlet.destroyed.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn path_info_is_the_suffix(prefix in "(/[a-z]{1,5}){0,2}", root in "/[a-z]{1,5}", rest in "(/[a-z]{0,5}){0,3}") {
            let uri = format!("{}{}{}", prefix, root, rest);
            prop_assert_eq!(path_info(&uri, &prefix, &root), Some(rest.as_str()));
        }
    }
}
