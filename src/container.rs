// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Servlet 容器
//!
//! 容器拥有内嵌引擎、上传暂存目录、路由表以及注册表跟踪器，对外提供 `start` / `stop`。
//!
//! ## 加锁约定
//! - `state` 锁保护引擎句柄、暂存目录、容器前缀与路由表，持有时间尽量短，
//!   任何用户代码（`init` / `service` / `destroy`）都不会在持锁时调用。
//! - `lifecycle` 锁只在 `start` / `stop` 中持有，保证两者串行执行。
//! - 请求分发不经过容器锁，由引擎自己的处理器表完成。

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use log::{debug, error, info, warn};

use crate::{
    adapter::ServletHandler,
    config::ServerOptions,
    engine::{EngineHandler, HttpEngine},
    exception::Exception,
    param::PROP_CONTEXT_ROOT,
    registry::{ServiceReference, ServiceRegistry},
    router::{normalize_context_path, ContextRoot, Router},
    servlet::{Servlet, ServletContext},
    tracker::{ServiceTracker, TrackerCustomizer},
    util::{make_unique_temp_directory, remove_directory_recursive},
};

type Handler = Arc<ServletHandler>;

struct ContainerState {
    engine: Option<HttpEngine>,
    temp_dir: Option<PathBuf>,
    context_path: String,
    router: Router<Handler>,
}

pub(crate) struct ContainerInner {
    registry: ServiceRegistry<dyn Servlet>,
    state: Mutex<ContainerState>,
    lifecycle: Mutex<()>,
    tracker: Mutex<Option<ServiceTracker<dyn Servlet, Handler>>>,
    self_ref: Weak<ContainerInner>,
}

impl ContainerInner {
    fn lock(&self) -> MutexGuard<'_, ContainerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn get_context(&self, uripath: &str) -> Option<Arc<ServletContext>> {
        let root = ContextRoot::parse(uripath).ok()?;
        let state = self.lock();
        state.router.get(&root).map(|h| Arc::clone(h.context()))
    }

    /// 校验注册属性并取得 servlet 实例
    fn resolve(&self, reference: &ServiceReference) -> Result<(ContextRoot, Arc<dyn Servlet>), Exception> {
        let root = ContextRoot::from_property(reference.property(PROP_CONTEXT_ROOT))?;
        let servlet = self
            .registry
            .get_service(reference)
            .ok_or(Exception::ServletUnavailable)?;
        Ok((root, servlet))
    }

    /// 占用路由并创建适配器，之后由调用方在锁外完成 `init`
    fn reserve(&self, root: ContextRoot, servlet: Arc<dyn Servlet>) -> Result<Handler, Exception> {
        let mut state = self.lock();
        let temp_dir = match (&state.engine, &state.temp_dir) {
            (Some(_), Some(dir)) => dir.clone(),
            _ => return Err(Exception::ServletUnavailable),
        };
        if state.router.contains(&root) {
            return Err(Exception::ContextRootConflict(root.to_string()));
        }
        let context = Arc::new(ServletContext::new(self.self_ref.clone(), &state.context_path));
        let handler = Arc::new(ServletHandler::new(servlet, context, root.clone(), &temp_dir));
        state.router.insert(root, Arc::clone(&handler))?;
        Ok(handler)
    }

    /// 路由表中的条目仍然是 `handler` 时才移除
    fn release(&self, state: &mut ContainerState, handler: &Handler) -> bool {
        let root = handler.context_root();
        let owned = matches!(state.router.get(root), Some(current) if Arc::ptr_eq(current, handler));
        if !owned {
            return false;
        }
        state.router.remove(root);
        if let Some(engine) = &state.engine {
            engine.remove_handler(handler.engine_path());
        }
        true
    }

    fn install(&self, reference: &ServiceReference) -> Result<Handler, Exception> {
        let (root, servlet) = self.resolve(reference)?;
        let handler = self.reserve(root, servlet)?;

        if let Err(e) = handler.init() {
            let mut state = self.lock();
            self.release(&mut state, &handler);
            return Err(e);
        }

        let state = self.lock();
        let still_reserved = matches!(
            state.router.get(handler.context_root()),
            Some(current) if Arc::ptr_eq(current, &handler)
        );
        if still_reserved {
            if let Some(engine) = &state.engine {
                let engine_handler: Arc<dyn EngineHandler> = handler.clone();
                engine.add_handler(handler.engine_path(), engine_handler);
                return Ok(handler);
            }
        }
        // 初始化期间容器已经停止
        drop(state);
        handler.destroy();
        Err(Exception::ServletUnavailable)
    }
}

impl TrackerCustomizer<Handler> for ContainerInner {
    fn adding_service(&self, reference: &ServiceReference) -> Option<Handler> {
        match self.install(reference) {
            Ok(handler) => {
                info!(
                    "已安装servlet#{}（{}）于{}",
                    reference.id(),
                    reference.bundle(),
                    handler.engine_path()
                );
                Some(handler)
            }
            Err(e) if e.is_configuration_rejection() => {
                warn!("跳过servlet#{}（{}）：{}", reference.id(), reference.bundle(), e);
                None
            }
            Err(e) => {
                error!("servlet#{}（{}）初始化失败：{}", reference.id(), reference.bundle(), e);
                None
            }
        }
    }

    fn modified_service(&self, reference: &ServiceReference, tracked: &Handler) {
        // context root 安装后不可变
        debug!(
            "servlet#{}的属性已修改，仍保持安装于{}",
            reference.id(),
            tracked.context_root()
        );
    }

    fn removed_service(&self, reference: &ServiceReference, tracked: Handler) {
        let released = {
            let mut state = self.lock();
            self.release(&mut state, &tracked)
        };
        tracked.destroy();
        if released {
            info!("已移除servlet#{}（{}）", reference.id(), tracked.engine_path());
        }
    }
}

/// 动态 servlet 容器
pub struct ServletContainer {
    inner: Arc<ContainerInner>,
}

impl ServletContainer {
    /// 创建一个停止状态的容器，`context_path` 为全部 servlet 共享的路径前缀
    pub fn new(registry: ServiceRegistry<dyn Servlet>, context_path: &str) -> Self {
        let inner = Arc::new_cyclic(|self_ref| ContainerInner {
            registry,
            state: Mutex::new(ContainerState {
                engine: None,
                temp_dir: None,
                context_path: normalize_context_path(context_path),
                router: Router::new(),
            }),
            lifecycle: Mutex::new(()),
            tracker: Mutex::new(None),
            self_ref: self_ref.clone(),
        });
        Self { inner }
    }

    fn lifecycle(&self) -> MutexGuard<'_, ()> {
        match self.inner.lifecycle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 以默认参数启动：端口 8080，50 个工作线程
    pub fn start(&self) -> Result<(), Exception> {
        self.start_with(&ServerOptions::default())
    }

    /// 启动容器。已经启动时什么也不做。
    pub fn start_with(&self, options: &ServerOptions) -> Result<(), Exception> {
        let _lifecycle = self.lifecycle();
        if self.is_started() {
            debug!("容器已经启动");
            return Ok(());
        }

        let engine = match HttpEngine::start(options) {
            Ok(engine) => engine,
            Err(e) => {
                error!("Servlet Container could not be started: {}", e);
                return Err(e);
            }
        };
        let temp_dir = match make_unique_temp_directory(&options.temp_prefix) {
            Ok(dir) => dir,
            Err(e) => {
                error!("无法创建暂存目录：{}", e);
                engine.shutdown();
                return Err(e);
            }
        };
        for port in engine.listening_ports() {
            info!("Servlet Container listening on http://localhost:{}", port);
        }
        {
            let mut state = self.inner.lock();
            state.engine = Some(engine);
            state.temp_dir = Some(temp_dir);
        }

        let weak: Weak<ContainerInner> = Arc::downgrade(&self.inner);
        let customizer: Weak<dyn TrackerCustomizer<Handler>> = weak;
        let tracker = ServiceTracker::new(self.inner.registry.clone(), customizer);
        tracker.open();
        match self.inner.tracker.lock() {
            Ok(mut slot) => *slot = Some(tracker),
            Err(poisoned) => *poisoned.into_inner() = Some(tracker),
        }
        Ok(())
    }

    /// 停止容器。未启动时什么也不做。
    ///
    /// 返回时引擎不再发起新的回调，但已经进入 `service` 的请求不会被中断。
    pub fn stop(&self) {
        let _lifecycle = self.lifecycle();

        let tracker = match self.inner.tracker.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tracker) = tracker {
            tracker.close();
        }

        let (engine, handlers, temp_dir) = {
            let mut state = self.inner.lock();
            let engine = match state.engine.take() {
                Some(engine) => engine,
                None => return,
            };
            (engine, state.router.drain(), state.temp_dir.take())
        };

        for (_, handler) in &handlers {
            engine.remove_handler(handler.engine_path());
        }
        // 引擎关闭时等待进行中的请求，之后再销毁 servlet
        engine.shutdown();
        for (root, handler) in handlers {
            handler.destroy();
            debug!("已卸载{}", root);
        }

        if let Some(dir) = temp_dir {
            if let Err(e) = remove_directory_recursive(&dir) {
                error!("清理暂存目录失败：{}", e);
            }
        }
        info!("Servlet Container stopped");
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().engine.is_some()
    }

    /// 设置容器前缀。容器运行期间前缀固定，调用无效果。
    pub fn set_context_path(&self, path: &str) {
        let mut state = self.inner.lock();
        if state.engine.is_some() {
            warn!("容器运行中，忽略context path修改：{}", path);
            return;
        }
        state.context_path = normalize_context_path(path);
    }

    pub fn get_context_path(&self) -> String {
        self.inner.lock().context_path.clone()
    }

    /// 查找安装在 `uripath` 上的 servlet 的上下文
    pub fn get_context(&self, uripath: &str) -> Option<Arc<ServletContext>> {
        self.inner.get_context(uripath)
    }

    pub fn listening_ports(&self) -> Vec<u16> {
        match &self.inner.lock().engine {
            Some(engine) => engine.listening_ports(),
            None => Vec::new(),
        }
    }

    pub fn temp_dir(&self) -> Option<PathBuf> {
        self.inner.lock().temp_dir.clone()
    }

    /// 已安装的 context root，按安装顺序
    pub fn installed_roots(&self) -> Vec<String> {
        self.inner
            .lock()
            .router
            .roots()
            .into_iter()
            .map(|r| r.to_string())
            .collect()
    }

    pub fn active_connections(&self) -> usize {
        match &self.inner.lock().engine {
            Some(engine) => engine.active_connections(),
            None => 0,
        }
    }
}

impl Drop for ServletContainer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        registry::Properties, servlet_request::HttpServletRequest, servlet_response::HttpServletResponse,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        inits: AtomicUsize,
        destroys: AtomicUsize,
    }

    impl Servlet for Counting {
        fn init(&self, _config: crate::servlet::ServletConfig) -> Result<(), Exception> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn service(&self, _: &mut HttpServletRequest, _: &mut HttpServletResponse) -> Result<(), Exception> {
            Ok(())
        }

        fn destroy(&self) {
            self.destroys.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn rooted(root: &str) -> Properties {
        let mut p = Properties::new();
        p.insert(PROP_CONTEXT_ROOT.to_string(), json!(root));
        p
    }

    fn options() -> ServerOptions {
        ServerOptions::with_port(0).worker_threads(2)
    }

    fn engine_paths(container: &ServletContainer) -> Vec<String> {
        match &container.inner.lock().engine {
            Some(engine) => engine.handler_paths(),
            None => Vec::new(),
        }
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let container = ServletContainer::new(ServiceRegistry::new(), "");
        container.stop();
        assert!(!container.is_started());
        assert!(container.listening_ports().is_empty());
    }

    #[test]
    fn test_start_is_idempotent() {
        let container = ServletContainer::new(ServiceRegistry::new(), "");
        container.start_with(&options()).unwrap();
        let ports = container.listening_ports();
        let dir = container.temp_dir().unwrap();

        container.start_with(&options()).unwrap();
        assert_eq!(container.listening_ports(), ports);
        assert_eq!(container.temp_dir(), Some(dir.clone()));

        container.stop();
        assert!(!dir.exists());
        assert!(!container.is_started());
    }

    #[test]
    fn test_context_path_fixed_while_running() {
        let container = ServletContainer::new(ServiceRegistry::new(), "app/");
        assert_eq!(container.get_context_path(), "/app");
        container.set_context_path("/other");
        assert_eq!(container.get_context_path(), "/other");

        container.start_with(&options()).unwrap();
        container.set_context_path("/ignored");
        assert_eq!(container.get_context_path(), "/other");
        container.stop();
    }

    #[test]
    fn test_install_remove_and_stop_pair_init_with_destroy() {
        let registry: ServiceRegistry<dyn Servlet> = ServiceRegistry::new();
        let early = Arc::new(Counting::default());
        registry.register(early.clone(), rooted("/early"), "test");

        let container = ServletContainer::new(registry.clone(), "/app");
        container.start_with(&options()).unwrap();
        assert_eq!(container.installed_roots(), vec!["/early"]);

        let late = Arc::new(Counting::default());
        let registration = registry.register(late.clone(), rooted("/late"), "test");
        assert_eq!(container.installed_roots(), vec!["/early", "/late"]);
        assert_eq!(engine_paths(&container), vec!["/app/early", "/app/late"]);
        let context = container.get_context("/late").unwrap();
        assert_eq!(context.context_path(), "/app");
        assert!(context.get_context("/early").is_some());

        registration.unregister();
        assert_eq!(container.installed_roots(), vec!["/early"]);
        assert_eq!(engine_paths(&container), vec!["/app/early"]);
        assert!(container.get_context("/late").is_none());
        assert_eq!(late.inits.load(Ordering::SeqCst), 1);
        assert_eq!(late.destroys.load(Ordering::SeqCst), 1);

        container.stop();
        assert!(container.get_context("/early").is_none());
        assert!(container.installed_roots().is_empty());
        assert_eq!(early.inits.load(Ordering::SeqCst), 1);
        assert_eq!(early.destroys.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejections_leave_container_healthy() {
        let registry: ServiceRegistry<dyn Servlet> = ServiceRegistry::new();
        let container = ServletContainer::new(registry.clone(), "");
        container.start_with(&options()).unwrap();

        let first = Arc::new(Counting::default());
        let duplicate = Arc::new(Counting::default());
        registry.register(first.clone(), rooted("/dup"), "test");
        registry.register(duplicate.clone(), rooted("/dup/"), "test");
        registry.register(Arc::new(Counting::default()), Properties::new(), "test");
        registry.register(Arc::new(Counting::default()), rooted("/bad path"), "test");

        assert_eq!(container.installed_roots(), vec!["/dup"]);
        assert_eq!(first.inits.load(Ordering::SeqCst), 1);
        assert_eq!(duplicate.inits.load(Ordering::SeqCst), 0);
        assert!(container.is_started());
        container.stop();
        assert_eq!(duplicate.destroys.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_registrations_ignored_while_stopped() {
        let registry: ServiceRegistry<dyn Servlet> = ServiceRegistry::new();
        let container = ServletContainer::new(registry.clone(), "");
        container.start_with(&options()).unwrap();
        container.stop();

        let servlet = Arc::new(Counting::default());
        registry.register(servlet.clone(), rooted("/after"), "test");
        assert!(container.installed_roots().is_empty());
        assert_eq!(servlet.inits.load(Ordering::SeqCst), 0);
    }
}
