// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Servlet 约定
//!
//! 注册到服务注册表的 servlet 需要实现 [`Servlet`]：
//! - `init` 在安装时调用一次，携带绑定到容器的 [`ServletContext`]；
//! - `service` 在引擎的阻塞线程中并发调用，实现必须是线程安全的；
//! - `destroy` 在注销或容器停止时调用一次，且只有 `init` 成功后才会调用。

use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{
    container::ContainerInner,
    exception::Exception,
    servlet_request::HttpServletRequest,
    servlet_response::HttpServletResponse,
    util::get_mime_type,
};

pub trait Servlet: Send + Sync {
    fn init(&self, _config: ServletConfig) -> Result<(), Exception> {
        Ok(())
    }

    fn service(
        &self,
        request: &mut HttpServletRequest,
        response: &mut HttpServletResponse,
    ) -> Result<(), Exception>;

    fn destroy(&self) {}
}

/// 传给 `Servlet::init` 的配置
#[derive(Debug, Clone)]
pub struct ServletConfig {
    context: Arc<ServletContext>,
}

impl ServletConfig {
    pub(crate) fn new(context: Arc<ServletContext>) -> Self {
        Self { context }
    }

    pub fn servlet_context(&self) -> &Arc<ServletContext> {
        &self.context
    }
}

/// 每个已安装 servlet 的上下文，只能由容器创建。
///
/// 上下文只弱引用容器，容器销毁后 `get_context` 返回 `None`。
pub struct ServletContext {
    container: Weak<ContainerInner>,
    context_path: String,
}

impl ServletContext {
    pub(crate) fn new(container: Weak<ContainerInner>, context_path: &str) -> Self {
        Self {
            container,
            context_path: context_path.to_string(),
        }
    }

    /// 容器级路径前缀，根前缀为空字符串
    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    /// 查找同一容器中安装在 `uripath` 上的 servlet 的上下文
    pub fn get_context(&self, uripath: &str) -> Option<Arc<ServletContext>> {
        self.container.upgrade()?.get_context(uripath)
    }

    pub fn mime_type(&self, file: &str) -> String {
        get_mime_type(file)
    }
}

impl fmt::Debug for ServletContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServletContext")
            .field("context_path", &self.context_path)
            .field("container_alive", &(self.container.strong_count() > 0))
            .finish()
    }
}
