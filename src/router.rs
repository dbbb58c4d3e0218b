// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路径路由表
//!
//! 记录 context root → 已安装处理器的映射，同时保留安装顺序，停机时按该顺序从引擎注销。
//! 路由表本身不加锁，由容器在自己的锁内访问。

use std::{collections::HashMap, fmt};

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::exception::Exception;

lazy_static! {
    static ref CONTEXT_ROOT_PATTERN: Regex =
        Regex::new(r"^(/[A-Za-z0-9._~!$&'()*+,;=:@%-]+)*/?$").unwrap();
}

/// 规范化后的 context root：以 `/` 开头，除根路径 `/` 外不以 `/` 结尾。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextRoot(String);

impl ContextRoot {
    /// 从注册属性解析。缺失或为空字符串视为未声明。
    pub fn from_property(value: Option<&Value>) -> Result<Self, Exception> {
        match value {
            None | Some(Value::Null) => Err(Exception::MissingContextRoot),
            Some(Value::String(s)) if s.trim().is_empty() => Err(Exception::MissingContextRoot),
            Some(Value::String(s)) => Self::parse(s),
            Some(other) => Err(Exception::InvalidContextRoot(other.to_string())),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, Exception> {
        let mut root = raw.trim().to_string();
        if !root.starts_with('/') {
            root.insert(0, '/');
        }
        while root.len() > 1 && root.ends_with('/') {
            root.pop();
        }
        if root.contains("//") || !CONTEXT_ROOT_PATTERN.is_match(&root) {
            return Err(Exception::InvalidContextRoot(raw.to_string()));
        }
        Ok(Self(root))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// 在引擎中注册的路径：容器前缀 + context root。
    /// 根 servlet 直接挂在容器前缀上。
    pub fn engine_path(&self, context_path: &str) -> String {
        match (self.is_root(), context_path.is_empty()) {
            (true, true) => "/".to_string(),
            (true, false) => context_path.to_string(),
            (false, _) => format!("{}{}", context_path, self.0),
        }
    }

    /// servlet path。根 servlet 的 servlet path 为空，整个剩余路径都是 path info。
    pub fn servlet_path(&self) -> &str {
        match self.is_root() {
            true => "",
            false => &self.0,
        }
    }
}

impl fmt::Display for ContextRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 容器级路径前缀的规范化：补全开头的 `/`，去掉结尾的 `/`，空字符串表示根。
pub fn normalize_context_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    match trimmed.is_empty() {
        true => String::new(),
        false if trimmed.starts_with('/') => trimmed.to_string(),
        false => format!("/{}", trimmed),
    }
}

/// context root → 处理器
#[derive(Debug)]
pub struct Router<H> {
    by_root: HashMap<ContextRoot, H>,
    order: Vec<ContextRoot>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self {
            by_root: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<H> Router<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 安装处理器。context root 已被占用时返回 `ContextRootConflict`，原有映射保持不变。
    pub fn insert(&mut self, root: ContextRoot, handler: H) -> Result<(), Exception> {
        if self.by_root.contains_key(&root) {
            return Err(Exception::ContextRootConflict(root.to_string()));
        }
        self.order.push(root.clone());
        self.by_root.insert(root, handler);
        Ok(())
    }

    pub fn remove(&mut self, root: &ContextRoot) -> Option<H> {
        let handler = self.by_root.remove(root)?;
        self.order.retain(|r| r != root);
        Some(handler)
    }

    pub fn get(&self, root: &ContextRoot) -> Option<&H> {
        self.by_root.get(root)
    }

    pub fn contains(&self, root: &ContextRoot) -> bool {
        self.by_root.contains_key(root)
    }

    /// 按安装顺序列出 context root
    pub fn roots(&self) -> Vec<ContextRoot> {
        self.order.clone()
    }

    /// 取出全部处理器（按安装顺序），路由表清空
    pub fn drain(&mut self) -> Vec<(ContextRoot, H)> {
        let mut by_root = std::mem::take(&mut self.by_root);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|root| by_root.remove(&root).map(|h| (root, h)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_root.is_empty()
    }
}
