// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use num_cpus;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::fs;

use crate::param::{
    DEFAULT_MAX_REQUEST_SIZE, DEFAULT_PORT, DEFAULT_TEMP_PREFIX, DEFAULT_WORKER_THREADS,
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_worker_threads")]
    worker_threads: usize,
    #[serde(default = "default_local")]
    local: bool,
    #[serde(default)]
    context_path: String,
    #[serde(default = "default_max_request_size")]
    max_request_size: usize,
    #[serde(default = "default_enable_compression")]
    enable_compression: bool,
    #[serde(default = "default_temp_prefix")]
    temp_prefix: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_worker_threads() -> usize {
    DEFAULT_WORKER_THREADS
}

fn default_local() -> bool {
    true
}

fn default_max_request_size() -> usize {
    DEFAULT_MAX_REQUEST_SIZE
}

fn default_enable_compression() -> bool {
    true
}

fn default_temp_prefix() -> String {
    DEFAULT_TEMP_PREFIX.to_string()
}

impl Config {
    pub fn new() -> Self {
        Self {
            port: default_port(),
            worker_threads: default_worker_threads(),
            local: default_local(),
            context_path: String::new(),
            max_request_size: default_max_request_size(),
            enable_compression: default_enable_compression(),
            temp_prefix: default_temp_prefix(),
        }
    }

    // 配置文件缺失或格式错误时回退到默认配置，容器仍然可以启动
    pub fn from_toml(filename: &str) -> Self {
        let str_val = match fs::read_to_string(filename) {
            Ok(s) => s,
            Err(e) => {
                error!("无法读取配置文件{}：{}，使用默认配置", filename, e);
                return Config::new();
            }
        };
        Self::from_toml_str(&str_val)
    }

    pub fn from_toml_str(str_val: &str) -> Self {
        let mut raw_config: Config = match toml::from_str(str_val) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                Config::new()
            }
        };
        if raw_config.worker_threads == 0 {
            raw_config.worker_threads = num_cpus::get();
        }
        if raw_config.max_request_size == 0 {
            warn!("max_request_size被设置为0，这会拒绝所有请求，因此该值将被改为默认值。");
            raw_config.max_request_size = default_max_request_size();
        }
        raw_config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub fn max_request_size(&self) -> usize {
        self.max_request_size
    }

    pub fn enable_compression(&self) -> bool {
        self.enable_compression
    }

    pub fn temp_prefix(&self) -> &str {
        &self.temp_prefix
    }
}

/// `ServletContainer::start_with` 的启动参数。
///
/// 对应内嵌引擎的 `listening_ports` / `num_threads` 选项。端口 0 表示由操作系统分配。
#[derive(Debug, Clone, PartialEq)]
pub struct ServerOptions {
    pub listening_ports: Vec<u16>,
    pub worker_threads: usize,
    pub local: bool,
    pub max_request_size: usize,
    pub enable_compression: bool,
    pub temp_prefix: String,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            listening_ports: vec![DEFAULT_PORT],
            worker_threads: DEFAULT_WORKER_THREADS,
            local: true,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            enable_compression: true,
            temp_prefix: DEFAULT_TEMP_PREFIX.to_string(),
        }
    }
}

impl ServerOptions {
    /// 在单个端口上监听，其余参数取默认值。
    pub fn with_port(port: u16) -> Self {
        Self {
            listening_ports: vec![port],
            ..Self::default()
        }
    }

    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }
}

impl From<&Config> for ServerOptions {
    fn from(config: &Config) -> Self {
        Self {
            listening_ports: vec![config.port()],
            worker_threads: config.worker_threads(),
            local: config.local(),
            max_request_size: config.max_request_size(),
            enable_compression: config.enable_compression(),
            temp_prefix: config.temp_prefix().to_string(),
        }
    }
}
