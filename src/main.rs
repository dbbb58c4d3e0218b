// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Servlet 容器演示程序
//!
//! - 通过 log4rs 初始化日志，从 TOML 文件读取运行参数
//! - 启动容器，并向注册表注册几个演示用的 servlet
//! - 后台管理控制台（CLI 指令交互）：stop / status / list / help

use std::{
    io::{self, BufRead, Write},
    sync::Arc,
};

use log::{error, info};
use serde_json::json;

use servlet_container::{
    util::format_file_size, Config, Exception, HttpServletRequest, HttpServletResponse, Properties,
    ServerOptions, Servlet, ServletConfig, ServletContainer, ServiceRegistry, PROP_CONTEXT_ROOT,
};

/// 回显请求的路径信息与参数
struct HelloServlet;

impl Servlet for HelloServlet {
    fn init(&self, config: ServletConfig) -> Result<(), Exception> {
        info!("HelloServlet初始化，context path：'{}'", config.servlet_context().context_path());
        Ok(())
    }

    fn service(
        &self,
        request: &mut HttpServletRequest,
        response: &mut HttpServletResponse,
    ) -> Result<(), Exception> {
        response.set_content_type("text/plain;charset=utf-8")?;
        writeln!(response, "{} {}", request.method(), request.request_url())?;
        writeln!(response, "context path: {}", request.context_path())?;
        writeln!(response, "servlet path: {}", request.servlet_path())?;
        writeln!(response, "path info:    {}", request.path_info())?;
        for (name, value) in request.parameter_map() {
            writeln!(response, "param {} = {}", name, value)?;
        }
        Ok(())
    }

    fn destroy(&self) {
        info!("HelloServlet已销毁");
    }
}

/// 列出 multipart 上传的文件
struct UploadServlet;

impl Servlet for UploadServlet {
    fn service(
        &self,
        request: &mut HttpServletRequest,
        response: &mut HttpServletResponse,
    ) -> Result<(), Exception> {
        if !request.method().has_body() {
            return response.send_error(405, Some("请使用POST上传文件"));
        }
        response.set_content_type("application/json")?;
        let mut files = Vec::new();
        for part in request.parts()? {
            files.push(json!({
                "name": part.name(),
                "filename": part.submitted_file_name(),
                "content_type": part.content_type(),
                "size": format_file_size(part.size()),
            }));
            part.delete()?;
        }
        let body = json!({ "files": files });
        response.write_all(body.to_string().as_bytes())?;
        Ok(())
    }
}

fn context_root(root: &str) -> Properties {
    let mut properties = Properties::new();
    properties.insert(PROP_CONTEXT_ROOT.to_string(), json!(root));
    properties
}

fn print_help() {
    println!("== Servlet Container Help ==");
    println!("stop   - 停止容器并退出");
    println!("status - 查看当前容器运行状态");
    println!("list   - 列出已安装的servlet");
    println!("help   - 显示此帮助信息");
    println!("============================");
}

fn main() {
    // 1. 初始化日志系统
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
    }

    // 2. 加载配置
    let config = Config::from_toml("config/development.toml");
    info!("配置文件已载入");
    let options = ServerOptions::from(&config);

    // 3. 注册演示 servlet 并启动容器
    let registry: ServiceRegistry<dyn Servlet> = ServiceRegistry::new();
    let _hello = registry.register(Arc::new(HelloServlet), context_root("/hello"), "demo");
    let container = ServletContainer::new(registry.clone(), config.context_path());
    if let Err(e) = container.start_with(&options) {
        error!("{}", e);
        std::process::exit(1);
    }
    // 启动之后注册的 servlet 由跟踪器动态安装
    let _upload = registry.register(Arc::new(UploadServlet), context_root("/upload"), "demo");

    // 4. 管理控制台
    print_help();
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("读取标准输入失败：{}", e);
                break;
            }
        };
        match line.trim() {
            "stop" => {
                println!("停机指令已激活，正在停止容器...");
                break;
            }
            "status" => {
                println!("== Servlet Container 状态 ==");
                println!("运行中:       {}", container.is_started());
                println!("监听端口:     {:?}", container.listening_ports());
                println!("活跃连接数:   {}", container.active_connections());
                println!("暂存目录:     {:?}", container.temp_dir());
                println!("============================");
            }
            "list" => {
                let prefix = container.get_context_path();
                for root in container.installed_roots() {
                    println!("{}{}", prefix, root);
                }
            }
            "help" => print_help(),
            "" => {}
            cmd => println!("无效的命令：{}", cmd),
        }
    }

    container.stop();
}
