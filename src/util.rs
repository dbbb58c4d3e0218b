// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, error};

use crate::{
    exception::Exception,
    param::{MIME_TYPES, STATUS_CODES},
};

pub struct HtmlBuilder {
    title: String,
    css: String,
    script: String,
    body: String,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let title = format!("{}", code);
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let description = match note {
            Some(n) => n,
            None => STATUS_CODES.get(&code).copied().unwrap_or("Unknown Status"),
        };
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code, description
        );
        Self {
            title,
            css,
            script: "".to_string(),
            body,
        }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <!-- 本文件由shaneyale的Rust Servlet Container自动生成 -->
            <html>
                <head>
                    <meta charset="utf-8">
                    <script>{}</script>
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.script, self.title, self.css, self.body
        )
    }
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}

// 在系统临时目录下创建一个唯一的子目录，调用方负责在不再需要时删除
pub fn make_unique_temp_directory(prefix: &str) -> Result<PathBuf, Exception> {
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .map_err(|e| Exception::TempDirFailure(e.to_string()))?;
    let path = dir.keep();
    debug!("创建临时目录：{}", path.display());
    Ok(path)
}

// 递归删除目录。目录不存在视为成功
pub fn remove_directory_recursive(path: &Path) -> Result<(), Exception> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!("已删除临时目录：{}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            error!("删除目录{}失败：{}", path.display(), e);
            Err(Exception::TempDirFailure(format!("{}: {}", path.display(), e)))
        }
    }
}

// 根据文件扩展名查找 MIME 类型，无法识别时返回空字符串
pub fn get_mime_type(filename: &str) -> String {
    let extension = match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(e) => e.to_lowercase(),
        None => return String::new(),
    };
    match MIME_TYPES.get(extension.as_str()) {
        Some(v) => v.to_string(),
        None => String::new(),
    }
}
