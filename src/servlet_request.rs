// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求门面
//!
//! servlet 看到的请求对象，每个请求新建一个，由适配器独占后以可变引用交给 servlet。
//!
//! - 参数与属性按 `&`、`=` 切分查询字符串得到，保持出现顺序，不做解码。
//!   绑定了暂存目录的请求（POST/PUT/DELETE）还会追加表单请求体中的字段。
//! - multipart 文件部件在第一次访问 `parts` / `get_part` 时才写入容器的暂存目录。
//!   最后一个引用释放时文件随之删除；`ServletPart::delete` 可以提前删除，
//!   容器停止时的整体清理兜底。

use std::{
    fmt, fs, io,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use log::debug;
use serde_json::Value;
use tempfile::TempPath;

use crate::{
    engine::Connection,
    exception::Exception,
    form::{decode_body, split_query, FormPart},
    param::HttpRequestMethod,
    servlet::ServletContext,
};

/// multipart 上传中的一个文件部件
pub trait ServletPart: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn submitted_file_name(&self) -> Option<&str>;

    fn content_type(&self) -> Option<&str>;

    fn size(&self) -> u64;

    fn header(&self, name: &str) -> Option<&str>;

    fn headers(&self) -> &[(String, String)];

    /// 读取部件的全部内容
    fn bytes(&self) -> Result<Bytes, Exception>;

    /// 复制到指定位置
    fn write(&self, path: &Path) -> Result<(), Exception>;

    /// 删除暂存文件。文件已不存在时视为成功。
    fn delete(&self) -> Result<(), Exception>;
}

/// 落盘到容器暂存目录的文件部件，释放时删除暂存文件
#[derive(Debug)]
pub struct SpooledPart {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    headers: Vec<(String, String)>,
    size: u64,
    path: PathBuf,
    file: Mutex<Option<TempPath>>,
}

impl SpooledPart {
    /// 把部件内容写入 `dir` 下一个新建的唯一文件
    pub fn spool(part: &FormPart, dir: &Path) -> Result<Self, Exception> {
        let mut file = tempfile::Builder::new().prefix("part-").tempfile_in(dir)?;
        file.write_all(&part.data)?;
        file.flush()?;
        let file = file.into_temp_path();
        let path = file.to_path_buf();
        debug!("部件{}已暂存至{}", part.name, path.display());
        Ok(Self {
            name: part.name.clone(),
            filename: part.filename.clone(),
            content_type: part.content_type.clone(),
            headers: part.headers.clone(),
            size: part.data.len() as u64,
            path,
            file: Mutex::new(Some(file)),
        })
    }

    /// 暂存文件的位置
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ServletPart for SpooledPart {
    fn name(&self) -> &str {
        &self.name
    }

    fn submitted_file_name(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    fn bytes(&self) -> Result<Bytes, Exception> {
        Ok(Bytes::from(fs::read(&self.path)?))
    }

    fn write(&self, path: &Path) -> Result<(), Exception> {
        fs::copy(&self.path, path)?;
        Ok(())
    }

    fn delete(&self) -> Result<(), Exception> {
        let file = match self.file.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let file = match file {
            Some(file) => file,
            None => return Ok(()),
        };
        match file.close() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct HttpServletRequest {
    conn: Connection,
    context: Arc<ServletContext>,
    servlet_path: String,
    path_info: String,
    temp_dir: Option<PathBuf>,
    attributes: Vec<(String, Value)>,
    parameters: Vec<(String, String)>,
    pending_parts: Vec<FormPart>,
    parts: Option<Vec<Arc<dyn ServletPart>>>,
}

impl HttpServletRequest {
    /// `temp_dir` 仅对携带请求体的方法绑定，未绑定时不解析请求体。
    pub(crate) fn new(
        conn: Connection,
        context: Arc<ServletContext>,
        servlet_path: &str,
        path_info: &str,
        temp_dir: Option<PathBuf>,
    ) -> Self {
        let mut parameters = conn.query_string().map(split_query).unwrap_or_default();
        let attributes = parameters
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        let mut pending_parts = Vec::new();
        if temp_dir.is_some() && conn.method().has_body() && !conn.body().is_empty() {
            let form = decode_body(conn.content_type(), conn.body());
            parameters.extend(form.fields);
            pending_parts = form.files;
        }

        Self {
            conn,
            context,
            servlet_path: servlet_path.to_string(),
            path_info: path_info.to_string(),
            temp_dir,
            attributes,
            parameters,
            pending_parts,
            parts: None,
        }
    }

    pub fn scheme(&self) -> &str {
        self.conn.scheme()
    }

    pub fn server_name(&self) -> String {
        self.conn.server_name()
    }

    pub fn server_port(&self) -> u16 {
        self.conn.server_port()
    }

    /// 不含查询字符串的请求 URI
    pub fn request_uri(&self) -> &str {
        self.conn.local_uri().unwrap_or("")
    }

    pub fn request_url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme(),
            self.server_name(),
            self.server_port(),
            self.request_uri()
        )
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.conn.method()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.conn.header(name)
    }

    pub fn headers(&self) -> &[(String, String)] {
        self.conn.headers()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.conn.content_type()
    }

    pub fn content_length(&self) -> u64 {
        self.conn.body().len() as u64
    }

    pub fn body(&self) -> &Bytes {
        self.conn.body()
    }

    pub fn remote_addr(&self) -> String {
        self.conn.remote_addr().to_string()
    }

    pub fn context_path(&self) -> &str {
        self.context.context_path()
    }

    pub fn servlet_path(&self) -> &str {
        &self.servlet_path
    }

    pub fn path_info(&self) -> &str {
        &self.path_info
    }

    pub fn query_string(&self) -> Option<&str> {
        self.conn.query_string()
    }

    pub fn servlet_context(&self) -> &Arc<ServletContext> {
        &self.context
    }

    pub fn get_attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn set_attribute(&mut self, name: &str, value: Value) {
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        let pos = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(pos).1)
    }

    pub fn attribute_names(&self) -> Vec<&str> {
        self.attributes.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// 同名参数取第一个
    pub fn get_parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_parameter_values(&self, name: &str) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// 参数名，去重后保持首次出现的顺序
    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (k, _) in &self.parameters {
            if !names.contains(&k.as_str()) {
                names.push(k);
            }
        }
        names
    }

    pub fn parameter_map(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// 全部文件部件。第一次调用时写入暂存目录。
    pub fn parts(&mut self) -> Result<Vec<Arc<dyn ServletPart>>, Exception> {
        if let Some(parts) = &self.parts {
            return Ok(parts.clone());
        }
        let mut spooled: Vec<Arc<dyn ServletPart>> = Vec::new();
        if !self.pending_parts.is_empty() {
            let dir = self.temp_dir.as_ref().ok_or_else(|| {
                Exception::TempDirFailure("请求没有绑定暂存目录".to_string())
            })?;
            for part in &self.pending_parts {
                spooled.push(Arc::new(SpooledPart::spool(part, dir)?));
            }
            self.pending_parts.clear();
        }
        self.parts = Some(spooled.clone());
        Ok(spooled)
    }

    pub fn get_part(&mut self, name: &str) -> Result<Option<Arc<dyn ServletPart>>, Exception> {
        Ok(self.parts()?.into_iter().find(|p| p.name() == name))
    }
}

impl fmt::Debug for HttpServletRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServletRequest")
            .field("method", &self.method())
            .field("uri", &self.request_uri())
            .field("servlet_path", &self.servlet_path)
            .field("path_info", &self.path_info)
            .finish()
    }
}
