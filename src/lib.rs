// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

pub mod adapter;
pub mod config;
pub mod container;
pub mod engine;
pub mod exception;
pub mod form;
pub mod param;
pub mod registry;
pub mod request;
pub mod response;
pub mod router;
pub mod servlet;
pub mod servlet_request;
pub mod servlet_response;
pub mod tracker;
pub mod util;

pub use config::{Config, ServerOptions};
pub use container::ServletContainer;
pub use exception::Exception;
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion, PROP_CONTEXT_ROOT};
pub use registry::{Properties, ServiceReference, ServiceRegistration, ServiceRegistry};
pub use request::Request;
pub use response::Response;
pub use servlet::{Servlet, ServletConfig, ServletContext};
pub use servlet_request::{HttpServletRequest, ServletPart, SpooledPart};
pub use servlet_response::HttpServletResponse;
pub use util::HtmlBuilder;
