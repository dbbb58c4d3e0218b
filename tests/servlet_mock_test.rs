// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 使用 mockall 模拟的 servlet 验证容器对生命周期回调的调用次数与顺序

mod common;

use std::{io::Write, sync::Arc};

use common::*;
use mockall::{mock, Sequence};
use servlet_container::{
    Exception, HttpServletRequest, HttpServletResponse, ServiceRegistry, Servlet, ServletConfig,
    ServletContainer,
};

mock! {
    pub Handler {}

    impl Servlet for Handler {
        fn init(&self, config: ServletConfig) -> Result<(), Exception>;
        fn service(
            &self,
            request: &mut HttpServletRequest,
            response: &mut HttpServletResponse,
        ) -> Result<(), Exception>;
        fn destroy(&self);
    }
}

#[test]
fn test_init_and_destroy_called_once_in_order() {
    let mut seq = Sequence::new();
    let mut mock = MockHandler::new();
    mock.expect_init()
        .withf(|config| config.servlet_context().context_path() == "/app")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    mock.expect_service().times(1).in_sequence(&mut seq).returning(|_, response| {
        response.write_all(b"mocked")?;
        Ok(())
    });
    mock.expect_destroy().times(1).in_sequence(&mut seq).return_const(());

    let registry: ServiceRegistry<dyn Servlet> = ServiceRegistry::new();
    let registration = registry.register(Arc::new(mock), rooted("/mock"), "test");
    let container = ServletContainer::new(registry.clone(), "/app");
    container.start_with(&options()).unwrap();
    let port = container.listening_ports()[0];

    assert_eq!(body_of(&get(port, "/app/mock")), "mocked");

    registration.unregister();
    container.stop();
}

#[test]
fn test_failed_init_never_installs_or_destroys() {
    let mut mock = MockHandler::new();
    mock.expect_init()
        .times(1)
        .returning(|_| Err(Exception::Servlet("not ready".to_string())));
    mock.expect_service().never();
    mock.expect_destroy().never();

    let registry: ServiceRegistry<dyn Servlet> = ServiceRegistry::new();
    registry.register(Arc::new(mock), rooted("/broken"), "test");
    let container = ServletContainer::new(registry.clone(), "");
    container.start_with(&options()).unwrap();
    let port = container.listening_ports()[0];

    assert_eq!(status_of(&get(port, "/broken")), 404);
    assert!(container.installed_roots().is_empty());
    assert!(container.get_context("/broken").is_none());

    container.stop();
}

#[test]
fn test_service_error_does_not_poison_later_requests() {
    let mut seq = Sequence::new();
    let mut mock = MockHandler::new();
    mock.expect_init().returning(|_| Ok(()));
    mock.expect_service()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(Exception::Servlet("first call fails".to_string())));
    mock.expect_service().times(1).in_sequence(&mut seq).returning(|_, response| {
        response.set_status(201)?;
        Ok(())
    });
    mock.expect_destroy().times(1).return_const(());

    let registry: ServiceRegistry<dyn Servlet> = ServiceRegistry::new();
    registry.register(Arc::new(mock), rooted("/flaky"), "test");
    let container = ServletContainer::new(registry.clone(), "");
    container.start_with(&options()).unwrap();
    let port = container.listening_ports()[0];

    assert_eq!(get(port, "/flaky"), "");
    assert_eq!(status_of(&get(port, "/flaky")), 201);

    container.stop();
}

#[test]
fn test_stop_destroys_without_unregistering() {
    let mut mock = MockHandler::new();
    mock.expect_init().times(1).returning(|_| Ok(()));
    mock.expect_destroy().times(1).return_const(());

    let registry: ServiceRegistry<dyn Servlet> = ServiceRegistry::new();
    let registration = registry.register(Arc::new(mock), rooted("/kept"), "test");
    let container = ServletContainer::new(registry.clone(), "");
    container.start_with(&options()).unwrap();
    container.stop();

    // 容器停止后注销不再触发任何回调
    assert!(registration.unregister());
}
