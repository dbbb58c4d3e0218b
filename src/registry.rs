// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 服务注册表
//!
//! 一个最小的进程内服务注册表。组件以共享指针的形式注册服务实例，并附带一组属性；
//! 监听者在服务出现、属性变化、即将注销时收到同步通知。
//!
//! 通知总是在注册表锁之外发出，监听者可以在回调里再次访问注册表（包括注册新的服务）。

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use log::debug;
use serde_json::Value;

/// 服务属性，键有序便于日志输出
pub type Properties = BTreeMap<String, Value>;

/// 指向一个已注册服务的引用，携带注册时的属性快照。
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceReference {
    id: u64,
    bundle: String,
    properties: Properties,
}

impl ServiceReference {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 注册该服务的模块名
    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    Registered(ServiceReference),
    Modified(ServiceReference),
    Unregistering(ServiceReference),
}

impl ServiceEvent {
    pub fn reference(&self) -> &ServiceReference {
        match self {
            ServiceEvent::Registered(r) | ServiceEvent::Modified(r) | ServiceEvent::Unregistering(r) => r,
        }
    }
}

pub trait ServiceListener: Send + Sync {
    fn service_changed(&self, event: &ServiceEvent);
}

struct Entry<S: ?Sized> {
    reference: ServiceReference,
    service: Arc<S>,
}

struct RegistryInner<S: ?Sized> {
    next_service_id: u64,
    next_listener_id: u64,
    services: Vec<Entry<S>>,
    listeners: Vec<(u64, Arc<dyn ServiceListener>)>,
}

/// 以能力接口 `S` 为键的服务注册表。克隆得到的是同一个注册表的句柄。
pub struct ServiceRegistry<S: ?Sized> {
    inner: Arc<Mutex<RegistryInner<S>>>,
}

impl<S: ?Sized> Clone for ServiceRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ?Sized> Default for ServiceRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized> fmt::Debug for ServiceRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("ServiceRegistry")
            .field("services", &inner.services.len())
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl<S: ?Sized> ServiceRegistry<S> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                next_service_id: 1,
                next_listener_id: 1,
                services: Vec::new(),
                listeners: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner<S>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn notify(&self, event: ServiceEvent) {
        let listeners: Vec<Arc<dyn ServiceListener>> =
            self.lock().listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener.service_changed(&event);
        }
    }

    /// 注册服务并通知所有监听者
    pub fn register(&self, service: Arc<S>, properties: Properties, bundle: &str) -> ServiceRegistration<S> {
        let reference = {
            let mut inner = self.lock();
            let id = inner.next_service_id;
            inner.next_service_id += 1;
            let reference = ServiceReference {
                id,
                bundle: bundle.to_string(),
                properties,
            };
            inner.services.push(Entry {
                reference: reference.clone(),
                service,
            });
            reference
        };
        debug!("注册服务#{}（{}）：{:?}", reference.id, reference.bundle, reference.properties);
        let id = reference.id;
        self.notify(ServiceEvent::Registered(reference));
        ServiceRegistration {
            registry: self.clone(),
            id,
        }
    }

    /// 取得服务实例。服务已注销时返回 `None`。
    pub fn get_service(&self, reference: &ServiceReference) -> Option<Arc<S>> {
        self.lock()
            .services
            .iter()
            .find(|e| e.reference.id == reference.id)
            .map(|e| Arc::clone(&e.service))
    }

    /// 当前全部服务的引用，按注册顺序
    pub fn get_service_references(&self) -> Vec<ServiceReference> {
        self.lock().services.iter().map(|e| e.reference.clone()).collect()
    }

    pub fn add_listener(&self, listener: Arc<dyn ServiceListener>) -> u64 {
        let mut inner = self.lock();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: u64) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(listener_id, _)| *listener_id != id);
        inner.listeners.len() != before
    }

    fn set_properties(&self, id: u64, properties: Properties) -> bool {
        let reference = {
            let mut inner = self.lock();
            match inner.services.iter_mut().find(|e| e.reference.id == id) {
                Some(entry) => {
                    entry.reference.properties = properties;
                    entry.reference.clone()
                }
                None => return false,
            }
        };
        self.notify(ServiceEvent::Modified(reference));
        true
    }

    fn unregister(&self, id: u64) -> bool {
        let reference = match self.lock().services.iter().find(|e| e.reference.id == id) {
            Some(entry) => entry.reference.clone(),
            None => return false,
        };
        // 先通知再移除，监听者在回调中仍可取到服务实例
        self.notify(ServiceEvent::Unregistering(reference));
        self.lock().services.retain(|e| e.reference.id != id);
        debug!("注销服务#{}", id);
        true
    }
}

/// `register` 返回的注册凭据，用于修改属性或注销服务
pub struct ServiceRegistration<S: ?Sized> {
    registry: ServiceRegistry<S>,
    id: u64,
}

impl<S: ?Sized> ServiceRegistration<S> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 当前的服务引用，服务已注销时为 `None`
    pub fn reference(&self) -> Option<ServiceReference> {
        self.registry
            .lock()
            .services
            .iter()
            .find(|e| e.reference.id == self.id)
            .map(|e| e.reference.clone())
    }

    pub fn set_properties(&self, properties: Properties) -> bool {
        self.registry.set_properties(self.id, properties)
    }

    pub fn unregister(self) -> bool {
        self.registry.unregister(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Hello;

    impl Greeter for Hello {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ServiceEvent>>,
    }

    impl ServiceListener for Recorder {
        fn service_changed(&self, event: &ServiceEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn props(root: &str) -> Properties {
        let mut p = Properties::new();
        p.insert("root".to_string(), json!(root));
        p
    }

    #[test]
    fn test_register_and_lookup() {
        let registry: ServiceRegistry<dyn Greeter> = ServiceRegistry::new();
        let registration = registry.register(Arc::new(Hello), props("/a"), "test");

        let references = registry.get_service_references();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].property("root"), Some(&json!("/a")));
        assert_eq!(references[0].bundle(), "test");
        let service = registry.get_service(&references[0]).unwrap();
        assert_eq!(service.greet(), "hello");

        assert!(registration.unregister());
        assert!(registry.get_service(&references[0]).is_none());
        assert!(registry.get_service_references().is_empty());
    }

    #[test]
    fn test_listener_receives_events_in_order() {
        let registry: ServiceRegistry<dyn Greeter> = ServiceRegistry::new();
        let recorder = Arc::new(Recorder::default());
        let listener_id = registry.add_listener(recorder.clone());

        let registration = registry.register(Arc::new(Hello), props("/a"), "test");
        assert!(registration.set_properties(props("/b")));
        registration.unregister();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ServiceEvent::Registered(_)));
        assert!(matches!(events[1], ServiceEvent::Modified(_)));
        assert_eq!(events[1].reference().property("root"), Some(&json!("/b")));
        assert!(matches!(events[2], ServiceEvent::Unregistering(_)));

        assert!(registry.remove_listener(listener_id));
        registry.register(Arc::new(Hello), props("/c"), "test");
        assert_eq!(recorder.events.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_service_still_available_during_unregistering() {
        struct Observer {
            registry: ServiceRegistry<dyn Greeter>,
            seen: Mutex<Option<String>>,
        }
        impl ServiceListener for Observer {
            fn service_changed(&self, event: &ServiceEvent) {
                if let ServiceEvent::Unregistering(r) = event {
                    *self.seen.lock().unwrap() = self.registry.get_service(r).map(|s| s.greet());
                }
            }
        }

        let registry: ServiceRegistry<dyn Greeter> = ServiceRegistry::new();
        let observer = Arc::new(Observer {
            registry: registry.clone(),
            seen: Mutex::new(None),
        });
        registry.add_listener(observer.clone());
        registry.register(Arc::new(Hello), props("/a"), "test").unregister();
        assert_eq!(observer.seen.lock().unwrap().as_deref(), Some("hello"));
    }

    #[test]
    fn test_unregister_twice_is_harmless() {
        let registry: ServiceRegistry<dyn Greeter> = ServiceRegistry::new();
        let first = registry.register(Arc::new(Hello), props("/a"), "test");
        let id = first.id();
        assert!(first.unregister());
        assert!(!registry.unregister(id));
    }
}
