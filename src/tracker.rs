// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 服务跟踪器
//!
//! 把注册表的推送通知转换为对定制器的“添加 / 修改 / 移除”回调，并记录每个服务
//! 对应的跟踪对象。
//!
//! 定制器的回调可能执行任意用户代码（例如 servlet 的 `init`），所以跟踪器不会在持有
//! 自己的锁时回调定制器。正在添加中的服务如果在回调期间被注销，跟踪器会在添加完成后
//! 立即补发一次移除。

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use log::{debug, warn};

use crate::registry::{ServiceEvent, ServiceListener, ServiceReference, ServiceRegistry};

/// 跟踪器的回调接口
pub trait TrackerCustomizer<T>: Send + Sync {
    /// 服务出现。返回 `None` 表示不跟踪该服务。
    fn adding_service(&self, reference: &ServiceReference) -> Option<T>;

    fn modified_service(&self, reference: &ServiceReference, tracked: &T);

    fn removed_service(&self, reference: &ServiceReference, tracked: T);
}

struct TrackerState<T> {
    open: bool,
    tracked: HashMap<u64, T>,
    adding: HashSet<u64>,
    removed_while_adding: HashSet<u64>,
}

struct TrackerCore<T> {
    customizer: Weak<dyn TrackerCustomizer<T>>,
    state: Mutex<TrackerState<T>>,
}

impl<T: Clone + Send + Sync> TrackerCore<T> {
    fn lock(&self) -> MutexGuard<'_, TrackerState<T>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn track(&self, reference: &ServiceReference) {
        let customizer = match self.customizer.upgrade() {
            Some(c) => c,
            None => return,
        };
        let id = reference.id();
        {
            let mut state = self.lock();
            if !state.open || state.adding.contains(&id) {
                return;
            }
            if let Some(tracked) = state.tracked.get(&id).cloned() {
                drop(state);
                customizer.modified_service(reference, &tracked);
                return;
            }
            state.adding.insert(id);
        }

        let added = customizer.adding_service(reference);

        let mut state = self.lock();
        state.adding.remove(&id);
        let cancelled = state.removed_while_adding.remove(&id) || !state.open;
        match (added, cancelled) {
            (Some(tracked), false) => {
                state.tracked.insert(id, tracked);
                debug!("开始跟踪服务#{}", id);
            }
            (Some(tracked), true) => {
                drop(state);
                warn!("服务#{}在添加过程中被注销，立即移除", id);
                customizer.removed_service(reference, tracked);
            }
            (None, _) => {}
        }
    }

    fn untrack(&self, reference: &ServiceReference) {
        let id = reference.id();
        let tracked = {
            let mut state = self.lock();
            if state.adding.contains(&id) {
                state.removed_while_adding.insert(id);
                return;
            }
            state.tracked.remove(&id)
        };
        if let (Some(tracked), Some(customizer)) = (tracked, self.customizer.upgrade()) {
            debug!("停止跟踪服务#{}", id);
            customizer.removed_service(reference, tracked);
        }
    }
}

impl<T: Clone + Send + Sync> ServiceListener for TrackerCore<T> {
    fn service_changed(&self, event: &ServiceEvent) {
        match event {
            ServiceEvent::Registered(r) | ServiceEvent::Modified(r) => self.track(r),
            ServiceEvent::Unregistering(r) => self.untrack(r),
        }
    }
}

/// 跟踪注册表中某一类服务
pub struct ServiceTracker<S: ?Sized, T> {
    registry: ServiceRegistry<S>,
    core: Arc<TrackerCore<T>>,
    listener_id: Mutex<Option<u64>>,
}

impl<S: ?Sized, T: Clone + Send + Sync + 'static> ServiceTracker<S, T> {
    /// 定制器以弱引用持有，跟踪器不会延长它的生命周期
    pub fn new(registry: ServiceRegistry<S>, customizer: Weak<dyn TrackerCustomizer<T>>) -> Self {
        Self {
            registry,
            core: Arc::new(TrackerCore {
                customizer,
                state: Mutex::new(TrackerState {
                    open: false,
                    tracked: HashMap::new(),
                    adding: HashSet::new(),
                    removed_while_adding: HashSet::new(),
                }),
            }),
            listener_id: Mutex::new(None),
        }
    }

    /// 开始监听注册表，并同步处理所有已经注册的服务
    pub fn open(&self) {
        let mut listener_id = match self.listener_id.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if listener_id.is_some() {
            return;
        }
        self.core.lock().open = true;
        *listener_id = Some(self.registry.add_listener(self.core.clone()));
        drop(listener_id);

        for reference in self.registry.get_service_references() {
            self.core.track(&reference);
        }
    }

    /// 停止监听。已跟踪的对象被丢弃，不会回调 `removed_service`。
    pub fn close(&self) {
        let listener_id = match self.listener_id.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(id) = listener_id {
            self.registry.remove_listener(id);
        }
        let mut state = self.core.lock();
        state.open = false;
        state.tracked.clear();
        state.removed_while_adding.clear();
    }

    pub fn is_open(&self) -> bool {
        self.core.lock().open
    }

    /// 当前跟踪的服务数量
    pub fn size(&self) -> usize {
        self.core.lock().tracked.len()
    }
}

impl<S: ?Sized, T> Drop for ServiceTracker<S, T> {
    fn drop(&mut self) {
        let id = match self.listener_id.get_mut() {
            Ok(id) => id.take(),
            Err(_) => None,
        };
        if let Some(id) = id {
            self.registry.remove_listener(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Properties, ServiceRegistration};
    use serde_json::json;

    trait Named: Send + Sync {
        fn name(&self) -> String;
    }

    struct Fixed(&'static str);

    impl Named for Fixed {
        fn name(&self) -> String {
            self.0.to_string()
        }
    }

    #[derive(Default)]
    struct Log {
        calls: Mutex<Vec<String>>,
        reject: Option<&'static str>,
    }

    impl TrackerCustomizer<String> for Log {
        fn adding_service(&self, reference: &ServiceReference) -> Option<String> {
            let tag = reference.property("tag")?.as_str()?.to_string();
            if Some(tag.as_str()) == self.reject {
                return None;
            }
            self.calls.lock().unwrap().push(format!("add {}", tag));
            Some(tag)
        }

        fn modified_service(&self, _reference: &ServiceReference, tracked: &String) {
            self.calls.lock().unwrap().push(format!("modify {}", tracked));
        }

        fn removed_service(&self, _reference: &ServiceReference, tracked: String) {
            self.calls.lock().unwrap().push(format!("remove {}", tracked));
        }
    }

    fn tagged(tag: &str) -> Properties {
        let mut p = Properties::new();
        p.insert("tag".to_string(), json!(tag));
        p
    }

    fn tracker_for(log: &Arc<Log>, registry: &ServiceRegistry<dyn Named>) -> ServiceTracker<dyn Named, String> {
        let weak: Weak<Log> = Arc::downgrade(log);
        let customizer: Weak<dyn TrackerCustomizer<String>> = weak;
        ServiceTracker::new(registry.clone(), customizer)
    }

    #[test]
    fn test_open_enumerates_existing_services() {
        let registry: ServiceRegistry<dyn Named> = ServiceRegistry::new();
        registry.register(Arc::new(Fixed("a")), tagged("a"), "test");
        registry.register(Arc::new(Fixed("b")), tagged("b"), "test");

        let log = Arc::new(Log::default());
        let tracker = tracker_for(&log, &registry);
        tracker.open();

        assert_eq!(tracker.size(), 2);
        assert_eq!(*log.calls.lock().unwrap(), vec!["add a", "add b"]);
    }

    #[test]
    fn test_events_after_open() {
        let registry: ServiceRegistry<dyn Named> = ServiceRegistry::new();
        let log = Arc::new(Log::default());
        let tracker = tracker_for(&log, &registry);
        tracker.open();

        let registration = registry.register(Arc::new(Fixed("a")), tagged("a"), "test");
        registration.set_properties(tagged("a2"));
        registration.unregister();

        assert_eq!(tracker.size(), 0);
        assert_eq!(*log.calls.lock().unwrap(), vec!["add a", "modify a", "remove a"]);
    }

    #[test]
    fn test_rejected_service_is_not_tracked() {
        let registry: ServiceRegistry<dyn Named> = ServiceRegistry::new();
        let log = Arc::new(Log {
            reject: Some("bad"),
            ..Log::default()
        });
        let tracker = tracker_for(&log, &registry);
        tracker.open();

        registry.register(Arc::new(Fixed("x")), tagged("bad"), "test").unregister();
        registry.register(Arc::new(Fixed("y")), Properties::new(), "test");
        assert_eq!(tracker.size(), 0);
        assert!(log.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_close_stops_notifications_without_removal() {
        let registry: ServiceRegistry<dyn Named> = ServiceRegistry::new();
        let log = Arc::new(Log::default());
        let tracker = tracker_for(&log, &registry);
        tracker.open();
        let registration = registry.register(Arc::new(Fixed("a")), tagged("a"), "test");

        tracker.close();
        assert!(!tracker.is_open());
        registration.unregister();
        registry.register(Arc::new(Fixed("b")), tagged("b"), "test");

        assert_eq!(*log.calls.lock().unwrap(), vec!["add a"]);
    }

    /// 在 `adding_service` 中注销正在添加的服务
    #[derive(Default)]
    struct Withdraw {
        registration: Mutex<Option<ServiceRegistration<dyn Named>>>,
        calls: Mutex<Vec<String>>,
    }

    impl TrackerCustomizer<String> for Withdraw {
        fn adding_service(&self, _reference: &ServiceReference) -> Option<String> {
            self.calls.lock().unwrap().push("add".to_string());
            if let Some(registration) = self.registration.lock().unwrap().take() {
                assert!(registration.unregister());
            }
            Some("tracked".to_string())
        }

        fn modified_service(&self, _reference: &ServiceReference, _tracked: &String) {
            self.calls.lock().unwrap().push("modify".to_string());
        }

        fn removed_service(&self, _reference: &ServiceReference, tracked: String) {
            self.calls.lock().unwrap().push(format!("remove {}", tracked));
        }
    }

    #[test]
    fn test_unregistered_while_adding_is_removed_once() {
        let registry: ServiceRegistry<dyn Named> = ServiceRegistry::new();
        let registration = registry.register(Arc::new(Fixed("a")), tagged("a"), "test");
        let withdraw = Arc::new(Withdraw::default());
        *withdraw.registration.lock().unwrap() = Some(registration);

        let weak: Weak<Withdraw> = Arc::downgrade(&withdraw);
        let customizer: Weak<dyn TrackerCustomizer<String>> = weak;
        let tracker: ServiceTracker<dyn Named, String> = ServiceTracker::new(registry.clone(), customizer);
        tracker.open();

        assert_eq!(tracker.size(), 0);
        assert!(registry.get_service_references().is_empty());
        assert_eq!(*withdraw.calls.lock().unwrap(), vec!["add", "remove tracked"]);
    }
}
