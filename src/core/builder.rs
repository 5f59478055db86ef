use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::coordinator::Coordinator;
use crate::{
    core::Config,
    events::Bus,
    modules::{EnvHost, Host, ModuleCatalog, ModuleRef},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Coordinator`].
pub struct CoordinatorBuilder {
    cfg: Config,
    roots: Vec<PathBuf>,
    catalog: ModuleCatalog,
    host: Option<Arc<dyn Host>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl CoordinatorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            roots: Vec::new(),
            catalog: ModuleCatalog::new(),
            host: None,
            subscribers: Vec::new(),
        }
    }

    /// Adds a discovery root. Roots are walked in the order they were added;
    /// on a duplicate qualified name the earlier root wins.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    pub fn with_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.roots.extend(roots.into_iter().map(Into::into));
        self
    }

    /// Replaces the module catalog.
    pub fn with_catalog(mut self, catalog: ModuleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Registers one module entry point.
    pub fn with_module(mut self, module: ModuleRef) -> Self {
        if let Some(prev) = self.catalog.register(module) {
            warn!(module = prev.name(), "module registered twice; keeping the later one");
        }
        self
    }

    /// Sets the host handed to modules. Defaults to [`EnvHost`].
    pub fn with_host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = Some(host);
        self
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive runtime events through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the coordinator (state `Idle`).
    ///
    /// Must be called from within a tokio runtime when subscribers are configured.
    pub fn build(self) -> Arc<Coordinator> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let listener_token = CancellationToken::new();
        if !self.subscribers.is_empty() {
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            subscriber_listener(&bus, set, listener_token.clone());
        }

        let host = self.host.unwrap_or_else(|| Arc::new(EnvHost));
        Arc::new(Coordinator::new_internal(
            self.cfg,
            self.roots,
            self.catalog,
            host,
            bus,
            listener_token,
        ))
    }
}

/// Forwards bus events to the subscriber set until `stop` is cancelled.
///
/// Events already queued on the bus are forwarded before the set shuts down.
fn subscriber_listener(bus: &Bus, set: SubscriberSet, stop: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                res = rx.recv() => match res {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber listener lagged; events lost");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = stop.cancelled() => break,
            }
        }
        while let Ok(ev) = rx.try_recv() {
            set.emit(&ev);
        }
        set.shutdown().await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventKind};
    use crate::modules::{HostContext, ModuleFn};
    use crate::{LifecycleState, ModuleError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<EventKind>);

    #[async_trait]
    impl Subscribe for Forward {
        async fn on_event(&self, ev: &Event) {
            let _ = self.0.send(ev.kind);
        }

        fn name(&self) -> &'static str {
            "forward"
        }
    }

    struct MapHost(HashMap<&'static str, &'static str>);

    impl Host for MapHost {
        fn setting(&self, key: &str) -> Option<String> {
            self.0.get(key).map(|v| v.to_string())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[tokio::test]
    async fn subscribers_see_runtime_events() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.rs"), "").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let co = CoordinatorBuilder::new(Config::default())
            .with_root(dir.path())
            .with_module(ModuleFn::arc("m", 0, |_h: HostContext| async {
                Ok::<_, ModuleError>(())
            }))
            .with_subscribers(vec![Arc::new(Forward(tx))])
            .build();
        co.start().await.unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(kind) = rx.recv().await {
                if kind == EventKind::ModuleLoaded {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(seen);
    }

    #[tokio::test]
    async fn custom_host_settings_reach_modules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("db.rs"), "").unwrap();

        let host = MapHost(HashMap::from([("DB_URL", "postgres://local")]));
        let db = ModuleFn::arc("db", 0, |h: HostContext| async move {
            let url = h.require_setting("DB_URL")?;
            assert!(h.host_as::<MapHost>().is_some());
            if url.starts_with("postgres://") {
                Ok::<_, ModuleError>(())
            } else {
                Err(ModuleError::fail(format!("bad url {url}")))
            }
        });

        let co = CoordinatorBuilder::new(Config::default())
            .with_roots([dir.path()])
            .with_module(db)
            .with_host(Arc::new(host))
            .build();

        let summary = co.start().await.unwrap();
        assert_eq!(summary.loaded(), 1);
        assert_eq!(co.state(), LifecycleState::Ready);
    }
}
