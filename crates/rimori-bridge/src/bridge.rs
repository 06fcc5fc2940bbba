//! Cross-context bridge: handshake, forwarding, and the connection context.
//!
//! A `Bridge` extends the event bus of one plugin context to the host:
//!
//! 1. On construction it sends `hello` over the parent transport.
//! 2. It waits for an `init` carrying its plugin id and a dedicated port.
//! 3. Once accepted, plugin-originated events travel out through the port
//!    and host traffic arriving on the port is re-emitted locally.
//!
//! Callers of [`Bridge::connection`] made before the handshake completes
//! are queued and released in order once the port is ready. Without a
//! transport (or in standalone mode) the bridge is ready immediately and
//! the context is requested over the bus on `global.<resource>.requestAccess`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use rimori_bus::{is_local_topic, Event, EventBus, Subscription, GLOBAL_SENDER};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

use crate::config::BridgeConfig;
use crate::context::RimoriInfo;
use crate::data::DataClient;
use crate::error::BridgeError;
use crate::message::{HostMessage, PortMessage};
use crate::transport::{HostTransport, InboundMessage, MessagePort};

/// Local topic that marks the end of plugin initialisation.
pub const INIT_FINISHED_TOPIC: &str = "self.rimori.triggerInitFinished";

/// Callback invoked with the new context after a host-pushed update.
pub type UpdateCallback = Arc<dyn Fn(&RimoriInfo) + Send + Sync>;

type Thunk = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgePhase {
    Uninitialized,
    AwaitingHandshake,
    Ready,
}

struct BridgeState {
    phase: BridgePhase,
    port: Option<Arc<dyn MessagePort>>,
    context: Option<RimoriInfo>,
    data_client: Option<DataClient>,
    query_params: HashMap<String, String>,
    queue: VecDeque<Thunk>,
    subscriptions: Vec<Subscription>,
}

struct BridgeInner {
    config: BridgeConfig,
    bus: EventBus,
    transport: Option<Arc<dyn HostTransport>>,
    http: reqwest::Client,
    state: Mutex<BridgeState>,
    callbacks: Mutex<Vec<(u64, UpdateCallback)>>,
    next_callback: AtomicU64,
    /// Serialises context fetches so concurrent callers share one request.
    refresh: tokio::sync::Mutex<()>,
}

/// Connects one plugin context to its host.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("plugin_id", &self.inner.config.plugin_id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Create the bridge and, when a transport is given outside standalone
    /// mode, start the handshake.
    ///
    /// Must be called inside a tokio runtime when a transport is given.
    pub fn new(
        config: BridgeConfig,
        bus: EventBus,
        transport: Option<Arc<dyn HostTransport>>,
    ) -> Result<Self, BridgeError> {
        if config.plugin_id.trim().is_empty() {
            return Err(BridgeError::InvalidContext("plugin id is empty".into()));
        }

        let http = reqwest::Client::builder().build()?;
        let bridge = Self {
            inner: Arc::new(BridgeInner {
                config,
                bus,
                transport,
                http,
                state: Mutex::new(BridgeState {
                    phase: BridgePhase::Uninitialized,
                    port: None,
                    context: None,
                    data_client: None,
                    query_params: HashMap::new(),
                    queue: VecDeque::new(),
                    subscriptions: Vec::new(),
                }),
                callbacks: Mutex::new(Vec::new()),
                next_callback: AtomicU64::new(1),
                refresh: tokio::sync::Mutex::new(()),
            }),
        };

        bridge.install_bus_listeners()?;

        match (&bridge.inner.transport, bridge.inner.config.standalone) {
            (Some(transport), false) => bridge.start_handshake(Arc::clone(transport))?,
            _ => {
                bridge.state().phase = BridgePhase::Ready;
                info!(
                    plugin = %bridge.plugin_id(),
                    standalone = bridge.inner.config.standalone,
                    "bridge running without host channel"
                );
            }
        }

        Ok(bridge)
    }

    /// Bridge without a transport, resolving its context over the bus.
    pub fn standalone(config: BridgeConfig, bus: EventBus) -> Result<Self, BridgeError> {
        Self::new(config.standalone(true), bus, None)
    }

    pub fn plugin_id(&self) -> &str {
        &self.inner.config.plugin_id
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn phase(&self) -> BridgePhase {
        self.state().phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == BridgePhase::Ready
    }

    // ─── Handshake ──────────────────────────────────────────────────────

    fn install_bus_listeners(&self) -> Result<(), BridgeError> {
        let weak = self.downgrade();
        let update = self.inner.bus.on(self.inner.config.update_topic(), move |event: &Event| {
            if let Some(bridge) = Bridge::upgrade(&weak) {
                bridge.handle_update(event);
            }
        })?;

        let weak = self.downgrade();
        let init_finished = self.inner.bus.on(INIT_FINISHED_TOPIC, move |_: &Event| {
            if let Some(bridge) = Bridge::upgrade(&weak) {
                bridge.acknowledge();
            }
        })?;

        self.state().subscriptions.extend([update, init_finished]);
        Ok(())
    }

    fn start_handshake(&self, transport: Arc<dyn HostTransport>) -> Result<(), BridgeError> {
        self.state().phase = BridgePhase::AwaitingHandshake;

        let weak = self.downgrade();
        transport.on_host_message(Arc::new(move |message: InboundMessage| {
            if let Some(bridge) = Bridge::upgrade(&weak) {
                bridge.handle_host_message(message);
            }
        }))?;

        let hello = HostMessage::Hello {
            plugin_id: self.plugin_id().to_string(),
        };
        transport.post_to_host(hello.encode()?)?;
        info!(plugin = %self.plugin_id(), kind = ?transport.kind(), "sent hello to host");
        Ok(())
    }

    fn handle_host_message(&self, message: InboundMessage) {
        let Some(HostMessage::Init {
            plugin_id,
            query_params,
            rimori_info,
        }) = HostMessage::decode(&message.data)
        else {
            return;
        };
        if plugin_id != self.plugin_id() {
            trace!(plugin = %self.plugin_id(), other = %plugin_id, "ignoring init for another plugin");
            return;
        }
        let Some(port) = message.ports.into_iter().next() else {
            warn!(plugin = %self.plugin_id(), "init message without a port, ignoring");
            return;
        };

        if let Err(e) = self.accept(port, query_params, rimori_info) {
            error!(plugin = %self.plugin_id(), "failed to accept init: {e}");
        }
    }

    fn accept(
        &self,
        port: Arc<dyn MessagePort>,
        query_params: HashMap<String, String>,
        rimori_info: Option<Value>,
    ) -> Result<(), BridgeError> {
        let initial = rimori_info.and_then(|value| match self.parse_context(value) {
            Ok(pair) => Some(pair),
            Err(e) => {
                warn!(plugin = %self.plugin_id(), "discarding context from init: {e}");
                None
            }
        });

        {
            let mut state = self.state();
            if state.phase == BridgePhase::Ready {
                warn!(plugin = %self.plugin_id(), "duplicate init ignored");
                return Ok(());
            }
            state.port = Some(Arc::clone(&port));
            state.query_params = query_params;
            if let Some((info, client)) = initial {
                state.context = Some(info);
                state.data_client = Some(client);
            }
        }

        let weak = self.downgrade();
        port.set_on_message(Arc::new(move |value: Value| {
            if let Some(bridge) = Bridge::upgrade(&weak) {
                bridge.handle_port_message(value);
            }
        }))?;

        let plugin_id = self.plugin_id().to_string();
        let outbound = Arc::clone(&port);
        let forwarder = self.inner.bus.on("*", move |event: &Event| {
            if event.sender != plugin_id || is_local_topic(&event.topic) {
                return;
            }
            let sent = PortMessage::Event(event.clone())
                .encode()
                .and_then(|message| outbound.post_message(message));
            if let Err(e) = sent {
                warn!(plugin = %plugin_id, topic = %event.topic, "failed to forward event: {e}");
            }
        })?;

        let queued = {
            let mut state = self.state();
            state.phase = BridgePhase::Ready;
            state.subscriptions.push(forwarder);
            std::mem::take(&mut state.queue)
        };

        info!(plugin = %self.plugin_id(), queued = queued.len(), "handshake complete");
        for thunk in queued {
            thunk();
        }
        Ok(())
    }

    fn handle_port_message(&self, value: Value) {
        match PortMessage::decode(&value) {
            Ok(PortMessage::Event(event)) => {
                if event.sender == self.plugin_id() {
                    trace!(topic = %event.topic, "ignoring own event echoed by host");
                    return;
                }
                self.inner.bus.emit_event(event);
            }
            Ok(PortMessage::Response {
                event_id,
                topic,
                data,
            }) => {
                self.inner
                    .bus
                    .emit(GLOBAL_SENDER, &topic, Some(data), Some(event_id));
            }
            Ok(PortMessage::Error { event_id, error }) => {
                self.inner.bus.reject(GLOBAL_SENDER, event_id, error);
            }
            Err(e) => warn!(plugin = %self.plugin_id(), "dropping port message: {e}"),
        }
    }

    fn acknowledge(&self) {
        if self.inner.config.standalone {
            trace!(plugin = %self.plugin_id(), "standalone, init finished not reported");
            return;
        }
        let Some(transport) = &self.inner.transport else {
            return;
        };
        let ack = HostMessage::Acknowledged {
            plugin_id: self.plugin_id().to_string(),
        };
        match ack.encode().and_then(|message| transport.post_to_host(message)) {
            Ok(()) => info!(plugin = %self.plugin_id(), "reported init finished to host"),
            Err(e) => error!(plugin = %self.plugin_id(), "failed to acknowledge init: {e}"),
        }
    }

    /// Remove the bridge's listeners from the bus.
    pub fn detach(&self) {
        let subscriptions = std::mem::take(&mut self.state().subscriptions);
        for sub in subscriptions {
            sub.off();
        }
    }

    // ─── Queuing ────────────────────────────────────────────────────────

    /// Run `f` once the bridge is ready; immediately if it already is.
    ///
    /// Queued functions run in the order they were queued.
    pub fn when_ready<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state();
        if state.phase == BridgePhase::Ready {
            drop(state);
            f();
        } else {
            state.queue.push_back(Box::new(f));
        }
    }

    async fn wait_ready(&self) -> Result<(), BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.when_ready(move || {
            let _ = tx.send(());
        });
        rx.await.map_err(|_| BridgeError::ChannelClosed)
    }

    // ─── Connection context ─────────────────────────────────────────────

    /// The current connection context.
    ///
    /// Waits for the handshake, then returns the cached context. A missing
    /// or expired context is requested on `global.<resource>.requestAccess`.
    pub async fn connection(&self) -> Result<RimoriInfo, BridgeError> {
        self.wait_ready().await?;
        if let Some(info) = self.cached() {
            return Ok(info);
        }

        let _guard = self.inner.refresh.lock().await;
        if let Some(info) = self.cached() {
            return Ok(info);
        }
        self.fetch_context().await
    }

    /// Client for the backing data service, built from the current context.
    pub async fn data_client(&self) -> Result<DataClient, BridgeError> {
        let info = self.connection().await?;
        if let Some(client) = self.state().data_client.clone() {
            if client.token() == info.token {
                return Ok(client);
            }
        }
        DataClient::new(self.inner.http.clone(), &info)
    }

    /// Bearer token of the current context.
    pub async fn token(&self) -> Result<String, BridgeError> {
        Ok(self.connection().await?.token)
    }

    /// The cached context without waiting or refreshing.
    pub fn cached_context(&self) -> Option<RimoriInfo> {
        self.state().context.clone()
    }

    pub fn query_param(&self, key: &str) -> Option<String> {
        self.state().query_params.get(key).cloned()
    }

    pub fn query_params(&self) -> HashMap<String, String> {
        self.state().query_params.clone()
    }

    fn cached(&self) -> Option<RimoriInfo> {
        let state = self.state();
        match &state.context {
            Some(info) if info.is_expired() => {
                debug!(plugin = %self.plugin_id(), expiration = %info.expiration, "cached context expired");
                None
            }
            other => other.clone(),
        }
    }

    async fn fetch_context(&self) -> Result<RimoriInfo, BridgeError> {
        let topic = self.inner.config.access_topic();
        debug!(plugin = %self.plugin_id(), topic = %topic, "requesting connection context");

        let event = self
            .inner
            .bus
            .request_with_timeout(
                self.plugin_id(),
                &topic,
                None,
                self.inner.config.request_timeout,
            )?
            .await?;

        let (info, client) = self.parse_context(event.data)?;
        {
            let mut state = self.state();
            state.context = Some(info.clone());
            state.data_client = Some(client);
        }
        Ok(info)
    }

    fn parse_context(&self, value: Value) -> Result<(RimoriInfo, DataClient), BridgeError> {
        let info =
            RimoriInfo::from_value(value).map_err(|e| BridgeError::InvalidContext(e.to_string()))?;
        let client = DataClient::new(self.inner.http.clone(), &info)?;
        Ok((info, client))
    }

    // ─── Updates ────────────────────────────────────────────────────────

    /// Register a callback for host-pushed context changes.
    ///
    /// The callback stays registered until the handle is dropped or
    /// [`UpdateHandle::off`] is called.
    pub fn on_update<F>(&self, callback: F) -> UpdateHandle
    where
        F: Fn(&RimoriInfo) + Send + Sync + 'static,
    {
        let id = self.inner.next_callback.fetch_add(1, Ordering::Relaxed);
        self.callbacks().push((id, Arc::new(callback)));
        UpdateHandle {
            bridge: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn update_callback_count(&self) -> usize {
        self.callbacks().len()
    }

    fn handle_update(&self, event: &Event) {
        let (info, client) = match self.parse_context(event.data.clone()) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(plugin = %self.plugin_id(), "ignoring malformed context update: {e}");
                return;
            }
        };

        {
            let mut state = self.state();
            if state.context.as_ref() == Some(&info) {
                trace!(plugin = %self.plugin_id(), "context update unchanged");
                return;
            }
            state.context = Some(info.clone());
            state.data_client = Some(client);
        }

        let callbacks: Vec<UpdateCallback> =
            self.callbacks().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        info!(plugin = %self.plugin_id(), callbacks = callbacks.len(), "connection context updated");
        for callback in callbacks {
            callback(&info);
        }
    }

    // ─── Internals ──────────────────────────────────────────────────────

    fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callbacks(&self) -> MutexGuard<'_, Vec<(u64, UpdateCallback)>> {
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn downgrade(&self) -> Weak<BridgeInner> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<BridgeInner>) -> Option<Bridge> {
        weak.upgrade().map(|inner| Bridge { inner })
    }
}

/// Registration of an update callback. Dropping it unregisters the callback.
#[derive(Debug)]
pub struct UpdateHandle {
    bridge: Weak<BridgeInner>,
    id: u64,
}

impl UpdateHandle {
    pub fn off(&self) {
        if let Some(inner) = self.bridge.upgrade() {
            inner
                .callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for UpdateHandle {
    fn drop(&mut self) {
        self.off();
    }
}
