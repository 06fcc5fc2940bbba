//! Event bus core: topic registry, dispatch, and request correlation.
//!
//! The `EventBus` is the pub/sub engine of one execution context. It
//! keeps listeners grouped by the exact topic string they registered,
//! resolves wildcard listeners by prefix at dispatch time, and correlates
//! requests with responses through the event ID.
//!
//! Dispatch is synchronous: `emit` invokes every matching handler before
//! it returns, and an `emit` from inside a handler is delivered depth
//! first. No lock is held while a handler runs.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::BusConfig;
use crate::dedup::DedupWindow;
use crate::error::BusError;
use crate::event::{payload_or_empty, Event};
use crate::id::IdGenerator;
use crate::topic::{is_local_topic, topic_matches, validate_topic, Strictness};

/// Topic that switches a bus into verbose tracing for the rest of its life.
pub const DEBUG_TOPIC: &str = "global.system.requestDebug";

/// Topic of the synthetic event that carries an error response.
pub const ERROR_TOPIC: &str = "error";

/// A listener callback.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Future returned by an async responder.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Value> + Send>>;

// ─── Topic lists ────────────────────────────────────────────────────────

/// One or several topics passed to `on` / `respond`.
pub trait IntoTopics {
    fn into_topics(self) -> Vec<String>;
}

impl IntoTopics for &str {
    fn into_topics(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoTopics for String {
    fn into_topics(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoTopics for &String {
    fn into_topics(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl IntoTopics for &[&str] {
    fn into_topics(self) -> Vec<String> {
        self.iter().map(|t| t.to_string()).collect()
    }
}

impl<const N: usize> IntoTopics for [&str; N] {
    fn into_topics(self) -> Vec<String> {
        self.iter().map(|t| t.to_string()).collect()
    }
}

impl IntoTopics for Vec<String> {
    fn into_topics(self) -> Vec<String> {
        self
    }
}

impl IntoTopics for Vec<&str> {
    fn into_topics(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

// ─── Responders ─────────────────────────────────────────────────────────

/// What a `respond` listener answers with.
#[derive(Clone)]
pub enum Responder {
    /// A fixed payload.
    Value(Value),
    /// Computed synchronously from the inbound event.
    Sync(Arc<dyn Fn(&Event) -> Value + Send + Sync>),
    /// Computed asynchronously; the response is emitted once the future
    /// completes. Requires a running tokio runtime.
    Async(Arc<dyn Fn(Event) -> ResponseFuture + Send + Sync>),
}

impl Responder {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Event) -> Value + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        Self::Async(Arc::new(move |event: Event| Box::pin(f(event)) as ResponseFuture))
    }
}

impl From<Value> for Responder {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Sync(_) => f.write_str("Sync(..)"),
            Self::Async(_) => f.write_str("Async(..)"),
        }
    }
}

// ─── Listener registrations ─────────────────────────────────────────────

/// Identifies one registration created by `on`, `once` or `respond`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId {
    pub topic: String,
    pub id: u64,
}

struct Registration {
    id: u64,
    topic: String,
    handler: Handler,
    ignore_sender: Vec<String>,
    dedup: DedupWindow,
    /// Present for `once` listeners; set while the single delivery is claimed.
    once: Option<AtomicBool>,
}

enum Delivery {
    Skipped,
    Delivered,
    DeliveredOnce,
    Panicked,
}

impl Registration {
    fn deliver(&self, bus: &str, event: &Event) -> Delivery {
        if !self.dedup.insert(event.event_id, &event.sender) {
            tracing::trace!(
                bus = %bus,
                topic = %event.topic,
                event_id = event.event_id,
                sender = %event.sender,
                listener = self.id,
                "duplicate delivery suppressed"
            );
            return Delivery::Skipped;
        }

        if let Some(claimed) = &self.once {
            if claimed.swap(true, Ordering::SeqCst) {
                return Delivery::Skipped;
            }
        }

        match catch_unwind(AssertUnwindSafe(|| (self.handler)(event))) {
            Ok(()) if self.once.is_some() => Delivery::DeliveredOnce,
            Ok(()) => Delivery::Delivered,
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                tracing::error!(
                    bus = %bus,
                    topic = %event.topic,
                    listener_topic = %self.topic,
                    listener = self.id,
                    "event handler panicked: {msg}"
                );
                if let Some(claimed) = &self.once {
                    claimed.store(false, Ordering::SeqCst);
                }
                Delivery::Panicked
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Handle returned by `on`, `once` and `respond`.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::off`].
#[derive(Debug, Clone)]
pub struct Subscription {
    bus: Weak<BusInner>,
    listeners: Vec<ListenerId>,
}

impl Subscription {
    /// Remove every registration created by the call that returned this handle.
    pub fn off(&self) {
        if let Some(inner) = self.bus.upgrade() {
            for listener in &self.listeners {
                inner.remove(listener);
            }
        }
    }

    pub fn listeners(&self) -> &[ListenerId] {
        &self.listeners
    }

    /// Combine several handles into one whose `off` removes them all.
    pub fn merge(subscriptions: impl IntoIterator<Item = Subscription>) -> Subscription {
        let mut bus = Weak::new();
        let mut listeners = Vec::new();
        for sub in subscriptions {
            bus = sub.bus;
            listeners.extend(sub.listeners);
        }
        Subscription { bus, listeners }
    }
}

// ─── Bus ────────────────────────────────────────────────────────────────

struct Waiting {
    topic: String,
    tx: oneshot::Sender<Event>,
}

struct BusInner {
    config: BusConfig,
    /// Exact topic string → registrations in insertion order.
    listeners: RwLock<HashMap<String, Vec<Arc<Registration>>>>,
    /// Event ID → request topic and the resolver waiting on it.
    pending: Mutex<HashMap<u64, Waiting>>,
    ids: IdGenerator,
    debug: AtomicBool,
}

impl std::fmt::Debug for BusInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusInner")
            .field("name", &self.config.name)
            .finish_non_exhaustive()
    }
}

impl BusInner {
    fn remove(&self, listener: &ListenerId) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(regs) = listeners.get_mut(&listener.topic) {
            regs.retain(|r| r.id != listener.id);
            if regs.is_empty() {
                listeners.remove(&listener.topic);
            }
        }
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Waiting>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The pub/sub engine of one execution context.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus. It starts with one listener on [`DEBUG_TOPIC`].
    pub fn new(config: BusConfig) -> Self {
        let ids = IdGenerator::new(config.id_window, config.id_sweep_interval);
        let bus = Self {
            inner: Arc::new(BusInner {
                config,
                listeners: RwLock::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                ids,
                debug: AtomicBool::new(false),
            }),
        };

        let weak = Arc::downgrade(&bus.inner);
        bus.register(
            DEBUG_TOPIC,
            Arc::new(move |_event: &Event| {
                if let Some(inner) = weak.upgrade() {
                    if !inner.debug.swap(true, Ordering::SeqCst) {
                        tracing::info!(bus = %inner.config.name, "debug tracing enabled");
                    }
                }
            }),
            Vec::new(),
            false,
        );

        bus
    }

    /// Create a bus with default settings and the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(BusConfig::named(name))
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.inner.debug.load(Ordering::SeqCst)
    }

    /// Mint an ID from this bus's generator.
    pub fn next_id(&self) -> u64 {
        self.inner.ids.next()
    }

    /// Number of registrations stored under exactly `topic`.
    pub fn listener_count(&self, topic: &str) -> usize {
        self.read_listeners().get(topic).map_or(0, Vec::len)
    }

    /// Number of requests still waiting for a response.
    pub fn pending_request_count(&self) -> usize {
        self.inner.pending().len()
    }

    /// Topic of the request still waiting on `event_id`, if any.
    pub fn pending_topic(&self, event_id: u64) -> Option<String> {
        self.inner.pending().get(&event_id).map(|w| w.topic.clone())
    }

    // ── Emit ─────────────────────────────────────────────────────────

    /// Publish an event.
    ///
    /// An invalid topic is logged and the call becomes a no-op. Passing
    /// `event_id` marks the event as a response: after dispatch, a request
    /// waiting on that ID is resolved with the event.
    pub fn emit(&self, sender: &str, topic: &str, data: Option<Value>, event_id: Option<u64>) {
        self.emit_internal(sender, topic, payload_or_empty(data), event_id, false);
    }

    /// Re-inject an event received from another context, keeping its ID.
    pub fn emit_event(&self, event: Event) {
        self.emit_internal(
            &event.sender,
            &event.topic,
            event.data,
            Some(event.event_id),
            false,
        );
    }

    fn emit_internal(
        &self,
        sender: &str,
        topic: &str,
        data: Value,
        event_id: Option<u64>,
        skip_response_trigger: bool,
    ) {
        let name = self.name();
        if !matches!(validate_topic(name, topic, Strictness::Lenient), Ok(true)) {
            return;
        }

        let event = self.create_event(sender, topic, data, event_id);
        self.trace(&event, "emitting event");

        let handlers = self.matching(topic);
        for reg in &handlers {
            if reg.ignore_sender.iter().any(|s| s == sender) {
                continue;
            }
            if let Delivery::DeliveredOnce = reg.deliver(name, &event) {
                self.inner.remove(&ListenerId {
                    topic: reg.topic.clone(),
                    id: reg.id,
                });
            }
        }

        if handlers.is_empty() {
            tracing::error!(bus = %name, topic = %topic, sender = %sender, "No handlers found for topic");
        }

        if let (Some(id), false) = (event_id, skip_response_trigger) {
            let resolver = self.inner.pending().remove(&id);
            if let Some(waiting) = resolver {
                self.trace(&event, "resolving pending request");
                let _ = waiting.tx.send(event);
            }
        }
    }

    fn create_event(&self, sender: &str, topic: &str, data: Value, event_id: Option<u64>) -> Event {
        let event_id = event_id.unwrap_or_else(|| self.inner.ids.next());
        Event::new(sender, topic, data, event_id, self.is_debug_enabled())
    }

    fn matching(&self, topic: &str) -> Vec<Arc<Registration>> {
        let listeners = self.read_listeners();
        let mut seen = HashSet::new();
        let mut matched = Vec::new();

        if let Some(exact) = listeners.get(topic) {
            for reg in exact {
                if seen.insert(reg.id) {
                    matched.push(Arc::clone(reg));
                }
            }
        }
        for (pattern, regs) in listeners.iter() {
            if pattern.ends_with('*') && topic_matches(pattern, topic) {
                for reg in regs {
                    if seen.insert(reg.id) {
                        matched.push(Arc::clone(reg));
                    }
                }
            }
        }

        matched
    }

    // ── Subscribe ────────────────────────────────────────────────────

    /// Register `handler` on one or more topics.
    ///
    /// Every topic is validated first; an invalid one fails the whole call
    /// without registering anything.
    pub fn on<F>(&self, topics: impl IntoTopics, handler: F) -> Result<Subscription, BusError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(topics.into_topics(), Arc::new(handler), Vec::new(), false)
    }

    /// Like [`on`](Self::on), skipping events whose sender is listed.
    pub fn on_ignoring<F>(
        &self,
        topics: impl IntoTopics,
        handler: F,
        ignore_sender: Vec<String>,
    ) -> Result<Subscription, BusError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(topics.into_topics(), Arc::new(handler), ignore_sender, false)
    }

    /// Register `handler` for a single delivery; it unregisters itself
    /// after the first invocation that returns normally.
    pub fn once<F>(&self, topic: &str, handler: F) -> Result<Subscription, BusError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(vec![topic.to_string()], Arc::new(handler), Vec::new(), true)
    }

    /// Remove a single registration.
    pub fn off(&self, listener: &ListenerId) {
        self.inner.remove(listener);
    }

    fn subscribe(
        &self,
        topics: Vec<String>,
        handler: Handler,
        ignore_sender: Vec<String>,
        once: bool,
    ) -> Result<Subscription, BusError> {
        for topic in &topics {
            validate_topic(self.name(), topic, Strictness::Strict)?;
        }

        let listeners = topics
            .iter()
            .map(|topic| {
                self.log(topic, "subscribing");
                self.register(topic, Arc::clone(&handler), ignore_sender.clone(), once)
            })
            .collect();

        Ok(Subscription {
            bus: Arc::downgrade(&self.inner),
            listeners,
        })
    }

    fn register(
        &self,
        topic: &str,
        handler: Handler,
        ignore_sender: Vec<String>,
        once: bool,
    ) -> ListenerId {
        let id = self.inner.ids.next();
        let reg = Arc::new(Registration {
            id,
            topic: topic.to_string(),
            handler,
            ignore_sender,
            dedup: DedupWindow::new(self.inner.config.dedup_capacity),
            once: once.then(|| AtomicBool::new(false)),
        });

        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.to_string())
            .or_default()
            .push(reg);

        ListenerId {
            topic: topic.to_string(),
            id,
        }
    }

    // ── Respond ──────────────────────────────────────────────────────

    /// Answer requests on one or more topics.
    ///
    /// The response is emitted by `sender` on the inbound event's topic
    /// with the inbound event ID, which resolves the matching request.
    /// Events from `sender` itself are ignored unless the topic starts
    /// with `self.`.
    pub fn respond(
        &self,
        sender: &str,
        topics: impl IntoTopics,
        responder: impl Into<Responder>,
    ) -> Result<Subscription, BusError> {
        let responder = responder.into();
        let topics = topics.into_topics();
        for topic in &topics {
            validate_topic(self.name(), topic, Strictness::Strict)?;
        }

        let subs = topics
            .into_iter()
            .map(|topic| {
                let ignore = if is_local_topic(&topic) {
                    Vec::new()
                } else {
                    vec![sender.to_string()]
                };
                self.log(&topic, "adding request listener");
                let handler = self.response_handler(sender.to_string(), responder.clone());
                self.subscribe(vec![topic], handler, ignore, false)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Subscription::merge(subs))
    }

    fn response_handler(&self, sender: String, responder: Responder) -> Handler {
        let weak = Arc::downgrade(&self.inner);
        let answered = DedupWindow::new(self.inner.config.dedup_capacity);

        Arc::new(move |event: &Event| {
            if !answered.insert(event.event_id, &event.sender) {
                return;
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let bus = EventBus { inner };

            match &responder {
                Responder::Value(value) => {
                    bus.emit(&sender, &event.topic, Some(value.clone()), Some(event.event_id));
                }
                Responder::Sync(f) => {
                    let response = f(event);
                    bus.emit(&sender, &event.topic, Some(response), Some(event.event_id));
                }
                Responder::Async(f) => {
                    let future = f(event.clone());
                    let topic = event.topic.clone();
                    let event_id = event.event_id;
                    let sender = sender.clone();
                    let weak = Arc::downgrade(&bus.inner);
                    match tokio::runtime::Handle::try_current() {
                        Ok(handle) => {
                            handle.spawn(async move {
                                let response = future.await;
                                if let Some(inner) = weak.upgrade() {
                                    EventBus { inner }.emit(&sender, &topic, Some(response), Some(event_id));
                                }
                            });
                        }
                        Err(_) => tracing::error!(
                            bus = %bus.name(),
                            topic = %topic,
                            "async responder needs a tokio runtime, request left unanswered"
                        ),
                    }
                }
            }
        })
    }

    // ── Request ──────────────────────────────────────────────────────

    /// Emit a request and wait for its response, without a timeout.
    ///
    /// The request is emitted before this returns; the returned future
    /// resolves when an event with the same ID is emitted later.
    pub fn request(
        &self,
        sender: &str,
        topic: &str,
        data: Option<Value>,
    ) -> Result<PendingRequest, BusError> {
        self.request_with_timeout(sender, topic, data, None)
    }

    /// Emit a request whose future fails with [`BusError::Timeout`] if no
    /// response arrives within `timeout`.
    pub fn request_with_timeout(
        &self,
        sender: &str,
        topic: &str,
        data: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<PendingRequest, BusError> {
        validate_topic(self.name(), topic, Strictness::Strict)?;

        let event_id = self.inner.ids.next();
        let (tx, rx) = oneshot::channel();
        self.inner.pending().insert(
            event_id,
            Waiting {
                topic: topic.to_string(),
                tx,
            },
        );
        self.log(topic, "requesting");

        self.emit_internal(sender, topic, payload_or_empty(data), Some(event_id), true);

        Ok(PendingRequest {
            bus: Arc::downgrade(&self.inner),
            topic: topic.to_string(),
            event_id,
            rx,
            deadline: timeout.map(|t| Instant::now() + t),
            sleep: None,
        })
    }

    /// Resolve a pending request with an error response.
    ///
    /// The synthetic event is not dispatched to listeners.
    pub fn reject(&self, sender: &str, event_id: u64, error: Value) {
        let resolver = self.inner.pending().remove(&event_id);
        match resolver {
            Some(Waiting { tx, .. }) => {
                let event = Event::new(
                    sender,
                    ERROR_TOPIC,
                    serde_json::json!({ "error": error }),
                    event_id,
                    self.is_debug_enabled(),
                );
                tracing::error!(bus = %self.name(), event_id, "request failed: {error}");
                let _ = tx.send(event);
            }
            None => {
                tracing::warn!(bus = %self.name(), event_id, "error response for unknown request");
            }
        }
    }

    // ── Logging helpers ──────────────────────────────────────────────

    fn trace(&self, event: &Event, msg: &str) {
        if self.is_debug_enabled() {
            tracing::info!(
                bus = %self.name(),
                topic = %event.topic,
                event_id = event.event_id,
                sender = %event.sender,
                data = %event.data,
                "{msg}"
            );
        } else {
            tracing::trace!(
                bus = %self.name(),
                topic = %event.topic,
                event_id = event.event_id,
                sender = %event.sender,
                "{msg}"
            );
        }
    }

    fn log(&self, topic: &str, msg: &str) {
        if self.is_debug_enabled() {
            tracing::info!(bus = %self.name(), topic = %topic, "{msg}");
        } else {
            tracing::trace!(bus = %self.name(), topic = %topic, "{msg}");
        }
    }

    fn read_listeners(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<Arc<Registration>>>> {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

// ─── Pending request ────────────────────────────────────────────────────

/// A request waiting for its response.
///
/// Dropping it removes the pending entry.
#[derive(Debug)]
pub struct PendingRequest {
    bus: Weak<BusInner>,
    topic: String,
    event_id: u64,
    rx: oneshot::Receiver<Event>,
    /// Fixed when the request is emitted, not when it is first polled.
    deadline: Option<Instant>,
    sleep: Option<Pin<Box<tokio::time::Sleep>>>,
}

impl PendingRequest {
    /// The ID correlating this request with its response.
    pub fn event_id(&self) -> u64 {
        self.event_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the response and deserialize its payload.
    pub async fn data<T: DeserializeOwned>(self) -> Result<T, BusError> {
        let event = self.await?;
        Ok(event.data_as()?)
    }
}

impl Future for PendingRequest {
    type Output = Result<Event, BusError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if let Poll::Ready(result) = Pin::new(&mut this.rx).poll(cx) {
            return Poll::Ready(match result {
                Ok(event) if event.topic == ERROR_TOPIC => {
                    Err(BusError::Remote(error_message(&event.data)))
                }
                Ok(event) => Ok(event),
                Err(_) => Err(BusError::Dropped {
                    topic: this.topic.clone(),
                    event_id: this.event_id,
                }),
            });
        }

        if let Some(deadline) = this.deadline {
            let sleep = this
                .sleep
                .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)));
            if sleep.as_mut().poll(cx).is_ready() {
                return Poll::Ready(Err(BusError::Timeout {
                    topic: this.topic.clone(),
                    event_id: this.event_id,
                }));
            }
        }

        Poll::Pending
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.pending().remove(&self.event_id);
        }
    }
}

fn error_message(data: &Value) -> String {
    match data.get("error") {
        Some(Value::String(s)) => s.clone(),
        Some(err) => err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string()),
        None => data.to_string(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Event) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move |_: &Event| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    // ── Emit / on ────────────────────────────────────────────────────

    #[test]
    fn test_emit_without_listeners_is_noop() {
        let bus = EventBus::default();
        bus.emit("pl001", "pl001.card.triggerCreate", None, None);
        assert_eq!(bus.pending_request_count(), 0);
    }

    #[test]
    fn test_emit_invalid_topic_does_not_panic() {
        let bus = EventBus::default();
        let (count, handler) = counter();
        bus.on("*", handler).unwrap();
        bus.emit("pl001", "not-a-topic", None, None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wildcard_listener_receives_event() {
        let bus = EventBus::default();
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&received);
        bus.on("pl001.card.*", move |e: &Event| {
            r.lock().unwrap().push(e.topic.clone());
        })
        .unwrap();

        bus.emit("pl001", "pl001.card.requestNew", Some(json!({"n": 1})), None);

        let received = received.lock().unwrap();
        assert_eq!(received.as_slice(), ["pl001.card.requestNew"]);
    }

    #[test]
    fn test_delivery_set_is_exact_union_wildcards() {
        let bus = EventBus::default();
        let (exact, h1) = counter();
        let (area, h2) = counter();
        let (scope, h3) = counter();
        let (other, h4) = counter();
        bus.on("pl001.card.triggerFlip", h1).unwrap();
        bus.on("pl001.card.*", h2).unwrap();
        bus.on("pl001.*", h3).unwrap();
        bus.on("pl001.deck.*", h4).unwrap();

        bus.emit("x", "pl001.card.triggerFlip", None, None);

        assert_eq!(exact.load(Ordering::SeqCst), 1);
        assert_eq!(area.load(Ordering::SeqCst), 1);
        assert_eq!(scope.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_exact_listeners_keep_registration_order() {
        let bus = EventBus::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let o = Arc::clone(&order);
            bus.on("a.b.triggerC", move |_: &Event| o.lock().unwrap().push(i))
                .unwrap();
        }
        bus.emit("x", "a.b.triggerC", None, None);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_duplicate_event_id_and_sender_delivered_once() {
        let bus = EventBus::default();
        let (count, handler) = counter();
        bus.on("a.b.triggerC", handler).unwrap();

        bus.emit("x", "a.b.triggerC", None, Some(42));
        bus.emit("x", "a.b.triggerC", None, Some(42));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Same ID from another sender is a different delivery.
        bus.emit("y", "a.b.triggerC", None, Some(42));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ignore_sender() {
        let bus = EventBus::default();
        let (count, handler) = counter();
        bus.on_ignoring("a.b.triggerC", handler, vec!["me".into()])
            .unwrap();
        bus.emit("me", "a.b.triggerC", None, None);
        bus.emit("you", "a.b.triggerC", None, None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_on_invalid_topic_errors() {
        let bus = EventBus::default();
        let err = bus.on("bad_topic", |_: &Event| {}).unwrap_err();
        assert!(err.to_string().contains("Invalid topic: bad_topic"));
    }

    #[test]
    fn test_on_many_rejects_all_if_one_invalid() {
        let bus = EventBus::default();
        let result = bus.on(["a.b.triggerC", "broken"], |_: &Event| {});
        assert!(result.is_err());
        assert_eq!(bus.listener_count("a.b.triggerC"), 0);
    }

    #[test]
    fn test_off_removes_only_own_registration() {
        let bus = EventBus::default();
        let (first, h1) = counter();
        let (second, h2) = counter();
        let sub = bus.on("a.b.triggerC", h1).unwrap();
        bus.on("a.b.triggerC", h2).unwrap();

        sub.off();
        bus.emit("x", "a.b.triggerC", None, None);

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("a.b.triggerC"), 1);
    }

    #[test]
    fn test_off_multi_topic_handle() {
        let bus = EventBus::default();
        let (count, handler) = counter();
        let sub = bus.on(["a.b.triggerC", "a.b.triggerD"], handler).unwrap();
        assert_eq!(sub.listeners().len(), 2);

        sub.off();
        bus.emit("x", "a.b.triggerC", None, None);
        bus.emit("x", "a.b.triggerD", None, None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count("a.b.triggerC"), 0);
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let bus = EventBus::default();
        let (count, handler) = counter();
        bus.once("a.b.triggerC", handler).unwrap();

        bus.emit("x", "a.b.triggerC", None, None);
        bus.emit("x", "a.b.triggerC", None, None);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("a.b.triggerC"), 0);
    }

    #[test]
    fn test_once_not_reentered_by_nested_emit() {
        let bus = EventBus::default();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let inner_bus = bus.clone();
        bus.once("a.b.triggerC", move |_: &Event| {
            c.fetch_add(1, Ordering::SeqCst);
            inner_bus.emit("x", "a.b.triggerC", None, None);
        })
        .unwrap();

        bus.emit("x", "a.b.triggerC", None, None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_nested_emit_is_depth_first() {
        let bus = EventBus::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        let inner_bus = bus.clone();
        bus.on("a.outer.triggerX", move |_: &Event| {
            o.lock().unwrap().push("outer-1");
            inner_bus.emit("x", "a.inner.triggerX", None, None);
        })
        .unwrap();
        let o = Arc::clone(&order);
        bus.on("a.outer.triggerX", move |_: &Event| o.lock().unwrap().push("outer-2"))
            .unwrap();
        let o = Arc::clone(&order);
        bus.on("a.inner.triggerX", move |_: &Event| o.lock().unwrap().push("inner"))
            .unwrap();

        bus.emit("x", "a.outer.triggerX", None, None);
        assert_eq!(*order.lock().unwrap(), vec!["outer-1", "inner", "outer-2"]);
    }

    #[test]
    fn test_panicking_handler_does_not_block_siblings() {
        let bus = EventBus::default();
        let (count, handler) = counter();
        bus.on("a.b.triggerC", |_: &Event| panic!("listener bug"))
            .unwrap();
        bus.on("a.b.triggerC", handler).unwrap();

        bus.emit("x", "a.b.triggerC", None, None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_topic_enables_debug() {
        let bus = EventBus::default();
        assert!(!bus.is_debug_enabled());
        bus.emit("pl001", DEBUG_TOPIC, None, None);
        assert!(bus.is_debug_enabled());

        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        bus.on("a.b.triggerC", move |e: &Event| *s.lock().unwrap() = Some(e.debug))
            .unwrap();
        bus.emit("x", "a.b.triggerC", None, None);
        assert_eq!(*seen.lock().unwrap(), Some(true));
    }

    // ── Request / respond ────────────────────────────────────────────

    #[tokio::test]
    async fn test_request_resolved_by_static_responder() {
        let bus = EventBus::default();
        bus.respond("host", "global.supabase.requestAccess", json!({"token": "abc"}))
            .unwrap();

        let event = bus
            .request("pl001", "global.supabase.requestAccess", None)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(event.data["token"], "abc");
        assert_eq!(event.sender, "host");
        assert_eq!(bus.pending_request_count(), 0);
    }

    #[tokio::test]
    async fn test_request_resolved_by_later_emit_with_same_id() {
        let bus = EventBus::default();
        let pending = bus.request("pl001", "pl001.card.requestNew", None).unwrap();
        let id = pending.event_id();

        // An unrelated response does not resolve it.
        bus.emit("host", "pl001.card.requestNew", Some(json!({"n": 0})), Some(id + 1));
        assert_eq!(bus.pending_request_count(), 1);

        bus.emit("host", "pl001.card.requestNew", Some(json!({"n": 1})), Some(id));
        let event = pending.await.unwrap();
        assert_eq!(event.event_id, id);
        assert_eq!(event.data["n"], 1);
    }

    #[tokio::test]
    async fn test_request_with_sync_responder() {
        let bus = EventBus::default();
        bus.respond(
            "pl002",
            "pl002.math.requestDouble",
            Responder::from_fn(|e: &Event| json!({"value": e.data["value"].as_i64().unwrap_or(0) * 2})),
        )
        .unwrap();

        let event = bus
            .request("pl001", "pl002.math.requestDouble", Some(json!({"value": 21})))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(event.data["value"], 42);
    }

    #[tokio::test]
    async fn test_request_with_async_responder() {
        let bus = EventBus::default();
        bus.respond(
            "host",
            "global.ai.requestText",
            Responder::from_async(|e: Event| async move {
                tokio::task::yield_now().await;
                json!({"echo": e.data["prompt"]})
            }),
        )
        .unwrap();

        let event = bus
            .request("pl001", "global.ai.requestText", Some(json!({"prompt": "hi"})))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(event.data["echo"], "hi");
    }

    #[tokio::test]
    async fn test_respond_self_topic_answers_own_sender() {
        let bus = EventBus::default();
        bus.respond("pl001", "self.x.triggerY", json!({"ok": true}))
            .unwrap();

        let event = bus
            .request("pl001", "self.x.triggerY", None)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(event.data["ok"], true);
    }

    #[tokio::test]
    async fn test_respond_ignores_own_sender_on_plugin_topic() {
        let bus = EventBus::default();
        let (count, handler) = counter();
        let c = Arc::new(handler);
        let c2 = Arc::clone(&c);
        bus.respond(
            "pl001",
            "pl001.x.triggerY",
            Responder::from_fn(move |e: &Event| {
                (*c2)(e);
                json!({})
            }),
        )
        .unwrap();

        let pending = bus
            .request_with_timeout(
                "pl001",
                "pl001.x.triggerY",
                None,
                Some(Duration::from_millis(20)),
            )
            .unwrap();
        let err = pending.await.unwrap_err();
        assert!(matches!(err, BusError::Timeout { .. }));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Another sender gets an answer.
        bus.request("pl009", "pl001.x.triggerY", None)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_responder_does_not_loop_on_its_own_response() {
        let bus = EventBus::default();
        let (count, handler) = counter();
        let handler = Arc::new(handler);
        let h = Arc::clone(&handler);
        bus.respond(
            "pl001",
            "self.loop.triggerPing",
            Responder::from_fn(move |e: &Event| {
                (*h)(e);
                json!({"pong": true})
            }),
        )
        .unwrap();

        bus.request("pl001", "self.loop.triggerPing", None)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_request_invalid_topic_errors() {
        let bus = EventBus::default();
        let err = bus.request("pl001", "bad_topic", None).unwrap_err();
        assert!(matches!(err, BusError::InvalidTopic { .. }));
        assert_eq!(bus.pending_request_count(), 0);
    }

    #[tokio::test]
    async fn test_request_timeout_removes_pending_entry() {
        let bus = EventBus::default();
        let pending = bus
            .request_with_timeout("pl001", "global.nobody.requestAnything", None, Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(bus.pending_request_count(), 1);

        let err = pending.await.unwrap_err();
        assert!(matches!(err, BusError::Timeout { .. }));
        assert_eq!(bus.pending_request_count(), 0);
    }

    #[test]
    fn test_dropping_request_removes_pending_entry() {
        let bus = EventBus::default();
        let pending = bus.request("pl001", "global.nobody.requestAnything", None).unwrap();
        assert_eq!(bus.pending_request_count(), 1);
        drop(pending);
        assert_eq!(bus.pending_request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_deadline_counts_from_emit() {
        let bus = EventBus::default();
        let pending = bus
            .request_with_timeout("pl001", "global.nobody.requestAnything", None, Some(Duration::from_millis(50)))
            .unwrap();

        // Awaited only after the deadline has passed: it must fail on the
        // first poll instead of starting a fresh 50ms timer.
        tokio::time::advance(Duration::from_millis(60)).await;
        let result = tokio::time::timeout(Duration::ZERO, pending).await;
        assert!(matches!(result, Ok(Err(BusError::Timeout { .. }))));
    }

    #[test]
    fn test_pending_topic() {
        let bus = EventBus::default();
        let pending = bus.request("pl001", "global.ai.requestText", None).unwrap();
        assert_eq!(
            bus.pending_topic(pending.event_id()).as_deref(),
            Some("global.ai.requestText")
        );
        let id = pending.event_id();
        assert!(bus.pending_topic(id + 1).is_none());

        drop(pending);
        assert!(bus.pending_topic(id).is_none());
    }

    #[tokio::test]
    async fn test_request_data_deserializes_payload() {
        #[derive(serde::Deserialize)]
        struct Access {
            token: String,
        }

        let bus = EventBus::default();
        bus.respond("host", "global.supabase.requestAccess", json!({"token": "abc"}))
            .unwrap();

        let access: Access = bus
            .request("pl001", "global.supabase.requestAccess", None)
            .unwrap()
            .data()
            .await
            .unwrap();
        assert_eq!(access.token, "abc");
    }

    #[tokio::test]
    async fn test_request_data_reports_bad_payload() {
        #[derive(Debug, serde::Deserialize)]
        struct Access {
            #[allow(dead_code)]
            token: String,
        }

        let bus = EventBus::default();
        bus.respond("host", "global.supabase.requestAccess", json!({"token": 7}))
            .unwrap();

        let err = bus
            .request("pl001", "global.supabase.requestAccess", None)
            .unwrap()
            .data::<Access>()
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_reject_resolves_with_remote_error() {
        let bus = EventBus::default();
        let pending = bus.request("pl001", "global.db.requestRows", None).unwrap();
        bus.reject("pl001", pending.event_id(), json!("permission denied"));

        let err = pending.await.unwrap_err();
        assert_eq!(err.to_string(), "remote error: permission denied");
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(&json!({"error": "x"})), "x");
        assert_eq!(error_message(&json!({"error": {"message": "y"}})), "y");
        assert_eq!(error_message(&json!({"error": 3})), "3");
    }
}
