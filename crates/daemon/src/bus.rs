// In-process message bus between the background, review and capture contexts.
//
// Delivery is best-effort and context-scoped. A context exists only while its
// `ContextHandle` is alive; dropping the handle tears the context down and
// aborts any handler still running inside it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use clipnote_common::protocol::messages::{Reply, ToBackground, ToPopup, ToTab};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::debug;

/// Identity of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContextId {
    Background,
    Popup,
    Tab(u32),
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Background => write!(f, "background"),
            Self::Popup => write!(f, "popup"),
            Self::Tab(id) => write!(f, "tab:{id}"),
        }
    }
}

/// Any message, tagged by the direction it travels.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Background(ToBackground),
    Popup(ToPopup),
    Tab(ToTab),
}

impl Message {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Background(message) => message.action(),
            Self::Popup(message) => message.action(),
            Self::Tab(message) => message.action(),
        }
    }
}

impl From<ToBackground> for Message {
    fn from(message: ToBackground) -> Self {
        Self::Background(message)
    }
}

impl From<ToPopup> for Message {
    fn from(message: ToPopup) -> Self {
        Self::Popup(message)
    }
}

impl From<ToTab> for Message {
    fn from(message: ToTab) -> Self {
        Self::Tab(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no receiving context `{0}`")]
    NoReceiver(ContextId),
    #[error("message bus lock poisoned")]
    Closed,
}

/// One-shot answer channel handed to the first matching listener.
#[derive(Debug)]
pub struct Responder(oneshot::Sender<Reply>);

impl Responder {
    pub fn respond(self, reply: Reply) {
        // The caller may have given up waiting.
        let _ = self.0.send(reply);
    }
}

/// A delivered message.
#[derive(Debug)]
pub struct Envelope {
    pub from: ContextId,
    pub message: Message,
    pub responder: Option<Responder>,
}

impl Envelope {
    /// Answer the sender if it is waiting. No-op for fire-and-forget sends
    /// and for listeners that were not first in line.
    pub fn respond(&mut self, reply: Reply) {
        if let Some(responder) = self.responder.take() {
            responder.respond(reply);
        }
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Predicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;
type Handler = Arc<dyn Fn(Envelope) -> HandlerFuture + Send + Sync>;

struct Listener {
    predicate: Predicate,
    handler: Handler,
}

struct ContextEntry {
    generation: u64,
    listeners: Vec<Listener>,
    in_flight: Vec<AbortHandle>,
}

#[derive(Default)]
struct BusState {
    next_generation: u64,
    contexts: HashMap<ContextId, ContextEntry>,
}

#[derive(Clone, Default)]
pub struct MessageBus {
    state: Arc<Mutex<BusState>>,
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus").finish_non_exhaustive()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring a context into existence. Attaching an id that is already live
    /// replaces the previous incarnation (a reopened popup).
    pub fn attach(&self, id: ContextId) -> Result<ContextHandle, BusError> {
        let mut state = self.lock()?;
        state.next_generation += 1;
        let generation = state.next_generation;
        if let Some(previous) =
            state.contexts.insert(id, ContextEntry { generation, listeners: Vec::new(), in_flight: Vec::new() })
        {
            abort_all(previous);
        }
        debug!(context = %id, generation, "context attached");
        Ok(ContextHandle { sender: ContextSender { bus: self.clone(), id }, generation })
    }

    pub fn is_attached(&self, id: ContextId) -> bool {
        self.lock().map(|state| state.contexts.contains_key(&id)).unwrap_or(false)
    }

    /// Ids of every live capture context.
    pub fn tabs(&self) -> Vec<u32> {
        let Ok(state) = self.lock() else {
            return Vec::new();
        };
        let mut tabs: Vec<u32> = state
            .contexts
            .keys()
            .filter_map(|id| match id {
                ContextId::Tab(tab) => Some(*tab),
                _ => None,
            })
            .collect();
        tabs.sort_unstable();
        tabs
    }

    fn deliver(
        &self,
        from: ContextId,
        to: ContextId,
        message: Message,
        responder: Option<Responder>,
    ) -> Result<(), BusError> {
        let mut state = self.lock()?;
        let entry = state.contexts.get_mut(&to).ok_or(BusError::NoReceiver(to))?;
        entry.in_flight.retain(|handle| !handle.is_finished());

        let mut responder = responder;
        for listener in entry.listeners.iter().filter(|listener| (listener.predicate)(&message)) {
            let envelope =
                Envelope { from, message: message.clone(), responder: responder.take() };
            let task = tokio::spawn((listener.handler)(envelope));
            entry.in_flight.push(task.abort_handle());
        }
        // No matching listener: a dropped responder resolves the caller to `Unknown`.
        Ok(())
    }

    fn detach(&self, id: ContextId, generation: u64) {
        let Ok(mut state) = self.lock() else {
            return;
        };
        if state.contexts.get(&id).is_some_and(|entry| entry.generation == generation) {
            if let Some(entry) = state.contexts.remove(&id) {
                abort_all(entry);
            }
            debug!(context = %id, generation, "context detached");
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BusState>, BusError> {
        self.state.lock().map_err(|_| BusError::Closed)
    }
}

fn abort_all(entry: ContextEntry) {
    for handle in entry.in_flight {
        handle.abort();
    }
}

/// Sends stamped with a fixed sender id. Cheap to clone and does not keep
/// its context alive.
#[derive(Clone)]
pub struct ContextSender {
    bus: MessageBus,
    id: ContextId,
}

impl fmt::Debug for ContextSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSender").field("id", &self.id).finish()
    }
}

impl ContextSender {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Fire-and-forget. `Err` only tells the sender the target does not
    /// exist right now; success is no proof the message was processed.
    pub fn send(&self, to: ContextId, message: impl Into<Message>) -> Result<(), BusError> {
        self.bus.deliver(self.id, to, message.into(), None)
    }

    /// Fire-and-forget that swallows delivery failures. Used for pushes to
    /// contexts that may have closed.
    pub fn notify(&self, to: ContextId, message: impl Into<Message>) {
        let message = message.into();
        let action = message.action();
        if let Err(error) = self.send(to, message) {
            debug!(context = %to, action, %error, "push not delivered");
        }
    }

    /// Request/response. Resolves to `Reply::Unknown` when the target is
    /// missing, has no matching listener, or finishes without answering.
    pub async fn send_and_await(&self, to: ContextId, message: impl Into<Message>) -> Reply {
        let message = message.into();
        let action = message.action();
        let (tx, rx) = oneshot::channel();
        if let Err(error) = self.bus.deliver(self.id, to, message, Some(Responder(tx))) {
            debug!(context = %to, action, %error, "request not delivered");
            return Reply::Unknown;
        }
        match rx.await {
            Ok(reply) => reply,
            Err(_) => {
                debug!(context = %to, action, "request finished without a reply");
                Reply::Unknown
            }
        }
    }

    /// Push to every live capture context. Returns how many accepted it.
    pub fn broadcast_to_tabs(&self, message: ToTab) -> usize {
        self.bus
            .tabs()
            .into_iter()
            .filter(|tab| self.send(ContextId::Tab(*tab), message.clone()).is_ok())
            .count()
    }
}

/// A live context. Dropping it detaches the context from the bus.
pub struct ContextHandle {
    sender: ContextSender,
    generation: u64,
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.sender.id)
            .field("generation", &self.generation)
            .finish()
    }
}

impl ContextHandle {
    pub fn sender(&self) -> ContextSender {
        self.sender.clone()
    }

    /// Register a listener. Handlers run as independent tasks; completion
    /// order between two messages is not guaranteed.
    pub fn subscribe<P, H, Fut>(&self, predicate: P, handler: H) -> Result<(), BusError>
    where
        P: Fn(&Message) -> bool + Send + Sync + 'static,
        H: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.sender.id;
        let mut state = self.sender.bus.lock()?;
        let entry = state
            .contexts
            .get_mut(&id)
            .filter(|entry| entry.generation == self.generation)
            .ok_or(BusError::NoReceiver(id))?;
        entry.listeners.push(Listener {
            predicate: Arc::new(predicate),
            handler: Arc::new(move |envelope| Box::pin(handler(envelope))),
        });
        Ok(())
    }
}

impl Deref for ContextHandle {
    type Target = ContextSender;

    fn deref(&self) -> &ContextSender {
        &self.sender
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        self.sender.bus.detach(self.sender.id, self.generation);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use clipnote_common::types::SaveOutcome;
    use tokio::sync::mpsc;

    use super::*;

    fn any(_: &Message) -> bool {
        true
    }

    #[tokio::test]
    async fn send_to_missing_context_fails_and_notify_is_silent() {
        let bus = MessageBus::new();
        let background = bus.attach(ContextId::Background).unwrap();

        let result = background.send(ContextId::Popup, ToPopup::ClearSummaryResponse { success: true });
        assert_eq!(result, Err(BusError::NoReceiver(ContextId::Popup)));

        background.notify(ContextId::Popup, ToPopup::ClearSummaryResponse { success: true });
    }

    #[tokio::test]
    async fn request_to_closed_context_resolves_unknown() {
        let bus = MessageBus::new();
        let popup = bus.attach(ContextId::Popup).unwrap();
        let reply = popup.send_and_await(ContextId::Background, ToBackground::GetSummaryState).await;
        assert!(reply.is_unknown());
    }

    #[tokio::test]
    async fn handler_returning_without_reply_resolves_unknown() {
        let bus = MessageBus::new();
        let background = bus.attach(ContextId::Background).unwrap();
        background.subscribe(any, |_envelope| async {}).unwrap();
        let popup = bus.attach(ContextId::Popup).unwrap();

        let reply = popup.send_and_await(ContextId::Background, ToBackground::GetSummaryState).await;
        assert!(reply.is_unknown());
    }

    #[tokio::test]
    async fn first_matching_listener_answers() {
        let bus = MessageBus::new();
        let background = bus.attach(ContextId::Background).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let seen = calls.clone();
        background
            .subscribe(any, move |mut envelope| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    envelope.respond(Reply::Saved(SaveOutcome::failed("first")));
                }
            })
            .unwrap();
        let seen = calls.clone();
        background
            .subscribe(any, move |mut envelope| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    assert!(envelope.responder.is_none());
                    envelope.respond(Reply::Processing);
                }
            })
            .unwrap();

        let popup = bus.attach(ContextId::Popup).unwrap();
        let reply = popup.send_and_await(ContextId::Background, ToBackground::ClearSummary).await;
        assert_eq!(reply, Reply::Saved(SaveOutcome::failed("first")));
    }

    #[tokio::test]
    async fn predicate_filters_messages_and_sender_is_stamped() {
        let bus = MessageBus::new();
        let popup = bus.attach(ContextId::Popup).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        popup
            .subscribe(
                |message| matches!(message, Message::Popup(ToPopup::ClearSummaryResponse { .. })),
                move |envelope| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send((envelope.from, envelope.message));
                    }
                },
            )
            .unwrap();

        let background = bus.attach(ContextId::Background).unwrap();
        background
            .send(ContextId::Popup, ToPopup::FloatingBallResponse {
                response: clipnote_common::protocol::messages::DirectSaveResult {
                    success: true,
                    is_extract_only: false,
                    error: None,
                },
            })
            .unwrap();
        background.send(ContextId::Popup, ToPopup::ClearSummaryResponse { success: true }).unwrap();

        let (from, message) = rx.recv().await.unwrap();
        assert_eq!(from, ContextId::Background);
        assert_eq!(message, Message::Popup(ToPopup::ClearSummaryResponse { success: true }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_handle_detaches_and_aborts_running_handlers() {
        let bus = MessageBus::new();
        let popup = bus.attach(ContextId::Popup).unwrap();
        let finished = Arc::new(AtomicUsize::new(0));
        let done = finished.clone();
        popup
            .subscribe(any, move |_envelope| {
                let done = done.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();

        let background = bus.attach(ContextId::Background).unwrap();
        background.send(ContextId::Popup, ToPopup::ClearSummaryResponse { success: true }).unwrap();
        tokio::task::yield_now().await;
        drop(popup);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert!(!bus.is_attached(ContextId::Popup));
    }

    #[tokio::test]
    async fn stale_handle_drop_keeps_reattached_context() {
        let bus = MessageBus::new();
        let first = bus.attach(ContextId::Popup).unwrap();
        let second = bus.attach(ContextId::Popup).unwrap();
        drop(first);
        assert!(bus.is_attached(ContextId::Popup));
        drop(second);
        assert!(!bus.is_attached(ContextId::Popup));
    }

    #[tokio::test]
    async fn broadcast_reaches_every_tab() {
        let bus = MessageBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tabs = Vec::new();
        for id in [1, 2] {
            let tab = bus.attach(ContextId::Tab(id)).unwrap();
            let tx = tx.clone();
            tab.subscribe(any, move |envelope| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(envelope.message);
                }
            })
            .unwrap();
            tabs.push(tab);
        }
        let background = bus.attach(ContextId::Background).unwrap();

        let message = ToTab::UpdateFloatingBallState { enabled: Some(false), success: None, error: None };
        assert_eq!(background.broadcast_to_tabs(message.clone()), 2);
        assert_eq!(bus.tabs(), vec![1, 2]);
        for _ in 0..2 {
            assert_eq!(rx.recv().await.unwrap(), Message::Tab(message.clone()));
        }
    }
}
