//! The completion controller: owns the lifecycle of the one in-flight
//! completion of a conversation.

use std::sync::Arc;

use cosync_runtime::{Message, RuntimeClient, RuntimeRequest, to_wire_messages};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::{
    cycle::{CycleSlot, CycleTicket},
    error::{Error, Result},
    reconciler::StreamReconciler,
    store::{MessageStore, Snapshot, Subscription},
};

/// Options for creating a [`ChatService`]
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    /// Messages the conversation starts with
    pub initial_messages: Vec<Message>,
}

impl ServiceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the conversation
    pub fn with_initial_messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.initial_messages = messages.into_iter().collect();
        self
    }
}

/// How a completion cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The stream was exhausted
    Completed,
    /// The cycle was stopped or superseded before the stream ended
    Cancelled,
}

/// Messages produced by one completion cycle
#[derive(Debug, Clone)]
pub struct Completion {
    /// New messages in stream order, without the baseline
    pub messages: Vec<Arc<Message>>,
    pub outcome: CycleOutcome,
}

impl Completion {
    fn cancelled(messages: Vec<Arc<Message>>) -> Self {
        Self {
            messages,
            outcome: CycleOutcome::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome == CycleOutcome::Cancelled
    }
}

/// A completion cycle running on its own task.
///
/// Dropping it detaches the task; use [`ChatService::stop`] to cancel.
pub struct CompletionTask {
    handle: JoinHandle<Result<Completion>>,
}

impl CompletionTask {
    /// Wait for the cycle to finish
    pub async fn join(self) -> Result<Completion> {
        self.handle
            .await
            .map_err(|e| Error::Join(e.to_string()))?
    }

    /// Whether the cycle has finished
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

struct ServiceInner {
    store: Arc<MessageStore>,
    client: Arc<dyn RuntimeClient>,
    cycles: Arc<CycleSlot>,
    /// Held by the cycle that is allowed to stream.
    cycle_lock: tokio::sync::Mutex<()>,
}

/// Keeps one conversation in sync with the conversational service.
///
/// Cloning is cheap; clones share the same conversation.
#[derive(Clone)]
pub struct ChatService {
    inner: Arc<ServiceInner>,
}

impl ChatService {
    /// Create a service talking to `client`
    pub fn new(client: Arc<dyn RuntimeClient>, options: ServiceOptions) -> Self {
        let store = Arc::new(MessageStore::new(options.initial_messages));
        Self {
            inner: Arc::new(ServiceInner {
                cycles: CycleSlot::new(store.clone()),
                store,
                client,
                cycle_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// The underlying store
    pub fn store(&self) -> &MessageStore {
        &self.inner.store
    }

    /// The latest published conversation snapshot
    pub fn messages(&self) -> Snapshot {
        self.inner.store.current_messages()
    }

    /// Whether a completion is in flight
    pub fn is_loading(&self) -> bool {
        self.inner.store.is_busy()
    }

    /// Receive every store change from now on
    pub fn subscribe(&self) -> Subscription {
        self.inner.store.subscribe()
    }

    /// Wait until no completion is in flight
    pub async fn wait_for_idle(&self) {
        self.inner.store.wait_for_idle().await;
    }

    /// Whether a cycle currently holds a cancellation token
    pub fn has_active_cycle(&self) -> bool {
        self.inner.cycles.is_active()
    }

    /// Append a message and, if `follow_up` is set, start a completion.
    ///
    /// The previous cycle is cancelled and the store marked busy before this
    /// returns; the new cycle runs on a spawned task. Must be called within a tokio runtime when
    /// `follow_up` is set.
    pub fn append(&self, message: Message, follow_up: bool) -> Option<CompletionTask> {
        self.inner.store.append(message);
        if !follow_up {
            return None;
        }

        let ticket = self.inner.cycles.begin();
        let service = self.clone();
        let handle = tokio::spawn(async move {
            let result = service.drive(ticket).await;
            if let Err(ref e) = result {
                tracing::warn!("Completion failed: {}", e);
            }
            result
        });
        Some(CompletionTask { handle })
    }

    /// Cancel the in-flight completion, if any.
    pub fn stop(&self) {
        self.inner.cycles.stop();
    }

    /// Run a completion for the current conversation, superseding any cycle
    /// still in flight. Returns the messages this cycle produced.
    pub async fn run_completion(&self) -> Result<Completion> {
        let ticket = self.inner.cycles.begin();
        self.drive(ticket).await
    }

    async fn drive(&self, ticket: CycleTicket) -> Result<Completion> {
        let cancel = ticket.token().clone();
        let id = ticket.id();

        // Let the superseded cycle wind down first.
        let _serial = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Cycle {} cancelled before it started", id);
                return Ok(Completion::cancelled(Vec::new()));
            }
            guard = self.inner.cycle_lock.lock() => guard,
        };
        if cancel.is_cancelled() {
            return Ok(Completion::cancelled(Vec::new()));
        }

        let store = &self.inner.store;
        let prev = store.current_messages();
        tracing::debug!("Cycle {} requesting with {} message(s)", id, prev.len());

        let request = RuntimeRequest::new(to_wire_messages(&prev));
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Completion::cancelled(Vec::new())),
            opened = self.inner.client.open(request, cancel.clone()) => opened,
        };
        let mut increments = match opened {
            Ok(increments) => increments,
            Err(_) if cancel.is_cancelled() => return Ok(Completion::cancelled(Vec::new())),
            Err(e) => {
                tracing::warn!("Cycle {} failed to open stream: {}", id, e);
                return Err(e.into());
            }
        };

        let mut reconciler = StreamReconciler::new(prev.clone());
        // What this cycle would have published had nobody else appended.
        let mut merged = prev;
        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break CycleOutcome::Cancelled,
                next = increments.next() => next,
            };
            match next {
                None => break CycleOutcome::Completed,
                Some(Ok(increment)) => {
                    if let Some(merge) = reconciler.fold(increment) {
                        store.publish_merge(&merged, merge.snapshot.clone(), &merge.chunk);
                        merged = merge.snapshot;
                    }
                }
                Some(Err(_)) if cancel.is_cancelled() => break CycleOutcome::Cancelled,
                Some(Err(e)) => {
                    tracing::warn!("Cycle {} stream failed: {}", id, e);
                    return Err(e.into());
                }
            }
        };

        let messages = reconciler.into_messages();
        tracing::debug!(
            "Cycle {} {:?} with {} new message(s)",
            id,
            outcome,
            messages.len()
        );
        Ok(Completion { messages, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StoreEvent;
    use async_trait::async_trait;
    use cosync_runtime::{
        IncrementStream, ResponseIncrement, Role, ScriptStep, ScriptedClient, ScriptedResponse,
        WireFragment,
    };
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;
    use tokio_util::sync::CancellationToken;

    type IncrementSender = mpsc::UnboundedSender<cosync_runtime::Result<ResponseIncrement>>;

    /// A client whose streams are fed by the test through channels.
    struct ChannelClient {
        opens: Mutex<VecDeque<std::result::Result<IncrementStream, String>>>,
        requests: Mutex<Vec<RuntimeRequest>>,
    }

    impl ChannelClient {
        fn new() -> Self {
            Self {
                opens: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Queue a stream for the next `open` and return its feeding end.
        fn push_stream(&self) -> IncrementSender {
            let (tx, rx) = mpsc::unbounded_channel();
            let stream: IncrementStream = Box::pin(UnboundedReceiverStream::new(rx));
            self.opens.lock().push_back(Ok(stream));
            tx
        }

        fn requests(&self) -> Vec<RuntimeRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl RuntimeClient for ChannelClient {
        async fn open(
            &self,
            request: RuntimeRequest,
            _cancel: CancellationToken,
        ) -> cosync_runtime::Result<IncrementStream> {
            self.requests.lock().push(request);
            match self.opens.lock().pop_front() {
                Some(Ok(stream)) => Ok(stream),
                Some(Err(message)) => Err(cosync_runtime::Error::Transport(message)),
                None => Err(cosync_runtime::Error::Script("no stream queued".into())),
            }
        }
    }

    fn text(content: &str) -> ResponseIncrement {
        ResponseIncrement::with_fragments(vec![WireFragment::text(Role::Assistant, content)])
    }

    fn texts(messages: &[Arc<Message>]) -> Vec<String> {
        messages.iter().map(|m| m.text_content().to_string()).collect()
    }

    fn scripted(responses: Vec<ScriptedResponse>) -> (ChatService, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient::from_responses(responses));
        let service = ChatService::new(client.clone(), ServiceOptions::default());
        (service, client)
    }

    fn channeled() -> (ChatService, Arc<ChannelClient>) {
        let client = Arc::new(ChannelClient::new());
        let service = ChatService::new(client.clone(), ServiceOptions::default());
        (service, client)
    }

    /// Wait until a snapshot with `len` messages is published.
    async fn wait_for_len(sub: &mut Subscription, len: usize) {
        while let Some(event) = sub.recv().await {
            if event.messages().is_some_and(|m| m.len() == len) {
                return;
            }
        }
        panic!("store closed before reaching {} messages", len);
    }

    #[tokio::test]
    async fn test_append_streams_increments_into_store() {
        let (service, client) =
            scripted(vec![ScriptedResponse::increments([text("A1"), text("A2")])]);

        let task = service.append(Message::user("M1"), true).unwrap();
        let completion = task.join().await.unwrap();

        assert_eq!(completion.outcome, CycleOutcome::Completed);
        assert_eq!(texts(&completion.messages), vec!["A1", "A2"]);
        assert_eq!(texts(&service.messages()), vec!["M1", "A1", "A2"]);
        assert!(!service.is_loading());
        assert!(!service.has_active_cycle());

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_keeps_partial_merge() {
        let (service, client) = channeled();
        let tx = client.push_stream();
        service.append(Message::user("M1"), false);
        let mut sub = service.subscribe();

        let running = {
            let service = service.clone();
            tokio::spawn(async move { service.run_completion().await })
        };
        tx.send(Ok(text("A1"))).unwrap();
        wait_for_len(&mut sub, 2).await;

        service.stop();
        let completion = running.await.unwrap().unwrap();

        assert!(completion.is_cancelled());
        assert_eq!(texts(&completion.messages), vec!["A1"]);
        assert_eq!(texts(&service.messages()), vec!["M1", "A1"]);
        assert!(!service.is_loading());
        assert!(!service.has_active_cycle());

        // Anything the transport still delivers is ignored.
        let _ = tx.send(Ok(text("late")));
        tokio::task::yield_now().await;
        assert_eq!(service.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_second_append_supersedes_first() {
        let (service, client) = channeled();
        let tx = client.push_stream();

        let first = service.append(Message::user("M1"), true).unwrap();
        let second = service.append(Message::user("M2"), true).unwrap();

        let first = first.join().await.unwrap();
        assert!(first.is_cancelled());
        assert!(first.messages.is_empty());

        tx.send(Ok(text("A1"))).unwrap();
        drop(tx);
        let second = second.join().await.unwrap();
        assert_eq!(second.outcome, CycleOutcome::Completed);
        assert_eq!(texts(&second.messages), vec!["A1"]);

        let requests = client.requests();
        assert_eq!(requests.len(), 1, "the superseded cycle never opens a stream");
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(texts(&service.messages()), vec!["M1", "M2", "A1"]);
        assert!(!service.is_loading());
    }

    #[tokio::test]
    async fn test_newest_of_many_cycles_wins() {
        let (service, client) = channeled();
        let tx = client.push_stream();

        let tasks: Vec<_> = ["M1", "M2", "M3"]
            .into_iter()
            .map(|m| service.append(Message::user(m), true).unwrap())
            .collect();
        tx.send(Ok(text("A"))).unwrap();
        drop(tx);

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.join().await.unwrap().outcome);
        }
        assert_eq!(
            outcomes,
            vec![
                CycleOutcome::Cancelled,
                CycleOutcome::Cancelled,
                CycleOutcome::Completed
            ]
        );
        assert_eq!(client.requests().len(), 1);
        assert_eq!(texts(&service.messages()), vec!["M1", "M2", "M3", "A"]);
    }

    #[tokio::test]
    async fn test_new_cycle_cancels_streaming_cycle() {
        let (service, client) = channeled();
        let first_tx = client.push_stream();
        let second_tx = client.push_stream();
        service.append(Message::user("M1"), false);
        let mut sub = service.subscribe();

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.run_completion().await })
        };
        first_tx.send(Ok(text("A1"))).unwrap();
        wait_for_len(&mut sub, 2).await;

        let second = service.append(Message::user("M2"), true).unwrap();
        let first = first.await.unwrap().unwrap();
        assert!(first.is_cancelled());
        assert_eq!(texts(&first.messages), vec!["A1"]);

        second_tx.send(Ok(text("B1"))).unwrap();
        drop(second_tx);
        let second = second.join().await.unwrap();
        assert_eq!(texts(&second.messages), vec!["B1"]);

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 3);
        assert_eq!(texts(&service.messages()), vec!["M1", "A1", "M2", "B1"]);

        // Busy stays set across the handover and clears once, at the end.
        let busy: Vec<bool> = sub.drain().iter().filter_map(StoreEvent::busy).collect();
        assert_eq!(busy, vec![false]);
    }

    #[tokio::test]
    async fn test_open_failure_leaves_store_unchanged() {
        let (service, _client) = scripted(vec![ScriptedResponse::failing_open("unavailable")]);
        service.append(Message::user("M1"), false);
        let before = service.messages();
        let mut sub = service.subscribe();

        let err = service.run_completion().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Runtime(cosync_runtime::Error::Transport(ref m)) if m == "unavailable"
        ));

        assert!(Arc::ptr_eq(&before, &service.messages()));
        assert!(!service.is_loading());
        assert!(!service.has_active_cycle());

        let events = sub.drain();
        assert!(events.iter().all(|e| e.messages().is_none()));
        let busy: Vec<bool> = events.iter().filter_map(StoreEvent::busy).collect();
        assert_eq!(busy, vec![true, false]);
    }

    #[tokio::test]
    async fn test_stream_error_keeps_published_messages() {
        let (service, _client) = scripted(vec![ScriptedResponse {
            open_error: None,
            steps: vec![
                ScriptStep::Increment(text("A1")),
                ScriptStep::Error("connection reset".into()),
            ],
        }]);
        service.append(Message::user("M1"), false);

        let err = service.run_completion().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(texts(&service.messages()), vec!["M1", "A1"]);
        assert!(!service.is_loading());
        assert!(!service.has_active_cycle());
    }

    #[tokio::test]
    async fn test_published_snapshots_follow_increment_order() {
        let (service, _client) = scripted(vec![ScriptedResponse::increments([
            text("A1"),
            ResponseIncrement::keepalive(),
            text("A2"),
            text("A3"),
        ])]);
        service.append(Message::user("M1"), false);
        let mut sub = service.subscribe();

        service.run_completion().await.unwrap();

        let snapshots: Vec<Vec<String>> = sub
            .drain()
            .iter()
            .filter_map(|e| e.messages().map(|m| texts(m)))
            .collect();
        assert_eq!(
            snapshots,
            vec![
                vec!["M1", "A1"],
                vec!["M1", "A1", "A2"],
                vec!["M1", "A1", "A2", "A3"],
            ]
        );
    }

    #[tokio::test]
    async fn test_append_during_stream_is_not_lost() {
        let (service, client) = channeled();
        let tx = client.push_stream();
        service.append(Message::user("M1"), false);
        let mut sub = service.subscribe();

        let running = {
            let service = service.clone();
            tokio::spawn(async move { service.run_completion().await })
        };
        tx.send(Ok(text("A1"))).unwrap();
        wait_for_len(&mut sub, 2).await;

        service.append(Message::user("aside"), false);
        tx.send(Ok(text("A2"))).unwrap();
        tx.send(Ok(text("A3"))).unwrap();
        drop(tx);

        let completion = running.await.unwrap().unwrap();
        assert_eq!(texts(&completion.messages), vec!["A1", "A2", "A3"]);
        assert_eq!(
            texts(&service.messages()),
            vec!["M1", "A1", "aside", "A2", "A3"]
        );
    }

    #[tokio::test]
    async fn test_stop_without_cycle_is_noop() {
        let (service, _client) = scripted(vec![]);
        service.stop();
        service.stop();
        assert!(!service.is_loading());
        assert!(!service.has_active_cycle());
    }

    #[tokio::test]
    async fn test_append_without_follow_up_does_not_request() {
        let (service, client) = scripted(vec![]);
        assert!(service.append(Message::user("quiet"), false).is_none());
        assert!(client.requests().is_empty());
        assert_eq!(service.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_initial_messages_form_baseline() {
        let client = Arc::new(ScriptedClient::from_responses(vec![
            ScriptedResponse::increments([text("hello")]),
        ]));
        let options = ServiceOptions::new().with_initial_messages([Message::system("be brief")]);
        let service = ChatService::new(client.clone(), options);

        service
            .append(Message::user("hi"), true)
            .unwrap()
            .join()
            .await
            .unwrap();

        assert_eq!(client.requests()[0].messages.len(), 2);
        assert_eq!(texts(&service.messages()), vec!["be brief", "hi", "hello"]);
    }

    #[tokio::test]
    async fn test_dropped_cycle_cleans_up() {
        let (service, client) = channeled();
        let _tx = client.push_stream();
        service.append(Message::user("M1"), false);
        let mut sub = service.subscribe();

        let running = {
            let service = service.clone();
            tokio::spawn(async move { service.run_completion().await })
        };
        while let Some(event) = sub.recv().await {
            if event.busy() == Some(true) {
                break;
            }
        }

        running.abort();
        assert!(running.await.unwrap_err().is_cancelled());
        assert!(!service.is_loading());
        assert!(!service.has_active_cycle());
    }

    #[tokio::test]
    async fn test_wait_for_idle_after_spawned_cycle() {
        let (service, _client) = scripted(vec![ScriptedResponse {
            open_error: None,
            steps: vec![
                ScriptStep::DelayMs(50),
                ScriptStep::Increment(text("A1")),
            ],
        }]);

        let task = service.append(Message::user("M1"), true).unwrap();
        assert!(service.is_loading());

        service.wait_for_idle().await;
        assert!(!service.is_loading());
        assert_eq!(service.messages().len(), 2);

        task.join().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_supersession_on_multi_thread_runtime() {
        let client = Arc::new(ScriptedClient::new(cosync_runtime::Script {
            responses: vec![ScriptedResponse {
                open_error: None,
                steps: vec![
                    ScriptStep::DelayMs(50),
                    ScriptStep::Increment(text("A")),
                ],
            }],
            repeat_last: true,
        }));
        let service = ChatService::new(client, ServiceOptions::default());

        let tasks: Vec<_> = (0..8)
            .map(|i| service.append(Message::user(format!("M{}", i)), true).unwrap())
            .collect();

        let mut completed = 0;
        for task in tasks {
            if !task.join().await.unwrap().is_cancelled() {
                completed += 1;
            }
        }

        assert_eq!(completed, 1, "only the newest cycle may complete");
        assert!(!service.is_loading());
        assert!(!service.has_active_cycle());
        let last = service.messages();
        assert_eq!(last.last().unwrap().text_content(), "A");
    }
}
