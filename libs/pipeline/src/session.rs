use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use bridge_api::{ALL_TOPICS, BridgeError, BrokerClient, BrokerEvent, LogRecord, SessionState};

use crate::config::SessionConfig;
use crate::error::PipelineError;
use crate::queue::RecordQueue;

/// Counters reported when a session stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub received: u64,
    pub connects: u64,
    pub dropped: u64,
}

/// Owns the broker client and drives its connect/reconnect lifecycle.
///
/// Incoming messages are stamped and pushed onto the [`RecordQueue`];
/// the session itself never touches files or the console.
pub struct BrokerSession {
    client: Box<dyn BrokerClient>,
    config: SessionConfig,
    state_tx: watch::Sender<SessionState>,
    received: u64,
    connects: u64,
    /// Consecutive failed attempts and unsettled links.
    failures: u32,
}

impl BrokerSession {
    pub fn new(client: Box<dyn BrokerClient>, config: SessionConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            client,
            config,
            state_tx,
            received: 0,
            connects: 0,
            failures: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions from another task.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        let prev = self.state_tx.send_replace(state);
        if prev != state {
            tracing::debug!(from = %prev, to = %state, "session state");
        }
    }

    /// Connect with exponential backoff, then subscribe to every topic.
    ///
    /// Returns `Ok(false)` when cancelled before a connection was made and
    /// `ConnectExhausted` once `max_attempts` consecutive failures piled up.
    /// Links that dropped before settling count toward the same ceiling.
    pub async fn connect(&mut self, token: &CancellationToken) -> Result<bool, PipelineError> {
        self.set_state(SessionState::Connecting);
        let timeout = self.config.connect_timeout;

        loop {
            let outcome = tokio::select! {
                r = tokio::time::timeout(timeout, self.attempt()) => Some(r),
                _ = token.cancelled() => None,
            };
            let Some(result) = outcome else {
                self.set_state(SessionState::Disconnected);
                return Ok(false);
            };

            let err = match result {
                Ok(Ok(())) => {
                    self.connects += 1;
                    tracing::info!(
                        broker = %self.client.endpoint(),
                        connects = self.connects,
                        "connected"
                    );
                    return Ok(true);
                }
                Ok(Err(e)) => e,
                Err(_) => BridgeError::connect(format!(
                    "no broker acknowledgment within {timeout:?}"
                )),
            };

            self.set_state(SessionState::Connecting);
            if !self.back_off(err, "connect attempt failed", token).await? {
                self.set_state(SessionState::Disconnected);
                return Ok(false);
            }
        }
    }

    /// One connect + subscribe round.
    async fn attempt(&mut self) -> Result<(), BridgeError> {
        self.client.connect().await?;
        self.set_state(SessionState::Connected);
        self.subscribe_all().await
    }

    /// Count a failure and sleep the backoff delay for it.
    ///
    /// `Ok(false)` when cancelled during the sleep.
    async fn back_off(
        &mut self,
        err: BridgeError,
        what: &'static str,
        token: &CancellationToken,
    ) -> Result<bool, PipelineError> {
        self.failures += 1;
        let endpoint = self.client.endpoint();
        let max_attempts = self.config.max_attempts;
        tracing::warn!(
            broker = %endpoint,
            attempt = self.failures,
            max_attempts,
            error = %err,
            "{what}"
        );

        if max_attempts != 0 && self.failures >= max_attempts {
            self.set_state(SessionState::Disconnected);
            return Err(PipelineError::ConnectExhausted {
                endpoint,
                attempts: self.failures,
                last: err,
            });
        }

        let delay = self.config.backoff.delay(self.failures);
        tracing::info!(delay_ms = delay.as_millis() as u64, "retrying connect");
        let slept = tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = token.cancelled() => false,
        };
        Ok(slept)
    }

    /// Subscribe to the wildcard filter on the current connection.
    pub async fn subscribe_all(&mut self) -> Result<(), BridgeError> {
        self.client.subscribe(ALL_TOPICS).await?;
        tracing::info!(filter = ALL_TOPICS, "subscribed");
        Ok(())
    }

    /// Receive until cancelled or the reconnect ceiling is hit.
    ///
    /// On return the session is `ShuttingDown` and the queue is closed,
    /// so the consumer drains what is left. The connection stays open
    /// until [`BrokerSession::disconnect`] is called.
    pub async fn run(
        &mut self,
        queue: &RecordQueue,
        token: CancellationToken,
    ) -> Result<SessionSummary, PipelineError> {
        let result = self.receive(queue, &token).await;
        self.set_state(SessionState::ShuttingDown);
        queue.close();
        result?;
        Ok(SessionSummary {
            received: self.received,
            connects: self.connects,
            dropped: queue.dropped(),
        })
    }

    async fn receive(
        &mut self,
        queue: &RecordQueue,
        token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        loop {
            if !self.connect(token).await? {
                return Ok(());
            }
            let connected_at = Instant::now();
            loop {
                let event = tokio::select! {
                    ev = self.client.next_event() => Some(ev),
                    _ = token.cancelled() => None,
                };
                match event {
                    None => return Ok(()),
                    Some(BrokerEvent::Message { topic, payload }) => {
                        // a delivering link has settled
                        self.failures = 0;
                        self.received += 1;
                        queue.push(LogRecord::now(topic, payload));
                    }
                    Some(BrokerEvent::Disconnected { reason }) => {
                        self.set_state(SessionState::Disconnected);
                        if connected_at.elapsed() >= self.config.stable_after {
                            self.failures = 0;
                        }
                        let err = BridgeError::connect(reason);
                        if !self.back_off(err, "disconnected from broker", token).await? {
                            return Ok(());
                        }
                        break;
                    }
                }
            }
        }
    }

    /// Close the broker connection, bounded by `disconnect_timeout`.
    pub async fn disconnect(&mut self) {
        let timeout = self.config.disconnect_timeout;
        match tokio::time::timeout(timeout, self.client.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "disconnect failed"),
            Err(_) => tracing::warn!(?timeout, "disconnect timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::config::BackoffPolicy;

    enum Step {
        Accept,
        Refuse,
        Hang,
    }

    #[derive(Clone, Default)]
    struct Calls {
        pub connect: Arc<AtomicU32>,
        pub subscribe: Arc<Mutex<Vec<String>>>,
        pub disconnect: Arc<AtomicU32>,
    }

    type Boxed<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

    /// Scripted broker: connect outcomes and events are consumed in order,
    /// each event `pace` after the previous one. With the event script
    /// exhausted, `next_event` waits forever.
    struct FakeBroker {
        pub steps: VecDeque<Step>,
        pub events: VecDeque<BrokerEvent>,
        pub pace: Duration,
        pub calls: Calls,
    }

    impl FakeBroker {
        fn new(steps: Vec<Step>, events: Vec<BrokerEvent>) -> Self {
            Self {
                steps: steps.into(),
                events: events.into(),
                pace: Duration::ZERO,
                calls: Calls::default(),
            }
        }
    }

    fn message(topic: &str, payload: &str) -> BrokerEvent {
        BrokerEvent::Message {
            topic: topic.into(),
            payload: payload.as_bytes().to_vec(),
        }
    }

    fn dropped_link() -> BrokerEvent {
        BrokerEvent::Disconnected { reason: "connection reset".into() }
    }

    impl BrokerClient for FakeBroker {
        fn endpoint(&self) -> String {
            "fake:1883".into()
        }

        fn connect(&mut self) -> Boxed<'_, Result<(), BridgeError>> {
            self.calls.connect.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.pop_front().unwrap_or(Step::Refuse);
            Box::pin(async move {
                match step {
                    Step::Accept => Ok(()),
                    Step::Refuse => Err(BridgeError::connect("connection refused")),
                    Step::Hang => std::future::pending().await,
                }
            })
        }

        fn subscribe(&mut self, filter: &str) -> Boxed<'_, Result<(), BridgeError>> {
            self.calls.subscribe.lock().unwrap().push(filter.to_string());
            Box::pin(async { Ok(()) })
        }

        fn next_event(&mut self) -> Boxed<'_, BrokerEvent> {
            let next = self.events.pop_front();
            let pace = self.pace;
            Box::pin(async move {
                if !pace.is_zero() {
                    tokio::time::sleep(pace).await;
                }
                match next {
                    Some(ev) => ev,
                    None => std::future::pending().await,
                }
            })
        }

        fn disconnect(&mut self) -> Boxed<'_, Result<(), BridgeError>> {
            self.calls.disconnect.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    fn config(max_attempts: u32) -> SessionConfig {
        SessionConfig {
            backoff: BackoffPolicy {
                initial: Duration::from_millis(100),
                max: Duration::from_secs(1),
            },
            max_attempts,
            connect_timeout: Duration::from_secs(2),
            disconnect_timeout: Duration::from_secs(1),
            stable_after: Duration::from_secs(5),
        }
    }

    fn payloads(queue: &RecordQueue) -> Vec<String> {
        std::iter::from_fn(|| queue.try_pop())
            .map(|r| String::from_utf8(r.payload).unwrap())
            .collect()
    }

    async fn wait_for_len(queue: &RecordQueue, len: usize) {
        while queue.len() < len {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resubscribes_once_per_successful_reconnect() {
        let broker = FakeBroker::new(
            vec![Step::Accept, Step::Refuse, Step::Accept, Step::Accept],
            vec![
                message("a/1", "one"),
                dropped_link(),
                message("a/2", "two"),
                dropped_link(),
                message("a/3", "three"),
            ],
        );
        let calls = broker.calls.clone();
        let queue = Arc::new(RecordQueue::new(16));
        let token = CancellationToken::new();

        let handle = {
            let queue = queue.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let mut session = BrokerSession::new(Box::new(broker), config(5));
                session.run(&queue, token).await
            })
        };

        wait_for_len(&queue, 3).await;
        token.cancel();
        let summary = handle.await.unwrap().unwrap();

        assert_eq!(calls.connect.load(Ordering::SeqCst), 4);
        assert_eq!(*calls.subscribe.lock().unwrap(), vec!["#", "#", "#"]);
        assert_eq!(summary.connects, 3);
        assert_eq!(summary.received, 3);
        assert!(queue.is_closed());
        assert_eq!(payloads(&queue), ["one", "two", "three"]);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_attempt_ceiling() {
        let broker = FakeBroker::new(vec![], vec![]);
        let calls = broker.calls.clone();
        let queue = RecordQueue::new(4);
        let mut session = BrokerSession::new(Box::new(broker), config(3));

        let started = tokio::time::Instant::now();
        let err = session.run(&queue, CancellationToken::new()).await.unwrap_err();

        match err {
            PipelineError::ConnectExhausted { attempts, endpoint, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(endpoint, "fake:1883");
                assert_eq!(last.kind(), bridge_api::ErrorKind::Connect);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.connect.load(Ordering::SeqCst), 3);
        assert!(calls.subscribe.lock().unwrap().is_empty());
        // 100ms + 200ms of backoff between the three attempts
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(session.state(), SessionState::ShuttingDown);
        assert!(queue.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempt_times_out_and_counts_as_failure() {
        let broker = FakeBroker::new(vec![Step::Hang, Step::Accept], vec![]);
        let calls = broker.calls.clone();
        let mut session = BrokerSession::new(Box::new(broker), config(2));
        let token = CancellationToken::new();

        let started = tokio::time::Instant::now();
        assert!(session.connect(&token).await.unwrap());

        assert_eq!(calls.connect.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(2100));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_attempts_until_cancelled() {
        let broker = FakeBroker::new(vec![], vec![]);
        let calls = broker.calls.clone();
        let queue = RecordQueue::new(4);
        let token = CancellationToken::new();
        let mut session = BrokerSession::new(Box::new(broker), config(0));

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                token.cancel();
            })
        };
        let summary = session.run(&queue, token).await.unwrap();
        canceller.await.unwrap();

        assert_eq!(summary.connects, 0);
        assert!(calls.connect.load(Ordering::SeqCst) > 10);
    }

    #[tokio::test(start_paused = true)]
    async fn flapping_link_backs_off_and_hits_ceiling() {
        let broker = FakeBroker::new(
            vec![Step::Accept, Step::Accept, Step::Accept, Step::Accept],
            vec![dropped_link(), dropped_link(), dropped_link(), dropped_link()],
        );
        let calls = broker.calls.clone();
        let queue = RecordQueue::new(4);
        let mut session = BrokerSession::new(Box::new(broker), config(3));

        let started = tokio::time::Instant::now();
        let err = session.run(&queue, CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::ConnectExhausted { attempts: 3, .. }), "{err}");
        assert_eq!(calls.connect.load(Ordering::SeqCst), 3);
        // 100ms + 200ms before the second and third connect
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(queue.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn delivered_message_resets_failure_count() {
        let broker = FakeBroker::new(
            vec![Step::Accept, Step::Accept, Step::Accept, Step::Accept],
            vec![
                dropped_link(),
                message("a/1", "one"),
                dropped_link(),
                message("a/2", "two"),
                dropped_link(),
            ],
        );
        let calls = broker.calls.clone();
        let queue = Arc::new(RecordQueue::new(8));
        let token = CancellationToken::new();

        let handle = {
            let queue = queue.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let mut session = BrokerSession::new(Box::new(broker), config(2));
                session.run(&queue, token).await
            })
        };

        while calls.connect.load(Ordering::SeqCst) < 4 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        token.cancel();
        let summary = handle.await.unwrap().unwrap();

        assert_eq!(summary.received, 2);
        assert_eq!(summary.connects, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn long_lived_link_resets_failure_count() {
        let mut broker = FakeBroker::new(
            vec![Step::Accept, Step::Accept, Step::Accept, Step::Accept],
            vec![dropped_link(), dropped_link(), dropped_link()],
        );
        // each link outlives `stable_after`
        broker.pace = Duration::from_secs(10);
        let calls = broker.calls.clone();
        let queue = Arc::new(RecordQueue::new(4));
        let token = CancellationToken::new();

        let handle = {
            let queue = queue.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let mut session = BrokerSession::new(Box::new(broker), config(2));
                session.run(&queue, token).await
            })
        };

        while calls.connect.load(Ordering::SeqCst) < 4 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        token.cancel();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.connects, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn state_follows_lifecycle() {
        let broker = FakeBroker::new(vec![Step::Accept], vec![]);
        let calls = broker.calls.clone();
        let queue = Arc::new(RecordQueue::new(4));
        let token = CancellationToken::new();
        let mut session = BrokerSession::new(Box::new(broker), config(1));
        let mut state = session.subscribe_state();
        assert_eq!(*state.borrow(), SessionState::Disconnected);

        let handle = {
            let queue = queue.clone();
            let token = token.clone();
            tokio::spawn(async move {
                session.run(&queue, token).await.unwrap();
                session.disconnect().await;
                session.state()
            })
        };

        state.wait_for(|s| *s == SessionState::Connected).await.unwrap();
        token.cancel();
        assert_eq!(handle.await.unwrap(), SessionState::ShuttingDown);
        assert_eq!(calls.disconnect.load(Ordering::SeqCst), 1);
    }
}
