use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

/// Liveness probe interval while a subscription is open.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(180);

const BACKOFF_STEP_MS: u64 = 1000;
const BACKOFF_CAP_MS: u64 = 30_000;

/// Events surfaced by a subscription transport.
#[derive(Debug)]
pub enum StreamEvent {
    /// A text payload from the feed.
    Message(String),
    /// Peer-initiated liveness probe; must be answered immediately.
    Ping(Vec<u8>),
    /// Peer closed the subscription.
    Closed,
}

/// One live subscription. Implemented over websockets in production and
/// over scripted fakes in tests.
#[async_trait]
pub trait Subscription: Send {
    /// Next event, or `None` when the stream has ended.
    async fn next_event(&mut self) -> Option<crate::Result<StreamEvent>>;
    async fn send_ping(&mut self) -> crate::Result<()>;
    async fn send_pong(&mut self, payload: Vec<u8>) -> crate::Result<()>;
    async fn close(&mut self);
}

/// Opens a fresh subscription for each (re)connect attempt.
#[async_trait]
pub trait SubscriptionFactory: Send + Sync + 'static {
    async fn connect(&self) -> crate::Result<Box<dyn Subscription>>;
}

/// Consumes parsed-but-raw feed messages.
///
/// Returning `false` reports a delivery failure (for example a candle the
/// buffer rejected as stale); the supervisor drops the subscription and
/// reconnects. Unparseable messages should be logged and answered with
/// `true` so they are dropped without tearing the stream down.
pub trait MessageHandler: Send + 'static {
    fn handle(&mut self, raw: &str) -> bool;
}

impl<F> MessageHandler for F
where
    F: FnMut(&str) -> bool + Send + 'static,
{
    fn handle(&mut self, raw: &str) -> bool {
        self(raw)
    }
}

/// Reconnecting wrapper around one logical subscription.
///
/// Runs as a single task, so resubscribe attempts can never overlap. The
/// backoff attempt counter resets every time a subscription opens.
pub struct StreamSupervisor;

impl StreamSupervisor {
    pub fn spawn<F, H>(name: &str, factory: F, handler: H) -> SupervisorHandle
    where
        F: SubscriptionFactory,
        H: MessageHandler,
    {
        Self::spawn_with_keepalive(name, factory, handler, KEEPALIVE_INTERVAL)
    }

    pub fn spawn_with_keepalive<F, H>(
        name: &str,
        factory: F,
        handler: H,
        keepalive: Duration,
    ) -> SupervisorHandle
    where
        F: SubscriptionFactory,
        H: MessageHandler,
    {
        let name = name.to_string();
        let task_name = name.clone();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            supervise(task_name, factory, handler, keepalive, shutdown_rx).await;
        });

        SupervisorHandle {
            name,
            shutdown: shutdown_tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Owner handle for a running supervisor. Dropping it (or calling
/// `close`) signals shutdown; the supervisor task sends the transport
/// close frame for any open subscription before it exits.
pub struct SupervisorHandle {
    name: String,
    shutdown: watch::Sender<bool>,
    closed: Arc<AtomicBool>,
}

impl SupervisorHandle {
    /// Idempotent shutdown.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.shutdown.send(true);
            tracing::info!(stream = %self.name, "stream supervisor closing");
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Delay before resubscribe attempt `attempt` (1-based).
fn reconnect_delay(attempt: u32) -> Duration {
    Duration::from_millis((BACKOFF_STEP_MS * u64::from(attempt)).min(BACKOFF_CAP_MS))
}

async fn supervise<F, H>(
    name: String,
    factory: F,
    mut handler: H,
    keepalive: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    F: SubscriptionFactory,
    H: MessageHandler,
{
    let mut attempt: u32 = 0;

    loop {
        let connected = tokio::select! {
            connected = factory.connect() => connected,
            _ = shutdown.changed() => return,
        };

        match connected {
            Ok(mut sub) => {
                tracing::info!(stream = %name, "subscription open");
                attempt = 0;

                let reason = tokio::select! {
                    reason = drive(&name, sub.as_mut(), &mut handler, keepalive) => Some(reason),
                    _ = shutdown.changed() => None,
                };
                sub.close().await;

                match reason {
                    Some(reason) => tracing::warn!(stream = %name, reason, "subscription lost"),
                    None => {
                        tracing::info!(stream = %name, "subscription closed on shutdown");
                        return;
                    }
                }
            }
            Err(err) => {
                tracing::warn!(stream = %name, error = %err, "subscription connect failed");
            }
        }

        attempt += 1;
        let delay = reconnect_delay(attempt);
        tracing::info!(
            stream = %name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "resubscribing after backoff"
        );
        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}

/// Pump one open subscription until it fails. Returns the reason.
async fn drive<H: MessageHandler>(
    name: &str,
    sub: &mut dyn Subscription,
    handler: &mut H,
    keepalive: Duration,
) -> &'static str {
    let mut probe = interval(keepalive);
    probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
    probe.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            event = sub.next_event() => match event {
                Some(Ok(StreamEvent::Message(raw))) => {
                    if !handler.handle(&raw) {
                        return "delivery rejected by handler";
                    }
                }
                Some(Ok(StreamEvent::Ping(payload))) => {
                    if sub.send_pong(payload).await.is_err() {
                        return "pong send failed";
                    }
                }
                Some(Ok(StreamEvent::Closed)) => return "peer closed",
                Some(Err(err)) => {
                    tracing::warn!(stream = %name, error = %err, "stream error");
                    return "stream error";
                }
                None => return "stream ended",
            },
            _ = probe.tick() => {
                if sub.send_ping().await.is_err() {
                    return "keepalive probe failed";
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    struct ScriptedSub {
        rx: mpsc::Receiver<StreamEvent>,
        pings: Arc<AtomicU32>,
        pongs: Arc<AtomicU32>,
        closes: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Subscription for ScriptedSub {
        async fn next_event(&mut self) -> Option<crate::Result<StreamEvent>> {
            self.rx.recv().await.map(Ok)
        }

        async fn send_ping(&mut self) -> crate::Result<()> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn send_pong(&mut self, _payload: Vec<u8>) -> crate::Result<()> {
            self.pongs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingFactory {
        connect_times: Arc<Mutex<Vec<Instant>>>,
    }

    #[async_trait]
    impl SubscriptionFactory for FailingFactory {
        async fn connect(&self) -> crate::Result<Box<dyn Subscription>> {
            self.connect_times.lock().unwrap().push(Instant::now());
            Err("refused".into())
        }
    }

    struct ScriptedFactory {
        events: Arc<Mutex<Vec<Vec<StreamEvent>>>>,
        connects: Arc<AtomicU32>,
        pings: Arc<AtomicU32>,
        pongs: Arc<AtomicU32>,
        closes: Arc<AtomicU32>,
    }

    impl ScriptedFactory {
        fn with_scripts(events: Vec<Vec<StreamEvent>>) -> Self {
            Self {
                events: Arc::new(Mutex::new(events)),
                connects: Arc::new(AtomicU32::new(0)),
                pings: Arc::new(AtomicU32::new(0)),
                pongs: Arc::new(AtomicU32::new(0)),
                closes: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl SubscriptionFactory for ScriptedFactory {
        async fn connect(&self) -> crate::Result<Box<dyn Subscription>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let script = {
                let mut scripts = self.events.lock().unwrap();
                if scripts.is_empty() {
                    Vec::new()
                } else {
                    scripts.remove(0)
                }
            };
            // Leave the channel open with no sender activity after the
            // script drains so the subscription idles instead of ending.
            let (tx, rx) = mpsc::channel(16);
            for event in script {
                tx.try_send(event).unwrap();
            }
            std::mem::forget(tx);
            Ok(Box::new(ScriptedSub {
                rx,
                pings: self.pings.clone(),
                pongs: self.pongs.clone(),
                closes: self.closes.clone(),
            }))
        }
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(reconnect_delay(1), Duration::from_millis(1000));
        assert_eq!(reconnect_delay(2), Duration::from_millis(2000));
        assert_eq!(reconnect_delay(3), Duration::from_millis(3000));
        assert_eq!(reconnect_delay(30), Duration::from_millis(30_000));
        assert_eq!(reconnect_delay(500), Duration::from_millis(30_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_backoff_timing() {
        let connect_times = Arc::new(Mutex::new(Vec::new()));
        let factory = FailingFactory {
            connect_times: connect_times.clone(),
        };

        let handle = StreamSupervisor::spawn("test", factory, |_: &str| true);

        // Allow four connect attempts: 0ms, +1000ms, +2000ms, +3000ms
        tokio::time::sleep(Duration::from_millis(6500)).await;
        handle.close();

        let times = connect_times.lock().unwrap();
        assert!(times.len() >= 4, "expected 4 attempts, saw {}", times.len());
        let gap1 = times[1] - times[0];
        let gap2 = times[2] - times[1];
        let gap3 = times[3] - times[2];
        assert_eq!(gap1, Duration::from_millis(1000));
        assert_eq!(gap2, Duration::from_millis(2000));
        assert_eq!(gap3, Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_rejection_triggers_reconnect() {
        let factory = ScriptedFactory::with_scripts(vec![
            vec![StreamEvent::Message("stale".to_string())],
            Vec::new(),
        ]);
        let connects = factory.connects.clone();

        let handle = StreamSupervisor::spawn("test", factory, |raw: &str| raw != "stale");

        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.close();

        // First session rejected by the handler, second connected after 1s
        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_probe_and_pong() {
        let factory = ScriptedFactory::with_scripts(vec![vec![StreamEvent::Ping(vec![1, 2, 3])]]);
        let pings = factory.pings.clone();
        let pongs = factory.pongs.clone();

        let handle =
            StreamSupervisor::spawn_with_keepalive("test", factory, |_: &str| true, KEEPALIVE_INTERVAL);

        tokio::time::sleep(KEEPALIVE_INTERVAL + Duration::from_secs(1)).await;
        handle.close();

        // Peer ping answered immediately, our probe fired after 3 minutes
        assert_eq!(pongs.load(Ordering::SeqCst), 1);
        assert!(pings.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_sends_subscription_close() {
        // Empty script: the subscription idles until shutdown
        let factory = ScriptedFactory::with_scripts(vec![Vec::new()]);
        let closes = factory.closes.clone();

        let handle = StreamSupervisor::spawn("test", factory, |_: &str| true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(closes.load(Ordering::SeqCst), 0);

        handle.close();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The open subscription got its close frame before the task exited
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let factory = FailingFactory {
            connect_times: Arc::new(Mutex::new(Vec::new())),
        };
        let handle = StreamSupervisor::spawn("test", factory, |_: &str| true);
        handle.close();
        handle.close();
    }
}
