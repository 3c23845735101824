//! Reconnecting subscriber tests, driven by a scripted transport and a
//! recording clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use roomcast::subscriber::*;
use roomcast::{ChatError, Message, ReconnectBackoff, SseEvent};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// What the next `open` call does.
enum Attempt {
    Refuse,
    /// Open, deliver these events, then report the given end.
    Accept(Vec<SseEvent>, End),
}

enum End {
    Closed,
    Failed,
}

#[derive(Clone, Default)]
struct Live(Arc<AtomicUsize>);

struct ScriptedTransport {
    script: VecDeque<Attempt>,
    live: Live,
    opens: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    fn new(script: Vec<Attempt>) -> Self {
        Self {
            script: script.into(),
            live: Live::default(),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct ScriptedConnection {
    events: VecDeque<SseEvent>,
    end: Option<End>,
    live: Live,
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.live.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl EventTransport for ScriptedTransport {
    type Connection = ScriptedConnection;

    async fn open(&mut self, endpoint: &str) -> Result<ScriptedConnection, ChatError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        assert_eq!(
            self.live.0.load(Ordering::SeqCst),
            0,
            "a connection was opened while another was live"
        );
        match self.script.pop_front().unwrap_or(Attempt::Refuse) {
            Attempt::Refuse => Err(ChatError::Connect {
                url: endpoint.to_string(),
                detail: "refused".into(),
            }),
            Attempt::Accept(events, end) => {
                self.live.0.fetch_add(1, Ordering::SeqCst);
                Ok(ScriptedConnection {
                    events: events.into(),
                    end: Some(end),
                    live: self.live.clone(),
                })
            }
        }
    }
}

impl EventConnection for ScriptedConnection {
    async fn next_event(&mut self) -> Result<Option<SseEvent>, ChatError> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }
        match self.end.take() {
            Some(End::Failed) => Err(ChatError::Stream("reset by peer".into())),
            _ => Ok(None),
        }
    }
}

/// Clock that reports each requested delay and returns once the test has
/// taken it.
struct RecordingSleeper(mpsc::Sender<Duration>);

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        let _ = self.0.send(delay).await;
    }
}

fn msg_event(room: &str, username: &str, message: &str) -> SseEvent {
    SseEvent {
        event: None,
        data: serde_json::to_string(&Message::new(room, username, message)).unwrap(),
    }
}

fn raw_event(data: &str) -> SseEvent {
    SseEvent {
        event: None,
        data: data.to_string(),
    }
}

fn collecting() -> (Arc<Mutex<Vec<Message>>>, impl FnMut(Message) + Send + 'static) {
    let store = Arc::new(Mutex::new(Vec::<Message>::new()));
    let sink = Arc::clone(&store);
    (store, move |m: Message| sink.lock().unwrap().push(m))
}

async fn delays<H>(sub: &mut Subscriber<ScriptedTransport, TokioSleeper, H>, n: usize) -> Vec<u64>
where
    H: FnMut(Message) + Send + 'static,
{
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(sub.attempt().await.as_secs());
    }
    out
}

// ---------------------------------------------------------------------------
// Backoff sequencing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_four_failures_wait_1_2_4_8() {
    let mut sub = Subscriber::new("http://x/events", ScriptedTransport::new(vec![]), |_| {});
    assert_eq!(delays(&mut sub, 4).await, vec![1, 2, 4, 8]);
}

#[tokio::test]
async fn test_ten_failures_cap_at_64_from_seventh() {
    let mut sub = Subscriber::new("http://x/events", ScriptedTransport::new(vec![]), |_| {});
    let got = delays(&mut sub, 10).await;
    assert_eq!(got, vec![1, 2, 4, 8, 16, 32, 64, 64, 64, 64]);
    assert!(got.iter().all(|&d| d <= 64));
}

#[tokio::test]
async fn test_nth_failure_is_min_64_pow2() {
    let mut sub = Subscriber::new("http://x/events", ScriptedTransport::new(vec![]), |_| {});
    for n in 1..=20u32 {
        let expected = 64u64.min(1 << (n - 1));
        assert_eq!(sub.attempt().await.as_secs(), expected, "failure {n}");
    }
}

#[tokio::test]
async fn test_failure_success_failure_resets_to_one() {
    let script = vec![
        Attempt::Refuse,
        Attempt::Accept(vec![], End::Closed),
        Attempt::Refuse,
    ];
    let mut sub = Subscriber::new("http://x/events", ScriptedTransport::new(script), |_| {});
    // The open resets the backoff, so the close that follows waits 1s again.
    assert_eq!(delays(&mut sub, 3).await, vec![1, 1, 2]);
}

#[tokio::test]
async fn test_open_discards_accumulated_backoff() {
    let mut script: Vec<Attempt> = (0..8).map(|_| Attempt::Refuse).collect();
    script.push(Attempt::Accept(vec![], End::Failed));
    let mut sub = Subscriber::new("http://x/events", ScriptedTransport::new(script), |_| {});
    let got = delays(&mut sub, 9).await;
    assert_eq!(got[7], 64);
    assert_eq!(got[8], 1);
    assert_eq!(sub.current_delay_secs(), 2);
}

#[tokio::test]
async fn test_custom_backoff_is_honoured() {
    let mut sub = Subscriber::new("http://x/events", ScriptedTransport::new(vec![]), |_| {})
        .with_backoff(ReconnectBackoff::new(2, 5));
    assert_eq!(delays(&mut sub, 4).await, vec![2, 4, 5, 5]);
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_well_formed_event_dispatched_once_intact() {
    let (got, handler) = collecting();
    let script = vec![Attempt::Accept(
        vec![msg_event("lobby", "ann", "hello, world")],
        End::Closed,
    )];
    let mut sub = Subscriber::new("http://x/events", ScriptedTransport::new(script), handler);
    sub.attempt().await;
    sub.attempt().await;
    assert_eq!(
        got.lock().unwrap().as_slice(),
        &[Message::new("lobby", "ann", "hello, world")]
    );
}

#[tokio::test]
async fn test_malformed_events_dropped_without_side_effects() {
    let (got, handler) = collecting();
    let script = vec![Attempt::Accept(
        vec![
            raw_event(r#"{"username":"ann","message":"no room"}"#),
            raw_event(r#"{"room":"lobby","message":"no user"}"#),
            raw_event(r#"{"room":"lobby","username":"ann"}"#),
            raw_event("{broken"),
            msg_event("rocket", "bob", "after the junk"),
        ],
        End::Closed,
    )];
    let mut sub = Subscriber::new("http://x/events", ScriptedTransport::new(script), handler);
    let delay = sub.attempt().await;

    // Dropped events do not count as failures.
    assert_eq!(delay, Duration::from_secs(1));
    assert_eq!(
        got.lock().unwrap().as_slice(),
        &[Message::new("rocket", "bob", "after the junk")]
    );
}

#[tokio::test]
async fn test_messages_keep_flowing_across_reconnects() {
    let (got, handler) = collecting();
    let script = vec![
        Attempt::Accept(vec![msg_event("lobby", "a", "1")], End::Failed),
        Attempt::Refuse,
        Attempt::Refuse,
        Attempt::Accept(vec![msg_event("lobby", "b", "2")], End::Closed),
    ];
    let mut sub = Subscriber::new("http://x/events", ScriptedTransport::new(script), handler);
    assert_eq!(delays(&mut sub, 4).await, vec![1, 2, 4, 1]);
    let got = got.lock().unwrap();
    let texts: Vec<&str> = got.iter().map(|m| m.message.as_str()).collect();
    assert_eq!(texts, vec!["1", "2"]);
}

// ---------------------------------------------------------------------------
// Status and connection ownership
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_status_ends_disconnected_after_close() {
    let script = vec![Attempt::Accept(vec![], End::Closed)];
    let mut sub = Subscriber::new("http://x/events", ScriptedTransport::new(script), |_| {});
    let mut status = sub.status();
    sub.attempt().await;
    assert!(status.has_changed().unwrap());
    assert_eq!(*status.borrow_and_update(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_status_connected_while_events_flow() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let script = vec![Attempt::Accept(vec![msg_event("lobby", "a", "x")], End::Closed)];
    let transport = ScriptedTransport::new(script);
    let sub_status = Arc::new(Mutex::new(None::<tokio::sync::watch::Receiver<ConnectionStatus>>));
    let watcher = Arc::clone(&sub_status);
    let sink = Arc::clone(&seen);
    let mut sub = Subscriber::new("http://x/events", transport, move |_| {
        if let Some(rx) = watcher.lock().unwrap().as_ref() {
            sink.lock().unwrap().push(*rx.borrow());
        }
    });
    *sub_status.lock().unwrap() = Some(sub.status());
    sub.attempt().await;
    assert_eq!(seen.lock().unwrap().as_slice(), &[ConnectionStatus::Connected]);
}

#[tokio::test]
async fn test_connection_closed_before_next_attempt() {
    let script = vec![
        Attempt::Accept(vec![], End::Failed),
        Attempt::Accept(vec![], End::Closed),
        Attempt::Accept(vec![], End::Failed),
    ];
    let transport = ScriptedTransport::new(script);
    let live = transport.live.clone();
    let opens = Arc::clone(&transport.opens);
    let mut sub = Subscriber::new("http://x/events", transport, |_| {});
    for _ in 0..3 {
        sub.attempt().await;
        assert_eq!(live.0.load(Ordering::SeqCst), 0);
    }
    assert_eq!(opens.load(Ordering::SeqCst), 3);
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_run_loop_sleeps_each_scheduled_delay() {
    let (tx, mut rx) = mpsc::channel(1);
    let script = vec![
        Attempt::Refuse,
        Attempt::Refuse,
        Attempt::Accept(vec![], End::Closed),
        Attempt::Refuse,
    ];
    let handle = Subscriber::new("http://x/events", ScriptedTransport::new(script), |_| {})
        .with_sleeper(RecordingSleeper(tx))
        .spawn();

    let mut got = Vec::new();
    for _ in 0..5 {
        got.push(rx.recv().await.unwrap().as_secs());
    }
    handle.abort();
    assert_eq!(got, vec![1, 2, 1, 2, 4]);
}

#[tokio::test]
async fn test_aborted_subscription_stops() {
    let (tx, mut rx) = mpsc::channel(1);
    let handle = Subscriber::new("http://x/events", ScriptedTransport::new(vec![]), |_| {})
        .with_sleeper(RecordingSleeper(tx))
        .spawn();
    rx.recv().await.unwrap();
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());
}
