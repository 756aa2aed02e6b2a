//! # Duplex Audio Relay
//!
//! The heart of the service: one `AudioBridge` per call leg, sitting between
//! the telephony WebSocket and the conversational-audio engine.
//!
//! ## Data Flow:
//! - inbound: transport event → dispatch → input callback (into the engine)
//! - outbound: engine `output()` → queue → transmitter task → transport
//! - barge-in: `interrupt()` drains the queue and sends a clear frame,
//!   short-circuiting the outbound leg
//!
//! ## Concurrency:
//! Three execution contexts touch a bridge: the WebSocket actor (inbound
//! dispatch), the spawned transmitter task, and whatever context the engine
//! calls `output`/`interrupt` from. They share only the output queue, the
//! stop flag, and the session's stream SID; each of those is safe on its own,
//! so no outer lock is held across any of the relay operations.
//!
//! The transmitter deliberately polls with a short timed wait instead of
//! parking indefinitely: the stop flag is checked once per iteration, which
//! bounds shutdown latency at one poll interval plus one in-flight send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::events::{OutboundMessage, TwilioEvent};
use crate::bridge::queue::OutputQueue;
use crate::bridge::session::{CallSession, LifecycleState};
use crate::bridge::transport::MediaTransport;
use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// Sink for decoded caller audio, registered once per `start()`.
pub type InputCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// State owned by the lifecycle: callback registration, the cooperative stop
/// flag, and the transmitter join handle. Grouped under one mutex so
/// start/stop transitions are atomic.
#[derive(Default)]
struct BridgeRuntime {
    input_callback: Option<InputCallback>,
    stop: Option<Arc<AtomicBool>>,
    transmitter: Option<JoinHandle<()>>,
}

/// Bidirectional audio relay for one call leg.
pub struct AudioBridge {
    transport: Arc<dyn MediaTransport>,
    queue: Arc<OutputQueue>,
    session: Arc<CallSession>,
    config: BridgeConfig,
    runtime: Mutex<BridgeRuntime>,
}

impl AudioBridge {
    pub fn new(
        transport: Arc<dyn MediaTransport>,
        session: Arc<CallSession>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            transport,
            queue: Arc::new(OutputQueue::new(config.max_queue_chunks)),
            session,
            config,
            runtime: Mutex::new(BridgeRuntime::default()),
        }
    }

    /// Register the engine's audio sink and spawn the transmitter.
    ///
    /// A fresh stop flag is created per start, so a re-start never observes
    /// the previous session's shutdown. Calling `start` while already running
    /// is refused; the existing transmitter and callback stay in place.
    pub fn start(&self, input_callback: InputCallback) {
        let mut runtime = self.runtime.lock().unwrap();

        if runtime.transmitter.is_some() {
            warn!(
                connection_id = %self.session.connection_id,
                "bridge already running, ignoring start"
            );
            return;
        }

        runtime.input_callback = Some(input_callback);

        let stop = Arc::new(AtomicBool::new(false));
        runtime.stop = Some(stop.clone());
        runtime.transmitter = Some(tokio::spawn(transmit_loop(
            self.queue.clone(),
            self.transport.clone(),
            self.session.clone(),
            stop,
            self.config.poll_interval(),
        )));

        self.session.set_state(LifecycleState::Running);
        info!(connection_id = %self.session.connection_id, "audio bridge started");
    }

    /// Stop the relay: signal the transmitter, join it with a bounded wait,
    /// and clear the session binding.
    ///
    /// Idempotent — stopping an idle bridge is a no-op. The join is
    /// best-effort: if the transmitter fails to exit within the configured
    /// timeout this returns anyway rather than wedging the caller.
    pub async fn stop(&self) {
        let (stop, transmitter) = {
            let mut runtime = self.runtime.lock().unwrap();
            (runtime.stop.take(), runtime.transmitter.take())
        };

        if let Some(stop) = stop {
            stop.store(true, Ordering::SeqCst);
        }

        if let Some(handle) = transmitter {
            match tokio::time::timeout(self.config.join_timeout(), handle).await {
                Ok(Ok(())) => debug!("transmitter joined"),
                Ok(Err(e)) => warn!(error = %e, "transmitter task failed"),
                Err(_) => warn!(
                    timeout_secs = self.config.join_timeout_secs,
                    "transmitter did not exit in time, abandoning join"
                ),
            }
        }

        self.session.clear_stream();
        self.session.set_state(LifecycleState::Idle);
        info!(connection_id = %self.session.connection_id, "audio bridge stopped");
    }

    /// Queue one chunk of synthesized audio for transmission.
    ///
    /// Never blocks: the engine's production pace is decoupled from the
    /// transmitter here. The chunk must already be in the wire codec.
    pub fn output(&self, audio: Vec<u8>) {
        self.queue.enqueue(audio);
    }

    /// Barge-in: discard all pending outbound audio and tell the far end to
    /// flush whatever it has buffered.
    ///
    /// The drain always completes first; a failure sending the clear frame is
    /// logged and does not undo it. With no stream bound yet, the clear frame
    /// goes out with a null SID (preserved wire behavior).
    pub fn interrupt(&self) {
        let discarded = self.queue.drain();
        self.session.record_interrupt(discarded);

        let message = OutboundMessage::clear(self.session.stream_sid());
        if let Err(e) = self.transport.send_message(message) {
            warn!(error = %e, "failed to send clear frame");
        }

        info!(
            connection_id = %self.session.connection_id,
            discarded, "interrupt served"
        );
    }

    /// Parse and dispatch one raw text frame from the transport.
    ///
    /// A frame that fails to parse is dropped; one malformed event must not
    /// end the session.
    pub fn handle_message(&self, raw: &str) {
        match serde_json::from_str::<TwilioEvent>(raw) {
            Ok(event) => self.handle_event(event),
            Err(e) => {
                let err = BridgeError::Malformed(format!("undecodable frame: {}", e));
                warn!(error = %err, "dropping inbound frame");
            }
        }
    }

    /// Dispatch one decoded transport event.
    pub fn handle_event(&self, event: TwilioEvent) {
        match event {
            TwilioEvent::Start { start } => {
                info!(
                    connection_id = %self.session.connection_id,
                    stream_sid = %start.stream_sid,
                    call_sid = start.call_sid.as_deref().unwrap_or("-"),
                    "call stream started"
                );
                self.session.bind_stream(start.stream_sid);
            }
            TwilioEvent::Media { media } => match media.decode() {
                Ok(audio) => self.deliver_inbound(audio),
                Err(e) => warn!(error = %e, "dropping inbound media frame"),
            },
            TwilioEvent::Connected => debug!("media stream connected"),
            // The far end announces stream teardown before closing the
            // socket; the closure itself drives the stop path.
            TwilioEvent::Stop => info!(
                connection_id = %self.session.connection_id,
                "far end announced stream stop"
            ),
            TwilioEvent::Mark => debug!("mark event ignored"),
            TwilioEvent::Unknown => debug!("unrecognized event type ignored"),
        }
    }

    /// The transport leg is gone: a normal end of call, not an error.
    pub async fn handle_transport_closed(&self) {
        info!(
            connection_id = %self.session.connection_id,
            "transport closed, stopping bridge"
        );
        self.stop().await;
    }

    pub fn session(&self) -> &Arc<CallSession> {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.runtime.lock().unwrap().transmitter.is_some()
    }

    /// Forward decoded caller audio to the registered callback. Audio that
    /// arrives before `start()` registered a sink is dropped, not buffered.
    fn deliver_inbound(&self, audio: Vec<u8>) {
        let callback = self.runtime.lock().unwrap().input_callback.clone();
        match callback {
            Some(callback) => {
                self.session.record_inbound(audio.len());
                callback(&audio);
            }
            None => debug!("inbound audio before start, dropping"),
        }
    }
}

/// The transmitter: drains the output queue and writes media frames until the
/// stop flag is observed.
///
/// The timed dequeue means the flag is re-checked at least once per poll
/// interval even with no audio flowing. A failed send is logged and the loop
/// keeps going — losing one frame is preferable to killing the whole
/// outbound pipeline.
async fn transmit_loop(
    queue: Arc<OutputQueue>,
    transport: Arc<dyn MediaTransport>,
    session: Arc<CallSession>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    while !stop.load(Ordering::SeqCst) {
        if let Some(chunk) = queue.dequeue_timeout(poll_interval).await {
            let message = OutboundMessage::media(session.stream_sid(), &chunk);
            match transport.send_message(message) {
                Ok(()) => session.record_outbound(),
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "failed to send media frame")
                }
                Err(e) => {
                    // A closed transport will not come back; the stop flag is
                    // on its way, no point draining into the void until then.
                    warn!(error = %e, "transport gone, transmitter exiting");
                    break;
                }
            }
        }
    }
    debug!("transmitter loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::transport::testing::RecordingTransport;
    use std::sync::Mutex as StdMutex;
    use std::time::Instant;

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            poll_interval_ms: 20,
            join_timeout_secs: 1,
            max_queue_chunks: 0,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
        }
    }

    fn make_bridge() -> (Arc<AudioBridge>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let session = Arc::new(CallSession::new("test-conn".to_string()));
        let bridge = Arc::new(AudioBridge::new(
            transport.clone(),
            session,
            test_config(),
        ));
        (bridge, transport)
    }

    fn noop_callback() -> InputCallback {
        Arc::new(|_audio: &[u8]| {})
    }

    fn capturing_callback() -> (InputCallback, Arc<StdMutex<Vec<Vec<u8>>>>) {
        let captured = Arc::new(StdMutex::new(Vec::new()));
        let sink = captured.clone();
        let callback: InputCallback = Arc::new(move |audio: &[u8]| {
            sink.lock().unwrap().push(audio.to_vec());
        });
        (callback, captured)
    }

    async fn wait_for_sent(transport: &RecordingTransport, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while transport.sent_count() < count {
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {} sent frames",
                count
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_media_frames_transmit_in_fifo_order() {
        let (bridge, transport) = make_bridge();
        bridge.start(noop_callback());
        bridge.handle_message(r#"{"event":"start","start":{"streamSid":"abc"}}"#);

        bridge.output(vec![0x01]);
        bridge.output(vec![0x02]);
        bridge.output(vec![0x03]);

        wait_for_sent(&transport, 3).await;
        bridge.stop().await;

        let expected: Vec<OutboundMessage> = [[0x01u8], [0x02], [0x03]]
            .iter()
            .map(|chunk| OutboundMessage::media(Some("abc".to_string()), chunk))
            .collect();
        assert_eq!(transport.sent(), expected);
    }

    #[tokio::test]
    async fn test_media_frame_matches_wire_shape() {
        let (bridge, transport) = make_bridge();
        bridge.start(noop_callback());
        bridge.handle_message(r#"{"event":"start","start":{"streamSid":"abc"}}"#);

        bridge.output(vec![0x01, 0x02]);
        wait_for_sent(&transport, 1).await;
        bridge.stop().await;

        let json = serde_json::to_string(&transport.sent()[0]).unwrap();
        assert_eq!(
            json,
            r#"{"event":"media","streamSid":"abc","media":{"payload":"AQI="}}"#
        );
    }

    #[tokio::test]
    async fn test_interrupt_discards_pending_audio() {
        let (bridge, transport) = make_bridge();
        bridge.handle_message(r#"{"event":"start","start":{"streamSid":"abc"}}"#);

        // Queue a chunk while no transmitter is draining, then barge in.
        bridge.output(vec![0x01, 0x02]);
        bridge.interrupt();

        assert_eq!(
            transport.sent(),
            vec![OutboundMessage::clear(Some("abc".to_string()))]
        );

        // A transmitter started afterwards finds nothing to send.
        bridge.start(noop_callback());
        tokio::time::sleep(Duration::from_millis(100)).await;
        bridge.stop().await;

        assert_eq!(transport.sent_count(), 1);
        assert_eq!(bridge.session().stats().interrupts, 1);
        assert_eq!(bridge.session().stats().chunks_discarded, 1);
    }

    #[tokio::test]
    async fn test_clear_without_session_carries_null_sid() {
        let (bridge, transport) = make_bridge();
        bridge.interrupt();

        assert_eq!(transport.sent(), vec![OutboundMessage::clear(None)]);
        let json = serde_json::to_string(&transport.sent()[0]).unwrap();
        assert_eq!(json, r#"{"event":"clear","streamSid":null}"#);
    }

    #[tokio::test]
    async fn test_inbound_media_reaches_callback() {
        let (bridge, _transport) = make_bridge();
        let (callback, captured) = capturing_callback();
        bridge.start(callback);

        bridge.handle_message(r#"{"event":"media","media":{"payload":"AQI="}}"#);

        assert_eq!(captured.lock().unwrap().as_slice(), &[vec![0x01, 0x02]]);
        assert_eq!(bridge.session().stats().frames_in, 1);
        assert_eq!(bridge.session().stats().bytes_in, 2);
        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_media_before_start_is_dropped() {
        let (bridge, _transport) = make_bridge();

        // No callback registered yet: the frame is dropped, nothing crashes.
        bridge.handle_message(r#"{"event":"media","media":{"payload":"AQI="}}"#);

        let (callback, captured) = capturing_callback();
        bridge.start(callback);
        assert!(captured.lock().unwrap().is_empty());
        assert_eq!(bridge.session().stats().frames_in, 0);
        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_frames_do_not_end_dispatch() {
        let (bridge, _transport) = make_bridge();
        let (callback, captured) = capturing_callback();
        bridge.start(callback);

        bridge.handle_message("this is not json");
        bridge.handle_message(r#"{"event":"media","media":{"payload":"%%%"}}"#);
        bridge.handle_message(r#"{"event":"media","media":{"payload":"AQI="}}"#);

        assert_eq!(captured.lock().unwrap().len(), 1);
        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_bounded() {
        let (bridge, _transport) = make_bridge();
        bridge.start(noop_callback());
        bridge.handle_message(r#"{"event":"start","start":{"streamSid":"abc"}}"#);
        assert!(bridge.is_running());

        let started = Instant::now();
        bridge.stop().await;
        assert!(started.elapsed() < Duration::from_secs(2));

        assert!(!bridge.is_running());
        assert_eq!(bridge.session().stream_sid(), None);
        assert_eq!(bridge.session().state(), LifecycleState::Idle);

        // Second stop on an idle bridge is a quiet no-op.
        bridge.stop().await;
        assert!(!bridge.is_running());
    }

    #[tokio::test]
    async fn test_send_failure_does_not_kill_pipeline() {
        let (bridge, transport) = make_bridge();
        bridge.start(noop_callback());
        bridge.handle_message(r#"{"event":"start","start":{"streamSid":"abc"}}"#);

        transport.set_failing(true);
        bridge.output(vec![0x01]);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The failed frame is gone for good; the loop must still be alive.
        transport.set_failing(false);
        bridge.output(vec![0x02]);
        wait_for_sent(&transport, 1).await;
        bridge.stop().await;

        assert_eq!(
            transport.sent(),
            vec![OutboundMessage::media(Some("abc".to_string()), &[0x02])]
        );
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let (bridge, transport) = make_bridge();
        bridge.start(noop_callback());
        bridge.handle_message(r#"{"event":"start","start":{"streamSid":"first"}}"#);
        bridge.stop().await;

        bridge.start(noop_callback());
        bridge.handle_message(r#"{"event":"start","start":{"streamSid":"second"}}"#);
        bridge.output(vec![0x0a]);
        wait_for_sent(&transport, 1).await;
        bridge.stop().await;

        assert_eq!(
            transport.sent(),
            vec![OutboundMessage::media(Some("second".to_string()), &[0x0a])]
        );
    }

    #[tokio::test]
    async fn test_start_while_running_keeps_existing_registration() {
        let (bridge, _transport) = make_bridge();
        let (first_callback, first_captured) = capturing_callback();
        let (second_callback, second_captured) = capturing_callback();

        bridge.start(first_callback);
        bridge.start(second_callback);

        bridge.handle_message(r#"{"event":"media","media":{"payload":"AQI="}}"#);

        assert_eq!(first_captured.lock().unwrap().len(), 1);
        assert!(second_captured.lock().unwrap().is_empty());
        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_session_binding_follows_latest_start_event() {
        let (bridge, transport) = make_bridge();
        bridge.start(noop_callback());

        bridge.handle_message(r#"{"event":"start","start":{"streamSid":"X"}}"#);
        bridge.output(vec![0x01]);
        wait_for_sent(&transport, 1).await;

        bridge.handle_message(r#"{"event":"start","start":{"streamSid":"Y"}}"#);
        bridge.output(vec![0x02]);
        wait_for_sent(&transport, 2).await;
        bridge.stop().await;

        let sids: Vec<Option<String>> = transport
            .sent()
            .into_iter()
            .map(|message| match message {
                OutboundMessage::Media { stream_sid, .. } => stream_sid,
                OutboundMessage::Clear { stream_sid } => stream_sid,
            })
            .collect();
        assert_eq!(
            sids,
            vec![Some("X".to_string()), Some("Y".to_string())]
        );
    }
}
