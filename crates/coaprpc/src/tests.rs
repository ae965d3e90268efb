//! Tests for the dispatcher and handler with mock connectors.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use coapwire::Code;
use coapwire::Message;
use coapwire::Method;
use coapwire::PacketType;
use coapwire::ResponseCode;
use rand::Rng;

use crate::broker::ServiceBroker;
use crate::client::CLIENT_DISPATCHER;
use crate::client::MessageClient;
use crate::config::Config;
use crate::dispatcher::RESERVED_MESSAGE_ID;
use crate::dispatcher::RequestDispatcher;
use crate::handler::RequestHandler;
use crate::local::LocalService;
use crate::service::RestService;
use crate::service::ServiceError;
use crate::service::ServiceProvider;
use crate::service::ServiceRegistry;
use crate::translator::StaticTranslator;
use crate::transport;
use crate::transport::DispatcherRegistry;
use crate::transport::MessageDispatcher;
use crate::transport::SocketConnector;
use crate::transport::TransportError;
use crate::urn::ServiceUrn;
use crate::urn::UrnError;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn urn(s: &str) -> ServiceUrn {
    ServiceUrn::parse(s).unwrap()
}

/// Mock connector that swallows every datagram and remembers it.
#[derive(Default)]
struct RecordingConnector {
    registry: Arc<DispatcherRegistry>,
    written: Mutex<Vec<Vec<u8>>>,
}

impl RecordingConnector {
    fn written(&self) -> Vec<Message> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| Message::parse(bytes).unwrap())
            .collect()
    }

    async fn wait_for_writes(&self, n: usize) -> Vec<Message> {
        for _ in 0..500 {
            let written = self.written();
            if written.len() >= n {
                return written;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("expected {} datagrams to be written", n);
    }
}

#[async_trait::async_trait]
impl SocketConnector for RecordingConnector {
    async fn write(&self, payload: &[u8]) -> transport::Result<Arc<DispatcherRegistry>> {
        self.written.lock().unwrap().push(payload.to_vec());
        Ok(self.registry.clone())
    }

    fn dispatchers(&self) -> Arc<DispatcherRegistry> {
        self.registry.clone()
    }
}

/// Mock connector that answers each request with whatever `respond` builds,
/// after a short random delay, through its registered dispatchers.
struct ResponderConnector<F> {
    registry: Arc<DispatcherRegistry>,
    respond: F,
}

impl<F> ResponderConnector<F>
where
    F: Fn(&Message) -> Option<Message> + Send + Sync + 'static,
{
    fn new(respond: F) -> Self {
        Self { registry: Arc::new(DispatcherRegistry::new()), respond }
    }
}

#[async_trait::async_trait]
impl<F> SocketConnector for ResponderConnector<F>
where
    F: Fn(&Message) -> Option<Message> + Send + Sync + 'static,
{
    async fn write(&self, payload: &[u8]) -> transport::Result<Arc<DispatcherRegistry>> {
        let request = Message::parse(payload).map_err(|e| TransportError::Io(e.to_string()))?;

        if let Some(response) = (self.respond)(&request) {
            let bytes = response.serialize().map_err(|e| TransportError::Io(e.to_string()))?;
            let registry = self.registry.clone();
            let delay = rand::thread_rng().gen_range(0..3u64);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                for dispatcher in registry.snapshot() {
                    dispatcher.dispatch_message(&bytes).await;
                }
            });
        }

        Ok(self.registry.clone())
    }

    fn dispatchers(&self) -> Arc<DispatcherRegistry> {
        self.registry.clone()
    }
}

/// Mock connector whose link is always down.
struct BrokenConnector;

#[async_trait::async_trait]
impl SocketConnector for BrokenConnector {
    async fn write(&self, _payload: &[u8]) -> transport::Result<Arc<DispatcherRegistry>> {
        Err(TransportError::ConnectionLost("Cable unplugged".into()))
    }

    fn dispatchers(&self) -> Arc<DispatcherRegistry> {
        Arc::new(DispatcherRegistry::new())
    }
}

fn echo(request: &Message) -> Option<Message> {
    Some(
        Message::response(PacketType::Non, ResponseCode::Content, request.message_id)
            .with_payload(request.payload.clone()),
    )
}

fn long_wait() -> Config {
    Config::new().with_request_timeout(Duration::from_secs(5))
}

fn response(packet_type: PacketType, code: ResponseCode, id: u16, payload: &[u8]) -> Vec<u8> {
    Message::response(packet_type, code, id)
        .with_payload(payload.to_vec())
        .serialize()
        .unwrap()
}

// --- dispatcher ---

#[tokio::test]
async fn test_dispatch_receives_response() {
    init_tracing();
    let connector = Arc::new(ResponderConnector::new(echo));
    let dispatcher = RequestDispatcher::new("client", connector.clone(), long_wait());

    let result = dispatcher.dispatch_request(Method::Get, b"urn:dmns:par?ping".to_vec()).await;

    assert_eq!(result.unwrap(), Some(b"urn:dmns:par?ping".to_vec()));
    assert_eq!(dispatcher.pending_count(), 0);
    assert!(connector.dispatchers().contains(dispatcher.key()));
    assert!(dispatcher.key().starts_with("client#"));
}

#[tokio::test]
async fn test_empty_success_payload_is_some() {
    let connector = Arc::new(ResponderConnector::new(|req: &Message| {
        Some(Message::response(PacketType::Non, ResponseCode::Changed, req.message_id))
    }));
    let dispatcher = RequestDispatcher::new("client", connector, long_wait());

    let result = dispatcher.dispatch_request(Method::Put, b"x".to_vec()).await.unwrap();
    assert_eq!(result, Some(Vec::new()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatch_no_cross_delivery() {
    init_tracing();
    let connector = Arc::new(ResponderConnector::new(echo));
    let dispatcher = RequestDispatcher::new("client", connector, long_wait());

    let mut tasks = Vec::new();
    for i in 0..200u32 {
        let dispatcher = dispatcher.clone();
        let mut payload = i.to_be_bytes().to_vec();
        payload.extend(rand::thread_rng().r#gen::<[u8; 8]>());

        tasks.push(tokio::spawn(async move {
            let result = dispatcher.dispatch_request(Method::Post, payload.clone()).await;
            (payload, result)
        }));
    }

    for task in tasks {
        let (sent, result) = task.await.unwrap();
        assert_eq!(result.unwrap(), Some(sent));
    }
    assert_eq!(dispatcher.pending_count(), 0);
}

#[tokio::test]
async fn test_outstanding_ids_are_unique() {
    let connector = Arc::new(RecordingConnector::default());
    let dispatcher = RequestDispatcher::new("client", connector.clone(), long_wait());

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let dispatcher = dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            dispatcher.dispatch_request(Method::Get, b"urn:dmns:par".to_vec()).await
        }));
    }

    let written = connector.wait_for_writes(50).await;
    let ids: HashSet<u16> = written.iter().map(|m| m.message_id).collect();
    assert_eq!(ids.len(), 50);
    assert!(!ids.contains(&RESERVED_MESSAGE_ID));
    assert_eq!(dispatcher.pending_count(), 50);

    assert_eq!(dispatcher.cancel_pending(), 50);
    for task in tasks {
        assert!(matches!(task.await.unwrap(), Err(ServiceError::Cancelled)));
    }
}

#[tokio::test]
async fn test_timeout_yields_none_without_leak() {
    let connector = Arc::new(RecordingConnector::default());
    let config = Config::new().with_request_timeout(Duration::from_millis(10));
    let dispatcher = RequestDispatcher::new("client", connector.clone(), config);

    let result = dispatcher.dispatch_request(Method::Get, b"urn:dmns:par".to_vec()).await;

    assert_eq!(result.unwrap(), None);
    assert_eq!(dispatcher.pending_count(), 0);
    assert_eq!(connector.written().len(), 1);
}

#[tokio::test]
async fn test_id_ten_is_never_allocated() {
    let connector = Arc::new(RecordingConnector::default());
    let config = Config::new().with_request_timeout(Duration::from_millis(1));
    let dispatcher = RequestDispatcher::new("client", connector.clone(), config);

    for _ in 0..12 {
        dispatcher.dispatch_request(Method::Get, b"x".to_vec()).await.unwrap();
    }

    let ids: Vec<u16> = connector.written().iter().map(|m| m.message_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 11, 12, 13]);
}

#[tokio::test]
async fn test_requests_are_non_with_verb() {
    let connector = Arc::new(RecordingConnector::default());
    let config = Config::new().with_request_timeout(Duration::from_millis(1));
    let dispatcher = RequestDispatcher::new("client", connector.clone(), config);

    for method in [Method::Get, Method::Put, Method::Post, Method::Delete] {
        dispatcher.dispatch_request(method, b"args".to_vec()).await.unwrap();
    }

    let written = connector.written();
    let methods: Vec<_> = written.iter().map(|m| m.method().unwrap()).collect();
    assert_eq!(methods, vec![Method::Get, Method::Put, Method::Post, Method::Delete]);
    assert!(written.iter().all(|m| m.packet_type == PacketType::Non));
    assert!(written.iter().all(|m| m.payload == b"args"));
}

#[tokio::test]
async fn test_dropped_caller_removes_slot() {
    let connector = Arc::new(RecordingConnector::default());
    let dispatcher = RequestDispatcher::new("client", connector, long_wait());

    let call = dispatcher.dispatch_request(Method::Get, b"x".to_vec());
    assert!(tokio::time::timeout(Duration::from_millis(10), call).await.is_err());
    assert_eq!(dispatcher.pending_count(), 0);
}

#[tokio::test]
async fn test_write_failure_removes_slot() {
    let dispatcher = RequestDispatcher::new("client", Arc::new(BrokenConnector), long_wait());

    let result = dispatcher.dispatch_request(Method::Get, b"x".to_vec()).await;

    assert!(matches!(result, Err(ServiceError::Transport(TransportError::ConnectionLost(_)))));
    assert_eq!(dispatcher.pending_count(), 0);
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let connector = Arc::new(ResponderConnector::new(|req: &Message| {
        Some(Message::response(PacketType::Non, ResponseCode::BadOption, req.message_id))
    }));
    let dispatcher = RequestDispatcher::new("client", connector, long_wait());

    let result = dispatcher.dispatch_request(Method::Get, b"x".to_vec()).await;

    assert!(matches!(result, Err(ServiceError::Status(ResponseCode::BadOption))));
    assert_eq!(dispatcher.pending_count(), 0);
}

#[tokio::test]
async fn test_late_response_yields_not_found() {
    let connector = Arc::new(RecordingConnector::default());
    let config = Config::new().with_errors(true).with_request_timeout(Duration::from_millis(5));
    let dispatcher = RequestDispatcher::new("client", connector, config);

    assert_eq!(dispatcher.dispatch_request(Method::Get, b"x".to_vec()).await.unwrap(), None);

    let late = response(PacketType::Non, ResponseCode::Content, 1, b"too late");
    let reply = dispatcher.dispatch_message(&late).await.unwrap();
    let reply = Message::parse(&reply).unwrap();
    assert_eq!(reply.response_code(), Some(ResponseCode::NotFound));
    assert_eq!(reply.message_id, 1);
    assert_eq!(reply.packet_type, PacketType::Non);
}

#[tokio::test]
async fn test_late_response_silent_by_default() {
    let connector = Arc::new(RecordingConnector::default());
    let dispatcher = RequestDispatcher::new("client", connector, Config::new());

    let stray = response(PacketType::Non, ResponseCode::Content, 77, b"nobody asked");
    assert!(dispatcher.dispatch_message(&stray).await.is_none());
}

#[tokio::test]
async fn test_unmatched_error_status_is_not_answered() {
    let connector = Arc::new(RecordingConnector::default());
    let dispatcher = RequestDispatcher::new("client", connector, Config::new().with_errors(true));

    let stray = response(PacketType::Non, ResponseCode::NotFound, 77, b"");
    assert!(dispatcher.dispatch_message(&stray).await.is_none());
}

#[tokio::test]
async fn test_duplicate_response_delivered_once() {
    let connector = Arc::new(RecordingConnector::default());
    let dispatcher = RequestDispatcher::new("client", connector.clone(), long_wait().with_errors(true));

    let waiter = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch_request(Method::Get, b"x".to_vec()).await })
    };
    let id = connector.wait_for_writes(1).await[0].message_id;

    let first = response(PacketType::Non, ResponseCode::Content, id, b"first");
    assert!(dispatcher.dispatch_message(&first).await.is_none());
    assert_eq!(waiter.await.unwrap().unwrap(), Some(b"first".to_vec()));

    let second = response(PacketType::Non, ResponseCode::Content, id, b"second");
    let reply = Message::parse(&dispatcher.dispatch_message(&second).await.unwrap()).unwrap();
    assert_eq!(reply.response_code(), Some(ResponseCode::NotFound));
}

#[tokio::test]
async fn test_confirmable_response_is_acked() {
    let connector = Arc::new(RecordingConnector::default());
    let dispatcher = RequestDispatcher::new("client", connector.clone(), long_wait().with_acks(true));

    let waiter = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch_request(Method::Get, b"x".to_vec()).await })
    };
    let id = connector.wait_for_writes(1).await[0].message_id;

    let con = response(PacketType::Con, ResponseCode::Content, id, b"ok");
    let ack = Message::parse(&dispatcher.dispatch_message(&con).await.unwrap()).unwrap();
    assert_eq!(ack.packet_type, PacketType::Ack);
    assert_eq!(ack.code, Code::Empty);
    assert_eq!(ack.message_id, id);
    assert_eq!(waiter.await.unwrap().unwrap(), Some(b"ok".to_vec()));
}

#[tokio::test]
async fn test_dispatcher_ignores_garbage_and_requests() {
    let connector = Arc::new(RecordingConnector::default());
    let dispatcher = RequestDispatcher::new("client", connector, Config::new().with_errors(true));

    assert!(dispatcher.dispatch_message(b"gekkehenkies").await.is_none());
    assert!(dispatcher.dispatch_message(&[]).await.is_none());

    let request = Message::request(PacketType::Non, Method::Get, 3).serialize().unwrap();
    assert!(dispatcher.dispatch_message(&request).await.is_none());
}

#[tokio::test]
async fn test_registry_does_not_keep_dispatcher_alive() {
    let connector = Arc::new(ResponderConnector::new(echo));
    let dispatcher = RequestDispatcher::new("client", connector.clone(), long_wait());
    dispatcher.dispatch_request(Method::Get, b"x".to_vec()).await.unwrap();

    let weak = Arc::downgrade(&dispatcher);
    drop(dispatcher);
    assert!(weak.upgrade().is_none());
    assert!(connector.dispatchers().is_empty());
}

#[tokio::test]
async fn test_stale_listener_swallows_traffic() {
    let connector = Arc::new(ResponderConnector::new(echo));
    let dispatcher = RequestDispatcher::new("client", connector.clone(), long_wait());
    dispatcher.dispatch_request(Method::Get, b"x".to_vec()).await.unwrap();

    // a listener that outlives its dispatcher, as when one is caught mid-snapshot
    let listeners = connector.dispatchers().snapshot();
    drop(dispatcher);

    let bytes = response(PacketType::Non, ResponseCode::Content, 1, b"");
    for listener in listeners {
        assert!(listener.dispatch_message(&bytes).await.is_none());
    }
}

#[tokio::test]
async fn test_dispatchers_share_a_connector() {
    init_tracing();
    let connector = Arc::new(ResponderConnector::new(echo));
    let first = RequestDispatcher::new("client", connector.clone(), long_wait());
    let second = RequestDispatcher::new("client", connector.clone(), long_wait());
    assert_ne!(first.key(), second.key());

    let (a, b) = tokio::join!(
        first.dispatch_request(Method::Get, b"first".to_vec()),
        second.dispatch_request(Method::Get, b"second".to_vec()),
    );
    assert_eq!(a.unwrap(), Some(b"first".to_vec()));
    assert_eq!(b.unwrap(), Some(b"second".to_vec()));
    assert_eq!(connector.dispatchers().len(), 2);

    drop(first);
    assert_eq!(connector.dispatchers().len(), 1);
    assert!(connector.dispatchers().contains(second.key()));
    assert_eq!(second.dispatch_request(Method::Get, b"again".to_vec()).await.unwrap(), Some(b"again".to_vec()));
}

#[tokio::test]
async fn test_recreated_dispatcher_registers_again() {
    let connector = Arc::new(ResponderConnector::new(echo));

    let first = RequestDispatcher::new("client", connector.clone(), long_wait());
    assert_eq!(first.dispatch_request(Method::Get, b"one".to_vec()).await.unwrap(), Some(b"one".to_vec()));
    drop(first);
    assert!(connector.dispatchers().is_empty());

    let second = RequestDispatcher::new("client", connector.clone(), long_wait());
    assert_eq!(second.dispatch_request(Method::Get, b"two".to_vec()).await.unwrap(), Some(b"two".to_vec()));
    assert_eq!(connector.dispatchers().len(), 1);
}

#[tokio::test]
async fn test_unregistered_error_code_is_reported() {
    // 4.29 Too Many Requests is outside the RFC 7252 table
    let connector = Arc::new(ResponderConnector::new(|req: &Message| {
        Some(Message::response(PacketType::Non, ResponseCode::Other(0x9D), req.message_id))
    }));
    let dispatcher = RequestDispatcher::new("client", connector, long_wait());

    let result = dispatcher.dispatch_request(Method::Get, b"x".to_vec()).await;

    assert!(matches!(result, Err(ServiceError::Status(ResponseCode::Other(0x9D)))));
    assert_eq!(dispatcher.pending_count(), 0);
}

#[tokio::test]
async fn test_unregistered_error_code_is_not_answered() {
    let connector = Arc::new(RecordingConnector::default());
    let dispatcher = RequestDispatcher::new("client", connector, Config::new().with_errors(true));

    assert!(dispatcher.dispatch_message(&[0x50, 0x9D, 0x00, 0x4D]).await.is_none());
}

// --- handler ---

fn handler_with(services: &[Arc<dyn RestService>], config: &Config) -> RequestHandler {
    let broker = Arc::new(ServiceBroker::new());
    for service in services {
        broker.register_service(service.clone());
    }
    RequestHandler::new(broker, config)
}

fn translating_handler() -> RequestHandler {
    let translator = StaticTranslator::new()
        .with(0xA0, urn("urn:dmns:par"))
        .with(0xC0, urn("urn:dmns:log"));
    handler_with(&[], &Config::new()).with_translator(Arc::new(translator))
}

#[test]
fn test_address_extraction() {
    let handler = handler_with(&[], &Config::new());

    assert_eq!(handler.urn_from_payload(b"urn:dmns:par?argbytes").unwrap(), urn("urn:dmns:par"));
    assert_eq!(handler.arguments_from_payload(b"urn:dmns:par?argbytes"), Some(b"argbytes".to_vec()));
    assert_eq!(handler.urn_from_payload(b"urn:dmns:par").unwrap(), urn("urn:dmns:par"));
    assert_eq!(handler.arguments_from_payload(b"urn:dmns:par"), None);
    assert_eq!(handler.arguments_from_payload(b"urn:dmns:par?"), None);

    assert_eq!(handler.urn_from_payload(b"urn:dmsn:par?somethingcool").unwrap(), urn("urn:dmsn:par"));
    assert_eq!(handler.arguments_from_payload(b"urn:dmsn:par?somethingcool"), Some(b"somethingcool".to_vec()));
}

#[test]
fn test_malformed_addresses() {
    let handler = handler_with(&[], &Config::new());

    assert!(matches!(
        handler.urn_from_payload(b"gekkehenkies?somethingcool"),
        Err(UrnError::MissingScheme(_))
    ));
    assert_eq!(handler.arguments_from_payload(b"gekkehenkie"), None);
    assert!(handler.urn_from_payload(b"gekkehenkie").is_err());
    assert!(handler.urn_from_payload(b"").is_err());
    assert_eq!(handler.arguments_from_payload(b""), None);
}

#[test]
fn test_translator_takes_precedence() {
    let handler = translating_handler();

    assert_eq!(handler.urn_from_payload(&[0xA0]).unwrap(), urn("urn:dmns:par"));
    assert_eq!(handler.arguments_from_payload(&[0xA0]), None);

    // '?' after a translated byte is just another argument byte
    let payload = [0xC0, b'?', b'x'];
    assert_eq!(handler.urn_from_payload(&payload).unwrap(), urn("urn:dmns:log"));
    assert_eq!(handler.arguments_from_payload(&payload), Some(b"?x".to_vec()));

    // untranslated first bytes fall back to urn addressing
    assert_eq!(handler.urn_from_payload(b"urn:dmns:par?a").unwrap(), urn("urn:dmns:par"));
    assert_eq!(handler.arguments_from_payload(b"urn:dmns:par?a"), Some(b"a".to_vec()));
    assert!(handler.urn_from_payload(&[0xB0, b'a']).is_err());
}

fn upper() -> Arc<dyn RestService> {
    Arc::new(
        LocalService::new(urn("urn:dmns:upper"))
            .on_get(|args| Ok(args.map(|a| a.to_ascii_uppercase())))
            .on_delete(|_| Ok(None))
            .on_post(|_| Err(ServiceError::Failed("cannot post here".into()))),
    )
}

fn request(packet_type: PacketType, method: Method, id: u16, payload: &[u8]) -> Message {
    Message::request(packet_type, method, id)
        .with_token(vec![0xBE, 0xEF])
        .with_payload(payload.to_vec())
}

#[tokio::test]
async fn test_handler_invokes_service() {
    let handler = handler_with(&[upper()], &Config::new());

    let reply = handler
        .handle_request(&request(PacketType::Non, Method::Get, 5, b"urn:dmns:upper?shout"))
        .await
        .unwrap();

    assert_eq!(reply.packet_type, PacketType::Non);
    assert_eq!(reply.response_code(), Some(ResponseCode::Content));
    assert_eq!(reply.message_id, 5);
    assert_eq!(reply.token, vec![0xBE, 0xEF]);
    assert_eq!(reply.payload, b"SHOUT");
}

#[tokio::test]
async fn test_handler_no_result_no_reply() {
    let handler = handler_with(&[upper()], &Config::new().with_errors(true));

    let reply = handler.handle_request(&request(PacketType::Non, Method::Delete, 5, b"urn:dmns:upper")).await;
    assert!(reply.is_none());

    // no args handed to a GET that only transforms args
    let reply = handler.handle_request(&request(PacketType::Non, Method::Get, 6, b"urn:dmns:upper")).await;
    assert!(reply.is_none());
}

#[tokio::test]
async fn test_handler_error_replies() {
    let handler = handler_with(&[upper()], &Config::new().with_errors(true));

    let cases: [(&[u8], Method, ResponseCode); 4] = [
        (b"gekkehenkies?somethingcool", Method::Get, ResponseCode::BadRequest),
        (b"urn:dmns:missing?x", Method::Get, ResponseCode::NotFound),
        (b"urn:dmns:upper?x", Method::Post, ResponseCode::BadOption),
        (b"urn:dmns:upper?x", Method::Put, ResponseCode::BadOption),
    ];

    for (id, (payload, method, code)) in cases.into_iter().enumerate() {
        let reply = handler
            .handle_request(&request(PacketType::Non, method, id as u16, payload))
            .await
            .unwrap();
        assert_eq!(reply.response_code(), Some(code));
        assert_eq!(reply.message_id, id as u16);
        assert_eq!(reply.packet_type, PacketType::Non);
    }
}

#[tokio::test]
async fn test_handler_errors_silent_by_default() {
    let handler = handler_with(&[upper()], &Config::new());

    for payload in [&b"gekkehenkies"[..], &b"urn:dmns:missing"[..], &b""[..]] {
        assert!(handler.handle_request(&request(PacketType::Con, Method::Get, 1, payload)).await.is_none());
    }
    assert!(handler.handle_request(&request(PacketType::Non, Method::Post, 1, b"urn:dmns:upper")).await.is_none());
}

#[tokio::test]
async fn test_handler_acks_before_invoking() {
    let connector = Arc::new(RecordingConnector::default());
    let seen = connector.clone();

    let service: Arc<dyn RestService> = Arc::new(LocalService::new(urn("urn:dmns:par")).on_put(move |_| {
        // the ack is already on the wire when the service runs
        let acks = seen.written.lock().unwrap().len();
        Ok(Some(vec![acks as u8]))
    }));
    let handler = handler_with(&[service], &Config::new().with_acks(true))
        .with_connector(connector.clone());

    let reply = handler
        .handle_request(&request(PacketType::Con, Method::Put, 9, b"urn:dmns:par?v"))
        .await
        .unwrap();
    assert_eq!(reply.payload, vec![1]);

    let written = connector.written();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].packet_type, PacketType::Ack);
    assert_eq!(written[0].code, Code::Empty);
    assert_eq!(written[0].message_id, 9);

    // NON requests are never acked
    handler.handle_request(&request(PacketType::Non, Method::Put, 10, b"urn:dmns:par")).await;
    assert_eq!(connector.written().len(), 1);
}

#[tokio::test]
async fn test_handler_ack_write_failure_still_invokes() {
    let handler = handler_with(&[upper()], &Config::new().with_acks(true))
        .with_connector(Arc::new(BrokenConnector));

    let reply = handler
        .handle_request(&request(PacketType::Con, Method::Get, 2, b"urn:dmns:upper?ok"))
        .await
        .unwrap();
    assert_eq!(reply.payload, b"OK");
}

#[tokio::test]
async fn test_handler_dispatch_bytes() {
    let handler = handler_with(&[upper()], &Config::new().with_errors(true));

    assert!(handler.dispatch_message(b"gekkehenkies").await.is_none());

    // method code 0.05 (FETCH) is not a verb we serve
    assert!(handler.dispatch_message(&[0x50, 0x05, 0x00, 0x01]).await.is_none());

    let resp = response(PacketType::Non, ResponseCode::Content, 1, b"");
    assert!(handler.dispatch_message(&resp).await.is_none());

    let bytes = request(PacketType::Non, Method::Get, 4, b"urn:dmns:upper?hi").serialize().unwrap();
    let reply = Message::parse(&handler.dispatch_message(&bytes).await.unwrap()).unwrap();
    assert_eq!(reply.payload, b"HI");
}

// --- client ---

#[tokio::test]
async fn test_client_addressing_modes() {
    let connector = Arc::new(RecordingConnector::default());
    let translator = StaticTranslator::new().with(0xA1, urn("urn:dmns:log"));
    let client = MessageClient::new(connector.clone(), Config::new().with_request_timeout(Duration::from_millis(1)))
        .with_translator(Arc::new(translator));

    let par = client.resolve(&urn("urn:dmns:par")).unwrap();
    let log = client.resolve(&urn("urn:dmns:log")).unwrap();
    assert_eq!(par.identifier(), &urn("urn:dmns:par"));
    assert_eq!(log.identifier(), &urn("urn:dmns:log"));

    par.get(Some(b"args")).await.unwrap();
    par.get(None).await.unwrap();
    log.post(Some(b"line")).await.unwrap();
    log.delete(None).await.unwrap();

    let payloads: Vec<Vec<u8>> = connector.written().into_iter().map(|m| m.payload).collect();
    assert_eq!(
        payloads,
        vec![
            b"urn:dmns:par?args".to_vec(),
            b"urn:dmns:par?".to_vec(),
            vec![0xA1, b'l', b'i', b'n', b'e'],
            vec![0xA1],
        ]
    );
    assert!(connector.dispatchers().contains(client.dispatcher().key()));
    assert!(client.dispatcher().key().starts_with(CLIENT_DISPATCHER));
}
