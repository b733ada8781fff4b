//! Router scenarios: echo over the plain transport, automatic
//! selection of the secure transport, and middleware composition.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use accord_core::context::Context;
use accord_core::did::Did;
use accord_core::error::AccordResult;
use accord_core::message::{Message, Part, Role};
use accord_core::security::{ProtocolMode, SecurityMetadata};
use accord_crypto::KeyPair;
use accord_protocol::adapter::ChunkHandler;
use accord_protocol::middleware::{
    Logger, Middleware, Next, RequestId, Timer, Validator, handler_fn,
};
use accord_protocol::plain::{PlainAdapter, RpcClient};
use accord_protocol::router::MessageRouter;
use accord_protocol::secure::{EnvelopeTransport, SecureAdapter, WireFrame};
use accord_session::handshake::HandshakeConfig;
use accord_session::resolver::StaticResolver;
use async_trait::async_trait;
use futures::FutureExt;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Request/response client that echoes the request text.
struct EchoClient;

#[async_trait]
impl RpcClient for EchoClient {
    async fn call(&self, _cx: &Context, message: &Message) -> AccordResult<Message> {
        Ok(Message::reply_to(message, vec![Part::text(message.text())]))
    }
}

/// Transport that drops every frame (the secure adapter only needs to
/// exist for selection tests).
struct NullTransport;

#[async_trait]
impl EnvelopeTransport for NullTransport {
    async fn deliver(
        &self,
        _cx: &Context,
        _frame: WireFrame,
    ) -> AccordResult<Option<WireFrame>> {
        Ok(None)
    }
}

fn secure_adapter(resolver: Arc<StaticResolver>, did: &str) -> SecureAdapter {
    SecureAdapter::new(
        Did::new(did).unwrap(),
        Arc::new(KeyPair::generate()),
        resolver,
        Arc::new(NullTransport),
        HandshakeConfig::default(),
    )
}

fn echo_router(mode: ProtocolMode) -> MessageRouter {
    let router = MessageRouter::with_mode(mode);
    router
        .register_adapter(Arc::new(PlainAdapter::new(Arc::new(EchoClient))))
        .unwrap();
    router.set_handler(Arc::new(handler_fn(|_cx, msg: Message| {
        async move { Ok(Message::reply_to(&msg, vec![Part::text(msg.text())])) }.boxed()
    })));
    router
}

#[tokio::test]
async fn echo_via_plain_transport() {
    init_tracing();
    let router = echo_router(ProtocolMode::Plain);
    router.use_middleware(Arc::new(RequestId::new()));
    router.use_middleware(Arc::new(Logger::new()));
    router.use_middleware(Arc::new(Validator::new()));

    let request = Message::new("m1", Role::User, vec![Part::text("Hello, World!")])
        .with_context_id("ctx-echo");

    let mut cx = Context::new();
    let response = router.route(&mut cx, request).await.unwrap();

    assert_eq!(response.role, Role::Agent);
    assert_eq!(response.parts.len(), 1);
    assert_eq!(response.text(), "Hello, World!");
    assert_eq!(response.context_id.as_deref(), Some("ctx-echo"));
    assert_eq!(cx.request_id(), Some("m1"));
}

/// Records which adapter the router attached to the context.
struct AdapterProbe {
    saw_secure: Arc<AtomicBool>,
}

#[async_trait]
impl Middleware for AdapterProbe {
    async fn handle(
        &self,
        cx: &mut Context,
        message: Message,
        next: Next<'_>,
    ) -> AccordResult<Message> {
        if cx.adapter_name() == Some("secure") {
            self.saw_secure.store(true, Ordering::SeqCst);
        }
        let attached = accord_protocol::adapter::adapter_from(cx).expect("adapter attached");
        assert_eq!(Some(attached.name()), cx.adapter_name());
        next.run(cx, message).await
    }
}

#[tokio::test]
async fn auto_mode_selects_secure_for_secure_messages() {
    let resolver = Arc::new(StaticResolver::new());
    let router = echo_router(ProtocolMode::Auto);
    router
        .register_adapter(Arc::new(secure_adapter(resolver, "did:example:local")))
        .unwrap();

    let saw_secure = Arc::new(AtomicBool::new(false));
    router.use_middleware(Arc::new(AdapterProbe {
        saw_secure: Arc::clone(&saw_secure),
    }));

    // A plain message goes to the plain adapter.
    let mut cx = Context::new();
    router
        .route(&mut cx, Message::user_text("plain traffic"))
        .await
        .unwrap();
    assert_eq!(cx.adapter_name(), Some("plain"));
    assert!(!saw_secure.load(Ordering::SeqCst));

    // A message requesting secure mode goes to the secure adapter.
    let secure_message = Message::user_text("secret traffic").with_security(
        SecurityMetadata::secure(Did::new("did:example:peer").unwrap(), "n-1", 0),
    );
    let mut cx = Context::new();
    router.route(&mut cx, secure_message).await.unwrap();
    assert_eq!(cx.adapter_name(), Some("secure"));
    assert!(saw_secure.load(Ordering::SeqCst));
}

#[tokio::test]
async fn timer_records_processing_time() {
    let router = echo_router(ProtocolMode::Plain);
    router.use_middleware(Arc::new(Timer::new()));
    router.set_handler(Arc::new(handler_fn(|_cx, msg: Message| {
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Message::reply_to(&msg, vec![Part::text("slow echo")]))
        }
        .boxed()
    })));

    let mut cx = Context::new();
    let response = router
        .route(&mut cx, Message::user_text("time me"))
        .await
        .unwrap();

    let elapsed = response.metadata["processing_time_ms"].as_u64().unwrap();
    assert!(elapsed >= 10);
}

#[tokio::test]
async fn router_send_and_stream_delegate_to_plain() {
    struct StreamingEcho;

    #[async_trait]
    impl RpcClient for StreamingEcho {
        async fn call(&self, _cx: &Context, message: &Message) -> AccordResult<Message> {
            Ok(Message::reply_to(message, vec![Part::text(message.text())]))
        }

        async fn call_stream(
            &self,
            _cx: &Context,
            message: &Message,
            on_chunk: ChunkHandler<'_>,
        ) -> AccordResult<()> {
            on_chunk(accord_protocol::adapter::StreamChunk::text(message.text()))?;
            on_chunk(accord_protocol::adapter::StreamChunk::completed())
        }

        fn supports_streaming(&self) -> bool {
            true
        }
    }

    let router = MessageRouter::with_mode(ProtocolMode::Plain);
    router
        .register_adapter(Arc::new(PlainAdapter::new(Arc::new(StreamingEcho))))
        .unwrap();

    let cx = Context::new();
    router.send(&cx, &Message::user_text("fire")).await.unwrap();

    let mut chunks = Vec::new();
    let mut sink = |chunk| {
        chunks.push(chunk);
        Ok(())
    };
    router
        .stream(&cx, &Message::user_text("flow"), &mut sink)
        .await
        .unwrap();
    assert_eq!(chunks.len(), 2);
}
