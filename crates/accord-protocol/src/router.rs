//! The message router.
//!
//! Composes the protocol selector, the middleware chain, and the
//! user-supplied terminal handler. Inbound or outbound, every routed
//! message flows through the same chain; the selected adapter rides
//! along on the request context so handlers never see transport
//! types.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use accord_core::context::Context;
use accord_core::error::{AccordResult, Error, ErrorCode};
use accord_core::message::Message;
use accord_core::security::ProtocolMode;
use tracing::debug;

use crate::adapter::{
    ChunkHandler, PLAIN_ADAPTER_NAME, ProtocolAdapter, SECURE_ADAPTER_NAME, attach_adapter,
};
use crate::middleware::{Handler, Middleware, MiddlewareChain};
use crate::selector::ProtocolSelector;

/// Routes messages through middleware to a terminal handler and
/// dispatches sends across registered transports.
pub struct MessageRouter {
    selector: ProtocolSelector,
    chain: RwLock<MiddlewareChain>,
    handler: RwLock<Option<Arc<dyn Handler>>>,
    adapters: RwLock<HashMap<String, Arc<dyn ProtocolAdapter>>>,
}

impl MessageRouter {
    /// A router in `auto` mode with no adapters, middleware, or
    /// handler.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mode(ProtocolMode::Auto)
    }

    /// A router starting in the given selection mode.
    #[must_use]
    pub fn with_mode(mode: ProtocolMode) -> Self {
        Self {
            selector: ProtocolSelector::new(mode),
            chain: RwLock::new(MiddlewareChain::new()),
            handler: RwLock::new(None),
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Change the selection mode.
    pub fn set_mode(&self, mode: ProtocolMode) {
        self.selector.set_mode(mode);
    }

    /// The current selection mode.
    #[must_use]
    pub fn mode(&self) -> ProtocolMode {
        self.selector.mode()
    }

    /// Register a transport adapter.
    ///
    /// Duplicate names overwrite — deterministic last write wins. The
    /// reserved names `plain` and `secure` also install the adapter
    /// into the corresponding selector slot.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` for an empty adapter name.
    pub fn register_adapter(&self, adapter: Arc<dyn ProtocolAdapter>) -> AccordResult<()> {
        let name = adapter.name().to_string();
        if name.is_empty() {
            return Err(Error::missing_field("adapter name"));
        }

        match name.as_str() {
            PLAIN_ADAPTER_NAME => {
                self.selector.register(ProtocolMode::Plain, Arc::clone(&adapter));
            },
            SECURE_ADAPTER_NAME => {
                self.selector.register(ProtocolMode::Secure, Arc::clone(&adapter));
            },
            _ => {},
        }

        self.adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), adapter);
        debug!(adapter = %name, "adapter registered");
        Ok(())
    }

    /// Append a middleware to the chain. The first appended runs
    /// outermost.
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.chain
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(middleware);
    }

    /// Install the terminal handler.
    pub fn set_handler(&self, handler: Arc<dyn Handler>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    fn current_handler(&self) -> AccordResult<Arc<dyn Handler>> {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                Error::new(ErrorCode::ConfigurationError, "router has no handler installed")
            })
    }

    fn select_adapter(&self, message: &Message) -> AccordResult<Arc<dyn ProtocolAdapter>> {
        self.selector.select(message).ok_or_else(|| {
            Error::not_found(format!(
                "no adapter registered for {} mode",
                self.selector.mode()
            ))
        })
    }

    fn named_adapter(&self, name: &str) -> AccordResult<Arc<dyn ProtocolAdapter>> {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no adapter named {name:?}")))
    }

    /// Route a message through the middleware chain to the handler
    /// and return its response.
    ///
    /// The selected adapter is attached to `cx` before the chain
    /// runs.
    ///
    /// # Errors
    ///
    /// - `ConfigurationError` when no handler is installed
    /// - `NotFound` when no adapter serves the selected mode
    /// - whatever the chain or handler returns
    pub async fn route(&self, cx: &mut Context, message: Message) -> AccordResult<Message> {
        let handler = self.current_handler()?;
        let adapter = self.select_adapter(&message)?;
        attach_adapter(cx, adapter);

        let chain = self
            .chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        chain.execute(cx, message, handler.as_ref()).await
    }

    /// Deliver a message on the selected transport.
    ///
    /// # Errors
    ///
    /// `NotFound` when no adapter serves the selected mode; otherwise
    /// whatever the transport returns.
    pub async fn send(&self, cx: &Context, message: &Message) -> AccordResult<()> {
        self.select_adapter(message)?.send_message(cx, message).await
    }

    /// Pull one message from a named transport.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown adapter name; `NotImplemented` from
    /// send-only transports.
    pub async fn receive(&self, cx: &Context, adapter_name: &str) -> AccordResult<Message> {
        self.named_adapter(adapter_name)?.receive_message(cx).await
    }

    /// Verify a message on the selected transport.
    ///
    /// # Errors
    ///
    /// `NotFound` when no adapter serves the selected mode; otherwise
    /// whatever the transport's verification returns.
    pub async fn verify(&self, cx: &Context, message: &Message) -> AccordResult<()> {
        self.select_adapter(message)?.verify(cx, message).await
    }

    /// Stream a message's response on the selected transport.
    ///
    /// # Errors
    ///
    /// `NotFound` when no adapter serves the selected mode;
    /// `NotImplemented` from non-streaming transports.
    pub async fn stream(
        &self,
        cx: &Context,
        message: &Message,
        on_chunk: ChunkHandler<'_>,
    ) -> AccordResult<()> {
        self.select_adapter(message)?.stream(cx, message, on_chunk).await
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler_fn;
    use accord_core::message::Part;
    use async_trait::async_trait;
    use futures::FutureExt;

    struct Named(&'static str);

    #[async_trait]
    impl ProtocolAdapter for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn send_message(&self, _cx: &Context, _message: &Message) -> AccordResult<()> {
            Ok(())
        }

        async fn verify(&self, _cx: &Context, _message: &Message) -> AccordResult<()> {
            Ok(())
        }
    }

    fn echo_handler() -> Arc<dyn Handler> {
        Arc::new(handler_fn(|_cx, msg: Message| {
            async move { Ok(Message::reply_to(&msg, vec![Part::text(msg.text())])) }.boxed()
        }))
    }

    #[tokio::test]
    async fn test_route_without_handler_fails() {
        let router = MessageRouter::with_mode(ProtocolMode::Plain);
        router.register_adapter(Arc::new(Named("plain"))).unwrap();

        let mut cx = Context::new();
        let err = router
            .route(&mut cx, Message::user_text("x"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
    }

    #[tokio::test]
    async fn test_route_without_adapter_fails_not_found() {
        let router = MessageRouter::with_mode(ProtocolMode::Plain);
        router.set_handler(echo_handler());

        let mut cx = Context::new();
        let err = router
            .route(&mut cx, Message::user_text("x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_empty_adapter_name_rejected() {
        let router = MessageRouter::new();
        let err = router.register_adapter(Arc::new(Named(""))).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingField);
    }

    #[tokio::test]
    async fn test_duplicate_registration_overwrites() {
        struct Counting(&'static str, std::sync::atomic::AtomicU32);

        #[async_trait]
        impl ProtocolAdapter for Counting {
            fn name(&self) -> &str {
                self.0
            }

            async fn send_message(
                &self,
                _cx: &Context,
                _message: &Message,
            ) -> AccordResult<()> {
                self.1.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }

            async fn verify(&self, _cx: &Context, _message: &Message) -> AccordResult<()> {
                Ok(())
            }
        }

        let router = MessageRouter::with_mode(ProtocolMode::Plain);
        let first = Arc::new(Counting("plain", std::sync::atomic::AtomicU32::new(0)));
        let second = Arc::new(Counting("plain", std::sync::atomic::AtomicU32::new(0)));

        router.register_adapter(first.clone()).unwrap();
        router.register_adapter(second.clone()).unwrap();

        router.send(&Context::new(), &Message::user_text("x")).await.unwrap();

        assert_eq!(first.1.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(second.1.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_receive_unknown_adapter() {
        let router = MessageRouter::new();
        let err = router.receive(&Context::new(), "ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_receive_delegates_to_send_only_transport() {
        let router = MessageRouter::new();
        router.register_adapter(Arc::new(Named("plain"))).unwrap();

        let err = router.receive(&Context::new(), "plain").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotImplemented);
    }
}
