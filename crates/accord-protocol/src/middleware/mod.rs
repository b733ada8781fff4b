//! The middleware chain.
//!
//! A middleware wraps the handler below it: it may run code before
//! and after, transform the message, or short-circuit with its own
//! response. The chain stores middlewares in insertion order; the
//! first inserted is the outermost layer.

mod content_filter;
mod logger;
mod metadata;
mod rate_limit;
mod recovery;
mod request_id;
mod timeout;
mod timer;
mod validator;

pub use content_filter::ContentFilter;
pub use logger::Logger;
pub use metadata::Metadata;
pub use rate_limit::RateLimiter;
pub use recovery::Recovery;
pub use request_id::RequestId;
pub use timeout::Timeout;
pub use timer::Timer;
pub use validator::Validator;

use std::sync::Arc;

use accord_core::context::Context;
use accord_core::error::AccordResult;
use accord_core::message::Message;
use async_trait::async_trait;

/// A terminal message handler.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle a message, producing the response.
    async fn handle(&self, cx: &mut Context, message: Message) -> AccordResult<Message>;
}

/// Wrap a boxed-future closure as a [`Handler`].
///
/// ```
/// use accord_protocol::middleware::handler_fn;
/// use accord_core::message::{Message, Part};
/// use futures::FutureExt;
///
/// let echo = handler_fn(|_cx, msg: Message| {
///     async move { Ok(Message::reply_to(&msg, vec![Part::text(msg.text())])) }.boxed()
/// });
/// # let _ = echo;
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&mut Context, Message) -> futures::future::BoxFuture<'static, AccordResult<Message>>
        + Send
        + Sync,
{
    HandlerFn { f }
}

/// A [`Handler`] built from a closure. See [`handler_fn`].
///
/// The closure may inspect and mutate the context synchronously; the
/// future it returns owns its data. Implement [`Handler`] directly
/// when the async body itself needs the context.
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: Fn(&mut Context, Message) -> futures::future::BoxFuture<'static, AccordResult<Message>>
        + Send
        + Sync,
{
    async fn handle(&self, cx: &mut Context, message: Message) -> AccordResult<Message> {
        (self.f)(cx, message).await
    }
}

impl<F> std::fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

/// A handler wrapper in the chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process `message`, calling `next` to continue down the chain
    /// or returning early to short-circuit.
    async fn handle(
        &self,
        cx: &mut Context,
        message: Message,
        next: Next<'_>,
    ) -> AccordResult<Message>;
}

/// The remainder of the chain below the current middleware.
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    handler: &'a dyn Handler,
}

impl Next<'_> {
    /// Run the rest of the chain and the terminal handler.
    ///
    /// # Errors
    ///
    /// Propagates whatever the downstream layers return.
    pub async fn run(self, cx: &mut Context, message: Message) -> AccordResult<Message> {
        match self.middlewares.split_first() {
            Some((first, rest)) => {
                first
                    .handle(
                        cx,
                        message,
                        Next {
                            middlewares: rest,
                            handler: self.handler,
                        },
                    )
                    .await
            },
            None => self.handler.handle(cx, message).await,
        }
    }
}

/// An ordered middleware stack.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// An empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware. The first appended runs outermost.
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.layers.push(middleware);
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// True when no middleware is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Run `message` through every layer and the terminal handler.
    ///
    /// # Errors
    ///
    /// Propagates whatever the chain returns.
    pub async fn execute(
        &self,
        cx: &mut Context,
        message: Message,
        handler: &dyn Handler,
    ) -> AccordResult<Message> {
        Next {
            middlewares: &self.layers,
            handler,
        }
        .run(cx, message)
        .await
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("layers", &self.layers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_core::message::Part;
    use futures::FutureExt;

    struct Tag(&'static str);

    #[async_trait]
    impl Middleware for Tag {
        async fn handle(
            &self,
            cx: &mut Context,
            mut message: Message,
            next: Next<'_>,
        ) -> AccordResult<Message> {
            message = message.with_metadata(format!("pre_{}", self.0), true);
            let mut response = next.run(cx, message).await?;
            response
                .metadata
                .insert(format!("post_{}", self.0), serde_json::Value::Bool(true));
            Ok(response)
        }
    }

    fn echo() -> impl Handler {
        handler_fn(|_cx, msg: Message| {
            async move { Ok(Message::reply_to(&msg, vec![Part::text(msg.text())])) }.boxed()
        })
    }

    #[tokio::test]
    async fn test_empty_chain_runs_handler() {
        let chain = MiddlewareChain::new();
        let mut cx = Context::new();

        let response = chain
            .execute(&mut cx, Message::user_text("ping"), &echo())
            .await
            .unwrap();
        assert_eq!(response.text(), "ping");
    }

    #[tokio::test]
    async fn test_first_inserted_is_outermost() {
        struct Order(&'static str);

        #[async_trait]
        impl Middleware for Order {
            async fn handle(
                &self,
                cx: &mut Context,
                message: Message,
                next: Next<'_>,
            ) -> AccordResult<Message> {
                cx.insert_metadata(format!("enter_{}", self.0), cx.metadata().len());
                let response = next.run(cx, message).await;
                cx.insert_metadata(format!("exit_{}", self.0), cx.metadata().len());
                response
            }
        }

        let mut chain = MiddlewareChain::new();
        chain.push(Arc::new(Order("outer")));
        chain.push(Arc::new(Order("inner")));

        let mut cx = Context::new();
        chain
            .execute(&mut cx, Message::user_text("x"), &echo())
            .await
            .unwrap();

        // outer enters first, exits last.
        assert_eq!(cx.metadata()["enter_outer"], 0);
        assert_eq!(cx.metadata()["enter_inner"], 1);
        assert_eq!(cx.metadata()["exit_inner"], 2);
        assert_eq!(cx.metadata()["exit_outer"], 3);
    }

    #[tokio::test]
    async fn test_middleware_can_transform_and_annotate() {
        let mut chain = MiddlewareChain::new();
        chain.push(Arc::new(Tag("a")));

        let mut cx = Context::new();
        let response = chain
            .execute(&mut cx, Message::user_text("hello"), &echo())
            .await
            .unwrap();

        assert!(response.metadata.contains_key("post_a"));
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        struct Refuse;

        #[async_trait]
        impl Middleware for Refuse {
            async fn handle(
                &self,
                _cx: &mut Context,
                message: Message,
                _next: Next<'_>,
            ) -> AccordResult<Message> {
                Ok(Message::reply_to(&message, vec![Part::text("blocked")]))
            }
        }

        let mut chain = MiddlewareChain::new();
        chain.push(Arc::new(Refuse));

        let mut cx = Context::new();
        let response = chain
            .execute(&mut cx, Message::user_text("hello"), &echo())
            .await
            .unwrap();
        assert_eq!(response.text(), "blocked");
    }
}
