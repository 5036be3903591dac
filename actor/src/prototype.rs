// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Prototype
//!
//! A `Prototype` is the immutable dispatch definition of an actor kind. It is built once by
//! running `Actor::define` against an empty handler table and shared by every activation of the
//! kind.
//!
//! Three entry points route a message to its handler:
//!
//! * `dispatch` runs synchronous void handlers only.
//! * `dispatch_result` runs synchronous value-returning handlers only.
//! * `dispatch_async` runs any shape and normalizes the outcome into a `Reply`.
//!
//! The shape of the resolved handler is checked before it is invoked, so a mismatch never runs
//! the handler body.
//!

use crate::{
    actor::{Actor, ActorContext},
    message::{AnyValue, Envelope, Reply},
    table::{Callable, HandlerDescriptor, HandlerShape, HandlerTable},
    Error,
};

use tracing::debug;

use std::fmt::{self, Debug, Formatter};

/// Dispatch definition of one actor kind.
pub struct Prototype<A: Actor> {
    table: HandlerTable<A>,
}

impl<A: Actor> Prototype<A> {
    /// Builds the prototype of `A` by running its handler definition.
    pub fn define() -> Result<Self, Error> {
        let mut table = HandlerTable::new(A::kind());
        A::define(&mut table)?;
        debug!(
            "Defined actor kind '{}' with {} handlers.",
            table.actor(),
            table.len()
        );
        Ok(Self { table })
    }

    /// Name of the actor kind.
    pub fn kind(&self) -> &'static str {
        self.table.actor()
    }

    /// Handler table of the kind.
    pub fn table(&self) -> &HandlerTable<A> {
        &self.table
    }

    /// Routes a message to its synchronous void handler.
    pub fn dispatch(
        &self,
        actor: &mut A,
        message: Envelope,
        ctx: &mut ActorContext<A>,
    ) -> Result<(), Error> {
        let descriptor = self.table.resolve(&message)?;
        match descriptor.callable() {
            Callable::SyncVoid(handler) => handler(actor, message, ctx),
            _ => Err(self.shape_error(descriptor, HandlerShape::SyncVoid)),
        }
    }

    /// Routes a message to its synchronous value-returning handler.
    pub fn dispatch_result(
        &self,
        actor: &mut A,
        message: Envelope,
        ctx: &mut ActorContext<A>,
    ) -> Result<AnyValue, Error> {
        let descriptor = self.table.resolve(&message)?;
        match descriptor.callable() {
            Callable::SyncValue(handler) => handler(actor, message, ctx),
            _ => Err(self.shape_error(descriptor, HandlerShape::SyncValue)),
        }
    }

    /// Routes a message to its handler, whatever its shape.
    ///
    /// Void handlers complete with `Reply::Empty`.
    pub async fn dispatch_async(
        &self,
        actor: &mut A,
        message: Envelope,
        ctx: &mut ActorContext<A>,
    ) -> Result<Reply, Error> {
        let descriptor = self.table.resolve(&message)?;
        match descriptor.callable() {
            Callable::SyncVoid(handler) => {
                handler(actor, message, ctx).map(|()| Reply::Empty)
            }
            Callable::SyncValue(handler) => {
                handler(actor, message, ctx).map(Reply::Value)
            }
            Callable::AsyncVoid(handler) => {
                handler(actor, message, ctx).await.map(|()| Reply::Empty)
            }
            Callable::AsyncValue(handler) => {
                handler(actor, message, ctx).await.map(Reply::Value)
            }
        }
    }

    fn shape_error(
        &self,
        descriptor: &HandlerDescriptor<A>,
        expected: HandlerShape,
    ) -> Error {
        Error::InvalidHandlerShape {
            actor: self.kind().to_owned(),
            message: descriptor.message_type().to_owned(),
            expected,
            found: descriptor.shape(),
        }
    }
}

impl<A: Actor> Debug for Prototype<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prototype")
            .field("table", &self.table)
            .finish()
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::message::Message;

    use async_trait::async_trait;

    use std::any::type_name;
    use std::time::Duration;

    #[derive(Default)]
    struct Meter {
        calls: Vec<&'static str>,
    }

    #[derive(Debug)]
    struct TypeA;

    impl Message for TypeA {}

    #[derive(Debug)]
    struct TypeB(i32);

    impl Message for TypeB {}

    #[derive(Debug)]
    struct TypeC;

    impl Message for TypeC {}

    #[derive(Debug)]
    struct Slow(u64);

    impl Message for Slow {}

    #[derive(Debug)]
    struct Fail;

    impl Message for Fail {}

    #[derive(Debug)]
    struct Double(i32);

    impl Message for Double {}

    #[async_trait]
    impl Actor for Meter {
        fn kind() -> &'static str {
            "meter"
        }

        fn define(table: &mut HandlerTable<Self>) -> Result<(), Error> {
            table
                .on(|meter: &mut Meter, _msg: TypeA, _ctx| {
                    meter.calls.push("a");
                    Ok(())
                })?
                .on_result(|meter: &mut Meter, msg: TypeB, _ctx| {
                    meter.calls.push("b");
                    Ok(msg.0 * 10)
                })?
                .on_async(|meter: &mut Meter, msg: Slow, _ctx| {
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(msg.0)).await;
                        meter.calls.push("slow");
                        Ok(())
                    })
                })?
                .on(|_meter: &mut Meter, _msg: Fail, _ctx| {
                    Err(Error::Functional("rejected".to_owned()))
                })?
                .on_async_result(|meter: &mut Meter, msg: Double, _ctx| {
                    Box::pin(async move {
                        meter.calls.push("double");
                        Ok(msg.0 * 2)
                    })
                })?;
            Ok(())
        }
    }

    fn setup() -> (Prototype<Meter>, Meter, ActorContext<Meter>) {
        (
            Prototype::define().unwrap(),
            Meter::default(),
            ActorContext::detached("p-1"),
        )
    }

    #[tokio::test]
    async fn test_void_and_value_dispatch() {
        let (prototype, mut meter, mut ctx) = setup();
        assert_eq!(prototype.kind(), "meter");
        assert_eq!(prototype.table().len(), 5);

        prototype
            .dispatch(&mut meter, Envelope::new(TypeA), &mut ctx)
            .unwrap();
        let value = prototype
            .dispatch_result(&mut meter, Envelope::new(TypeB(7)), &mut ctx)
            .unwrap();
        assert_eq!(value.downcast::<i32>().unwrap(), 70);
        assert_eq!(meter.calls, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_shape_mismatch_does_not_invoke() {
        let (prototype, mut meter, mut ctx) = setup();

        let error = prototype
            .dispatch_result(&mut meter, Envelope::new(TypeA), &mut ctx)
            .unwrap_err();
        assert_eq!(
            error,
            Error::InvalidHandlerShape {
                actor: "meter".to_owned(),
                message: type_name::<TypeA>().to_owned(),
                expected: HandlerShape::SyncValue,
                found: HandlerShape::SyncVoid,
            }
        );

        let error = prototype
            .dispatch(&mut meter, Envelope::new(TypeB(1)), &mut ctx)
            .unwrap_err();
        assert!(matches!(
            error,
            Error::InvalidHandlerShape {
                expected: HandlerShape::SyncVoid,
                found: HandlerShape::SyncValue,
                ..
            }
        ));

        let error = prototype
            .dispatch(&mut meter, Envelope::new(Slow(1)), &mut ctx)
            .unwrap_err();
        assert!(matches!(
            error,
            Error::InvalidHandlerShape {
                found: HandlerShape::AsyncVoid,
                ..
            }
        ));
        assert!(meter.calls.is_empty());
    }

    #[tokio::test]
    async fn test_missing_handler() {
        let (prototype, mut meter, mut ctx) = setup();
        let expected = Error::NoHandler {
            actor: "meter".to_owned(),
            message: type_name::<TypeC>().to_owned(),
        };
        assert_eq!(
            prototype
                .dispatch(&mut meter, Envelope::new(TypeC), &mut ctx)
                .unwrap_err(),
            expected
        );
        assert_eq!(
            prototype
                .dispatch_async(&mut meter, Envelope::new(TypeC), &mut ctx)
                .await
                .unwrap_err(),
            expected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_dispatch_all_shapes() {
        let (prototype, mut meter, mut ctx) = setup();

        let reply = prototype
            .dispatch_async(&mut meter, Envelope::new(TypeA), &mut ctx)
            .await
            .unwrap();
        assert!(reply.is_empty());

        let reply = prototype
            .dispatch_async(&mut meter, Envelope::new(TypeB(2)), &mut ctx)
            .await
            .unwrap();
        assert_eq!(reply.downcast::<i32>().unwrap(), 20);

        let reply = prototype
            .dispatch_async(&mut meter, Envelope::new(Slow(50)), &mut ctx)
            .await
            .unwrap();
        assert!(reply.is_empty());

        let reply = prototype
            .dispatch_async(&mut meter, Envelope::new(Double(21)), &mut ctx)
            .await
            .unwrap();
        assert_eq!(reply.downcast::<i32>().unwrap(), 42);

        assert_eq!(meter.calls, vec!["a", "b", "slow", "double"]);
    }

    #[tokio::test]
    async fn test_handler_error_passes_through() {
        let (prototype, mut meter, mut ctx) = setup();
        let expected = Error::Functional("rejected".to_owned());
        assert_eq!(
            prototype
                .dispatch(&mut meter, Envelope::new(Fail), &mut ctx)
                .unwrap_err(),
            expected
        );
        assert_eq!(
            prototype
                .dispatch_async(&mut meter, Envelope::new(Fail), &mut ctx)
                .await
                .unwrap_err(),
            expected
        );
    }

    #[test]
    fn test_duplicate_definition_fails() {
        struct Broken;

        #[async_trait]
        impl Actor for Broken {
            fn define(table: &mut HandlerTable<Self>) -> Result<(), Error> {
                table
                    .on(|_b: &mut Broken, _msg: TypeA, _ctx| Ok(()))?
                    .on(|_b: &mut Broken, _msg: TypeA, _ctx| Ok(()))?;
                Ok(())
            }
        }

        assert!(matches!(
            Prototype::<Broken>::define(),
            Err(Error::DuplicateHandler { .. })
        ));
    }
}
