// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Handler table
//!
//! The handler table maps the exact runtime type of a message to the one handler registered for
//! it. It is filled once per actor kind by `Actor::define` and is never mutated afterwards: the
//! `Prototype` that owns it only hands out shared references.
//!
//! Four handler shapes are supported:
//!
//! | Shape         | Registration       | Handler returns                      |
//! |---------------|--------------------|--------------------------------------|
//! | `SyncVoid`    | `on`               | `Result<(), Error>`                  |
//! | `SyncValue`   | `on_result`        | `Result<R, Error>`                   |
//! | `AsyncVoid`   | `on_async`         | `BoxFuture<'a, Result<(), Error>>`   |
//! | `AsyncValue`  | `on_async_result`  | `BoxFuture<'a, Result<R, Error>>`    |
//!
//! `on_query` and `on_query_async` are value shapes whose result type is bound by the `Query`
//! message itself.
//!
//! Matching is by exact type only. A handler registered for `Wrapper<T>` is never selected for
//! `T`, and there is no fallback handler.
//!

use crate::{
    actor::{Actor, ActorContext},
    message::{AnyValue, Envelope, Message, Query},
    Error,
};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use std::any::{type_name, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug, Display, Formatter};

/// Signature pattern of a registered handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlerShape {
    /// Synchronous, no result.
    SyncVoid,
    /// Synchronous, returns a value.
    SyncValue,
    /// Asynchronous, no result.
    AsyncVoid,
    /// Asynchronous, returns a value.
    AsyncValue,
}

impl HandlerShape {
    /// True for the asynchronous shapes.
    pub fn is_async(&self) -> bool {
        matches!(self, HandlerShape::AsyncVoid | HandlerShape::AsyncValue)
    }

    /// True for the shapes that produce a value.
    pub fn returns_value(&self) -> bool {
        matches!(self, HandlerShape::SyncValue | HandlerShape::AsyncValue)
    }
}

impl Display for HandlerShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HandlerShape::SyncVoid => write!(f, "synchronous void"),
            HandlerShape::SyncValue => write!(f, "synchronous value-returning"),
            HandlerShape::AsyncVoid => write!(f, "asynchronous void"),
            HandlerShape::AsyncValue => write!(f, "asynchronous value-returning"),
        }
    }
}

type SyncVoidFn<A> = Box<
    dyn Fn(&mut A, Envelope, &mut ActorContext<A>) -> Result<(), Error>
        + Send
        + Sync,
>;

type SyncValueFn<A> = Box<
    dyn Fn(&mut A, Envelope, &mut ActorContext<A>) -> Result<AnyValue, Error>
        + Send
        + Sync,
>;

type AsyncVoidFn<A> = Box<
    dyn for<'a> Fn(
            &'a mut A,
            Envelope,
            &'a mut ActorContext<A>,
        ) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync,
>;

type AsyncValueFn<A> = Box<
    dyn for<'a> Fn(
            &'a mut A,
            Envelope,
            &'a mut ActorContext<A>,
        ) -> BoxFuture<'a, Result<AnyValue, Error>>
        + Send
        + Sync,
>;

/// Bound callable of a handler, one variant per shape.
pub(crate) enum Callable<A: Actor> {
    SyncVoid(SyncVoidFn<A>),
    SyncValue(SyncValueFn<A>),
    AsyncVoid(AsyncVoidFn<A>),
    AsyncValue(AsyncValueFn<A>),
}

impl<A: Actor> Callable<A> {
    fn shape(&self) -> HandlerShape {
        match self {
            Callable::SyncVoid(_) => HandlerShape::SyncVoid,
            Callable::SyncValue(_) => HandlerShape::SyncValue,
            Callable::AsyncVoid(_) => HandlerShape::AsyncVoid,
            Callable::AsyncValue(_) => HandlerShape::AsyncValue,
        }
    }
}

/// One registered handler: the message type it accepts, its shape and the bound callable.
pub struct HandlerDescriptor<A: Actor> {
    type_id: TypeId,
    message_type: &'static str,
    callable: Callable<A>,
}

impl<A: Actor> HandlerDescriptor<A> {
    /// `TypeId` of the accepted message type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the accepted message type.
    pub fn message_type(&self) -> &'static str {
        self.message_type
    }

    /// Shape of the handler.
    pub fn shape(&self) -> HandlerShape {
        self.callable.shape()
    }

    pub(crate) fn callable(&self) -> &Callable<A> {
        &self.callable
    }
}

impl<A: Actor> Debug for HandlerDescriptor<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("message_type", &self.message_type)
            .field("shape", &self.shape())
            .finish()
    }
}

/// Type-indexed registry of the handlers of one actor kind.
pub struct HandlerTable<A: Actor> {
    actor: &'static str,
    handlers: HashMap<TypeId, HandlerDescriptor<A>>,
    interleaved: HashSet<TypeId>,
}

impl<A: Actor> HandlerTable<A> {
    /// Creates an empty table for the given actor kind.
    pub(crate) fn new(actor: &'static str) -> Self {
        Self {
            actor,
            handlers: HashMap::new(),
            interleaved: HashSet::new(),
        }
    }

    /// Actor kind this table belongs to.
    pub fn actor(&self) -> &'static str {
        self.actor
    }

    /// Registers a synchronous handler without result.
    pub fn on<M, F>(&mut self, handler: F) -> Result<&mut Self, Error>
    where
        M: Message,
        F: Fn(&mut A, M, &mut ActorContext<A>) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        let callable = move |actor: &mut A,
                             envelope: Envelope,
                             ctx: &mut ActorContext<A>|
              -> Result<(), Error> {
            handler(actor, envelope.downcast::<M>()?, ctx)
        };
        self.register::<M>(Callable::SyncVoid(Box::new(callable)))
    }

    /// Registers a synchronous handler returning a value.
    pub fn on_result<M, R, F>(&mut self, handler: F) -> Result<&mut Self, Error>
    where
        M: Message,
        R: Send + 'static,
        F: Fn(&mut A, M, &mut ActorContext<A>) -> Result<R, Error>
            + Send
            + Sync
            + 'static,
    {
        let callable = move |actor: &mut A,
                             envelope: Envelope,
                             ctx: &mut ActorContext<A>|
              -> Result<AnyValue, Error> {
            let value = handler(actor, envelope.downcast::<M>()?, ctx)?;
            Ok(AnyValue::new(value))
        };
        self.register::<M>(Callable::SyncValue(Box::new(callable)))
    }

    /// Registers an asynchronous handler without result.
    ///
    /// ```ignore
    /// table.on_async(|actor: &mut Account, msg: Deposit, _ctx| {
    ///     Box::pin(async move {
    ///         actor.balance += msg.0;
    ///         Ok(())
    ///     })
    /// })?;
    /// ```
    pub fn on_async<M, F>(&mut self, handler: F) -> Result<&mut Self, Error>
    where
        M: Message,
        F: for<'a> Fn(
                &'a mut A,
                M,
                &'a mut ActorContext<A>,
            ) -> BoxFuture<'a, Result<(), Error>>
            + Send
            + Sync
            + 'static,
    {
        let callable = async_void::<A, _>(move |actor, envelope, ctx| {
            match envelope.downcast::<M>() {
                Ok(message) => handler(actor, message, ctx),
                Err(error) => futures::future::ready(Err(error)).boxed(),
            }
        });
        self.register::<M>(Callable::AsyncVoid(callable))
    }

    /// Registers an asynchronous handler returning a value.
    pub fn on_async_result<M, R, F>(
        &mut self,
        handler: F,
    ) -> Result<&mut Self, Error>
    where
        M: Message,
        R: Send + 'static,
        F: for<'a> Fn(
                &'a mut A,
                M,
                &'a mut ActorContext<A>,
            ) -> BoxFuture<'a, Result<R, Error>>
            + Send
            + Sync
            + 'static,
    {
        let callable = async_value::<A, _>(move |actor, envelope, ctx| {
            match envelope.downcast::<M>() {
                Ok(message) => handler(actor, message, ctx)
                    .map(|result| result.map(AnyValue::new))
                    .boxed(),
                Err(error) => futures::future::ready(Err(error)).boxed(),
            }
        });
        self.register::<M>(Callable::AsyncValue(callable))
    }

    /// Registers a synchronous query handler; the result type is bound by the query.
    pub fn on_query<Q, F>(&mut self, handler: F) -> Result<&mut Self, Error>
    where
        Q: Query,
        F: Fn(&mut A, Q, &mut ActorContext<A>) -> Result<Q::Result, Error>
            + Send
            + Sync
            + 'static,
    {
        self.on_result::<Q, Q::Result, F>(handler)
    }

    /// Registers an asynchronous query handler; the result type is bound by the query.
    pub fn on_query_async<Q, F>(&mut self, handler: F) -> Result<&mut Self, Error>
    where
        Q: Query,
        F: for<'a> Fn(
                &'a mut A,
                Q,
                &'a mut ActorContext<A>,
            ) -> BoxFuture<'a, Result<Q::Result, Error>>
            + Send
            + Sync
            + 'static,
    {
        self.on_async_result::<Q, Q::Result, F>(handler)
    }

    /// Marks a message type as interleavable.
    ///
    /// The marker is informational: the host still runs every delivery of an activation one at
    /// a time, interleaved types included. Marking a type twice is harmless.
    pub fn interleave<M: Message>(&mut self) -> &mut Self {
        self.interleaved.insert(TypeId::of::<M>());
        self
    }

    /// True if `M` was marked with `interleave`.
    pub fn is_interleaved<M: Message>(&self) -> bool {
        self.interleaved.contains(&TypeId::of::<M>())
    }

    /// Resolves the handler for the exact runtime type of the message.
    pub fn resolve(
        &self,
        envelope: &Envelope,
    ) -> Result<&HandlerDescriptor<A>, Error> {
        self.handlers.get(&envelope.type_id()).ok_or_else(|| {
            Error::NoHandler {
                actor: self.actor.to_owned(),
                message: envelope.type_name().to_owned(),
            }
        })
    }

    /// Handler registered for `M`, if any.
    pub fn descriptor<M: Message>(&self) -> Option<&HandlerDescriptor<A>> {
        self.handlers.get(&TypeId::of::<M>())
    }

    /// True if a handler is registered for `M`.
    pub fn contains<M: Message>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<M>())
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Names of the registered message types, sorted.
    pub fn message_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self
            .handlers
            .values()
            .map(|descriptor| descriptor.message_type)
            .collect();
        types.sort_unstable();
        types
    }

    fn register<M: Message>(
        &mut self,
        callable: Callable<A>,
    ) -> Result<&mut Self, Error> {
        let type_id = TypeId::of::<M>();
        let message_type = type_name::<M>();
        if self.handlers.contains_key(&type_id) {
            return Err(Error::DuplicateHandler {
                actor: self.actor.to_owned(),
                message: message_type.to_owned(),
            });
        }
        debug!(
            "Registering {} handler for '{}' in '{}'.",
            callable.shape(),
            message_type,
            self.actor
        );
        self.handlers.insert(
            type_id,
            HandlerDescriptor {
                type_id,
                message_type,
                callable,
            },
        );
        Ok(self)
    }
}

impl<A: Actor> Debug for HandlerTable<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("actor", &self.actor)
            .field("handlers", &self.message_types())
            .finish()
    }
}

// Pins the higher-ranked signature so closures returning futures that borrow their arguments
// type-check.
fn async_void<A, F>(f: F) -> AsyncVoidFn<A>
where
    A: Actor,
    F: for<'a> Fn(
            &'a mut A,
            Envelope,
            &'a mut ActorContext<A>,
        ) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    Box::new(f)
}

fn async_value<A, F>(f: F) -> AsyncValueFn<A>
where
    A: Actor,
    F: for<'a> Fn(
            &'a mut A,
            Envelope,
            &'a mut ActorContext<A>,
        ) -> BoxFuture<'a, Result<AnyValue, Error>>
        + Send
        + Sync
        + 'static,
{
    Box::new(f)
}
