// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Dispatch Actor Core
//!
//! A virtual-actor core built around a type-indexed handler table. Each actor kind declares,
//! once, which message types it handles and with which handler shape; every message delivered to
//! an actor is routed by its exact runtime type to that one handler.
//!
//! ## Overview
//!
//! The crate is organized in three layers:
//!
//! - **Dispatch**: [`HandlerTable`] maps message types to handlers, [`Prototype`] freezes the
//!   table of a kind and offers three dispatch entry points (`dispatch`, `dispatch_result` and
//!   `dispatch_async`), checking the handler shape before anything runs.
//! - **Lifecycle**: the [`Actor`] trait provides activation, deactivation and reminder hooks; the
//!   hosting runtime moves each identity through [`ActivationState`] and serializes message
//!   handlers, reminders and [`TimerService`] callbacks of one activation.
//! - **Batching**: [`BufferingActor`] accumulates events and hands them downstream in batches on
//!   a flush timer.
//!
//! ## Getting Started
//!
//! ```ignore
//! use actor::{Actor, ActorPath, ActorSystem, Error, HandlerTable, Message, Query, SystemConfig};
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Counter {
//!     value: u64,
//! }
//!
//! #[derive(Debug)]
//! struct Add(u64);
//!
//! impl Message for Add {}
//!
//! #[derive(Debug)]
//! struct Total;
//!
//! impl Message for Total {}
//!
//! impl Query for Total {
//!     type Result = u64;
//! }
//!
//! #[async_trait]
//! impl Actor for Counter {
//!     fn kind() -> &'static str {
//!         "counter"
//!     }
//!
//!     fn define(table: &mut HandlerTable<Self>) -> Result<(), Error> {
//!         table
//!             .on(|counter: &mut Counter, msg: Add, _ctx| {
//!                 counter.value += msg.0;
//!                 Ok(())
//!             })?
//!             .on_query(|counter: &mut Counter, _msg: Total, _ctx| Ok(counter.value))?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let (system, mut runner) =
//!         ActorSystem::create(SystemConfig::default(), CancellationToken::new());
//!     let handle = tokio::spawn(async move { runner.run().await });
//!
//!     system.register(|_path: &ActorPath| Counter { value: 0 }).await?;
//!     let counter = system.actor_of::<Counter>("42").await?;
//!
//!     counter.tell(Add(5)).await?;
//!     counter.tell(Add(3)).await?;
//!     assert_eq!(counter.ask_query(Total).await?, 8);
//!
//!     system.stop_system();
//!     let _ = handle.await;
//!     Ok(())
//! }
//! ```
//!
//! ## Handler Shapes
//!
//! | Registration                    | Shape        | `dispatch` | `dispatch_result` | `dispatch_async` |
//! |---------------------------------|--------------|------------|-------------------|------------------|
//! | `on`                            | `SyncVoid`   | yes        | no                | `Reply::Empty`   |
//! | `on_result`, `on_query`         | `SyncValue`  | no         | yes               | `Reply::Value`   |
//! | `on_async`                      | `AsyncVoid`  | no         | no                | `Reply::Empty`   |
//! | `on_async_result`, `on_query_async` | `AsyncValue` | no     | no                | `Reply::Value`   |
//!
//! A mismatch fails with [`Error::InvalidHandlerShape`] and the handler is not invoked. A
//! message without a handler fails with [`Error::NoHandler`]. Errors returned by handler bodies
//! reach the caller unchanged.
//!
//! ## Virtual Actors
//!
//! An [`ActorRef`] addresses an identity ([`ActorPath`]), not an activation. The first message
//! or reminder activates the actor; an activation ends on [`ActorRef::deactivate`], on
//! [`ActorContext::deactivate_on_idle`], after [`SystemConfig::idle_timeout`] or when the system
//! stops. The next delivery then starts a fresh activation with a new instance. Deactivation
//! requests are queued like messages, so they never overtake what was sent before them.
//!
//! Hosting is as lazy as activation: once an identity has nothing active and nothing queued its
//! host is released, and references reach a new host on their next delivery.
//!

mod actor;
mod buffer;
mod error;
mod handler;
mod message;
mod path;
mod prototype;
mod reminder;
mod runner;
mod system;
mod table;
mod timer;

//
// Core Actor Types
//

/// Behaviour of an actor kind: handler definition and lifecycle hooks.
pub use actor::Actor;

/// Execution context of one activation.
///
/// Gives handlers, hooks and timer callbacks access to the identity, the timers, the system,
/// typed dispatch helpers and the cached self-reference.
pub use actor::ActorContext;

/// Reference to an actor identity, valid across activations.
pub use actor::ActorRef;

/// Lifecycle state of an actor identity.
pub use actor::ActivationState;

//
// Messages
//

/// Marker trait for types that can be delivered to actors.
pub use message::Message;

/// A message binding the type of its answer.
pub use message::Query;

/// A message with its concrete type erased.
pub use message::Envelope;

/// Normalized result of a dispatch.
pub use message::Reply;

/// Type-erased handler result.
pub use message::AnyValue;

//
// Dispatch
//

/// Type-indexed registry of the handlers of one actor kind.
pub use table::HandlerTable;

/// One registered handler.
pub use table::HandlerDescriptor;

/// Signature pattern of a handler.
pub use table::HandlerShape;

/// Frozen dispatch definition of an actor kind.
pub use prototype::Prototype;

//
// Timers and reminders
//

/// Volatile, per-activation periodic callbacks.
pub use timer::TimerService;

/// Callback type of a timer.
pub use timer::TimerCallback;

/// Boundary to a durable reminder scheduler.
pub use reminder::ReminderService;

//
// Error Handling
//

/// Error type shared by the dispatch layer and handler bodies.
pub use error::Error;

//
// Actor Addressing
//

/// Identity of a virtual actor.
pub use path::ActorPath;

//
// System Management
//

/// Entry point that creates an actor system.
pub use system::ActorSystem;

/// Configuration of an actor system.
pub use system::SystemConfig;

/// Cloneable handle to a running actor system.
pub use system::SystemRef;

/// Runs an actor system until it stops.
pub use system::SystemRunner;

/// Factory of actor instances.
pub use system::Factory;

//
// Batching
//

/// Flush-on-timer batching actor.
pub use buffer::BufferingActor;

/// FIFO of events waiting for a flush.
pub use buffer::EventBuffer;

/// One event for a `BufferingActor`.
pub use buffer::Publish;

/// A batch of events handed downstream.
pub use buffer::PublishBatch;

/// Query for the number of buffered events.
pub use buffer::Buffered;

/// Name of the flush timer of a `BufferingActor`.
pub use buffer::FLUSH_TIMER;
