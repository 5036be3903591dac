// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Core library for type-indexed actor dispatch.
//! Provides the handler table, the dispatch prototype, the virtual-actor lifecycle,
//! per-activation timers and the buffering actor.

pub use actor::{
    ActivationState, Actor, ActorContext, ActorPath, ActorRef, ActorSystem,
    AnyValue, Buffered, BufferingActor, Envelope, Error as ActorError,
    EventBuffer, Factory, HandlerDescriptor, HandlerShape, HandlerTable,
    Message, Prototype, Publish, PublishBatch, Query, ReminderService, Reply,
    SystemConfig, SystemRef, SystemRunner, TimerCallback, TimerService,
    FLUSH_TIMER,
};
