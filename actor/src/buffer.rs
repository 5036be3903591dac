// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Buffering actor
//!
//! `BufferingActor` accepts events one by one and hands them downstream in batches, once per
//! flush period. Each flush swaps the accumulated events out of the buffer before the batch is
//! sent, so events accepted while the batch is in transit land in the next batch and none is
//! sent twice.
//!
//! Accepting events and flushing are both deliveries of the same actor and never overlap.
//!

use crate::{
    actor::{Actor, ActorContext, ActorRef},
    message::{Message, Query},
    table::HandlerTable,
    Error,
};

use async_trait::async_trait;
use tracing::debug;

use std::collections::VecDeque;
use std::time::Duration;

/// Name of the flush timer.
pub const FLUSH_TIMER: &str = "flush";

/// One event for the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Publish<E> {
    /// The event.
    pub event: E,
}

impl<E: Send + 'static> Message for Publish<E> {}

/// A batch of events, in the order they were accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishBatch<E> {
    /// The events.
    pub events: Vec<E>,
}

impl<E: Send + 'static> Message for PublishBatch<E> {}

/// Number of events waiting for the next flush.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Buffered;

impl Message for Buffered {}

impl Query for Buffered {
    type Result = usize;
}

/// FIFO of accepted events.
#[derive(Debug)]
pub struct EventBuffer<E> {
    events: VecDeque<E>,
}

impl<E> EventBuffer<E> {
    /// Empty buffer.
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
        }
    }

    /// Appends an event.
    pub fn push(&mut self, event: E) {
        self.events.push_back(event);
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Takes every buffered event and leaves the buffer empty. `None` if it was already empty.
    pub fn take(&mut self) -> Option<Vec<E>> {
        if self.events.is_empty() {
            return None;
        }
        let events = std::mem::take(&mut self.events);
        Some(events.into())
    }
}

impl<E> Default for EventBuffer<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Batches `Publish<E>` events and tells them to `D` as `PublishBatch<E>` every flush period.
///
/// The downstream actor must handle `PublishBatch<E>`. Whatever is still buffered when the
/// actor is deactivated is flushed from `on_deactivate`.
pub struct BufferingActor<E, D: Actor> {
    downstream: ActorRef<D>,
    flush_period: Duration,
    buffer: EventBuffer<E>,
}

impl<E, D> BufferingActor<E, D>
where
    E: Send + 'static,
    D: Actor,
{
    /// Creates an empty buffering actor.
    pub fn new(downstream: ActorRef<D>, flush_period: Duration) -> Self {
        Self {
            downstream,
            flush_period,
            buffer: EventBuffer::new(),
        }
    }

    /// Number of events waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    async fn flush(&mut self) -> Result<(), Error> {
        let Some(events) = self.buffer.take() else {
            return Ok(());
        };
        debug!(
            "Flushing {} events to {}.",
            events.len(),
            self.downstream.path()
        );
        self.downstream.tell(PublishBatch { events }).await
    }
}

#[async_trait]
impl<E, D> Actor for BufferingActor<E, D>
where
    E: Send + 'static,
    D: Actor,
{
    fn define(table: &mut HandlerTable<Self>) -> Result<(), Error> {
        table
            .on(|buffering: &mut Self, msg: Publish<E>, _ctx| {
                buffering.buffer.push(msg.event);
                Ok(())
            })?
            .on_query(|buffering: &mut Self, _msg: Buffered, _ctx| {
                Ok(buffering.buffered())
            })?
            .interleave::<Publish<E>>();
        Ok(())
    }

    async fn on_activate(
        &mut self,
        ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        let period = self.flush_period;
        ctx.timers_mut().register(
            FLUSH_TIMER,
            period,
            period,
            |buffering: &mut Self, _ctx| Box::pin(buffering.flush()),
        )
    }

    async fn on_deactivate(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        self.flush().await
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_take_swaps_out_everything() {
        let mut buffer = EventBuffer::new();
        assert!(buffer.take().is_none());

        for event in 0..5 {
            buffer.push(event);
        }
        assert_eq!(buffer.len(), 5);

        let batch = buffer.take().unwrap();
        assert_eq!(batch, vec![0, 1, 2, 3, 4]);
        assert!(buffer.is_empty());

        buffer.push(5);
        buffer.push(6);
        assert_eq!(buffer.take().unwrap(), vec![5, 6]);
        assert!(buffer.take().is_none());
    }

    #[test]
    fn test_messages() {
        let publish = Publish { event: "a" };
        assert_eq!(publish.clone(), publish);
        let batch = PublishBatch {
            events: vec!["a", "b"],
        };
        assert_eq!(batch.events.len(), 2);
    }
}
