// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Timers
//!
//! Timers are volatile, per-activation periodic callbacks. Each timer is driven by a small ticker
//! task that posts a tick into the owner's mailbox; the callback itself runs in the host like any
//! other delivery, so it never overlaps a message handler or another callback of the same actor.
//!
//! A timer never has more than one tick in flight. When a period elapses while the previous
//! callback has not finished, that firing is deferred: one tick is posted as soon as the
//! callback completes, however many periods it overran. Callback errors are logged and the timer
//! keeps running.
//!
//! Timers belong to one activation: deactivation clears them, and ticks that arrive after their
//! timer was replaced or removed are discarded.
//!

use crate::{
    actor::{Actor, ActorContext},
    handler::{MailboxSender, MessageHandler},
    path::ActorPath,
    Error,
};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error};

use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::{
    atomic::{AtomicU64, AtomicU8, Ordering},
    Arc,
};
use std::time::Duration;

/// Callback of a timer.
pub type TimerCallback<A> = Arc<
    dyn for<'a> Fn(
            &'a mut A,
            &'a mut ActorContext<A>,
        ) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync,
>;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const DEFERRED: u8 = 2;

/// In-flight state of one timer, shared by its ticker and its ticks.
#[derive(Default)]
struct Firing(AtomicU8);

impl Firing {
    /// Claims a firing for a new tick. While a tick is in flight the firing is remembered
    /// instead and false is returned.
    fn start(&self) -> bool {
        if self
            .0
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return true;
        }
        let _ = self.0.compare_exchange(
            RUNNING,
            DEFERRED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        false
    }

    /// Ends the tick in flight. Returns true if a firing was deferred meanwhile; the timer then
    /// stays in flight and the caller posts the deferred tick.
    fn finish(&self) -> bool {
        if self
            .0
            .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return false;
        }
        self.0.store(RUNNING, Ordering::Release);
        true
    }
}

struct Timer<A: Actor> {
    generation: u64,
    period: Duration,
    callback: TimerCallback<A>,
    firing: Arc<Firing>,
    task: JoinHandle<()>,
}

/// Timers of one activation.
pub struct TimerService<A: Actor> {
    owner: ActorPath,
    mailbox: MailboxSender<A>,
    generations: Arc<AtomicU64>,
    timers: HashMap<String, Timer<A>>,
}

impl<A: Actor> TimerService<A> {
    /// Creates an empty service posting ticks to the given mailbox.
    ///
    /// `generations` is shared by every activation of the identity, so ticks of a previous
    /// activation can never match a timer of the current one.
    pub(crate) fn new(
        owner: ActorPath,
        mailbox: MailboxSender<A>,
        generations: Arc<AtomicU64>,
    ) -> Self {
        Self {
            owner,
            mailbox,
            generations,
            timers: HashMap::new(),
        }
    }

    /// Registers a timer, replacing any timer with the same name.
    ///
    /// The first firing happens after `due`, then every `period`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidTimer` if `period` is zero.
    ///
    pub fn register<F>(
        &mut self,
        name: &str,
        due: Duration,
        period: Duration,
        callback: F,
    ) -> Result<(), Error>
    where
        F: for<'a> Fn(
                &'a mut A,
                &'a mut ActorContext<A>,
            ) -> BoxFuture<'a, Result<(), Error>>
            + Send
            + Sync
            + 'static,
    {
        if period.is_zero() {
            return Err(Error::InvalidTimer(format!(
                "timer '{}' of {} needs a non-zero period",
                name, self.owner
            )));
        }
        if self.unregister(name) {
            debug!("Replacing timer '{}' of {}.", name, self.owner);
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let firing = Arc::new(Firing::default());
        let task = tokio::spawn(tick::<A>(
            name.to_owned(),
            generation,
            due,
            period,
            Arc::clone(&firing),
            self.mailbox.clone(),
        ));
        self.timers.insert(
            name.to_owned(),
            Timer {
                generation,
                period,
                callback: Arc::new(callback),
                firing,
                task,
            },
        );
        debug!(
            "Registered timer '{}' of {} every {:?}.",
            name, self.owner, period
        );
        Ok(())
    }

    /// Removes a timer. Returns false if no timer had that name.
    pub fn unregister(&mut self, name: &str) -> bool {
        match self.timers.remove(name) {
            Some(timer) => {
                timer.task.abort();
                true
            }
            None => false,
        }
    }

    /// True if a timer with that name is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.timers.contains_key(name)
    }

    /// Period of a registered timer.
    pub fn period(&self, name: &str) -> Option<Duration> {
        self.timers.get(name).map(|timer| timer.period)
    }

    /// Number of registered timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// True if no timer is registered.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Removes every timer.
    pub fn clear(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.task.abort();
        }
    }

    /// Callback and in-flight state for a tick, if the tick is still current.
    fn current(
        &self,
        name: &str,
        generation: u64,
    ) -> Option<(TimerCallback<A>, Arc<Firing>)> {
        self.timers
            .get(name)
            .filter(|timer| timer.generation == generation)
            .map(|timer| (Arc::clone(&timer.callback), Arc::clone(&timer.firing)))
    }
}

impl<A: Actor> Drop for TimerService<A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<A: Actor> Debug for TimerService<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.timers.keys().collect();
        names.sort();
        f.debug_struct("TimerService")
            .field("owner", &self.owner)
            .field("timers", &names)
            .finish()
    }
}

async fn tick<A: Actor>(
    name: String,
    generation: u64,
    due: Duration,
    period: Duration,
    firing: Arc<Firing>,
    mailbox: MailboxSender<A>,
) {
    let mut ticker = interval_at(Instant::now() + due, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if !firing.start() {
            debug!("Timer '{}' still running, deferring tick.", name);
            continue;
        }
        let tick = TimerTick {
            name: name.clone(),
            generation,
        };
        if mailbox.send(Box::new(tick)).is_err() {
            break;
        }
    }
}

/// A timer firing, queued in the owner's mailbox.
struct TimerTick {
    name: String,
    generation: u64,
}

#[async_trait]
impl<A: Actor> MessageHandler<A> for TimerTick {
    async fn handle(&mut self, actor: &mut A, ctx: &mut ActorContext<A>) {
        let Some((callback, firing)) =
            ctx.timers().current(&self.name, self.generation)
        else {
            debug!("Discarding stale tick of timer '{}'.", self.name);
            return;
        };
        if let Err(error) = callback(actor, ctx).await {
            error!(
                "Timer '{}' of {} failed: {}",
                self.name,
                ctx.path(),
                error
            );
        }
        if firing.finish() {
            debug!("Posting deferred tick of timer '{}'.", self.name);
            let tick = TimerTick {
                name: self.name.clone(),
                generation: self.generation,
            };
            let _ = ctx.timers().mailbox.send(Box::new(tick));
        }
    }

    fn requires_activation(&self) -> bool {
        false
    }

    fn reject(&mut self, _error: Error) {}
}
