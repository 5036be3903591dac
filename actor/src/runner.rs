// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor host
//!
//! Every actor identity is hosted by one `ActorRunner`. The runner owns the identity's mailbox
//! and runs a select loop that takes one delivery at a time and runs it to completion. Because
//! message handlers, reminders and timer callbacks all arrive through that mailbox, the actor
//! state is only ever touched by one of them at a time.
//!
//! The runner activates the actor on the first delivery that needs it and deactivates it on
//! request, on idleness or at system shutdown. Deactivation requests are deliveries too, so they
//! are ordered with the messages sent before them. Once nothing is active and the mailbox is
//! empty the runner releases the identity and ends; the next delivery starts a new runner with a
//! fresh activation:
//!
//! ```text
//! Uninitialized ──► Activating ──► Active ──► Deactivating ──► Deactivated
//! ```
//!
//! A failed `on_activate` rejects the delivery that triggered it with the hook's error and
//! returns the identity to `Uninitialized`, so the next delivery tries again.
//!

use crate::{
    actor::{ActivationState, Actor, ActorContext, ActorRef},
    handler::{mailbox, BoxedMessageHandler, HandleHelper, MailboxReceiver, MailboxSender},
    path::ActorPath,
    prototype::Prototype,
    system::{Factory, SystemConfig, SystemRef},
    timer::TimerService,
};

use tokio::{
    select,
    sync::watch,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use std::sync::{atomic::AtomicU64, Arc};
use std::time::Duration;

/// A live activation: the instance and its context.
struct Activation<A: Actor> {
    actor: A,
    ctx: ActorContext<A>,
}

/// Host of one actor identity.
pub(crate) struct ActorRunner<A: Actor> {
    /// Identity hosted by this runner.
    path: ActorPath,
    /// Hosting system, handed to every context.
    system: SystemRef,
    /// Handlers of the kind.
    prototype: Arc<Prototype<A>>,
    /// Builds a fresh instance for each activation.
    factory: Factory<A>,
    /// Current activation, if any.
    activation: Option<Activation<A>>,
    /// Published lifecycle.
    state: watch::Sender<ActivationState>,
    /// Mailbox sender handed to the timers of each activation.
    mailbox: MailboxSender<A>,
    /// Deliveries.
    receiver: MailboxReceiver<A>,
    /// Timer generations, shared across activations.
    timer_generations: Arc<AtomicU64>,
    /// Deactivate after this long without messages or reminders.
    idle_timeout: Option<Duration>,
    /// Last time a message or reminder was handled.
    last_activity: Instant,
    /// System shutdown.
    token: CancellationToken,
}

impl<A: Actor> ActorRunner<A> {
    /// Creates the host of an identity together with the reference used to reach it.
    pub(crate) fn create(
        path: ActorPath,
        system: SystemRef,
        prototype: Arc<Prototype<A>>,
        factory: Factory<A>,
        config: &SystemConfig,
        token: CancellationToken,
    ) -> (Self, ActorRef<A>) {
        debug!("Creating host for {}.", &path);
        let (sender, receiver) = mailbox();
        let (state, state_receiver) = watch::channel(ActivationState::Uninitialized);
        let actor_ref = ActorRef::new(
            path.clone(),
            HandleHelper::new(path.clone(), sender.clone(), system.clone()),
            state_receiver,
        );
        let runner = Self {
            path,
            system,
            prototype,
            factory,
            activation: None,
            state,
            mailbox: sender,
            receiver,
            timer_generations: Arc::new(AtomicU64::new(0)),
            idle_timeout: config.idle_timeout,
            last_activity: Instant::now(),
            token,
        };
        (runner, actor_ref)
    }

    /// Main loop of the host. Returns once the identity is released or the system stops.
    pub(crate) async fn run(mut self) {
        debug!("Host of {} running.", &self.path);
        loop {
            let idle_deadline = match (self.idle_timeout, &self.activation) {
                (Some(timeout), Some(_)) => Some(self.last_activity + timeout),
                _ => None,
            };
            select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!("Stopping host of {}.", &self.path);
                    break;
                }
                delivery = self.receiver.recv() => {
                    match delivery {
                        Some(delivery) => self.deliver(delivery).await,
                        None => break,
                    }
                }
                _ = sleep_until(idle_deadline.unwrap_or_else(Instant::now)), if idle_deadline.is_some() => {
                    debug!("Actor {} is idle.", &self.path);
                    self.deactivate().await;
                }
            }
            if self.activation.is_none() && self.release().await {
                debug!("Host of {} released.", &self.path);
                return;
            }
        }
        self.deactivate().await;
        self.receiver.close();
        self.system.forget(&self.path).await;
        debug!("Host of {} stopped.", &self.path);
    }

    /// Hands the identity back to the system. Deliveries still queued run first, and the host
    /// stays if one of them activates the actor.
    async fn release(&mut self) -> bool {
        while let Some(delivery) = self.system.release(&self.path, &mut self.receiver).await {
            self.deliver(delivery).await;
            if self.activation.is_some() {
                return false;
            }
        }
        true
    }

    /// Runs one delivery, activating the actor first when needed.
    async fn deliver(&mut self, mut delivery: BoxedMessageHandler<A>) {
        let counts_as_activity = delivery.requires_activation();
        if self.activation.is_none() {
            if !counts_as_activity {
                debug!("Discarding delivery for inactive actor {}.", &self.path);
                delivery.discard();
                return;
            }
            if let Err(error) = self.activate().await {
                delivery.reject(error);
                return;
            }
        }

        let deactivate = match self.activation.as_mut() {
            Some(activation) => {
                delivery
                    .handle(&mut activation.actor, &mut activation.ctx)
                    .await;
                activation.ctx.is_deactivation_requested()
            }
            None => false,
        };
        if counts_as_activity {
            self.last_activity = Instant::now();
        }
        if deactivate {
            self.deactivate().await;
        }
    }

    /// Builds a fresh instance and runs `on_activate`.
    async fn activate(&mut self) -> Result<(), crate::Error> {
        self.transition(ActivationState::Activating);
        debug!("Activating actor {}.", &self.path);

        let mut actor = (self.factory)(&self.path);
        let timers = TimerService::new(
            self.path.clone(),
            self.mailbox.clone(),
            Arc::clone(&self.timer_generations),
        );
        let mut ctx = ActorContext::new(
            self.path.clone(),
            self.system.clone(),
            Arc::clone(&self.prototype),
            timers,
        );

        match actor.on_activate(&mut ctx).await {
            Ok(()) => {
                self.activation = Some(Activation { actor, ctx });
                self.last_activity = Instant::now();
                self.transition(ActivationState::Active);
                debug!("Actor {} is active.", &self.path);
                Ok(())
            }
            Err(error) => {
                error!("Actor {} failed to activate: {}", &self.path, error);
                self.transition(ActivationState::Uninitialized);
                Err(error)
            }
        }
    }

    /// Runs `on_deactivate` and drops the activation with its timers.
    async fn deactivate(&mut self) {
        let Some(mut activation) = self.activation.take() else {
            return;
        };
        self.transition(ActivationState::Deactivating);
        debug!("Deactivating actor {}.", &self.path);

        if let Err(error) = activation.actor.on_deactivate(&mut activation.ctx).await {
            error!("Actor {} failed to deactivate: {}", &self.path, error);
        }
        activation.ctx.timers_mut().clear();
        let waiters = activation.ctx.take_deactivation_waiters();
        drop(activation);

        self.transition(ActivationState::Deactivated);
        debug!("Actor {} is deactivated.", &self.path);
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    fn transition(&self, next: ActivationState) {
        let current = *self.state.borrow();
        if !current.can_transition_to(next) {
            warn!(
                "Unexpected transition of {} from {} to {}.",
                &self.path, current, next
            );
        }
        self.state.send_replace(next);
    }
}
