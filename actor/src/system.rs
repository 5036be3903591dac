// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor system
//!
//! The `system` module provides the `ActorSystem` type, the local runtime that hosts virtual
//! actors. Actor kinds are registered once with a factory; identities are then resolved on
//! demand with `SystemRef::actor_of`, which starts a host for the identity the first time it is
//! referenced. A host is released as soon as its identity has nothing active and nothing queued;
//! the next message sent to the identity starts a new one.
//!

use crate::{
    actor::{Actor, ActorRef},
    handler::{BoxedMessageHandler, MailboxReceiver},
    path::ActorPath,
    prototype::Prototype,
    reminder::ReminderService,
    runner::ActorRunner,
    Error,
};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use tracing::debug;

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

/// Builds the instance of a new activation from its identity.
pub type Factory<A> = Arc<dyn Fn(&ActorPath) -> A + Send + Sync>;

/// Configuration of an actor system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Deactivate activations that handled no message or reminder for this long.
    pub idle_timeout: Option<Duration>,
}

/// Actor system.
///
pub struct ActorSystem {}

impl ActorSystem {
    /// Create a new actor system.
    ///
    /// # Returns
    ///
    /// Returns a tuple with the system reference and the system runner.
    pub fn create(
        config: SystemConfig,
        token: CancellationToken,
    ) -> (SystemRef, SystemRunner) {
        let system = SystemRef::new(config, token);
        let runner = SystemRunner::new(system.token.clone(), system.tracker.clone());
        (system, runner)
    }
}

/// Registered actor kind.
struct Kind<A: Actor> {
    prototype: Arc<Prototype<A>>,
    factory: Factory<A>,
}

impl<A: Actor> Clone for Kind<A> {
    fn clone(&self) -> Self {
        Self {
            prototype: Arc::clone(&self.prototype),
            factory: Arc::clone(&self.factory),
        }
    }
}

type Hosts = HashMap<ActorPath, Box<dyn Any + Send + Sync + 'static>>;

/// System reference.
///
#[derive(Clone)]
pub struct SystemRef {
    /// Registered kinds, by actor type.
    kinds: Arc<RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync + 'static>>>>,

    /// References of the hosted identities.
    actors: Arc<RwLock<Hosts>>,

    /// Durable reminder scheduler, if any.
    reminders: Arc<RwLock<Option<Arc<dyn ReminderService>>>>,

    config: SystemConfig,

    token: CancellationToken,

    tracker: TaskTracker,
}

impl SystemRef {
    /// Create system reference.
    pub fn new(config: SystemConfig, token: CancellationToken) -> Self {
        SystemRef {
            kinds: Arc::new(RwLock::new(HashMap::new())),
            actors: Arc::new(RwLock::new(HashMap::new())),
            reminders: Arc::new(RwLock::new(None)),
            config,
            token,
            tracker: TaskTracker::new(),
        }
    }

    /// Configuration of the system.
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Registers an actor kind with the factory of its instances.
    ///
    /// The handlers of the kind are defined here, once. Registering a kind again keeps the
    /// first prototype and factory.
    ///
    /// # Errors
    ///
    /// Returns the error of `Actor::define`, e.g. `Error::DuplicateHandler`.
    ///
    pub async fn register<A, F>(&self, factory: F) -> Result<Arc<Prototype<A>>, Error>
    where
        A: Actor,
        F: Fn(&ActorPath) -> A + Send + Sync + 'static,
    {
        let mut kinds = self.kinds.write().await;
        if let Some(kind) = kinds
            .get(&TypeId::of::<A>())
            .and_then(|any| any.downcast_ref::<Kind<A>>())
        {
            debug!("Actor kind '{}' is already registered.", A::kind());
            return Ok(Arc::clone(&kind.prototype));
        }

        let prototype = Arc::new(Prototype::<A>::define()?);
        kinds.insert(
            TypeId::of::<A>(),
            Box::new(Kind {
                prototype: Arc::clone(&prototype),
                factory: Arc::new(factory),
            }),
        );
        debug!("Registered actor kind '{}'.", A::kind());
        Ok(prototype)
    }

    /// Prototype of a registered kind.
    pub async fn prototype<A: Actor>(&self) -> Option<Arc<Prototype<A>>> {
        self.kind::<A>().await.map(|kind| kind.prototype)
    }

    async fn kind<A: Actor>(&self) -> Option<Kind<A>> {
        let kinds = self.kinds.read().await;
        kinds
            .get(&TypeId::of::<A>())
            .and_then(|any| any.downcast_ref::<Kind<A>>())
            .cloned()
    }

    /// Reference to the actor of kind `A` with the given id.
    ///
    /// The identity is hosted on first use; the actor itself is only activated by the first
    /// message or reminder it receives.
    ///
    /// # Errors
    ///
    /// * `Error::UnknownKind` if `A` was not registered.
    /// * `Error::InvalidPath` if the id is blank or the path is bound to another actor type.
    /// * `Error::Send` if the system is stopping.
    ///
    pub async fn actor_of<A: Actor>(&self, id: &str) -> Result<ActorRef<A>, Error> {
        let path = ActorPath::of::<A>(id)?;
        if let Some(actor_ref) = self.get_actor::<A>(&path).await {
            return Ok(actor_ref);
        }
        if self.token.is_cancelled() {
            return Err(Error::Send(format!(
                "actor system is stopping, cannot host {}",
                path
            )));
        }
        let kind = self
            .kind::<A>()
            .await
            .ok_or_else(|| Error::UnknownKind(A::kind().to_owned()))?;

        let mut actors = self.actors.write().await;
        if let Some(existing) = actors.get(&path) {
            return existing
                .downcast_ref::<ActorRef<A>>()
                .cloned()
                .ok_or_else(|| {
                    Error::InvalidPath(format!(
                        "{} is bound to another actor type",
                        path
                    ))
                });
        }

        Ok(self.host(&mut actors, path, kind))
    }

    /// Starts the host of an identity. Callers hold the write lock of the hosted identities.
    fn host<A: Actor>(&self, actors: &mut Hosts, path: ActorPath, kind: Kind<A>) -> ActorRef<A> {
        let (runner, actor_ref) = ActorRunner::create(
            path.clone(),
            self.clone(),
            kind.prototype,
            kind.factory,
            &self.config,
            self.token.clone(),
        );
        actors.insert(path, Box::new(actor_ref.clone()));
        self.tracker.spawn(runner.run());
        actor_ref
    }

    /// Releases the host of an identity that has nothing active.
    ///
    /// A delivery still queued in `receiver` is handed back and the host stays. Otherwise the
    /// identity is unhosted and the mailbox closed; deliveries that got in before the close
    /// move to a fresh host.
    pub(crate) async fn release<A: Actor>(
        &self,
        path: &ActorPath,
        receiver: &mut MailboxReceiver<A>,
    ) -> Option<BoxedMessageHandler<A>> {
        let kind = self.kind::<A>().await;
        let mut actors = self.actors.write().await;
        if let Ok(delivery) = receiver.try_recv() {
            return Some(delivery);
        }
        actors.remove(path);
        receiver.close();

        let mut raced = Vec::new();
        while let Ok(delivery) = receiver.try_recv() {
            raced.push(delivery);
        }
        if raced.is_empty() {
            debug!("Released host of {}.", path);
            return None;
        }

        match kind {
            Some(kind) if !self.token.is_cancelled() => {
                debug!("Moving {} deliveries of {} to a new host.", raced.len(), path);
                let actor_ref = self.host(&mut actors, path.clone(), kind);
                for delivery in raced {
                    if let Err(mut delivery) = actor_ref.helper().send(delivery) {
                        delivery.reject(Error::Send(format!("{} is not reachable", path)));
                    }
                }
            }
            _ => {
                for mut delivery in raced {
                    delivery.reject(Error::Send(format!(
                        "actor system is stopping, cannot reach {}",
                        path
                    )));
                }
            }
        }
        None
    }

    /// Drops a stopped host from the hosted identities.
    pub(crate) async fn forget(&self, path: &ActorPath) {
        self.actors.write().await.remove(path);
    }

    /// Retrieves the reference of a hosted identity. If the identity is not hosted, or is
    /// hosted for another actor type, a None is returned instead.
    pub async fn get_actor<A: Actor>(&self, path: &ActorPath) -> Option<ActorRef<A>> {
        let actors = self.actors.read().await;
        actors
            .get(path)
            .and_then(|any| any.downcast_ref::<ActorRef<A>>().cloned())
    }

    /// Like `get_actor`, without waiting. Returns None while the hosted identities are being
    /// changed.
    pub(crate) fn try_get_actor<A: Actor>(&self, path: &ActorPath) -> Option<ActorRef<A>> {
        let actors = self.actors.try_read().ok()?;
        actors
            .get(path)
            .and_then(|any| any.downcast_ref::<ActorRef<A>>().cloned())
    }

    /// Paths of every hosted identity, sorted.
    pub async fn actors(&self) -> Vec<ActorPath> {
        let actors = self.actors.read().await;
        let mut paths: Vec<ActorPath> = actors.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Installs the durable reminder scheduler.
    pub async fn set_reminder_service(&self, service: Arc<dyn ReminderService>) {
        let mut reminders = self.reminders.write().await;
        *reminders = Some(service);
    }

    /// Durable reminder scheduler, if one is installed.
    pub async fn reminder_service(&self) -> Option<Arc<dyn ReminderService>> {
        self.reminders.read().await.clone()
    }

    /// Stops the system. Every live activation is deactivated.
    pub fn stop_system(&self) {
        self.token.cancel();
    }

    /// True once the system has been asked to stop.
    pub fn is_stopping(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// System runner.
pub struct SystemRunner {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl SystemRunner {
    pub(crate) fn new(token: CancellationToken, tracker: TaskTracker) -> Self {
        Self { token, tracker }
    }

    /// Runs the actor system until it is stopped and every host has finished.
    pub async fn run(&mut self) {
        debug!("Running actor system...");
        self.token.cancelled().await;
        debug!("Stopping actor system...");
        self.tracker.close();
        self.tracker.wait().await;
        debug!("Actor system stopped.");
    }
}
