// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! The `actor` module provides the `Actor` trait, the `ActorContext` handed to every handler,
//! hook and timer callback, and the `ActorRef` used to reach an actor from the outside.
//!
//! An actor kind declares its handlers once, in `Actor::define`. Every activation of that kind
//! shares the resulting `Prototype`; the context of an activation carries its identity, the
//! shared prototype, its timers and a lazily resolved reference to itself.
//!

use crate::{
    handler::HandleHelper,
    message::{Envelope, Message, Query, Reply},
    path::ActorPath,
    prototype::Prototype,
    system::SystemRef,
    table::HandlerTable,
    timer::TimerService,
    Error,
};

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};
use tracing::debug;

use std::any::type_name;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Execution context of one activation.
///
/// The context is created when the hosting runtime activates an identity and dropped when the
/// activation ends. Everything an actor needs besides its own state lives here: its path, the
/// shared prototype of its kind, its timers, the system and a cached reference to itself.
///
/// # Thread Safety
///
/// A context is only ever borrowed by the single delivery running for its activation, so it
/// needs no synchronization of its own.
pub struct ActorContext<A: Actor> {
    /// Identity of the activation.
    path: ActorPath,
    /// System hosting the actor.
    system: SystemRef,
    /// Handlers of the actor kind, shared by every activation.
    prototype: Arc<Prototype<A>>,
    /// Timers of this activation.
    timers: TimerService<A>,
    /// Self reference, resolved on first use.
    myself: Option<ActorRef<A>>,
    /// Set when the actor asked to be deactivated after the current delivery.
    deactivate: bool,
    /// Callers waiting for this activation to end.
    deactivation_waiters: Vec<oneshot::Sender<()>>,
}

impl<A: Actor> ActorContext<A> {
    /// Binds identity and services for a new activation.
    pub(crate) fn new(
        path: ActorPath,
        system: SystemRef,
        prototype: Arc<Prototype<A>>,
        timers: TimerService<A>,
    ) -> Self {
        Self {
            path,
            system,
            prototype,
            timers,
            myself: None,
            deactivate: false,
            deactivation_waiters: Vec::new(),
        }
    }

    /// Identity of this actor.
    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    /// Id part of the identity.
    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// System hosting this actor.
    pub fn system(&self) -> &SystemRef {
        &self.system
    }

    /// Prototype shared by every activation of this kind.
    pub fn prototype(&self) -> &Arc<Prototype<A>> {
        &self.prototype
    }

    /// Timers registered by this activation.
    pub fn timers(&self) -> &TimerService<A> {
        &self.timers
    }

    /// Mutable access to the timers of this activation.
    pub fn timers_mut(&mut self) -> &mut TimerService<A> {
        &mut self.timers
    }

    /// Reference to this actor.
    ///
    /// The reference is resolved through the system from the kind and id of this actor on the
    /// first call and cached for the rest of the activation.
    pub async fn reference(&mut self) -> Result<ActorRef<A>, Error> {
        if let Some(myself) = &self.myself {
            return Ok(myself.clone());
        }
        debug!("Resolving self reference of {}.", &self.path);
        let myself = self.system.actor_of::<A>(self.path.id()).await?;
        self.myself = Some(myself.clone());
        Ok(myself)
    }

    /// True once the self reference has been resolved in this activation.
    pub fn has_reference(&self) -> bool {
        self.myself.is_some()
    }

    /// Asks the runtime to deactivate this actor as soon as the current delivery completes.
    pub fn deactivate_on_idle(&mut self) {
        debug!("Actor {} requested deactivation.", &self.path);
        self.deactivate = true;
    }

    pub(crate) fn is_deactivation_requested(&self) -> bool {
        self.deactivate
    }

    /// Answers `waiter` once this activation has ended.
    pub(crate) fn notify_on_deactivation(&mut self, waiter: oneshot::Sender<()>) {
        self.deactivation_waiters.push(waiter);
    }

    pub(crate) fn take_deactivation_waiters(&mut self) -> Vec<oneshot::Sender<()>> {
        std::mem::take(&mut self.deactivation_waiters)
    }

    /// Dispatches a message to a synchronous void handler of this actor.
    pub fn dispatch<M: Message>(
        &mut self,
        actor: &mut A,
        message: M,
    ) -> Result<(), Error> {
        let prototype = Arc::clone(&self.prototype);
        prototype.dispatch(actor, Envelope::new(message), self)
    }

    /// Dispatches a message to a synchronous value-returning handler and converts the result.
    pub fn dispatch_result<M, R>(
        &mut self,
        actor: &mut A,
        message: M,
    ) -> Result<R, Error>
    where
        M: Message,
        R: Send + 'static,
    {
        let prototype = Arc::clone(&self.prototype);
        prototype
            .dispatch_result(actor, Envelope::new(message), self)?
            .downcast()
    }

    /// Dispatches a message to a handler of any shape.
    pub async fn dispatch_async<M: Message>(
        &mut self,
        actor: &mut A,
        message: M,
    ) -> Result<Reply, Error> {
        let prototype = Arc::clone(&self.prototype);
        prototype
            .dispatch_async(actor, Envelope::new(message), self)
            .await
    }

    /// Registers a durable reminder for this actor with the system's reminder service.
    pub async fn register_reminder(
        &self,
        name: &str,
        due: Duration,
        period: Duration,
    ) -> Result<(), Error> {
        let service = self.system.reminder_service().await.ok_or_else(|| {
            Error::Functional("No reminder service configured.".to_owned())
        })?;
        service.register(&self.path, name, due, period).await
    }

    /// Removes a durable reminder of this actor.
    pub async fn unregister_reminder(&self, name: &str) -> Result<(), Error> {
        let service = self.system.reminder_service().await.ok_or_else(|| {
            Error::Functional("No reminder service configured.".to_owned())
        })?;
        service.unregister(&self.path, name).await
    }

    /// Context outside of any runtime, for exercising handlers directly.
    #[cfg(test)]
    pub(crate) fn detached(id: &str) -> Self {
        use tokio_util::sync::CancellationToken;

        let path = ActorPath::new(A::kind(), id).unwrap();
        let prototype = Arc::new(Prototype::<A>::define().unwrap());
        let system = SystemRef::new(
            crate::system::SystemConfig::default(),
            CancellationToken::new(),
        );
        let (sender, _) = crate::handler::mailbox::<A>();
        let timers = TimerService::new(path.clone(), sender, Default::default());
        Self::new(path, system, prototype, timers)
    }
}

/// Lifecycle of an actor activation.
///
/// ```text
/// Uninitialized ──► Activating ──► Active ──► Deactivating ──► Deactivated
///       ▲               │                                          │
///       └── failure ────┘                  next delivery ──► Activating
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    /// No activation exists yet, or the last attempt failed.
    #[default]
    Uninitialized,
    /// `on_activate` is running.
    Activating,
    /// Messages, reminders and timer callbacks are being delivered.
    Active,
    /// `on_deactivate` is running.
    Deactivating,
    /// The activation has ended; the next delivery starts a new one.
    Deactivated,
}

impl ActivationState {
    /// True if deliveries are processed in this state.
    pub fn is_active(&self) -> bool {
        matches!(self, ActivationState::Active)
    }

    /// Checks a transition against the lifecycle.
    pub fn can_transition_to(&self, next: ActivationState) -> bool {
        matches!(
            (self, next),
            (ActivationState::Uninitialized, ActivationState::Activating)
                | (ActivationState::Activating, ActivationState::Active)
                | (ActivationState::Activating, ActivationState::Uninitialized)
                | (ActivationState::Active, ActivationState::Deactivating)
                | (ActivationState::Deactivating, ActivationState::Deactivated)
                | (ActivationState::Deactivated, ActivationState::Activating)
        )
    }
}

impl Display for ActivationState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ActivationState::Uninitialized => write!(f, "uninitialized"),
            ActivationState::Activating => write!(f, "activating"),
            ActivationState::Active => write!(f, "active"),
            ActivationState::Deactivating => write!(f, "deactivating"),
            ActivationState::Deactivated => write!(f, "deactivated"),
        }
    }
}

/// Behaviour of an actor kind.
///
/// Handlers are not discovered: each kind registers them explicitly in `define`, which runs
/// once per kind and per system. Lifecycle hooks have defaults, except that `on_reminder` fails
/// loudly unless overridden.
///
/// # Examples
///
/// ```ignore
/// struct Counter {
///     value: u64,
/// }
///
/// #[derive(Debug)]
/// struct Add(u64);
///
/// impl Message for Add {}
///
/// #[derive(Debug)]
/// struct Total;
///
/// impl Message for Total {}
///
/// impl Query for Total {
///     type Result = u64;
/// }
///
/// #[async_trait]
/// impl Actor for Counter {
///     fn kind() -> &'static str {
///         "counter"
///     }
///
///     fn define(table: &mut HandlerTable<Self>) -> Result<(), Error> {
///         table
///             .on(|counter: &mut Counter, msg: Add, _ctx| {
///                 counter.value += msg.0;
///                 Ok(())
///             })?
///             .on_query(|counter: &mut Counter, _msg: Total, _ctx| Ok(counter.value))?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Actor: Send + Sized + 'static {
    /// Name of the actor kind, used in identities and diagnostics.
    fn kind() -> &'static str {
        type_name::<Self>()
    }

    /// Registers the handlers of this kind.
    ///
    /// Registering two handlers for the same message type fails with
    /// `Error::DuplicateHandler`, which aborts the definition of the kind.
    fn define(_table: &mut HandlerTable<Self>) -> Result<(), Error> {
        Ok(())
    }

    /// Called before the first delivery of an activation.
    ///
    /// Returning an error aborts the activation; the delivery that triggered it fails with that
    /// error and the next delivery tries again with a fresh instance.
    async fn on_activate(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called when the activation ends. Errors are logged and do not prevent deactivation.
    async fn on_deactivate(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called when a durable reminder fires.
    async fn on_reminder(
        &mut self,
        id: &str,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Err(Error::NotImplemented(format!(
            "Override on_reminder() in actor kind '{}' to handle reminder '{}'.",
            Self::kind(),
            id
        )))
    }

    /// Entry point for every message delivered to the actor.
    ///
    /// The default routes the message through the prototype of the kind.
    async fn on_receive(
        &mut self,
        message: Envelope,
        ctx: &mut ActorContext<Self>,
    ) -> Result<Reply, Error> {
        let prototype = Arc::clone(ctx.prototype());
        prototype.dispatch_async(self, message, ctx).await
    }
}

/// A reference to an actor identity.
///
/// References are cheap to clone and stay valid across activations: a message sent after the
/// actor was deactivated starts a new activation of the same identity, in a new host if the
/// previous one was released.
pub struct ActorRef<A: Actor> {
    /// Identity of the target actor.
    path: ActorPath,
    /// Mailbox of the host.
    sender: HandleHelper<A>,
    /// Lifecycle published by the host.
    state: watch::Receiver<ActivationState>,
}

impl<A: Actor> ActorRef<A> {
    pub(crate) fn new(
        path: ActorPath,
        sender: HandleHelper<A>,
        state: watch::Receiver<ActivationState>,
    ) -> Self {
        Self {
            path,
            sender,
            state,
        }
    }

    pub(crate) fn helper(&self) -> &HandleHelper<A> {
        &self.sender
    }

    /// Reference of the host that replaced a released one.
    fn rehosted(&self) -> Option<ActorRef<A>> {
        if !self.sender.is_closed() {
            return None;
        }
        self.sender
            .system()
            .try_get_actor::<A>(&self.path)
            .filter(|current| !current.sender.is_closed())
    }

    /// Sends a message without waiting for its outcome.
    ///
    /// Routing and handler failures of told messages are logged by the host.
    pub async fn tell<M: Message>(&self, message: M) -> Result<(), Error> {
        self.sender.tell(Envelope::new(message)).await
    }

    /// Sends a message and waits for the handler's result.
    ///
    /// Void handlers answer `()`. Asking for any other type than the one the handler returns
    /// fails with `Error::UnexpectedType`.
    pub async fn ask<M, R>(&self, message: M) -> Result<R, Error>
    where
        M: Message,
        R: Send + 'static,
    {
        self.request(Envelope::new(message)).await?.downcast()
    }

    /// Sends a query and waits for its typed result.
    pub async fn ask_query<Q: Query>(&self, query: Q) -> Result<Q::Result, Error> {
        self.ask::<Q, Q::Result>(query).await
    }

    /// Sends an already erased message and waits for the raw reply.
    pub async fn request(&self, message: Envelope) -> Result<Reply, Error> {
        self.sender.ask(message).await
    }

    /// Delivers a fired reminder and waits for the `on_reminder` hook to complete.
    pub async fn remind(&self, id: &str) -> Result<(), Error> {
        self.sender.remind(id).await
    }

    /// Deactivates the current activation, if any, and waits until it is done.
    ///
    /// The request is queued like a message: everything sent before it through this reference
    /// is handled by the activation it ends.
    pub async fn deactivate(&self) -> Result<(), Error> {
        self.sender.deactivate().await
    }

    /// Current lifecycle state of the identity.
    pub fn state(&self) -> ActivationState {
        match self.rehosted() {
            Some(current) => current.state(),
            None => *self.state.borrow(),
        }
    }

    /// Waits until the identity reaches the given state.
    pub async fn wait_for(&self, state: ActivationState) -> Result<(), Error> {
        let mut receiver = match self.rehosted() {
            Some(current) => current.state.clone(),
            None => self.state.clone(),
        };
        receiver
            .wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|error| Error::Send(error.to_string()))
    }

    /// Identity of the target actor.
    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    /// True once the system stopped and the host no longer accepts messages.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed() && self.sender.system().is_stopping()
    }
}

impl<A: Actor> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            sender: self.sender.clone(),
            state: self.state.clone(),
        }
    }
}

impl<A: Actor> std::fmt::Debug for ActorRef<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[derive(Debug, Default)]
    struct Greeter {
        greeted: usize,
    }

    #[derive(Debug)]
    struct Greet(String);

    impl Message for Greet {}

    #[async_trait]
    impl Actor for Greeter {
        fn kind() -> &'static str {
            "greeter"
        }

        fn define(table: &mut HandlerTable<Self>) -> Result<(), Error> {
            table.on_result(|greeter: &mut Greeter, msg: Greet, _ctx| {
                greeter.greeted += 1;
                Ok(format!("hello {}", msg.0))
            })?;
            Ok(())
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        use ActivationState::*;

        assert!(Uninitialized.can_transition_to(Activating));
        assert!(Activating.can_transition_to(Active));
        assert!(Activating.can_transition_to(Uninitialized));
        assert!(Active.can_transition_to(Deactivating));
        assert!(Deactivating.can_transition_to(Deactivated));
        assert!(Deactivated.can_transition_to(Activating));

        assert!(!Uninitialized.can_transition_to(Active));
        assert!(!Active.can_transition_to(Activating));
        assert!(!Deactivating.can_transition_to(Active));
        assert!(!Deactivated.can_transition_to(Active));

        assert!(Active.is_active());
        assert!(!Deactivating.is_active());
        assert_eq!(ActivationState::default(), Uninitialized);
        assert_eq!(Deactivating.to_string(), "deactivating");
    }

    #[tokio::test]
    async fn test_default_reminder_hook_fails_loudly() {
        let mut actor = Greeter::default();
        let mut ctx = ActorContext::<Greeter>::detached("g-1");
        let error = actor.on_reminder("daily", &mut ctx).await.unwrap_err();
        match error {
            Error::NotImplemented(message) => {
                assert!(message.contains("on_reminder()"));
                assert!(message.contains("greeter"));
                assert!(message.contains("daily"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_default_receive_dispatches() {
        let mut actor = Greeter::default();
        let mut ctx = ActorContext::<Greeter>::detached("g-1");
        let reply = actor
            .on_receive(Envelope::new(Greet("bob".to_owned())), &mut ctx)
            .await
            .unwrap();
        assert_eq!(reply.downcast::<String>().unwrap(), "hello bob");
        assert_eq!(actor.greeted, 1);
    }

    #[tokio::test]
    async fn test_context_dispatch_helpers() {
        let mut actor = Greeter::default();
        let mut ctx = ActorContext::<Greeter>::detached("g-2");
        assert_eq!(ctx.id(), "g-2");
        assert_eq!(ctx.path().kind(), "greeter");

        let greeting: String = ctx
            .dispatch_result(&mut actor, Greet("ann".to_owned()))
            .unwrap();
        assert_eq!(greeting, "hello ann");

        let error = ctx.dispatch(&mut actor, Greet("ann".to_owned())).unwrap_err();
        assert!(matches!(error, Error::InvalidHandlerShape { .. }));
        assert_eq!(actor.greeted, 1);

        let reply = ctx
            .dispatch_async(&mut actor, Greet("joe".to_owned()))
            .await
            .unwrap();
        assert_eq!(reply.downcast::<String>().unwrap(), "hello joe");
    }

    #[tokio::test]
    async fn test_deactivate_on_idle_flag() {
        let mut ctx = ActorContext::<Greeter>::detached("g-3");
        assert!(!ctx.is_deactivation_requested());
        ctx.deactivate_on_idle();
        assert!(ctx.is_deactivation_requested());
        assert!(!ctx.has_reference());
    }
}
