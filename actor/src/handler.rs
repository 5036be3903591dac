// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Deliveries
//!
//! Everything that reaches an actor goes through its mailbox as a boxed `MessageHandler`:
//! user messages, fired reminders, timer ticks and deactivation requests. The host pulls one
//! delivery at a time and runs it to completion, which is what serializes handlers, hooks and
//! timer callbacks of one activation.
//!

use crate::{
    actor::{Actor, ActorContext},
    message::{Envelope, Reply},
    path::ActorPath,
    system::SystemRef,
    Error,
};

use async_trait::async_trait;

use tokio::sync::{
    mpsc::{self, error::SendError},
    oneshot,
};

use tracing::{debug, error};

/// Unit of work delivered through an actor mailbox.
#[async_trait]
pub trait MessageHandler<A: Actor>: Send {
    /// Runs the delivery against the active actor.
    ///
    /// # Arguments
    ///
    /// * `actor` - The activated actor instance.
    /// * `ctx` - Context of the current activation.
    ///
    async fn handle(&mut self, actor: &mut A, ctx: &mut ActorContext<A>);

    /// Whether this delivery may start a new activation.
    fn requires_activation(&self) -> bool {
        true
    }

    /// Fails the delivery without running it, e.g. when the activation could not start.
    fn reject(&mut self, error: Error);

    /// Drops the delivery because nothing is active and it may not start an activation.
    fn discard(&mut self) {}
}

/// A user message, with an optional channel to answer the caller.
struct ActorMessage {
    /// Message to dispatch; taken when handled.
    message: Option<Envelope>,
    /// Answer channel of an `ask`. `None` for `tell`.
    rsvp: Option<oneshot::Sender<Result<Reply, Error>>>,
}

impl ActorMessage {
    fn new(
        message: Envelope,
        rsvp: Option<oneshot::Sender<Result<Reply, Error>>>,
    ) -> Self {
        Self {
            message: Some(message),
            rsvp,
        }
    }
}

#[async_trait]
impl<A: Actor> MessageHandler<A> for ActorMessage {
    async fn handle(&mut self, actor: &mut A, ctx: &mut ActorContext<A>) {
        let Some(message) = self.message.take() else {
            return;
        };
        let message_type = message.type_name();
        debug!("Handling '{}' in {}.", message_type, ctx.path());

        let result = actor.on_receive(message, ctx).await;

        if let Some(rsvp) = self.rsvp.take() {
            rsvp.send(result).unwrap_or_else(|_failed| {
                error!("Failed to send back response!");
            })
        } else if let Err(error) = result {
            error!(
                "Message '{}' told to {} failed: {}",
                message_type,
                ctx.path(),
                error
            );
        }
    }

    fn reject(&mut self, error: Error) {
        match self.rsvp.take() {
            Some(rsvp) => {
                rsvp.send(Err(error)).unwrap_or_else(|_failed| {
                    error!("Failed to send back response!");
                });
            }
            None => {
                let message_type = self
                    .message
                    .as_ref()
                    .map(|message| message.type_name())
                    .unwrap_or_default();
                error!("Message '{}' was not delivered: {}", message_type, error);
            }
        }
    }
}

/// A fired reminder, answered once `on_reminder` completes.
struct ReminderMessage {
    id: String,
    rsvp: Option<oneshot::Sender<Result<(), Error>>>,
}

#[async_trait]
impl<A: Actor> MessageHandler<A> for ReminderMessage {
    async fn handle(&mut self, actor: &mut A, ctx: &mut ActorContext<A>) {
        debug!("Reminder '{}' fired for {}.", self.id, ctx.path());
        let result = actor.on_reminder(&self.id, ctx).await;
        if let Err(error) = &result {
            error!("Reminder '{}' of {} failed: {}", self.id, ctx.path(), error);
        }
        if let Some(rsvp) = self.rsvp.take() {
            rsvp.send(result).unwrap_or_else(|_failed| {
                error!("Failed to send back response!");
            })
        }
    }

    fn reject(&mut self, error: Error) {
        if let Some(rsvp) = self.rsvp.take() {
            rsvp.send(Err(error)).unwrap_or_else(|_failed| {
                error!("Failed to send back response!");
            })
        }
    }
}

/// Request to end the current activation. It travels through the mailbox, so everything sent
/// before it is handled by the activation it ends.
struct DeactivateMessage {
    rsvp: Option<oneshot::Sender<()>>,
}

impl DeactivateMessage {
    fn answer(&mut self) {
        if let Some(rsvp) = self.rsvp.take() {
            let _ = rsvp.send(());
        }
    }
}

#[async_trait]
impl<A: Actor> MessageHandler<A> for DeactivateMessage {
    async fn handle(&mut self, _actor: &mut A, ctx: &mut ActorContext<A>) {
        ctx.deactivate_on_idle();
        if let Some(rsvp) = self.rsvp.take() {
            ctx.notify_on_deactivation(rsvp);
        }
    }

    fn requires_activation(&self) -> bool {
        false
    }

    fn reject(&mut self, _error: Error) {
        self.answer();
    }

    fn discard(&mut self) {
        debug!("Nothing to deactivate.");
        self.answer();
    }
}

/// Boxed delivery, so that different kinds of work share one mailbox.
pub type BoxedMessageHandler<A> = Box<dyn MessageHandler<A>>;

/// Receiving side of a mailbox, owned by the host.
pub type MailboxReceiver<A> = mpsc::UnboundedReceiver<BoxedMessageHandler<A>>;

/// Sending side of a mailbox, shared by references and timers.
pub type MailboxSender<A> = mpsc::UnboundedSender<BoxedMessageHandler<A>>;

/// Both sides of a mailbox.
pub type Mailbox<A> = (MailboxSender<A>, MailboxReceiver<A>);

/// Creates a new unbounded mailbox.
pub fn mailbox<A>() -> Mailbox<A> {
    mpsc::unbounded_channel()
}

/// Typed sending helper wrapped by `ActorRef`.
///
/// A host is released once its identity has nothing active. Deliveries that find the mailbox
/// closed follow the identity to its current host through the system.
pub struct HandleHelper<A> {
    path: ActorPath,
    sender: MailboxSender<A>,
    system: SystemRef,
}

impl<A: Actor> HandleHelper<A> {
    pub(crate) fn new(path: ActorPath, sender: MailboxSender<A>, system: SystemRef) -> Self {
        Self {
            path,
            sender,
            system,
        }
    }

    /// Queues a message without waiting for its outcome.
    pub(crate) async fn tell(&self, message: Envelope) -> Result<(), Error> {
        debug!("Telling '{}'.", message.type_name());
        let msg = ActorMessage::new(message, None);
        self.post(Box::new(msg)).await.map(|_| ()).map_err(|error| {
            debug!("Failed to tell message! {}", error);
            error
        })
    }

    /// Queues a message and waits for the reply of its handler.
    pub(crate) async fn ask(&self, message: Envelope) -> Result<Reply, Error> {
        debug!("Asking '{}'.", message.type_name());
        let (response_sender, response_receiver) = oneshot::channel();
        let msg = ActorMessage::new(message, Some(response_sender));
        if let Err(error) = self.post(Box::new(msg)).await {
            error!("Failed to ask message! {}", error);
            return Err(error);
        }
        response_receiver
            .await
            .map_err(|error| Error::Send(error.to_string()))?
    }

    /// Queues a fired reminder and waits for `on_reminder` to complete.
    pub(crate) async fn remind(&self, id: &str) -> Result<(), Error> {
        let (response_sender, response_receiver) = oneshot::channel();
        let msg = ReminderMessage {
            id: id.to_owned(),
            rsvp: Some(response_sender),
        };
        if let Err(error) = self.post(Box::new(msg)).await {
            error!("Failed to deliver reminder! {}", error);
            return Err(error);
        }
        response_receiver
            .await
            .map_err(|error| Error::Send(error.to_string()))?
    }

    /// Queues a deactivation request behind every delivery sent before it and waits until the
    /// activation has ended.
    pub(crate) async fn deactivate(&self) -> Result<(), Error> {
        let (response_sender, response_receiver) = oneshot::channel();
        let msg = DeactivateMessage {
            rsvp: Some(response_sender),
        };
        if !self.post(Box::new(msg)).await? {
            return Ok(());
        }
        response_receiver
            .await
            .map_err(|error| Error::Send(error.to_string()))
    }

    /// Queues a delivery in the mailbox of the identity's current host.
    ///
    /// Returns false when there is no host and the delivery may not start one.
    async fn post(&self, delivery: BoxedMessageHandler<A>) -> Result<bool, Error> {
        let Err(SendError(mut delivery)) = self.sender.send(delivery) else {
            return Ok(true);
        };
        loop {
            if self.system.is_stopping() {
                return Err(Error::Send(format!(
                    "actor system is stopping, cannot reach {}",
                    self.path
                )));
            }
            let current = if delivery.requires_activation() {
                self.system.actor_of::<A>(self.path.id()).await?
            } else {
                match self.system.get_actor::<A>(&self.path).await {
                    Some(current) => current,
                    None => return Ok(false),
                }
            };
            delivery = match current.helper().send(delivery) {
                Ok(()) => return Ok(true),
                Err(delivery) => delivery,
            };
            tokio::task::yield_now().await;
        }
    }

    /// Queues a delivery in this host's mailbox, handing it back if the host is gone.
    pub(crate) fn send(
        &self,
        delivery: BoxedMessageHandler<A>,
    ) -> Result<(), BoxedMessageHandler<A>> {
        self.sender.send(delivery).map_err(|SendError(delivery)| delivery)
    }

    /// Checks if this host stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// System the identity lives in.
    pub(crate) fn system(&self) -> &SystemRef {
        &self.system
    }
}

impl<A> Clone for HandleHelper<A> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            sender: self.sender.clone(),
            system: self.system.clone(),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::{message::Message, system::SystemConfig};

    use tokio_util::sync::CancellationToken;

    struct Silent;

    impl Actor for Silent {
        fn kind() -> &'static str {
            "silent"
        }
    }

    #[derive(Debug)]
    struct Ping;

    impl Message for Ping {}

    fn helper(sender: MailboxSender<Silent>) -> (HandleHelper<Silent>, SystemRef) {
        let system = SystemRef::new(SystemConfig::default(), CancellationToken::new());
        let path = ActorPath::new("silent", "s-1").unwrap();
        (HandleHelper::new(path, sender, system.clone()), system)
    }

    #[test]
    fn test_mailbox() {
        let (sender, receiver) = mailbox::<Silent>();
        assert!(!sender.is_closed());
        assert!(!receiver.is_closed());
    }

    #[tokio::test]
    async fn test_rejected_ask_answers_caller() {
        let (sender, mut receiver) = mailbox::<Silent>();
        let (helper, _system) = helper(sender);

        let asking = tokio::spawn(async move { helper.ask(Envelope::new(Ping)).await });
        let mut delivery = receiver.recv().await.unwrap();
        assert!(delivery.requires_activation());
        delivery.reject(Error::Functional("boom".to_owned()));

        let result = asking.await.unwrap();
        assert_eq!(result.unwrap_err(), Error::Functional("boom".to_owned()));
    }

    #[tokio::test]
    async fn test_discarded_deactivation_answers_caller() {
        let (sender, mut receiver) = mailbox::<Silent>();
        let (helper, _system) = helper(sender);

        let deactivating = tokio::spawn(async move { helper.deactivate().await });
        let mut delivery = receiver.recv().await.unwrap();
        assert!(!delivery.requires_activation());
        delivery.discard();

        assert!(deactivating.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_closed_mailbox() {
        let (sender, receiver) = mailbox::<Silent>();
        let (helper, system) = helper(sender);
        drop(receiver);
        assert!(helper.is_closed());

        assert_eq!(
            helper.tell(Envelope::new(Ping)).await.unwrap_err(),
            Error::UnknownKind("silent".to_owned())
        );
        assert!(helper.deactivate().await.is_ok());

        system.stop_system();
        assert!(matches!(
            helper.tell(Envelope::new(Ping)).await,
            Err(Error::Send(_))
        ));
        assert!(matches!(helper.remind("daily").await, Err(Error::Send(_))));
    }
}
