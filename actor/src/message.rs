// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Messages
//!
//! Messages carry no identity beyond their runtime type. The `Envelope` erases a message while
//! remembering its exact `TypeId` and type name, which is all the handler table needs to route
//! it. `Reply` is the uniform result of a dispatch: either the `Empty` sentinel produced by void
//! handlers or a type-erased value.
//!

use crate::Error;

use std::any::{type_name, Any, TypeId};
use std::fmt::{self, Debug, Formatter};

/// Type-erased value produced by a value-returning handler.
///
/// The name of the erased type is kept so that a failed conversion can report it.
pub struct AnyValue {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl AnyValue {
    /// Erases a value.
    pub fn new<R: Send + 'static>(value: R) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<R>(),
        }
    }

    /// Name of the erased type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Recovers the value.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnexpectedType`, naming both types, if the value is not an `R`.
    pub fn downcast<R: Send + 'static>(self) -> Result<R, Error> {
        let found = self.type_name;
        self.value
            .downcast::<R>()
            .map(|value| *value)
            .map_err(|_| Error::UnexpectedType {
                expected: type_name::<R>().to_owned(),
                found: found.to_owned(),
            })
    }
}

impl Debug for AnyValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyValue")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Marker trait for types that can be delivered to an actor.
///
/// Routing is done on the exact runtime type, so two distinct types never share a handler even
/// when one wraps the other.
///
/// ```ignore
/// #[derive(Debug, Clone)]
/// struct Deposit(u64);
///
/// impl Message for Deposit {}
/// ```
pub trait Message: Send + 'static {}

/// A message that binds the type of its answer.
///
/// Handlers registered with `on_query` must return exactly `Self::Result`, and callers using
/// `ActorRef::ask_query` get that type back without naming it.
pub trait Query: Message {
    /// Type answered by the query handler.
    type Result: Send + 'static;
}

/// A message whose concrete type has been erased for transport through a mailbox.
pub struct Envelope {
    type_id: TypeId,
    type_name: &'static str,
    payload: Box<dyn Any + Send>,
}

impl Envelope {
    /// Wraps a message, recording its exact runtime type.
    pub fn new<M: Message>(message: M) -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            type_name: type_name::<M>(),
            payload: Box::new(message),
        }
    }

    /// `TypeId` of the wrapped message.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the wrapped message type, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// True if the wrapped message is exactly of type `M`.
    pub fn is<M: Message>(&self) -> bool {
        self.type_id == TypeId::of::<M>()
    }

    /// Recovers the wrapped message.
    pub fn downcast<M: Message>(self) -> Result<M, Error> {
        let found = self.type_name;
        self.payload
            .downcast::<M>()
            .map(|message| *message)
            .map_err(|_| Error::UnexpectedType {
                expected: type_name::<M>().to_owned(),
                found: found.to_owned(),
            })
    }
}

impl Debug for Envelope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Result of dispatching a message, normalized across handler shapes.
pub enum Reply {
    /// The handler returns nothing.
    Empty,
    /// The handler returned a value.
    Value(AnyValue),
}

impl Reply {
    /// True for the `Empty` sentinel.
    pub fn is_empty(&self) -> bool {
        matches!(self, Reply::Empty)
    }

    /// Converts the reply into the expected type.
    ///
    /// `Empty` converts only into `()`, so asking a void handler for a unit answer works while
    /// asking it for anything else fails with `Error::UnexpectedType`.
    pub fn downcast<R: Send + 'static>(self) -> Result<R, Error> {
        match self {
            Reply::Empty => AnyValue::new(()).downcast(),
            Reply::Value(value) => value.downcast(),
        }
    }
}

impl Debug for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Empty => write!(f, "Reply::Empty"),
            Reply::Value(value) => write!(f, "Reply::Value({})", value.type_name()),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(u32);

    impl Message for Ping {}

    #[derive(Debug, Clone, PartialEq)]
    struct Pong;

    impl Message for Pong {}

    #[test]
    fn test_envelope_keeps_exact_type() {
        let envelope = Envelope::new(Ping(7));
        assert!(envelope.is::<Ping>());
        assert!(!envelope.is::<Pong>());
        assert_eq!(envelope.type_id(), TypeId::of::<Ping>());
        assert!(envelope.type_name().ends_with("Ping"));
        assert_eq!(envelope.downcast::<Ping>().unwrap(), Ping(7));
    }

    #[test]
    fn test_envelope_wrong_downcast() {
        let error = Envelope::new(Ping(1)).downcast::<Pong>().unwrap_err();
        match error {
            Error::UnexpectedType { expected, found } => {
                assert!(expected.ends_with("Pong"));
                assert!(found.ends_with("Ping"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_reply_downcast() {
        let reply = Reply::Value(AnyValue::new(42_i32));
        assert!(!reply.is_empty());
        assert_eq!(reply.downcast::<i32>().unwrap(), 42);

        let reply = Reply::Value(AnyValue::new(42_i32));
        assert_eq!(format!("{:?}", reply), "Reply::Value(i32)");
        assert_eq!(
            reply.downcast::<String>().unwrap_err(),
            Error::UnexpectedType {
                expected: type_name::<String>().to_owned(),
                found: "i32".to_owned(),
            }
        );
    }

    #[test]
    fn test_empty_reply_is_unit() {
        assert!(Reply::Empty.is_empty());
        assert_eq!(Reply::Empty.downcast::<()>().unwrap(), ());
        assert_eq!(
            Reply::Empty.downcast::<u64>().unwrap_err(),
            Error::UnexpectedType {
                expected: "u64".to_owned(),
                found: "()".to_owned(),
            }
        );
    }
}
