// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!
//! A single error type is shared by the dispatch layer and by handler bodies. The dispatch layer
//! only ever raises its own routing and shape variants; whatever a handler or lifecycle hook
//! returns travels back to the caller by value.
//!

use crate::table::HandlerShape;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the actor system.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// An error occurred while sending a message to an actor.
    #[error("An error occurred while sending a message to actor: {0}.")]
    Send(String),
    /// Two handlers claim the same message type in one actor kind.
    #[error("Actor kind '{actor}' already has a handler for message type '{message}'.")]
    DuplicateHandler {
        /// Actor kind being defined.
        actor: String,
        /// Message type registered twice.
        message: String,
    },
    /// No handler matches the runtime type of the message.
    #[error("Actor kind '{actor}' has no handler for message type '{message}'.")]
    NoHandler {
        /// Actor kind that received the message.
        actor: String,
        /// Runtime type of the message.
        message: String,
    },
    /// The dispatch entry point does not fit the shape of the resolved handler.
    #[error(
        "Handler for '{message}' in actor kind '{actor}' is {found}, but the dispatch expected {expected}."
    )]
    InvalidHandlerShape {
        /// Actor kind that received the message.
        actor: String,
        /// Runtime type of the message.
        message: String,
        /// Shape the caller asked for.
        expected: HandlerShape,
        /// Shape that is actually registered.
        found: HandlerShape,
    },
    /// A hook that must be overridden was called on its default implementation.
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    /// A payload or reply could not be converted to the requested type.
    #[error("Expected a value of type '{expected}', found '{found}'.")]
    UnexpectedType {
        /// Requested type.
        expected: String,
        /// Type actually carried.
        found: String,
    },
    /// The actor identity is not valid.
    #[error("Invalid actor path: {0}")]
    InvalidPath(String),
    /// The timer registration is not valid.
    #[error("Invalid timer: {0}")]
    InvalidTimer(String),
    /// The actor kind has not been registered in the system.
    #[error("Actor kind '{0}' is not registered.")]
    UnknownKind(String),
    /// Error that does not compromise the operation of the system.
    #[error("Error: {0}")]
    Functional(String),
}
