// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor path
//!
//! The `path` module provides the `ActorPath` type, the identity of a virtual actor.
//!

use crate::{actor::Actor, Error};

use serde::{Deserialize, Serialize};

use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

/// Identity of a virtual actor: its kind plus an id unique within the kind.
///
/// The identity outlives activations. Every activation of `counter/42` has the same path, and
/// references built from it stay valid while the actor is deactivated.
///
/// ```ignore
/// let path = ActorPath::new("counter", "42")?;
/// assert_eq!(path.to_string(), "counter/42");
/// assert_eq!("counter/42".parse::<ActorPath>()?, path);
/// ```
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorPath {
    kind: String,
    id: String,
}

impl ActorPath {
    /// Builds a path, validating both parts.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPath` if the kind is blank or contains `/`, or if the id is blank.
    ///
    pub fn new(kind: &str, id: &str) -> Result<Self, Error> {
        if kind.trim().is_empty() || kind.contains('/') {
            return Err(Error::InvalidPath(format!(
                "actor kind '{}' must be non-blank and must not contain '/'",
                kind
            )));
        }
        if id.trim().is_empty() {
            return Err(Error::InvalidPath(format!(
                "actor id of kind '{}' must not be blank",
                kind
            )));
        }
        Ok(Self {
            kind: kind.to_owned(),
            id: id.to_owned(),
        })
    }

    /// Path of the actor of kind `A` with the given id.
    pub fn of<A: Actor>(id: &str) -> Result<Self, Error> {
        Self::new(A::kind(), id)
    }

    /// Kind part.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Id part.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl FromStr for ActorPath {
    type Err = Error;

    /// Parses `kind/id`. The id may itself contain `/`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_start_matches('/');
        match trimmed.split_once('/') {
            Some((kind, id)) => Self::new(kind, id),
            None => Err(Error::InvalidPath(format!(
                "'{}' is not of the form kind/id",
                s
            ))),
        }
    }
}

impl Display for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

impl Debug for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}
