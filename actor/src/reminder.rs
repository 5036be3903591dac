// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Reminders
//!
//! Reminders are durable, scheduled wake-ups that survive deactivation. Scheduling and storage
//! live outside this crate behind `ReminderService`; when a reminder is due the service delivers
//! it with `ActorRef::remind`, which activates the actor if needed and runs `on_reminder`.
//!

use crate::{path::ActorPath, Error};

use async_trait::async_trait;

use std::time::Duration;

/// Boundary to a durable reminder scheduler.
#[async_trait]
pub trait ReminderService: Send + Sync + 'static {
    /// Schedules reminder `name` for the actor at `path`, first after `due` and then every
    /// `period`. Registering an existing name replaces its schedule.
    async fn register(
        &self,
        path: &ActorPath,
        name: &str,
        due: Duration,
        period: Duration,
    ) -> Result<(), Error>;

    /// Cancels reminder `name` of the actor at `path`.
    async fn unregister(&self, path: &ActorPath, name: &str) -> Result<(), Error>;
}
