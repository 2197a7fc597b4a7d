//! User-facing surface of the embedding application.
//!
//! The provisioner never talks to the user directly. Confirmation prompts,
//! blocking notices and process termination are delegated to a [`Host`],
//! which the mobile shell implements with native dialogs and the CLI with
//! the terminal.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::FatalReason;

/// Prompt shown before walking the user through securing the device.
pub const SECURE_DEVICE_PROMPT: &str =
    "In order to use this app, your device must have a secure lock screen. Press OK to setup your device.";

/// Dialogs and lifecycle control offered by the embedding application.
#[async_trait]
pub trait Host: Send + Sync {
    /// Asks the user to confirm `message`. Returns `true` on consent.
    async fn confirm(&self, message: &str) -> bool;

    /// Shows a blocking notice and returns once the user dismissed it.
    async fn alert(&self, message: &str);

    /// Terminates the application because of `reason`.
    ///
    /// Production hosts exit the process and never return. Hosts that do
    /// return (tests, embedders that tear down on their own) still get an
    /// `Err(ProvisioningError::Terminated)` from the acquisition, never a key.
    fn terminate(&self, reason: FatalReason);
}

/// Presents the notice attached to `reason`, if any, then terminates.
pub(crate) async fn fail_closed(host: &dyn Host, reason: FatalReason) {
    log::error!("local storage key unavailable, terminating: {reason}");
    if let Some(notice) = reason.notice() {
        host.alert(notice).await;
    }
    host.terminate(reason);
}

/// Scripted [`Host`] for tests.
///
/// Answers confirmations from a queue (declining once it runs dry) and
/// records every prompt, notice and termination instead of acting on them.
#[derive(Debug, Default)]
pub struct ScriptedHost {
    state: Mutex<ScriptedHostState>,
}

#[derive(Debug, Default)]
struct ScriptedHostState {
    answers: VecDeque<bool>,
    prompts: Vec<String>,
    alerts: Vec<String>,
    terminations: Vec<FatalReason>,
}

impl ScriptedHost {
    /// Creates a host that declines every confirmation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a host that answers confirmations with `answers`, in order.
    #[must_use]
    pub fn answering(answers: impl IntoIterator<Item = bool>) -> Self {
        let host = Self::new();
        host.state().answers.extend(answers);
        host
    }

    fn state(&self) -> MutexGuard<'_, ScriptedHostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Confirmation prompts shown so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.state().prompts.clone()
    }

    /// Blocking notices shown so far.
    #[must_use]
    pub fn alerts(&self) -> Vec<String> {
        self.state().alerts.clone()
    }

    /// Termination requests received so far.
    #[must_use]
    pub fn terminations(&self) -> Vec<FatalReason> {
        self.state().terminations.clone()
    }
}

#[async_trait]
impl Host for ScriptedHost {
    async fn confirm(&self, message: &str) -> bool {
        let mut state = self.state();
        state.prompts.push(message.to_string());
        state.answers.pop_front().unwrap_or(false)
    }

    async fn alert(&self, message: &str) {
        self.state().alerts.push(message.to_string());
    }

    fn terminate(&self, reason: FatalReason) {
        self.state().terminations.push(reason);
    }
}
