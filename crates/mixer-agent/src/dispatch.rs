//! Dispatch orchestration: resolve, inject, settle, click, poll.
//!
//! Every failure ends up as an [`Outcome`]; nothing escapes a dispatch as an
//! error. At most one dispatch runs per (target, tab).

use crate::catalog::{Catalog, Role, TargetSpec};
use crate::inject::inject;
use crate::page::PageDriver;
use crate::poll::Poller;
use crate::resolve::{any_present, first_match, resolve, resolve_send};
use crate::tuning::Tuning;
use crate::{Error, Result, Target};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Browser-assigned tab identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Knows which tabs still exist.
#[async_trait(?Send)]
pub trait TabProvider {
    async fn is_alive(&self, tab: &TabId) -> Result<bool>;
}

/// Why a dispatch failed. Messages are shown to users as is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Tab {tab} no longer exists. Please open the {target} website.")]
    TabUnavailable { target: Target, tab: TabId },

    #[error("Permission denied for {target}. The page cannot be scripted: {message}")]
    AccessDenied { target: Target, message: String },

    #[error("Could not find the {role} on the {target} website. Please make sure you're on the chat interface.")]
    ElementNotFound { target: Target, role: Role },

    #[error("The send button on {target} is disabled or gone after entering the question.")]
    SendUnavailable { target: Target },

    #[error("Could not enter the question on {target}: {message}")]
    InjectionFailed { target: Target, message: String },

    #[error("Timeout waiting for response from {target}. The service might be unresponsive or the selectors need updating.")]
    Timeout { target: Target },

    #[error("A question is already in progress on {target} in this tab.")]
    Busy { target: Target },

    #[error("Error communicating with {target}: {message}")]
    Page { target: Target, message: String },
}

impl DispatchError {
    /// Classify a page error raised while working on `tab`.
    pub fn from_page(target: Target, tab: &TabId, err: Error) -> Self {
        match err {
            Error::TabClosed(_) => DispatchError::TabUnavailable {
                target,
                tab: tab.clone(),
            },
            Error::AccessDenied(message) => DispatchError::AccessDenied { target, message },
            other => DispatchError::Page {
                target,
                message: other.to_string(),
            },
        }
    }

    pub fn target(&self) -> Target {
        match self {
            DispatchError::TabUnavailable { target, .. }
            | DispatchError::AccessDenied { target, .. }
            | DispatchError::ElementNotFound { target, .. }
            | DispatchError::SendUnavailable { target }
            | DispatchError::InjectionFailed { target, .. }
            | DispatchError::Timeout { target }
            | DispatchError::Busy { target }
            | DispatchError::Page { target, .. } => *target,
        }
    }
}

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    /// Timed out; the text is the last non-trivial sample.
    PartialOnTimeout(String),
    Failure(DispatchError),
}

impl Outcome {
    /// Short status label: `success`, `partial` or `failure`.
    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::PartialOnTimeout(_) => "partial",
            Outcome::Failure(_) => "failure",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// Text to show for this outcome.
    pub fn response_text(&self) -> String {
        match self {
            Outcome::Success(text) | Outcome::PartialOnTimeout(text) => text.clone(),
            Outcome::Failure(err) => format!("Error: {}", err),
        }
    }
}

/// Message on the result channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub target: Target,
    pub kind: UpdateKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    /// Text seen while the reply is still changing.
    Partial { text: String },
    /// The dispatch is over. Sent exactly once per dispatch.
    Final { outcome: Outcome },
}

impl Update {
    pub fn partial(target: Target, text: String) -> Self {
        Self {
            target,
            kind: UpdateKind::Partial { text },
        }
    }

    pub fn finished(target: Target, outcome: Outcome) -> Self {
        Self {
            target,
            kind: UpdateKind::Final { outcome },
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, UpdateKind::Final { .. })
    }

    pub fn response_text(&self) -> String {
        match &self.kind {
            UpdateKind::Partial { text } => text.clone(),
            UpdateKind::Final { outcome } => outcome.response_text(),
        }
    }
}

/// Sending half of the result channel.
pub type UpdateSender = UnboundedSender<Update>;

/// Set of (target, tab) pairs with a dispatch in flight.
#[derive(Debug, Clone, Default)]
pub struct DispatchRegistry {
    active: Arc<Mutex<HashSet<(Target, TabId)>>>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the pair, or `None` if a dispatch already holds it. The claim
    /// is released when the guard drops.
    pub fn try_acquire(&self, target: Target, tab: &TabId) -> Option<ActiveDispatch> {
        let key = (target, tab.clone());
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(key.clone()) {
            return None;
        }
        Some(ActiveDispatch {
            registry: self.clone(),
            key,
        })
    }

    pub fn is_active(&self, target: Target, tab: &TabId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(target, tab.clone()))
    }
}

/// Registry claim for one (target, tab) pair.
#[derive(Debug)]
pub struct ActiveDispatch {
    registry: DispatchRegistry,
    key: (Target, TabId),
}

impl Drop for ActiveDispatch {
    fn drop(&mut self) {
        self.registry
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// One question for one target in one tab.
#[derive(Clone, Copy)]
pub struct Dispatch<'a> {
    pub target: Target,
    pub tab: &'a TabId,
    pub page: &'a dyn PageDriver,
    pub question: &'a str,
}

impl<'a> Dispatch<'a> {
    pub fn new(
        target: Target,
        tab: &'a TabId,
        page: &'a dyn PageDriver,
        question: &'a str,
    ) -> Self {
        Self {
            target,
            tab,
            page,
            question,
        }
    }
}

/// Runs dispatches against a catalog and tuning.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    catalog: Catalog,
    tuning: Tuning,
    registry: DispatchRegistry,
}

impl Dispatcher {
    pub fn new(catalog: Catalog, tuning: Tuning) -> Self {
        Self::with_registry(catalog, tuning, DispatchRegistry::new())
    }

    /// Share `registry` with other dispatchers, so a (target, tab) pair
    /// stays claimed across all of them.
    pub fn with_registry(catalog: Catalog, tuning: Tuning, registry: DispatchRegistry) -> Self {
        Self {
            catalog,
            tuning,
            registry,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn registry(&self) -> &DispatchRegistry {
        &self.registry
    }

    /// Ask `job.question` and wait for the reply. Partial updates and the
    /// final outcome go to `updates`; the outcome is also returned.
    pub async fn dispatch(
        &self,
        tabs: &dyn TabProvider,
        job: Dispatch<'_>,
        updates: &UpdateSender,
    ) -> Outcome {
        let start = Instant::now();
        let outcome = match self.registry.try_acquire(job.target, job.tab) {
            Some(_claim) => self.drive(tabs, job, updates).await,
            None => {
                warn!("{}: busy in tab {}", job.target, job.tab);
                Outcome::Failure(DispatchError::Busy { target: job.target })
            }
        };

        info!(
            "{}: {} in {}ms",
            job.target,
            outcome.status(),
            start.elapsed().as_millis()
        );
        let _ = updates.send(Update::finished(job.target, outcome.clone()));
        outcome
    }

    async fn drive(
        &self,
        tabs: &dyn TabProvider,
        job: Dispatch<'_>,
        updates: &UpdateSender,
    ) -> Outcome {
        let Dispatch {
            target,
            tab,
            page,
            question,
        } = job;
        let fail = |e: Error| Outcome::Failure(DispatchError::from_page(target, tab, e));

        match tabs.is_alive(tab).await {
            Ok(true) => {}
            Ok(false) => {
                return Outcome::Failure(DispatchError::TabUnavailable {
                    target,
                    tab: tab.clone(),
                })
            }
            Err(e) => return fail(e),
        }

        let spec = self.catalog.get(target);
        if let Err(e) = self.prepare(target, page, spec).await {
            return fail(e);
        }

        let input = match resolve(page, spec, Role::Input).await {
            Ok(Some(el)) => el,
            Ok(None) => return not_found(target, Role::Input),
            Err(e) => return fail(e),
        };
        let button = match resolve_send(page, spec, &input).await {
            Ok(Some(el)) => el,
            Ok(None) => return not_found(target, Role::Button),
            Err(e) => return fail(e),
        };
        debug!(
            "{}: input {} ({:?}), send {} ({:?})",
            target,
            input.handle(),
            input.source,
            button.handle(),
            button.source
        );

        let injection = match inject(page, &input, question).await {
            Ok(()) => None,
            Err(e) if e.is_fatal() => return fail(e),
            Err(e) => {
                warn!("{}: injection failed, trying to send anyway: {}", target, e);
                Some(e.to_string())
            }
        };

        tokio::time::sleep(self.tuning.settle_delay()).await;

        match page.is_enabled(button.handle()).await {
            Ok(true) => {}
            Ok(false) => {
                return Outcome::Failure(match injection {
                    Some(message) => DispatchError::InjectionFailed { target, message },
                    None => DispatchError::SendUnavailable { target },
                })
            }
            Err(e) => return fail(e),
        }

        if let Err(e) = page.click(button.handle()).await {
            return fail(e);
        }
        info!("{}: question sent, waiting for response", target);

        Poller::new(target, &self.tuning)
            .run(page, spec, tab, updates)
            .await
    }

    /// Start from a clean conversation where the target needs it. Only
    /// fatal errors are returned; anything else is logged.
    async fn prepare(&self, target: Target, page: &dyn PageDriver, spec: &TargetSpec) -> Result<()> {
        if spec.fresh_conversation {
            match page.navigate(&spec.url).await {
                Ok(()) => {
                    match page.wait_until_loaded(self.tuning.load_timeout()).await {
                        Ok(true) => {}
                        Ok(false) => warn!("{}: page load timed out, continuing", target),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => warn!("{}: page load check failed, continuing: {}", target, e),
                    }
                    tokio::time::sleep(self.tuning.post_load_delay()).await;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("{}: navigation failed, continuing: {}", target, e),
            }
        }

        if spec.new_chat.is_empty() {
            return Ok(());
        }
        if !spec.new_chat_when.is_empty() {
            match any_present(page, &spec.new_chat_when).await {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("{}: new conversation check failed: {}", target, e);
                    return Ok(());
                }
            }
        }

        let control = match first_match(page, &spec.new_chat, false).await {
            Ok(found) => found,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("{}: new conversation lookup failed: {}", target, e);
                None
            }
        };
        if let Some((selector, node)) = control {
            debug!("{}: new conversation via '{}'", target, selector);
            match page.click(&node.handle).await {
                Ok(()) => tokio::time::sleep(self.tuning.new_chat_delay()).await,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("{}: new conversation click failed: {}", target, e),
            }
        }
        Ok(())
    }
}

fn not_found(target: Target, role: Role) -> Outcome {
    warn!("{}: {} not found", target, role);
    Outcome::Failure(DispatchError::ElementNotFound { target, role })
}
