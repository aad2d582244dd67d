//! Response stabilization: decide when a streamed reply has stopped changing.
//!
//! The page never says "done". A reply counts as complete once its text is
//! non-trivial, has held still for `stable_threshold` consecutive samples and
//! no generation marker is on the page.
//!
//! [`Poller::observe`] is the pure state machine; [`Poller::run`] feeds it
//! samples from a live page on a fixed interval.

use crate::catalog::{Role, TargetSpec};
use crate::dispatch::{DispatchError, Outcome, TabId, Update, UpdateSender};
use crate::page::PageDriver;
use crate::resolve::{any_present, resolve};
use crate::tuning::Tuning;
use crate::{Result, Target};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Characters that, alone, only mean "still thinking".
const PLACEHOLDER_CHARS: [char; 3] = ['.', '…', '·'];

/// Longest run of placeholder characters still treated as trivial.
const PLACEHOLDER_MAX: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// Waiting for text, or text is still changing.
    Polling,
    /// Text repeated at least once.
    Stabilizing,
    Done,
}

/// Mutable poll state, owned by one [`Poller`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    pub last_text: String,
    pub stable_count: u32,
    pub attempt: u32,
    pub phase: PollPhase,
}

impl Default for PollState {
    fn default() -> Self {
        Self {
            last_text: String::new(),
            stable_count: 0,
            attempt: 0,
            phase: PollPhase::Polling,
        }
    }
}

/// One observation of the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sample {
    /// Text of the response element, `None` when no element was found.
    pub text: Option<String>,
    /// A generation marker is present.
    pub generating: bool,
}

impl Sample {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            generating: false,
        }
    }

    pub fn generating(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            generating: true,
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }
}

/// What a tick produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// Nothing to report.
    Continue,
    /// Text still changing; forward it as a progress update.
    Partial(String),
    /// Terminal. Later ticks return `Continue`.
    Finished(Outcome),
}

/// Empty, or a short run of placeholder dots.
pub fn is_trivial(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty()
        || (trimmed.chars().count() <= PLACEHOLDER_MAX
            && trimmed.chars().all(|c| PLACEHOLDER_CHARS.contains(&c)))
}

/// Stabilization poller for one dispatch.
#[derive(Debug)]
pub struct Poller {
    target: Target,
    interval: Duration,
    stable_threshold: u32,
    max_attempts: u32,
    partial_every: u32,
    state: PollState,
}

impl Poller {
    pub fn new(target: Target, tuning: &Tuning) -> Self {
        Self {
            target,
            interval: tuning.poll_interval(),
            stable_threshold: tuning.stable_threshold,
            max_attempts: tuning.max_attempts,
            partial_every: tuning.partial_every.max(1),
            state: PollState::default(),
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        self.state.phase == PollPhase::Done
    }

    /// Advance by one tick.
    pub fn observe(&mut self, sample: Sample) -> PollEvent {
        if self.is_done() {
            return PollEvent::Continue;
        }
        let st = &mut self.state;
        st.attempt += 1;

        let mut event = PollEvent::Continue;
        match sample.text {
            Some(text) if !is_trivial(&text) => {
                if text == st.last_text {
                    st.stable_count += 1;
                    st.phase = PollPhase::Stabilizing;
                    if st.stable_count >= self.stable_threshold && !sample.generating {
                        st.phase = PollPhase::Done;
                        return PollEvent::Finished(Outcome::Success(text));
                    }
                } else {
                    st.stable_count = 0;
                    st.last_text = text;
                    st.phase = PollPhase::Polling;
                    if st.attempt % self.partial_every == 0 {
                        event = PollEvent::Partial(st.last_text.clone());
                    }
                }
            }
            _ => {}
        }

        if st.attempt >= self.max_attempts {
            st.phase = PollPhase::Done;
            let outcome = if st.last_text.is_empty() {
                Outcome::Failure(DispatchError::Timeout {
                    target: self.target,
                })
            } else {
                Outcome::PartialOnTimeout(st.last_text.clone())
            };
            return PollEvent::Finished(outcome);
        }
        event
    }

    /// Sample `page` every interval until a terminal outcome. Partial text
    /// is sent on `updates`; the final outcome is returned, not sent.
    pub async fn run(
        &mut self,
        page: &dyn PageDriver,
        spec: &TargetSpec,
        tab: &TabId,
        updates: &UpdateSender,
    ) -> Outcome {
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let sample = match sample(page, spec).await {
                Ok(s) => s,
                Err(e) if e.is_fatal() => {
                    self.state.phase = PollPhase::Done;
                    return Outcome::Failure(DispatchError::from_page(self.target, tab, e));
                }
                Err(e) => {
                    warn!("{}: sampling failed: {}", self.target, e);
                    Sample::missing()
                }
            };
            debug!(
                "{}: attempt {} text={:?} generating={}",
                self.target,
                self.state.attempt + 1,
                sample.text.as_ref().map(|t| t.chars().count()),
                sample.generating
            );

            match self.observe(sample) {
                PollEvent::Continue => {}
                PollEvent::Partial(text) => {
                    let _ = updates.send(Update::partial(self.target, text));
                }
                PollEvent::Finished(outcome) => return outcome,
            }
        }
    }
}

/// Read the response text and generation markers once.
pub async fn sample(page: &dyn PageDriver, spec: &TargetSpec) -> Result<Sample> {
    let text = resolve(page, spec, Role::Response)
        .await?
        .map(|el| el.node.text);
    let generating = any_present(page, &spec.generating).await?;
    Ok(Sample { text, generating })
}
