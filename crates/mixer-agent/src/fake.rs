//! In-memory page for unit tests.

use crate::dispatch::{TabId, TabProvider};
use crate::page::{ElementRef, Node, PageDriver, SyntheticEvent};
use crate::tuning::Tuning;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub fn node(handle: &str, tag: &str) -> Node {
    Node {
        handle: ElementRef::new(handle),
        tag: tag.into(),
        visible: true,
        ..Default::default()
    }
}

pub fn button(handle: &str, text: &str) -> Node {
    Node {
        text: text.into(),
        ..node(handle, "button")
    }
}

/// Defaults with every wait collapsed.
pub fn fast_tuning() -> Tuning {
    Tuning {
        settle_delay_ms: 0,
        poll_interval_ms: 1,
        load_timeout_ms: 10,
        post_load_delay_ms: 0,
        new_chat_delay_ms: 0,
        open_timeout_ms: 10,
        open_settle_ms: 0,
        ..Default::default()
    }
}

#[derive(Default)]
struct State {
    matches: HashMap<String, Vec<Node>>,
    /// Response text per query; the last frame repeats forever.
    frames: HashMap<String, VecDeque<String>>,
    presence: HashMap<String, VecDeque<bool>>,
    forms: HashMap<String, Vec<Node>>,
    ancestors: HashMap<String, Vec<Node>>,
    values: HashMap<String, String>,
    texts: HashMap<String, String>,
    events: Vec<(String, SyntheticEvent)>,
    clicks: Vec<String>,
    navigations: Vec<String>,
    failure: Option<Error>,
    load_failure: Option<Error>,
}

/// Rebuild a stored error; `Error` is not `Clone`.
fn replay(err: &Error) -> Error {
    match err {
        Error::TabClosed(m) => Error::TabClosed(m.clone()),
        Error::AccessDenied(m) => Error::AccessDenied(m.clone()),
        Error::Detached(m) => Error::Detached(m.clone()),
        Error::Unsupported(m) => Error::Unsupported(m.clone()),
        other => Error::Detached(other.to_string()),
    }
}

fn next_frame<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[derive(Default)]
pub struct FakePage {
    state: Mutex<State>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, selector: &str, nodes: Vec<Node>) -> Self {
        self.state.lock().unwrap().matches.insert(selector.into(), nodes);
        self
    }

    pub fn with_frames<I, S>(self, selector: &str, frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let frames = frames.into_iter().map(Into::into).collect();
        self.state.lock().unwrap().frames.insert(selector.into(), frames);
        self
    }

    pub fn with_presence_frames(self, selector: &str, frames: impl IntoIterator<Item = bool>) -> Self {
        let frames = frames.into_iter().collect();
        self.state.lock().unwrap().presence.insert(selector.into(), frames);
        self
    }

    pub fn with_form(self, handle: &str, buttons: Vec<Node>) -> Self {
        self.state.lock().unwrap().forms.insert(handle.into(), buttons);
        self
    }

    pub fn with_ancestors(self, handle: &str, buttons: Vec<Node>) -> Self {
        self.state.lock().unwrap().ancestors.insert(handle.into(), buttons);
        self
    }

    /// Make every later call fail with `err`.
    pub fn fail_with(&self, err: Error) {
        self.state.lock().unwrap().failure = Some(err);
    }

    /// Make only the load wait fail with `err`.
    pub fn fail_load_with(&self, err: Error) {
        self.state.lock().unwrap().load_failure = Some(err);
    }

    pub fn value(&self, handle: &str) -> Option<String> {
        self.state.lock().unwrap().values.get(handle).cloned()
    }

    pub fn text(&self, handle: &str) -> Option<String> {
        self.state.lock().unwrap().texts.get(handle).cloned()
    }

    pub fn events(&self, handle: &str) -> Vec<SyntheticEvent> {
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|(h, _)| h == handle)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn all_events(&self) -> Vec<SyntheticEvent> {
        let st = self.state.lock().unwrap();
        st.events.iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    fn check(&self) -> Result<()> {
        match &self.state.lock().unwrap().failure {
            None => Ok(()),
            Some(err) => Err(replay(err)),
        }
    }
}

#[async_trait(?Send)]
impl PageDriver for FakePage {
    async fn query_all(&self, selector: &str) -> Result<Vec<Node>> {
        self.check()?;
        let mut st = self.state.lock().unwrap();
        if let Some(queue) = st.frames.get_mut(selector) {
            return Ok(next_frame(queue)
                .map(|text| {
                    vec![Node {
                        text,
                        ..node(selector, "div")
                    }]
                })
                .unwrap_or_default());
        }
        Ok(st.matches.get(selector).cloned().unwrap_or_default())
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        self.check()?;
        let present = {
            let mut st = self.state.lock().unwrap();
            st.presence.get_mut(selector).and_then(next_frame)
        };
        match present {
            Some(p) => Ok(p),
            None => Ok(!self.query_all(selector).await?.is_empty()),
        }
    }

    async fn form_buttons(&self, el: &ElementRef) -> Result<Option<Vec<Node>>> {
        self.check()?;
        Ok(self.state.lock().unwrap().forms.get(el.as_str()).cloned())
    }

    async fn ancestor_buttons(&self, el: &ElementRef, _levels: usize) -> Result<Vec<Node>> {
        self.check()?;
        let st = self.state.lock().unwrap();
        Ok(st.ancestors.get(el.as_str()).cloned().unwrap_or_default())
    }

    async fn set_native_value(&self, el: &ElementRef, value: &str) -> Result<()> {
        self.check()?;
        let mut st = self.state.lock().unwrap();
        st.values.insert(el.to_string(), value.to_string());
        Ok(())
    }

    async fn set_text_content(&self, el: &ElementRef, text: &str) -> Result<()> {
        self.check()?;
        let mut st = self.state.lock().unwrap();
        st.texts.insert(el.to_string(), text.to_string());
        Ok(())
    }

    async fn dispatch_event(&self, el: &ElementRef, event: &SyntheticEvent) -> Result<()> {
        self.check()?;
        let mut st = self.state.lock().unwrap();
        st.events.push((el.to_string(), event.clone()));
        Ok(())
    }

    async fn is_enabled(&self, el: &ElementRef) -> Result<bool> {
        self.check()?;
        let st = self.state.lock().unwrap();
        let found = st
            .matches
            .values()
            .chain(st.forms.values())
            .chain(st.ancestors.values())
            .flatten()
            .find(|n| &n.handle == el);
        Ok(found.map_or(false, |n| !n.disabled))
    }

    async fn click(&self, el: &ElementRef) -> Result<()> {
        self.check()?;
        self.state.lock().unwrap().clicks.push(el.to_string());
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        self.check()?;
        let st = self.state.lock().unwrap();
        Ok(st.navigations.last().cloned().unwrap_or_else(|| "about:blank".into()))
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.check()?;
        self.state.lock().unwrap().navigations.push(url.to_string());
        Ok(())
    }

    async fn wait_until_loaded(&self, _timeout: Duration) -> Result<bool> {
        self.check()?;
        match &self.state.lock().unwrap().load_failure {
            None => Ok(true),
            Some(err) => Err(replay(err)),
        }
    }
}

pub struct FakeTabs {
    alive: bool,
}

impl FakeTabs {
    pub fn alive() -> Self {
        Self { alive: true }
    }

    pub fn dead() -> Self {
        Self { alive: false }
    }
}

#[async_trait(?Send)]
impl TabProvider for FakeTabs {
    async fn is_alive(&self, _tab: &TabId) -> Result<bool> {
        Ok(self.alive)
    }
}
