//! The page capability every other module is written against.
//!
//! Implementations:
//! - [`CdpPage`](crate::CdpPage): a real tab, driven through `eoka` by
//!   evaluating small scripts in the page.
//! - Tests: an in-memory fake.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque handle to a live DOM node: a CSS path that re-selects it.
///
/// Only valid for the dispatch that produced it; the host page may
/// re-render at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(String);

impl ElementRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How text has to be written into an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// `<textarea>`
    TextArea,
    /// `<input>`
    PlainInput,
    /// Content-editable region or framework rich-text editor.
    RichRegion,
}

/// Snapshot of a node taken when it was queried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Node {
    pub handle: ElementRef,
    /// Lowercase tag name.
    pub tag: String,
    pub input_type: Option<String>,
    /// Content-editable, or carries a known rich-editor class.
    pub editable: bool,
    pub role: Option<String>,
    /// Computed display is not `none` and visibility is not `hidden`.
    pub visible: bool,
    /// Raw `textContent`.
    pub text: String,
    /// `aria-label`
    pub label: Option<String>,
    pub disabled: bool,
    /// Has an enclosing `<form>`.
    pub in_form: bool,
    /// Contains an `<svg>`.
    pub has_icon: bool,
}

impl Node {
    /// Writing strategy this node needs, if it accepts text at all.
    pub fn kind(&self) -> Option<ElementKind> {
        match self.tag.as_str() {
            "textarea" => Some(ElementKind::TextArea),
            "input" => Some(ElementKind::PlainInput),
            _ if self.editable => Some(ElementKind::RichRegion),
            _ => None,
        }
    }
}

/// Change notifications raised after writing into an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticEvent {
    /// Plain bubbling `input` event.
    Input,
    /// `InputEvent` with `inputType: "insertText"` carrying the inserted text.
    InsertText(String),
}

/// Everything the engine needs from a live page.
///
/// Dispatches run cooperatively on one task, so futures are not `Send`.
#[async_trait(?Send)]
pub trait PageDriver {
    /// All nodes matching `selector`, in document order. An invalid selector
    /// matches nothing.
    async fn query_all(&self, selector: &str) -> Result<Vec<Node>>;

    /// Whether anything matches `selector`.
    async fn exists(&self, selector: &str) -> Result<bool> {
        Ok(!self.query_all(selector).await?.is_empty())
    }

    /// Buttons of the form enclosing `el`, or `None` when it has no form.
    async fn form_buttons(&self, el: &ElementRef) -> Result<Option<Vec<Node>>>;

    /// Buttons under each of the first `levels` ancestors of `el`, starting
    /// with its parent. Nearer levels come first; a button may repeat.
    async fn ancestor_buttons(&self, el: &ElementRef, levels: usize) -> Result<Vec<Node>>;

    /// Set `value` through the element prototype's native setter, bypassing
    /// any setter a UI framework installed on the instance.
    async fn set_native_value(&self, el: &ElementRef, value: &str) -> Result<()>;

    /// Replace the element's text content.
    async fn set_text_content(&self, el: &ElementRef, text: &str) -> Result<()>;

    /// Dispatch a bubbling synthetic event on the element.
    async fn dispatch_event(&self, el: &ElementRef, event: &SyntheticEvent) -> Result<()>;

    /// Whether the element is still attached and not disabled.
    async fn is_enabled(&self, el: &ElementRef) -> Result<bool>;

    async fn click(&self, el: &ElementRef) -> Result<()>;

    async fn url(&self) -> Result<String>;

    async fn navigate(&self, url: &str) -> Result<()>;

    /// Wait for the document to finish loading. `Ok(false)` on timeout.
    async fn wait_until_loaded(&self, timeout: Duration) -> Result<bool>;
}
