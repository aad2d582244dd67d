//! Writing a question into an input so the page's UI framework notices.
//!
//! Frameworks track input state on their own; assigning `value` through the
//! instance is invisible to them. Each element kind gets a write strategy
//! that ends with the events a real keystroke would raise.

use crate::page::{ElementKind, ElementRef, PageDriver, SyntheticEvent};
use crate::resolve::ResolvedElement;
use crate::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

/// A way of writing text into one kind of element.
#[async_trait(?Send)]
pub trait NativeWrite {
    async fn write(&self, page: &dyn PageDriver, el: &ElementRef, text: &str) -> Result<()>;
}

/// `<textarea>` and `<input>`: native value setter, then `input`.
pub struct DirectValueWrite;

#[async_trait(?Send)]
impl NativeWrite for DirectValueWrite {
    async fn write(&self, page: &dyn PageDriver, el: &ElementRef, text: &str) -> Result<()> {
        page.set_native_value(el, text).await?;
        page.dispatch_event(el, &SyntheticEvent::Input).await
    }
}

/// Content-editable regions: replace text, then `input` and `insertText`.
pub struct RichRegionWrite;

#[async_trait(?Send)]
impl NativeWrite for RichRegionWrite {
    async fn write(&self, page: &dyn PageDriver, el: &ElementRef, text: &str) -> Result<()> {
        page.set_text_content(el, text).await?;
        page.dispatch_event(el, &SyntheticEvent::Input).await?;
        page.dispatch_event(el, &SyntheticEvent::InsertText(text.to_string()))
            .await
    }
}

/// Strategy for an element kind.
pub fn strategy(kind: ElementKind) -> &'static dyn NativeWrite {
    match kind {
        ElementKind::TextArea | ElementKind::PlainInput => &DirectValueWrite,
        ElementKind::RichRegion => &RichRegionWrite,
    }
}

/// Write `text` into a resolved input. The text is passed through untouched.
pub async fn inject(page: &dyn PageDriver, input: &ResolvedElement, text: &str) -> Result<()> {
    let kind = input
        .kind()
        .ok_or_else(|| Error::Unsupported(format!("<{}> {}", input.node.tag, input.handle())))?;
    debug!("inject {} chars into {:?} {}", text.chars().count(), kind, input.handle());
    strategy(kind).write(page, input.handle(), text).await
}
