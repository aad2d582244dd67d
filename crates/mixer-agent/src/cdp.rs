//! [`PageDriver`] over a real tab. Every operation is one script evaluation.

use crate::dispatch::TabId;
use crate::page::{ElementRef, Node, PageDriver, SyntheticEvent};
use crate::{Error, Result};
use async_trait::async_trait;
use eoka::Page;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Single entry point for all in-page work: `(op, sel, arg)`.
///
/// `sel` is a selector for `query`/`exists`, otherwise an element handle
/// produced by `path()`. Always returns a JSON string.
const PAGE_JS: &str = r#"
((op, sel, arg) => {
    function path(el) {
        if (el.id) return '#' + CSS.escape(el.id);
        const parts = [];
        let n = el;
        while (n && n.nodeType === 1) {
            let s = n.tagName.toLowerCase();
            if (n.id) { parts.unshift('#' + CSS.escape(n.id)); break; }
            const p = n.parentElement;
            if (p) {
                const sibs = [...p.children].filter(c => c.tagName === n.tagName);
                if (sibs.length > 1) s += ':nth-of-type(' + (sibs.indexOf(n) + 1) + ')';
            }
            parts.unshift(s);
            n = p;
        }
        return parts.join(' > ');
    }

    function describe(el) {
        const s = getComputedStyle(el);
        return {
            handle: path(el),
            tag: el.tagName.toLowerCase(),
            input_type: el.getAttribute('type'),
            editable: el.isContentEditable || el.getAttribute('contenteditable') === 'true'
                || el.classList.contains('ProseMirror'),
            role: el.getAttribute('role'),
            visible: s.display !== 'none' && s.visibility !== 'hidden',
            text: el.textContent || '',
            label: el.getAttribute('aria-label'),
            disabled: !!el.disabled,
            in_form: !!el.closest('form'),
            has_icon: !!el.querySelector('svg'),
        };
    }

    function all(q) {
        try { return [...document.querySelectorAll(q)]; } catch (e) { return []; }
    }

    const el = all(sel)[0] || null;
    let out = null;
    switch (op) {
        case 'query':
            out = all(sel).map(describe);
            break;
        case 'exists':
            out = !!el;
            break;
        case 'ready_state':
            out = document.readyState;
            break;
        case 'form_buttons': {
            const form = el && el.closest('form');
            out = form ? [...form.querySelectorAll('button')].map(describe) : null;
            break;
        }
        case 'ancestor_buttons': {
            out = [];
            let node = el && el.parentElement;
            for (let i = 0; node && i < arg; i++) {
                out.push(...[...node.querySelectorAll('button')].map(describe));
                node = node.parentElement;
            }
            break;
        }
        case 'set_value': {
            if (!el) { out = false; break; }
            const proto = el.tagName === 'TEXTAREA'
                ? HTMLTextAreaElement.prototype
                : HTMLInputElement.prototype;
            Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, arg);
            out = true;
            break;
        }
        case 'set_text':
            if (el) el.textContent = arg;
            out = !!el;
            break;
        case 'input_event':
            if (el) el.dispatchEvent(new Event('input', { bubbles: true }));
            out = !!el;
            break;
        case 'insert_text_event':
            if (el) el.dispatchEvent(new InputEvent('input', {
                bubbles: true, cancelable: true, inputType: 'insertText', data: arg,
            }));
            out = !!el;
            break;
        case 'enabled':
            out = !!el && !el.disabled;
            break;
        case 'click':
            if (el) el.click();
            out = !!el;
            break;
    }
    return JSON.stringify(out);
})
"#;

/// Interval between `document.readyState` checks while waiting for a load.
const READY_POLL_MS: u64 = 100;

/// A browser tab driven over CDP.
pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// Get a reference to the underlying Page.
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Browser-assigned id of this tab.
    pub fn tab_id(&self) -> TabId {
        TabId::new(self.page.target_id().to_string())
    }

    async fn call<T: DeserializeOwned>(&self, op: &str, sel: &str, arg: Value) -> Result<T> {
        let js = format!(
            "{}({},{},{})",
            PAGE_JS,
            Value::from(op),
            Value::from(sel),
            arg
        );
        let raw: String = self.page.evaluate(&js).await.map_err(classify)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Run an op on an element that must still be attached.
    async fn on_element(&self, op: &str, el: &ElementRef, arg: Value) -> Result<()> {
        let found: bool = self.call(op, el.as_str(), arg).await?;
        if found {
            Ok(())
        } else {
            Err(Error::Detached(el.to_string()))
        }
    }
}

/// Map transport errors to what they mean for a dispatch.
fn classify(e: eoka::Error) -> Error {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("cannot access contents") || lower.contains("cannot access a chrome") {
        Error::AccessDenied(msg)
    } else if lower.contains("no target with given id")
        || lower.contains("target closed")
        || lower.contains("session closed")
        || lower.contains("session with given id not found")
    {
        Error::TabClosed(msg)
    } else {
        Error::Browser(e)
    }
}

#[async_trait(?Send)]
impl PageDriver for CdpPage {
    async fn query_all(&self, selector: &str) -> Result<Vec<Node>> {
        self.call("query", selector, Value::Null).await
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        self.call("exists", selector, Value::Null).await
    }

    async fn form_buttons(&self, el: &ElementRef) -> Result<Option<Vec<Node>>> {
        self.call("form_buttons", el.as_str(), Value::Null).await
    }

    async fn ancestor_buttons(&self, el: &ElementRef, levels: usize) -> Result<Vec<Node>> {
        self.call("ancestor_buttons", el.as_str(), json!(levels)).await
    }

    async fn set_native_value(&self, el: &ElementRef, value: &str) -> Result<()> {
        self.on_element("set_value", el, json!(value)).await
    }

    async fn set_text_content(&self, el: &ElementRef, text: &str) -> Result<()> {
        self.on_element("set_text", el, json!(text)).await
    }

    async fn dispatch_event(&self, el: &ElementRef, event: &SyntheticEvent) -> Result<()> {
        match event {
            SyntheticEvent::Input => self.on_element("input_event", el, Value::Null).await,
            SyntheticEvent::InsertText(text) => {
                self.on_element("insert_text_event", el, json!(text)).await
            }
        }
    }

    async fn is_enabled(&self, el: &ElementRef) -> Result<bool> {
        self.call("enabled", el.as_str(), Value::Null).await
    }

    async fn click(&self, el: &ElementRef) -> Result<()> {
        self.on_element("click", el, Value::Null).await
    }

    async fn url(&self) -> Result<String> {
        self.page.url().await.map_err(classify)
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("navigate: {}", url);
        self.page.goto(url).await.map_err(classify)
    }

    async fn wait_until_loaded(&self, timeout: Duration) -> Result<bool> {
        // Evaluation fails while a navigation swaps the document; keep trying.
        let poll = async {
            loop {
                match self.call::<String>("ready_state", "", Value::Null).await {
                    Ok(state) if state == "complete" => return Ok::<_, Error>(()),
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => debug!("readyState check failed, retrying: {}", e),
                }
                tokio::time::sleep(Duration::from_millis(READY_POLL_MS)).await;
            }
        };
        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result.map(|_| true),
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_access_denied() {
        let e = classify(eoka::Error::CdpSimple(
            "Cannot access contents of url \"chrome://settings\"".into(),
        ));
        assert!(matches!(e, Error::AccessDenied(_)));
    }

    #[test]
    fn classify_closed_tab() {
        let e = classify(eoka::Error::CdpSimple("No target with given id found".into()));
        assert!(matches!(e, Error::TabClosed(_)));
    }

    #[test]
    fn classify_other() {
        let e = classify(eoka::Error::CdpSimple("Runtime.evaluate failed".into()));
        assert!(matches!(e, Error::Browser(_)));
        assert!(!e.is_fatal());
    }

    #[test]
    fn script_is_a_callable_expression() {
        let js = format!("{}({},{},{})", PAGE_JS, Value::from("query"), Value::from("a"), Value::Null);
        assert!(js.trim_start().starts_with("((op, sel, arg) =>"));
        assert!(js.ends_with(r#"("query","a",null)"#));
    }
}
