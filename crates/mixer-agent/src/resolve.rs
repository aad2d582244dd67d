//! Element resolution: ranked catalog selectors first, generic heuristics after.

use crate::catalog::{
    Role, SelectorList, TargetSpec, ANCESTOR_LEVELS, GENERIC_INPUTS, GENERIC_RESPONSES, SEND_TOKEN,
};
use crate::page::{ElementKind, ElementRef, Node, PageDriver};
use crate::Result;
use std::collections::HashSet;
use tracing::debug;

/// Why a candidate looks like a send button. Later variants rank higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SendAffordance {
    /// Lives inside a form.
    FormMember,
    /// Icon-only: holds an svg, or has no text at all.
    IconOnly,
    /// Text or `aria-label` mentions sending.
    LabelToken,
}

/// Which strategy produced a resolved element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchSource {
    /// A catalog selector.
    Catalog(String),
    /// The visible generic text-entry fallback.
    GenericInput,
    /// Submit or last button of the input's form.
    EnclosingForm,
    /// A ranked button near the input.
    Nearby(SendAffordance),
    /// The generic conversation-container fallback.
    GenericResponse,
}

/// A live element chosen for a role, valid for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedElement {
    pub node: Node,
    pub source: MatchSource,
}

impl ResolvedElement {
    pub fn handle(&self) -> &ElementRef {
        &self.node.handle
    }

    pub fn kind(&self) -> Option<ElementKind> {
        self.node.kind()
    }
}

/// Walk `list` in order and pick from the first selector with any match:
/// the last match when `take_last`, otherwise the first.
pub async fn first_match(
    page: &dyn PageDriver,
    list: &SelectorList,
    take_last: bool,
) -> Result<Option<(String, Node)>> {
    for selector in list.iter() {
        let mut nodes = page.query_all(selector).await?;
        let picked = if take_last { nodes.pop() } else { nodes.into_iter().next() };
        if let Some(node) = picked {
            return Ok(Some((selector.to_string(), node)));
        }
    }
    Ok(None)
}

/// Whether any selector in `list` matches. An empty list never does.
pub async fn any_present(page: &dyn PageDriver, list: &SelectorList) -> Result<bool> {
    for selector in list.iter() {
        if page.exists(selector).await? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Resolve `role` for a target: catalog first, then the role's generic
/// fallback. The send button also needs the input, see [`resolve_send`].
pub async fn resolve(
    page: &dyn PageDriver,
    spec: &TargetSpec,
    role: Role,
) -> Result<Option<ResolvedElement>> {
    if let Some((selector, node)) =
        first_match(page, spec.selectors(role), role.takes_last()).await?
    {
        debug!("{}: matched '{}'", role, selector);
        return Ok(Some(ResolvedElement {
            node,
            source: MatchSource::Catalog(selector),
        }));
    }

    let fallback = match role {
        Role::Input => generic_input(page).await?,
        Role::Response => generic_response(page).await?,
        Role::Button => None,
    };
    if fallback.is_some() {
        debug!("{}: resolved by fallback", role);
    }
    Ok(fallback)
}

/// Resolve the send control for an already resolved input.
pub async fn resolve_send(
    page: &dyn PageDriver,
    spec: &TargetSpec,
    input: &ResolvedElement,
) -> Result<Option<ResolvedElement>> {
    if let Some(found) = resolve(page, spec, Role::Button).await? {
        return Ok(Some(found));
    }

    if let Some(buttons) = page.form_buttons(input.handle()).await? {
        let submit = buttons
            .iter()
            .position(|b| b.input_type.as_deref() == Some("submit"))
            .or_else(|| buttons.len().checked_sub(1));
        if let Some(i) = submit {
            debug!("send button: enclosing form");
            return Ok(Some(ResolvedElement {
                node: buttons[i].clone(),
                source: MatchSource::EnclosingForm,
            }));
        }
    }

    let mut seen = HashSet::new();
    let nearby: Vec<Node> = page
        .ancestor_buttons(input.handle(), ANCESTOR_LEVELS)
        .await?
        .into_iter()
        .filter(|b| seen.insert(b.handle.clone()))
        .collect();

    Ok(rank_send_candidates(&nearby).map(|(i, affordance)| {
        debug!("send button: nearby ({:?})", affordance);
        ResolvedElement {
            node: nearby[i].clone(),
            source: MatchSource::Nearby(affordance),
        }
    }))
}

/// Strongest reason `button` looks like a send control, if any.
pub fn affordance(button: &Node) -> Option<SendAffordance> {
    let text = button.text.trim().to_lowercase();
    let label = button.label.as_deref().unwrap_or("").to_lowercase();
    if text.contains(SEND_TOKEN) || label.contains(SEND_TOKEN) {
        Some(SendAffordance::LabelToken)
    } else if button.has_icon || text.is_empty() {
        Some(SendAffordance::IconOnly)
    } else if button.in_form {
        Some(SendAffordance::FormMember)
    } else {
        None
    }
}

/// Pick the best send candidate: highest affordance wins, ties go to the
/// earliest. Returns its index and the winning criterion.
pub fn rank_send_candidates(candidates: &[Node]) -> Option<(usize, SendAffordance)> {
    let mut best: Option<(usize, SendAffordance)> = None;
    for (i, button) in candidates.iter().enumerate() {
        let Some(a) = affordance(button) else {
            continue;
        };
        if best.map_or(true, |(_, b)| a > b) {
            best = Some((i, a));
        }
    }
    best
}

/// First visible generic text-entry element.
async fn generic_input(page: &dyn PageDriver) -> Result<Option<ResolvedElement>> {
    for selector in GENERIC_INPUTS {
        let visible = page
            .query_all(selector)
            .await?
            .into_iter()
            .find(|n| n.visible);
        if let Some(node) = visible {
            return Ok(Some(ResolvedElement {
                node,
                source: MatchSource::GenericInput,
            }));
        }
    }
    Ok(None)
}

/// Last generic conversation container, collected across all fallbacks.
async fn generic_response(page: &dyn PageDriver) -> Result<Option<ResolvedElement>> {
    let mut last = None;
    for selector in GENERIC_RESPONSES {
        if let Some(node) = page.query_all(selector).await?.pop() {
            last = Some(node);
        }
    }
    Ok(last.map(|node| ResolvedElement {
        node,
        source: MatchSource::GenericResponse,
    }))
}
