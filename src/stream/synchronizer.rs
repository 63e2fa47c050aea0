use super::markers::{state_script, suspense_child_scope};
use crate::manager::Manager;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static SHELL_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"<template id="(?P<template>[^"]+)".+?"#,
        r#"<script data-context-id="(?P<prefix>[^"]+)".+?"#,
        r#"data-count="(?P<count>[^"]+)">"#,
    ))
    .expect("valid shell regex")
});

static COMPLETE_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\$RC\("(?P<from>[^"]+)","(?P<to>[^"]+)"\)"#).expect("valid segment regex")
});

const COMPLETED_CHUNK: &str = "<div hidden id=";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Boundary {
    scope_prefix: String,
    count: usize,
}

/// Server-side stream synchronizer.
///
/// Watches the chunks of a streamed HTML response. The first chunk with
/// suspense fallbacks (the shell) yields the boundary table; each completed
/// boundary chunk then gets the state of the stores created under it.
/// One instance per response.
#[derive(Debug)]
pub struct StreamStores {
    manager: Manager,
    boundaries: Option<HashMap<String, Boundary>>,
}

impl StreamStores {
    pub fn new(manager: Manager) -> Self {
        Self {
            manager,
            boundaries: None,
        }
    }

    /// State script to emit before `html`, if `html` completes a suspense
    /// boundary whose scopes hold stores.
    pub fn get_stream_state(&mut self, html: &str) -> Option<String> {
        self.read_shell(html);
        self.complete_boundary(html)
    }

    /// `chunk` with its state script, if any, in front.
    pub fn intercept(&mut self, chunk: &str) -> String {
        match self.get_stream_state(chunk) {
            Some(script) => format!("{script}{chunk}"),
            None => chunk.to_string(),
        }
    }

    fn read_shell(&mut self, html: &str) {
        if self.boundaries.is_some() {
            return;
        }

        let boundaries: HashMap<String, Boundary> = SHELL_BOUNDARY
            .captures_iter(html)
            .filter_map(|captures| {
                let template = captures.name("template")?.as_str().to_string();
                let scope_prefix = captures.name("prefix")?.as_str().to_string();
                let count = captures.name("count")?.as_str().parse().unwrap_or(0);
                Some((template, Boundary { scope_prefix, count }))
            })
            .collect();

        if boundaries.is_empty() {
            return;
        }
        tracing::debug!(boundaries = boundaries.len(), "suspense boundaries read from shell");
        self.boundaries = Some(boundaries);
    }

    fn complete_boundary(&mut self, html: &str) -> Option<String> {
        if !html.starts_with(COMPLETED_CHUNK) {
            return None;
        }
        let captures = COMPLETE_SEGMENT.captures(html)?;
        let from = captures.name("from")?.as_str();
        let to = captures.name("to")?.as_str();

        let boundaries = self.boundaries.as_mut()?;
        let boundary = boundaries.remove(from)?;
        boundaries.insert(to.to_string(), boundary.clone());

        if boundary.count == 0 {
            return None;
        }

        let store_ids: Vec<String> = (0..boundary.count)
            .flat_map(|index| {
                self.manager
                    .scope_members(&suspense_child_scope(&boundary.scope_prefix, index))
            })
            .collect();
        if store_ids.is_empty() {
            return None;
        }

        tracing::trace!(segment = to, stores = store_ids.len(), "streaming suspense state");
        state_script(&self.manager.to_json(Some(&store_ids)))
    }
}
