use tracing::{debug, warn};

use crate::document::ConfigDocument;

/// The three tiers of a config merge.
#[derive(Debug, Clone, Copy)]
pub struct MergeInput<'a> {
    /// Built-in baseline.
    pub default: &'a ConfigDocument,
    /// Operator-supplied sections; may be empty.
    pub user: &'a ConfigDocument,
    /// Platform fragment that must appear exactly once, whatever `user` says.
    pub fixed_append: &'a ConfigDocument,
}

impl MergeInput<'_> {
    pub fn merge(&self) -> ConfigDocument {
        merge(self.default, self.user, self.fixed_append)
    }
}

/// Stack `extra` on top of `base`: each section of `extra` replaces the
/// same-named section of `base` wholesale or is appended.
pub fn overlay(base: &ConfigDocument, extra: &ConfigDocument) -> ConfigDocument {
    let mut out = base.clone();
    for section in extra.sections() {
        if out.upsert(section.clone()) {
            debug!(section = %section.name(), "section overridden");
        }
    }
    out
}

/// Merge `default`, `user` and `fixed_append`.
///
/// Section granularity: a user section replaces the default section of the
/// same name as a whole, keys are never mixed between tiers. Platform
/// sections always win and are never duplicated: a user section with a
/// reserved name is replaced in place.
pub fn merge(
    default: &ConfigDocument,
    user: &ConfigDocument,
    fixed_append: &ConfigDocument,
) -> ConfigDocument {
    let mut out = overlay(default, user);
    for section in fixed_append.sections() {
        let path = section.path();
        let mut dropped: Vec<String> = out
            .remove_nested(path)
            .into_iter()
            .filter(|name| user.section(name).is_some())
            .collect();
        dropped.extend(clear_ancestor_values(&mut out, path));
        if out.upsert(section.clone()) && user.contains_path(path) {
            dropped.insert(0, section.name());
        }
        if !dropped.is_empty() {
            warn!(
                section = %section.name(),
                dropped = ?dropped,
                "user config defines a reserved section; platform version wins"
            );
        }
    }
    out
}

/// Drop plain values sitting where a parent table of `path` must go
/// (e.g. `mcp_servers = "x"` above `[mcp_servers.Coder]`).
fn clear_ancestor_values(doc: &mut ConfigDocument, path: &[String]) -> Vec<String> {
    let mut dropped = Vec::new();
    for depth in 0..path.len().saturating_sub(1) {
        let (parent, key) = (&path[..depth], &path[depth]);
        let Some(section) = doc.section_at_mut(parent) else {
            continue;
        };
        if section.get(key).is_some_and(|item| !item.is_table()) {
            section.remove(key);
            dropped.push(path[..=depth].join("."));
        }
    }
    dropped
}
