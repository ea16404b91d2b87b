//! Section-level view of a TOML document.
//!
//! `config.toml` is treated as an ordered list of sections: the unnamed root
//! section plus one section per explicit table header. Entries keep their
//! original key and value formatting so user-authored text survives a merge.
//!
//! An inline table that nests other inline tables
//! (`mcp_servers = { GitHub = { command = "npx" } }`) is the same data as a
//! set of headers, and is read as sections so it merges like them.

use toml_edit::{DocumentMut, InlineTable, Item, Key, Table, Value};

use crate::error::ConfigError;

/// One table of a config document. An empty path is the root section.
#[derive(Debug, Clone)]
pub struct Section {
    path: Vec<String>,
    header: toml_edit::Decor,
    entries: Vec<(Key, Item)>,
}

impl Section {
    pub fn root() -> Self {
        Self::named(Vec::<String>::new())
    }

    pub fn named<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            header: toml_edit::Decor::default(),
            entries: Vec::new(),
        }
    }

    /// Builder-style insert, replacing an existing key.
    pub fn with_entry(mut self, key: &str, item: impl Into<Item>) -> Self {
        self.insert(key, item.into());
        self
    }

    pub fn insert(&mut self, key: &str, item: Item) {
        match self.entries.iter_mut().find(|(k, _)| k.get() == key) {
            Some((_, slot)) => *slot = item,
            None => self.entries.push((Key::new(key), item)),
        }
    }

    /// Dotted name, e.g. `mcp_servers.Coder`. Empty for the root section.
    pub fn name(&self) -> String {
        self.path.join(".")
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Item> {
        self.entries
            .iter()
            .find(|(k, _)| k.get() == key)
            .map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.get())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remove(&mut self, key: &str) -> Option<Item> {
        let idx = self.entries.iter().position(|(k, _)| k.get() == key)?;
        Some(self.entries.remove(idx).1)
    }
}

/// Ordered sections of a structured config file. Section names are unique.
#[derive(Debug, Clone, Default)]
pub struct ConfigDocument {
    sections: Vec<Section>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text. `source_name` labels the input in error messages.
    pub fn parse(source_name: &str, text: &str) -> Result<Self, ConfigError> {
        let doc: DocumentMut = text
            .parse()
            .map_err(|e| ConfigError::malformed(source_name, e))?;

        let mut root = Section::root();
        let mut named: Vec<(usize, Section)> = Vec::new();
        let mut path = Vec::new();
        collect(doc.as_table(), &mut path, &mut root, &mut named);
        // Stable: tables without a position keep discovery order.
        named.sort_by_key(|(pos, _)| *pos);

        let mut out = Self::new();
        if !root.is_empty() {
            out.sections.push(root);
        }
        out.sections.extend(named.into_iter().map(|(_, s)| s));
        Ok(out)
    }

    pub fn from_sections(sections: impl IntoIterator<Item = Section>) -> Self {
        let mut doc = Self::new();
        for section in sections {
            doc.upsert(section);
        }
        doc
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name() == name)
    }

    pub fn root(&self) -> Option<&Section> {
        self.sections.iter().find(|s| s.is_root())
    }

    pub fn section_names(&self) -> Vec<String> {
        self.sections.iter().map(Section::name).collect()
    }

    pub fn contains_path(&self, path: &[String]) -> bool {
        self.sections.iter().any(|s| s.path == path)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section_at_mut(&mut self, path: &[String]) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.path == path)
    }

    /// Remove every section strictly below `prefix`. Returns their names.
    pub fn remove_nested(&mut self, prefix: &[String]) -> Vec<String> {
        let mut removed = Vec::new();
        self.sections.retain(|s| {
            let nested = s.path.len() > prefix.len() && s.path.starts_with(prefix);
            if nested {
                removed.push(s.name());
            }
            !nested
        });
        removed
    }

    /// Insert or replace a section wholesale.
    /// A replaced section keeps its slot; new named sections go last and the
    /// root section always goes first. Returns true when a section was replaced.
    pub fn upsert(&mut self, section: Section) -> bool {
        if let Some(slot) = self.sections.iter_mut().find(|s| s.path == section.path) {
            *slot = section;
            return true;
        }
        if section.is_root() {
            self.sections.insert(0, section);
        } else {
            self.sections.push(section);
        }
        false
    }

    /// Render back to TOML text.
    pub fn render(&self) -> Result<String, ConfigError> {
        let mut doc = DocumentMut::new();
        let mut position = 1;
        let mut wrote_any = false;

        for section in &self.sections {
            if section.is_root() {
                for (key, item) in &section.entries {
                    doc.as_table_mut().insert_formatted(key, item.clone());
                }
                wrote_any |= !section.is_empty();
                continue;
            }

            let table = table_at(doc.as_table_mut(), section)?;
            table.set_implicit(false);
            table.set_position(position);
            position += 1;
            *table.decor_mut() = section.header.clone();
            let bare = table
                .decor()
                .prefix()
                .and_then(|p| p.as_str())
                .map_or(true, str::is_empty);
            if wrote_any && bare {
                table.decor_mut().set_prefix("\n");
            }
            for (key, item) in &section.entries {
                table.insert_formatted(key, item.clone());
            }
            wrote_any = true;
        }

        Ok(doc.to_string())
    }
}

fn collect(
    table: &Table,
    path: &mut Vec<String>,
    section: &mut Section,
    out: &mut Vec<(usize, Section)>,
) {
    for (key, item) in table.iter() {
        match item {
            Item::Value(Value::InlineTable(inline)) if holds_tables(inline) => {
                path.push(key.to_string());
                collect_inline(inline, path, out);
                path.pop();
            }
            Item::Table(child) if !child.is_dotted() => {
                path.push(key.to_string());
                let mut child_section = Section::named(path.clone());
                child_section.header = child.decor().clone();
                collect(child, path, &mut child_section, out);
                if !child.is_implicit() || !child_section.is_empty() {
                    out.push((child.position().unwrap_or(usize::MAX), child_section));
                }
                path.pop();
            }
            other => {
                let key = table
                    .get_key_value(key)
                    .map(|(k, _)| k.clone())
                    .unwrap_or_else(|| Key::new(key));
                section.entries.push((key, other.clone()));
            }
        }
    }
}

fn holds_tables(table: &InlineTable) -> bool {
    table.iter().any(|(_, v)| v.is_inline_table())
}

/// Every inline table below an expanded one becomes a section too, so a later
/// `[mcp_servers.GitHub]` header replaces `GitHub = { ... }` cleanly.
fn collect_inline(table: &InlineTable, path: &mut Vec<String>, out: &mut Vec<(usize, Section)>) {
    let mut section = Section::named(path.clone());
    let mut children = Vec::new();
    for (key, value) in table.iter() {
        match value {
            Value::InlineTable(child) => children.push((key, child)),
            other => {
                let mut v = other.clone();
                v.decor_mut().clear();
                section.entries.push((Key::new(key), Item::Value(v)));
            }
        }
    }
    if !section.is_empty() {
        out.push((usize::MAX, section));
    }
    for (key, child) in children {
        path.push(key.to_string());
        collect_inline(child, path, out);
        path.pop();
    }
}

/// Walk (creating implicit parents) to the table for `section`.
fn table_at<'a>(root: &'a mut Table, section: &Section) -> Result<&'a mut Table, ConfigError> {
    let mut current = root;
    for key in &section.path {
        let item = current.entry(key).or_insert_with(|| {
            let mut t = Table::new();
            t.set_implicit(true);
            Item::Table(t)
        });
        current = item.as_table_mut().ok_or_else(|| ConfigError::Conflict {
            section: section.name(),
            key: key.clone(),
        })?;
    }
    Ok(current)
}
