//! Ordered ini/cfg documents
//!
//! Values are strings or lists. A value that starts on the line after its key
//! (leading newline plus indentation, the setuptools convention) loads as a
//! list and is written back in the same form.

use serde_json::Value;

use crate::error::{QpubError, Result};

/// A single value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IniValue {
    Str(String),
    List(Vec<String>),
}

impl IniValue {
    fn to_json(&self) -> Value {
        match self {
            IniValue::Str(s) => Value::String(s.clone()),
            IniValue::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            IniValue::Str(s) => s.is_empty(),
            IniValue::List(items) => items.is_empty(),
        }
    }

    fn merge(&mut self, incoming: IniValue) {
        match (self, incoming) {
            (IniValue::List(a), IniValue::List(b)) => {
                for item in b {
                    if !a.contains(&item) {
                        a.push(item);
                    }
                }
            }
            (this, incoming) => {
                if this.is_empty() {
                    *this = incoming;
                }
            }
        }
    }
}

/// Ordered key/value pairs under one header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniSection {
    pub name: String,
    pub entries: Vec<(String, IniValue)>,
}

impl IniSection {
    pub fn get(&self, key: &str) -> Option<&IniValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut IniValue> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// An ordered ini document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    pub sections: Vec<IniSection>,
}

impl IniDocument {
    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.entries.is_empty())
    }

    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Get a section, adding it on demand
    pub fn section_mut(&mut self, name: &str) -> &mut IniSection {
        if let Some(pos) = self.sections.iter().position(|s| s.name == name) {
            &mut self.sections[pos]
        } else {
            self.sections.push(IniSection {
                name: name.to_string(),
                entries: Vec::new(),
            });
            let last = self.sections.len() - 1;
            &mut self.sections[last]
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&IniValue> {
        self.section(section).and_then(|s| s.get(key))
    }

    pub fn remove_section(&mut self, name: &str) {
        let prefix = format!("{}.", name);
        self.sections
            .retain(|s| s.name != name && !s.name.starts_with(&prefix));
    }

    /// Parse ini text
    pub fn parse(text: &str) -> Self {
        let mut doc = IniDocument::default();
        let mut current = String::new();
        let mut last_key: Option<String> = None;

        for raw in text.lines() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            let indented = raw.starts_with(' ') || raw.starts_with('\t');
            if indented {
                if let Some(key) = &last_key {
                    let section = doc.section_mut(&current);
                    if let Some(value) = section.get_mut(key) {
                        let promoted = match value {
                            IniValue::List(items) => {
                                items.push(trimmed.to_string());
                                None
                            }
                            IniValue::Str(s) => {
                                let mut items = Vec::new();
                                if !s.is_empty() {
                                    items.push(s.clone());
                                }
                                items.push(trimmed.to_string());
                                Some(IniValue::List(items))
                            }
                        };
                        if let Some(list) = promoted {
                            *value = list;
                        }
                    }
                    continue;
                }
            }

            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                current = trimmed[1..trimmed.len() - 1].trim().to_string();
                doc.section_mut(&current);
                last_key = None;
                continue;
            }

            let split = trimmed.find(['=', ':']);
            if let Some(pos) = split {
                let key = trimmed[..pos].trim().to_string();
                let value = trimmed[pos + 1..].trim().to_string();
                let section = doc.section_mut(&current);
                match section.get_mut(&key) {
                    Some(existing) => *existing = IniValue::Str(value),
                    None => section.entries.push((key.clone(), IniValue::Str(value))),
                }
                last_key = Some(key);
            }
        }

        doc.sections.retain(|s| !(s.name.is_empty() && s.entries.is_empty()));
        doc
    }

    /// Render in canonical form
    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            if !out.is_empty() {
                out.push('\n');
            }
            if !section.name.is_empty() {
                out.push_str(&format!("[{}]\n", section.name));
            }
            for (key, value) in &section.entries {
                match value {
                    IniValue::Str(s) => out.push_str(&format!("{} = {}\n", key, s)),
                    IniValue::List(items) => {
                        out.push_str(&format!("{} =\n", key));
                        for item in items {
                            out.push_str(&format!("    {}\n", item));
                        }
                    }
                }
            }
        }
        out
    }

    /// Section-wise, then key-wise union
    pub fn merge(&mut self, incoming: IniDocument) {
        for section in incoming.sections {
            let target = self.section_mut(&section.name);
            for (key, value) in section.entries {
                match target.get_mut(&key) {
                    Some(existing) => existing.merge(value),
                    None => target.entries.push((key, value)),
                }
            }
        }
    }

    /// Plain tree view: sections become objects, lists become arrays
    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for section in &self.sections {
            let mut entries = serde_json::Map::new();
            for (key, value) in &section.entries {
                entries.insert(key.clone(), value.to_json());
            }
            map.insert(section.name.clone(), Value::Object(entries));
        }
        Value::Object(map)
    }

    /// Build from a tree of sections; nested objects become dotted sections
    pub fn from_json(value: &Value) -> Result<Self> {
        let mut doc = IniDocument::default();
        let sections = value
            .as_object()
            .ok_or_else(|| QpubError::Other("ini content must be a mapping of sections".to_string()))?;
        for (name, body) in sections {
            doc.add_json_section(name, body)?;
        }
        Ok(doc)
    }

    fn add_json_section(&mut self, name: &str, body: &Value) -> Result<()> {
        let entries = body
            .as_object()
            .ok_or_else(|| QpubError::Other(format!("ini section [{}] must be a mapping", name)))?;
        let mut nested = Vec::new();
        {
            let section = self.section_mut(name);
            for (key, value) in entries {
                let ini_value = match value {
                    Value::Null => continue,
                    Value::Object(_) => {
                        nested.push((format!("{}.{}", name, key), value.clone()));
                        continue;
                    }
                    Value::Array(items) => IniValue::List(items.iter().map(text).collect()),
                    Value::Bool(b) => IniValue::Str(if *b { "True" } else { "False" }.to_string()),
                    other => IniValue::Str(text(other)),
                };
                section.entries.push((key.clone(), ini_value));
            }
        }
        for (name, body) in nested {
            self.add_json_section(&name, &body)?;
        }
        Ok(())
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
