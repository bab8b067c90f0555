//! TOML conversion and merge over format-preserving documents

use serde_json::{Map, Number, Value as Json};
use toml_edit::{Array, ArrayOfTables, DocumentMut, InlineTable, Item, Table, Value};

use crate::error::Result;

/// Build a document from a plain tree
pub fn document_from_json(value: &Json) -> Result<DocumentMut> {
    let mut doc = DocumentMut::new();
    if let Json::Object(map) = value {
        for (key, value) in map {
            if let Some(item) = item_from_json(value) {
                doc.insert(key.as_str(), item);
            }
        }
    }
    Ok(doc)
}

/// Convert a tree node to a TOML item; `None` for null
pub fn item_from_json(value: &Json) -> Option<Item> {
    match value {
        Json::Null => None,
        Json::Object(map) => Some(Item::Table(table_from_json(map))),
        Json::Array(items) if !items.is_empty() && items.iter().all(Json::is_object) => {
            let mut tables = ArrayOfTables::new();
            for item in items {
                if let Json::Object(map) = item {
                    tables.push(table_from_json(map));
                }
            }
            Some(Item::ArrayOfTables(tables))
        }
        other => value_from_json(other).map(Item::Value),
    }
}

fn table_from_json(map: &Map<String, Json>) -> Table {
    let mut table = Table::new();
    for (key, value) in map {
        if let Some(item) = item_from_json(value) {
            table.insert(key.as_str(), item);
        }
    }
    // A table holding only sub-tables has no header of its own
    let only_tables = !table.is_empty() && table.iter().all(|(_, item)| item.is_table());
    table.set_implicit(only_tables);
    table
}

fn value_from_json(value: &Json) -> Option<Value> {
    match value {
        Json::Null => None,
        Json::Bool(b) => Some(Value::from(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::from(i))
            } else {
                n.as_f64().map(Value::from)
            }
        }
        Json::String(s) => Some(Value::from(s.as_str())),
        Json::Array(items) => {
            let mut array = Array::new();
            for item in items {
                if let Some(v) = value_from_json(item) {
                    array.push(v);
                }
            }
            Some(Value::Array(array))
        }
        Json::Object(map) => {
            let mut table = InlineTable::new();
            for (key, value) in map {
                if let Some(v) = value_from_json(value) {
                    table.insert(key.as_str(), v);
                }
            }
            Some(Value::InlineTable(table))
        }
    }
}

/// Plain tree view of a table
pub fn table_to_json(table: &Table) -> Json {
    let mut map = Map::new();
    for (key, item) in table.iter() {
        if let Some(value) = item_to_json(item) {
            map.insert(key.to_string(), value);
        }
    }
    Json::Object(map)
}

fn item_to_json(item: &Item) -> Option<Json> {
    match item {
        Item::None => None,
        Item::Value(v) => Some(value_to_json(v)),
        Item::Table(t) => Some(table_to_json(t)),
        Item::ArrayOfTables(tables) => Some(Json::Array(tables.iter().map(table_to_json).collect())),
    }
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::String(s) => Json::String(s.value().clone()),
        Value::Integer(i) => Json::Number(Number::from(*i.value())),
        Value::Float(f) => Number::from_f64(*f.value())
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::Boolean(b) => Json::Bool(*b.value()),
        Value::Datetime(d) => Json::String(d.value().to_string()),
        Value::Array(a) => Json::Array(a.iter().map(value_to_json).collect()),
        Value::InlineTable(t) => {
            let mut map = Map::new();
            for (key, value) in t.iter() {
                map.insert(key.to_string(), value_to_json(value));
            }
            Json::Object(map)
        }
    }
}

fn item_is_empty(item: &Item) -> bool {
    match item {
        Item::None => true,
        Item::Value(Value::String(s)) => s.value().is_empty(),
        Item::Value(Value::Array(a)) => a.is_empty(),
        Item::Value(Value::InlineTable(t)) => t.is_empty(),
        Item::Value(_) => false,
        Item::Table(t) => t.is_empty(),
        Item::ArrayOfTables(a) => a.is_empty(),
    }
}

/// Deep-merge `incoming` into `base`, keeping formatting of what exists
pub fn merge_tables(base: &mut Table, incoming: &Table) {
    for (key, item) in incoming.iter() {
        match base.get_mut(key) {
            Some(existing) => merge_items(existing, item),
            None => {
                base.insert(key, item.clone());
            }
        }
    }
}

fn merge_items(base: &mut Item, incoming: &Item) {
    match (base, incoming) {
        (Item::Table(a), Item::Table(b)) => merge_tables(a, b),
        (Item::Value(Value::Array(a)), Item::Value(Value::Array(b))) => {
            for value in b.iter() {
                let json = value_to_json(value);
                if !a.iter().any(|existing| value_to_json(existing) == json) {
                    a.push_formatted(value.clone());
                }
            }
        }
        (Item::Value(Value::InlineTable(a)), Item::Value(Value::InlineTable(b))) => {
            for (key, value) in b.iter() {
                if !a.contains_key(key) {
                    a.insert(key, value.clone());
                }
            }
        }
        (Item::ArrayOfTables(a), Item::ArrayOfTables(b)) => {
            for table in b.iter() {
                let json = table_to_json(table);
                if !a.iter().any(|existing| table_to_json(existing) == json) {
                    a.push(table.clone());
                }
            }
        }
        (base, incoming) => {
            if item_is_empty(base) {
                *base = incoming.clone();
            }
        }
    }
}
