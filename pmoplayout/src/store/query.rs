//! Sélecteurs, modificateurs et tri sur des documents JSON
//!
//! Les chemins utilisent la notation pointée (`part._rank`).

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub(crate) fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |cur, key| cur.get(key))
}

fn set_path(doc: &mut Value, path: &str, value: Value) {
    let keys: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = keys.split_last() else {
        return;
    };
    let mut cur = doc;
    for key in parents {
        if !cur.is_object() {
            *cur = Value::Object(Map::new());
        }
        cur = match cur {
            Value::Object(map) => map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }
    if !cur.is_object() {
        *cur = Value::Object(Map::new());
    }
    if let Value::Object(map) = cur {
        map.insert(last.to_string(), value);
    }
}

fn unset_path(doc: &mut Value, path: &str) {
    match path.rsplit_once('.') {
        Some((parent, key)) => {
            if let Some(Value::Object(map)) = get_path_mut(doc, parent) {
                map.remove(key);
            }
        }
        None => {
            if let Value::Object(map) = doc {
                map.remove(path);
            }
        }
    }
}

fn get_path_mut<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(doc, |cur, key| cur.get_mut(key))
}

/// Sélecteur de documents
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    All,
    Id(String),
    Eq(String, Value),
    /// Différent, ou champ absent
    Ne(String, Value),
    In(String, Vec<Value>),
    Exists(String, bool),
    And(Vec<Selector>),
}

impl Selector {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Selector::Eq(path.into(), value.into())
    }

    pub fn ne(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Selector::Ne(path.into(), value.into())
    }

    pub fn in_<V: Into<Value>>(path: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Selector::In(path.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn and(self, other: Selector) -> Self {
        match self {
            Selector::And(mut v) => {
                v.push(other);
                Selector::And(v)
            }
            s => Selector::And(vec![s, other]),
        }
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Selector::All => true,
            Selector::Id(id) => doc.get("_id").and_then(Value::as_str) == Some(id.as_str()),
            Selector::Eq(path, v) => get_path(doc, path).is_some_and(|x| values_equal(x, v)),
            Selector::Ne(path, v) => !get_path(doc, path).is_some_and(|x| values_equal(x, v)),
            Selector::In(path, vs) => {
                get_path(doc, path).is_some_and(|x| vs.iter().any(|v| values_equal(x, v)))
            }
            Selector::Exists(path, wanted) => {
                get_path(doc, path).is_some_and(|x| !x.is_null()) == *wanted
            }
            Selector::And(all) => all.iter().all(|s| s.matches(doc)),
        }
    }

    /// Identifiant ciblé directement, si le sélecteur en impose un
    pub(crate) fn target_id(&self) -> Option<&str> {
        match self {
            Selector::Id(id) => Some(id.as_str()),
            Selector::And(all) => all.iter().find_map(Selector::target_id),
            _ => None,
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Modificateur de type `$set` / `$unset` / `$inc`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modifier {
    pub set: BTreeMap<String, Value>,
    pub unset: Vec<String>,
    pub inc: BTreeMap<String, f64>,
}

impl Modifier {
    pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut m = Self::default();
        m.set.insert(path.into(), value.into());
        m
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.inc.is_empty()
    }

    pub fn apply(&self, doc: &mut Value) {
        for (path, value) in &self.set {
            set_path(doc, path, value.clone());
        }
        for path in &self.unset {
            unset_path(doc, path);
        }
        for (path, delta) in &self.inc {
            let current = get_path(doc, path).and_then(Value::as_f64).unwrap_or(0.0);
            let next = current + delta;
            let value = if next.fract() == 0.0 && next.abs() < i64::MAX as f64 {
                Value::from(next as i64)
            } else {
                Value::from(next)
            };
            set_path(doc, path, value);
        }
    }

    /// Différence de premier niveau entre deux versions d'un document
    pub fn diff(old: &Value, new: &Value) -> Self {
        let mut m = Self::default();
        let empty = Map::new();
        let old = old.as_object().unwrap_or(&empty);
        let new = new.as_object().unwrap_or(&empty);
        for (k, v) in new {
            if old.get(k) != Some(v) {
                m.set.insert(k.clone(), v.clone());
            }
        }
        for k in old.keys() {
            if !new.contains_key(k) {
                m.unset.push(k.clone());
            }
        }
        m
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn sorted_by(path: impl Into<String>, order: SortOrder) -> Self {
        Self {
            sort: vec![(path.into(), order)],
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Trie puis tronque une liste de documents
    pub(crate) fn apply(&self, docs: &mut Vec<Value>) {
        if !self.sort.is_empty() {
            docs.sort_by(|a, b| {
                for (path, order) in &self.sort {
                    let ord = compare_values(get_path(a, path), get_path(b, path));
                    let ord = match order {
                        SortOrder::Asc => ord,
                        SortOrder::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => match (a.as_str(), b.as_str()) {
                (Some(x), Some(y)) => x.cmp(y),
                _ => a.to_string().cmp(&b.to_string()),
            },
        },
    }
}
