//! Expressions d'activation symboliques (`#<id>.start|.end [+|- n]`)

use crate::model::{EnableValue, TimelineObject};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Start,
    End,
}

impl Edge {
    fn as_str(&self) -> &'static str {
        match self {
            Edge::Start => "start",
            Edge::End => "end",
        }
    }
}

/// `#<id>.<edge>`, suivi de `+ n` ou `- n` si `offset` est présent
pub fn reference(id: &str, edge: Edge, offset: Option<i64>) -> EnableValue {
    let base = format!("#{}.{}", id, edge.as_str());
    EnableValue::Expr(match offset {
        None => base,
        Some(n) if n < 0 => format!("{} - {}", base, -n),
        Some(n) => format!("{} + {}", base, n),
    })
}

/// Variante qui écrit toujours `- n` (ancrage d'un groupe futur sur une fin)
pub fn reference_minus(id: &str, edge: Edge, amount: i64) -> EnableValue {
    EnableValue::Expr(format!("#{}.{} - {}", id, edge.as_str(), amount))
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Réécrit les identifiants référencés par `#id` dans une expression
pub fn rewrite_references(expr: &str, mut f: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut rest = expr;
    while let Some(pos) = rest.find('#') {
        out.push_str(&rest[..=pos]);
        rest = &rest[pos + 1..];
        let end = rest.find(|c: char| !is_id_char(c)).unwrap_or(rest.len());
        let id = &rest[..end];
        match f(id) {
            Some(new_id) => out.push_str(&new_id),
            None => out.push_str(id),
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

fn rewrite_value(value: &mut Option<EnableValue>, f: &mut impl FnMut(&str) -> Option<String>) {
    if let Some(EnableValue::Expr(expr)) = value {
        *expr = rewrite_references(expr, &mut *f);
    }
}

/// Préfixe les ids d'un ensemble d'objets, ainsi que les références
/// internes à cet ensemble (`inGroup`, expressions `enable`)
pub fn prefix_all_object_ids(objects: &mut [TimelineObject], prefix: &str) {
    let ids: HashSet<String> = objects.iter().map(|o| o.id.clone()).collect();
    let mut rename = |id: &str| ids.contains(id).then(|| format!("{}{}", prefix, id));

    for obj in objects.iter_mut() {
        obj.id = format!("{}{}", prefix, obj.id);
        if let Some(group) = &obj.in_group {
            if let Some(renamed) = rename(group) {
                obj.in_group = Some(renamed);
            }
        }
        rewrite_value(&mut obj.enable.start, &mut rename);
        rewrite_value(&mut obj.enable.end, &mut rename);
        rewrite_value(&mut obj.enable.while_, &mut rename);
    }
}
