// ⚖️ Comparison Primitives - Tolerant-null equality + order-insensitive tree diff
// Every field check in the reconciler goes through `values_agree`.

use crate::layout::Address;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

// ============================================================================
// FIELD VALUES
// ============================================================================

/// Value of one comparable column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(u32),
    Addr(Address),
    Text(String),
}

impl FieldValue {
    /// Text column; empty text is unset
    pub fn text(raw: &str) -> Option<FieldValue> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(FieldValue::Text(trimmed.to_string()))
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Addr(a) => write!(f, "{}", a),
            FieldValue::Text(t) => f.write_str(t),
        }
    }
}

/// Zero / empty values that a source may legitimately omit
pub trait Blank {
    fn is_blank(&self) -> bool;
}

impl Blank for u32 {
    fn is_blank(&self) -> bool {
        *self == 0
    }
}

impl Blank for u64 {
    fn is_blank(&self) -> bool {
        *self == 0
    }
}

impl Blank for str {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.as_str().is_blank()
    }
}

impl Blank for Address {
    fn is_blank(&self) -> bool {
        self.value() == 0
    }
}

impl Blank for FieldValue {
    fn is_blank(&self) -> bool {
        match self {
            FieldValue::Int(v) => v.is_blank(),
            FieldValue::Addr(a) => a.is_blank(),
            FieldValue::Text(t) => t.is_blank(),
        }
    }
}

impl<T: Blank + ?Sized> Blank for &T {
    fn is_blank(&self) -> bool {
        (**self).is_blank()
    }
}

/// Tolerant-null equality
///
/// - (None, None) agree
/// - (Some(v), None) agree only when `v` is blank (0 / empty)
/// - (Some(a), Some(b)) agree when `a == b`
///
/// Example:
/// ```
/// use eeprom_reconcile::compare::values_agree;
///
/// assert!(values_agree::<u32>(None, None));
/// assert!(values_agree(Some(0u32), None));
/// assert!(!values_agree(Some(5u32), None));
/// assert!(values_agree(Some(5u32), Some(5)));
/// ```
pub fn values_agree<T: PartialEq + Blank>(a: Option<T>, b: Option<T>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(v), None) | (None, Some(v)) => v.is_blank(),
        (Some(x), Some(y)) => x == y,
    }
}

// ============================================================================
// TREE DIFF
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffKind {
    /// Present on both sides with different values
    Changed,
    /// Only present in the left tree
    OnlyLeft,
    /// Only present in the right tree
    OnlyRight,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeDifference {
    pub path: String,
    pub kind: DiffKind,
    pub left: Option<Value>,
    pub right: Option<Value>,
}

impl fmt::Display for TreeDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<Value>| match v {
            Some(value) => compact(value),
            None => "<none>".to_string(),
        };
        write!(f, "{} ({} vs {})", self.path, show(&self.left), show(&self.right))
    }
}

/// Serialized form with sorted object keys, used as a canonical sort key
pub fn canonical(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Canonical form cut to a printable length
pub fn compact(value: &Value) -> String {
    const LIMIT: usize = 80;
    let text = canonical(value);
    if text.chars().count() > LIMIT {
        let cut: String = text.chars().take(LIMIT).collect();
        format!("{}...", cut)
    } else {
        text
    }
}

/// Structural diff of two JSON trees
///
/// Arrays whose path satisfies `unordered` are compared as multisets; when
/// they differ, elements are paired after sorting by their `name` field.
pub fn diff_trees<F>(left: &Value, right: &Value, unordered: F) -> Vec<TreeDifference>
where
    F: Fn(&str) -> bool,
{
    let mut out = Vec::new();
    diff_at("$", left, right, &unordered, &mut out);
    out
}

fn diff_at<F>(path: &str, left: &Value, right: &Value, unordered: &F, out: &mut Vec<TreeDifference>)
where
    F: Fn(&str) -> bool,
{
    match (left, right) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, a_val) in a {
                let child = format!("{}.{}", path, key);
                match b.get(key) {
                    Some(b_val) => diff_at(&child, a_val, b_val, unordered, out),
                    None => out.push(TreeDifference {
                        path: child,
                        kind: DiffKind::OnlyLeft,
                        left: Some(a_val.clone()),
                        right: None,
                    }),
                }
            }
            for (key, b_val) in b {
                if !a.contains_key(key) {
                    out.push(TreeDifference {
                        path: format!("{}.{}", path, key),
                        kind: DiffKind::OnlyRight,
                        left: None,
                        right: Some(b_val.clone()),
                    });
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            if unordered(path) {
                diff_unordered(path, a, b, unordered, out);
            } else {
                diff_ordered(path, a.iter().collect(), b.iter().collect(), unordered, out);
            }
        }
        _ => {
            if left != right {
                out.push(TreeDifference {
                    path: path.to_string(),
                    kind: DiffKind::Changed,
                    left: Some(left.clone()),
                    right: Some(right.clone()),
                });
            }
        }
    }
}

fn diff_ordered<F>(
    path: &str,
    a: Vec<&Value>,
    b: Vec<&Value>,
    unordered: &F,
    out: &mut Vec<TreeDifference>,
) where
    F: Fn(&str) -> bool,
{
    for i in 0..a.len().max(b.len()) {
        let child = format!("{}[{}]", path, i);
        match (a.get(i), b.get(i)) {
            (Some(x), Some(y)) => diff_at(&child, x, y, unordered, out),
            (Some(x), None) => out.push(TreeDifference {
                path: child,
                kind: DiffKind::OnlyLeft,
                left: Some((*x).clone()),
                right: None,
            }),
            (None, Some(y)) => out.push(TreeDifference {
                path: child,
                kind: DiffKind::OnlyRight,
                left: None,
                right: Some((*y).clone()),
            }),
            (None, None) => {}
        }
    }
}

fn diff_unordered<F>(
    path: &str,
    a: &[Value],
    b: &[Value],
    unordered: &F,
    out: &mut Vec<TreeDifference>,
) where
    F: Fn(&str) -> bool,
{
    let mut a_keys: Vec<String> = a.iter().map(canonical).collect();
    let mut b_keys: Vec<String> = b.iter().map(canonical).collect();
    a_keys.sort();
    b_keys.sort();
    if a_keys == b_keys {
        return;
    }

    // Inconclusive: pair siblings by name and report element-level differences
    let by_name = |x: &&Value, y: &&Value| -> Ordering {
        let name = |v: &Value| v.get("name").and_then(Value::as_str).unwrap_or("").to_string();
        name(*x)
            .cmp(&name(*y))
            .then_with(|| canonical(*x).cmp(&canonical(*y)))
    };
    let mut a_sorted: Vec<&Value> = a.iter().collect();
    let mut b_sorted: Vec<&Value> = b.iter().collect();
    a_sorted.sort_by(by_name);
    b_sorted.sort_by(by_name);

    diff_ordered(path, a_sorted, b_sorted, unordered, out);
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn any_array(_: &str) -> bool {
        true
    }

    fn no_array(_: &str) -> bool {
        false
    }

    #[test]
    fn test_tolerant_null_equality() {
        assert!(values_agree::<u32>(None, None));
        assert!(values_agree(Some(0u32), None));
        assert!(values_agree(None, Some(0u32)));
        assert!(!values_agree(Some(5u32), None));
        assert!(!values_agree(None, Some(5u32)));
        assert!(values_agree(Some(5u32), Some(5)));
        assert!(!values_agree(Some(5u32), Some(6)));
        // Zero against zero is plain equality
        assert!(values_agree(Some(0u32), Some(0)));
    }

    #[test]
    fn test_tolerant_null_field_values() {
        let empty = FieldValue::text("  ");
        assert_eq!(empty, None);

        let blank_text = FieldValue::Text(String::new());
        assert!(values_agree(Some(&blank_text), None));

        let addr = FieldValue::Addr(Address(0x0808_0000));
        assert!(!values_agree(Some(&addr), None));
        assert!(!values_agree(Some(&addr), Some(&FieldValue::Int(0x0808_0000))));
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Int(3072).to_string(), "3072");
        assert_eq!(FieldValue::Addr(Address(0x0808_1800)).to_string(), "0x08081800");
        assert_eq!(FieldValue::Text("Cat.4 (L151)".into()).to_string(), "Cat.4 (L151)");
    }

    #[test]
    fn test_identical_trees_have_no_diff() {
        let tree = json!({"name": "STM32L071RB", "memory": [[{"name": "BANK_1", "kind": "flash"}]]});
        assert!(diff_trees(&tree, &tree.clone(), no_array).is_empty());
    }

    #[test]
    fn test_scalar_and_key_differences() {
        let left = json!({"a": 1, "b": {"c": "x"}, "only_left": true});
        let right = json!({"a": 2, "b": {"c": "x"}, "only_right": null});

        let diffs = diff_trees(&left, &right, no_array);
        assert_eq!(diffs.len(), 3);
        assert!(diffs.iter().any(|d| d.path == "$.a" && d.kind == DiffKind::Changed));
        assert!(diffs.iter().any(|d| d.path == "$.only_left" && d.kind == DiffKind::OnlyLeft));
        assert!(diffs.iter().any(|d| d.path == "$.only_right" && d.kind == DiffKind::OnlyRight));
    }

    #[test]
    fn test_ordered_arrays_detect_reordering() {
        let left = json!([1, 2]);
        let right = json!([2, 1]);

        assert_eq!(diff_trees(&left, &right, no_array).len(), 2);
        assert!(diff_trees(&left, &right, any_array).is_empty());
    }

    #[test]
    fn test_unordered_arrays_pair_by_name() {
        let left = json!([
            {"name": "BANK_1", "size": 65536},
            {"name": "OTP", "size": 1024}
        ]);
        let right = json!([
            {"name": "OTP", "size": 1024},
            {"name": "BANK_1", "size": 131072}
        ]);

        let diffs = diff_trees(&left, &right, any_array);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "$[0].size");
        assert_eq!(diffs[0].left, Some(json!(65536)));
        assert_eq!(diffs[0].right, Some(json!(131072)));
    }

    #[test]
    fn test_unordered_arrays_report_extra_elements() {
        let left = json!([{"name": "A"}]);
        let right = json!([{"name": "A"}, {"name": "B"}]);

        let diffs = diff_trees(&left, &right, any_array);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DiffKind::OnlyRight);
    }

    #[test]
    fn test_unordered_duplicates_count() {
        let left = json!([{"name": "A"}, {"name": "A"}]);
        let right = json!([{"name": "A"}]);

        assert!(!diff_trees(&left, &right, any_array).is_empty());
    }

    #[test]
    fn test_difference_display_truncates() {
        let diff = TreeDifference {
            path: "$.x".to_string(),
            kind: DiffKind::OnlyLeft,
            left: Some(json!("y".repeat(200))),
            right: None,
        };
        let text = diff.to_string();
        assert!(text.starts_with("$.x ("));
        assert!(text.contains("...") && text.ends_with("vs <none>)"));
    }
}
