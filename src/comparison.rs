use crate::node::Node;
use std::cmp::Ordering;

/// Compares two predicate operands and feeds the ordering to `pred_on_ord`.
/// Numeric strings compare numerically against numbers; anything else falls
/// back to comparing canonical text.
pub fn cmp_values<F>(a: &Node, b: &Node, pred_on_ord: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    match (a, b) {
        (Node::String(sa), Node::String(sb)) => pred_on_ord(sa.cmp(sb)),
        (Node::Number(na), Node::Number(nb)) => cmp_f64(na.as_f64(), nb.as_f64()).is_some_and(pred_on_ord),
        (Node::Bool(ba), Node::Bool(bb)) => pred_on_ord(ba.cmp(bb)),
        (Node::Null, Node::Null) => pred_on_ord(Ordering::Equal),
        (Node::Number(na), Node::String(sb)) => match sb.trim().parse::<f64>() {
            Ok(db) => cmp_f64(na.as_f64(), db).is_some_and(pred_on_ord),
            Err(_) => pred_on_ord(a.canonical_key().cmp(&b.canonical_key())),
        },
        (Node::String(sa), Node::Number(nb)) => match sa.trim().parse::<f64>() {
            Ok(da) => cmp_f64(da, nb.as_f64()).is_some_and(pred_on_ord),
            Err(_) => pred_on_ord(a.canonical_key().cmp(&b.canonical_key())),
        },
        _ => pred_on_ord(a.canonical_key().cmp(&b.canonical_key())),
    }
}

// NaN never satisfies a comparison
fn cmp_f64(a: f64, b: f64) -> Option<Ordering> {
    a.partial_cmp(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_and_numeric_strings() {
        assert!(cmp_values(&Node::from(3i64), &Node::from(3.0), |o| o.is_eq()));
        assert!(cmp_values(&Node::from("10"), &Node::from(9i64), |o| o.is_gt()));
        assert!(!cmp_values(&Node::from(f64::NAN), &Node::from(1i64), |o| o.is_ne()));
    }

    #[test]
    fn mismatched_kinds_are_unequal() {
        assert!(!cmp_values(&Node::Null, &Node::from("null"), |o| o.is_eq()));
        assert!(cmp_values(&Node::from(true), &Node::from("abc"), |o| o.is_ne()));
    }
}
