//! Value operators and branch assumptions
//!
//! Everything here works on values of one heap. Results the heap cannot
//! decide become fresh unknowns; the assume functions additionally refine
//! the heap and report whether it is still feasible.

use crate::features::program_model::{BinOp, TypeTable, UnOp};
use crate::features::segment_abstraction::splice_out;
use crate::features::symbolic_heap::{SymHeap, ValueId, ValueOrigin};

/// Unknown result of an operator; uninitialized operands taint it
fn derived_unknown(heap: &mut SymHeap, operands: &[ValueId]) -> ValueId {
    let origin = operands
        .iter()
        .map(|v| heap.origin(*v))
        .find(|o| o.is_uninit() || *o == ValueOrigin::DerefFailed)
        .unwrap_or(ValueOrigin::Unknown);
    heap.fresh_unknown(origin)
}

/// Decide a comparison, `None` if the heap does not know
pub fn compare(heap: &SymHeap, op: BinOp, a: ValueId, b: ValueId) -> Option<bool> {
    let ints = heap.int_of(a).zip(heap.int_of(b));
    match op {
        BinOp::Eq | BinOp::Ne => {
            let eq = if let Some((x, y)) = ints {
                Some(x == y)
            } else if a == b {
                Some(true)
            } else if heap.prove_distinct(a, b) {
                Some(false)
            } else {
                None
            };
            eq.map(|eq| eq == (op == BinOp::Eq))
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let (x, y) = match ints {
                Some(pair) => pair,
                // offsets inside one root are ordered
                None => match (heap.value_root(a), heap.value_root(b)) {
                    (Some(r1), Some(r2)) if r1 == r2 => (heap.value_offset(a), heap.value_offset(b)),
                    _ => return None,
                },
            };
            Some(match op {
                BinOp::Lt => x < y,
                BinOp::Le => x <= y,
                BinOp::Gt => x > y,
                _ => x >= y,
            })
        }
        _ => None,
    }
}

/// Truth of a branch condition
pub fn truth(heap: &SymHeap, v: ValueId) -> Option<bool> {
    if let Some(n) = heap.int_of(v) {
        return Some(n != 0);
    }
    if heap.is_address(v) && heap.prove_distinct(v, ValueId::NULL) {
        return Some(true);
    }
    None
}

pub fn binop(heap: &mut SymHeap, op: BinOp, a: ValueId, b: ValueId) -> ValueId {
    if op.is_comparison() {
        return match compare(heap, op, a, b) {
            Some(res) => heap.bool_value(res),
            None => derived_unknown(heap, &[a, b]),
        };
    }
    let ints = heap.int_of(a).zip(heap.int_of(b));
    let result = match op {
        BinOp::PointerPlus | BinOp::Plus if heap.is_address(a) => {
            heap.int_of(b).map(|n| heap.by_offset(a, n))
        }
        BinOp::Plus if heap.is_address(b) => heap.int_of(a).map(|n| heap.by_offset(b, n)),
        BinOp::Minus if heap.is_address(a) => match heap.int_of(b) {
            Some(n) => Some(heap.by_offset(a, -n)),
            None if heap.value_root(a).is_some() && heap.value_root(a) == heap.value_root(b) => {
                let diff = heap.value_offset(a) - heap.value_offset(b);
                Some(heap.int_value(diff))
            }
            None => None,
        },
        BinOp::Plus => ints.map(|(x, y)| heap.int_value(x.wrapping_add(y))),
        BinOp::Minus => ints.map(|(x, y)| heap.int_value(x.wrapping_sub(y))),
        BinOp::Mult => ints.map(|(x, y)| heap.int_value(x.wrapping_mul(y))),
        BinOp::BitAnd => ints.map(|(x, y)| heap.int_value(x & y)),
        BinOp::BitOr => ints.map(|(x, y)| heap.int_value(x | y)),
        BinOp::TruthAnd => match (truth(heap, a), truth(heap, b)) {
            (Some(false), _) | (_, Some(false)) => Some(ValueId::FALSE),
            (Some(true), Some(true)) => Some(ValueId::TRUE),
            _ => None,
        },
        BinOp::TruthOr => match (truth(heap, a), truth(heap, b)) {
            (Some(true), _) | (_, Some(true)) => Some(ValueId::TRUE),
            (Some(false), Some(false)) => Some(ValueId::FALSE),
            _ => None,
        },
        _ => None,
    };
    match result {
        Some(v) if v != ValueId::INVALID => v,
        _ => derived_unknown(heap, &[a, b]),
    }
}

pub fn unop(heap: &mut SymHeap, op: UnOp, v: ValueId) -> ValueId {
    let result = match op {
        UnOp::Assign => return v,
        UnOp::TruthNot => truth(heap, v).map(|b| heap.bool_value(!b)),
        UnOp::Minus => heap.int_of(v).map(|n| heap.int_value(n.wrapping_neg())),
        UnOp::BitNot => heap.int_of(v).map(|n| heap.int_value(!n)),
    };
    result.unwrap_or_else(|| derived_unknown(heap, &[v]))
}

/// Value that follows a possibly-empty segment whose head `v` addresses
fn splice_candidate(heap: &SymHeap, v: ValueId) -> Option<ValueId> {
    let root = heap.value_root(v)?;
    let seg = heap.segment(root)?;
    if seg.min_len > 0 || heap.value_offset(v) != seg.binding.head {
        return None;
    }
    let far = heap.segment(seg.peer).unwrap_or(seg);
    heap.peek_value_at(seg.peer, far.outward())
}

/// Restrict `heap` to states where `a == b`; false if none remain
pub fn assume_eq(heap: &mut SymHeap, a: ValueId, b: ValueId, types: &TypeTable) -> bool {
    if a == b {
        return true;
    }
    if heap.prove_distinct(a, b) {
        return false;
    }
    if heap.is_unknown(a) {
        return heap.replace(a, b);
    }
    if heap.is_unknown(b) {
        return heap.replace(b, a);
    }

    // a possibly-empty segment equal to something else must be empty
    for (seg_addr, other) in [(a, b), (b, a)] {
        let Some(succ) = splice_candidate(heap, seg_addr) else {
            continue;
        };
        let Some(seg) = heap.value_root(seg_addr).and_then(|r| heap.segment(r).map(|s| (r, s)))
        else {
            continue;
        };
        if !splice_out(heap, seg.0, seg.1, types) {
            return false;
        }
        return assume_eq(heap, succ, other, types);
    }
    true
}

/// Restrict `heap` to states where `a != b`; false if none remain
pub fn assume_neq(heap: &mut SymHeap, a: ValueId, b: ValueId) -> bool {
    if a == b {
        return false;
    }
    if let Some((x, y)) = heap.int_of(a).zip(heap.int_of(b)) {
        return x != y;
    }
    if !heap.prove_distinct(a, b) {
        heap.add_neq(a, b);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::program_model::TypeId;
    use crate::features::symbolic_heap::{BindingOff, DlsEnd, RootId, SegKind, SegmentInfo};
    use pretty_assertions::assert_eq;

    fn node_types(types: &mut TypeTable) -> (TypeId, TypeId) {
        let node = types.declare_struct("node");
        let node_ptr = types.ptr(node);
        types.define_struct(node, &[("next", node_ptr)]).unwrap();
        (node, node_ptr)
    }

    /// One possibly-empty SLS ending in NULL
    fn empty_capable_segment(types: &mut TypeTable) -> (SymHeap, RootId, ValueId) {
        let (node, node_ptr) = node_types(types);
        let mut heap = SymHeap::new();
        let addr = heap.allocate(types.size_of(node), false, Some(node));
        let root = heap.value_root(addr).unwrap();
        let obj = heap.object_at(root, 0, node_ptr, types).unwrap();
        heap.set_value(obj, ValueId::NULL, types);
        heap.set_segment(
            root,
            Some(SegmentInfo {
                kind: SegKind::Sls,
                binding: BindingOff::sls(0, 0),
                min_len: 0,
                peer: root,
                end: DlsEnd::First,
            }),
        );
        (heap, root, addr)
    }

    #[test]
    fn test_integer_operators() {
        let mut heap = SymHeap::new();
        let two = heap.int_value(2);
        let five = heap.int_value(5);
        let sum = binop(&mut heap, BinOp::Plus, two, five);
        assert_eq!(heap.int_of(sum), Some(7));
        let lt = binop(&mut heap, BinOp::Lt, two, five);
        assert_eq!(lt, ValueId::TRUE);
        let neg = unop(&mut heap, UnOp::Minus, five);
        assert_eq!(heap.int_of(neg), Some(-5));
        let not = unop(&mut heap, UnOp::TruthNot, two);
        assert_eq!(not, ValueId::FALSE);
    }

    #[test]
    fn test_pointer_arithmetic_stays_in_root() {
        let mut heap = SymHeap::new();
        let p = heap.allocate(16, false, None);
        let eight = heap.int_value(8);
        let q = binop(&mut heap, BinOp::PointerPlus, p, eight);
        assert_eq!(heap.value_root(q), heap.value_root(p));
        assert_eq!(heap.value_offset(q), 8);
        let diff = binop(&mut heap, BinOp::Minus, q, p);
        assert_eq!(heap.int_of(diff), Some(8));
    }

    #[test]
    fn test_unknown_operands_taint_results() {
        let mut heap = SymHeap::new();
        let uninit = heap.fresh_unknown(ValueOrigin::StackUninit);
        let one = heap.int_value(1);
        let v = binop(&mut heap, BinOp::Plus, uninit, one);
        assert!(heap.is_unknown(v));
        assert_eq!(heap.origin(v), ValueOrigin::StackUninit);
        assert_eq!(truth(&heap, v), None);
    }

    #[test]
    fn test_fresh_allocation_is_never_null() {
        let mut heap = SymHeap::new();
        let p = heap.allocate(8, false, None);
        assert_eq!(compare(&heap, BinOp::Eq, p, ValueId::NULL), Some(false));
        assert_eq!(truth(&heap, p), Some(true));
        assert!(!assume_eq(&mut heap, p, ValueId::NULL, &TypeTable::new()));
    }

    #[test]
    fn test_assume_eq_substitutes_unknowns() {
        let mut types = TypeTable::new();
        let int = types.int(4);
        let mut heap = SymHeap::new();
        let cell = heap.allocate(4, false, Some(int));
        let root = heap.value_root(cell).unwrap();
        let obj = heap.object_at(root, 0, int, &types).unwrap();
        let u = heap.fresh_unknown(ValueOrigin::Unknown);
        heap.set_value(obj, u, &types);

        let three = heap.int_value(3);
        assert!(assume_eq(&mut heap, u, three, &types));
        assert_eq!(heap.value_of(obj, &types), three);
    }

    #[test]
    fn test_assume_neq_records_disequality() {
        let mut heap = SymHeap::new();
        let u = heap.fresh_unknown(ValueOrigin::Unknown);
        assert!(assume_neq(&mut heap, u, ValueId::NULL));
        assert_eq!(compare(&heap, BinOp::Ne, u, ValueId::NULL), Some(true));
        assert!(!assume_eq(&mut heap, u, ValueId::NULL, &TypeTable::new()));
        assert!(!assume_neq(&mut heap, u, u));
    }

    #[test]
    fn test_equality_with_null_empties_a_segment() {
        let mut types = TypeTable::new();
        let (mut heap, root, addr) = empty_capable_segment(&mut types);
        assert_eq!(compare(&heap, BinOp::Eq, addr, ValueId::NULL), None);

        let mut empty = heap.clone();
        assert!(assume_eq(&mut empty, addr, ValueId::NULL, &types));
        assert!(!empty.is_valid_root(root));

        assert!(assume_neq(&mut heap, addr, ValueId::NULL));
        assert!(!assume_eq(&mut heap, addr, ValueId::NULL, &types));
    }
}
