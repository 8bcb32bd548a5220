//! List segment abstraction
//!
//! ```text
//! discovery  ──►  fold  ──►  (heap with SLS/DLS roots)
//!                               │ dereference through a segment
//!                               ▼
//!                          concretize ──► [non-empty heap, empty heap?]
//! ```
//!
//! Folding merges a chain of equally shaped heap nodes into one abstract
//! root describing "N or more nodes". Concretization is the inverse step the
//! interpreter needs before it can touch a node inside a segment.

pub mod concretize;
pub mod discovery;
pub mod fold;
pub mod links;

pub use concretize::{concretize, splice_out};
pub use discovery::{discover_best_abstraction, Chain, Unit};
pub use fold::{fold_chain, DLS_MIN_LEN_CAP, SLS_MIN_LEN_CAP};

use crate::config::AbstractionConfig;
use crate::features::program_model::TypeTable;
use crate::features::symbolic_heap::{RootId, SymHeap};

/// Fold chains until no candidate is left; returns the number of folds
pub fn abstract_heap(heap: &mut SymHeap, config: &AbstractionConfig, types: &TypeTable) -> usize {
    // every fold removes a root or turns a concrete one abstract
    let limit = 2 * heap.live_roots().len() + 1;
    let mut folds = 0;
    while folds < limit {
        let Some(chain) = discover_best_abstraction(heap, config, types) else {
            break;
        };
        if fold_chain(heap, &chain, types).is_none() {
            break;
        }
        folds += 1;
    }
    folds
}

/// Folding and concretization bound to one configuration
#[derive(Debug, Clone, Copy)]
pub struct SegmentAbstractor<'a> {
    config: &'a AbstractionConfig,
    types: &'a TypeTable,
}

impl<'a> SegmentAbstractor<'a> {
    pub fn new(config: &'a AbstractionConfig, types: &'a TypeTable) -> Self {
        Self { config, types }
    }

    pub fn abstract_heap(&self, heap: &mut SymHeap) -> usize {
        let folds = abstract_heap(heap, self.config, self.types);
        if folds > 0 {
            tracing::debug!(folds, roots = heap.live_roots().len(), "heap abstracted");
        }
        folds
    }

    pub fn concretize(&self, heap: SymHeap, root: RootId) -> Vec<SymHeap> {
        concretize(heap, root, self.types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::program_model::{TypeId, VarDecl, VarScope, VarUid};
    use crate::features::symbolic_heap::{CVar, DlsEnd, SegKind, ValueId};
    use crate::shared::models::Location;
    use proptest::prelude::*;

    struct ListTypes {
        node: TypeId,
        node_ptr: TypeId,
        int: TypeId,
    }

    fn sls_types(types: &mut TypeTable) -> ListTypes {
        let node = types.declare_struct("node");
        let node_ptr = types.ptr(node);
        let int = types.int(4);
        types.define_struct(node, &[("next", node_ptr), ("data", int)]).unwrap();
        ListTypes { node, node_ptr, int }
    }

    fn dls_types(types: &mut TypeTable) -> ListTypes {
        let node = types.declare_struct("dnode");
        let node_ptr = types.ptr(node);
        let int = types.int(4);
        types
            .define_struct(node, &[("next", node_ptr), ("prev", node_ptr), ("data", int)])
            .unwrap();
        ListTypes { node, node_ptr, int }
    }

    fn head_var(heap: &mut SymHeap, lt: &ListTypes, types: &TypeTable) -> RootId {
        let decl = VarDecl {
            uid: VarUid(0),
            name: "head".into(),
            ty: lt.node_ptr,
            scope: VarScope::Local,
            loc: Location::unknown(),
        };
        let addr = heap.address_of(CVar::new(VarUid(0), 1), &decl, types);
        heap.value_root(addr).unwrap()
    }

    fn write(heap: &mut SymHeap, root: RootId, off: i64, ty: TypeId, v: ValueId, types: &TypeTable) {
        let obj = heap.object_at(root, off, ty, types).unwrap();
        heap.set_value(obj, v, types);
    }

    /// `head -> n1 -> ... -> NULL`, optional data per node
    fn sls_heap(data: &[Option<i64>], types: &mut TypeTable) -> (SymHeap, ListTypes) {
        let lt = sls_types(types);
        let size = types.size_of(lt.node);
        let mut heap = SymHeap::new();
        let var = head_var(&mut heap, &lt, types);
        let mut prev = (var, 0);
        for d in data {
            let p = heap.allocate(size, false, Some(lt.node));
            write(&mut heap, prev.0, prev.1, lt.node_ptr, p, types);
            let root = heap.value_root(p).unwrap();
            if let Some(n) = d {
                let v = heap.int_value(*n);
                write(&mut heap, root, 8, lt.int, v, types);
            }
            prev = (root, 0);
        }
        write(&mut heap, prev.0, prev.1, lt.node_ptr, ValueId::NULL, types);
        (heap, lt)
    }

    fn dls_heap(len: usize, types: &mut TypeTable) -> (SymHeap, ListTypes) {
        let lt = dls_types(types);
        let size = types.size_of(lt.node);
        let mut heap = SymHeap::new();
        let var = head_var(&mut heap, &lt, types);
        let mut nodes: Vec<ValueId> = Vec::new();
        for _ in 0..len {
            nodes.push(heap.allocate(size, false, Some(lt.node)));
        }
        write(&mut heap, var, 0, lt.node_ptr, nodes[0], types);
        for (i, node) in nodes.iter().enumerate() {
            let root = heap.value_root(*node).unwrap();
            let next = nodes.get(i + 1).copied().unwrap_or(ValueId::NULL);
            let prev = if i == 0 { ValueId::NULL } else { nodes[i - 1] };
            write(&mut heap, root, 0, lt.node_ptr, next, types);
            write(&mut heap, root, 8, lt.node_ptr, prev, types);
        }
        (heap, lt)
    }

    fn head_target(heap: &SymHeap) -> RootId {
        let var = heap.var_root(CVar::new(VarUid(0), 1)).unwrap();
        let v = heap.peek_value_at(var, 0).unwrap();
        heap.value_root(v).unwrap()
    }

    /// Concrete nodes from `head` to NULL; `None` if a segment is in the way
    fn concrete_length(heap: &SymHeap) -> Option<usize> {
        let var = heap.var_root(CVar::new(VarUid(0), 1))?;
        let mut cur = heap.peek_value_at(var, 0)?;
        let mut len = 0;
        while cur != ValueId::NULL {
            let root = heap.value_root(cur)?;
            if heap.is_abstract(root) {
                return None;
            }
            len += 1;
            cur = heap.peek_value_at(root, 0)?;
        }
        Some(len)
    }

    #[test]
    fn test_three_node_list_folds_into_one_segment() {
        let mut types = TypeTable::new();
        let (mut heap, _) = sls_heap(&[None, None, None], &mut types);
        let config = AbstractionConfig::default();

        let folds = SegmentAbstractor::new(&config, &types).abstract_heap(&mut heap);
        assert!(folds >= 1);
        assert_eq!(heap.live_roots().len(), 2);
        let seg_root = head_target(&heap);
        let seg = heap.segment(seg_root).unwrap();
        assert_eq!(seg.kind, SegKind::Sls);
        assert_eq!(seg.min_len, 1);
        assert_eq!(heap.peek_value_at(seg_root, 0), Some(ValueId::NULL));
    }

    #[test]
    fn test_concretization_splits_only_possibly_empty_segments() {
        let mut types = TypeTable::new();
        let (mut heap, _) = sls_heap(&[None, None, None], &mut types);
        let config = AbstractionConfig::default();
        let abstractor = SegmentAbstractor::new(&config, &types);
        abstractor.abstract_heap(&mut heap);

        let seg_root = head_target(&heap);
        let once = abstractor.concretize(heap, seg_root);
        assert_eq!(once.len(), 1);
        let first = &once[0];
        let node = head_target(first);
        assert!(!first.is_abstract(node));
        assert_eq!(first.min_length(seg_root), 0);
        let link = first.peek_value_at(node, 0).unwrap();
        assert_eq!(first.value_root(link), Some(seg_root));

        let twice = abstractor.concretize(first.clone(), seg_root);
        assert_eq!(twice.len(), 2);
        // the empty variant routes the node straight to NULL
        let empty = &twice[1];
        assert_eq!(empty.peek_value_at(node, 0), Some(ValueId::NULL));
        assert!(!empty.is_valid_root(seg_root));
        assert_eq!(empty.live_roots().len(), 2);
    }

    #[test]
    fn test_differing_data_needs_the_generalizing_threshold() {
        let mut types = TypeTable::new();
        let (mut short, _) = sls_heap(&[Some(1), Some(2)], &mut types);
        let config = AbstractionConfig::default();
        assert_eq!(abstract_heap(&mut short, &config, &types), 0);

        let mut types = TypeTable::new();
        let (mut long, _) = sls_heap(&[Some(1), Some(2), Some(3)], &mut types);
        assert!(abstract_heap(&mut long, &config, &types) >= 1);
        let seg_root = head_target(&long);
        let data = long.peek_value_at(seg_root, 8).unwrap();
        assert!(long.is_unknown(data));
    }

    #[test]
    fn test_equal_data_is_kept_by_folding() {
        let mut types = TypeTable::new();
        let (mut heap, _) = sls_heap(&[Some(7), Some(7)], &mut types);
        let config = AbstractionConfig::default();
        assert_eq!(abstract_heap(&mut heap, &config, &types), 1);
        let seg_root = head_target(&heap);
        let data = heap.peek_value_at(seg_root, 8).unwrap();
        assert_eq!(heap.int_of(data), Some(7));
    }

    #[test]
    fn test_externally_referenced_node_stays_concrete() {
        let mut types = TypeTable::new();
        let (mut heap, lt) = sls_heap(&[None, None, None], &mut types);
        // a second variable pinning the middle node
        let decl = VarDecl {
            uid: VarUid(1),
            name: "mid".into(),
            ty: lt.node_ptr,
            scope: VarScope::Local,
            loc: Location::unknown(),
        };
        let addr = heap.address_of(CVar::new(VarUid(1), 1), &decl, &types);
        let mid_var = heap.value_root(addr).unwrap();
        let n1 = head_target(&heap);
        let n2 = heap.peek_value_at(n1, 0).unwrap();
        write(&mut heap, mid_var, 0, lt.node_ptr, n2, &types);

        let config = AbstractionConfig::default();
        assert_eq!(abstract_heap(&mut heap, &config, &types), 1);
        // only the tail behind the pinned node folds
        let first = head_target(&heap);
        assert!(!heap.is_abstract(first));
        let link = heap.peek_value_at(first, 0).unwrap();
        let seg_root = heap.value_root(link).unwrap();
        assert!(heap.is_abstract(seg_root));
        let pinned = heap.peek_value_at(mid_var, 0).unwrap();
        assert_eq!(heap.value_root(pinned), Some(seg_root));
    }

    #[test]
    fn test_dls_fold_and_concretize_from_first() {
        let mut types = TypeTable::new();
        let (mut heap, _) = dls_heap(3, &mut types);
        let config = AbstractionConfig::default();
        abstract_heap(&mut heap, &config, &types);

        let first = head_target(&heap);
        let seg = heap.segment(first).unwrap();
        assert_eq!(seg.kind, SegKind::Dls);
        assert_eq!(seg.end, DlsEnd::First);
        assert_eq!(seg.min_len, 2);
        let last = heap.segment(seg.peer).unwrap();
        assert_eq!(last.peer, first);
        assert_eq!(last.end, DlsEnd::Last);

        let out = concretize(heap, first, &types);
        assert_eq!(out.len(), 1);
        let h = &out[0];
        let node = head_target(h);
        assert!(!h.is_abstract(node));
        assert_eq!(h.min_length(first), 1);
        let back = h.peek_value_at(first, 8).unwrap();
        assert_eq!(h.value_root(back), Some(node));
        assert_eq!(h.peek_value_at(node, 8), Some(ValueId::NULL));
    }

    #[test]
    fn test_disabled_dls_leaves_doubly_linked_nodes_alone() {
        let mut types = TypeTable::new();
        let (mut heap, _) = dls_heap(3, &mut types);
        let config = AbstractionConfig::default().enable_dls(false);
        assert_eq!(abstract_heap(&mut heap, &config, &types), 0);
        assert_eq!(heap.live_roots().len(), 4);
    }

    proptest! {
        #[test]
        fn prop_dls_ends_point_at_each_other(len in 2usize..7) {
            let mut types = TypeTable::new();
            let (mut heap, _) = dls_heap(len, &mut types);
            let config = AbstractionConfig::default();
            abstract_heap(&mut heap, &config, &types);
            for root in heap.live_roots() {
                if let Some(seg) = heap.segment(root) {
                    let peer = heap.segment(seg.peer).unwrap();
                    prop_assert_eq!(peer.peer, root);
                    prop_assert_ne!(peer.end, seg.end);
                    prop_assert_eq!(peer.min_len, seg.min_len);
                    prop_assert!(seg.min_len <= DLS_MIN_LEN_CAP);
                }
            }
        }

        #[test]
        fn prop_folded_list_unfolds_back_to_its_nodes(len in 2usize..7, doubly in any::<bool>()) {
            let mut types = TypeTable::new();
            let (mut heap, _) = if doubly {
                dls_heap(len, &mut types)
            } else {
                sls_heap(&vec![None; len], &mut types)
            };
            let config = AbstractionConfig::default();
            abstract_heap(&mut heap, &config, &types);
            let seg_root = head_target(&heap);
            prop_assert!(heap.is_abstract(seg_root));
            prop_assert_eq!(concrete_length(&heap), None);

            for _ in 0..len {
                let min_len = heap.min_length(seg_root);
                let mut variants = concretize(heap, seg_root, &types);
                // an empty variant only when the segment may be empty
                prop_assert_eq!(variants.len(), if min_len == 0 { 2 } else { 1 });
                heap = variants.swap_remove(0);
            }
            prop_assert_eq!(heap.min_length(seg_root), 0);

            let mut variants = concretize(heap, seg_root, &types);
            prop_assert_eq!(variants.len(), 2);
            let empty = variants.pop().unwrap();
            prop_assert!(!empty.is_valid_root(seg_root));
            prop_assert_eq!(concrete_length(&empty), Some(len));
        }

        #[test]
        fn prop_sls_fold_leaves_one_segment(len in 2usize..8) {
            let mut types = TypeTable::new();
            let data = vec![None; len];
            let (mut heap, _) = sls_heap(&data, &mut types);
            let config = AbstractionConfig::default();
            abstract_heap(&mut heap, &config, &types);
            prop_assert_eq!(heap.live_roots().len(), 2);
            let seg = heap.segment(head_target(&heap)).unwrap();
            prop_assert_eq!(seg.min_len, SLS_MIN_LEN_CAP);
        }
    }
}
