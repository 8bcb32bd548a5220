//! Per-function call summaries
//!
//! A call is analyzed on its *cut*: the part of the caller's heap connected
//! to the callee's arguments and the globals it uses. Each analyzed cut is a
//! slot holding the callee's result heaps. A later call whose cut is
//! isomorphic to a slot entry (or covered by it through a join) reuses the
//! results and only grafts them back onto its own surround.

use crate::config::CallCacheConfig;
use crate::features::interpreter::PendingCall;
use crate::features::program_model::{FuncId, Program, ProgramAnalysis, TypeTable};
use crate::features::symbolic_heap::{
    are_isomorphic, CVar, HeapJoiner, JoinResult, JoinStatus, SimpleJoiner, SymHeap,
};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Slots of one function, or of one recursive call path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fnc: FuncId,
    /// Whole function sequence of recursive paths
    pub path: Option<Vec<FuncId>>,
}

#[derive(Debug, Clone)]
pub struct CacheSlot {
    pub entry: SymHeap,
    pub computed: bool,
    /// The callee's analysis failed; the slot never gets results
    pub failed: bool,
    pub results: Vec<SymHeap>,
    pub hits: usize,
}

/// Handle of a slot being computed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRef {
    pub key: CacheKey,
    pub index: usize,
}

#[derive(Debug)]
pub enum CacheLookup {
    /// Results of an already computed slot
    Hit(Vec<SymHeap>),
    /// Analyze the callee from `entry`, then call [`CallCache::finish`]
    Compute { slot: SlotRef, entry: SymHeap },
    /// The matching slot is still being computed further up the stack
    InProgress,
    /// Analysis of the matching slot failed earlier
    Failed,
}

/// A call split into the callee's view and the caller's untouched rest
#[derive(Debug)]
pub struct CacheEntry {
    pub lookup: CacheLookup,
    pub surround: SymHeap,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub joins_use_any: usize,
    pub joins_use_sh1: usize,
    pub joins_use_sh2: usize,
    pub joins_use_sh3: usize,
    pub slots: usize,
}

impl CacheStats {
    fn record_join(&mut self, status: JoinStatus) {
        match status {
            JoinStatus::UseAny => self.joins_use_any += 1,
            JoinStatus::UseSh1 => self.joins_use_sh1 += 1,
            JoinStatus::UseSh2 => self.joins_use_sh2 += 1,
            JoinStatus::UseSh3 => self.joins_use_sh3 += 1,
        }
    }

    pub fn joins(&self) -> usize {
        self.joins_use_any + self.joins_use_sh1 + self.joins_use_sh2 + self.joins_use_sh3
    }
}

pub struct CallCache {
    config: CallCacheConfig,
    joiner: Box<dyn HeapJoiner>,
    slots: FxHashMap<CacheKey, Vec<CacheSlot>>,
    stats: CacheStats,
}

impl std::fmt::Debug for CallCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallCache")
            .field("joiner", &self.joiner.name())
            .field("keys", &self.slots.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl CallCache {
    pub fn new(config: CallCacheConfig) -> Self {
        Self::with_joiner(config, Box::new(SimpleJoiner::new()))
    }

    pub fn with_joiner(config: CallCacheConfig, joiner: Box<dyn HeapJoiner>) -> Self {
        Self {
            config,
            joiner,
            slots: FxHashMap::default(),
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn slot(&self, slot: &SlotRef) -> Option<&CacheSlot> {
        self.slots.get(&slot.key).and_then(|s| s.get(slot.index))
    }

    pub fn key_for(call: &PendingCall) -> CacheKey {
        CacheKey {
            fnc: call.callee,
            path: call.path.is_recursive().then(|| call.path.functions()),
        }
    }

    /// Variables a callee can observe at its entry
    fn cut_vars(program: &Program, analysis: &ProgramAnalysis, call: &PendingCall) -> Vec<CVar> {
        let level = call.path.nest_level();
        let mut vars: Vec<CVar> = match program.function(call.callee) {
            Some(fnc) => fnc.args.iter().map(|uid| CVar::new(*uid, level)).collect(),
            None => Vec::new(),
        };
        vars.extend(
            analysis
                .globals_in_use(program, call.callee)
                .into_iter()
                .map(CVar::global),
        );
        vars
    }

    /// Look a call up, creating or widening a slot when nothing matches
    pub fn enter(
        &mut self,
        program: &Program,
        analysis: &ProgramAnalysis,
        call: &PendingCall,
    ) -> CacheEntry {
        let vars = Self::cut_vars(program, analysis, call);
        let (cut, surround) = call.heap.split_component(&vars);
        let key = Self::key_for(call);
        let lookup = self.lookup(key, cut, &program.types);
        CacheEntry { lookup, surround }
    }

    fn lookup(&mut self, key: CacheKey, cut: SymHeap, types: &TypeTable) -> CacheLookup {
        let slots = self.slots.entry(key.clone()).or_default();

        if let Some(index) = slots.iter().position(|s| are_isomorphic(&s.entry, &cut)) {
            return Self::reuse(&mut self.stats, &key, slots, index);
        }

        // only finished slots may be widened; an in-progress one is being relied upon
        let candidates: Vec<usize> = (0..slots.len())
            .rev()
            .filter(|i| slots[*i].computed)
            .take(self.config.join_attempts)
            .collect();
        for index in candidates {
            let Some(joined) = self.joiner.join(&slots[index].entry, &cut, types) else {
                continue;
            };
            return Self::apply_join(&mut self.stats, key, slots, index, joined);
        }

        if slots.len() >= self.config.max_slots_per_function {
            if let Some(index) = slots.iter().rposition(|s| s.computed) {
                if let Some(joined) = self.joiner.join(&slots[index].entry, &cut, types) {
                    return Self::apply_join(&mut self.stats, key, slots, index, joined);
                }
            }
            tracing::warn!(
                fnc = %key.fnc,
                slots = slots.len(),
                "call cache slot limit exceeded, adding a slot anyway"
            );
        }

        self.stats.misses += 1;
        self.stats.slots += 1;
        slots.push(CacheSlot {
            entry: cut.clone(),
            computed: false,
            failed: false,
            results: Vec::new(),
            hits: 0,
        });
        tracing::debug!(fnc = %key.fnc, slot = slots.len() - 1, "call cache miss");
        CacheLookup::Compute {
            slot: SlotRef {
                key,
                index: slots.len() - 1,
            },
            entry: cut,
        }
    }

    /// A slot entry covering the cut is reused, a joined one replaces it
    fn apply_join(
        stats: &mut CacheStats,
        key: CacheKey,
        slots: &mut [CacheSlot],
        index: usize,
        joined: JoinResult,
    ) -> CacheLookup {
        stats.record_join(joined.status);
        match joined.status {
            JoinStatus::UseAny | JoinStatus::UseSh1 => Self::reuse(stats, &key, slots, index),
            JoinStatus::UseSh2 | JoinStatus::UseSh3 => {
                Self::widen(stats, key, slots, index, joined.heap)
            }
        }
    }

    fn reuse(
        stats: &mut CacheStats,
        key: &CacheKey,
        slots: &mut [CacheSlot],
        index: usize,
    ) -> CacheLookup {
        let slot = &mut slots[index];
        if slot.failed {
            return CacheLookup::Failed;
        }
        if !slot.computed {
            return CacheLookup::InProgress;
        }
        slot.hits += 1;
        stats.hits += 1;
        tracing::debug!(fnc = %key.fnc, slot = index, results = slot.results.len(), "call cache hit");
        CacheLookup::Hit(slot.results.clone())
    }

    /// Replace a slot's entry by a more general one and compute it again
    fn widen(
        stats: &mut CacheStats,
        key: CacheKey,
        slots: &mut [CacheSlot],
        index: usize,
        entry: SymHeap,
    ) -> CacheLookup {
        stats.misses += 1;
        let slot = &mut slots[index];
        slot.entry = entry.clone();
        slot.computed = false;
        slot.results.clear();
        tracing::debug!(fnc = %key.fnc, slot = index, "call cache slot widened");
        CacheLookup::Compute {
            slot: SlotRef { key, index },
            entry,
        }
    }

    /// Store the results of a computed slot
    pub fn finish(&mut self, slot: &SlotRef, results: Vec<SymHeap>) {
        if let Some(s) = self
            .slots
            .get_mut(&slot.key)
            .and_then(|slots| slots.get_mut(slot.index))
        {
            s.computed = true;
            s.results = results;
        }
    }

    /// Give up on a slot whose callee could not be analyzed
    pub fn abandon(&mut self, slot: &SlotRef) {
        if let Some(s) = self
            .slots
            .get_mut(&slot.key)
            .and_then(|slots| slots.get_mut(slot.index))
        {
            s.failed = true;
            s.results.clear();
            tracing::debug!(fnc = %slot.key.fnc, slot = slot.index, "call cache slot abandoned");
        }
    }
}

/// Graft a callee result back onto the caller's surround.
///
/// The surround is imported into the result, so a variable bound on both
/// sides keeps the surround's copy.
pub fn merge(result: &SymHeap, surround: &SymHeap) -> SymHeap {
    let mut merged = result.clone();
    merged.import_heap(surround);
    merged
}
