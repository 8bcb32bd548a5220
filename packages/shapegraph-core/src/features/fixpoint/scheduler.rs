//! Fixpoint computation over one analysis root and everything it calls

use super::cancel::CancellationFlag;
use super::frame::{Cursor, ExecFrame, PendingReturn};
use crate::config::{AbstractionPolicy, AnalysisConfig};
use crate::features::call_cache::{merge, CacheLookup, CallCache, CallPath, SlotRef};
use crate::features::diagnostics::{FindingKind, Reporter};
use crate::features::interpreter::{Interpreter, PendingCall, StepResult};
use crate::features::program_model::{BlockId, FuncId, Function, Program, ProgramAnalysis};
use crate::features::segment_abstraction::SegmentAbstractor;
use crate::features::symbolic_heap::{HeapJoiner, SymHeap};
use crate::shared::models::{EngineError, EngineResult, ErrorKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub blocks_processed: usize,
    pub heaps_processed: usize,
    pub folds: usize,
    pub max_stack_depth: usize,
}

impl SchedulerStats {
    pub fn absorb(&mut self, other: &SchedulerStats) {
        self.blocks_processed += other.blocks_processed;
        self.heaps_processed += other.heaps_processed;
        self.folds += other.folds;
        self.max_stack_depth = self.max_stack_depth.max(other.max_stack_depth);
    }
}

/// What a single step did to the top frame
enum Step<'a> {
    Continue,
    Enter(ExecFrame<'a>),
    Done,
}

/// Drives block worklists of a stack of frames until every frame is stable.
///
/// The stack is explicit: entering a callee pushes a frame, a finished
/// frame hands its result heaps to the frame below it.
pub struct FixpointScheduler<'a> {
    program: &'a Program,
    analysis: &'a ProgramAnalysis,
    config: &'a AnalysisConfig,
    joiner: &'a dyn HeapJoiner,
    cache: &'a mut CallCache,
    reporter: &'a mut Reporter,
    cancel: CancellationFlag,
    stats: SchedulerStats,
}

impl<'a> FixpointScheduler<'a> {
    pub fn new(
        program: &'a Program,
        analysis: &'a ProgramAnalysis,
        config: &'a AnalysisConfig,
        joiner: &'a dyn HeapJoiner,
        cache: &'a mut CallCache,
        reporter: &'a mut Reporter,
    ) -> Self {
        Self {
            program,
            analysis,
            config,
            joiner,
            cache,
            reporter,
            cancel: CancellationFlag::new(),
            stats: SchedulerStats::default(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn into_stats(self) -> SchedulerStats {
        self.stats
    }

    /// Run `fnc` from `entry` and return the heaps reaching its returns
    pub fn run(&mut self, fnc: FuncId, path: CallPath, entry: SymHeap) -> EngineResult<Vec<SymHeap>> {
        let program = self.program;
        let function = program.function(fnc).ok_or_else(|| {
            EngineError::unknown_function(format!("no function with id {}", fnc))
        })?;
        if !function.is_defined() {
            return Err(EngineError::unknown_function(format!(
                "function {} has no body",
                function.name
            ))
            .at(&function.loc));
        }
        tracing::debug!(fnc = %function.name, "fixpoint run started");

        let mut stack = vec![ExecFrame::new(function, path, entry, None)];
        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(frames = stack.len(), "analysis cancelled");
                return Err(EngineError::cancelled());
            }
            self.stats.max_stack_depth = self.stats.max_stack_depth.max(stack.len());

            let Some(top) = stack.last_mut() else {
                return Ok(Vec::new());
            };
            let step = match self.step(top) {
                Ok(step) => step,
                Err(err) if stack.len() > 1 && err.kind() != ErrorKind::Cancelled => {
                    self.abandon_callee(&mut stack, err)?;
                    continue;
                }
                Err(err) => return Err(err),
            };
            match step {
                Step::Continue => {}
                Step::Enter(frame) => stack.push(frame),
                Step::Done => {
                    let Some(frame) = stack.pop() else {
                        return Ok(Vec::new());
                    };
                    let results = self.finish_frame(frame);
                    match stack.last_mut() {
                        Some(caller) => self.resume(caller, results)?,
                        None => return Ok(results),
                    }
                }
            }
        }
    }

    fn step(&mut self, frame: &mut ExecFrame<'a>) -> EngineResult<Step<'a>> {
        let Some(mut cursor) = frame.cursor.take() else {
            return Ok(self.enter_block(frame));
        };
        let fnc = frame.fnc;
        let block = fnc.block(cursor.block).ok_or_else(|| {
            EngineError::inconsistent(format!("{} has no block {}", fnc.name, cursor.block))
        })?;

        let Some(heap) = cursor.todo.pop() else {
            // the instruction is done for every heap
            if !cursor.done.is_empty() && cursor.idx + 1 < block.insns.len() {
                cursor.idx += 1;
                cursor.todo = std::mem::take(&mut cursor.done);
                frame.cursor = Some(cursor);
            }
            return Ok(Step::Continue);
        };
        let Some(insn) = block.insns.get(cursor.idx) else {
            return Err(EngineError::malformed(format!(
                "block {} of {} ends without a terminal instruction",
                block.name, fnc.name
            )));
        };

        let result = {
            let mut interp =
                Interpreter::new(self.program, self.config, fnc, &frame.path, self.reporter);
            let mut ready = interp.prepare(heap, insn);
            let Some(heap) = ready.pop() else {
                frame.cursor = Some(cursor);
                return Ok(Step::Continue);
            };
            // the rest come back through prepare, which leaves them as they are
            cursor.todo.extend(ready);
            interp.exec(heap, block, cursor.idx)
        };

        let step = match result {
            StepResult::Next(heaps) => {
                cursor.done.extend(heaps);
                Step::Continue
            }
            StepResult::Jump(targets) => {
                for (target, heap) in targets {
                    self.schedule_edge(frame, block.id, target, heap);
                }
                Step::Continue
            }
            StepResult::Return(heap) => {
                let types = &self.program.types;
                frame
                    .results
                    .insert(heap, self.config.execution.state_join, self.joiner, types);
                Step::Continue
            }
            StepResult::Stop => Step::Continue,
            StepResult::Call(call) => self.handle_call(frame, &mut cursor, call)?,
        };
        frame.cursor = Some(cursor);
        Ok(step)
    }

    /// Take the next scheduled block and its new heaps
    fn enter_block(&mut self, frame: &mut ExecFrame<'a>) -> Step<'a> {
        let Some((block, heaps)) = frame.next_block() else {
            return Step::Done;
        };
        if heaps.is_empty() {
            return Step::Continue;
        }
        frame.visits += heaps.len();
        self.stats.blocks_processed += 1;
        self.stats.heaps_processed += heaps.len();

        if frame.visits > self.config.execution.max_block_visits {
            tracing::warn!(
                fnc = %frame.fnc.name,
                visits = frame.visits,
                "block visit limit exceeded"
            );
            let mut interp =
                Interpreter::new(self.program, self.config, frame.fnc, &frame.path, self.reporter);
            interp.report(
                FindingKind::AnalysisLimit,
                "block visit limit exceeded, the function is analyzed only partially",
            );
            frame.exhausted = true;
            return Step::Done;
        }

        #[cfg(feature = "trace")]
        for heap in &heaps {
            tracing::trace!(fnc = %frame.fnc.name, block = %block, "block entry heap:\n{}", heap);
        }
        tracing::trace!(fnc = %frame.fnc.name, block = %block, heaps = heaps.len(), "block scheduled");
        frame.cursor = Some(Cursor::new(block, heaps));
        Step::Continue
    }

    /// Move a heap along a CFG edge, abstracting it when the edge calls for it
    fn schedule_edge(&mut self, frame: &mut ExecFrame<'a>, from: BlockId, to: BlockId, heap: SymHeap) {
        let mut heap = heap;
        let types = &self.program.types;
        let abstracting = match self.config.abstraction.policy {
            AbstractionPolicy::Never => false,
            AbstractionPolicy::LoopEdges => self.analysis.is_loop_edge(frame.fnc.id, from, to),
            AbstractionPolicy::AllEdges => true,
        };
        if abstracting {
            let abstractor = SegmentAbstractor::new(&self.config.abstraction, types);
            self.stats.folds += abstractor.abstract_heap(&mut heap);
        }

        let state = frame.states.entry(to).or_default();
        if state.insert(heap, self.config.execution.state_join, self.joiner, types) {
            frame.worklist.schedule(to);
        }
    }

    fn handle_call(
        &mut self,
        frame: &mut ExecFrame<'a>,
        cursor: &mut Cursor,
        call: PendingCall,
    ) -> EngineResult<Step<'a>> {
        let program = self.program;
        let callee = program.function(call.callee).ok_or_else(|| {
            EngineError::unknown_function(format!("no function with id {}", call.callee)).at(&call.loc)
        })?;

        // checked before the cache so that no slot is left uncomputed
        if call.path.depth() > self.config.execution.max_call_depth {
            tracing::debug!(callee = %callee.name, depth = call.path.depth(), "call depth limit hit");
            self.skip_call(
                frame,
                cursor,
                call,
                callee,
                "call depth limit reached, the result of the call is unknown",
            );
            return Ok(Step::Continue);
        }

        let entry = self.cache.enter(program, self.analysis, &call);
        match entry.lookup {
            CacheLookup::Hit(results) => {
                let mut interp =
                    Interpreter::new(program, self.config, frame.fnc, &frame.path, self.reporter);
                interp.set_location(&call.loc);
                for result in &results {
                    let mut heap = merge(result, &entry.surround);
                    interp.finish_call(&mut heap, &call.dst, callee);
                    cursor.done.push(heap);
                }
                Ok(Step::Continue)
            }
            CacheLookup::InProgress => {
                self.skip_call(
                    frame,
                    cursor,
                    call,
                    callee,
                    "recursive call has no summary yet, the result of the call is unknown",
                );
                Ok(Step::Continue)
            }
            CacheLookup::Failed => {
                self.skip_call(
                    frame,
                    cursor,
                    call,
                    callee,
                    "analysis of the callee failed, the result of the call is unknown",
                );
                Ok(Step::Continue)
            }
            CacheLookup::Compute { slot, entry: cut } => {
                frame.pending = Some(PendingReturn {
                    surround: entry.surround,
                    entry: cut.clone(),
                    dst: call.dst,
                    callee: callee.id,
                    loc: call.loc,
                });
                Ok(Step::Enter(self.callee_frame(callee, call.path, cut, slot)))
            }
        }
    }

    fn callee_frame(
        &self,
        callee: &'a Function,
        path: CallPath,
        entry: SymHeap,
        slot: SlotRef,
    ) -> ExecFrame<'a> {
        tracing::debug!(callee = %callee.name, depth = path.depth(), "callee frame pushed");
        ExecFrame::new(callee, path, entry, Some(slot))
    }

    /// Treat a call as if the callee were undefined
    fn skip_call(
        &mut self,
        frame: &ExecFrame<'a>,
        cursor: &mut Cursor,
        call: PendingCall,
        callee: &Function,
        message: &str,
    ) {
        let mut interp = Interpreter::new(self.program, self.config, frame.fnc, &frame.path, self.reporter);
        interp.set_location(&call.loc);
        interp.report(FindingKind::AnalysisLimit, message);
        let mut heap = call.heap;
        interp.skip_call(&mut heap, callee, &call.path, &call.dst);
        cursor.done.push(heap);
    }

    /// Close a frame: report caveats and store its summary
    fn finish_frame(&mut self, frame: ExecFrame<'a>) -> Vec<SymHeap> {
        let ExecFrame {
            fnc,
            path,
            results,
            slot,
            exhausted,
            ..
        } = frame;
        let results = results.into_heaps();
        if results.is_empty() && !exhausted {
            let mut interp = Interpreter::new(self.program, self.config, fnc, &path, self.reporter);
            interp.report(FindingKind::EndNotReached, "end of function not reached");
        }
        tracing::debug!(fnc = %fnc.name, results = results.len(), exhausted, "frame finished");
        if let Some(slot) = &slot {
            self.cache.finish(slot, results.clone());
        }
        results
    }

    /// Drop the failed top frame; its caller goes on as if the call were skipped
    fn abandon_callee(&mut self, stack: &mut Vec<ExecFrame<'a>>, err: EngineError) -> EngineResult<()> {
        let Some(failed) = stack.pop() else {
            return Err(err);
        };
        tracing::warn!(fnc = %failed.fnc.name, error = %err, "callee analysis failed");
        if let Some(slot) = &failed.slot {
            self.cache.abandon(slot);
        }
        let Some(caller) = stack.last_mut() else {
            return Err(err);
        };
        let pending = caller.pending.take().ok_or_else(|| {
            EngineError::inconsistent(format!("{} has no pending call", caller.fnc.name))
        })?;
        let cursor = caller.cursor.as_mut().ok_or_else(|| {
            EngineError::inconsistent(format!("{} called outside of a block", caller.fnc.name))
        })?;

        let mut interp =
            Interpreter::new(self.program, self.config, caller.fnc, &caller.path, self.reporter);
        interp.set_location(&pending.loc);
        interp.report(
            FindingKind::AnalysisLimit,
            "analysis of the callee failed, the result of the call is unknown",
        );
        let mut heap = merge(&pending.entry, &pending.surround);
        interp.skip_call(&mut heap, failed.fnc, &failed.path, &pending.dst);
        cursor.done.push(heap);
        Ok(())
    }

    /// Hand callee results to the waiting caller
    fn resume(&mut self, caller: &mut ExecFrame<'a>, results: Vec<SymHeap>) -> EngineResult<()> {
        let pending = caller.pending.take().ok_or_else(|| {
            EngineError::inconsistent(format!("{} resumed without a pending call", caller.fnc.name))
        })?;
        let callee = self.program.function(pending.callee).ok_or_else(|| {
            EngineError::unknown_function(format!("no function with id {}", pending.callee))
        })?;
        let cursor = caller.cursor.as_mut().ok_or_else(|| {
            EngineError::inconsistent(format!("{} resumed outside of a block", caller.fnc.name))
        })?;

        let mut interp =
            Interpreter::new(self.program, self.config, caller.fnc, &caller.path, self.reporter);
        interp.set_location(&pending.loc);
        for result in &results {
            let mut heap = merge(result, &pending.surround);
            interp.finish_call(&mut heap, &pending.dst, callee);
            cursor.done.push(heap);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateJoinPolicy;
    use crate::features::program_model::{BinOp, Operand, ProgramBuilder};
    use crate::features::symbolic_heap::SimpleJoiner;
    use crate::shared::models::ErrorKind;
    use pretty_assertions::assert_eq;

    struct Harness {
        program: Program,
        analysis: ProgramAnalysis,
        cache: CallCache,
        reporter: Reporter,
    }

    impl Harness {
        fn new(program: Program, config: &AnalysisConfig) -> Self {
            let analysis = ProgramAnalysis::new(&program);
            Self {
                program,
                analysis,
                cache: CallCache::new(config.call_cache.clone()),
                reporter: Reporter::new(),
            }
        }

        fn run(&mut self, name: &str, config: &AnalysisConfig) -> EngineResult<Vec<SymHeap>> {
            let joiner = SimpleJoiner::new();
            let fnc = self.program.function_by_name(name).unwrap().id;
            let mut scheduler = FixpointScheduler::new(
                &self.program,
                &self.analysis,
                config,
                &joiner,
                &mut self.cache,
                &mut self.reporter,
            );
            scheduler.run(fnc, CallPath::root(fnc), SymHeap::new())
        }
    }

    /// `int main() { int i = 0; while (i != 3) i = i + 1; return i; }`
    fn counting_loop() -> Program {
        let mut pb = ProgramBuilder::new("loop.c");
        let int = pb.types().int(4);
        let main = pb.declare_function("main", int);
        let mut fb = pb.define(main);
        let i = fb.local("i", int);
        let entry = fb.block("entry");
        let head = fb.block("head");
        let body = fb.block("body");
        let exit = fb.block("exit");
        let c = fb.local("c", int);
        fb.assign(entry, Operand::var(i), Operand::int(0));
        fb.jmp(entry, head);
        fb.binop(head, BinOp::Ne, Operand::var(c), Operand::var(i), Operand::int(3));
        fb.cond(head, Operand::var(c), body, exit);
        fb.binop(body, BinOp::Plus, Operand::var(i), Operand::var(i), Operand::int(1));
        fb.jmp(body, head);
        fb.ret(exit, Operand::var(i));
        fb.finish();
        pb.build().unwrap()
    }

    #[test]
    fn test_concrete_loop_reaches_fixpoint() {
        let config = AnalysisConfig::default()
            .execution(|e| e.state_join(StateJoinPolicy::Isomorphism));
        let mut h = Harness::new(counting_loop(), &config);
        let results = h.run("main", &config).unwrap();
        assert_eq!(results.len(), 1);
        assert!(h.reporter.findings().is_empty());
    }

    #[test]
    fn test_visit_limit_keeps_partial_results() {
        let config = AnalysisConfig::default().execution(|e| {
            e.state_join(StateJoinPolicy::Isomorphism).max_block_visits(3)
        });
        let mut h = Harness::new(counting_loop(), &config);
        let results = h.run("main", &config).unwrap();
        assert!(results.is_empty());
        assert_eq!(h.reporter.count(FindingKind::AnalysisLimit), 1);
        assert_eq!(h.reporter.count(FindingKind::EndNotReached), 0);
    }

    #[test]
    fn test_callee_results_flow_back_to_caller() {
        let mut pb = ProgramBuilder::new("call.c");
        let int = pb.types().int(4);
        let id = pb.declare_function("id", int);
        let main = pb.declare_function("main", int);
        let mut fb = pb.define(id);
        let x = fb.arg("x", int);
        let entry = fb.block("entry");
        fb.ret(entry, Operand::var(x));
        fb.finish();
        let mut fb = pb.define(main);
        let r = fb.local("r", int);
        let entry = fb.block("entry");
        fb.call(entry, Operand::var(r), id, vec![Operand::int(5)]);
        fb.call(entry, Operand::var(r), id, vec![Operand::int(5)]);
        fb.ret(entry, Operand::var(r));
        fb.finish();
        let program = pb.build().unwrap();

        let config = AnalysisConfig::default();
        let mut h = Harness::new(program, &config);
        let results = h.run("main", &config).unwrap();
        assert_eq!(results.len(), 1);
        let ret = results[0].return_root().unwrap();
        let v = results[0].peek_value_at(ret, 0).unwrap();
        assert_eq!(results[0].int_of(v), Some(5));
        assert_eq!(h.cache.stats().misses, 1);
        assert_eq!(h.cache.stats().hits, 1);
    }

    #[test]
    fn test_failed_callee_leaves_the_caller_running() {
        let mut pb = ProgramBuilder::new("broken.c");
        let int = pb.types().int(4);
        let broken = pb.declare_function("broken", int);
        let main = pb.declare_function("main", int);
        let mut fb = pb.define(broken);
        let x = fb.arg("x", int);
        let entry = fb.block("entry");
        fb.assign(entry, Operand::var(x), Operand::int(2));
        fb.ret(entry, Operand::var(x));
        fb.finish();
        let mut fb = pb.define(main);
        let r = fb.local("r", int);
        let entry = fb.block("entry");
        fb.call(entry, Operand::var(r), broken, vec![Operand::int(1)]);
        fb.call(entry, Operand::var(r), broken, vec![Operand::int(1)]);
        fb.ret(entry, Operand::int(0));
        fb.finish();
        let mut program = pb.build().unwrap();
        // the callee's only block loses every instruction
        program.function_mut(broken).unwrap().blocks[0].insns.clear();

        let config = AnalysisConfig::default();
        let mut h = Harness::new(program, &config);
        let results = h.run("main", &config).unwrap();
        assert_eq!(results.len(), 1);
        let ret = results[0].return_root().unwrap();
        let v = results[0].peek_value_at(ret, 0).unwrap();
        assert_eq!(results[0].int_of(v), Some(0));
        // once when it fails, once when the second call meets the abandoned slot
        assert_eq!(h.reporter.count(FindingKind::AnalysisLimit), 2);
        assert_eq!(h.reporter.count(FindingKind::EndNotReached), 0);
        assert_eq!(h.cache.stats().misses, 1);
    }

    #[test]
    fn test_function_without_return_is_noted() {
        let mut pb = ProgramBuilder::new("abort.c");
        let int = pb.types().int(4);
        let main = pb.declare_function("main", int);
        let mut fb = pb.define(main);
        let entry = fb.block("entry");
        fb.abort(entry);
        fb.finish();
        let program = pb.build().unwrap();

        let config = AnalysisConfig::default();
        let mut h = Harness::new(program, &config);
        assert!(h.run("main", &config).unwrap().is_empty());
        assert_eq!(h.reporter.count(FindingKind::EndNotReached), 1);
    }

    #[test]
    fn test_cancelled_run_stops() {
        let config = AnalysisConfig::default();
        let mut h = Harness::new(counting_loop(), &config);
        let joiner = SimpleJoiner::new();
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let fnc = h.program.function_by_name("main").unwrap().id;
        let mut scheduler = FixpointScheduler::new(
            &h.program,
            &h.analysis,
            &config,
            &joiner,
            &mut h.cache,
            &mut h.reporter,
        )
        .with_cancellation(cancel);
        let err = scheduler.run(fnc, CallPath::root(fnc), SymHeap::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
