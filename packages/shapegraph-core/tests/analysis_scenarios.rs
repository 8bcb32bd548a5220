//! End-to-end scenarios: small C programs through a full session

mod common;

use common::{analyze, c_program};
use pretty_assertions::assert_eq;
use shapegraph_core::config::{AbstractionPolicy, StateJoinPolicy};
use shapegraph_core::features::program_model::{BinOp, Operand};
use shapegraph_core::usecases::RootStatus;
use shapegraph_core::{AnalysisConfig, AnalysisSession, FindingKind, Program, Severity};

fn var(uid: shapegraph_core::features::program_model::VarUid) -> Operand {
    Operand::var(uid)
}

/// ```c
/// int main(int n) {
///     struct node *head = NULL, *p;
///     while (n + 1) { p = malloc(sizeof *p); p->next = head; p->data = 0; head = p; }
///     while (head) { p = head->next; free(head); head = p; }
///     return 0;
/// }
/// ```
fn build_and_free_list() -> Program {
    let mut c = c_program("list.c");
    let main = c.pb.declare_function("main", c.int);
    let mut fb = c.pb.define(main);
    let n = fb.arg("n", c.int);
    let head = fb.local("head", c.node_ptr);
    let p = fb.local("p", c.node_ptr);
    let flag = fb.local("flag", c.int);
    let entry = fb.block("entry");
    let build = fb.block("build");
    let push = fb.block("push");
    let walk = fb.block("walk");
    let pop = fb.block("pop");
    let done = fb.block("done");

    fb.assign(entry, var(head), Operand::null());
    fb.jmp(entry, build);

    fb.binop(build, BinOp::Plus, var(flag), var(n), Operand::int(1));
    fb.cond(build, var(flag), push, walk);

    fb.call(push, var(p), c.malloc, vec![Operand::int(c.node_size)]);
    fb.assign(push, var(p).deref().field(0), var(head));
    fb.assign(push, var(p).deref().field(1), Operand::int(0));
    fb.assign(push, var(head), var(p));
    fb.jmp(push, build);

    fb.cond(walk, var(head), pop, done);

    fb.assign(pop, var(p), var(head).deref().field(0));
    fb.call(pop, Operand::Void, c.free, vec![var(head)]);
    fb.assign(pop, var(head), var(p));
    fb.jmp(pop, walk);

    fb.ret(done, Operand::int(0));
    fb.finish();
    c.pb.build().unwrap()
}

#[test]
fn test_list_built_in_a_loop_is_freed_without_findings() {
    let report = analyze(build_and_free_list(), AnalysisConfig::default());
    assert!(!report.cancelled);
    assert!(report.roots[0].is_completed());
    assert_eq!(report.error_count(), 0);
    assert_eq!(
        report.findings.iter().filter(|f| f.kind == FindingKind::MemoryLeak).count(),
        0
    );
    assert!(report.stats.folds > 0);
}

#[test]
fn test_list_loop_terminates_under_isomorphism_only() {
    let config = AnalysisConfig::default().execution(|e| e.state_join(StateJoinPolicy::Isomorphism));
    let report = analyze(build_and_free_list(), config);
    assert!(report.roots[0].is_completed());
    assert_eq!(report.error_count(), 0);
}

#[test]
fn test_without_abstraction_the_visit_limit_stops_the_loop() {
    let config = AnalysisConfig::default()
        .abstraction(|a| a.policy(AbstractionPolicy::Never))
        .execution(|e| e.max_block_visits(200));
    let report = analyze(build_and_free_list(), config);
    assert!(report.roots[0].is_completed());
    assert_eq!(
        report.findings.iter().filter(|f| f.kind == FindingKind::AnalysisLimit).count(),
        1
    );
    assert_eq!(report.stats.folds, 0);
}

#[test]
fn test_double_free_reported_once_without_leak() {
    let mut c = c_program("double.c");
    let main = c.pb.declare_function("main", c.int);
    let mut fb = c.pb.define(main);
    let p = fb.local("p", c.int_ptr);
    let entry = fb.block("entry");
    fb.at(3).call(entry, var(p), c.malloc, vec![Operand::int(4)]);
    fb.at(4).call(entry, Operand::Void, c.free, vec![var(p)]);
    fb.at(5).call(entry, Operand::Void, c.free, vec![var(p)]);
    fb.at(6).ret(entry, Operand::int(0));
    fb.finish();

    let report = analyze(c.pb.build().unwrap(), AnalysisConfig::default());
    assert_eq!(report.findings.len(), 1);
    let finding = &report.findings[0];
    assert_eq!(finding.kind, FindingKind::DoubleFree);
    assert_eq!(finding.severity, Severity::Error);
    assert_eq!(finding.loc.line, 5);
}

#[test]
fn test_leak_is_reported_at_the_overwriting_assignment() {
    let mut c = c_program("leak.c");
    let main = c.pb.declare_function("main", c.int);
    let mut fb = c.pb.define(main);
    let p = fb.local("p", c.int_ptr);
    let entry = fb.block("entry");
    fb.at(2).call(entry, var(p), c.malloc, vec![Operand::int(4)]);
    fb.at(3).assign(entry, var(p), Operand::null());
    fb.at(4).ret(entry, Operand::int(0));
    fb.finish();

    let report = analyze(c.pb.build().unwrap(), AnalysisConfig::default());
    let leaks: Vec<u32> = report
        .findings
        .iter()
        .filter(|f| f.kind == FindingKind::MemoryLeak)
        .map(|f| f.loc.line)
        .collect();
    assert_eq!(leaks, vec![3]);
}

#[test]
fn test_allocating_helper_is_summarized_once() {
    // int *make(void) { int *t = malloc(4); return t; }
    let mut c = c_program("helper.c");
    let make = c.pb.declare_function("make", c.int_ptr);
    let main = c.pb.declare_function("main", c.int);

    let mut fb = c.pb.define(make);
    let t = fb.local("t", c.int_ptr);
    let entry = fb.block("entry");
    fb.call(entry, var(t), c.malloc, vec![Operand::int(4)]);
    fb.ret(entry, var(t));
    fb.finish();

    let mut fb = c.pb.define(main);
    let a = fb.local("a", c.int_ptr);
    let b = fb.local("b", c.int_ptr);
    let entry = fb.block("entry");
    fb.call(entry, var(a), make, vec![]);
    fb.call(entry, Operand::Void, c.free, vec![var(a)]);
    fb.call(entry, var(b), make, vec![]);
    fb.call(entry, Operand::Void, c.free, vec![var(b)]);
    fb.ret(entry, Operand::int(0));
    fb.finish();

    let report = analyze(c.pb.build().unwrap(), AnalysisConfig::default());
    assert!(report.findings.is_empty(), "{:#?}", report.findings);
    assert_eq!(report.cache_stats.misses, 1);
    assert_eq!(report.cache_stats.hits, 1);
    assert_eq!(report.cache_stats.slots, 1);
}

#[test]
fn test_leak_inside_callee_carries_a_backtrace() {
    // void lose(void) { malloc(4); }
    let mut c = c_program("callee.c");
    let void = c.pb.types().void();
    let lose = c.pb.declare_function("lose", void);
    let main = c.pb.declare_function("main", c.int);

    let mut fb = c.pb.define(lose);
    let entry = fb.block("entry");
    fb.at(2).call(entry, Operand::Void, c.malloc, vec![Operand::int(4)]);
    fb.ret(entry, Operand::Void);
    fb.finish();

    let mut fb = c.pb.define(main);
    let entry = fb.block("entry");
    fb.at(7).call(entry, Operand::Void, lose, vec![]);
    fb.ret(entry, Operand::int(0));
    fb.finish();

    let report = analyze(c.pb.build().unwrap(), AnalysisConfig::default());
    assert_eq!(report.findings.len(), 1);
    let leak = &report.findings[0];
    assert_eq!(leak.kind, FindingKind::MemoryLeak);
    assert_eq!(leak.loc.line, 2);
    assert_eq!(leak.backtrace.len(), 1);
    assert_eq!(leak.backtrace[0].function, "lose");
    assert_eq!(leak.backtrace[0].loc.line, 7);
}

#[test]
fn test_uninitialized_condition_is_a_warning() {
    let mut c = c_program("uninit.c");
    let main = c.pb.declare_function("main", c.int);
    let mut fb = c.pb.define(main);
    let x = fb.local("x", c.int);
    let entry = fb.block("entry");
    let exit = fb.block("exit");
    fb.cond(entry, var(x), exit, exit);
    fb.ret(exit, Operand::int(0));
    fb.finish();

    let report = analyze(c.pb.build().unwrap(), AnalysisConfig::default());
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].kind, FindingKind::UninitializedCondition);
    assert_eq!(report.findings[0].severity, Severity::Warning);
}

#[test]
fn test_function_that_never_returns_gets_a_note() {
    let mut c = c_program("abort.c");
    let main = c.pb.declare_function("main", c.int);
    let mut fb = c.pb.define(main);
    let entry = fb.block("entry");
    fb.abort(entry);
    fb.finish();

    let report = analyze(c.pb.build().unwrap(), AnalysisConfig::default());
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].kind, FindingKind::EndNotReached);
    assert_eq!(report.findings[0].severity, Severity::Note);
    assert_eq!(report.roots[0].status, RootStatus::Completed { results: 0 });
}

#[test]
fn test_unbounded_recursion_degrades_to_unknown_results() {
    // int rec(int n) { return rec(n); }
    let mut c = c_program("rec.c");
    let rec = c.pb.declare_function("rec", c.int);
    let main = c.pb.declare_function("main", c.int);

    let mut fb = c.pb.define(rec);
    let n = fb.arg("n", c.int);
    let r = fb.local("r", c.int);
    let entry = fb.block("entry");
    fb.call(entry, var(r), rec, vec![var(n)]);
    fb.ret(entry, var(r));
    fb.finish();

    let mut fb = c.pb.define(main);
    let x = fb.local("x", c.int);
    let entry = fb.block("entry");
    fb.call(entry, var(x), rec, vec![Operand::int(1)]);
    fb.ret(entry, Operand::int(0));
    fb.finish();

    let config = AnalysisConfig::default().execution(|e| e.max_call_depth(4));
    let report = analyze(c.pb.build().unwrap(), config);
    assert!(report.roots[0].is_completed());
    assert!(report.findings.iter().all(|f| f.kind == FindingKind::AnalysisLimit));
    assert!(!report.findings.is_empty());
    assert!(report.stats.max_stack_depth <= 4);
}

#[test]
fn test_cancelled_session_reports_partial_run() {
    let session = AnalysisSession::new(build_and_free_list(), AnalysisConfig::default()).unwrap();
    session.cancellation_flag().cancel();
    let report = session.run();
    assert!(report.cancelled);
    assert_eq!(report.roots[0].status, RootStatus::Cancelled);
}

#[test]
fn test_report_serializes_findings_and_roots() {
    let mut c = c_program("json.c");
    let main = c.pb.declare_function("main", c.int);
    let mut fb = c.pb.define(main);
    let p = fb.local("p", c.int_ptr);
    let entry = fb.block("entry");
    fb.call(entry, var(p), c.malloc, vec![Operand::int(4)]);
    fb.call(entry, Operand::Void, c.free, vec![var(p)]);
    fb.call(entry, Operand::Void, c.free, vec![var(p)]);
    fb.ret(entry, Operand::int(0));
    fb.finish();

    let report = analyze(c.pb.build().unwrap(), AnalysisConfig::default());
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["findings"][0]["kind"], "double_free");
    assert_eq!(json["findings"][0]["severity"], "error");
    assert_eq!(json["roots"][0]["function"], "main");
    assert_eq!(json["roots"][0]["status"], "completed");
    assert_eq!(json["cancelled"], false);
}

#[test]
fn test_session_driven_by_yaml_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("analysis.yaml");
    std::fs::write(
        &path,
        "version: 1\npreset: fast\noverrides:\n  entry_points: [walk]\n",
    )
    .unwrap();
    let config = AnalysisConfig::from_yaml(&path).unwrap();

    // int walk(int n) { int r = n + n; return r; }
    let mut c = c_program("walk.c");
    let walk = c.pb.declare_function("walk", c.int);
    let mut fb = c.pb.define(walk);
    let n = fb.arg("n", c.int);
    let r = fb.local("r", c.int);
    let entry = fb.block("entry");
    fb.binop(entry, BinOp::Plus, var(r), var(n), var(n));
    fb.ret(entry, var(r));
    fb.finish();

    let report = analyze(c.pb.build().unwrap(), config);
    assert_eq!(report.roots.len(), 1);
    assert_eq!(report.roots[0].function, "walk");
    assert!(report.roots[0].is_completed());
    assert!(report.findings.is_empty());
}

#[test]
fn test_nonzero_int_condition_keeps_other_values_possible() {
    // int main(int n) { int *p = NULL; if (n) { if (n == 2) *p = 1; } return 0; }
    let mut c = c_program("nonzero.c");
    let main = c.pb.declare_function("main", c.int);
    let mut fb = c.pb.define(main);
    let n = fb.arg("n", c.int);
    let p = fb.local("p", c.int_ptr);
    let is_two = fb.local("is_two", c.int);
    let entry = fb.block("entry");
    let outer = fb.block("outer");
    let store = fb.block("store");
    let done = fb.block("done");

    fb.assign(entry, var(p), Operand::null());
    fb.cond(entry, var(n), outer, done);
    fb.binop(outer, BinOp::Eq, var(is_two), var(n), Operand::int(2));
    fb.cond(outer, var(is_two), store, done);
    fb.at(3).assign(store, var(p).deref(), Operand::int(1));
    fb.jmp(store, done);
    fb.ret(done, Operand::int(0));
    fb.finish();

    let report = analyze(c.pb.build().unwrap(), AnalysisConfig::default());
    assert_eq!(report.findings.len(), 1, "{:#?}", report.findings);
    let finding = &report.findings[0];
    assert_eq!(finding.kind, FindingKind::InvalidDereference);
    assert_eq!(finding.message, "dereference of NULL value");
    assert_eq!(finding.loc.line, 3);
}

/// ```c
/// struct dnode { struct dnode *next, *prev; int data; };
/// int main(int n) {
///     struct dnode *head = NULL, *p;
///     while (n != 0) {
///         p = malloc(sizeof *p); p->next = head; p->prev = NULL; p->data = 0;
///         if (head) head->prev = p;
///         head = p;
///     }
///     while (head) {
///         p = head->next; free(head);
///         if (clear_back_link) p->prev = NULL;   /* line 12 */
///         head = p;
///     }
///     return 0;
/// }
/// ```
fn build_and_free_dlist(clear_back_link: bool) -> Program {
    let mut c = c_program("dlist.c");
    let types = c.pb.types();
    let dnode = types.declare_struct("dnode");
    let dnode_ptr = types.ptr(dnode);
    types
        .define_struct(dnode, &[("next", dnode_ptr), ("prev", dnode_ptr), ("data", c.int)])
        .unwrap();
    let dnode_size = types.size_of(dnode);

    let main = c.pb.declare_function("main", c.int);
    let mut fb = c.pb.define(main);
    let n = fb.arg("n", c.int);
    let head = fb.local("head", dnode_ptr);
    let p = fb.local("p", dnode_ptr);
    let more = fb.local("more", c.int);
    let entry = fb.block("entry");
    let build = fb.block("build");
    let push = fb.block("push");
    let link = fb.block("link");
    let linked = fb.block("linked");
    let walk = fb.block("walk");
    let pop = fb.block("pop");
    let done = fb.block("done");

    fb.assign(entry, var(head), Operand::null());
    fb.jmp(entry, build);

    fb.binop(build, BinOp::Ne, var(more), var(n), Operand::int(0));
    fb.cond(build, var(more), push, walk);

    fb.call(push, var(p), c.malloc, vec![Operand::int(dnode_size)]);
    fb.assign(push, var(p).deref().field(0), var(head));
    fb.assign(push, var(p).deref().field(1), Operand::null());
    fb.assign(push, var(p).deref().field(2), Operand::int(0));
    fb.cond(push, var(head), link, linked);

    fb.assign(link, var(head).deref().field(1), var(p));
    fb.jmp(link, linked);

    fb.assign(linked, var(head), var(p));
    fb.jmp(linked, build);

    fb.cond(walk, var(head), pop, done);

    fb.assign(pop, var(p), var(head).deref().field(0));
    fb.call(pop, Operand::Void, c.free, vec![var(head)]);
    if clear_back_link {
        fb.at(12).assign(pop, var(p).deref().field(1), Operand::null());
    }
    fb.assign(pop, var(head), var(p));
    fb.jmp(pop, walk);

    fb.ret(done, Operand::int(0));
    fb.finish();
    c.pb.build().unwrap()
}

#[test]
fn test_doubly_linked_list_is_freed_without_findings() {
    for policy in [StateJoinPolicy::Join, StateJoinPolicy::Isomorphism] {
        let config = AnalysisConfig::default().execution(|e| e.state_join(policy));
        let report = analyze(build_and_free_dlist(false), config);
        assert!(report.roots[0].is_completed(), "{policy:?}");
        assert!(report.findings.is_empty(), "{policy:?}: {:#?}", report.findings);
        assert!(report.stats.folds > 0, "{policy:?}");
    }
}

#[test]
fn test_doubly_linked_tail_reached_through_null_successor() {
    for policy in [StateJoinPolicy::Join, StateJoinPolicy::Isomorphism] {
        let config = AnalysisConfig::default().execution(|e| e.state_join(policy));
        let report = analyze(build_and_free_dlist(true), config);
        assert!(report.roots[0].is_completed(), "{policy:?}");
        let lines: Vec<(FindingKind, u32)> =
            report.findings.iter().map(|f| (f.kind, f.loc.line)).collect();
        assert_eq!(lines, vec![(FindingKind::InvalidDereference, 12)], "{policy:?}");
        assert_eq!(report.findings[0].message, "dereference of NULL value");
    }
}
