//! Fixpoint scheduler
//!
//! ```text
//! frame stack:  [root] [callee] ... [top]
//!                                     │ worklist.next()
//!                                     ▼
//!                    block cursor ─ prepare ─ exec ─┬─ Next   → same block
//!                                                   ├─ Jump   → abstract? → target state
//!                                                   ├─ Return → results
//!                                                   └─ Call   → call cache ─ hit: merge
//!                                                                         └─ miss: push frame
//! ```
//!
//! A block is rescheduled only when its state gained a heap that no
//! existing heap covers, so the computation stops once every state is
//! stable.

pub mod cancel;
mod frame;
pub mod scheduler;
pub mod sym_state;

pub use cancel::CancellationFlag;
pub use scheduler::{FixpointScheduler, SchedulerStats};
pub use sym_state::SymState;
