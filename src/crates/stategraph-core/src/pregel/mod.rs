//! Step-based execution of a compiled plan
//!
//! Execution proceeds in **steps**. Each step runs the nodes of the current
//! frontier against the same state, then commits:
//!
//! ```text
//!   frontier ──▶ execute nodes ──▶ merge outputs ──▶ resolve edges ──▶ commit
//!      ▲        (concurrently)     (frontier order)  (post-merge      checkpoint
//!      │                                              state)             │
//!      └──────────────────────── next frontier ◀──────────────────────────┘
//! ```
//!
//! Steps are strictly sequential within a run. Within a step, outputs are
//! merged in frontier order rather than completion order, so a run is
//! reproducible no matter how its nodes are scheduled.
//!
//! The run ends when the frontier is empty or only `END`, when a commit raises
//! an interrupt, when cancellation is observed, or when a step fails. A failed
//! or cancelled step commits nothing.

pub(crate) mod algo;
pub(crate) mod loop_impl;

pub(crate) use loop_impl::StepLoop;
