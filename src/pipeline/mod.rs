//! Pipeline stages for torsion-ring processing.
//!
//! Each submodule owns one concern, so each is testable on its own and the
//! orchestrator only sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ validate ──▶ workspace ──▶ invoke ──▶ encode
//!            (pure)       (scratch)    (tools)    (text / base64)
//! ```
//!
//! 1. [`validate`]: classify the upload by extension, normalise title and
//!    labels; no side effects
//! 2. [`workspace`]: per-request scratch directory with guaranteed release
//! 3. [`invoke`]: run one external tool under a timeout and report what
//!    happened; the only stage that spawns processes
//! 4. [`encode`]: read produced files back and wrap them for transport

pub mod encode;
pub mod invoke;
pub mod validate;
pub mod workspace;
