//! Render pipeline
//!
//! Turns a root description into mutations of the output tree.
//!
//! # Pipeline Architecture
//!
//! ```text
//! Root::render → update queue → scheduler task → render phase → commit phase
//! ```
//!
//! ## Data Flow
//!
//! 1. **render phase** - `begin_work` and `complete_work` build the
//!    work-in-progress tree, create detached host instances and diff props.
//!    Interruptible and free of visible side effects.
//! 2. **commit phase** - applies placements, updates and deletions to the
//!    output tree in one uninterrupted pass, then swaps the trees.
//!
//! ## Key Design Principles
//!
//! - **Nothing visible before commit**: a failing render leaves the output
//!   tree untouched
//! - **Reuse over recreation**: matching fibers keep their host instances
//!   across renders

mod begin_work;
mod commit;
pub mod complete_work;
pub mod root;
pub mod work_loop;

pub use complete_work::diff_properties;
pub use root::{create_root, FiberRoot, Root};
pub use work_loop::{render_root_sync, WorkLoop};
