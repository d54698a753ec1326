//! Hierarchy over entities.
//!
//! ## Submodules
//!
//! - [`hierarchy`]: ancestor closure rebuild, reparent validation, and the
//!   ancestor/descendant/children/siblings/root queries.
//! - [`cycles`]: parent-pointer cycle detection.
//! - [`tree`]: nesting flat entity lists for display.

pub mod cycles;
pub mod hierarchy;
pub mod tree;
