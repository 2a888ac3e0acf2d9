//! # Rendering
//!
//! [`RspRenderer`] turns a path spec into a rendered service path:
//!
//! 1. validate the path spec, its chain and the one-chain-only restrictions,
//! 2. place every chain entry with the selected scheduler,
//! 3. build the hop list,
//! 4. allocate a path id,
//! 5. persist the path,
//! 6. register the path in the dependent operational records.
//!
//! Any failure in steps 5 and 6 rolls back everything done so far, newest first. Symmetric
//! chains additionally get a reverse path (see [`reverse`]) rendered under the same rules.

mod assembler;
mod hops;
pub mod reverse;
mod saga;
pub mod state;

pub use assembler::{CreateRequest, RenderedPaths, RspRenderer};
pub use hops::MAX_HOPS;
pub use reverse::{is_symmetric, reverse_path, toggle_reverse_name, REVERSE_SUFFIX};
pub use state::StateCoordinator;
