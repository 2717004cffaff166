//! Desired-state schema model.
//!
//! Tables and columns are declared in code (or loaded from a schema document),
//! validated, and consumed once per migration run. Each column and table has a
//! structural [`SchemaHash`] that changes if and only if a structural attribute
//! changes.

mod column;
mod hash;
mod table;
mod types;
mod value;

pub use column::{Column, ColumnRef};
pub use hash::SchemaHash;
pub(crate) use hash::StructuralHasher;
pub use table::{IndexDef, SeedData, Table, TableRename};
pub use types::SqlType;
pub use value::Value;
