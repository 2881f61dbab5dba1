//! ifcx core model
//!
//! The pieces every conversion shares, independent of any input or output
//! format:
//! - `guid`: compact 22-character identifiers ↔ canonical 128-bit GUIDs
//! - `schema`: the widening column-type lattice and sparse row store that
//!   infer a relational schema from heterogeneous property bags
//! - `closure`: flattening a containment graph into
//!   `(ancestor, descendant, depth)` entries
//! - `tabular`: the structured intermediate shape handed from decoders to
//!   encoders

pub mod closure;
pub mod guid;
pub mod schema;
pub mod tabular;

pub use closure::{build_closure, Adjacency, ClosureEntry};
pub use guid::{decode_compact, encode_compact, format_guid, IdentifierError};
pub use schema::{ColumnId, ColumnType, Schema, SchemaInference};
pub use tabular::{EntityId, Row, TabularModel, Value};
