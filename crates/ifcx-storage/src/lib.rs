//! ifcx output stores
//!
//! Two targets for a decoded model:
//!
//! ```text
//! TabularModel ──► sqlite ──► Entities + Hierarchy tables (.db)
//! IfcModel     ──► frag   ──► verified CBOR entity table (.frag)
//! ```

pub mod frag;
pub mod sqlite;

pub use frag::{decode_frag, encode_frag, FragError, FragHeader};
pub use sqlite::{write_sqlite, RelationInsertSkipped, SqliteReport, SqliteWriteError};
