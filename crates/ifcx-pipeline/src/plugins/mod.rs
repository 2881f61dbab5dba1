//! Built-in decoders and encoders.
//!
//! | name   | role    | formats                     | shapes          |
//! |--------|---------|-----------------------------|-----------------|
//! | ifc    | decoder | ifc                         | tabular, ifc    |
//! | frag   | decoder | frag                        | tabular         |
//! | sqlite | encoder | db, db3, sqlite, sqlite3    | tabular         |
//! | frag   | encoder | frag                        | ifc             |

pub mod frag;
pub mod ifc;
pub mod sqlite;

use crate::config::ConvertConfig;
use crate::registry::Registry;
use crate::worker::worker_descriptor;

pub use frag::{FragDecoder, FragEncoder};
pub use ifc::IfcDecoder;
pub use sqlite::SqliteEncoder;

pub fn register_builtins(registry: &Registry, config: &ConvertConfig) {
    let decoders = [ifc::descriptor(), frag::decoder_descriptor()];
    for decoder in decoders {
        if config.decode_in_worker {
            registry.register_decoder(worker_descriptor(&decoder));
        }
        registry.register_decoder(decoder);
    }
    registry.register_encoder(sqlite::descriptor());
    registry.register_encoder(frag::encoder_descriptor());
}
