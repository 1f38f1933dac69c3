/*
[INPUT]:  Wire schema definitions and serde requirements
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions for stream communication
[UPDATE]: When the wire schema changes or new types added
*/

pub mod descriptor;
pub mod enums;
pub mod models;

pub use descriptor::*;
pub use enums::*;
pub use models::*;
