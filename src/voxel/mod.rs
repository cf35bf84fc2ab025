//! Voxel data types shared with the engine

pub mod color;
pub mod vertex;

pub use color::{Channel, ChannelBits, ColorLayout, QuantizedColor};
pub use vertex::{ColoredCubesVertex, TerrainVertex};
