pub mod fabric;
pub mod forge;
pub mod legacy_fabric;
pub mod neoforge;
pub mod quilt;
