//! Rendering and force-layout engine for graphs with tens of thousands of
//! nodes: a quadtree spatial index, viewport culling, level of detail, edge
//! bundling, batched mesh output and a physics worker thread.

pub mod bundle;
pub mod cull;
pub mod engine;
pub mod error;
pub mod lod;
pub mod model;
pub mod render;
pub mod settings;
pub mod sim;
pub mod spatial;
pub mod synthetic;
