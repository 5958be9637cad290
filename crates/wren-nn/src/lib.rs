//! # wren-nn
//!
//! Graph-node layers for wren.
//!
//! Every node implements the [`Layer`] contract:
//!
//! 1. **reshape** — derive output shapes from input shapes
//! 2. **forward** — propagate values downstream
//! 3. **backward** — propagate gradients upstream
//!
//! [`SplitLayer`] is the fan-out / fan-in node: forward aliases one input
//! into every output, backward sums the outputs' gradients into the input.
//! Layers are generic over the element type and the kernel [`Backend`],
//! so the same node runs in f16, bf16, f32 or f64.
//!
//! [`Backend`]: wren_core::Backend

pub mod config;
pub mod layer;
pub mod split;

pub use config::{build_layer, LayerConfig, LayerType};
pub use layer::Layer;
pub use split::SplitLayer;
