// Layer configuration — what the graph builder hands us per node
//
// A graph definition names each node, picks its layer type and fixes how
// many outputs it feeds. build_layer() turns that into a boxed Layer,
// rejecting configurations the chosen layer can never accept.

use std::fmt;
use std::str::FromStr;

use wren_core::error::{Error, Result};
use wren_core::{Backend, WithDType};

use crate::layer::Layer;
use crate::split::SplitLayer;

/// The layer types this crate can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerType {
    Split,
}

impl LayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerType::Split => "Split",
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Split" => Ok(LayerType::Split),
            other => Err(Error::msg(format!("unknown layer type '{other}'"))),
        }
    }
}

/// Configuration for a single graph node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerConfig {
    /// Node name, used in logs.
    pub name: String,
    pub layer_type: LayerType,
    /// Number of output blobs the graph wires to this node.
    pub num_outputs: usize,
}

impl LayerConfig {
    /// A config with a single output; adjust with the builder methods.
    pub fn new(layer_type: LayerType) -> Self {
        Self {
            name: layer_type.as_str().to_lowercase(),
            layer_type,
            num_outputs: 1,
        }
    }

    /// Set the node name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the number of outputs.
    pub fn with_num_outputs(mut self, num_outputs: usize) -> Self {
        self.num_outputs = num_outputs;
        self
    }
}

/// Build the layer described by `config` for element type `T` on backend `B`.
pub fn build_layer<T: WithDType, B: Backend>(config: &LayerConfig) -> Result<Box<dyn Layer<T>>> {
    let layer: Box<dyn Layer<T>> = match config.layer_type {
        LayerType::Split => Box::new(SplitLayer::<T, B>::new(config.name.clone())),
    };
    if let Some(min) = layer.min_outputs() {
        if config.num_outputs < min {
            return Err(Error::TooFewOutputs {
                layer: layer.type_name(),
                min,
                got: config.num_outputs,
            });
        }
    }
    log::debug!(
        "built {} layer '{}' ({}, {} backend, {} output(s))",
        config.layer_type,
        config.name,
        T::DTYPE,
        B::name(),
        config.num_outputs
    );
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wren_core::CpuBackend;

    #[test]
    fn test_layer_type_parse() {
        assert_eq!("Split".parse::<LayerType>().unwrap(), LayerType::Split);
        assert!("Concat".parse::<LayerType>().is_err());
        assert_eq!(LayerType::Split.to_string(), "Split");
    }

    #[test]
    fn test_config_builder() {
        let cfg = LayerConfig::new(LayerType::Split)
            .with_name("conv1_split")
            .with_num_outputs(3);
        assert_eq!(cfg.name, "conv1_split");
        assert_eq!(cfg.num_outputs, 3);
    }

    #[test]
    fn test_build_split() -> Result<()> {
        let cfg = LayerConfig::new(LayerType::Split).with_num_outputs(2);
        let layer = build_layer::<f32, CpuBackend>(&cfg)?;
        assert_eq!(layer.type_name(), "Split");
        assert_eq!(layer.name(), "split");
        Ok(())
    }

    #[test]
    fn test_build_rejects_zero_outputs() {
        let cfg = LayerConfig::new(LayerType::Split).with_num_outputs(0);
        let err = build_layer::<f32, CpuBackend>(&cfg).err().unwrap();
        assert!(matches!(err, Error::TooFewOutputs { min: 1, got: 0, .. }));
        assert!(err.is_fatal());
    }
}
