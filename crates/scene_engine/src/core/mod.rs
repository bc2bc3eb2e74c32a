//! Engine-wide configuration types

pub mod config;

pub use config::{
    BufferCapacities, DataTextureConfig, EngineConfig, EngineLimits, StrategyKind,
};
