//! Engine and model configuration.
//!
//! Both records are consumed already resolved; reading them from files or a
//! model catalog is left to the caller.

/// Scheduler sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Number of slots, i.e. sequences generated concurrently.
    pub max_parallel: usize,
    /// Largest chunk of tokens submitted to one backend decode call.
    pub batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            batch_size: 512,
        }
    }
}

impl EngineConfig {
    pub fn new(max_parallel: usize, batch_size: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            batch_size: batch_size.max(1),
        }
    }
}

/// Numeric options forwarded to the [`ModelLoader`](crate::backend::ModelLoader).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ModelOptions {
    /// Context length in tokens, shared by all slots' sequences.
    pub context_length: usize,
    pub gpu_layers: i32,
    pub use_mmap: bool,
    pub use_mlock: bool,
    /// Worker threads for the native backend; `None` lets it decide.
    pub threads: Option<usize>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            context_length: 4096,
            gpu_layers: 0,
            use_mmap: true,
            use_mlock: false,
            threads: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_never_zero() {
        let config = EngineConfig::new(0, 0);
        assert_eq!(config.max_parallel, 1);
        assert_eq!(config.batch_size, 1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_with_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_parallel": 8}"#).unwrap();
        assert_eq!(config, EngineConfig { max_parallel: 8, batch_size: 512 });

        let model: ModelOptions = serde_json::from_str(r#"{"context_length": 2048, "gpu_layers": -1}"#).unwrap();
        assert_eq!(model.context_length, 2048);
        assert_eq!(model.gpu_layers, -1);
        assert!(model.use_mmap);
    }
}
