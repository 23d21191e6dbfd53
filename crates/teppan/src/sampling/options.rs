/// Mirostat feedback-controlled sampling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Mirostat {
    #[default]
    Disabled,
    V1,
    V2,
}

/// Immutable per-prompt sampling configuration.
///
/// Which terminal strategy runs is decided by the values alone:
/// a negative `temperature` selects softmax-argmax, zero selects greedy,
/// `mirostat` selects a feedback controller, anything else runs the
/// truncation chain. See [`sample`](super::sample).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SamplingOptions {
    /// Seed for this prompt's random generator; `None` seeds from entropy.
    pub seed: Option<u64>,
    /// `<= 0` keeps the whole vocabulary.
    pub top_k: i32,
    pub top_p: f32,
    pub min_p: f32,
    pub tfs_z: f32,
    pub typical_p: f32,
    pub temperature: f32,
    pub mirostat: Mirostat,
    pub mirostat_tau: f32,
    pub mirostat_eta: f32,
    pub penalty_last_n: usize,
    /// `1.0` disables all three penalties.
    pub penalty_repeat: f32,
    pub penalty_freq: f32,
    pub penalty_present: f32,
    /// Generated-token limit; `None` runs until another stop condition and
    /// `Some(0)` ends the stream without emitting anything.
    pub response_max_tokens: Option<usize>,
    /// Strings that stop generation when they tokenize to a single token.
    pub extra_stop_tokens: Vec<String>,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            seed: None,
            top_k: 40,
            top_p: 0.95,
            min_p: 0.05,
            tfs_z: 1.0,
            typical_p: 1.0,
            temperature: 0.8,
            mirostat: Mirostat::Disabled,
            mirostat_tau: 5.0,
            mirostat_eta: 0.1,
            penalty_last_n: 64,
            penalty_repeat: 1.1,
            penalty_freq: 0.0,
            penalty_present: 0.0,
            response_max_tokens: None,
            extra_stop_tokens: vec![],
        }
    }
}

impl SamplingOptions {
    /// Deterministic argmax decoding with penalties off.
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            penalty_repeat: 1.0,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_k(mut self, top_k: i32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_min_p(mut self, min_p: f32) -> Self {
        self.min_p = min_p;
        self
    }

    pub fn with_tail_free(mut self, tfs_z: f32) -> Self {
        self.tfs_z = tfs_z;
        self
    }

    pub fn with_typical(mut self, typical_p: f32) -> Self {
        self.typical_p = typical_p;
        self
    }

    pub fn with_mirostat(mut self, mode: Mirostat, tau: f32, eta: f32) -> Self {
        self.mirostat = mode;
        self.mirostat_tau = tau;
        self.mirostat_eta = eta;
        self
    }

    pub fn with_penalties(mut self, last_n: usize, repeat: f32, freq: f32, present: f32) -> Self {
        self.penalty_last_n = last_n;
        self.penalty_repeat = repeat;
        self.penalty_freq = freq;
        self.penalty_present = present;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.response_max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop_token(mut self, stop: impl Into<String>) -> Self {
        self.extra_stop_tokens.push(stop.into());
        self
    }
}
