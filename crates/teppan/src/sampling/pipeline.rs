use rand::RngCore;

use super::{Candidates, Mirostat, SamplingOptions};
use crate::backend::{Sampler, Token};

/// Every truncation primitive keeps at least this many candidates.
const MIN_KEEP: usize = 1;

/// Mirostat v1 estimates its scale from this many top candidates.
const MIROSTAT_M: usize = 100;

/// Terminal strategy chosen for one prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Full softmax, then the most probable candidate.
    SoftmaxArgmax,
    /// Highest raw logit.
    Greedy,
    MirostatV1,
    MirostatV2,
    /// top-k, tail-free, typical, top-p, min-p, temperature, weighted draw.
    TruncationChain,
}

impl Strategy {
    /// Fixed precedence: negative temperature, zero temperature, mirostat
    /// mode, then the truncation chain.
    pub fn select(options: &SamplingOptions) -> Self {
        if options.temperature < 0.0 {
            Strategy::SoftmaxArgmax
        } else if options.temperature == 0.0 {
            Strategy::Greedy
        } else {
            match options.mirostat {
                Mirostat::V1 => Strategy::MirostatV1,
                Mirostat::V2 => Strategy::MirostatV2,
                Mirostat::Disabled => Strategy::TruncationChain,
            }
        }
    }
}

/// Mirostat controller state carried by a sequence between tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MirostatState {
    pub mu: f32,
    pub m: usize,
}

impl MirostatState {
    /// `mu` starts at twice the target surprise.
    pub fn new(tau: f32) -> Self {
        Self { mu: 2.0 * tau, m: MIROSTAT_M }
    }
}

/// Chooses one token from `candidates`.
///
/// `history` is every token of the sequence so far; penalties look at its
/// tail. `mirostat` is updated in place when a mirostat strategy runs.
pub fn sample<S>(
    sampler: &mut S,
    candidates: &mut Candidates,
    options: &SamplingOptions,
    history: &[Token],
    mirostat: &mut MirostatState,
    rng: &mut dyn RngCore,
) -> Token
where
    S: Sampler + ?Sized,
{
    if options.penalty_repeat != 1.0 {
        let window = options.penalty_last_n.min(history.len());
        sampler.apply_penalties(
            candidates,
            &history[history.len() - window..],
            options.penalty_repeat,
            options.penalty_freq,
            options.penalty_present,
        );
    }

    match Strategy::select(options) {
        Strategy::SoftmaxArgmax => {
            sampler.softmax(candidates);
            match candidates.first().map(|best| best.id) {
                Some(id) => id,
                None => sampler.greedy(candidates),
            }
        }
        Strategy::Greedy => sampler.greedy(candidates),
        Strategy::MirostatV1 => {
            sampler.temperature(candidates, options.temperature);
            sampler.mirostat(
                candidates,
                options.mirostat_tau,
                options.mirostat_eta,
                mirostat.m,
                &mut mirostat.mu,
                rng,
            )
        }
        Strategy::MirostatV2 => {
            sampler.temperature(candidates, options.temperature);
            sampler.mirostat_v2(candidates, options.mirostat_tau, options.mirostat_eta, &mut mirostat.mu, rng)
        }
        Strategy::TruncationChain => {
            sampler.top_k(candidates, options.top_k, MIN_KEEP);
            sampler.tail_free(candidates, options.tfs_z, MIN_KEEP);
            sampler.typical(candidates, options.typical_p, MIN_KEEP);
            sampler.top_p(candidates, options.top_p, MIN_KEEP);
            sampler.min_p(candidates, options.min_p, MIN_KEEP);
            sampler.temperature(candidates, options.temperature);
            sampler.sample(candidates, rng)
        }
    }
}
