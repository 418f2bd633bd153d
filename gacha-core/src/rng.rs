//! Uniform random sources consumed by the resolver.
use hmac::{Hmac, Mac};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::Sha256;
use std::collections::VecDeque;

/// Source of uniform rolls in `[0, 1)`. A roll hits when it is below the probability.
pub trait RollSource {
    fn roll(&mut self) -> f64;
}

impl<R: RngCore> RollSource for R {
    fn roll(&mut self) -> f64 {
        self.gen_range(0.0..1.0)
    }
}

/// Counting wrapper for RNG streams providing instrumentation.
#[derive(Debug, Clone)]
pub struct CountingRng<R> {
    rng: R,
    draws: u64,
}

/// Portable seeded stream used for replayable sessions.
pub type SeededRolls = CountingRng<ChaCha20Rng>;

impl CountingRng<ChaCha20Rng> {
    /// Derive a named stream from a user-visible seed.
    #[must_use]
    pub fn from_user_seed(seed: u64, domain_tag: &[u8]) -> Self {
        Self::wrap(ChaCha20Rng::seed_from_u64(derive_stream_seed(
            seed, domain_tag,
        )))
    }
}

impl<R: RngCore> CountingRng<R> {
    #[must_use]
    pub const fn wrap(rng: R) -> Self {
        Self { rng, draws: 0 }
    }

    /// Number of draw calls performed against this stream.
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.draws
    }
}

impl<R: RngCore> RngCore for CountingRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws = self.draws.saturating_add(1);
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.draws = self.draws.saturating_add(1);
        self.rng.try_fill_bytes(dest)
    }
}

/// HMAC-SHA256 domain separation of a user seed into a stream seed.
#[must_use]
pub fn derive_stream_seed(user_seed: u64, domain_tag: &[u8]) -> u64 {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(&user_seed.to_le_bytes()).expect("64-bit seed is valid key");
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let seed_bytes: [u8; 8] = digest[..8].try_into().expect("digest slice length");
    u64::from_le_bytes(seed_bytes)
}

/// Replays a fixed script of rolls, then repeats `fallback` forever.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedRolls {
    script: VecDeque<f64>,
    fallback: f64,
    consumed: u64,
}

impl ScriptedRolls {
    #[must_use]
    pub fn new(script: Vec<f64>, fallback: f64) -> Self {
        Self {
            script: script.into(),
            fallback,
            consumed: 0,
        }
    }

    /// A source that always returns `value`.
    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self::new(Vec::new(), value)
    }

    /// Append rolls to the end of the script.
    pub fn extend(&mut self, rolls: impl IntoIterator<Item = f64>) {
        self.script.extend(rolls);
    }

    #[must_use]
    pub const fn consumed(&self) -> u64 {
        self.consumed
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl RollSource for ScriptedRolls {
    fn roll(&mut self) -> f64 {
        self.consumed = self.consumed.saturating_add(1);
        let value = self.script.pop_front().unwrap_or(self.fallback);
        debug_assert!((0.0..1.0).contains(&value), "scripted roll {value} out of range");
        value
    }
}
