//! Seeded, named random streams. Each consumer draws from its own stream so
//! adding a consumer never perturbs another one's sequence.

use std::collections::HashMap;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub const ALLOCATOR_STREAM: &str = "allocator";

#[derive(Debug, Clone)]
pub struct RngStreams {
    seed: u64,
    master: ChaCha8Rng,
    streams: HashMap<String, ChaCha8Rng>,
}

impl RngStreams {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            master: ChaCha8Rng::seed_from_u64(seed),
            streams: HashMap::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the stream registered under `name`, deriving it from the
    /// master generator on first use.
    pub fn stream(&mut self, name: &str) -> StreamRng<'_> {
        let master = &mut self.master;
        let inner = self.streams.entry(name.to_string()).or_insert_with(|| {
            let mut seed = [0u8; 32];
            master.fill_bytes(&mut seed);
            ChaCha8Rng::from_seed(seed)
        });
        StreamRng { inner }
    }
}

pub struct StreamRng<'a> {
    inner: &'a mut ChaCha8Rng,
}

impl RngCore for StreamRng<'_> {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}
