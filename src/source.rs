//! Seeded generator behind every emitted value.
//!
//! All fields are drawn as integers and scaled down, so a value always prints
//! exactly at its fixed precision: `n / 10_000` for the 4dp ratios, `n / 100`
//! for the 2dp rates.

use rand::rngs::OsRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::record::{KeyBits, Record, Tail, DETECTOR_SAMPLES, KEY_BITS, SAMPLE_MODULUS};
use crate::session::{Session, TailKind};

const RATIO_STEPS: u32 = 10_000;
const RATE_STEPS: u32 = 1_000;

/// Owns the RNG and the session counter. The emitter holds exactly one.
pub struct TelemetrySource {
    rng: ChaCha20Rng,
    seed: u64,
    session: Session,
}

impl TelemetrySource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed,
            session: Session::new(),
        }
    }

    /// Picks a fresh seed from the OS. The seed stays readable through
    /// [`TelemetrySource::seed`] so a run can be replayed.
    pub fn from_entropy() -> Self {
        Self::new(OsRng.next_u64())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Session the next record will carry.
    pub fn session(&self) -> Session {
        self.session
    }

    pub fn next_record(&mut self) -> Record {
        let session = self.session;
        self.session = session.next();

        let spd1 = self.detector_block();
        let decoy_state_randomness = self.ratio();
        let spd2 = self.detector_block();
        let visibility = self.ratio();
        let qber = self.rate();
        let tail = match session.tail_kind() {
            TailKind::Key => Tail::Key(self.key()),
            TailKind::KeyRate => Tail::KeyRate(self.rate()),
        };

        Record {
            session,
            spd1,
            decoy_state_randomness,
            spd2,
            visibility,
            qber,
            tail,
        }
    }

    fn detector_block(&mut self) -> Vec<u16> {
        (0..DETECTOR_SAMPLES)
            .map(|_| self.rng.gen_range(0..SAMPLE_MODULUS))
            .collect()
    }

    /// Uniform in `[0, 1)` at 4 decimal places.
    fn ratio(&mut self) -> f64 {
        f64::from(self.rng.gen_range(0..RATIO_STEPS)) / f64::from(RATIO_STEPS)
    }

    /// Uniform in `[0, 10)` at 2 decimal places.
    fn rate(&mut self) -> f64 {
        f64::from(self.rng.gen_range(0..RATE_STEPS)) / 100.0
    }

    fn key(&mut self) -> KeyBits {
        let text: String = (0..KEY_BITS)
            .map(|_| if self.rng.gen::<bool>() { '1' } else { '0' })
            .collect();
        KeyBits::from_generated(text)
    }
}
