// Consensus: proof-of-work and block checks

pub mod pow;
pub mod validation;

pub use pow::{MiningResult, ProofOfWork, Target, DEFAULT_DIFFICULTY};
pub use validation::{BlockValidator, ValidationError};
