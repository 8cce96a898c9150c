//! Deterministic derivation of numbers (usually ports) from string keys.
//!
//! Generated manifests are applied over and over again. A value that has to
//! be generated, like the node port of a service, must therefore come out the
//! same on every run, on every machine.
use sha2::{Digest, Sha256};
use snafu::{Snafu, ensure};

/// The smallest valid port number.
pub const MIN_PORT_NUMBER: u32 = 1;

/// The largest valid port number.
pub const MAX_PORT_NUMBER: u32 = 65535;

/// Lower bound (inclusive) of the default node port window.
pub const MIN_NODE_PORT: u32 = 30000;

/// Upper bound (exclusive) of the default node port window.
pub const MAX_NODE_PORT: u32 = 31999;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum InvalidRangeError {
    #[snafu(display("range [{min}, {max}) is empty, min must be smaller than max"))]
    EmptyRange { min: u32, max: u32 },

    #[snafu(display(
        "range [{min}, {max}) exceeds the valid port range [{MIN_PORT_NUMBER}, {MAX_PORT_NUMBER}]"
    ))]
    OutOfBounds { min: u32, max: u32 },
}

/// Maps string keys into a numeric range, reproducibly.
///
/// The key is hashed with SHA-256 (over its UTF-8 bytes). The digest is read
/// as a big-endian two's complement integer and reduced with a non-negative
/// modulus of the range width. This matches the node ports in manifests that
/// were generated by the JVM based tooling, which reads the digest the same
/// way.
///
/// ```
/// use stackable_manifest::stable::StableAssigner;
///
/// let port = StableAssigner::assign("my-app", 30000, 31999).unwrap();
/// assert_eq!(port, 31947);
/// assert_eq!(StableAssigner::node_port("my-app"), port);
/// ```
pub struct StableAssigner;

impl StableAssigner {
    /// Returns a number in `[min, max)` derived from `key`.
    ///
    /// Both bounds must lie within the valid port range and `min` must be
    /// smaller than `max`.
    pub fn assign(key: &str, min: u32, max: u32) -> Result<u32, InvalidRangeError> {
        ensure!(
            min >= MIN_PORT_NUMBER && max <= MAX_PORT_NUMBER,
            OutOfBoundsSnafu { min, max }
        );
        ensure!(min < max, EmptyRangeSnafu { min, max });

        let digest = Sha256::digest(key.as_bytes());
        let offset = signed_rem_euclid(&digest, u64::from(max - min));

        Ok(min + offset as u32)
    }

    /// Returns a node port in `[MIN_NODE_PORT, MAX_NODE_PORT)` derived from
    /// `key`.
    pub fn node_port(key: &str) -> u32 {
        let digest = Sha256::digest(key.as_bytes());
        let width = u64::from(MAX_NODE_PORT - MIN_NODE_PORT);
        MIN_NODE_PORT + signed_rem_euclid(&digest, width) as u32
    }
}

/// Computes the non-negative remainder of the big-endian two's complement
/// integer in `bytes` divided by `modulus`.
///
/// `modulus` must be non-zero and small enough for `modulus * 256` to fit into
/// an `u64`.
fn signed_rem_euclid(bytes: &[u8], modulus: u64) -> u64 {
    let unsigned = bytes
        .iter()
        .fold(0, |rem, byte| (rem * 256 + u64::from(*byte)) % modulus);

    let negative = bytes.first().is_some_and(|byte| byte & 0x80 != 0);
    if !negative {
        return unsigned;
    }

    // The signed value is the unsigned one minus 2^(8 * len)
    let wrap = bytes.iter().fold(1 % modulus, |rem, _| (rem * 256) % modulus);
    (unsigned + modulus - wrap) % modulus
}
