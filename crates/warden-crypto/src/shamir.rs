//! Shamir secret sharing over GF(2^8).
//!
//! Each byte of the secret is the constant term of its own random polynomial
//! of degree `threshold - 1`. Share `i` holds the evaluations of every
//! polynomial at `x = i`, so shares are as long as the secret and indices run
//! from 1 to `total_shares`.
//!
//! Reconstruction is Lagrange interpolation at `x = 0`. Any `threshold`
//! distinct shares recover the secret; any fewer are uniformly distributed
//! and carry no information about it.
//!
//! Shares never leave the client. The ledger only ever sees commitments to
//! them.

use rand::{rngs::OsRng, CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::gf256;
use crate::{CryptoError, Result};

/// Largest share count: indices are nonzero elements of GF(2^8).
pub const MAX_SHARES: usize = 255;

/// Smallest meaningful threshold.
pub const MIN_THRESHOLD: usize = 2;

/// One guardian's share of a split secret.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Share {
    /// Evaluation point, `1..=total_shares`.
    pub index: u8,
    /// Polynomial evaluations, one per secret byte.
    pub data: Vec<u8>,
}

impl Share {
    /// Wrap a share received over the out-of-band channel.
    pub fn new(index: u8, data: Vec<u8>) -> Self {
        Self { index, data }
    }
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .field("data", &format_args!("[REDACTED; {} bytes]", self.data.len()))
            .finish()
    }
}

/// Check `2 <= threshold <= total_shares <= 255`.
pub fn validate_parameters(threshold: usize, total_shares: usize) -> Result<()> {
    if threshold < MIN_THRESHOLD {
        return Err(CryptoError::InvalidThreshold {
            threshold,
            total_shares,
        });
    }
    if total_shares == 0 || total_shares > MAX_SHARES {
        return Err(CryptoError::InvalidShareCount {
            total_shares,
            max: MAX_SHARES,
        });
    }
    if threshold > total_shares {
        return Err(CryptoError::InvalidThreshold {
            threshold,
            total_shares,
        });
    }
    Ok(())
}

/// Split `secret` into `total_shares` shares, any `threshold` of which
/// reconstruct it.
///
/// Coefficients are drawn from the operating system CSPRNG.
///
/// # Errors
///
/// - [`CryptoError::InvalidThreshold`] if `threshold < 2` or `threshold > total_shares`
/// - [`CryptoError::InvalidShareCount`] if `total_shares` is 0 or above 255
/// - [`CryptoError::EmptySecret`] if `secret` is empty
pub fn split(secret: &[u8], threshold: usize, total_shares: usize) -> Result<Vec<Share>> {
    split_with_rng(secret, threshold, total_shares, &mut OsRng)
}

/// [`split`] with an injected random source.
pub fn split_with_rng<R: RngCore + CryptoRng>(
    secret: &[u8],
    threshold: usize,
    total_shares: usize,
    rng: &mut R,
) -> Result<Vec<Share>> {
    validate_parameters(threshold, total_shares)?;
    if secret.is_empty() {
        return Err(CryptoError::EmptySecret);
    }

    // Row k holds coefficient a_{k+1} for every secret byte.
    let degree = threshold - 1;
    let width = secret.len();
    let mut coefficients = Zeroizing::new(vec![0u8; degree * width]);
    rng.fill_bytes(&mut coefficients);

    let shares = (1..=total_shares)
        .map(|x| {
            let x = x as u8;
            let data = secret
                .iter()
                .enumerate()
                .map(|(j, &constant)| {
                    let mut acc = 0u8;
                    for k in (0..degree).rev() {
                        acc = gf256::add(gf256::mul(acc, x), coefficients[k * width + j]);
                    }
                    gf256::add(gf256::mul(acc, x), constant)
                })
                .collect();
            Share { index: x, data }
        })
        .collect();

    Ok(shares)
}

/// Reconstruct a secret from at least `threshold` shares.
///
/// # Errors
///
/// - [`CryptoError::InvalidThreshold`] if `threshold < 2`
/// - [`CryptoError::InsufficientShares`] if fewer than `threshold` shares are given
/// - anything [`interpolate`] rejects
pub fn reconstruct(shares: &[Share], threshold: usize) -> Result<Zeroizing<Vec<u8>>> {
    if threshold < MIN_THRESHOLD {
        return Err(CryptoError::InvalidThreshold {
            threshold,
            total_shares: shares.len(),
        });
    }
    if shares.len() < threshold {
        return Err(CryptoError::InsufficientShares {
            available: shares.len(),
            required: threshold,
        });
    }
    interpolate(shares)
}

/// Evaluate the polynomial through `shares` at `x = 0`.
///
/// Does not know the threshold: given fewer shares than were used to split,
/// it returns a value unrelated to the secret.
///
/// # Errors
///
/// - [`CryptoError::InsufficientShares`] if `shares` is empty
/// - [`CryptoError::InvalidShare`] on a zero index, empty data, or mismatched lengths
/// - [`CryptoError::DuplicateShareIndex`] if two shares carry the same index
pub fn interpolate(shares: &[Share]) -> Result<Zeroizing<Vec<u8>>> {
    let first = shares.first().ok_or(CryptoError::InsufficientShares {
        available: 0,
        required: 1,
    })?;
    let width = first.data.len();
    if width == 0 {
        return Err(CryptoError::InvalidShare("share data is empty".into()));
    }

    let mut seen = [false; 256];
    for share in shares {
        if share.index == 0 {
            return Err(CryptoError::InvalidShare("share index 0 is reserved".into()));
        }
        if seen[share.index as usize] {
            return Err(CryptoError::DuplicateShareIndex(share.index));
        }
        seen[share.index as usize] = true;
        if share.data.len() != width {
            return Err(CryptoError::InvalidShare(format!(
                "share {} has {} bytes, expected {}",
                share.index,
                share.data.len(),
                width
            )));
        }
    }

    let mut secret = Zeroizing::new(vec![0u8; width]);
    for (i, share) in shares.iter().enumerate() {
        // l_i(0) = prod x_j / (x_j - x_i), subtraction being XOR.
        let mut numerator = 1u8;
        let mut denominator = 1u8;
        for (j, other) in shares.iter().enumerate() {
            if i == j {
                continue;
            }
            numerator = gf256::mul(numerator, other.index);
            denominator = gf256::mul(denominator, gf256::add(other.index, share.index));
        }
        let basis = gf256::div(numerator, denominator)?;

        for (out, &y) in secret.iter_mut().zip(&share.data) {
            *out = gf256::add(*out, gf256::mul(y, basis));
        }
    }

    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Emits a fixed byte sequence, for enumerating coefficient choices.
    struct FixedRng {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl FixedRng {
        fn new(bytes: Vec<u8>) -> Self {
            Self { bytes, pos: 0 }
        }
    }

    impl RngCore for FixedRng {
        fn next_u32(&mut self) -> u32 {
            let mut buf = [0u8; 4];
            self.fill_bytes(&mut buf);
            u32::from_le_bytes(buf)
        }

        fn next_u64(&mut self) -> u64 {
            let mut buf = [0u8; 8];
            self.fill_bytes(&mut buf);
            u64::from_le_bytes(buf)
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for byte in dest.iter_mut() {
                *byte = self.bytes[self.pos % self.bytes.len()];
                self.pos += 1;
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    impl CryptoRng for FixedRng {}

    fn subsets(n: usize, k: usize) -> Vec<Vec<usize>> {
        fn walk(start: usize, n: usize, k: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
            if current.len() == k {
                out.push(current.clone());
                return;
            }
            for i in start..n {
                current.push(i);
                walk(i + 1, n, k, current, out);
                current.pop();
            }
        }
        let mut out = Vec::new();
        walk(0, n, k, &mut Vec::new(), &mut out);
        out
    }

    fn pick(shares: &[Share], indices: &[usize]) -> Vec<Share> {
        indices.iter().map(|&i| shares[i].clone()).collect()
    }

    #[test]
    fn test_two_of_three_scenario() {
        let secret = [0x2Au8; 32];
        let shares = split(&secret, 2, 3).expect("split");
        assert_eq!(shares.len(), 3);

        for pair in [[0, 1], [0, 2], [1, 2]] {
            let recovered = reconstruct(&pick(&shares, &pair), 2).expect("reconstruct");
            assert_eq!(recovered.as_slice(), &secret);
        }

        for share in &shares {
            assert_ne!(share.data.as_slice(), &secret);
            assert!(matches!(
                reconstruct(std::slice::from_ref(share), 2),
                Err(CryptoError::InsufficientShares {
                    available: 1,
                    required: 2
                })
            ));
        }
    }

    #[test]
    fn test_share_indices_sequential() {
        let shares = split(b"secret", 3, 5).expect("split");
        let indices: Vec<u8> = shares.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
        assert!(shares.iter().all(|s| s.data.len() == 6));
    }

    #[test]
    fn test_every_subset_reconstructs_small() {
        let mut rng = StdRng::seed_from_u64(0x5741_5244);
        let secret = b"correct horse battery staple";
        for total in 2..=7 {
            for threshold in 2..=total {
                let shares =
                    split_with_rng(secret, threshold, total, &mut rng).expect("split");
                for subset in subsets(total, threshold) {
                    let recovered =
                        reconstruct(&pick(&shares, &subset), threshold).expect("reconstruct");
                    assert_eq!(
                        recovered.as_slice(),
                        secret,
                        "M={threshold} N={total} subset={subset:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_large_parameters_reconstruct() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);

        for (threshold, total) in [(2, 255), (10, 255), (128, 200), (254, 255), (255, 255)] {
            let shares = split_with_rng(&secret, threshold, total, &mut rng).expect("split");

            let head: Vec<usize> = (0..threshold).collect();
            let tail: Vec<usize> = (total - threshold..total).collect();
            let spread: Vec<usize> = (0..threshold).map(|i| i * total / threshold).collect();

            for subset in [head, tail, spread] {
                let recovered =
                    reconstruct(&pick(&shares, &subset), threshold).expect("reconstruct");
                assert_eq!(recovered.as_slice(), &secret, "M={threshold} N={total}");
            }
        }
    }

    #[test]
    fn test_more_than_threshold_reconstructs() {
        let secret = b"over-provisioned";
        let shares = split(secret, 3, 6).expect("split");
        let recovered = reconstruct(&shares, 3).expect("reconstruct");
        assert_eq!(recovered.as_slice(), secret);
    }

    #[test]
    fn test_below_threshold_shares_are_exactly_uniform() {
        // M=3: for a fixed secret byte, (a1, a2) -> (f(1), f(2)) must be a
        // bijection, so every pair of share bytes occurs exactly once.
        for secret in [0x00u8, 0x2A, 0xFF] {
            let mut counts = vec![0u32; 65536];
            for a1 in 0..=255u8 {
                for a2 in 0..=255u8 {
                    let mut rng = FixedRng::new(vec![a1, a2]);
                    let shares = split_with_rng(&[secret], 3, 3, &mut rng).expect("split");
                    let y1 = shares[0].data[0] as usize;
                    let y2 = shares[1].data[0] as usize;
                    counts[(y1 << 8) | y2] += 1;
                }
            }
            assert!(
                counts.iter().all(|&c| c == 1),
                "share pair distribution not uniform for secret {secret:#04x}"
            );
        }
    }

    #[test]
    fn test_below_threshold_interpolation_independent_of_secret() {
        let mut rng = StdRng::seed_from_u64(0xDEAD_BEEF);
        let secret_byte = 0x2Au8;
        let mut counts = [0u32; 256];
        let trials = 25_600;

        for _ in 0..trials {
            let shares = split_with_rng(&[secret_byte], 3, 3, &mut rng).expect("split");
            let guess = interpolate(&shares[..2]).expect("interpolate");
            counts[guess[0] as usize] += 1;
        }

        // Expected 100 per bucket; a correlated guess would pile up on 0x2A.
        for (value, &count) in counts.iter().enumerate() {
            assert!(
                (50..=150).contains(&count),
                "value {value:#04x} seen {count} times"
            );
        }
    }

    #[test]
    fn test_below_threshold_never_recovers_full_secret() {
        let mut rng = StdRng::seed_from_u64(42);
        let secret = [0x2Au8; 32];
        for _ in 0..500 {
            let shares = split_with_rng(&secret, 4, 6, &mut rng).expect("split");
            let guess = interpolate(&shares[1..4]).expect("interpolate");
            assert_ne!(guess.as_slice(), &secret);
        }
    }

    #[test]
    fn test_split_parameter_errors() {
        assert!(matches!(
            split(b"s", 1, 3),
            Err(CryptoError::InvalidThreshold { threshold: 1, .. })
        ));
        assert!(matches!(
            split(b"s", 4, 3),
            Err(CryptoError::InvalidThreshold { threshold: 4, .. })
        ));
        assert!(matches!(
            split(b"s", 2, 256),
            Err(CryptoError::InvalidShareCount {
                total_shares: 256,
                ..
            })
        ));
        assert!(matches!(
            split(b"s", 2, 0),
            Err(CryptoError::InvalidShareCount { total_shares: 0, .. })
        ));
        assert!(matches!(split(b"", 2, 3), Err(CryptoError::EmptySecret)));
    }

    #[test]
    fn test_zero_index_rejected() {
        let shares = vec![Share::new(0, vec![1]), Share::new(1, vec![2])];
        assert!(matches!(
            reconstruct(&shares, 2),
            Err(CryptoError::InvalidShare(_))
        ));
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let shares = split(b"dup", 2, 3).expect("split");
        let dup = vec![shares[1].clone(), shares[1].clone()];
        assert!(matches!(
            reconstruct(&dup, 2),
            Err(CryptoError::DuplicateShareIndex(2))
        ));
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let shares = vec![Share::new(1, vec![1, 2]), Share::new(2, vec![3])];
        assert!(matches!(
            reconstruct(&shares, 2),
            Err(CryptoError::InvalidShare(_))
        ));
    }

    #[test]
    fn test_empty_share_data_rejected() {
        let shares = vec![Share::new(1, vec![]), Share::new(2, vec![])];
        assert!(matches!(
            interpolate(&shares),
            Err(CryptoError::InvalidShare(_))
        ));
        assert!(matches!(
            interpolate(&[]),
            Err(CryptoError::InsufficientShares { available: 0, .. })
        ));
    }

    #[test]
    fn test_debug_redacts_share_data() {
        let share = Share::new(3, vec![0xAB; 4]);
        let rendered = format!("{share:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.to_lowercase().contains("ab, "));
        assert!(!rendered.contains("171"));
    }
}
