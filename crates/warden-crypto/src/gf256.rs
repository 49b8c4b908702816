//! Constant-time arithmetic in GF(2^8).
//!
//! The field is defined by the AES polynomial `x^8 + x^4 + x^3 + x + 1`
//! (`0x11b`). Multiplication and division go through `EXP`/`LOG` tables
//! generated from the primitive element `0x03`.
//!
//! ## Table construction
//!
//! [`Tables::build`] walks the powers of the generator and refuses any
//! generator whose multiplicative order is not exactly 255. A non-primitive
//! generator (e.g. `0x02` under `0x11b`, order 51) would silently truncate the
//! cycle and corrupt every share built on top of it. The production tables
//! are evaluated in a `const` context, so a bad generator fails the build;
//! [`self_test`] re-verifies them at startup.
//!
//! ## Timing
//!
//! No operation branches on operand values. Zero operands are handled by
//! masking the table result with [`nonzero_mask`] rather than by an early
//! return. The only branch is the divide-by-zero check in [`div`], whose
//! divisor is always a difference of public share indices.

use crate::Result;

/// The AES reduction polynomial `x^8 + x^4 + x^3 + x + 1`.
pub const POLYNOMIAL: u16 = 0x11b;

/// Primitive element of GF(2^8) under [`POLYNOMIAL`].
pub const GENERATOR: u8 = 0x03;

/// Order of the multiplicative group of GF(2^8).
pub const GROUP_ORDER: usize = 255;

/// Failure while building or verifying field tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// The polynomial is not of degree 8.
    #[error("polynomial {polynomial:#x} is not of degree 8")]
    InvalidPolynomial {
        /// The rejected polynomial.
        polynomial: u16,
    },

    /// The generator's multiplicative order is not 255.
    #[error("generator {generator:#04x} is not primitive (cycle length {order})")]
    NonPrimitiveGenerator {
        /// The rejected generator.
        generator: u8,
        /// Cycle length observed before the walk failed.
        order: u16,
    },

    /// A nonzero element has no log entry.
    #[error("log table has no entry for {element:#04x}")]
    IncompleteLogTable {
        /// The element missing from the table.
        element: u8,
    },

    /// Table multiplication disagrees with reference multiplication.
    #[error("table mismatch at {a:#04x} * {b:#04x}")]
    TableMismatch {
        /// Left operand.
        a: u8,
        /// Right operand.
        b: u8,
    },
}

/// Exponent and logarithm tables for GF(2^8).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tables {
    exp: [u8; 256],
    log: [u8; 256],
}

#[allow(clippy::panic)]
static TABLES: Tables = match Tables::build(POLYNOMIAL, GENERATOR) {
    Ok(tables) => tables,
    Err(_) => panic!("GF(2^8) generator is not primitive"),
};

impl Tables {
    /// Build the tables for `polynomial` from `generator`.
    ///
    /// # Errors
    ///
    /// - [`TableError::InvalidPolynomial`] if `polynomial` is not degree 8
    /// - [`TableError::NonPrimitiveGenerator`] if the powers of `generator`
    ///   do not cycle through all 255 nonzero elements
    /// - [`TableError::IncompleteLogTable`] if any nonzero element is left
    ///   without a logarithm
    pub const fn build(polynomial: u16, generator: u8) -> std::result::Result<Self, TableError> {
        if polynomial & 0x100 == 0 || polynomial > 0x1ff {
            return Err(TableError::InvalidPolynomial { polynomial });
        }

        let mut exp = [0u8; 256];
        let mut log = [0u8; 256];
        let mut x: u8 = 1;
        let mut i = 0;
        while i < GROUP_ORDER {
            if x == 0 || (i > 0 && x == 1) {
                return Err(TableError::NonPrimitiveGenerator {
                    generator,
                    order: i as u16,
                });
            }
            exp[i] = x;
            log[x as usize] = i as u8;
            x = mul_reduce(x, generator, polynomial);
            i += 1;
        }

        // g^255 must close the cycle.
        exp[GROUP_ORDER] = x;
        if exp[GROUP_ORDER] != exp[0] {
            return Err(TableError::NonPrimitiveGenerator {
                generator,
                order: GROUP_ORDER as u16,
            });
        }

        let mut element = 1;
        while element < 256 {
            if exp[log[element] as usize] != element as u8 {
                return Err(TableError::IncompleteLogTable {
                    element: element as u8,
                });
            }
            element += 1;
        }

        Ok(Self { exp, log })
    }

    /// `g^i` for `i` in `0..=255`.
    pub fn exp(&self, i: u8) -> u8 {
        self.exp[i as usize]
    }

    /// Discrete log of `x`. The entry for zero is meaningless and reads as 0.
    pub fn log(&self, x: u8) -> u8 {
        self.log[x as usize]
    }

    /// Multiply two field elements.
    #[inline]
    pub fn mul(&self, a: u8, b: u8) -> u8 {
        let sum = self.log[a as usize] as usize + self.log[b as usize] as usize;
        self.exp[sum % GROUP_ORDER] & nonzero_mask(a) & nonzero_mask(b)
    }

    /// Divide `a` by `b`.
    ///
    /// # Errors
    ///
    /// [`CryptoError::DivisionByZero`](crate::CryptoError::DivisionByZero) if `b == 0`.
    #[inline]
    pub fn div(&self, a: u8, b: u8) -> Result<u8> {
        if b == 0 {
            return Err(crate::CryptoError::DivisionByZero);
        }
        let diff = GROUP_ORDER + self.log[a as usize] as usize - self.log[b as usize] as usize;
        Ok(self.exp[diff % GROUP_ORDER] & nonzero_mask(a))
    }
}

/// The process-wide field tables.
pub fn tables() -> &'static Tables {
    &TABLES
}

/// `0xFF` if `x != 0`, else `0x00`, without branching.
#[inline]
pub fn nonzero_mask(x: u8) -> u8 {
    let wide = x as u16;
    ((wide | wide.wrapping_neg()) >> 8) as u8
}

/// Field addition (and subtraction): XOR.
#[inline]
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Field multiplication.
#[inline]
pub fn mul(a: u8, b: u8) -> u8 {
    TABLES.mul(a, b)
}

/// Field division.
///
/// # Errors
///
/// [`CryptoError::DivisionByZero`](crate::CryptoError::DivisionByZero) if `b == 0`.
#[inline]
pub fn div(a: u8, b: u8) -> Result<u8> {
    TABLES.div(a, b)
}

/// Carry-less shift-and-reduce multiplication, masked rather than branched.
///
/// Reference implementation used to build and cross-check the tables.
pub const fn mul_reduce(mut a: u8, mut b: u8, polynomial: u16) -> u8 {
    let reduce = (polynomial & 0xff) as u8;
    let mut product = 0u8;
    let mut i = 0;
    while i < 8 {
        product ^= a & (b & 1).wrapping_neg();
        let carry = (a >> 7).wrapping_neg();
        a = (a << 1) ^ (reduce & carry);
        b >>= 1;
        i += 1;
    }
    product
}

/// Verify the process-wide tables.
///
/// Rebuilds the tables, compares them with the static copy, and checks
/// every product and quotient against [`mul_reduce`]. Run once at startup;
/// a failure here is fatal and must never be handled per request.
pub fn self_test() -> Result<()> {
    let rebuilt = Tables::build(POLYNOMIAL, GENERATOR)?;
    if rebuilt != TABLES {
        return Err(TableError::TableMismatch { a: 0, b: 0 }.into());
    }

    for a in 0..=255u8 {
        for b in 0..=255u8 {
            let product = mul(a, b);
            if product != mul_reduce(a, b, POLYNOMIAL) {
                return Err(TableError::TableMismatch { a, b }.into());
            }
            if b != 0 && div(product, b)? != a {
                return Err(TableError::TableMismatch { a, b }.into());
            }
        }
    }

    tracing::debug!(
        polynomial = POLYNOMIAL,
        generator = GENERATOR,
        "GF(2^8) tables verified"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CryptoError;
    use hex_literal::hex;

    #[test]
    fn test_exp_table_prefix() {
        let expected = hex!("0103050f113355ff1a2e7296a1f81335");
        for (i, &value) in expected.iter().enumerate() {
            assert_eq!(tables().exp(i as u8), value, "exp[{i}]");
        }
    }

    #[test]
    fn test_cycle_closes() {
        assert_eq!(tables().exp(255), tables().exp(0));
        assert_eq!(tables().exp(0), 1);
    }

    #[test]
    fn test_all_nonzero_logs_populated() {
        let mut seen = [false; 256];
        for x in 1..=255u8 {
            let l = tables().log(x);
            assert!(l < 255);
            assert!(!seen[l as usize], "log {l} assigned twice");
            seen[l as usize] = true;
            assert_eq!(tables().exp(l), x);
        }
        assert_eq!(seen.iter().filter(|s| **s).count(), 255);
    }

    #[test]
    fn test_non_primitive_generator_rejected() {
        // 0x02 has order 51 under the AES polynomial.
        assert_eq!(
            Tables::build(POLYNOMIAL, 0x02),
            Err(TableError::NonPrimitiveGenerator {
                generator: 0x02,
                order: 51
            })
        );
    }

    #[test]
    fn test_degenerate_generators_rejected() {
        assert!(matches!(
            Tables::build(POLYNOMIAL, 0x00),
            Err(TableError::NonPrimitiveGenerator { order: 1, .. })
        ));
        assert!(matches!(
            Tables::build(POLYNOMIAL, 0x01),
            Err(TableError::NonPrimitiveGenerator { order: 1, .. })
        ));
    }

    #[test]
    fn test_every_primitive_generator_accepted() {
        let primitive = (1..=255u8)
            .filter(|&g| Tables::build(POLYNOMIAL, g).is_ok())
            .count();
        // phi(255) = 128 primitive elements.
        assert_eq!(primitive, 128);
    }

    #[test]
    fn test_invalid_polynomial_rejected() {
        assert!(matches!(
            Tables::build(0x1b, GENERATOR),
            Err(TableError::InvalidPolynomial { .. })
        ));
    }

    #[test]
    fn test_known_products() {
        // FIPS-197 section 4.2 examples.
        assert_eq!(mul(0x57, 0x83), 0xc1);
        assert_eq!(mul(0x57, 0x13), 0xfe);
    }

    #[test]
    fn test_zero_and_identity() {
        for a in 0..=255u8 {
            assert_eq!(mul(a, 0), 0);
            assert_eq!(mul(0, a), 0);
            assert_eq!(mul(a, 1), a);
        }
    }

    #[test]
    fn test_div_roundtrip() {
        for a in 0..=255u8 {
            for b in 1..=255u8 {
                let q = div(a, b).expect("nonzero divisor");
                assert_eq!(mul(q, b), a);
            }
        }
    }

    #[test]
    fn test_div_by_zero() {
        assert!(matches!(div(7, 0), Err(CryptoError::DivisionByZero)));
        assert!(matches!(div(0, 0), Err(CryptoError::DivisionByZero)));
    }

    #[test]
    fn test_div_zero_numerator() {
        for b in 1..=255u8 {
            assert_eq!(div(0, b).expect("div"), 0);
        }
    }

    #[test]
    fn test_distributive() {
        for a in (0..=255u8).step_by(7) {
            for b in (0..=255u8).step_by(11) {
                for c in (0..=255u8).step_by(13) {
                    assert_eq!(mul(a, add(b, c)), add(mul(a, b), mul(a, c)));
                }
            }
        }
    }

    #[test]
    fn test_nonzero_mask() {
        assert_eq!(nonzero_mask(0), 0x00);
        for x in 1..=255u8 {
            assert_eq!(nonzero_mask(x), 0xFF);
        }
    }

    #[test]
    fn test_self_test_passes() {
        self_test().expect("tables verify");
    }
}
