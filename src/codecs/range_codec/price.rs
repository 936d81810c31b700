//! Precomputed bit prices for the optimal parser.
//!
//! A price is a cost in 1/16ths of a bit. The table maps a probability
//! bucket (cells quantized to 16 values apart) to the cost of coding a
//! bit against it, computed once at first use.

use lazy_static::lazy_static;

use super::probability::BitModel;
use super::{BIT_MODEL_TOTAL, BIT_MODEL_TOTAL_BITS};

const MOVE_REDUCING_BITS: u32 = 4;
const BIT_PRICE_SHIFT_BITS: u32 = 4;

lazy_static! {
    static ref PROB_PRICES: [u32; (BIT_MODEL_TOTAL >> MOVE_REDUCING_BITS) as usize] = {
        let mut prices = [0u32; (BIT_MODEL_TOTAL >> MOVE_REDUCING_BITS) as usize];
        let step = 1u32 << MOVE_REDUCING_BITS;
        let mut i = step / 2;
        while i < BIT_MODEL_TOTAL {
            let mut w = i;
            let mut bit_count = 0u32;
            for _ in 0..BIT_PRICE_SHIFT_BITS {
                w = w.wrapping_mul(w);
                bit_count <<= 1;
                while w >= 1 << 16 {
                    w >>= 1;
                    bit_count += 1;
                }
            }
            prices[(i >> MOVE_REDUCING_BITS) as usize] =
                (BIT_MODEL_TOTAL_BITS << BIT_PRICE_SHIFT_BITS) - 15 - bit_count;
            i += step;
        }
        prices
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Price(u32);

impl Price {
    pub fn zero() -> Self {
        Self(0)
    }

    /// Larger than any cost a real symbol chain can accumulate.
    pub fn infinity() -> Self {
        Self(1 << 30)
    }

    /// Cost of coding `bit` against the probability cell `prob`.
    pub fn of_bit(prob: BitModel, bit: u32) -> Self {
        debug_assert!(bit <= 1);
        let mask = 0u32.wrapping_sub(bit) & (BIT_MODEL_TOTAL - 1);
        Self(PROB_PRICES[((prob.0 as u32 ^ mask) >> MOVE_REDUCING_BITS) as usize])
    }

    /// Cost of `count` model-free bits.
    pub fn of_direct_bits(count: u32) -> Self {
        Self(count << BIT_PRICE_SHIFT_BITS)
    }
}

impl std::ops::Add for Price {
    type Output = Price;
    fn add(self, rhs: Price) -> Price {
        Price(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Price {
    fn add_assign(&mut self, rhs: Price) {
        self.0 += rhs.0;
    }
}

impl BitModel {
    pub fn price(&self, bit: u32) -> Price {
        Price::of_bit(*self, bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_probability_costs_one_bit() {
        let prob = BitModel::new();
        let p0 = Price::of_bit(prob, 0);
        let p1 = Price::of_bit(prob, 1);
        // 1024/2048 is an even split; either outcome costs ~1 bit.
        assert_eq!(p0, p1);
        assert_eq!(p0, Price::of_direct_bits(1));
    }

    #[test]
    fn test_skewed_probability() {
        let mut prob = BitModel::new();
        for _ in 0..100 {
            prob.update_0();
        }
        // A likely zero is cheap, an unlikely one is expensive.
        assert!(Price::of_bit(prob, 0) < Price::of_direct_bits(1));
        assert!(Price::of_bit(prob, 1) > Price::of_direct_bits(1));
    }

    #[test]
    fn test_ordering_and_sum() {
        assert!(Price::zero() < Price::infinity());
        let two_bits = Price::of_direct_bits(1) + Price::of_direct_bits(1);
        assert_eq!(two_bits, Price::of_direct_bits(2));
    }
}
