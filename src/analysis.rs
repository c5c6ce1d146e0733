//! Seam to an external numeric-analysis engine.
//!
//! The engine (prime detection, field decomposition, resonance scoring) lives
//! outside this crate. Coordinates hand it their components as plain unsigned
//! integers and get back whatever report type the engine defines.

use num_bigint::BigUint;

use crate::coordinate::{Coordinate, Dimension};

pub trait NumberAnalyzer {
    type Report;

    fn analyze(&self, value: &BigUint) -> Self::Report;
}

impl<A: NumberAnalyzer + ?Sized> NumberAnalyzer for &A {
    type Report = A::Report;

    fn analyze(&self, value: &BigUint) -> Self::Report {
        (**self).analyze(value)
    }
}

pub fn analyze_dimension<A: NumberAnalyzer + ?Sized>(
    analyzer: &A,
    coordinate: &Coordinate,
    dimension: Dimension,
) -> A::Report {
    analyzer.analyze(&coordinate.component(dimension).to_biguint())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::U256;

    struct BitLength;

    impl NumberAnalyzer for BitLength {
        type Report = u64;

        fn analyze(&self, value: &BigUint) -> u64 {
            value.bits()
        }
    }

    #[test]
    fn test_components_pass_as_plain_integers() {
        let c = Coordinate::new(U256::from(255u64), U256::MAX, U256::ZERO, U256::from_words(1, 0));
        assert_eq!(analyze_dimension(&BitLength, &c, Dimension::Spatial), 8);
        assert_eq!(analyze_dimension(&BitLength, &c, Dimension::Energy), 256);
        assert_eq!(analyze_dimension(&BitLength, &c, Dimension::Topology), 0);
        assert_eq!(analyze_dimension(&BitLength, &c, Dimension::Temporal), 129);
    }
}
