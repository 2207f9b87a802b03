use serde::{Deserialize, Serialize};

/// A decimal value encoded as a scale octet followed by a signed 32-bit
/// integer. The represented number is `value * 10^(-scale)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Decimal {
    scale: u8,
    value: i32,
}

impl Decimal {
    /// Creates a new [`Decimal`]
    pub fn new(scale: u8, value: i32) -> Self {
        Self { scale, value }
    }

    /// Number of decimal digits after the point
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// The unscaled value
    pub fn value(&self) -> i32 {
        self.value
    }

    /// Approximates the decimal as a `f64`
    pub fn to_f64(&self) -> f64 {
        self.value as f64 / 10f64.powi(self.scale as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::Decimal;

    #[test]
    fn scaled_value() {
        let d = Decimal::new(2, 12345);
        assert_eq!(d.scale(), 2);
        assert_eq!(d.value(), 12345);
        assert!((d.to_f64() - 123.45).abs() < f64::EPSILON);
    }
}
