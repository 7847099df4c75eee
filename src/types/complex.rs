/// A complex number with float components.
///
/// Supports only the arithmetic the numeric opcodes need: add, sub, mul,
/// negation and equality. Complex numbers are unordered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    pub fn add(self, other: Self) -> Self {
        Self::new(self.re + other.re, self.im + other.im)
    }

    pub fn sub(self, other: Self) -> Self {
        Self::new(self.re - other.re, self.im - other.im)
    }

    pub fn mul(self, other: Self) -> Self {
        Self::new(
            self.re * other.re - self.im * other.im,
            self.re * other.im + self.im * other.re,
        )
    }

    pub fn neg(self) -> Self {
        Self::new(-self.re, -self.im)
    }

    pub fn is_zero(self) -> bool {
        self.re == 0.0 && self.im == 0.0
    }
}

impl std::fmt::Display for Complex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.re == 0.0 {
            write!(f, "{}j", self.im)
        } else if self.im >= 0.0 {
            write!(f, "({}+{}j)", self.re, self.im)
        } else {
            write!(f, "({}{}j)", self.re, self.im)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complex_arithmetic() {
        let a = Complex::new(1.0, 2.0);
        let b = Complex::new(3.0, -1.0);
        assert_eq!(a.add(b), Complex::new(4.0, 1.0));
        assert_eq!(a.sub(b), Complex::new(-2.0, 3.0));
        assert_eq!(a.mul(b), Complex::new(5.0, 5.0));
        assert_eq!(a.neg(), Complex::new(-1.0, -2.0));
    }

    #[test]
    fn test_complex_display() {
        assert_eq!(Complex::new(0.0, 2.0).to_string(), "2j");
        assert_eq!(Complex::new(1.0, 2.0).to_string(), "(1+2j)");
        assert_eq!(Complex::new(1.0, -2.0).to_string(), "(1-2j)");
    }
}
