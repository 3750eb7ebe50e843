//! Exact rational numbers for timestamps, durations and rates.
//!
//! Media time is never carried as floating point: a 1/30 s frame duration
//! summed ten thousand times must land exactly on 1000/3 s.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// A rational number kept in lowest terms with a positive denominator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(i64, i64)", into = "(i64, i64)")]
pub struct Rational {
    /// Numerator
    num: i64,
    /// Denominator (always positive)
    den: i64,
}

impl Rational {
    /// Create a new rational number, reduced to lowest terms.
    ///
    /// # Panics
    ///
    /// Panics if denominator is zero.
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "Denominator cannot be zero");
        Self::from_wide(num as i128, den as i128)
    }

    /// Create a rational without panicking on a zero denominator.
    pub fn checked_new(num: i64, den: i64) -> Option<Self> {
        (den != 0).then(|| Self::new(num, den))
    }

    /// Create a rational from an integer.
    pub const fn from_int(n: i64) -> Self {
        Self { num: n, den: 1 }
    }

    /// Create a zero rational.
    pub const fn zero() -> Self {
        Self { num: 0, den: 1 }
    }

    /// Create a rational representing one.
    pub const fn one() -> Self {
        Self { num: 1, den: 1 }
    }

    /// Numerator in lowest terms.
    pub const fn num(&self) -> i64 {
        self.num
    }

    /// Denominator in lowest terms (always positive).
    pub const fn den(&self) -> i64 {
        self.den
    }

    /// Check if this rational is zero.
    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// Check if this rational is positive.
    pub fn is_positive(&self) -> bool {
        self.num > 0
    }

    /// Check if this rational is negative.
    pub fn is_negative(&self) -> bool {
        self.num < 0
    }

    /// Convert to f64. Only for display and logging.
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Get the reciprocal of this rational.
    ///
    /// # Panics
    ///
    /// Panics if the numerator is zero.
    pub fn recip(&self) -> Self {
        assert!(self.num != 0, "Cannot take reciprocal of zero");
        Self::new(self.den, self.num)
    }

    /// Multiply by an integer.
    pub fn mul_int(&self, n: i64) -> Self {
        Self::from_wide(self.num as i128 * n as i128, self.den as i128)
    }

    /// Divide by an integer.
    pub fn div_int(&self, n: i64) -> Self {
        assert!(n != 0, "Cannot divide by zero");
        Self::from_wide(self.num as i128, self.den as i128 * n as i128)
    }

    /// Round down to the nearest integer.
    pub fn floor(&self) -> i64 {
        self.num.div_euclid(self.den)
    }

    /// Round to the nearest integer, halves away from zero.
    pub fn round(&self) -> i64 {
        let twice = 2 * self.num as i128 + self.den as i128 * self.num.signum() as i128;
        (twice / (2 * self.den as i128)) as i64
    }

    /// Express this time as a whole number of `1/scale` units, rounded to nearest.
    pub fn to_units(&self, scale: u32) -> i64 {
        self.mul_int(scale as i64).round()
    }

    /// Express this time as a whole number of `1/scale` units, rounded down.
    pub fn to_units_floor(&self, scale: u32) -> i64 {
        self.mul_int(scale as i64).floor()
    }

    /// Build a time from a count of `1/scale` units.
    pub fn from_units(units: i64, scale: u32) -> Self {
        Self::new(units, scale as i64)
    }

    /// Largest multiple of `step` that does not exceed `self`.
    pub fn floor_to(&self, step: Rational) -> Self {
        step.mul_int((*self / step).floor())
    }

    fn from_wide(num: i128, den: i128) -> Self {
        let (mut num, mut den) = if den < 0 { (-num, -den) } else { (num, den) };
        if num == 0 {
            return Self::zero();
        }
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()) as i128;
        num /= g;
        den /= g;
        Self {
            num: i64::try_from(num).expect("rational numerator overflow"),
            den: i64::try_from(den).expect("rational denominator overflow"),
        }
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rational({}/{})", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        lhs.cmp(&rhs)
    }
}

impl Add for Rational {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        let num = self.num as i128 * rhs.den as i128 + rhs.num as i128 * self.den as i128;
        Self::from_wide(num, self.den as i128 * rhs.den as i128)
    }
}

impl AddAssign for Rational {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Rational {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self + (-rhs)
    }
}

impl Neg for Rational {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            num: -self.num,
            den: self.den,
        }
    }
}

impl Mul for Rational {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self::from_wide(
            self.num as i128 * rhs.num as i128,
            self.den as i128 * rhs.den as i128,
        )
    }
}

impl Div for Rational {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        assert!(rhs.num != 0, "Cannot divide by zero");
        Self::from_wide(
            self.num as i128 * rhs.den as i128,
            self.den as i128 * rhs.num as i128,
        )
    }
}

impl From<i64> for Rational {
    fn from(n: i64) -> Self {
        Self::from_int(n)
    }
}

impl TryFrom<(i64, i64)> for Rational {
    type Error = &'static str;

    fn try_from((num, den): (i64, i64)) -> Result<Self, Self::Error> {
        Self::checked_new(num, den).ok_or("zero denominator")
    }
}

impl From<Rational> for (i64, i64) {
    fn from(r: Rational) -> Self {
        (r.num, r.den)
    }
}

impl std::iter::Sum for Rational {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, r| acc + r)
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
