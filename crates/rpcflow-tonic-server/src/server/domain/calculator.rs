use rpcflow::{Classify, Code};

/// A calculator input the service refuses to work with. Every variant is the
/// caller's fault, so all of them are reported as `InvalidArgument`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalculatorError {
    #[error("Received a negative number: {0}")]
    NegativeNumber(i32),
    #[error("Cannot compute the average of an empty stream")]
    EmptyStream,
    #[error("Sum of {first} and {second} overflows a 64-bit integer")]
    Overflow { first: i64, second: i64 },
}

impl Classify for CalculatorError {
    fn code(&self) -> Code {
        Code::InvalidArgument
    }
}

pub fn sum(first: i64, second: i64) -> Result<i64, CalculatorError> {
    first
        .checked_add(second)
        .ok_or(CalculatorError::Overflow { first, second })
}

pub fn square_root(number: i32) -> Result<f64, CalculatorError> {
    if number < 0 {
        return Err(CalculatorError::NegativeNumber(number));
    }
    Ok(f64::from(number).sqrt())
}

/// The prime factors of a number in non-decreasing order, found by trial
/// division one factor at a time.
///
/// Numbers below 2 have no factors.
#[derive(Debug, Clone)]
pub struct PrimeFactors {
    remaining: i64,
    divisor: i64,
}

impl PrimeFactors {
    pub const fn new(number: i64) -> Self {
        Self {
            remaining: number,
            divisor: 2,
        }
    }
}

impl Iterator for PrimeFactors {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        while self.remaining > 1 {
            // Past the square root, what is left is itself prime.
            if self
                .divisor
                .checked_mul(self.divisor)
                .is_none_or(|square| square > self.remaining)
            {
                let prime = self.remaining;
                self.remaining = 1;
                return Some(prime);
            }
            if self.remaining % self.divisor == 0 {
                self.remaining /= self.divisor;
                return Some(self.divisor);
            }
            self.divisor += 1;
        }
        None
    }
}

/// Running mean over a stream of integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Average {
    total: i128,
    count: u64,
}

impl Average {
    pub fn push(&mut self, number: i64) {
        self.total += i128::from(number);
        self.count += 1;
    }

    pub const fn count(&self) -> u64 {
        self.count
    }

    pub fn finish(self) -> Result<f64, CalculatorError> {
        if self.count == 0 {
            return Err(CalculatorError::EmptyStream);
        }
        Ok(self.total as f64 / self.count as f64)
    }
}

/// The largest value seen so far. Starts from the first observation rather
/// than zero, so all-negative streams report their true maximum.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningMax {
    current: Option<i32>,
}

impl RunningMax {
    /// Folds in `number` and returns the maximum so far.
    pub fn observe(&mut self, number: i32) -> i32 {
        let max = self.current.map_or(number, |current| current.max(number));
        self.current = Some(max);
        max
    }

    pub const fn current(&self) -> Option<i32> {
        self.current
    }
}
