//! Fault injection for failure testing.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::FaultRateError;
use crate::service::Operation;

/// Probability, per operation, that a call fails before touching the store.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FaultRates {
    pub book: f64,
    pub cancel: f64,
}

impl FaultRates {
    /// Rates that never inject a fault.
    pub const NONE: FaultRates = FaultRates {
        book: 0.0,
        cancel: 0.0,
    };

    /// Creates validated rates.
    pub fn new(book: f64, cancel: f64) -> Result<Self, FaultRateError> {
        Ok(Self {
            book: validate(book)?,
            cancel: validate(cancel)?,
        })
    }
}

fn validate(rate: f64) -> Result<f64, FaultRateError> {
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(FaultRateError(rate))
    }
}

/// Rolls the dice for injected faults.
///
/// Rates are held as atomics so a test harness can change them while a saga is
/// running against the same service.
#[derive(Debug, Default)]
pub struct FaultInjector {
    book: AtomicU64,
    cancel: AtomicU64,
}

impl FaultInjector {
    pub fn new(rates: FaultRates) -> Result<Self, FaultRateError> {
        let rates = FaultRates::new(rates.book, rates.cancel)?;
        Ok(Self {
            book: AtomicU64::new(rates.book.to_bits()),
            cancel: AtomicU64::new(rates.cancel.to_bits()),
        })
    }

    /// Returns the current rates.
    pub fn rates(&self) -> FaultRates {
        FaultRates {
            book: f64::from_bits(self.book.load(Ordering::Relaxed)),
            cancel: f64::from_bits(self.cancel.load(Ordering::Relaxed)),
        }
    }

    /// Sets the fault rate for one operation.
    pub fn set_rate(&self, operation: Operation, rate: f64) -> Result<(), FaultRateError> {
        let rate = validate(rate)?;
        self.slot(operation).store(rate.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Returns true if this call should fail.
    pub fn should_fail(&self, operation: Operation) -> bool {
        let rate = f64::from_bits(self.slot(operation).load(Ordering::Relaxed));
        rate > 0.0 && rand::random::<f64>() < rate
    }

    fn slot(&self, operation: Operation) -> &AtomicU64 {
        match operation {
            Operation::Book => &self.book,
            Operation::Cancel => &self.cancel,
        }
    }
}
