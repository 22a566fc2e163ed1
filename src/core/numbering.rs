use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ArcaError;

/// Largest point of sale that fits the four-digit `PPPP` part.
pub const MAX_POINT_OF_SALE: u32 = 9_999;

/// Largest voucher number that fits the eight-digit `NNNNNNNN` part.
pub const MAX_SEQUENCE: u64 = 99_999_999;

/// Visible invoice number, `PPPP-NNNNNNNN`: point of sale and voucher number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvoiceNumber {
    pub point_of_sale: u32,
    pub sequence: u64,
}

impl InvoiceNumber {
    pub fn new(point_of_sale: u32, sequence: u64) -> Self {
        Self {
            point_of_sale,
            sequence,
        }
    }

    /// Same point of sale, next voucher number.
    pub fn next(&self) -> Self {
        Self::new(self.point_of_sale, self.sequence + 1)
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:08}", self.point_of_sale, self.sequence)
    }
}

impl FromStr for InvoiceNumber {
    type Err = ArcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pos, seq) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| ArcaError::Numbering(format!("expected PPPP-NNNNNNNN, got {s:?}")))?;
        let point_of_sale = pos
            .parse::<u32>()
            .ok()
            .filter(|p| pos.bytes().all(|b| b.is_ascii_digit()) && *p <= MAX_POINT_OF_SALE)
            .ok_or_else(|| ArcaError::Numbering(format!("invalid point of sale in {s:?}")))?;
        let sequence = seq
            .parse::<u64>()
            .ok()
            .filter(|n| seq.bytes().all(|b| b.is_ascii_digit()) && *n <= MAX_SEQUENCE)
            .ok_or_else(|| ArcaError::Numbering(format!("invalid voucher number in {s:?}")))?;
        Ok(Self::new(point_of_sale, sequence))
    }
}

/// Provisional number generator for one point of sale.
///
/// Continues from the last number recorded locally. Numbers handed out here
/// are provisional: the authority's own sequence decides the final one.
#[derive(Debug, Clone)]
pub struct ProvisionalSequence {
    point_of_sale: u32,
    next_number: u64,
}

impl ProvisionalSequence {
    /// Create a sequence starting at 1.
    pub fn new(point_of_sale: u32) -> Self {
        Self {
            point_of_sale,
            next_number: 1,
        }
    }

    /// Create a sequence continuing after the last number in use.
    pub fn starting_after(point_of_sale: u32, last: u64) -> Self {
        Self {
            point_of_sale,
            next_number: last + 1,
        }
    }

    /// Generate the next provisional number.
    ///
    /// # Errors
    ///
    /// `Numbering` once the sequence runs past eight digits, or when the
    /// point of sale does not fit in four.
    pub fn next_number(&mut self) -> Result<InvoiceNumber, ArcaError> {
        if self.point_of_sale > MAX_POINT_OF_SALE {
            return Err(ArcaError::Numbering(format!(
                "point of sale {} exceeds {MAX_POINT_OF_SALE}",
                self.point_of_sale
            )));
        }
        if self.next_number > MAX_SEQUENCE {
            return Err(ArcaError::Numbering(format!(
                "voucher numbers exhausted for point of sale {:04}",
                self.point_of_sale
            )));
        }
        let num = InvoiceNumber::new(self.point_of_sale, self.next_number);
        self.next_number += 1;
        Ok(num)
    }

    /// Preview the next number without consuming it.
    pub fn peek(&self) -> InvoiceNumber {
        InvoiceNumber::new(self.point_of_sale, self.next_number)
    }

    /// First number for which `in_use` returns false, consuming it.
    pub fn next_free(
        &mut self,
        mut in_use: impl FnMut(&InvoiceNumber) -> bool,
    ) -> Result<InvoiceNumber, ArcaError> {
        loop {
            let candidate = self.next_number()?;
            if !in_use(&candidate) {
                return Ok(candidate);
            }
        }
    }

    pub fn point_of_sale(&self) -> u32 {
        self.point_of_sale
    }
}
