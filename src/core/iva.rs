//! IVA (VAT) bucketing.
//!
//! Groups priced lines by rate, rounds per line and per bucket, and maps each
//! rate onto the authority's `AlicIva` code table.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::ArcaError;
use super::types::LineItem;

/// `AlicIva.Id`: authority code for an IVA rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IvaCode(pub u16);

impl IvaCode {
    /// 0% (exento / no gravado reported at rate zero).
    pub const ZERO: Self = Self(3);
    /// 10.5%.
    pub const REDUCED_10_5: Self = Self(4);
    /// 21%.
    pub const GENERAL_21: Self = Self(5);
    /// 27%.
    pub const INCREASED_27: Self = Self(6);
    /// 5%.
    pub const REDUCED_5: Self = Self(8);
    /// 2.5%.
    pub const REDUCED_2_5: Self = Self(9);
}

/// Result of looking up a rate's code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvaCodeLookup {
    pub code: IvaCode,
    /// True when the rate is not in the table and `code` is the 21% fallback.
    pub fallback: bool,
}

/// Map a rate percentage onto its authority code.
///
/// Total function: rates outside the table map to the 21% code with
/// `fallback` set.
pub fn iva_code(rate: Decimal) -> IvaCodeLookup {
    let code = if rate == dec!(0) {
        Some(IvaCode::ZERO)
    } else if rate == dec!(2.5) {
        Some(IvaCode::REDUCED_2_5)
    } else if rate == dec!(5) {
        Some(IvaCode::REDUCED_5)
    } else if rate == dec!(10.5) {
        Some(IvaCode::REDUCED_10_5)
    } else if rate == dec!(21) {
        Some(IvaCode::GENERAL_21)
    } else if rate == dec!(27) {
        Some(IvaCode::INCREASED_27)
    } else {
        None
    };
    match code {
        Some(code) => IvaCodeLookup {
            code,
            fallback: false,
        },
        None => IvaCodeLookup {
            code: IvaCode::GENERAL_21,
            fallback: true,
        },
    }
}

/// A subtotal and the rate it is taxed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxableAmount {
    pub subtotal: Decimal,
    pub rate: Decimal,
}

impl TaxableAmount {
    pub fn new(subtotal: Decimal, rate: Decimal) -> Self {
        Self { subtotal, rate }
    }
}

impl From<&LineItem> for TaxableAmount {
    fn from(line: &LineItem) -> Self {
        Self {
            subtotal: line.subtotal,
            rate: line.iva_rate,
        }
    }
}

/// Per-rate accumulation of base and tax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvaBucket {
    pub rate: Decimal,
    pub base: Decimal,
    pub tax: Decimal,
    pub code: IvaCode,
}

/// A rate that had no code of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmappedRate {
    pub rate: Decimal,
    pub reported_as: IvaCode,
}

/// One `AlicIva` entry of a CAE request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alicuota {
    pub code: IvaCode,
    pub base: Decimal,
    pub amount: Decimal,
}

/// Invoice-level IVA breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvaSummary {
    /// Buckets ordered by ascending rate.
    pub buckets: Vec<IvaBucket>,
    /// Sum of bucket bases.
    pub net: Decimal,
    /// Sum of bucket taxes.
    pub vat: Decimal,
    /// `net + vat`.
    pub total: Decimal,
    /// Rates reported under the fallback code.
    pub warnings: Vec<UnmappedRate>,
}

impl IvaSummary {
    /// `AlicIva` entries to send: buckets with tax > 0, none at all when
    /// the invoice carries no IVA.
    pub fn alicuotas(&self) -> Vec<Alicuota> {
        if self.vat.is_zero() {
            return Vec::new();
        }
        self.buckets
            .iter()
            .filter(|b| b.tax > Decimal::ZERO)
            .map(|b| Alicuota {
                code: b.code,
                base: b.base,
                amount: b.tax,
            })
            .collect()
    }

    pub fn bucket(&self, rate: Decimal) -> Option<&IvaBucket> {
        self.buckets.iter().find(|b| b.rate == rate)
    }

    pub fn has_unmapped_rates(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Group taxable amounts by rate and compute invoice totals.
///
/// Tax is rounded per line, then bases and taxes are rounded again per
/// bucket. Bucket tax may therefore differ by a cent from taxing the bucket
/// base directly.
///
/// # Errors
///
/// `ArcaError::NoLineItems` when `items` is empty.
pub fn summarize<I, T>(items: I) -> Result<IvaSummary, ArcaError>
where
    I: IntoIterator<Item = T>,
    T: Into<TaxableAmount>,
{
    let mut groups: BTreeMap<Decimal, (Decimal, Decimal)> = BTreeMap::new();
    let mut seen = 0usize;

    for item in items {
        let item = item.into();
        seen += 1;
        let tax = round_half_up(item.subtotal * item.rate / dec!(100), 2);
        let entry = groups
            .entry(item.rate)
            .or_insert((Decimal::ZERO, Decimal::ZERO));
        entry.0 += item.subtotal;
        entry.1 += tax;
    }

    if seen == 0 {
        return Err(ArcaError::NoLineItems);
    }

    let mut buckets = Vec::with_capacity(groups.len());
    let mut warnings = Vec::new();

    for (rate, (base, tax)) in groups {
        let rate = rate.normalize();
        let lookup = iva_code(rate);
        if lookup.fallback {
            warn!(
                rate = %rate,
                reported_as = lookup.code.0,
                "unmapped IVA rate, reporting under the 21% code"
            );
            warnings.push(UnmappedRate {
                rate,
                reported_as: lookup.code,
            });
        }
        buckets.push(IvaBucket {
            rate,
            base: round_half_up(base, 2),
            tax: round_half_up(tax, 2),
            code: lookup.code,
        });
    }

    let net = round_half_up(buckets.iter().map(|b| b.base).sum(), 2);
    let vat = round_half_up(buckets.iter().map(|b| b.tax).sum(), 2);
    let total = round_half_up(net + vat, 2);

    Ok(IvaSummary {
        buckets,
        net,
        vat,
        total,
        warnings,
    })
}

/// Summarize the lines of a sale.
pub fn summarize_lines(lines: &[LineItem]) -> Result<IvaSummary, ArcaError> {
    summarize(lines.iter())
}

/// Round a Decimal to `dp` decimal places using half-up (commercial rounding).
pub(crate) fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amounts(items: &[(Decimal, Decimal)]) -> Vec<TaxableAmount> {
        items
            .iter()
            .map(|(s, r)| TaxableAmount::new(*s, *r))
            .collect()
    }

    #[test]
    fn code_table() {
        assert_eq!(iva_code(dec!(0)).code, IvaCode(3));
        assert_eq!(iva_code(dec!(10.5)).code, IvaCode(4));
        assert_eq!(iva_code(dec!(21)).code, IvaCode(5));
        assert_eq!(iva_code(dec!(27)).code, IvaCode(6));
        assert_eq!(iva_code(dec!(2.5)).code, IvaCode(9));
        assert!(!iva_code(dec!(21.00)).fallback);
    }

    #[test]
    fn unknown_rate_falls_back() {
        let lookup = iva_code(dec!(19));
        assert_eq!(lookup.code, IvaCode::GENERAL_21);
        assert!(lookup.fallback);
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = summarize(Vec::<TaxableAmount>::new()).unwrap_err();
        assert!(matches!(err, ArcaError::NoLineItems));
    }

    #[test]
    fn same_rate_with_different_scale_shares_a_bucket() {
        let s = summarize(amounts(&[(dec!(100), dec!(21)), (dec!(50), dec!(21.00))])).unwrap();
        assert_eq!(s.buckets.len(), 1);
        assert_eq!(s.buckets[0].base, dec!(150));
        assert_eq!(s.buckets[0].tax, dec!(31.50));
    }

    #[test]
    fn per_line_rounding_is_kept() {
        // 0.0147 rounds to 0.01 per line; taxing the 0.21 base would give 0.04
        let s = summarize(amounts(&[
            (dec!(0.07), dec!(21)),
            (dec!(0.07), dec!(21)),
            (dec!(0.07), dec!(21)),
        ]))
        .unwrap();
        assert_eq!(s.vat, dec!(0.03));
        assert_eq!(s.net, dec!(0.21));
        assert_eq!(s.total, dec!(0.24));
    }

    #[test]
    fn zero_rate_bucket_is_not_sent() {
        let s = summarize(amounts(&[(dec!(100), dec!(0)), (dec!(200), dec!(21))])).unwrap();
        assert_eq!(s.buckets.len(), 2);
        let alic = s.alicuotas();
        assert_eq!(alic.len(), 1);
        assert_eq!(alic[0].code, IvaCode::GENERAL_21);
        assert_eq!(alic[0].base, dec!(200));
        assert_eq!(alic[0].amount, dec!(42));
    }

    #[test]
    fn no_vat_means_no_alicuotas() {
        let s = summarize(amounts(&[(dec!(100), dec!(0))])).unwrap();
        assert!(s.vat.is_zero());
        assert!(s.alicuotas().is_empty());
        assert_eq!(s.buckets[0].code, IvaCode::ZERO);
    }

    #[test]
    fn unmapped_rate_is_recorded() {
        let s = summarize(amounts(&[(dec!(100), dec!(19))])).unwrap();
        assert!(s.has_unmapped_rates());
        assert_eq!(s.warnings[0].rate, dec!(19));
        assert_eq!(s.buckets[0].code, IvaCode::GENERAL_21);
        assert_eq!(s.vat, dec!(19));
    }

    #[test]
    fn buckets_are_ordered_by_rate() {
        let s = summarize(amounts(&[
            (dec!(10), dec!(27)),
            (dec!(10), dec!(2.5)),
            (dec!(10), dec!(21)),
        ]))
        .unwrap();
        let rates: Vec<_> = s.buckets.iter().map(|b| b.rate).collect();
        assert_eq!(rates, vec![dec!(2.5), dec!(21), dec!(27)]);
    }
}
