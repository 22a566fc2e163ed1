use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::codes::{Concept, VoucherType};
use super::currencies::PESOS;
use super::error::ArcaError;
use super::iva::round_half_up;
use super::types::*;
use super::validation;

/// Builder for a validated draft sale.
///
/// ```
/// use arca_fe::core::*;
/// use rust_decimal_macros::dec;
///
/// let draft = DraftSaleBuilder::new(VoucherType::FacturaB, 3)
///     .add_line(LineItemBuilder::new("SKU-1", dec!(2), dec!(50)).iva(dec!(21)).build())
///     .build()
///     .unwrap();
///
/// assert_eq!(draft.lines[0].subtotal, dec!(100.00));
/// assert_eq!(draft.currency, "PES");
/// ```
pub struct DraftSaleBuilder {
    voucher_type: VoucherType,
    point_of_sale: u32,
    concept: Concept,
    buyer: Option<Buyer>,
    currency: String,
    exchange_rate: Decimal,
    lines: Vec<LineItem>,
}

impl DraftSaleBuilder {
    pub fn new(voucher_type: VoucherType, point_of_sale: u32) -> Self {
        Self {
            voucher_type,
            point_of_sale,
            concept: Concept::Products,
            buyer: None,
            currency: PESOS.to_string(),
            exchange_rate: dec!(1),
            lines: Vec::new(),
        }
    }

    pub fn concept(mut self, concept: Concept) -> Self {
        self.concept = concept;
        self
    }

    pub fn buyer(mut self, buyer: Buyer) -> Self {
        self.buyer = Some(buyer);
        self
    }

    pub fn currency(mut self, code: impl Into<String>, exchange_rate: Decimal) -> Self {
        self.currency = code.into();
        self.exchange_rate = exchange_rate;
        self
    }

    pub fn add_line(mut self, line: LineItem) -> Self {
        self.lines.push(line);
        self
    }

    /// Build the draft and run validation.
    /// Returns all validation errors (not just the first).
    pub fn build(self) -> Result<DraftSale, ArcaError> {
        if self.lines.is_empty() {
            return Err(ArcaError::NoLineItems);
        }

        let draft = self.build_unchecked();

        let errors = validation::validate_draft(&draft);
        if !errors.is_empty() {
            let msg = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ArcaError::Validation(msg));
        }

        Ok(draft)
    }

    /// Build without validation.
    pub fn build_unchecked(self) -> DraftSale {
        DraftSale {
            voucher_type: self.voucher_type,
            point_of_sale: self.point_of_sale,
            concept: self.concept,
            buyer: self.buyer,
            currency: self.currency,
            exchange_rate: self.exchange_rate,
            lines: self.lines,
        }
    }
}

/// Builder for a line item. The subtotal defaults to quantity x unit price
/// rounded to cents; the rate defaults to 21%.
pub struct LineItemBuilder {
    product_ref: String,
    description: Option<String>,
    quantity: Decimal,
    unit_price: Decimal,
    subtotal: Option<Decimal>,
    iva_rate: Decimal,
}

impl LineItemBuilder {
    pub fn new(product_ref: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            product_ref: product_ref.into(),
            description: None,
            quantity,
            unit_price,
            subtotal: None,
            iva_rate: dec!(21),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn iva(mut self, rate: Decimal) -> Self {
        self.iva_rate = rate;
        self
    }

    /// Use a subtotal computed elsewhere (e.g. the till's own rounding).
    pub fn subtotal(mut self, subtotal: Decimal) -> Self {
        self.subtotal = Some(subtotal);
        self
    }

    pub fn build(self) -> LineItem {
        let subtotal = self
            .subtotal
            .unwrap_or_else(|| round_half_up(self.quantity * self.unit_price, 2));
        LineItem {
            product_ref: self.product_ref,
            description: self.description,
            quantity: self.quantity,
            unit_price: self.unit_price,
            subtotal,
            iva_rate: self.iva_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codes::{DocumentType, IvaCondition};

    #[test]
    fn empty_draft_is_rejected() {
        let err = DraftSaleBuilder::new(VoucherType::FacturaB, 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, ArcaError::NoLineItems));
    }

    #[test]
    fn subtotal_is_rounded() {
        let line = LineItemBuilder::new("X", dec!(3), dec!(0.335)).build();
        assert_eq!(line.subtotal, dec!(1.01));
    }

    #[test]
    fn class_a_needs_cuit_buyer() {
        let err = DraftSaleBuilder::new(VoucherType::FacturaA, 1)
            .add_line(LineItemBuilder::new("X", dec!(1), dec!(10)).build())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("class A"));

        let ok = DraftSaleBuilder::new(VoucherType::FacturaA, 1)
            .buyer(Buyer {
                name: Some("Distribuidora SA".into()),
                document: BuyerDocument {
                    doc_type: DocumentType::Cuit,
                    number: 20123456786,
                },
                iva_condition: IvaCondition::ResponsableInscripto,
            })
            .add_line(LineItemBuilder::new("X", dec!(1), dec!(10)).build())
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn all_errors_are_reported() {
        let err = DraftSaleBuilder::new(VoucherType::FacturaB, 1)
            .currency("EUR", dec!(1))
            .add_line(LineItemBuilder::new("X", dec!(0), dec!(-1)).build())
            .build()
            .unwrap_err()
            .to_string();
        assert!(err.contains("currency"));
        assert!(err.contains("lines[0].quantity"));
        assert!(err.contains("lines[0].unit_price"));
    }
}
