use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::codes::{DocumentType, VoucherClass};
use super::error::ValidationError;
use super::types::*;

const CUIT_WEIGHTS: [u32; 10] = [5, 4, 3, 2, 7, 6, 5, 4, 3, 2];

/// Check an 11-digit CUIT/CUIL, including its mod-11 check digit.
///
/// Hyphens and spaces are ignored, so "20-12345678-6" is accepted.
pub fn validate_cuit(cuit: &str) -> bool {
    let digits: Vec<u32> = cuit
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .map(|c| c.to_digit(10))
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default();

    if digits.len() != 11 {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .zip(CUIT_WEIGHTS.iter())
        .map(|(d, w)| d * w)
        .sum();
    let check = match 11 - (sum % 11) {
        11 => 0,
        10 => return false,
        n => n,
    };
    digits[10] == check
}

/// Map a stored customer document onto the authority's document type.
///
/// A CUIT needs exactly 11 digits and a DNI at least 7; anything else,
/// including missing or non-numeric documents, is sent as an unidentified
/// buyer (type 99, number 0).
pub fn classify_buyer_document(kind: &str, number: &str) -> BuyerDocument {
    let number = number.trim();
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return BuyerDocument::consumidor_final();
    }
    let Ok(parsed) = number.parse::<u64>() else {
        return BuyerDocument::consumidor_final();
    };

    match kind.trim().to_ascii_uppercase().as_str() {
        "CUIT" if number.len() == 11 => BuyerDocument {
            doc_type: DocumentType::Cuit,
            number: parsed,
        },
        "DNI" if number.len() >= 7 => BuyerDocument {
            doc_type: DocumentType::Dni,
            number: parsed,
        },
        _ => BuyerDocument::consumidor_final(),
    }
}

/// Validate a draft sale before it is numbered.
/// Returns all validation errors found (not just the first).
pub fn validate_draft(draft: &DraftSale) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if draft.lines.is_empty() {
        errors.push(ValidationError::new(
            "lines",
            "sale must have at least one line item",
        ));
    }

    for (i, line) in draft.lines.iter().enumerate() {
        validate_line(line, i, &mut errors);
    }

    if draft.point_of_sale == 0 || draft.point_of_sale > super::numbering::MAX_POINT_OF_SALE {
        errors.push(ValidationError::new(
            "point_of_sale",
            format!(
                "point of sale must be between 1 and {}",
                super::numbering::MAX_POINT_OF_SALE
            ),
        ));
    }

    if !super::currencies::is_known_currency_code(&draft.currency) {
        errors.push(ValidationError::new(
            "currency",
            format!("currency code '{}' is not a known MonId code", draft.currency),
        ));
    }

    if draft.exchange_rate <= Decimal::ZERO {
        errors.push(ValidationError::new(
            "exchange_rate",
            "exchange rate must be positive",
        ));
    }

    let document = draft.buyer_document();
    if matches!(document.doc_type, DocumentType::Cuit | DocumentType::Cuil)
        && !validate_cuit(&format!("{:011}", document.number))
    {
        errors.push(ValidationError::new(
            "buyer.document",
            format!("{} has an invalid check digit", document.number),
        ));
    }
    if draft.voucher_type.class() == VoucherClass::A && document.doc_type != DocumentType::Cuit {
        errors.push(ValidationError::new(
            "buyer",
            "class A vouchers require a buyer identified by CUIT",
        ));
    }

    errors
}

fn validate_line(line: &LineItem, index: usize, errors: &mut Vec<ValidationError>) {
    let prefix = format!("lines[{index}]");

    if line.product_ref.trim().is_empty() {
        errors.push(ValidationError::new(
            format!("{prefix}.product_ref"),
            "product reference must not be empty",
        ));
    }

    if line.quantity <= Decimal::ZERO {
        errors.push(ValidationError::new(
            format!("{prefix}.quantity"),
            "quantity must be positive",
        ));
    }

    if line.unit_price.is_sign_negative() {
        errors.push(ValidationError::new(
            format!("{prefix}.unit_price"),
            "unit price must not be negative",
        ));
    }

    if line.iva_rate.is_sign_negative() {
        errors.push(ValidationError::new(
            format!("{prefix}.iva_rate"),
            "IVA rate must not be negative",
        ));
    }

    let expected = line.quantity * line.unit_price;
    if (line.subtotal - expected).abs() > dec!(0.01) {
        errors.push(ValidationError::new(
            format!("{prefix}.subtotal"),
            format!(
                "subtotal {} does not match quantity {} x unit price {}",
                line.subtotal, line.quantity, line.unit_price
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuit_check_digit() {
        assert!(validate_cuit("20123456786"));
        assert!(validate_cuit("20-12345678-6"));
        assert!(validate_cuit("33693450239"));
        assert!(!validate_cuit("20123456787"));
        assert!(!validate_cuit("2012345678"));
        assert!(!validate_cuit("2012345678a"));
    }

    #[test]
    fn classify_documents() {
        let cuit = classify_buyer_document("CUIT", "20123456786");
        assert_eq!(cuit.doc_type, DocumentType::Cuit);
        assert_eq!(cuit.number, 20123456786);

        let dni = classify_buyer_document("DNI", "1234567");
        assert_eq!(dni.doc_type, DocumentType::Dni);

        assert_eq!(
            classify_buyer_document("DNI", "123456"),
            BuyerDocument::consumidor_final()
        );
        assert_eq!(
            classify_buyer_document("CUIT", "2012345678"),
            BuyerDocument::consumidor_final()
        );
        assert_eq!(
            classify_buyer_document("PASAPORTE", "12345678"),
            BuyerDocument::consumidor_final()
        );
        assert_eq!(
            classify_buyer_document("DNI", ""),
            BuyerDocument::consumidor_final()
        );
    }
}
