//! `MonId` currency code validation.
//!
//! WSFEv1 does not use ISO 4217; it has its own table (`FEParamGetTiposMonedas`).
//! Pesos are `PES`; most foreign currencies use a three-digit code.

/// Local currency.
pub const PESOS: &str = "PES";

/// US dollar.
pub const DOLLARS: &str = "DOL";

/// Check whether `code` is a known WSFEv1 currency code.
pub fn is_known_currency_code(code: &str) -> bool {
    CURRENCY_CODES.binary_search(&code).is_ok()
}

/// Sorted for binary search.
static CURRENCY_CODES: &[&str] = &[
    "002", // Dólar Libre EEUU
    "009", // Franco Suizo
    "010", // Peso Mexicano
    "011", // Peso Uruguayo
    "012", // Real
    "014", // Corona Danesa
    "018", // Dólar Canadiense
    "019", // Yen
    "021", // Libra Esterlina
    "029", // Guaraní
    "031", // Peso Boliviano
    "032", // Peso Colombiano
    "033", // Peso Chileno
    "034", // Rand Sudafricano
    "035", // Nuevo Sol Peruano
    "060", // Euro
    "DOL", // Dólar Estadounidense
    "PES", // Pesos Argentinos
];
