use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::codes::{Concept, DocumentType, IvaCondition, VoucherType};
use super::error::FailureKind;
use super::iva::IvaSummary;
use super::numbering::InvoiceNumber;

/// One priced line of a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product code or SKU.
    pub product_ref: String,
    /// Free-text description printed on the receipt.
    pub description: Option<String>,
    /// Quantity sold.
    pub quantity: Decimal,
    /// Net unit price (IVA excluded).
    pub unit_price: Decimal,
    /// Net line subtotal (quantity * unit price, rounded to cents).
    pub subtotal: Decimal,
    /// IVA rate percentage (e.g. 21, 10.5).
    pub iva_rate: Decimal,
}

/// Buyer identification sent as `DocTipo` / `DocNro`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerDocument {
    pub doc_type: DocumentType,
    pub number: u64,
}

impl BuyerDocument {
    /// Unidentified buyer: type 99, number 0.
    pub fn consumidor_final() -> Self {
        Self {
            doc_type: DocumentType::ConsumidorFinal,
            number: 0,
        }
    }
}

impl Default for BuyerDocument {
    fn default() -> Self {
        Self::consumidor_final()
    }
}

/// Customer attached to a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buyer {
    pub name: Option<String>,
    pub document: BuyerDocument,
    pub iva_condition: IvaCondition,
}

impl Buyer {
    pub fn consumidor_final() -> Self {
        Self {
            name: None,
            document: BuyerDocument::consumidor_final(),
            iva_condition: IvaCondition::ConsumidorFinal,
        }
    }
}

/// A sale ready to be invoiced. Transient, one per checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSale {
    pub voucher_type: VoucherType,
    pub point_of_sale: u32,
    pub concept: Concept,
    pub buyer: Option<Buyer>,
    /// WSFEv1 `MonId` currency code.
    pub currency: String,
    /// `MonCotiz` exchange rate; 1 for pesos.
    pub exchange_rate: Decimal,
    pub lines: Vec<LineItem>,
}

impl DraftSale {
    /// Document sent to the authority; consumidor final when no buyer is set.
    pub fn buyer_document(&self) -> BuyerDocument {
        self.buyer
            .as_ref()
            .map(|b| b.document)
            .unwrap_or_default()
    }
}

/// Lifecycle state of an invoice record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Provisional number reserved, authorization not finished.
    Pending,
    /// CAE granted.
    Authorized,
    /// Authorization failed; eligible for an operator retry.
    Error,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Error => "error",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "authorized" => Some(Self::Authorized),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the last authorization attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationFailure {
    pub kind: FailureKind,
    pub detail: String,
}

/// A persisted invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// Storage identifier.
    pub id: u64,
    /// Visible invoice number: the provisional one until superseded.
    pub number: InvoiceNumber,
    /// Number reserved locally before any remote call.
    pub provisional_number: InvoiceNumber,
    pub voucher_type: VoucherType,
    pub point_of_sale: u32,
    pub concept: Concept,
    pub buyer: Option<Buyer>,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub lines: Vec<LineItem>,
    pub iva: IvaSummary,
    pub issue_date: NaiveDate,
    pub status: InvoiceStatus,
    /// Voucher number confirmed by the authority.
    pub authority_number: Option<u64>,
    /// Código de Autorización Electrónico.
    pub cae: Option<String>,
    pub cae_expiry: Option<NaiveDate>,
    pub failure: Option<AuthorizationFailure>,
    /// Number of authorization attempts made so far.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceRecord {
    pub fn is_authorized(&self) -> bool {
        self.status == InvoiceStatus::Authorized
    }

    pub fn total(&self) -> Decimal {
        self.iva.total
    }

    pub fn buyer_document(&self) -> BuyerDocument {
        self.buyer
            .as_ref()
            .map(|b| b.document)
            .unwrap_or_default()
    }

    /// True when the visible number differs from the authority's ledger.
    pub fn number_mismatch(&self) -> bool {
        match self.authority_number {
            Some(n) => self.is_authorized() && self.number.sequence != n,
            None => false,
        }
    }
}

/// Everything a store needs to create a pending record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoice {
    pub voucher_type: VoucherType,
    pub point_of_sale: u32,
    pub concept: Concept,
    pub buyer: Option<Buyer>,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub lines: Vec<LineItem>,
    pub iva: IvaSummary,
    pub issue_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl NewInvoice {
    /// Turn a reserved number and storage id into a pending record.
    pub fn into_record(self, id: u64, number: InvoiceNumber) -> InvoiceRecord {
        InvoiceRecord {
            id,
            number,
            provisional_number: number,
            voucher_type: self.voucher_type,
            point_of_sale: self.point_of_sale,
            concept: self.concept,
            buyer: self.buyer,
            currency: self.currency,
            exchange_rate: self.exchange_rate,
            lines: self.lines,
            iva: self.iva,
            issue_date: self.issue_date,
            status: InvoiceStatus::Pending,
            authority_number: None,
            cae: None,
            cae_expiry: None,
            failure: None,
            attempts: 0,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}
