//! RG 4291 invoice QR code payload.
//!
//! The code printed on an authorized voucher encodes a URL whose `p`
//! parameter is the base64 of a small JSON document identifying the voucher
//! and its CAE.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{ArcaError, InvoiceRecord};

pub const QR_BASE_URL: &str = "https://www.afip.gob.ar/fe/qr/?p=";

/// Payload format version.
pub const QR_VERSION: u8 = 1;

/// JSON document embedded in the QR code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub ver: u8,
    pub fecha: NaiveDate,
    pub cuit: u64,
    pub pto_vta: u32,
    pub tipo_cmp: u16,
    pub nro_cmp: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub importe: Decimal,
    pub moneda: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub ctz: Decimal,
    pub tipo_doc_rec: u16,
    pub nro_doc_rec: u64,
    /// `E` for CAE.
    pub tipo_cod_aut: String,
    pub cod_aut: u64,
}

impl QrPayload {
    /// Build the payload for an authorized record.
    ///
    /// # Errors
    ///
    /// `Validation` when the record is not authorized or its CAE is not
    /// numeric.
    pub fn from_record(record: &InvoiceRecord, issuer_cuit: u64) -> Result<Self, ArcaError> {
        if !record.is_authorized() {
            return Err(ArcaError::Validation(format!(
                "invoice {} is {}, QR requires an authorized invoice",
                record.id, record.status
            )));
        }
        let cae = record
            .cae
            .as_deref()
            .ok_or_else(|| ArcaError::Validation(format!("invoice {} has no CAE", record.id)))?;
        let cod_aut = cae
            .trim()
            .parse()
            .map_err(|_| ArcaError::Validation(format!("CAE is not numeric: {cae:?}")))?;
        let document = record.buyer_document();

        Ok(Self {
            ver: QR_VERSION,
            fecha: record.issue_date,
            cuit: issuer_cuit,
            pto_vta: record.point_of_sale,
            tipo_cmp: record.voucher_type.code(),
            nro_cmp: record.authority_number.unwrap_or(record.number.sequence),
            importe: record.total(),
            moneda: record.currency.clone(),
            ctz: record.exchange_rate,
            tipo_doc_rec: document.doc_type.code(),
            nro_doc_rec: document.number,
            tipo_cod_aut: "E".to_string(),
            cod_aut,
        })
    }

    pub fn to_json(&self) -> Result<String, ArcaError> {
        serde_json::to_string(self).map_err(|e| ArcaError::Validation(e.to_string()))
    }

    /// Full URL to encode in the QR image.
    pub fn url(&self) -> Result<String, ArcaError> {
        Ok(format!("{QR_BASE_URL}{}", STANDARD.encode(self.to_json()?)))
    }
}

/// QR URL for an authorized record.
pub fn qr_url(record: &InvoiceRecord, issuer_cuit: u64) -> Result<String, ArcaError> {
    QrPayload::from_record(record, issuer_cuit)?.url()
}
