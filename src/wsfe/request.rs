use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::core::{
    Alicuota, ArcaError, BuyerDocument, Concept, InvoiceRecord, IvaCondition, IvaSummary,
    VoucherClass, VoucherType,
};
use crate::soap::{XmlWriter, envelope, format_amount, format_rate};
use crate::wsaa::AccessTicket;

pub const WSFE_NS: &str = "http://ar.gov.afip.dif.FEV1/";

const PREFIX: &str = "ar";

/// `Auth` block sent with every authenticated WSFEv1 operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    pub token: String,
    pub sign: String,
    pub cuit: u64,
}

impl Auth {
    pub fn from_ticket(ticket: &AccessTicket, cuit: u64) -> Self {
        Self {
            token: ticket.token.clone(),
            sign: ticket.sign.clone(),
            cuit,
        }
    }

    fn write(&self, w: &mut XmlWriter) -> Result<(), ArcaError> {
        w.start_element("ar:Auth")?;
        w.text_element("ar:Token", &self.token)?;
        w.text_element("ar:Sign", &self.sign)?;
        w.number_element("ar:Cuit", self.cuit)?;
        w.end_element("ar:Auth")?;
        Ok(())
    }
}

/// Amounts as reported to the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedAmounts {
    pub net: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
    pub alicuotas: Vec<Alicuota>,
}

/// One-voucher `FECAESolicitar` request.
#[derive(Debug, Clone, PartialEq)]
pub struct CaeRequest {
    pub voucher_type: VoucherType,
    pub point_of_sale: u32,
    pub concept: Concept,
    pub document: BuyerDocument,
    pub receiver_condition: IvaCondition,
    /// `CbteDesde` and `CbteHasta`.
    pub voucher_number: u64,
    pub issue_date: NaiveDate,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub iva: IvaSummary,
}

impl CaeRequest {
    pub fn from_record(record: &InvoiceRecord, voucher_number: u64) -> Self {
        Self {
            voucher_type: record.voucher_type,
            point_of_sale: record.point_of_sale,
            concept: record.concept,
            document: record.buyer_document(),
            receiver_condition: record
                .buyer
                .as_ref()
                .map(|b| b.iva_condition)
                .unwrap_or_default(),
            voucher_number,
            issue_date: record.issue_date,
            currency: record.currency.clone(),
            exchange_rate: record.exchange_rate,
            iva: record.iva.clone(),
        }
    }

    /// Class C issuers are not VAT-registered: everything is reported as net
    /// and no `Iva` section is sent.
    pub fn amounts(&self) -> ReportedAmounts {
        match self.voucher_type.class() {
            VoucherClass::C => ReportedAmounts {
                net: self.iva.total,
                vat: Decimal::ZERO,
                total: self.iva.total,
                alicuotas: Vec::new(),
            },
            VoucherClass::A | VoucherClass::B => ReportedAmounts {
                net: self.iva.net,
                vat: self.iva.vat,
                total: self.iva.total,
                alicuotas: self.iva.alicuotas(),
            },
        }
    }

    pub fn to_envelope(&self, auth: &Auth) -> Result<String, ArcaError> {
        let amounts = self.amounts();
        let date = yyyymmdd(self.issue_date);

        envelope(PREFIX, WSFE_NS, |w| {
            w.start_element("ar:FECAESolicitar")?;
            auth.write(w)?;
            w.start_element("ar:FeCAEReq")?;

            w.start_element("ar:FeCabReq")?;
            w.number_element("ar:CantReg", 1)?;
            w.number_element("ar:PtoVta", self.point_of_sale)?;
            w.number_element("ar:CbteTipo", self.voucher_type.code())?;
            w.end_element("ar:FeCabReq")?;

            w.start_element("ar:FeDetReq")?;
            w.start_element("ar:FECAEDetRequest")?;
            w.number_element("ar:Concepto", self.concept.code())?;
            w.number_element("ar:DocTipo", self.document.doc_type.code())?;
            w.number_element("ar:DocNro", self.document.number)?;
            w.number_element("ar:CbteDesde", self.voucher_number)?;
            w.number_element("ar:CbteHasta", self.voucher_number)?;
            w.text_element("ar:CbteFch", &date)?;
            w.amount_element("ar:ImpTotal", amounts.total)?;
            w.amount_element("ar:ImpTotConc", Decimal::ZERO)?;
            w.amount_element("ar:ImpNeto", amounts.net)?;
            w.amount_element("ar:ImpOpEx", Decimal::ZERO)?;
            w.amount_element("ar:ImpTrib", Decimal::ZERO)?;
            w.amount_element("ar:ImpIVA", amounts.vat)?;
            if self.concept.includes_services() {
                w.text_element("ar:FchServDesde", &date)?;
                w.text_element("ar:FchServHasta", &date)?;
                w.text_element("ar:FchVtoPago", &date)?;
            }
            w.text_element("ar:MonId", &self.currency)?;
            w.text_element("ar:MonCotiz", &format_rate(self.exchange_rate))?;
            w.number_element("ar:CondicionIVAReceptorId", self.receiver_condition.code())?;
            if !amounts.alicuotas.is_empty() {
                w.start_element("ar:Iva")?;
                for alic in &amounts.alicuotas {
                    w.start_element("ar:AlicIva")?;
                    w.number_element("ar:Id", alic.code.0)?;
                    w.text_element("ar:BaseImp", &format_amount(alic.base))?;
                    w.text_element("ar:Importe", &format_amount(alic.amount))?;
                    w.end_element("ar:AlicIva")?;
                }
                w.end_element("ar:Iva")?;
            }
            w.end_element("ar:FECAEDetRequest")?;
            w.end_element("ar:FeDetReq")?;

            w.end_element("ar:FeCAEReq")?;
            w.end_element("ar:FECAESolicitar")?;
            Ok(())
        })
    }
}

/// `FEDummy` health probe; takes no credentials.
pub fn dummy_envelope() -> Result<String, ArcaError> {
    envelope(PREFIX, WSFE_NS, |w| {
        w.start_element("ar:FEDummy")?;
        w.end_element("ar:FEDummy")?;
        Ok(())
    })
}

/// `FECompUltimoAutorizado` for one point of sale and voucher type.
pub fn last_authorized_envelope(
    auth: &Auth,
    point_of_sale: u32,
    voucher_type: VoucherType,
) -> Result<String, ArcaError> {
    envelope(PREFIX, WSFE_NS, |w| {
        w.start_element("ar:FECompUltimoAutorizado")?;
        auth.write(w)?;
        w.number_element("ar:PtoVta", point_of_sale)?;
        w.number_element("ar:CbteTipo", voucher_type.code())?;
        w.end_element("ar:FECompUltimoAutorizado")?;
        Ok(())
    })
}

/// SOAPAction header value for an operation.
pub fn soap_action(operation: &str) -> String {
    format!("{WSFE_NS}{operation}")
}

fn yyyymmdd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}
