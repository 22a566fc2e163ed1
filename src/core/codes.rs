//! Authority code tables: voucher types, buyer document types, concepts and
//! receiver IVA conditions, as published by the WSFEv1 parameter methods.

use serde::{Deserialize, Serialize};

/// `CbteTipo`: voucher (comprobante) type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoucherType {
    /// 1: Factura A.
    FacturaA,
    /// 2: Nota de Débito A.
    NotaDebitoA,
    /// 3: Nota de Crédito A.
    NotaCreditoA,
    /// 6: Factura B.
    FacturaB,
    /// 7: Nota de Débito B.
    NotaDebitoB,
    /// 8: Nota de Crédito B.
    NotaCreditoB,
    /// 11: Factura C.
    FacturaC,
    /// 12: Nota de Débito C.
    NotaDebitoC,
    /// 13: Nota de Crédito C.
    NotaCreditoC,
}

/// Letter class of a voucher; decides how IVA is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoucherClass {
    A,
    B,
    C,
}

impl VoucherType {
    pub fn code(&self) -> u16 {
        match self {
            Self::FacturaA => 1,
            Self::NotaDebitoA => 2,
            Self::NotaCreditoA => 3,
            Self::FacturaB => 6,
            Self::NotaDebitoB => 7,
            Self::NotaCreditoB => 8,
            Self::FacturaC => 11,
            Self::NotaDebitoC => 12,
            Self::NotaCreditoC => 13,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::FacturaA),
            2 => Some(Self::NotaDebitoA),
            3 => Some(Self::NotaCreditoA),
            6 => Some(Self::FacturaB),
            7 => Some(Self::NotaDebitoB),
            8 => Some(Self::NotaCreditoB),
            11 => Some(Self::FacturaC),
            12 => Some(Self::NotaDebitoC),
            13 => Some(Self::NotaCreditoC),
            _ => None,
        }
    }

    pub fn class(&self) -> VoucherClass {
        match self {
            Self::FacturaA | Self::NotaDebitoA | Self::NotaCreditoA => VoucherClass::A,
            Self::FacturaB | Self::NotaDebitoB | Self::NotaCreditoB => VoucherClass::B,
            Self::FacturaC | Self::NotaDebitoC | Self::NotaCreditoC => VoucherClass::C,
        }
    }
}

/// `DocTipo`: buyer identification document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    /// 80: CUIT.
    Cuit,
    /// 86: CUIL.
    Cuil,
    /// 96: DNI.
    Dni,
    /// 99: Unidentified buyer (consumidor final).
    ConsumidorFinal,
}

impl DocumentType {
    pub fn code(&self) -> u16 {
        match self {
            Self::Cuit => 80,
            Self::Cuil => 86,
            Self::Dni => 96,
            Self::ConsumidorFinal => 99,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            80 => Some(Self::Cuit),
            86 => Some(Self::Cuil),
            96 => Some(Self::Dni),
            99 => Some(Self::ConsumidorFinal),
            _ => None,
        }
    }
}

/// `Concepto`: what the voucher bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Concept {
    /// 1: Products.
    #[default]
    Products,
    /// 2: Services.
    Services,
    /// 3: Products and services.
    ProductsAndServices,
}

impl Concept {
    pub fn code(&self) -> u16 {
        match self {
            Self::Products => 1,
            Self::Services => 2,
            Self::ProductsAndServices => 3,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::Products),
            2 => Some(Self::Services),
            3 => Some(Self::ProductsAndServices),
            _ => None,
        }
    }

    /// Services require service period and payment due dates.
    pub fn includes_services(&self) -> bool {
        !matches!(self, Self::Products)
    }
}

/// `CondicionIVAReceptorId`: the receiver's IVA registration status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IvaCondition {
    /// 1: IVA Responsable Inscripto.
    ResponsableInscripto,
    /// 4: IVA Sujeto Exento.
    Exento,
    /// 5: Consumidor Final.
    #[default]
    ConsumidorFinal,
    /// 6: Responsable Monotributo.
    Monotributo,
    /// 7: Sujeto No Categorizado.
    NoCategorizado,
    /// 8: Proveedor del Exterior.
    ProveedorExterior,
    /// 9: Cliente del Exterior.
    ClienteExterior,
    /// 10: IVA Liberado, Ley 19.640.
    Liberado,
    /// 13: Monotributista Social.
    MonotributoSocial,
    /// 15: IVA No Alcanzado.
    NoAlcanzado,
    /// 16: Monotributo Trabajador Independiente Promovido.
    MonotributoPromovido,
}

impl IvaCondition {
    pub fn code(&self) -> u16 {
        match self {
            Self::ResponsableInscripto => 1,
            Self::Exento => 4,
            Self::ConsumidorFinal => 5,
            Self::Monotributo => 6,
            Self::NoCategorizado => 7,
            Self::ProveedorExterior => 8,
            Self::ClienteExterior => 9,
            Self::Liberado => 10,
            Self::MonotributoSocial => 13,
            Self::NoAlcanzado => 15,
            Self::MonotributoPromovido => 16,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::ResponsableInscripto),
            4 => Some(Self::Exento),
            5 => Some(Self::ConsumidorFinal),
            6 => Some(Self::Monotributo),
            7 => Some(Self::NoCategorizado),
            8 => Some(Self::ProveedorExterior),
            9 => Some(Self::ClienteExterior),
            10 => Some(Self::Liberado),
            13 => Some(Self::MonotributoSocial),
            15 => Some(Self::NoAlcanzado),
            16 => Some(Self::MonotributoPromovido),
            _ => None,
        }
    }
}
