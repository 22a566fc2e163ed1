//! SOAP 1.1 plumbing shared by the WSAA and WSFE clients.

mod reader;
mod transport;
mod xml_utils;

pub(crate) use reader::{PathHandler, first_text, walk};
pub(crate) use transport::{SoapTransport, envelope};
pub(crate) use xml_utils::{XmlWriter, format_amount, format_rate};
