use std::time::Duration;

use tracing::{debug, warn};

use super::reader::{PathHandler, walk};
use super::xml_utils::XmlWriter;
use crate::core::ArcaError;

pub(crate) const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Markers of a maintenance or proxy error page served instead of SOAP.
const HTML_MARKERS: &[&str] = &[
    "<html",
    "<!doctype html",
    "<br>",
    "<br/>",
    "<br ",
    "<span>",
    "<span ",
];

/// HTTP client bound to one SOAP endpoint.
#[derive(Debug, Clone)]
pub(crate) struct SoapTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl SoapTransport {
    pub fn new(endpoint: &str, timeout: Duration, legacy_tls: bool) -> Result<Self, ArcaError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if legacy_tls {
            warn!(
                endpoint,
                "certificate verification disabled for authority endpoint"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| ArcaError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Any HTTP answer within five seconds counts as reachable.
    pub async fn is_reachable(&self) -> bool {
        let result = self
            .http
            .get(&self.endpoint)
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        match result {
            Ok(_) => true,
            Err(e) => {
                debug!(endpoint = %self.endpoint, error = %e, "endpoint unreachable");
                false
            }
        }
    }

    /// POST an envelope and return the response body.
    ///
    /// # Errors
    ///
    /// - `Transport` on connect, TLS or timeout failures and on non-5xx HTTP
    ///   errors without a SOAP body
    /// - `ServiceUnavailable` when the body is an HTML page or not SOAP at
    ///   all, or the status is 5xx without a SOAP fault
    /// - `SoapFault` when the body carries a fault
    pub async fn call(&self, action: &str, envelope: String) -> Result<String, ArcaError> {
        debug!(endpoint = %self.endpoint, action, "SOAP request");

        let resp = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{action}\""))
            .body(envelope)
            .send()
            .await
            .map_err(|e| ArcaError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ArcaError::Transport(e.to_string()))?;

        classify_response(status.as_u16(), &body)?;
        Ok(body)
    }
}

/// Decide whether a raw HTTP response carries a usable SOAP body.
pub(crate) fn classify_response(status: u16, body: &str) -> Result<(), ArcaError> {
    if looks_like_html(body) {
        return Err(ArcaError::ServiceUnavailable(format!(
            "HTTP {status}: maintenance page instead of SOAP response"
        )));
    }

    if !is_soap_envelope(body) {
        if (500..600).contains(&status) || body.trim().is_empty() || status < 400 {
            return Err(ArcaError::ServiceUnavailable(format!(
                "HTTP {status}: response is not a SOAP envelope"
            )));
        }
        return Err(ArcaError::Transport(format!("HTTP {status}")));
    }

    if let Some(fault) = parse_fault(body)? {
        return Err(fault);
    }

    if (500..600).contains(&status) {
        return Err(ArcaError::ServiceUnavailable(format!(
            "HTTP {status} without SOAP fault"
        )));
    }
    if status >= 400 {
        return Err(ArcaError::Transport(format!("HTTP {status}")));
    }

    Ok(())
}

pub(crate) fn looks_like_html(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    HTML_MARKERS.iter().any(|m| lower.contains(m))
}

fn is_soap_envelope(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains(":envelope") || lower.contains("<envelope")
}

#[derive(Default)]
struct FaultCollector {
    in_fault: bool,
    code: Option<String>,
    message: Option<String>,
}

impl PathHandler for FaultCollector {
    fn text(&mut self, path: &[String], text: &str) {
        if !path.iter().any(|p| p == "Fault") {
            return;
        }
        self.in_fault = true;
        match path.last().map(String::as_str) {
            Some("faultcode") => self.code = Some(text.to_string()),
            Some("faultstring") => self.message = Some(text.to_string()),
            _ => {}
        }
    }
}

fn parse_fault(body: &str) -> Result<Option<ArcaError>, ArcaError> {
    let mut h = FaultCollector::default();
    walk(body, &mut h)?;
    if !h.in_fault {
        return Ok(None);
    }
    Ok(Some(ArcaError::SoapFault {
        code: h.code.unwrap_or_default(),
        message: h.message.unwrap_or_default(),
    }))
}

/// Wrap an operation body in a SOAP 1.1 envelope declaring `prefix` for `ns`.
pub(crate) fn envelope<F>(prefix: &str, ns: &str, body: F) -> Result<String, ArcaError>
where
    F: FnOnce(&mut XmlWriter) -> Result<(), ArcaError>,
{
    let xmlns = format!("xmlns:{prefix}");
    let mut w = XmlWriter::new()?;
    w.start_element_with_attrs(
        "soapenv:Envelope",
        &[("xmlns:soapenv", SOAP_ENV_NS), (xmlns.as_str(), ns)],
    )?;
    w.start_element("soapenv:Header")?;
    w.end_element("soapenv:Header")?;
    w.start_element("soapenv:Body")?;
    body(&mut w)?;
    w.end_element("soapenv:Body")?;
    w.end_element("soapenv:Envelope")?;
    w.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAULT: &str = r#"<?xml version="1.0"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Body>
    <soapenv:Fault>
      <faultcode>ns1:coe.alreadyAuthenticated</faultcode>
      <faultstring>El CEE ya posee un TA valido para el acceso al WSN solicitado</faultstring>
    </soapenv:Fault>
  </soapenv:Body>
</soapenv:Envelope>"#;

    #[test]
    fn html_body_is_service_unavailable() {
        let err = classify_response(200, "<HTML><BODY>Sitio en mantenimiento<BR></BODY></HTML>")
            .unwrap_err();
        assert!(matches!(err, ArcaError::ServiceUnavailable(_)));
    }

    #[test]
    fn element_names_starting_with_br_are_not_html() {
        let body = r#"<soap:Envelope xmlns:soap="x"><soap:Body>
<brand>Yerba</brand><spanish>si</spanish><branch/>
</soap:Body></soap:Envelope>"#;
        assert!(!looks_like_html(body));
        assert!(classify_response(200, body).is_ok());

        assert!(looks_like_html("Servicio no disponible<br/>"));
        assert!(looks_like_html("<span class=\"x\">mantenimiento</span>"));
    }

    #[test]
    fn bare_5xx_is_service_unavailable() {
        let err = classify_response(503, "").unwrap_err();
        assert!(matches!(err, ArcaError::ServiceUnavailable(_)));
    }

    #[test]
    fn fault_is_reported_with_code() {
        let err = classify_response(500, FAULT).unwrap_err();
        match err {
            ArcaError::SoapFault { code, message } => {
                assert!(code.contains("alreadyAuthenticated"));
                assert!(message.contains("ya posee un TA valido"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn plain_envelope_passes() {
        let body = r#"<soap:Envelope xmlns:soap="x"><soap:Body><Ok/></soap:Body></soap:Envelope>"#;
        assert!(classify_response(200, body).is_ok());
    }

    #[test]
    fn envelope_declares_namespaces() {
        let xml = envelope("ar", "http://ar.gov.afip.dif.FEV1/", |w| {
            w.start_element("ar:FEDummy")?;
            w.end_element("ar:FEDummy")?;
            Ok(())
        })
        .unwrap();
        assert!(xml.contains(r#"xmlns:ar="http://ar.gov.afip.dif.FEV1/""#));
        assert!(xml.contains("<ar:FEDummy>"));
        assert!(xml.contains("<soapenv:Body>"));
    }
}
