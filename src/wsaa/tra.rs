use chrono::{DateTime, Duration, Utc};

use crate::core::ArcaError;
use crate::soap::XmlWriter;

/// Lifetime requested for every ticket.
pub const TRA_LIFETIME_HOURS: i64 = 12;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000-00:00";

/// Ticket Request Access: the unsigned login request sent to WSAA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTicketRequest {
    pub unique_id: i64,
    pub generation_time: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    pub service: String,
}

impl LoginTicketRequest {
    /// A request generated at `now`, valid for exactly twelve hours.
    pub fn new(service: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            unique_id: now.timestamp(),
            generation_time: now,
            expiration_time: now + Duration::hours(TRA_LIFETIME_HOURS),
            service: service.into(),
        }
    }

    pub fn to_xml(&self) -> Result<String, ArcaError> {
        let mut w = XmlWriter::new()?;
        w.start_element_with_attrs("loginTicketRequest", &[("version", "1.0")])?;
        w.start_element("header")?;
        w.number_element("uniqueId", self.unique_id)?;
        w.text_element(
            "generationTime",
            &self.generation_time.format(TIMESTAMP_FORMAT).to_string(),
        )?;
        w.text_element(
            "expirationTime",
            &self.expiration_time.format(TIMESTAMP_FORMAT).to_string(),
        )?;
        w.end_element("header")?;
        w.text_element("service", &self.service)?;
        w.end_element("loginTicketRequest")?;
        w.into_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn expiration_is_twelve_hours_after_generation() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let tra = LoginTicketRequest::new("wsfe", now);
        assert_eq!(tra.expiration_time - tra.generation_time, Duration::hours(12));
        assert_eq!(tra.unique_id, now.timestamp());
    }

    #[test]
    fn xml_shape() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let xml = LoginTicketRequest::new("wsfe", now).to_xml().unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(r#"<loginTicketRequest version="1.0">"#));
        assert!(xml.contains("<generationTime>2024-03-01T09:30:00.000-00:00</generationTime>"));
        assert!(xml.contains("<expirationTime>2024-03-01T21:30:00.000-00:00</expirationTime>"));
        assert!(xml.contains("<service>wsfe</service>"));
        assert!(xml.contains(&format!("<uniqueId>{}</uniqueId>", now.timestamp())));
    }
}
