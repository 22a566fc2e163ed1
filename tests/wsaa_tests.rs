#![cfg(feature = "wsaa")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use arca_fe::config::{ArcaConfig, Environment};
use arca_fe::core::{ArcaError, Clock, ManualClock};
use arca_fe::wsaa::*;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOGIN_OK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Body>
    <loginCmsResponse xmlns="http://wsaa.view.sua.dvadac.desein.afip.gov">
      <loginCmsReturn>&lt;?xml version="1.0" encoding="UTF-8" standalone="yes"?&gt;
&lt;loginTicketResponse version="1.0"&gt;
  &lt;header&gt;
    &lt;uniqueId&gt;1717243200&lt;/uniqueId&gt;
    &lt;generationTime&gt;2024-06-01T09:00:00.000-03:00&lt;/generationTime&gt;
    &lt;expirationTime&gt;2024-06-01T21:00:00.000-03:00&lt;/expirationTime&gt;
  &lt;/header&gt;
  &lt;credentials&gt;
    &lt;token&gt;VE9LRU4=&lt;/token&gt;
    &lt;sign&gt;U0lHTg==&lt;/sign&gt;
  &lt;/credentials&gt;
&lt;/loginTicketResponse&gt;</loginCmsReturn>
    </loginCmsResponse>
  </soapenv:Body>
</soapenv:Envelope>"#;

const ALREADY_AUTHENTICATED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Body>
    <soapenv:Fault>
      <faultcode xmlns:ns1="http://xml.apache.org/axis/">ns1:coe.alreadyAuthenticated</faultcode>
      <faultstring>El CEE ya posee un TA valido para el acceso al WSN solicitado</faultstring>
    </soapenv:Fault>
  </soapenv:Body>
</soapenv:Envelope>"#;

const MAINTENANCE_PAGE: &str =
    "<html><head><title>AFIP</title></head><body>Servicio en mantenimiento<br></body></html>";

fn start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Ticket source that counts logins and can report contention first.
struct CountingSource {
    calls: AtomicUsize,
    contentions: usize,
    delay: StdDuration,
}

impl CountingSource {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            contentions: 0,
            delay: StdDuration::ZERO,
        }
    }

    fn contended(times: usize) -> Self {
        Self {
            contentions: times,
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TicketSource for CountingSource {
    async fn request_ticket(&self) -> Result<Credentials, ArcaError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if n <= self.contentions {
            return Err(ArcaError::TicketContention(
                "El CEE ya posee un TA valido".into(),
            ));
        }
        Ok(Credentials {
            token: format!("token-{n}"),
            sign: format!("sign-{n}"),
            expires_at: None,
        })
    }
}

struct FixedSigner;

#[async_trait]
impl Signer for FixedSigner {
    async fn sign(&self, tra_xml: &str) -> Result<Vec<u8>, ArcaError> {
        assert!(tra_xml.contains("<service>wsfe</service>"));
        Ok(b"signed-cms".to_vec())
    }
}

// --- Ticket cache ---

#[tokio::test]
async fn ticket_is_reused_within_ten_hours() {
    let clock = Arc::new(ManualClock::new(start()));
    let source = Arc::new(CountingSource::new());
    let cache = TicketCache::new(source.clone(), clock.clone());

    let first = cache.valid_ticket().await.unwrap();
    assert_eq!(source.calls(), 1);

    clock.advance(Duration::hours(9) + Duration::minutes(59));
    let again = cache.valid_ticket().await.unwrap();
    assert_eq!(source.calls(), 1);
    assert_eq!(again, first);

    clock.set(start() + Duration::hours(10) + Duration::minutes(1));
    let renewed = cache.valid_ticket().await.unwrap();
    assert_eq!(source.calls(), 2);
    assert_eq!(renewed.token, "token-2");
    assert_eq!(renewed.issued_at, clock.now());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cold_cache_logs_in_once_for_concurrent_callers() {
    let clock = Arc::new(ManualClock::new(start()));
    let source = Arc::new(CountingSource {
        delay: StdDuration::from_millis(50),
        ..CountingSource::new()
    });
    let cache = Arc::new(TicketCache::new(source.clone(), clock));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.valid_ticket().await })
        })
        .collect();
    for h in handles {
        assert_eq!(h.await.unwrap().unwrap().token, "token-1");
    }
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn contention_is_retried_once() {
    let clock = Arc::new(ManualClock::new(start()));
    let source = Arc::new(CountingSource::contended(1));
    let cache = TicketCache::new(source.clone(), clock).with_contention_delay(StdDuration::ZERO);

    let ticket = cache.valid_ticket().await.unwrap();
    assert_eq!(ticket.token, "token-2");
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn second_contention_propagates() {
    let clock = Arc::new(ManualClock::new(start()));
    let source = Arc::new(CountingSource::contended(2));
    let cache = TicketCache::new(source.clone(), clock).with_contention_delay(StdDuration::ZERO);

    let err = cache.valid_ticket().await.unwrap_err();
    assert!(matches!(err, ArcaError::TicketContention(_)));
    assert_eq!(source.calls(), 2);
}

/// Ticket source that reports contention once, logging each login to a
/// shared event list and stamping it with tokio's clock.
struct EventSource {
    events: Arc<parking_lot::Mutex<Vec<&'static str>>>,
    logins: parking_lot::Mutex<Vec<tokio::time::Instant>>,
}

#[async_trait]
impl TicketSource for EventSource {
    async fn request_ticket(&self) -> Result<Credentials, ArcaError> {
        self.events.lock().push("login");
        let n = {
            let mut logins = self.logins.lock();
            logins.push(tokio::time::Instant::now());
            logins.len()
        };
        if n == 1 {
            return Err(ArcaError::TicketContention(
                "El CEE ya posee un TA valido".into(),
            ));
        }
        Ok(Credentials {
            token: format!("token-{n}"),
            sign: format!("sign-{n}"),
            expires_at: None,
        })
    }
}

/// Ticket store that records every call into the shared event list.
struct EventStore {
    inner: MemoryTicketStore,
    events: Arc<parking_lot::Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl TicketStore for EventStore {
    async fn load(&self) -> Result<Option<AccessTicket>, ArcaError> {
        self.events.lock().push("load");
        self.inner.load().await
    }

    async fn save(&self, ticket: &AccessTicket) -> Result<(), ArcaError> {
        self.events.lock().push("save");
        self.inner.save(ticket).await
    }

    async fn clear(&self) -> Result<(), ArcaError> {
        self.events.lock().push("clear");
        self.inner.clear().await
    }
}

fn event_source(events: &Arc<parking_lot::Mutex<Vec<&'static str>>>) -> Arc<EventSource> {
    Arc::new(EventSource {
        events: events.clone(),
        logins: parking_lot::Mutex::new(Vec::new()),
    })
}

#[tokio::test(start_paused = true)]
async fn contention_waits_the_default_delay() {
    let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let source = event_source(&events);
    let cache = TicketCache::new(source.clone(), Arc::new(ManualClock::new(start())));

    let began = tokio::time::Instant::now();
    let ticket = cache.valid_ticket().await.unwrap();
    assert_eq!(ticket.token, "token-2");

    let logins = source.logins.lock().clone();
    assert_eq!(logins.len(), 2);
    assert!(logins[0] - began < DEFAULT_CONTENTION_DELAY);
    assert!(logins[1] - logins[0] >= DEFAULT_CONTENTION_DELAY);
    assert_eq!(DEFAULT_CONTENTION_DELAY, StdDuration::from_secs(30));
}

#[tokio::test]
async fn contention_clears_stale_stored_ticket_before_retrying() {
    let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let inner = MemoryTicketStore::default();
    // Issued eleven hours ago: past the reuse window.
    inner
        .save(&AccessTicket {
            token: "stale".into(),
            sign: "stale".into(),
            issued_at: start() - Duration::hours(11),
            expires_at: None,
        })
        .await
        .unwrap();
    let store = Arc::new(EventStore {
        inner,
        events: events.clone(),
    });
    let source = event_source(&events);
    let cache = TicketCache::new(source.clone(), Arc::new(ManualClock::new(start())))
        .with_store(store.clone())
        .with_contention_delay(StdDuration::ZERO);

    let ticket = cache.valid_ticket().await.unwrap();
    assert_eq!(ticket.token, "token-2");
    assert_eq!(
        *events.lock(),
        vec!["load", "load", "login", "clear", "login", "save"]
    );
    assert_eq!(store.inner.load().await.unwrap(), Some(ticket));
}

#[tokio::test]
async fn invalidate_forces_a_new_login() {
    let clock = Arc::new(ManualClock::new(start()));
    let source = Arc::new(CountingSource::new());
    let cache = TicketCache::new(source.clone(), clock);

    cache.valid_ticket().await.unwrap();
    cache.invalidate().await.unwrap();
    cache.valid_ticket().await.unwrap();
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ta.json");
    let clock = Arc::new(ManualClock::new(start()));

    let first_source = Arc::new(CountingSource::new());
    let cache = TicketCache::new(first_source.clone(), clock.clone())
        .with_store(Arc::new(FileTicketStore::new(&path)));
    let ticket = cache.valid_ticket().await.unwrap();
    drop(cache);

    clock.advance(Duration::hours(2));
    let second_source = Arc::new(CountingSource::new());
    let restarted = TicketCache::new(second_source.clone(), clock)
        .with_store(Arc::new(FileTicketStore::new(&path)));
    assert_eq!(restarted.valid_ticket().await.unwrap(), ticket);
    assert_eq!(second_source.calls(), 0);
}

#[tokio::test]
async fn corrupt_ticket_file_means_login() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ta.json");
    std::fs::write(&path, "{not json").unwrap();

    let source = Arc::new(CountingSource::new());
    let cache = TicketCache::new(source.clone(), Arc::new(ManualClock::new(start())))
        .with_store(Arc::new(FileTicketStore::new(&path)));
    cache.valid_ticket().await.unwrap();
    assert_eq!(source.calls(), 1);
}

// --- TRA ---

#[test]
fn tra_expires_twelve_hours_after_generation() {
    let tra = LoginTicketRequest::new("wsfe", start());
    assert_eq!(
        tra.expiration_time - tra.generation_time,
        Duration::hours(TRA_LIFETIME_HOURS)
    );
    let xml = tra.to_xml().unwrap();
    assert!(xml.contains("<generationTime>2024-06-01T12:00:00.000-00:00</generationTime>"));
    assert!(xml.contains("<expirationTime>2024-06-02T00:00:00.000-00:00</expirationTime>"));
    assert!(xml.contains("<service>wsfe</service>"));
}

// --- LoginCms over HTTP ---

async fn wsaa_client(server: &MockServer) -> WsaaClient<FixedSigner> {
    let config = ArcaConfig::local_mock(&server.uri());
    WsaaClient::new(
        &config.wsaa_url,
        FixedSigner,
        Arc::new(ManualClock::new(start())),
        config.timeout(),
        false,
    )
    .unwrap()
}

#[tokio::test]
async fn login_cms_returns_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ws/services/LoginCms"))
        .and(header("SOAPAction", "\"\""))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_OK))
        .expect(1)
        .mount(&server)
        .await;

    let creds = wsaa_client(&server).await.request_ticket().await.unwrap();
    assert_eq!(creds.token, "VE9LRU4=");
    assert_eq!(creds.sign, "U0lHTg==");
    assert_eq!(
        creds.expires_at,
        Some(Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn login_request_carries_base64_cms() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ws/services/LoginCms"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_OK))
        .mount(&server)
        .await;

    wsaa_client(&server).await.request_ticket().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    // base64("signed-cms")
    assert!(body.contains("<wsaa:in0>c2lnbmVkLWNtcw==</wsaa:in0>"), "{body}");
    assert!(body.contains(WSAA_NS));
}

#[tokio::test]
async fn already_authenticated_fault_is_contention() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string(ALREADY_AUTHENTICATED))
        .mount(&server)
        .await;

    let err = wsaa_client(&server).await.request_ticket().await.unwrap_err();
    assert!(matches!(err, ArcaError::TicketContention(_)), "{err:?}");
}

#[tokio::test]
async fn wsaa_maintenance_page_is_service_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MAINTENANCE_PAGE))
        .mount(&server)
        .await;

    let err = wsaa_client(&server).await.request_ticket().await.unwrap_err();
    assert!(matches!(err, ArcaError::ServiceUnavailable(_)), "{err:?}");
}

#[tokio::test]
async fn cache_over_http_retries_contention() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string(ALREADY_AUTHENTICATED))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_OK))
        .mount(&server)
        .await;

    let cache = TicketCache::new(wsaa_client(&server).await, Arc::new(ManualClock::new(start())))
        .with_contention_delay(StdDuration::ZERO);
    let ticket = cache.valid_ticket().await.unwrap();
    assert_eq!(ticket.token, "VE9LRU4=");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn missing_certificate_is_reported_before_signing() {
    let dir = tempfile::tempdir().unwrap();
    let signer = OpensslSigner::new(dir.path().join("cert.crt"), dir.path().join("key.key"));
    let err = signer.sign("<loginTicketRequest/>").await.unwrap_err();
    assert!(matches!(err, ArcaError::CertificateNotFound(_)), "{err:?}");
}

// --- Configuration ---

#[test]
fn config_from_lookup_applies_overrides() {
    let vars = [
        ("ARCA_CUIT", "20-12345678-6"),
        ("ARCA_CERT_PATH", "/etc/arca/cert.crt"),
        ("ARCA_KEY_PATH", "/etc/arca/key.key"),
        ("ARCA_POINT_OF_SALE", "3"),
        ("ARCA_ENVIRONMENT", "production"),
        ("ARCA_TIMEOUT_SECS", "15"),
        ("ARCA_LEGACY_TLS", "true"),
    ];
    let config = ArcaConfig::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    })
    .unwrap();

    assert_eq!(config.cuit, 20123456786);
    assert_eq!(config.point_of_sale, 3);
    assert_eq!(config.environment, Environment::Production);
    assert_eq!(config.wsfe_url, Environment::Production.wsfe_url());
    assert_eq!(config.timeout(), StdDuration::from_secs(15));
    assert!(config.legacy_tls);
    assert_eq!(config.contention_delay(), DEFAULT_CONTENTION_DELAY);
}

#[test]
fn config_requires_cuit() {
    let err = ArcaConfig::from_lookup(|_| None).unwrap_err();
    assert!(matches!(err, ArcaError::Config(_)));
}
