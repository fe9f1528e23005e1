//! Redfish client for one BMC
//!
//! Issues authenticated GETs against the fixed resource paths the
//! integration reads. TLS certificates are not verified: BMCs almost
//! always ship self-signed certificates.

use std::fmt;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::{RedfishError, RedfishResult};
use super::models::{EthernetInterfaceInfo, PowerReading, ServiceRootType, SystemType};
use super::schema::{OdataTypeMatcher, PowerSchema, COMPUTER_SYSTEM, SERVICE_ROOT};

pub const SERVICE_ROOT_PATH: &str = "/redfish/v1";
pub const SYSTEM_PATH: &str = "/redfish/v1/Systems/1";
pub const MANAGER_ETHERNET_PATH: &str = "/redfish/v1/Managers/1/EthernetInterfaces/1";
pub const CHASSIS_POWER_PATH: &str = "/redfish/v1/Chassis/1/Power";

/// Per-request timeout unless configured otherwise
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// BMC password, kept out of logs
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl From<&str> for Password {
    fn from(password: &str) -> Self {
        Self::new(password)
    }
}

impl From<String> for Password {
    fn from(password: String) -> Self {
        Self(password)
    }
}

/// Where and how to reach a BMC
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    host: String,
    username: String,
    password: Password,
    timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<Password>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &Password {
        &self.password
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Origin requests are sent to.
    ///
    /// A bare host or IP is reached over HTTPS. A host that already carries
    /// a scheme (`http://127.0.0.1:8000` for a mockup server) is used as is.
    pub fn base_url(&self) -> String {
        if self.host.contains("://") {
            self.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.host)
        }
    }
}

/// Client for the Redfish service of one BMC
///
/// Immutable after construction. At most one request is in flight per hub;
/// concurrent callers queue on an internal gate.
#[derive(Debug)]
pub struct RedfishPowerHub {
    config: ConnectionConfig,
    base_url: String,
    http: Client,
    service_root: OdataTypeMatcher,
    computer_system: OdataTypeMatcher,
    request_gate: Mutex<()>,
}

impl RedfishPowerHub {
    pub fn new(config: ConnectionConfig) -> RedfishResult<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(config.timeout())
            .build()
            .map_err(RedfishError::Client)?;

        Ok(Self {
            base_url: config.base_url(),
            service_root: SERVICE_ROOT.matcher()?,
            computer_system: COMPUTER_SYSTEM.matcher()?,
            request_gate: Mutex::new(()),
            http,
            config,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Host as configured
    pub fn host(&self) -> &str {
        self.config.host()
    }

    /// Liveness check: the service root answers with a ServiceRoot v1.x.0.
    ///
    /// `Ok(false)` for a non-200 status, a non-JSON body or an unexpected
    /// type. Transport failures are errors.
    pub async fn test_connection(&self) -> RedfishResult<bool> {
        let (status, body) = self.get(SERVICE_ROOT_PATH).await?;
        let odata_type = parse_ok_body::<ServiceRootType>(SERVICE_ROOT_PATH, status, &body)
            .map(|found| found.odata_type);
        Ok(self.check_type(SERVICE_ROOT_PATH, &self.service_root, odata_type))
    }

    /// Credential check: the system resource answers with a ComputerSystem
    /// v1.x.0. Same outcome rules as [`Self::test_connection`].
    pub async fn authenticate(&self) -> RedfishResult<bool> {
        let (status, body) = self.get(SYSTEM_PATH).await?;
        let odata_type = parse_ok_body::<SystemType>(SYSTEM_PATH, status, &body)
            .map(|found| found.odata_type);
        Ok(self.check_type(SYSTEM_PATH, &self.computer_system, odata_type))
    }

    /// Host name of the management interface, [`super::models::UNKNOWN_HOSTNAME`]
    /// if it reports none. The response status is not checked.
    pub async fn get_device_hostname(&self) -> RedfishResult<String> {
        let (_, body) = self.get(MANAGER_ETHERNET_PATH).await?;
        let info: EthernetInterfaceInfo =
            serde_json::from_slice(&body).map_err(|source| RedfishError::Decode {
                path: MANAGER_ETHERNET_PATH,
                source,
            })?;
        Ok(info.hostname())
    }

    /// Current power draw in watts, read at `schema`'s field only
    pub async fn get_power_consumption(&self, schema: PowerSchema) -> RedfishResult<i64> {
        let power = self.get_power().await?;
        PowerReading::from_power(&power, schema)
            .map(|reading| reading.watts)
            .ok_or(RedfishError::MissingField {
                path: CHASSIS_POWER_PATH,
                field: schema.field_path(),
            })
    }

    /// Find which power layout this BMC reports, legacy field first
    pub async fn detect_power_schema(&self) -> RedfishResult<PowerSchema> {
        let power = self.get_power().await?;
        let schema = PowerSchema::detect(&power).ok_or(RedfishError::UnsupportedPowerSchema {
            path: CHASSIS_POWER_PATH,
        })?;
        debug!("{} reports power at {}", self.host(), schema);
        Ok(schema)
    }

    async fn get_power(&self) -> RedfishResult<Value> {
        let (_, body) = self.get(CHASSIS_POWER_PATH).await?;
        serde_json::from_slice(&body).map_err(|source| RedfishError::Decode {
            path: CHASSIS_POWER_PATH,
            source,
        })
    }

    fn check_type(
        &self,
        path: &'static str,
        matcher: &OdataTypeMatcher,
        odata_type: Option<Option<String>>,
    ) -> bool {
        match odata_type {
            Some(Some(odata_type)) if matcher.matches(&odata_type) => true,
            Some(odata_type) => {
                warn!(
                    "{}{} reported @odata.type {:?}, expected {}",
                    self.host(),
                    path,
                    odata_type,
                    matcher.expected()
                );
                false
            }
            None => false,
        }
    }

    /// Authenticated GET returning status and raw body
    async fn get(&self, path: &'static str) -> RedfishResult<(StatusCode, Vec<u8>)> {
        let _gate = self.request_gate.lock().await;
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .get(&url)
            .basic_auth(self.config.username(), Some(self.config.password().expose()))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(path, e))?;
        debug!("GET {} -> {} ({} bytes)", url, status, body.len());

        Ok((status, body.to_vec()))
    }
}

/// Parse a check response, `None` if the status is not 200 or the body
/// does not decode
fn parse_ok_body<T: serde::de::DeserializeOwned>(
    path: &str,
    status: StatusCode,
    body: &[u8],
) -> Option<T> {
    if status != StatusCode::OK {
        debug!("{} answered {}", path, status);
        return None;
    }
    match serde_json::from_slice(body) {
        Ok(found) => Some(found),
        Err(e) => {
            debug!("{} returned an unreadable body: {}", path, e);
            None
        }
    }
}

fn transport_error(path: &'static str, source: reqwest::Error) -> RedfishError {
    if source.is_timeout() {
        RedfishError::Timeout { path }
    } else {
        RedfishError::Http { path, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// BMC that answers every request with `body` after `delay`.
    ///
    /// Returns its URL and the highest number of requests it was serving at
    /// the same time.
    async fn slow_bmc(delay: Duration, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let peak_seen = Arc::clone(&peak);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let (active, peak) = (Arc::clone(&active), Arc::clone(&peak));
                tokio::spawn(async move {
                    let mut request: Vec<u8> = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w: &[u8]| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }

                    let serving = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(serving, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    active.fetch_sub(1, Ordering::SeqCst);

                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });

        (url, peak_seen)
    }

    fn hub_for(server: &mockito::ServerGuard) -> RedfishPowerHub {
        RedfishPowerHub::new(ConnectionConfig::new(server.url(), "admin", "secret")).unwrap()
    }

    #[test]
    fn test_password_debug_is_redacted() {
        let config = ConnectionConfig::new("10.0.0.5", "admin", "hunter2");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("Password(***)"));
    }

    #[test]
    fn test_base_url() {
        let config = ConnectionConfig::new("10.0.0.5", "admin", "x");
        assert_eq!(config.base_url(), "https://10.0.0.5");
        assert_eq!(config.timeout(), DEFAULT_REQUEST_TIMEOUT);

        let config = ConnectionConfig::new("http://127.0.0.1:8000/", "admin", "x");
        assert_eq!(config.base_url(), "http://127.0.0.1:8000");
    }

    #[tokio::test]
    async fn test_connection_accepts_newer_minor() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", SERVICE_ROOT_PATH)
            .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
            .match_header("accept", "application/json")
            .with_status(200)
            .with_body(json!({"@odata.type": "#ServiceRoot.v1_9_0.ServiceRoot"}).to_string())
            .create_async()
            .await;

        let hub = hub_for(&server);
        assert!(hub.test_connection().await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_false_on_bad_answers() {
        let mut server = mockito::Server::new_async().await;
        let hub = hub_for(&server);

        let _m = server
            .mock("GET", SERVICE_ROOT_PATH)
            .with_status(503)
            .with_body(json!({"@odata.type": "#ServiceRoot.v1_1_0.ServiceRoot"}).to_string())
            .create_async()
            .await;
        assert!(!hub.test_connection().await.unwrap());

        server.reset();
        let _m = server
            .mock("GET", SERVICE_ROOT_PATH)
            .with_status(200)
            .with_body("<html>login</html>")
            .create_async()
            .await;
        assert!(!hub.test_connection().await.unwrap());

        server.reset();
        let _m = server
            .mock("GET", SERVICE_ROOT_PATH)
            .with_status(200)
            .with_body(json!({"RedfishVersion": "1.0.0"}).to_string())
            .create_async()
            .await;
        assert!(!hub.test_connection().await.unwrap());

        server.reset();
        let _m = server
            .mock("GET", SERVICE_ROOT_PATH)
            .with_status(200)
            .with_body(json!({"@odata.type": "#ServiceRoot.v2_0_0.ServiceRoot"}).to_string())
            .create_async()
            .await;
        assert!(!hub.test_connection().await.unwrap());
    }

    #[tokio::test]
    async fn test_authenticate() {
        let mut server = mockito::Server::new_async().await;
        let hub = hub_for(&server);

        let _m = server
            .mock("GET", SYSTEM_PATH)
            .with_status(200)
            .with_body(
                json!({"@odata.type": "#ComputerSystem.v1_13_0.ComputerSystem"}).to_string(),
            )
            .create_async()
            .await;
        assert!(hub.authenticate().await.unwrap());

        server.reset();
        let _m = server
            .mock("GET", SYSTEM_PATH)
            .with_status(401)
            .with_body(json!({"error": {"code": "Base.1.0.NoValidSession"}}).to_string())
            .create_async()
            .await;
        assert!(!hub.authenticate().await.unwrap());
    }

    #[tokio::test]
    async fn test_hostname_ignores_status() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", MANAGER_ETHERNET_PATH)
            .with_status(404)
            .with_body(json!({"HostName": "rack-a-bmc"}).to_string())
            .create_async()
            .await;

        let hub = hub_for(&server);
        assert_eq!(hub.get_device_hostname().await.unwrap(), "rack-a-bmc");
    }

    #[tokio::test]
    async fn test_hostname_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", MANAGER_ETHERNET_PATH)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let hub = hub_for(&server);
        let err = hub.get_device_hostname().await.unwrap_err();
        assert!(matches!(
            err,
            RedfishError::Decode {
                path: MANAGER_ETHERNET_PATH,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_power_consumption_pinned_schema() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", CHASSIS_POWER_PATH)
            .with_status(200)
            .with_body(
                json!({"PowerControl": [{"PowerMetrics": {"AverageConsumedWatts": 57}}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let hub = hub_for(&server);
        assert_eq!(
            hub.get_power_consumption(PowerSchema::AverageConsumedWatts)
                .await
                .unwrap(),
            57
        );

        let err = hub
            .get_power_consumption(PowerSchema::PowerConsumedWatts)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RedfishError::MissingField {
                field: "PowerControl[0].PowerConsumedWatts",
                ..
            }
        ));
        assert_eq!(
            hub.detect_power_schema().await.unwrap(),
            PowerSchema::AverageConsumedWatts
        );
    }

    #[tokio::test]
    async fn test_detect_unsupported_schema() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", CHASSIS_POWER_PATH)
            .with_status(200)
            .with_body(json!({"PowerControl": []}).to_string())
            .create_async()
            .await;

        let hub = hub_for(&server);
        assert!(matches!(
            hub.detect_power_schema().await.unwrap_err(),
            RedfishError::UnsupportedPowerSchema { .. }
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let hub = RedfishPowerHub::new(
            ConnectionConfig::new(url, "admin", "x").with_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let err = hub.test_connection().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_requests_to_one_bmc_never_overlap() {
        let (url, peak) = slow_bmc(Duration::from_millis(150), r#"{"HostName": "rack-a"}"#).await;
        let hub = RedfishPowerHub::new(ConnectionConfig::new(url, "admin", "x")).unwrap();

        let (first, second) = tokio::join!(hub.get_device_hostname(), hub.get_device_hostname());
        assert_eq!(first.unwrap(), "rack-a");
        assert_eq!(second.unwrap(), "rack-a");
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_answer_is_timeout() {
        let (url, _) = slow_bmc(Duration::from_secs(5), "{}").await;
        let hub = RedfishPowerHub::new(
            ConnectionConfig::new(url, "admin", "x").with_timeout(Duration::from_millis(200)),
        )
        .unwrap();

        let err = hub.test_connection().await.unwrap_err();
        assert!(matches!(
            err,
            RedfishError::Timeout {
                path: SERVICE_ROOT_PATH
            }
        ));
        assert!(err.is_transport());
    }
}
