//! Mock NUS service: SOAP endpoint plus content CDN on one wiremock server

use super::fixtures::{SYSTEM_MENU, cdn_cetk, cdn_tmd, content, soap_response};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path of the SOAP endpoint on the mock server
pub const SOAP_PATH: &str = "/nus/services/NetUpdateSOAP";

/// Path prefix of the content CDN on the mock server
pub const CDN_PATH: &str = "/ccs/download";

/// A mock NUS with SOAP and CDN endpoints
pub struct MockNus {
    pub server: MockServer,
}

impl MockNus {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn soap_url(&self) -> String {
        format!("{}{}", self.server.uri(), SOAP_PATH)
    }

    pub fn content_url(&self) -> String {
        format!("{}{}/", self.server.uri(), CDN_PATH)
    }

    /// Answer the SOAP request with a listing of `titles`
    pub async fn list(&self, titles: &[(u64, u16)]) {
        Mock::given(method("POST"))
            .and(path(SOAP_PATH))
            .and(header("SOAPAction", "urn:nus.wsapi.broadon.com/GetSystemUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(soap_response(titles)))
            .mount(&self.server)
            .await;
    }

    async fn file(&self, title_id: u64, leaf: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(format!("{}/{:016X}/{}", CDN_PATH, title_id, leaf)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&self.server)
            .await;
    }

    /// Serve a complete title with one content of `size` bytes
    pub async fn title(&self, title_id: u64, version: u16, content_id: u32, size: u64) {
        self.file(
            title_id,
            &format!("tmd.{}", version),
            cdn_tmd(title_id, version, &[(content_id, size)]),
        )
        .await;
        self.file(title_id, "cetk", cdn_cetk(title_id, version)).await;
        self.file(title_id, &format!("{:08x}", content_id), content(0x5A, size))
            .await;
    }

    /// Serve a title whose ticket is not published
    pub async fn title_without_ticket(&self, title_id: u64, version: u16) {
        self.file(
            title_id,
            &format!("tmd.{}", version),
            cdn_tmd(title_id, version, &[(1, 16)]),
        )
        .await;
    }

    /// Serve the System Menu TMD and ticket used to build the certificate chain
    pub async fn cert_source(&self) {
        self.file(SYSTEM_MENU, "tmd.513", cdn_tmd(SYSTEM_MENU, 513, &[(1, 16)]))
            .await;
        self.file(SYSTEM_MENU, "cetk", cdn_cetk(SYSTEM_MENU, 513)).await;
    }

    /// Number of requests received so far
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or(0)
    }
}
