//! Identity provider seam.
//!
//! Login, registration, settings and recovery are self-service browser flows
//! hosted by the identity provider, so the app only needs their URLs. Session
//! lookup and logout initiation are credentialed calls that forward the
//! visitor's cookies.

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::State;
use tracing::{debug, warn};

use crate::api::decode_json;
use crate::error::{AppError, Result};
use crate::models::{LogoutFlow, Session};
use crate::state::Services;

const SERVICE: &str = "identity provider";

/// Cookies of the current visitor, forwarded to upstream services
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    cookie: Option<String>,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_cookie(cookie: &str) -> Self {
        Self {
            cookie: Some(cookie.to_string()),
        }
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Credentials {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let cookies: Vec<&str> = request.headers().get("Cookie").collect();
        if cookies.is_empty() {
            Outcome::Success(Credentials::anonymous())
        } else {
            Outcome::Success(Credentials::from_cookie(&cookies.join("; ")))
        }
    }
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Where to send the browser to sign in.
    fn login(&self) -> String;
    /// Where to send the browser to create an account.
    fn register(&self) -> String;
    fn settings(&self) -> String;
    fn recovery(&self) -> String;
    /// Starts logout and returns the URL that completes it.
    async fn logout(&self, creds: &Credentials) -> Result<String>;
    async fn current_session(&self, creds: &Credentials) -> Result<Option<Session>>;
}

/// `AuthGateway` for a provider exposing `/self-service/*/browser` flows
pub struct SelfServiceGateway {
    client: reqwest::Client,
    base_url: String,
}

impl SelfServiceGateway {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn flow(&self, name: &str) -> String {
        format!("{}/self-service/{}/browser", self.base_url, name)
    }

    fn get(&self, url: String, creds: &Credentials) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json");
        match creds.cookie() {
            Some(cookie) => builder.header(header::COOKIE, cookie),
            None => builder,
        }
    }
}

#[async_trait]
impl AuthGateway for SelfServiceGateway {
    fn login(&self) -> String {
        self.flow("login")
    }

    fn register(&self) -> String {
        self.flow("registration")
    }

    fn settings(&self) -> String {
        self.flow("settings")
    }

    fn recovery(&self) -> String {
        self.flow("recovery")
    }

    async fn logout(&self, creds: &Credentials) -> Result<String> {
        let response = self
            .get(self.flow("logout"), creds)
            .send()
            .await
            .map_err(AppError::transport(SERVICE))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Backend {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let flow: LogoutFlow = decode_json(response, SERVICE).await?;
        Ok(flow.logout_url)
    }

    async fn current_session(&self, creds: &Credentials) -> Result<Option<Session>> {
        if creds.cookie().is_none() {
            return Ok(None);
        }

        let url = format!("{}/sessions/whoami", self.base_url);
        let response = self
            .get(url, creds)
            .send()
            .await
            .map_err(AppError::transport(SERVICE))?;

        match response.status() {
            status if status.is_success() => {
                let session = decode_json(response, SERVICE).await?;
                Ok(Some(session))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => Err(AppError::Backend {
                service: SERVICE,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// Session of the visitor, looked up once per request
#[derive(Debug, Clone, Default)]
pub struct CurrentSession(pub Option<Session>);

impl CurrentSession {
    pub fn get(&self) -> Option<&Session> {
        self.0.as_ref()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentSession {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let services = match request.guard::<&State<Services>>().await {
            Outcome::Success(services) => services,
            _ => return Outcome::Error((Status::InternalServerError, ())),
        };
        let creds = match request.guard::<Credentials>().await {
            Outcome::Success(creds) => creds,
            _ => Credentials::anonymous(),
        };

        let session = request
            .local_cache_async(async {
                match services.auth.current_session(&creds).await {
                    Ok(session) => session,
                    Err(err) => {
                        warn!(error = %err, "Session lookup failed, treating visitor as signed out");
                        None
                    }
                }
            })
            .await;

        debug!(signed_in = session.is_some(), "Resolved session");
        Outcome::Success(CurrentSession(session.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::serve_once;

    #[test]
    fn flow_urls_point_at_browser_endpoints() {
        let gateway = SelfServiceGateway::new("https://id.example.com/");
        assert_eq!(gateway.login(), "https://id.example.com/self-service/login/browser");
        assert_eq!(
            gateway.register(),
            "https://id.example.com/self-service/registration/browser"
        );
        assert_eq!(
            gateway.settings(),
            "https://id.example.com/self-service/settings/browser"
        );
        assert_eq!(
            gateway.recovery(),
            "https://id.example.com/self-service/recovery/browser"
        );
    }

    #[tokio::test]
    async fn whoami_forwards_cookie_and_reads_email() {
        let body = r#"{"id": "s1", "identity": {"id": "u1", "traits": {"email": "jane@example.com", "firstName": "Jane"}}}"#;
        let (base, server) = serve_once("200 OK", body).await;
        let gateway = SelfServiceGateway::new(&base);

        let session = gateway
            .current_session(&Credentials::from_cookie("ory_session=xyz"))
            .await
            .unwrap()
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /sessions/whoami "));
        assert!(request.to_lowercase().contains("cookie: ory_session=xyz"));
        assert_eq!(session.email(), "jane@example.com");
    }

    #[tokio::test]
    async fn unauthorized_whoami_means_signed_out() {
        let (base, _server) = serve_once("401 Unauthorized", r#"{"error": {}}"#).await;
        let gateway = SelfServiceGateway::new(&base);

        let session = gateway
            .current_session(&Credentials::from_cookie("ory_session=expired"))
            .await
            .unwrap();
        assert!(session.is_none());
    }

    #[tokio::test]
    async fn garbled_whoami_is_a_decode_error() {
        let (base, _server) = serve_once("200 OK", "<html>maintenance</html>").await;
        let gateway = SelfServiceGateway::new(&base);

        let err = gateway
            .current_session(&Credentials::from_cookie("ory_session=xyz"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn no_cookie_skips_the_lookup() {
        let gateway = SelfServiceGateway::new("http://127.0.0.1:9");
        let session = gateway.current_session(&Credentials::anonymous()).await.unwrap();
        assert!(session.is_none());
    }

    #[tokio::test]
    async fn logout_returns_provider_url() {
        let body = r#"{"logout_url": "https://id.example.com/self-service/logout?token=t", "logout_token": "t"}"#;
        let (base, server) = serve_once("200 OK", body).await;
        let gateway = SelfServiceGateway::new(&base);

        let url = gateway
            .logout(&Credentials::from_cookie("ory_session=xyz"))
            .await
            .unwrap();

        assert!(server.await.unwrap().starts_with("GET /self-service/logout/browser "));
        assert_eq!(url, "https://id.example.com/self-service/logout?token=t");
    }
}
