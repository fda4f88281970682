//! hh.ru REST client.
//!
//! Every request goes through `request`, which applies the token fallback chain:
//! 1. send with the current access token (if any);
//! 2. on 403 with a refresh token held, refresh once and resend;
//! 3. if the endpoint is public and the answer is still 403/400, resend once without
//!    an `Authorization` header.
//!
//! The client never persists tokens. A refreshed pair is kept until the caller
//! collects it with `take_refreshed_tokens`.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, LOCATION, USER_AGENT};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{JobBoard, JobBoardError, TokenPair, VacancyPage, VacancySearch};
use crate::models::user::User;

const CLIENT_USER_AGENT: &str = "JobPilot/1.0 (jobpilot@localhost)";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Path prefixes the job board serves to anonymous callers.
const PUBLIC_ENDPOINTS: &[&str] = &[
    "/vacancies",
    "/dictionaries",
    "/areas",
    "/specializations",
    "/professional_roles",
    "/industries",
];

/// Endpoints and OAuth application credentials.
#[derive(Debug, Clone)]
pub struct HhSettings {
    pub api_url: String,
    pub oauth_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Default, Clone)]
struct Credentials {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

enum Payload<'a> {
    Empty,
    Json(&'a Value),
    Form(&'a [(&'a str, &'a str)]),
}

struct RawResponse {
    status: StatusCode,
    location: Option<String>,
    body: String,
}

pub struct HhClient {
    http: Client,
    settings: HhSettings,
    credentials: Mutex<Credentials>,
    refreshed: Mutex<Option<TokenPair>>,
}

pub fn is_public_endpoint(path: &str) -> bool {
    PUBLIC_ENDPOINTS.iter().any(|prefix| {
        path == *prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('?'))
    })
}

impl HhClient {
    pub fn new(
        settings: HhSettings,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<Self, JobBoardError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            settings,
            credentials: Mutex::new(Credentials {
                access_token: access_token.filter(|t| !t.is_empty()),
                refresh_token: refresh_token.filter(|t| !t.is_empty()),
            }),
            refreshed: Mutex::new(None),
        })
    }

    /// Client for calls that need no user context (dictionaries, public search).
    pub fn anonymous(settings: HhSettings) -> Result<Self, JobBoardError> {
        Self::new(settings, None, None)
    }

    pub fn for_user(settings: HhSettings, user: &User) -> Result<Self, JobBoardError> {
        Self::new(
            settings,
            user.hh_access_token.clone(),
            user.hh_refresh_token.clone(),
        )
    }

    // ── OAuth ───────────────────────────────────────────────────────────────

    /// URL the user is redirected to in order to grant access.
    pub fn authorize_url(&self, state: Option<&str>) -> Result<Url, JobBoardError> {
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", self.settings.client_id.as_str()),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
        ];
        if let Some(state) = state {
            params.push(("state", state));
        }
        Url::parse_with_params(&format!("{}/authorize", self.settings.oauth_url), &params)
            .map_err(|e| JobBoardError::InvalidUrl(e.to_string()))
    }

    /// Exchanges an authorization code for a token pair and starts using it.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenPair, JobBoardError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
        ];
        let pair = self.token_request(&form).await?;
        self.install_tokens(&pair);
        Ok(pair)
    }

    /// Exchanges a refresh token for a new pair. Does not touch the held credentials.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, JobBoardError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&form).await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenPair, JobBoardError> {
        let endpoint = format!("{}/token", self.settings.oauth_url);
        let response = self
            .http
            .post(&endpoint)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(JobBoardError::TokenRefresh(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        serde_json::from_str(&body).map_err(|source| JobBoardError::Decode { endpoint, source })
    }

    /// Takes the refreshed pair and makes it the current credentials.
    fn install_tokens(&self, pair: &TokenPair) {
        let mut creds = self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        creds.access_token = Some(pair.access_token.clone());
        creds.refresh_token = Some(pair.refresh_token.clone());
    }

    fn credentials(&self) -> Credentials {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ── Request pipeline ────────────────────────────────────────────────────

    async fn send_once(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        payload: &Payload<'_>,
        access_token: Option<&str>,
    ) -> Result<RawResponse, JobBoardError> {
        let mut builder = self
            .http
            .request(method.clone(), format!("{}{}", self.settings.api_url, path))
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .query(query);
        if let Some(token) = access_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder = match payload {
            Payload::Empty => builder,
            Payload::Json(body) => builder.json(body),
            Payload::Form(fields) => builder.form(fields),
        };

        let response = builder.send().await?;
        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;
        debug!("{method} {path} -> {status}");
        Ok(RawResponse {
            status,
            location,
            body,
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        payload: Payload<'_>,
    ) -> Result<RawResponse, JobBoardError> {
        let creds = self.credentials();
        let mut response = self
            .send_once(&method, path, query, &payload, creds.access_token.as_deref())
            .await?;

        if response.status == StatusCode::FORBIDDEN {
            if let Some(refresh_token) = creds.refresh_token.as_deref() {
                info!("{path} returned 403, refreshing job board token");
                match self.refresh_tokens(refresh_token).await {
                    Ok(pair) => {
                        self.install_tokens(&pair);
                        let access_token = pair.access_token.clone();
                        *self.refreshed.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(pair);
                        response = self
                            .send_once(&method, path, query, &payload, Some(&access_token))
                            .await?;
                    }
                    Err(e) => warn!("Token refresh failed for {path}: {e}"),
                }
            }
        }

        if matches!(response.status, StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST)
            && is_public_endpoint(path)
        {
            info!(
                "{path} returned {}, retrying without authorization",
                response.status
            );
            response = self.send_once(&method, path, query, &payload, None).await?;
        }

        if !response.status.is_success() {
            return Err(JobBoardError::Status {
                status: response.status.as_u16(),
                endpoint: path.to_string(),
                body: response.body,
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, JobBoardError> {
        let response = self.request(Method::GET, path, query, Payload::Empty).await?;
        decode(path, &response.body)
    }

    // ── Endpoints ───────────────────────────────────────────────────────────

    pub async fn get_me(&self) -> Result<Value, JobBoardError> {
        self.get_json("/me", &[]).await
    }

    pub async fn get_vacancy(&self, vacancy_id: &str) -> Result<Value, JobBoardError> {
        self.get_json(&format!("/vacancies/{vacancy_id}"), &[]).await
    }

    pub async fn get_my_resumes(&self) -> Result<Value, JobBoardError> {
        self.get_json("/resumes/mine", &[]).await
    }

    pub async fn get_resume(&self, resume_id: &str) -> Result<Value, JobBoardError> {
        self.get_json(&format!("/resumes/{resume_id}"), &[]).await
    }

    /// Creates a resume and returns its job-board id, taken from the body or the
    /// `Location` header (`/resumes/{id}`).
    pub async fn create_resume(&self, resume: &Value) -> Result<String, JobBoardError> {
        let response = self
            .request(Method::POST, "/resumes", &[], Payload::Json(resume))
            .await?;
        let from_body = serde_json::from_str::<Value>(&response.body)
            .ok()
            .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string));
        from_body
            .or_else(|| {
                response
                    .location
                    .as_deref()
                    .and_then(|loc| loc.rsplit('/').next())
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
            })
            .ok_or_else(|| JobBoardError::Status {
                status: response.status.as_u16(),
                endpoint: "/resumes".to_string(),
                body: "response carried no resume id".to_string(),
            })
    }

    pub async fn update_resume(&self, resume_id: &str, resume: &Value) -> Result<(), JobBoardError> {
        self.request(
            Method::PUT,
            &format!("/resumes/{resume_id}"),
            &[],
            Payload::Json(resume),
        )
        .await?;
        Ok(())
    }

    pub async fn get_dictionaries(&self) -> Result<Value, JobBoardError> {
        self.get_json("/dictionaries", &[]).await
    }

    pub async fn get_areas(&self) -> Result<Value, JobBoardError> {
        self.get_json("/areas", &[]).await
    }

    pub async fn get_specializations(&self) -> Result<Value, JobBoardError> {
        self.get_json("/specializations", &[]).await
    }

    pub async fn get_professional_roles(&self) -> Result<Value, JobBoardError> {
        self.get_json("/professional_roles", &[]).await
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, JobBoardError> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|source| JobBoardError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

#[async_trait]
impl JobBoard for HhClient {
    async fn search_vacancies(&self, search: &VacancySearch) -> Result<VacancyPage, JobBoardError> {
        self.get_json("/vacancies", &search.to_query()).await
    }

    async fn apply_to_vacancy(
        &self,
        vacancy_id: &str,
        resume_id: Option<&str>,
        message: &str,
    ) -> Result<(), JobBoardError> {
        let resume_id = resume_id.ok_or(JobBoardError::MissingResume)?;
        let form = [
            ("vacancy_id", vacancy_id),
            ("resume_id", resume_id),
            ("message", message),
        ];
        self.request(Method::POST, "/negotiations", &[], Payload::Form(&form))
            .await?;
        Ok(())
    }

    fn take_refreshed_tokens(&self) -> Option<TokenPair> {
        self.refreshed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
