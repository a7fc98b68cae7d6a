//! LinkedIn API client: OAuth, asset uploads, and UGC post publishing
//!
//! One shared adapter for every posting path. Image handling is
//! best-effort: a post goes out with whichever assets uploaded cleanly,
//! and per-image failures are logged and skipped.

use base64::Engine;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Postgres};

const AUTHORIZE_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
const TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const USERINFO_URL: &str = "https://api.linkedin.com/v2/userinfo";
const REGISTER_UPLOAD_URL: &str = "https://api.linkedin.com/v2/assets?action=registerUpload";
const UGC_POSTS_URL: &str = "https://api.linkedin.com/v2/ugcPosts";

#[derive(Clone)]
pub struct LinkedInClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: Client,
}

impl LinkedInClient {
    pub fn new(client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
            http: Client::new(),
        }
    }

    /// Generate random state for CSRF protection
    fn generate_state() -> String {
        let bytes: [u8; 16] = rand::rng().random();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Step 1: Build authorization URL and return the state to store
    pub fn get_authorize_url(&self, scopes: &[&str]) -> AuthorizeRequest {
        let state = Self::generate_state();
        let scope = scopes.join("%20");

        let url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            AUTHORIZE_URL,
            percent_encode(&self.client_id),
            percent_encode(&self.redirect_uri),
            scope,
            percent_encode(&state),
        );

        AuthorizeRequest { url, state }
    }

    /// Step 2: Exchange authorization code for an access token
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, LinkedInError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.redirect_uri),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ];

        let resp = self
            .http
            .post(TOKEN_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&params)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let token: TokenResponse = resp.json().await?;
        Ok(token)
    }

    /// Get the authenticated member's OIDC profile
    pub async fn get_userinfo(&self, access_token: &str) -> Result<LinkedInProfile, LinkedInError> {
        let resp = self
            .http
            .get(USERINFO_URL)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let profile: LinkedInProfile = resp.json().await?;
        Ok(profile)
    }

    /// Download image bytes from a user-supplied URL
    pub async fn download_image(&self, url: &str) -> Result<Vec<u8>, LinkedInError> {
        let resp = self.http.get(url).send().await?;

        if !resp.status().is_success() {
            return Err(LinkedInError::Api {
                status: resp.status().as_u16(),
                body: format!("image download failed for {}", url),
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }

    /// Register an image upload with the asset API. Returns the upload URL
    /// to PUT the bytes to, and the asset URN to reference from the post.
    pub async fn register_upload(
        &self,
        access_token: &str,
        person_id: &str,
    ) -> Result<RegisteredUpload, LinkedInError> {
        let body = serde_json::json!({
            "registerUploadRequest": {
                "recipes": ["urn:li:digitalmediaRecipe:feedshare-image"],
                "owner": format!("urn:li:person:{}", person_id),
                "serviceRelationships": [{
                    "relationshipType": "OWNER",
                    "identifier": "urn:li:userGeneratedContent"
                }]
            }
        });

        let resp = self
            .http
            .post(REGISTER_UPLOAD_URL)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let wrapper: RegisterUploadResponse = resp.json().await?;
        let upload_url = wrapper
            .value
            .upload_mechanism
            .media_upload
            .ok_or_else(|| LinkedInError::Api {
                status: 200,
                body: "registerUpload response missing upload mechanism".to_string(),
            })?
            .upload_url;

        Ok(RegisteredUpload {
            upload_url,
            asset_urn: wrapper.value.asset,
        })
    }

    /// PUT image bytes to a registered upload URL
    pub async fn upload_image(
        &self,
        access_token: &str,
        upload_url: &str,
        data: Vec<u8>,
    ) -> Result<(), LinkedInError> {
        let resp = self
            .http
            .put(upload_url)
            .header("Authorization", format!("Bearer {}", access_token))
            .body(data)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        Ok(())
    }

    /// Create the UGC share. Returns the LinkedIn-assigned post id.
    pub async fn create_ugc_post(
        &self,
        access_token: &str,
        person_id: &str,
        text: &str,
        asset_urns: &[String],
    ) -> Result<String, LinkedInError> {
        let body = build_ugc_payload(person_id, text, asset_urns);

        let resp = self
            .http
            .post(UGC_POSTS_URL)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        // The post id comes back in the body; older API versions only set
        // the X-RestLi-Id header.
        let header_id = resp
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body_id = resp.json::<UgcPostResponse>().await.ok().map(|w| w.id);

        Ok(resolve_post_id(body_id, header_id))
    }

    /// Publish a post: upload whatever images survive, then create the
    /// UGC share. This is the single publish path shared by the primary
    /// and backup cron sweeps.
    pub async fn publish_post(
        &self,
        access_token: &str,
        person_id: &str,
        content: &str,
        image_urls: &[String],
    ) -> Result<String, LinkedInError> {
        let mut asset_urns = Vec::new();

        for url in image_urls {
            match self.upload_one_image(access_token, person_id, url).await {
                Ok(urn) => asset_urns.push(urn),
                Err(e) => {
                    // Post proceeds with the assets that made it.
                    eprintln!("[linkedin] Skipping image {}: {}", url, e);
                }
            }
        }

        self.create_ugc_post(access_token, person_id, content, &asset_urns)
            .await
    }

    /// Download, register, and upload a single image. Returns the asset URN.
    async fn upload_one_image(
        &self,
        access_token: &str,
        person_id: &str,
        url: &str,
    ) -> Result<String, LinkedInError> {
        let data = self.download_image(url).await?;
        let registered = self.register_upload(access_token, person_id).await?;
        self.upload_image(access_token, &registered.upload_url, data)
            .await?;
        Ok(registered.asset_urn)
    }
}

/// Resolve the published post id from a 2xx ugcPosts response: body id
/// first, then the `X-RestLi-Id` header. A 2xx with neither still means the
/// share is live, so the id degrades to a placeholder instead of failing
/// the publish - failing would queue a duplicate attempt.
fn resolve_post_id(body_id: Option<String>, header_id: Option<String>) -> String {
    body_id
        .filter(|id| !id.is_empty())
        .or(header_id)
        .unwrap_or_else(|| {
            eprintln!("[linkedin] ugcPosts returned 2xx without a post id");
            "unknown".to_string()
        })
}

/// Build the UGC share payload. `shareMediaCategory` is IMAGE only when at
/// least one asset upload succeeded.
pub fn build_ugc_payload(person_id: &str, text: &str, asset_urns: &[String]) -> serde_json::Value {
    let media_category = if asset_urns.is_empty() { "NONE" } else { "IMAGE" };

    let media: Vec<serde_json::Value> = asset_urns
        .iter()
        .map(|urn| {
            serde_json::json!({
                "status": "READY",
                "media": urn,
            })
        })
        .collect();

    serde_json::json!({
        "author": format!("urn:li:person:{}", person_id),
        "lifecycleState": "PUBLISHED",
        "specificContent": {
            "com.linkedin.ugc.ShareContent": {
                "shareCommentary": { "text": text },
                "shareMediaCategory": media_category,
                "media": media,
            }
        },
        "visibility": {
            "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
        }
    })
}

async fn api_error(resp: reqwest::Response) -> LinkedInError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    LinkedInError::Api { status, body }
}

fn percent_encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

#[derive(Debug)]
pub struct AuthorizeRequest {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// OIDC userinfo fields this service cares about
#[derive(Debug, Deserialize, Serialize)]
pub struct LinkedInProfile {
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug)]
pub struct RegisteredUpload {
    pub upload_url: String,
    pub asset_urn: String,
}

#[derive(Debug, Deserialize)]
struct RegisterUploadResponse {
    value: RegisterUploadValue,
}

#[derive(Debug, Deserialize)]
struct RegisterUploadValue {
    #[serde(rename = "uploadMechanism")]
    upload_mechanism: UploadMechanism,
    asset: String,
}

#[derive(Debug, Deserialize)]
struct UploadMechanism {
    #[serde(rename = "com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest")]
    media_upload: Option<MediaUploadRequest>,
}

#[derive(Debug, Deserialize)]
struct MediaUploadRequest {
    #[serde(rename = "uploadUrl")]
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct UgcPostResponse {
    #[serde(default)]
    id: String,
}

#[derive(Debug)]
pub enum LinkedInError {
    Http(reqwest::Error),
    Api { status: u16, body: String },
}

impl LinkedInError {
    /// Error taxonomy code recorded on the post document.
    pub fn error_code(&self) -> &'static str {
        match self {
            LinkedInError::Api { .. } => "LINKEDIN_API_ERROR",
            LinkedInError::Http(_) => "POSTING_ERROR",
        }
    }
}

impl From<reqwest::Error> for LinkedInError {
    fn from(e: reqwest::Error) -> Self {
        LinkedInError::Http(e)
    }
}

impl std::fmt::Display for LinkedInError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkedInError::Http(e) => write!(f, "HTTP error: {}", e),
            LinkedInError::Api { status, body } => {
                write!(f, "LinkedIn API error (status {}): {}", status, body)
            }
        }
    }
}

impl std::error::Error for LinkedInError {}

// Database operations

pub async fn save_oauth_state<'e, E>(executor: E, state: &str) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("INSERT INTO oauth_states (state) VALUES ($1)")
        .bind(state)
        .execute(executor)
        .await?;
    Ok(())
}

/// Consume an OAuth state. Atomic DELETE + RETURNING so a state can only be
/// redeemed once even under concurrent callbacks.
pub async fn take_oauth_state<'e, E>(executor: E, state: &str) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        DELETE FROM oauth_states
        WHERE state = $1 AND created_at > NOW() - INTERVAL '10 minutes'
        RETURNING state
        "#,
    )
    .bind(state)
    .fetch_optional(executor)
    .await?;

    Ok(row.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ugc_payload_without_assets_is_text_only() {
        let payload = build_ugc_payload("abc123", "hello world", &[]);

        assert_eq!(payload["author"], "urn:li:person:abc123");
        assert_eq!(payload["lifecycleState"], "PUBLISHED");

        let share = &payload["specificContent"]["com.linkedin.ugc.ShareContent"];
        assert_eq!(share["shareCommentary"]["text"], "hello world");
        assert_eq!(share["shareMediaCategory"], "NONE");
        assert!(share["media"].as_array().unwrap().is_empty());
        assert_eq!(
            payload["visibility"]["com.linkedin.ugc.MemberNetworkVisibility"],
            "PUBLIC"
        );
    }

    #[test]
    fn ugc_payload_with_surviving_assets_is_image_category() {
        // Two images requested, one upload failed: the payload carries the
        // single survivor and still goes out as an IMAGE share.
        let assets = vec!["urn:li:digitalmediaAsset:1".to_string()];
        let payload = build_ugc_payload("abc123", "with pics", &assets);

        let share = &payload["specificContent"]["com.linkedin.ugc.ShareContent"];
        assert_eq!(share["shareMediaCategory"], "IMAGE");

        let media = share["media"].as_array().unwrap();
        assert_eq!(media.len(), 1);
        assert_eq!(media[0]["media"], "urn:li:digitalmediaAsset:1");
        assert_eq!(media[0]["status"], "READY");
    }

    #[test]
    fn post_id_prefers_body_then_header() {
        assert_eq!(
            resolve_post_id(Some("urn:li:share:1".to_string()), Some("urn:li:share:2".to_string())),
            "urn:li:share:1"
        );
        assert_eq!(
            resolve_post_id(Some(String::new()), Some("urn:li:share:2".to_string())),
            "urn:li:share:2"
        );
    }

    #[test]
    fn post_id_degrades_to_placeholder_when_absent() {
        // A 2xx means the share is live even if no id came back; the post
        // must settle as posted rather than be re-attempted.
        assert_eq!(resolve_post_id(None, None), "unknown");
        assert_eq!(resolve_post_id(Some(String::new()), None), "unknown");
    }

    #[test]
    fn error_codes_follow_failure_kind() {
        let api = LinkedInError::Api {
            status: 422,
            body: "bad payload".to_string(),
        };
        assert_eq!(api.error_code(), "LINKEDIN_API_ERROR");
        assert!(api.to_string().contains("422"));
    }
}
