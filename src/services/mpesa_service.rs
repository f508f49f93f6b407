// services/mpesa_service.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{header, Client, StatusCode};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::{AppConfig, GatewayCredentials, MpesaUrls};
use crate::errors::{AppError, Result};
use crate::services::credentials;
use crate::services::redact::mask_phone;

const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";
const DEFAULT_ACCOUNT_REFERENCE: &str = "Food Order";
const DEFAULT_DESCRIPTION: &str = "Payment for food order";
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
const MAX_TOKEN_TTL_SECS: i64 = 86_400;
const TOKEN_EXPIRY_MARGIN_MINS: i64 = 5;

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<Value>,
}

impl AuthResponse {
    fn ttl_secs(&self) -> i64 {
        let ttl: Option<i64> = match &self.expires_in {
            Some(Value::String(s)) => s.trim().parse().ok(),
            Some(Value::Number(n)) => n.as_i64(),
            _ => None,
        };
        ttl.filter(|secs| (1..=MAX_TOKEN_TTL_SECS).contains(secs))
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS)
    }
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub obtained_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn issued(value: String, ttl_secs: i64, obtained_at: DateTime<Utc>) -> Self {
        let expires_at = ChronoDuration::try_seconds(ttl_secs)
            .and_then(|ttl| obtained_at.checked_add_signed(ttl))
            .unwrap_or(obtained_at);
        AccessToken { value, obtained_at, expires_at }
    }

    fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.obtained_at).num_seconds()
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::minutes(TOKEN_EXPIRY_MARGIN_MINS) < self.expires_at
    }
}

/// Client payload for a push. Amount may arrive as a JSON number or a
/// string of digits.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub amount: Option<i64>,
    #[serde(default)]
    pub account_reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn deserialize_amount<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15)
                    .map(|f| f as i64)
            })
            .map(Some)
            .ok_or_else(|| de::Error::custom("amount must be a whole number")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| de::Error::custom("amount must be a whole number")),
        Some(_) => Err(de::Error::custom("amount must be a whole number")),
    }
}

#[derive(Debug, Serialize)]
pub struct StkPushPayload {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: u64,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

#[derive(Debug, Serialize)]
pub struct StkQueryPayload {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
}

/// Accepted push, as acknowledged by the gateway.
#[derive(Debug, Clone)]
pub struct PushSubmission {
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub phone_number: String,
    pub amount: u64,
    pub account_reference: String,
    pub raw: Value,
}

/// Normalizes a Kenyan mobile number to `2547XXXXXXXX` / `2541XXXXXXXX`.
pub fn normalize_phone(input: &str) -> Result<String> {
    let phone = input.trim();
    let normalized = if let Some(rest) = phone.strip_prefix('0') {
        format!("254{}", rest)
    } else if let Some(rest) = phone.strip_prefix("+254") {
        format!("254{}", rest)
    } else {
        phone.to_string()
    };

    let plausible = normalized.len() == 12
        && normalized.chars().all(|c| c.is_ascii_digit())
        && (normalized.starts_with("2547") || normalized.starts_with("2541"));
    if !plausible {
        return Err(AppError::InvalidPhoneFormat(mask_phone(phone)));
    }
    Ok(normalized)
}

#[derive(Debug, Clone, Copy)]
enum UpstreamCall {
    Submit,
    Query,
}

impl UpstreamCall {
    fn error(self, status: Option<u16>, body: String) -> AppError {
        match self {
            UpstreamCall::Submit => AppError::UpstreamSubmit { status, body },
            UpstreamCall::Query => AppError::UpstreamQuery { status, body },
        }
    }

    fn label(self) -> &'static str {
        match self {
            UpstreamCall::Submit => "stk_push",
            UpstreamCall::Query => "stk_query",
        }
    }
}

pub struct MpesaService {
    credentials: GatewayCredentials,
    urls: MpesaUrls,
    client: Client,
    cache_access_token: bool,
    cached_token: RwLock<Option<AccessToken>>,
}

impl MpesaService {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(MpesaService {
            credentials: config.mpesa.clone(),
            urls: config.mpesa_urls(),
            client,
            cache_access_token: config.cache_access_token,
            cached_token: RwLock::new(None),
        })
    }

    pub fn environment(&self) -> &'static str {
        self.credentials.environment.as_str()
    }

    /// Bearer token for Daraja. Served from cache while it has more than the
    /// safety margin left; fetched otherwise.
    pub async fn get_access_token(&self) -> Result<String> {
        if self.cache_access_token {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                let now = Utc::now();
                if token.is_fresh(now) {
                    return Ok(token.value.clone());
                }
                info!(token_age_secs = token.age_secs(now), "Cached M-Pesa access token near expiry");
            }
        }

        let token = self.fetch_access_token().await?;
        let value = token.value.clone();
        if self.cache_access_token {
            *self.cached_token.write().await = Some(token);
        }
        Ok(value)
    }

    pub async fn invalidate_access_token(&self) {
        *self.cached_token.write().await = None;
    }

    async fn fetch_access_token(&self) -> Result<AccessToken> {
        info!("Requesting new M-Pesa access token");
        let basic = credentials::basic_auth(
            &self.credentials.consumer_key,
            &self.credentials.consumer_secret,
        );

        let response = self
            .client
            .get(&self.urls.auth_url)
            .header(header::AUTHORIZATION, format!("Basic {}", basic))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "M-Pesa auth request failed");
                AppError::UpstreamAuth { status: None, body: e.to_string() }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::UpstreamAuth { status: Some(status.as_u16()), body: e.to_string() })?;

        if !status.is_success() {
            error!(status = status.as_u16(), body = %body, "M-Pesa auth rejected");
            return Err(AppError::UpstreamAuth { status: Some(status.as_u16()), body });
        }

        let auth: AuthResponse = serde_json::from_str(&body).map_err(|e| {
            error!(error = %e, "M-Pesa auth response unreadable");
            AppError::UpstreamAuth { status: Some(status.as_u16()), body: body.clone() }
        })?;

        let ttl_secs = auth.ttl_secs();
        let token = AccessToken::issued(auth.access_token, ttl_secs, Utc::now());
        info!(
            obtained_at = %token.obtained_at,
            expires_at = %token.expires_at,
            "M-Pesa access token obtained"
        );
        Ok(token)
    }

    /// POSTs a bearer-authenticated JSON body. A 401 on a cached token drops
    /// the cache and repeats the call once with a fresh token.
    async fn post_authorized<B, F>(&self, url: &str, build: F, call: UpstreamCall) -> Result<Value>
    where
        B: Serialize,
        F: Fn() -> B,
    {
        let mut refreshed = false;
        loop {
            let access_token = self.get_access_token().await?;
            let payload = build();

            let response = self
                .client
                .post(url)
                .bearer_auth(&access_token)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    error!(call = call.label(), error = %e, "M-Pesa request failed");
                    call.error(None, e.to_string())
                })?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && self.cache_access_token && !refreshed {
                warn!(call = call.label(), "Cached access token rejected, refetching");
                self.invalidate_access_token().await;
                refreshed = true;
                continue;
            }

            let body = response
                .text()
                .await
                .map_err(|e| call.error(Some(status.as_u16()), e.to_string()))?;

            if !status.is_success() {
                error!(call = call.label(), status = status.as_u16(), body = %body, "M-Pesa returned an error");
                return Err(call.error(Some(status.as_u16()), body));
            }

            return serde_json::from_str(&body).map_err(|e| {
                error!(call = call.label(), error = %e, "M-Pesa response is not JSON");
                call.error(Some(status.as_u16()), body.clone())
            });
        }
    }

    // C2B: Customer to Business
    pub async fn submit(&self, request: &PushRequest) -> Result<PushSubmission> {
        let (phone, amount) = match (
            request.phone_number.as_deref().map(str::trim).filter(|p| !p.is_empty()),
            request.amount,
        ) {
            (Some(phone), Some(amount)) => (phone, amount),
            _ => return Err(AppError::invalid_data("Phone number and amount are required")),
        };
        if amount <= 0 {
            return Err(AppError::invalid_data("Amount must be greater than 0"));
        }
        let amount = amount as u64;

        let phone = normalize_phone(phone)?;
        let account_reference = non_blank(request.account_reference.as_deref())
            .unwrap_or(DEFAULT_ACCOUNT_REFERENCE)
            .to_string();
        let description = non_blank(request.description.as_deref())
            .unwrap_or(DEFAULT_DESCRIPTION)
            .to_string();

        info!(phone = %mask_phone(&phone), amount, account_reference = %account_reference, "Initiating STK push");

        let build = || {
            let timestamp = credentials::timestamp();
            StkPushPayload {
                business_short_code: self.credentials.short_code.clone(),
                password: credentials::password(
                    &self.credentials.short_code,
                    &self.credentials.pass_key,
                    &timestamp,
                ),
                timestamp,
                transaction_type: TRANSACTION_TYPE.to_string(),
                amount,
                party_a: phone.clone(),
                party_b: self.credentials.short_code.clone(),
                phone_number: phone.clone(),
                callback_url: self.credentials.callback_url.clone(),
                account_reference: account_reference.clone(),
                transaction_desc: description.clone(),
            }
        };

        let raw = self
            .post_authorized(&self.urls.stk_push_url, build, UpstreamCall::Submit)
            .await?;

        let checkout_request_id = raw
            .get("CheckoutRequestID")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::UpstreamSubmit { status: None, body: raw.to_string() })?;
        let merchant_request_id = raw
            .get("MerchantRequestID")
            .and_then(Value::as_str)
            .map(str::to_string);

        info!(checkout_request_id = %checkout_request_id, "STK push accepted");
        Ok(PushSubmission {
            checkout_request_id,
            merchant_request_id,
            phone_number: phone,
            amount,
            account_reference,
            raw,
        })
    }

    /// Asks the gateway directly about a push. The response is returned as-is.
    pub async fn query_status(&self, checkout_request_id: &str) -> Result<Value> {
        let checkout_request_id = checkout_request_id.trim();
        if checkout_request_id.is_empty() {
            return Err(AppError::invalid_data("CheckoutRequestID is required"));
        }

        info!(checkout_request_id, "Querying STK push status");

        let build = || {
            let timestamp = credentials::timestamp();
            StkQueryPayload {
                business_short_code: self.credentials.short_code.clone(),
                password: credentials::password(
                    &self.credentials.short_code,
                    &self.credentials.pass_key,
                    &timestamp,
                ),
                timestamp,
                checkout_request_id: checkout_request_id.to_string(),
            }
        };

        self.post_authorized(&self.urls.stk_query_url, build, UpstreamCall::Query)
            .await
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
