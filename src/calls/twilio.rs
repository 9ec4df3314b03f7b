//! Twilio implementation of the telephony gateway.
//!
//! Places calls through the REST API with inline TwiML — the script body
//! is spoken by Twilio's `<Say>` verb, so no media hosting is needed.
//! Status reconciliation fetches the call resource by SID.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::calls::gateway::{GatewayCallStatus, PlacedCall, TelephonyGateway};
use crate::calls::types::CallScript;
use crate::error::CallError;

const DEFAULT_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Twilio credentials and knobs, usually read from the environment.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// E.164 caller id the account owns.
    pub from_number: String,
    /// Override for tests; defaults to the public API.
    pub api_base: String,
    pub request_timeout: Duration,
}

impl TwilioConfig {
    /// Build from `TWILIO_ACCOUNT_SID` / `TWILIO_AUTH_TOKEN` /
    /// `TWILIO_FROM_NUMBER`. Returns `None` when any of them is missing —
    /// the single place telephony credentials are checked.
    pub fn from_env() -> Option<Self> {
        let account_sid = std::env::var("TWILIO_ACCOUNT_SID").ok()?;
        let auth_token = std::env::var("TWILIO_AUTH_TOKEN").ok()?;
        let from_number = std::env::var("TWILIO_FROM_NUMBER").ok()?;
        Some(Self {
            account_sid,
            auth_token: SecretString::from(auth_token),
            from_number,
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(15),
        })
    }
}

/// Twilio REST gateway.
pub struct TwilioGateway {
    config: TwilioConfig,
    http: reqwest::Client,
}

impl TwilioGateway {
    pub fn new(config: TwilioConfig) -> Result<Self, CallError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CallError::Unreachable {
                name: "twilio".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { config, http })
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Calls.json",
            self.config.api_base, self.config.account_sid
        )
    }

    fn call_url(&self, sid: &str) -> String {
        format!(
            "{}/Accounts/{}/Calls/{}.json",
            self.config.api_base, self.config.account_sid, sid
        )
    }
}

/// Call resource fields we care about.
#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    status: String,
}

#[async_trait]
impl TelephonyGateway for TwilioGateway {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn place_call(
        &self,
        to_number: &str,
        script: &CallScript,
        voice_id: Option<&str>,
    ) -> Result<PlacedCall, CallError> {
        let twiml = build_twiml(&script.body, voice_id);
        debug!(to = %to_number, call_type = %script.call_type, "Submitting call to Twilio");

        let response = self
            .http
            .post(self.calls_url())
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .form(&[
                ("To", to_number),
                ("From", self.config.from_number.as_str()),
                ("Twiml", twiml.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CallError::Unreachable {
                name: "twilio".into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Rejected {
                name: "twilio".into(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let resource: CallResource =
            response.json().await.map_err(|e| CallError::Rejected {
                name: "twilio".into(),
                reason: format!("unparseable call resource: {e}"),
            })?;

        info!(sid = %resource.sid, status = %resource.status, "Call submitted");
        Ok(PlacedCall {
            provider_call_id: resource.sid,
            status: GatewayCallStatus::from_provider(&resource.status),
        })
    }

    async fn call_status(&self, provider_call_id: &str) -> Result<GatewayCallStatus, CallError> {
        let response = self
            .http
            .get(self.call_url(provider_call_id))
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| CallError::Unreachable {
                name: "twilio".into(),
                reason: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CallError::UnknownCall(provider_call_id.to_string()));
        }
        let status = response.status();
        if !status.is_success() {
            return Err(CallError::Rejected {
                name: "twilio".into(),
                reason: format!("status fetch returned HTTP {status}"),
            });
        }

        let resource: CallResource =
            response.json().await.map_err(|e| CallError::Rejected {
                name: "twilio".into(),
                reason: format!("unparseable call resource: {e}"),
            })?;

        Ok(GatewayCallStatus::from_provider(&resource.status))
    }
}

/// Inline TwiML that reads the script aloud.
fn build_twiml(body: &str, voice_id: Option<&str>) -> String {
    let voice = voice_id.unwrap_or("Polly.Joanna");
    format!(
        "<Response><Say voice=\"{}\">{}</Say></Response>",
        xml_escape(voice),
        xml_escape(body)
    )
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twiml_wraps_script_in_say() {
        let twiml = build_twiml("Good morning! You have 3 newsletters.", None);
        assert!(twiml.starts_with("<Response><Say"));
        assert!(twiml.contains("Polly.Joanna"));
        assert!(twiml.contains("3 newsletters"));
        assert!(twiml.ends_with("</Say></Response>"));
    }

    #[test]
    fn twiml_respects_voice_override() {
        let twiml = build_twiml("Hello", Some("Polly.Matthew"));
        assert!(twiml.contains("Polly.Matthew"));
    }

    #[test]
    fn twiml_escapes_markup() {
        let twiml = build_twiml("Subject: \"<review> & sign-off\"", None);
        assert!(twiml.contains("&lt;review&gt; &amp; sign-off"));
        assert!(!twiml.contains("<review>"));
    }

    #[test]
    fn urls_embed_account_sid() {
        let gateway = TwilioGateway::new(TwilioConfig {
            account_sid: "AC123".into(),
            auth_token: SecretString::from("token"),
            from_number: "+15550001111".into(),
            api_base: "https://api.twilio.com/2010-04-01".into(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap();
        assert_eq!(
            gateway.calls_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls.json"
        );
        assert_eq!(
            gateway.call_url("CA9"),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls/CA9.json"
        );
    }
}
