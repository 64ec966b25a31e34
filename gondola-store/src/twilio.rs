use async_trait::async_trait;
use gondola_core::payment::ProviderResult;
use gondola_core::sms::SmsSender;
use serde::Deserialize;

/// Twilio Programmable Messaging client.
pub struct TwilioClient {
    http_client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
}

impl TwilioClient {
    pub fn new(api_base: &str, account_sid: &str, auth_token: &str, from_number: &str) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from_number: from_number.to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}/Messages.json", self.api_base, self.account_sid)
    }
}

#[async_trait]
impl SmsSender for TwilioClient {
    async fn send(&self, to: &str, body: &str) -> ProviderResult<()> {
        let form = [("To", to), ("From", self.from_number.as_str()), ("Body", body)];
        let response = self
            .http_client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("Twilio send failed with {}: {}", status, error_body);
            return Err(format!("twilio returned {}", status).into());
        }

        let message: TwilioMessage = response.json().await?;
        tracing::debug!("Twilio accepted message {}", message.sid);
        Ok(())
    }
}
