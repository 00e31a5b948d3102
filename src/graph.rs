//! Microsoft Graph client: client-credential token exchange plus the
//! `sendMail` call the dispatcher uses.

use crate::config::Config;
use anyhow::Context as _;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret as _, SecretString};
use std::fmt;
use std::time::Duration;

/// Graph rejects larger `fileAttachment` payloads on `sendMail`.
pub const ATTACHMENT_LIMIT_BYTES: usize = 4 * 1024 * 1024;

static XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub struct GraphClient {
    client: Client,
    tenant_id: String,
    client_id: String,
    client_secret: SecretString,
    sender: String,
    login_base_url: String,
    graph_base_url: String,
}

/// One report email, ready to serialize into Graph's `sendMail` shape.
pub struct OutgoingMail<'a> {
    pub subject: &'a str,
    pub html_body: &'a str,
    pub to: &'a str,
    pub cc: &'a [String],
    pub attachment_name: &'a str,
    pub attachment: &'a [u8],
}

impl GraphClient {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building HTTP client")?;
        Ok(GraphClient {
            client,
            tenant_id: config.tenant_id.clone(),
            client_id: config.client_id.clone(),
            client_secret: SecretString::from(config.client_secret.expose_secret()),
            sender: config.sender_email.clone(),
            login_base_url: config.login_base_url.clone(),
            graph_base_url: config.graph_base_url.clone(),
        })
    }

    /// Exchanges the client credentials for an app-only access token.
    async fn acquire_token(&self) -> Result<String, MailError> {
        #[derive(serde::Serialize)]
        struct TokenForm<'a> {
            client_id: &'a str,
            client_secret: &'a str,
            scope: String,
            grant_type: &'static str,
        }

        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: Option<String>,
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_base_url, self.tenant_id
        );
        let response = self
            .client
            .post(&url)
            .form(&TokenForm {
                client_id: &self.client_id,
                client_secret: self.client_secret.expose_secret(),
                scope: format!("{}/.default", self.graph_base_url),
                grant_type: "client_credentials",
            })
            .send()
            .await
            .map_err(|e| MailError::Auth(anyhow::Error::new(e).context("fail sending token request")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<no body>".into());
            return Err(MailError::Auth(anyhow::anyhow!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MailError::Auth(anyhow::Error::new(e).context("decoding token response")))?;
        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MailError::Auth(anyhow::anyhow!("token response had no access_token")))
    }

    /// Sends one mail from the configured sender mailbox. Acquires a fresh
    /// token per call; at one report a day there is nothing worth caching.
    pub async fn send_mail(&self, mail: &OutgoingMail<'_>) -> Result<(), MailError> {
        let token = self.acquire_token().await?;

        let url = format!("{}/v1.0/users/{}/sendMail", self.graph_base_url, self.sender);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&build_payload(mail))
            .send()
            .await
            .map_err(MailError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<no body>".into());
            return Err(MailError::Delivery { status, body });
        }
        Ok(())
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailRequest<'a> {
    message: Message<'a>,
    save_to_sent_items: bool,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct Message<'a> {
    subject: &'a str,
    body: MessageBody<'a>,
    to_recipients: Vec<Recipient<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc_recipients: Vec<Recipient<'a>>,
    attachments: Vec<Attachment<'a>>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageBody<'a> {
    content_type: &'static str,
    content: &'a str,
}

#[derive(serde::Serialize)]
struct Recipient<'a> {
    #[serde(rename = "emailAddress")]
    email_address: EmailAddress<'a>,
}

#[derive(serde::Serialize)]
struct EmailAddress<'a> {
    address: &'a str,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct Attachment<'a> {
    #[serde(rename = "@odata.type")]
    odata_type: &'static str,
    name: &'a str,
    content_type: &'static str,
    content_bytes: String,
}

fn recipient(address: &str) -> Recipient<'_> {
    Recipient {
        email_address: EmailAddress { address },
    }
}

fn build_payload<'a>(mail: &'a OutgoingMail<'_>) -> SendMailRequest<'a> {
    SendMailRequest {
        message: Message {
            subject: mail.subject,
            body: MessageBody {
                content_type: "HTML",
                content: mail.html_body,
            },
            to_recipients: vec![recipient(mail.to)],
            cc_recipients: mail.cc.iter().map(|cc| recipient(cc)).collect(),
            attachments: vec![Attachment {
                odata_type: "#microsoft.graph.fileAttachment",
                name: mail.attachment_name,
                content_type: XLSX_CONTENT_TYPE,
                content_bytes: BASE64.encode(mail.attachment),
            }],
        },
        save_to_sent_items: true,
    }
}

#[derive(Debug)]
pub enum MailError {
    /// Token acquisition failed, including transport errors on the way to
    /// the login endpoint.
    Auth(anyhow::Error),
    /// The workbook is over what `sendMail` accepts inline.
    AttachmentTooLarge { size: usize },
    /// The message body could not be assembled.
    Compose(anyhow::Error),
    /// Graph accepted the connection but refused the message.
    Delivery { status: StatusCode, body: String },
    /// The `sendMail` request never got an HTTP answer.
    Transport(reqwest::Error),
}

impl std::error::Error for MailError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MailError::Auth(e) | MailError::Compose(e) => Some(e.as_ref()),
            MailError::Transport(e) => Some(e),
            MailError::AttachmentTooLarge { .. } | MailError::Delivery { .. } => None,
        }
    }
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MailError::Auth(e) => write!(f, "access token exchange failed: {:#}", e),
            MailError::AttachmentTooLarge { size } => write!(
                f,
                "attachment is {} bytes, over the {} byte sendMail limit",
                size, ATTACHMENT_LIMIT_BYTES
            ),
            MailError::Compose(e) => write!(f, "assembling report email failed: {:#}", e),
            MailError::Delivery { status, body } => {
                write!(f, "sendMail returned {status}: {body}")
            }
            MailError::Transport(e) => write!(f, "sendMail request failed: {}", e),
        }
    }
}
