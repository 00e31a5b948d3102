//! Runtime configuration, read once from the environment at startup.

use crate::report::MalformedPolicy;
use secrecy::SecretString;
use std::env;
use std::fmt;
use url::Url;

static DEFAULT_REPORT_NAME: &str = "Job Postings Report";
static DEFAULT_LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";
static DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com";

/// Everything the pipeline needs, validated up front so a misconfigured
/// deployment fails before any query or email is attempted.
pub struct Config {
    /// Azure AD tenant the client credentials belong to.
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
    /// Mailbox the report is sent from. Must be licensed for Graph sendMail.
    pub sender_email: String,
    pub recipient_email: String,
    /// Optional CC list, comma-separated in the environment.
    pub cc_recipients: Vec<String>,
    pub database_url: String,
    /// Leading part of the email subject line.
    pub report_name: String,
    /// What to do with rows that fail validation.
    pub on_malformed: MalformedPolicy,
    /// Overridable in tests to point at a local server.
    pub login_base_url: String,
    pub graph_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Ok(Config {
            tenant_id: require("AZURE_TENANT_ID")?,
            client_id: require("AZURE_CLIENT_ID")?,
            client_secret: SecretString::from(require("AZURE_CLIENT_SECRET")?),
            sender_email: require("SENDER_EMAIL")?,
            recipient_email: require("RECIPIENT_EMAIL")?,
            cc_recipients: env::var("CC_EMAIL_RECIPIENTS")
                .map(|raw| parse_address_list(&raw))
                .unwrap_or_default(),
            database_url: require("DATABASE_URL")?,
            report_name: env::var("REPORT_NAME").unwrap_or_else(|_| DEFAULT_REPORT_NAME.into()),
            on_malformed: match env::var("REPORT_ON_MALFORMED") {
                Ok(raw) => raw.parse().map_err(|reason| ConfigError::InvalidVar {
                    name: "REPORT_ON_MALFORMED",
                    reason,
                })?,
                Err(_) => MalformedPolicy::Skip,
            },
            login_base_url: base_url("LOGIN_BASE_URL", DEFAULT_LOGIN_BASE_URL)?,
            graph_base_url: base_url("GRAPH_BASE_URL", DEFAULT_GRAPH_BASE_URL)?,
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    // An empty value is as useless as an absent one.
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

fn base_url(name: &'static str, default: &str) -> Result<String, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.into());
    let url = Url::parse(&raw).map_err(|e| ConfigError::InvalidVar {
        name,
        reason: e.to_string(),
    })?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn parse_address_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|address| address.trim())
        .filter(|address| !address.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidVar {
        name: &'static str,
        reason: String,
    },
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::MissingVar(name) => {
                write!(f, "missing required environment variable `{}`", name)
            }
            ConfigError::InvalidVar { name, reason } => {
                write!(f, "invalid value for `{}`: {}", name, reason)
            }
        }
    }
}
