use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::Path;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::{Deserialize, Serialize};

use crate::handler::{Authenticator, ChallengeSource, Credentials, HandshakeSettings};


#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Config {
    pub listen_address: SocketAddr,
    pub domain: String,
    pub users: Vec<User>,
    #[serde(default)]
    pub ntlm: NtlmConfig,
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct User {
    pub user: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Overrides for the handshake; binary values are base64.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct NtlmConfig {
    /// Defaults to the domain.
    pub target_name: Option<String>,
    /// Pins the server challenge; without it every challenge is random.
    pub server_challenge: Option<String>,
    pub lm_response: Option<String>,
    pub nt_response: Option<String>,
}


#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Toml(toml::de::Error),
    Base64{ key: &'static str, error: base64::DecodeError },
    ChallengeLength{ obtained: usize },
}
impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e)
                => write!(f, "failed to read configuration: {}", e),
            Self::Toml(e)
                => write!(f, "failed to parse configuration: {}", e),
            Self::Base64{ key, error }
                => write!(f, "ntlm.{} is not valid base64: {}", key, error),
            Self::ChallengeLength{ obtained }
                => write!(f, "ntlm.server_challenge must be 8 bytes long, not {}", obtained),
        }
    }
}
impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Toml(e) => Some(e),
            Self::Base64{ error, .. } => Some(error),
            Self::ChallengeLength{ .. } => None,
        }
    }
}
impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}


fn decode_base64(key: &'static str, value: &str) -> Result<Vec<u8>, ConfigError> {
    BASE64_STANDARD.decode(value.trim())
        .map_err(|error| ConfigError::Base64{ key, error })
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_string = fs::read_to_string(path)?;
        Self::from_toml_str(&config_string)
    }

    pub fn from_toml_str(config_string: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(config_string)?)
    }

    pub fn handshake_settings(&self) -> Result<HandshakeSettings, ConfigError> {
        let target_name = self.ntlm.target_name.as_ref()
            .unwrap_or(&self.domain);
        let mut settings = HandshakeSettings::new(target_name.as_str());

        if let Some(challenge_b64) = &self.ntlm.server_challenge {
            let challenge_bytes = decode_base64("server_challenge", challenge_b64)?;
            let challenge: [u8; 8] = challenge_bytes.as_slice()
                .try_into()
                .or(Err(ConfigError::ChallengeLength{ obtained: challenge_bytes.len() }))?;
            settings.challenge = ChallengeSource::Fixed(challenge);
        }
        if let Some(lm_b64) = &self.ntlm.lm_response {
            settings.expected_lm_response = decode_base64("lm_response", lm_b64)?;
        }
        if let Some(nt_b64) = &self.ntlm.nt_response {
            settings.expected_nt_response = decode_base64("nt_response", nt_b64)?;
        }

        Ok(settings)
    }
}


/// Accepts the configured users, provided they log into the configured domain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigAuthenticator {
    domain: String,
    users: HashSet<String>,
}
impl ConfigAuthenticator {
    pub fn new<D: Into<String>, I: IntoIterator<Item = String>>(domain: D, users: I) -> Self {
        Self {
            domain: domain.into(),
            users: users.into_iter().collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.domain.clone(),
            config.users.iter().map(|u| u.user.clone()),
        )
    }
}
impl Authenticator for ConfigAuthenticator {
    fn authenticate(&self, credentials: &Credentials<'_>) -> bool {
        credentials.domain_name.to_lowercase() == self.domain.to_lowercase()
            && self.users.contains(credentials.user_name)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{TEST_LM_RESPONSE, TEST_NT_RESPONSE, TEST_SERVER_CHALLENGE};

    const MINIMAL: &str = r#"
listen_address = "127.0.0.1:3000"
domain = "EXAMPLE"

[[users]]
user = "test.user"
email = "test.user@example.com"

[[users]]
user = "other.user"
"#;

    fn credentials<'a>(user_name: &'a str, domain_name: &'a str) -> Credentials<'a> {
        Credentials {
            user_name,
            domain_name,
            lm_response: &TEST_LM_RESPONSE,
            nt_response: &TEST_NT_RESPONSE,
        }
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.users[0].email.as_deref(), Some("test.user@example.com"));
        assert_eq!(config.ntlm, NtlmConfig::default());

        let settings = config.handshake_settings().unwrap();
        assert_eq!(settings, HandshakeSettings::new("EXAMPLE"));
        assert_eq!(settings.challenge, ChallengeSource::Random);
    }

    #[test]
    fn ntlm_overrides_are_decoded() {
        let config_string = format!(
            "{}\n[ntlm]\ntarget_name = \"MOCK\"\nserver_challenge = \"XONrqpxVUds=\"\nlm_response = \"AQID\"\nnt_response = \"BAUG\"\n",
            MINIMAL,
        );
        let settings = Config::from_toml_str(&config_string).unwrap()
            .handshake_settings().unwrap();

        assert_eq!(settings.target_name, "MOCK");
        assert_eq!(settings.challenge, ChallengeSource::Fixed(TEST_SERVER_CHALLENGE));
        assert_eq!(settings.expected_lm_response, vec![1, 2, 3]);
        assert_eq!(settings.expected_nt_response, vec![4, 5, 6]);
    }

    #[test]
    fn bad_overrides_are_reported() {
        let config_string = format!("{}\n[ntlm]\nserver_challenge = \"AQID\"\n", MINIMAL);
        let config = Config::from_toml_str(&config_string).unwrap();
        assert!(matches!(config.handshake_settings(), Err(ConfigError::ChallengeLength{ obtained: 3 })));

        let config_string = format!("{}\n[ntlm]\nlm_response = \"not base64!\"\n", MINIMAL);
        let config = Config::from_toml_str(&config_string).unwrap();
        assert!(matches!(config.handshake_settings(), Err(ConfigError::Base64{ key: "lm_response", .. })));

        assert!(matches!(Config::from_toml_str("domain = 3"), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn authenticator_checks_domain_and_user() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        let authenticator = ConfigAuthenticator::from_config(&config);

        assert!(authenticator.authenticate(&credentials("test.user", "EXAMPLE")));
        assert!(authenticator.authenticate(&credentials("other.user", "example")));
        assert!(!authenticator.authenticate(&credentials("missing.user", "EXAMPLE")));
        assert!(!authenticator.authenticate(&credentials("test.user", "INVALID")));
    }
}
