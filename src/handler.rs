use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::prelude::BASE64_STANDARD;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use http::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use http_body_util::Full;
use log::{debug, error, info, warn};
use rand::Rng;
use rand::rngs::OsRng;

use crate::flags::NtlmFlags;
use crate::ntlm::{
    NtlmMessageType, NtlmParsingError, NtlmStoringError, decode_authenticate, decode_header,
    decode_negotiate, encode_challenge,
};
use crate::state::{ConnectionAuthState, ConnectionId};


const NTLM_SCHEME: &str = "NTLM";

/// Flags offered in every challenge.
const CHALLENGE_FLAGS: [&str; 3] = ["request_target", "negotiate_ntlm", "negotiate_always_sign"];

/// Clients differ in whether they pad the header payload.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Server challenge the test vectors were computed against.
pub const TEST_SERVER_CHALLENGE: [u8; 8] = [0x5C, 0xE3, 0x6B, 0xAA, 0x9C, 0x55, 0x51, 0xDB];

/// NTLMv1 LM response for the password `shegalkin` and [`TEST_SERVER_CHALLENGE`].
pub const TEST_LM_RESPONSE: [u8; 24] = [
    0xC9, 0xA4, 0x26, 0xAA, 0x3D, 0x86, 0x33, 0x9C,
    0x39, 0x7A, 0xEA, 0x15, 0x6F, 0x96, 0x15, 0x91,
    0x8C, 0xEE, 0x4C, 0x52, 0xE6, 0x97, 0x7F, 0x4D,
];

/// NTLMv1 NT response for the password `shegalkin` and [`TEST_SERVER_CHALLENGE`].
pub const TEST_NT_RESPONSE: [u8; 24] = [
    0x36, 0x05, 0x13, 0x1E, 0x5F, 0xE0, 0x3D, 0xEF,
    0x7E, 0x16, 0xB6, 0xFA, 0x1A, 0x8B, 0x03, 0xAB,
    0x57, 0xD6, 0xD5, 0x7C, 0xE8, 0x29, 0x9E, 0xB4,
];


/// Request extension carrying the name of the authenticated user.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RemoteUser(pub String);

/// What the client proved in its authenticate message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Credentials<'a> {
    pub user_name: &'a str,
    pub domain_name: &'a str,
    pub lm_response: &'a [u8],
    pub nt_response: &'a [u8],
}

/// Decides whether a user may log in once the challenge responses have been accepted.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credentials: &Credentials<'_>) -> bool;
}
impl<F> Authenticator for F
where
    F: Fn(&Credentials<'_>) -> bool + Send + Sync,
{
    fn authenticate(&self, credentials: &Credentials<'_>) -> bool {
        self(credentials)
    }
}

/// The application served to authenticated connections.
pub trait Application: Send + Sync {
    fn call(&self, request: Request<Bytes>) -> Response<Full<Bytes>>;
}
impl<F> Application for F
where
    F: Fn(Request<Bytes>) -> Response<Full<Bytes>> + Send + Sync,
{
    fn call(&self, request: Request<Bytes>) -> Response<Full<Bytes>> {
        self(request)
    }
}

/// Answers every request with the name of the authenticated user.
#[derive(Clone, Copy, Debug, Default)]
pub struct WhoAmI;
impl Application for WhoAmI {
    fn call(&self, request: Request<Bytes>) -> Response<Full<Bytes>> {
        let principal = request.extensions()
            .get::<RemoteUser>()
            .map(|user| user.0.as_str())
            .unwrap_or("");
        let mut response = Response::new(Full::new(Bytes::from(format!("{}\n", principal))));
        response.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        response
    }
}


#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ChallengeSource {
    /// A fresh nonce from the OS RNG for every negotiate message.
    #[default]
    Random,
    Fixed([u8; 8]),
}
impl ChallengeSource {
    pub fn next_challenge(&self) -> [u8; 8] {
        match self {
            Self::Random => {
                let mut challenge = [0u8; 8];
                OsRng.fill(&mut challenge);
                challenge
            },
            Self::Fixed(challenge) => *challenge,
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct HandshakeSettings {
    /// Sent as the target name of every challenge.
    pub target_name: String,
    pub challenge: ChallengeSource,
    pub expected_lm_response: Vec<u8>,
    pub expected_nt_response: Vec<u8>,
}
impl HandshakeSettings {
    /// Random challenges; responses are checked against the `shegalkin` test vectors.
    pub fn new<T: Into<String>>(target_name: T) -> Self {
        Self {
            target_name: target_name.into(),
            challenge: ChallengeSource::Random,
            expected_lm_response: Vec::from(TEST_LM_RESPONSE),
            expected_nt_response: Vec::from(TEST_NT_RESPONSE),
        }
    }
}


#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthError {
    MissingCredentials,
    MalformedAuthorization,
    MalformedMessage(NtlmParsingError),
    UnsupportedMessageType(u32),
    AuthenticationRejected,
    Internal(String),
}
impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredentials|Self::AuthenticationRejected
                => StatusCode::UNAUTHORIZED,
            Self::MalformedAuthorization|Self::MalformedMessage(_)|Self::UnsupportedMessageType(_)
                => StatusCode::BAD_REQUEST,
            Self::Internal(_)
                => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_response(&self) -> Response<Full<Bytes>> {
        match self {
            // an empty challenge invites the client to start negotiating
            Self::MissingCredentials => unauthorized(Some(HeaderValue::from_static(NTLM_SCHEME))),
            Self::AuthenticationRejected => unauthorized(None),
            other => empty_response(other.status()),
        }
    }
}
impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredentials
                => write!(f, "no Authorization header"),
            Self::MalformedAuthorization
                => write!(f, "Authorization header does not use the NTLM scheme"),
            Self::MalformedMessage(e)
                => write!(f, "malformed NTLM message: {}", e),
            Self::UnsupportedMessageType(t)
                => write!(f, "unsupported NTLM message type {}", t),
            Self::AuthenticationRejected
                => write!(f, "authentication rejected"),
            Self::Internal(message)
                => write!(f, "internal error: {}", message),
        }
    }
}
impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MalformedMessage(e) => Some(e),
            _ => None,
        }
    }
}
impl From<NtlmParsingError> for AuthError {
    fn from(e: NtlmParsingError) -> Self {
        Self::MalformedMessage(e)
    }
}
impl From<NtlmStoringError> for AuthError {
    fn from(e: NtlmStoringError) -> Self {
        Self::Internal(format!("failed to encode challenge: {}", e))
    }
}


pub(crate) fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

fn unauthorized(challenge: Option<HeaderValue>) -> Response<Full<Bytes>> {
    let mut response = empty_response(StatusCode::UNAUTHORIZED);
    if let Some(challenge) = challenge {
        response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
    }
    response
}

/// Extracts the binary NTLM message from an `Authorization: NTLM <base64>` header.
fn ntlm_payload(headers: &HeaderMap) -> Result<Vec<u8>, AuthError> {
    let value = headers.get(AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .or(Err(AuthError::MalformedAuthorization))?
        .trim();
    let (scheme, payload) = value.split_once(' ')
        .unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case(NTLM_SCHEME) {
        return Err(AuthError::MalformedAuthorization);
    }
    LENIENT_BASE64.decode(payload.trim())
        .map_err(|e| AuthError::MalformedMessage(NtlmParsingError::InvalidBase64(e)))
}


enum Handshake {
    Challenge(HeaderValue),
    Authenticated(String),
}


/// Connection-oriented NTLM authentication in front of an [`Application`].
pub struct NtlmHandler<A, D> {
    settings: HandshakeSettings,
    authenticator: A,
    application: D,
    state: Arc<ConnectionAuthState>,
}
impl<A: Authenticator, D: Application> NtlmHandler<A, D> {
    pub fn new(settings: HandshakeSettings, authenticator: A, application: D) -> Self {
        Self {
            settings,
            authenticator,
            application,
            state: Arc::new(ConnectionAuthState::new()),
        }
    }

    pub fn settings(&self) -> &HandshakeSettings {
        &self.settings
    }

    pub fn state(&self) -> &Arc<ConnectionAuthState> {
        &self.state
    }

    /// Serves one request arriving on `conn_id`.
    ///
    /// Connections that completed the handshake are forwarded without looking at
    /// the Authorization header; all others go through the handshake, and every
    /// failure is turned into a response.
    pub fn handle(&self, request: Request<Bytes>, conn_id: ConnectionId) -> Response<Full<Bytes>> {
        if let Some(principal) = self.state.principal(conn_id) {
            return self.forward(request, principal);
        }

        match self.handshake(request.headers(), conn_id) {
            Ok(Handshake::Challenge(challenge)) => unauthorized(Some(challenge)),
            Ok(Handshake::Authenticated(principal)) => {
                self.state.mark_authenticated(conn_id, principal.clone());
                self.forward(request, principal)
            },
            Err(e) => {
                match &e {
                    AuthError::MissingCredentials => debug!("{}: {}; requesting NTLM", conn_id, e),
                    AuthError::AuthenticationRejected => warn!("{}: {}", conn_id, e),
                    AuthError::Internal(_) => error!("{}: {}", conn_id, e),
                    _ => info!("{}: rejecting request: {}", conn_id, e),
                }
                e.to_response()
            },
        }
    }

    fn handshake(&self, headers: &HeaderMap, conn_id: ConnectionId) -> Result<Handshake, AuthError> {
        let message = ntlm_payload(headers)?;
        let header = decode_header(&message)?;
        match header.message_type {
            NtlmMessageType::Negotiate
                => self.challenge(&message, conn_id).map(Handshake::Challenge),
            NtlmMessageType::Authenticate
                => self.validate(&message, conn_id).map(Handshake::Authenticated),
            other
                => Err(AuthError::UnsupportedMessageType(other.into())),
        }
    }

    fn challenge(&self, message: &[u8], conn_id: ConnectionId) -> Result<HeaderValue, AuthError> {
        // the negotiate body is informational only
        match decode_negotiate(message) {
            Ok(negotiate) => debug!(
                "{}: negotiate from {:?} (domain {:?}) with flags {:?}",
                conn_id, negotiate.supplied_workstation, negotiate.supplied_domain,
                negotiate.flags.set_codes().collect::<Vec<_>>(),
            ),
            Err(e) => debug!("{}: ignoring undecodable negotiate body: {}", conn_id, e),
        }

        let flags = NtlmFlags::from_names(CHALLENGE_FLAGS);
        let server_challenge = self.settings.challenge.next_challenge();
        let challenge_bytes = encode_challenge(self.settings.target_name.as_bytes(), server_challenge, flags)?;
        let header = format!("{} {}", NTLM_SCHEME, BASE64_STANDARD.encode(&challenge_bytes));
        debug!("{}: sending challenge {:02x?}", conn_id, server_challenge);

        HeaderValue::try_from(header)
            .map_err(|e| AuthError::Internal(format!("challenge header: {}", e)))
    }

    fn validate(&self, message: &[u8], conn_id: ConnectionId) -> Result<String, AuthError> {
        let auth = decode_authenticate(message)?;
        let credentials = Credentials {
            user_name: &auth.user_name,
            domain_name: &auth.domain_name,
            lm_response: &auth.lm_response,
            nt_response: &auth.nt_response,
        };

        let valid = auth.lm_response == self.settings.expected_lm_response
            && auth.nt_response == self.settings.expected_nt_response
            && self.authenticator.authenticate(&credentials);
        if !valid {
            debug!(
                "{}: rejected {:?} in domain {:?} from {:?}",
                conn_id, auth.user_name, auth.domain_name, auth.workstation_name,
            );
            return Err(AuthError::AuthenticationRejected);
        }

        info!(
            "{}: authenticated {:?} in domain {:?} from {:?}",
            conn_id, auth.user_name, auth.domain_name, auth.workstation_name,
        );
        Ok(auth.user_name)
    }

    fn forward(&self, mut request: Request<Bytes>, principal: String) -> Response<Full<Bytes>> {
        request.extensions_mut().insert(RemoteUser(principal));
        self.application.call(request)
    }
}
