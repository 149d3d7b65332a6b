//! A mock Exchange endpoint guard speaking connection-oriented NTLM over HTTP.
//!
//! [`NtlmHandler`](handler::NtlmHandler) runs the negotiate/challenge/authenticate
//! handshake once per transport connection and forwards the requests of
//! authenticated connections to an [`Application`](handler::Application).

pub mod flags;
pub mod handler;
pub mod model;
pub mod ntlm;
pub mod server;
pub mod state;


pub use crate::flags::NtlmFlags;
pub use crate::handler::{
    Application, AuthError, Authenticator, ChallengeSource, Credentials, HandshakeSettings,
    NtlmHandler, RemoteUser, WhoAmI,
};
pub use crate::model::{Config, ConfigAuthenticator, ConfigError};
pub use crate::server::Server;
pub use crate::state::{ConnectionAuthState, ConnectionId};
