use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;


/// Identifies one transport connection for as long as it stays open.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ConnectionId(u64);
impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}
impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}


/// Principals of the connections that completed the NTLM handshake.
///
/// NTLM authenticates the connection, not the request, so entries live as long
/// as the connection does.
#[derive(Debug, Default)]
pub struct ConnectionAuthState {
    principals: Mutex<HashMap<ConnectionId, String>>,
}
impl ConnectionAuthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self, conn_id: ConnectionId) -> bool {
        self.principals.lock().contains_key(&conn_id)
    }

    pub fn principal(&self, conn_id: ConnectionId) -> Option<String> {
        self.principals.lock().get(&conn_id).cloned()
    }

    pub fn mark_authenticated(&self, conn_id: ConnectionId, principal: String) {
        self.principals.lock().insert(conn_id, principal);
    }

    /// Drops the entry of a connection that has been closed.
    pub fn forget(&self, conn_id: ConnectionId) -> Option<String> {
        self.principals.lock().remove(&conn_id)
    }

    pub fn len(&self) -> usize {
        self.principals.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.lock().is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connections_are_tracked_separately() {
        let state = ConnectionAuthState::new();
        let first = ConnectionId::new(1);
        let second = ConnectionId::new(2);

        assert!(!state.is_authenticated(first));
        assert_eq!(state.principal(first), None);

        state.mark_authenticated(first, "test.user".to_owned());
        assert!(state.is_authenticated(first));
        assert_eq!(state.principal(first).as_deref(), Some("test.user"));
        assert!(!state.is_authenticated(second));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn last_write_wins() {
        let state = ConnectionAuthState::new();
        let conn = ConnectionId::new(7);

        state.mark_authenticated(conn, "first".to_owned());
        state.mark_authenticated(conn, "second".to_owned());
        assert_eq!(state.principal(conn).as_deref(), Some("second"));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn forgetting_a_connection_clears_it() {
        let state = ConnectionAuthState::new();
        let conn = ConnectionId::new(3);

        state.mark_authenticated(conn, "test.user".to_owned());
        assert_eq!(state.forget(conn).as_deref(), Some("test.user"));
        assert!(!state.is_authenticated(conn));
        assert!(state.is_empty());
        assert_eq!(state.forget(conn), None);
    }
}
