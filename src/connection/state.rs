use std::fmt;

/// Connection lifecycle (`spec.md` §4.4: "new → authenticating → hello-sent
/// → ready → (any) → closed").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Authenticating,
    HelloSent,
    Ready,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::HelloSent => "hello-sent",
            ConnectionState::Ready => "ready",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
