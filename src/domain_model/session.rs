use std::fmt;

/// Derived from what is persisted plus whether a refresh is running. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    Valid,
    NearExpiry,
    Expired,
    Refreshing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::NoSession => "no-session",
            SessionState::Valid => "valid",
            SessionState::NearExpiry => "near-expiry",
            SessionState::Expired => "expired",
            SessionState::Refreshing => "refreshing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    LoggedOut,
    RefreshFailed,
    MissingAccessToken,
}

/// Broadcast to subscribers. `Cleared` means the UI has to send the user to login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Established,
    Refreshed,
    Cleared(ClearReason),
}
