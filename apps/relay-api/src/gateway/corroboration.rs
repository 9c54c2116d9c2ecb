//! Decides whether a connection attempt produced a live session.
//!
//! The platform client's `connect` result is unreliable in both directions: it
//! can resolve for a room that never streams and reject for a room that is
//! streaming fine. [`Corroborator`] folds everything observed during an
//! attempt into a [`Verdict`]. It holds no timers; the session worker owns the
//! deadlines and reports them as inputs.

use std::fmt;
use std::str::FromStr;

/// Substrings (matched case-insensitively) that mark an error as "the room is
/// not streaming" rather than a transient glitch.
const CRITICAL_PATTERNS: &[&str] = &[
    "not found",
    "notfound",
    "roomid",
    "room id",
    "offline",
    "no live",
    "not live",
];

const TIMEOUT_PATTERNS: &[&str] = &["timeout", "timed out"];
const NETWORK_PATTERNS: &[&str] = &["network", "fetch", "econn", "dns", "connection refused"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorroborationPolicy {
    /// Non-critical errors and an unconfirmed connect still yield `Live`.
    #[default]
    Permissive,
    /// `Live` requires observed traffic or the platform's own confirmation.
    Strict,
}

impl FromStr for CorroborationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(Self::Permissive),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown corroboration policy '{other}'")),
        }
    }
}

impl fmt::Display for CorroborationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permissive => f.write_str("permissive"),
            Self::Strict => f.write_str("strict"),
        }
    }
}

/// Why a start attempt did not produce a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotLive,
    TimedOut,
    Network,
    Unknown,
    Cancelled,
}

impl FailureKind {
    /// Best-effort classification of free-form error text.
    pub fn classify(raw: &str) -> Self {
        let text = raw.to_lowercase();
        if is_critical(&text) {
            Self::NotLive
        } else if TIMEOUT_PATTERNS.iter().any(|p| text.contains(p)) {
            Self::TimedOut
        } else if NETWORK_PATTERNS.iter().any(|p| text.contains(p)) {
            Self::Network
        } else {
            Self::Unknown
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotLive => "NOT_LIVE",
            Self::TimedOut => "TIMED_OUT",
            Self::Network => "NETWORK_ERROR",
            Self::Unknown => "UPSTREAM_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn user_message(&self, username: &str) -> String {
        match self {
            Self::NotLive => format!("@{username} is not live right now"),
            Self::TimedOut => format!("Timed out connecting to @{username}'s live stream"),
            Self::Network => format!("Network problem while connecting to @{username}"),
            Self::Unknown => format!("Could not connect to @{username}: unknown error"),
            Self::Cancelled => format!("Connection to @{username} was cancelled"),
        }
    }
}

/// Whether `raw` says the room is not streaming.
pub fn is_critical(raw: &str) -> bool {
    let text = raw.to_lowercase();
    CRITICAL_PATTERNS.iter().any(|p| text.contains(p))
}

/// What the worker should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Keep waiting for the primary deadline.
    Pending,
    /// Arm (or keep) the grace window and wait for corroboration.
    AwaitGrace,
    Live,
    Failed { kind: FailureKind, detail: Option<String> },
}

#[derive(Debug, Clone)]
pub struct Corroborator {
    policy: CorroborationPolicy,
    corroborated: bool,
    connect_resolved: bool,
    connect_failed: bool,
    critical_error: Option<String>,
    last_error: Option<String>,
    primary_elapsed: bool,
    grace_elapsed: bool,
}

impl Corroborator {
    pub fn new(policy: CorroborationPolicy) -> Self {
        Self {
            policy,
            corroborated: false,
            connect_resolved: false,
            connect_failed: false,
            critical_error: None,
            last_error: None,
            primary_elapsed: false,
            grace_elapsed: false,
        }
    }

    /// Audience traffic or the platform's `connected` confirmation.
    pub fn on_corroborated(&mut self) {
        self.corroborated = true;
    }

    pub fn on_connect_resolved(&mut self) {
        self.connect_resolved = true;
    }

    pub fn on_connect_failed(&mut self, message: &str) {
        self.connect_failed = true;
        self.observe_error(message);
    }

    /// An `error` event surfaced by the adapter while connecting.
    pub fn on_error_signal(&mut self, message: &str) {
        self.observe_error(message);
    }

    /// `streamEnd` or `disconnected` before the session went live.
    pub fn on_ended(&mut self, reason: &str) {
        self.critical_error.get_or_insert_with(|| reason.to_string());
        self.last_error = Some(reason.to_string());
    }

    pub fn on_primary_timeout(&mut self) {
        self.primary_elapsed = true;
    }

    pub fn on_grace_timeout(&mut self) {
        self.grace_elapsed = true;
    }

    fn observe_error(&mut self, message: &str) {
        if is_critical(message) && self.critical_error.is_none() {
            self.critical_error = Some(message.to_string());
        }
        self.last_error = Some(message.to_string());
    }

    pub fn verdict(&self) -> Verdict {
        if self.corroborated {
            return Verdict::Live;
        }
        match self.policy {
            CorroborationPolicy::Permissive => self.permissive_verdict(),
            CorroborationPolicy::Strict => self.strict_verdict(),
        }
    }

    fn permissive_verdict(&self) -> Verdict {
        if let Some(critical) = &self.critical_error {
            return if self.grace_elapsed {
                Verdict::Failed {
                    kind: FailureKind::NotLive,
                    detail: Some(critical.clone()),
                }
            } else {
                Verdict::AwaitGrace
            };
        }

        // A non-critical connect error still counts as connected.
        if self.connect_resolved || self.connect_failed {
            return Verdict::Live;
        }
        if !self.primary_elapsed {
            return Verdict::Pending;
        }
        if !self.grace_elapsed {
            return Verdict::AwaitGrace;
        }
        Verdict::Live
    }

    fn strict_verdict(&self) -> Verdict {
        let settled = self.connect_resolved
            || self.connect_failed
            || self.critical_error.is_some()
            || self.primary_elapsed;
        if !settled {
            return Verdict::Pending;
        }
        if !self.grace_elapsed {
            return Verdict::AwaitGrace;
        }

        let detail = self.critical_error.clone().or_else(|| self.last_error.clone());
        let kind = detail
            .as_deref()
            .map(FailureKind::classify)
            .unwrap_or(FailureKind::TimedOut);
        Verdict::Failed { kind, detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permissive() -> Corroborator {
        Corroborator::new(CorroborationPolicy::Permissive)
    }

    fn strict() -> Corroborator {
        Corroborator::new(CorroborationPolicy::Strict)
    }

    #[test]
    fn classification_is_best_effort_pattern_matching() {
        assert_eq!(FailureKind::classify("Error: roomId not found"), FailureKind::NotLive);
        assert_eq!(FailureKind::classify("User is offline"), FailureKind::NotLive);
        assert_eq!(FailureKind::classify("LIVE has ended: no live stream"), FailureKind::NotLive);
        assert_eq!(FailureKind::classify("Request timeout after 10s"), FailureKind::TimedOut);
        assert_eq!(FailureKind::classify("fetch failed"), FailureKind::Network);
        assert_eq!(FailureKind::classify("something odd"), FailureKind::Unknown);
    }

    #[test]
    fn user_messages_name_the_broadcaster() {
        assert!(FailureKind::NotLive.user_message("foo").contains("not live"));
        assert!(FailureKind::TimedOut.user_message("foo").contains("@foo"));
    }

    #[test]
    fn policy_parses_from_config_text() {
        assert_eq!("STRICT".parse(), Ok(CorroborationPolicy::Strict));
        assert_eq!(" permissive ".parse(), Ok(CorroborationPolicy::Permissive));
        assert!("lenient".parse::<CorroborationPolicy>().is_err());
    }

    #[test]
    fn permissive_resolved_connect_is_live() {
        let mut c = permissive();
        assert_eq!(c.verdict(), Verdict::Pending);
        c.on_connect_resolved();
        assert_eq!(c.verdict(), Verdict::Live);
    }

    #[test]
    fn permissive_traffic_is_live_before_connect_resolves() {
        let mut c = permissive();
        c.on_corroborated();
        assert_eq!(c.verdict(), Verdict::Live);
    }

    // Open product decision: a non-critical connect error is treated as connected.
    #[test]
    fn permissive_non_critical_error_counts_as_connected() {
        let mut c = permissive();
        c.on_connect_failed("websocket upgrade rejected: 502");
        assert_eq!(c.verdict(), Verdict::Live);
    }

    #[test]
    fn permissive_critical_error_without_traffic_fails_after_grace() {
        let mut c = permissive();
        c.on_connect_failed("Error: roomId not found");
        assert_eq!(c.verdict(), Verdict::AwaitGrace);
        c.on_grace_timeout();
        assert_eq!(
            c.verdict(),
            Verdict::Failed {
                kind: FailureKind::NotLive,
                detail: Some("Error: roomId not found".to_string()),
            }
        );
    }

    #[test]
    fn permissive_critical_error_rescued_by_traffic_in_grace() {
        let mut c = permissive();
        c.on_connect_failed("Error: roomId not found");
        c.on_corroborated();
        assert_eq!(c.verdict(), Verdict::Live);
    }

    #[test]
    fn permissive_silent_connect_goes_live_after_grace() {
        let mut c = permissive();
        c.on_primary_timeout();
        assert_eq!(c.verdict(), Verdict::AwaitGrace);
        c.on_grace_timeout();
        assert_eq!(c.verdict(), Verdict::Live);
    }

    #[test]
    fn permissive_separately_observed_critical_error_blocks_optimism() {
        let mut c = permissive();
        c.on_error_signal("user is offline");
        c.on_primary_timeout();
        c.on_grace_timeout();
        assert!(matches!(
            c.verdict(),
            Verdict::Failed { kind: FailureKind::NotLive, .. }
        ));
    }

    #[test]
    fn permissive_non_critical_error_signal_does_not_decide() {
        let mut c = permissive();
        c.on_error_signal("rate limited");
        assert_eq!(c.verdict(), Verdict::Pending);
    }

    #[test]
    fn stream_end_while_connecting_is_critical() {
        let mut c = permissive();
        c.on_ended("stream ended");
        c.on_connect_resolved();
        assert_eq!(c.verdict(), Verdict::AwaitGrace);
    }

    #[test]
    fn strict_resolved_connect_only_opens_grace() {
        let mut c = strict();
        c.on_connect_resolved();
        assert_eq!(c.verdict(), Verdict::AwaitGrace);
        c.on_grace_timeout();
        assert_eq!(
            c.verdict(),
            Verdict::Failed { kind: FailureKind::TimedOut, detail: None }
        );
    }

    #[test]
    fn strict_confirmation_is_live() {
        let mut c = strict();
        c.on_connect_resolved();
        c.on_corroborated();
        assert_eq!(c.verdict(), Verdict::Live);
    }

    #[test]
    fn strict_non_critical_error_fails_with_its_class() {
        let mut c = strict();
        c.on_connect_failed("network unreachable");
        c.on_grace_timeout();
        assert!(matches!(
            c.verdict(),
            Verdict::Failed { kind: FailureKind::Network, .. }
        ));
    }
}
