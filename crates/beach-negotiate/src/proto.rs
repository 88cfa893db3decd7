use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which side of the two-party negotiation a peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Offerer,
    Answerer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Offerer => "offerer",
            Role::Answerer => "answerer",
        }
    }

    /// The other participant.
    pub fn peer(self) -> Role {
        match self {
            Role::Offerer => Role::Answerer,
            Role::Answerer => Role::Offerer,
        }
    }

    /// The only description kind this role is allowed to produce.
    pub fn produces(self) -> SdpKind {
        match self {
            Role::Offerer => SdpKind::Offer,
            Role::Answerer => SdpKind::Answer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown role {0:?} (expected \"offerer\" or \"answerer\")")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "offerer" | "offer" => Ok(Role::Offerer),
            "answerer" | "answer" => Ok(Role::Answerer),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdpKind {
    Offer,
    Answer,
}

impl SdpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SdpKind::Offer => "offer",
            SdpKind::Answer => "answer",
        }
    }

    /// The role that legitimately produces descriptions of this kind.
    pub fn producer(self) -> Role {
        match self {
            SdpKind::Offer => Role::Offerer,
            SdpKind::Answer => Role::Answerer,
        }
    }
}

impl fmt::Display for SdpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A negotiation payload as carried on the wire: `{"type": "offer", "sdp": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    #[serde(default)]
    pub sdp: String,
}

impl SessionDescription {
    pub fn new(kind: SdpKind, sdp: impl Into<String>) -> Self {
        Self {
            kind,
            sdp: sdp.into(),
        }
    }

    pub fn offer(sdp: impl Into<String>) -> Self {
        Self::new(SdpKind::Offer, sdp)
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self::new(SdpKind::Answer, sdp)
    }

    /// True when the body declares at least one media section (`m=` line).
    /// Partial or truncated relay payloads fail this check.
    pub fn has_media_section(&self) -> bool {
        self.sdp
            .lines()
            .any(|line| line.trim_start().starts_with("m="))
    }
}

/// Opaque connectivity hint. The relay never looks inside; peers exchange the
/// browser-style `{candidate, sdpMid, sdpMLineIndex, usernameFragment}` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectivityCandidate(Value);

impl ConnectivityCandidate {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn from_ice(
        candidate: impl Into<String>,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
        username_fragment: Option<String>,
    ) -> Self {
        let mut value = json!({ "candidate": candidate.into() });
        if let Some(mid) = sdp_mid {
            value["sdpMid"] = Value::String(mid);
        }
        if let Some(index) = sdp_mline_index {
            value["sdpMLineIndex"] = Value::from(index);
        }
        if let Some(ufrag) = username_fragment {
            value["usernameFragment"] = Value::String(ufrag);
        }
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Canonical encoding used to recognise a candidate delivered twice.
    /// Object keys are sorted so field order on the wire does not matter.
    pub fn dedup_key(&self) -> String {
        let mut key = String::new();
        write_canonical(&self.0, &mut key);
        key
    }

    pub fn candidate_line(&self) -> Option<&str> {
        self.0.get("candidate").and_then(Value::as_str)
    }

    pub fn sdp_mid(&self) -> Option<&str> {
        self.field(&["sdpMid", "sdp_mid"]).and_then(Value::as_str)
    }

    pub fn sdp_mline_index(&self) -> Option<u16> {
        self.field(&["sdpMLineIndex", "sdp_mline_index"])
            .and_then(Value::as_u64)
            .and_then(|index| u16::try_from(index).ok())
    }

    pub fn username_fragment(&self) -> Option<&str> {
        self.field(&["usernameFragment", "username_fragment"])
            .and_then(Value::as_str)
    }

    fn field(&self, names: &[&str]) -> Option<&Value> {
        names
            .iter()
            .filter_map(|name| self.0.get(*name))
            .find(|value| !value.is_null())
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (index, (name, field)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Body of `POST /api/signal`. Carrying `sdp` or `candidate` makes it a push;
/// carrying only `role` makes it a poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<ConnectivityCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl SignalRequest {
    pub fn poll(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Self::default()
        }
    }

    pub fn description(sender: Role, description: SessionDescription) -> Self {
        Self {
            sdp: Some(description),
            role: Some(sender),
            ..Self::default()
        }
    }

    pub fn candidate(sender: Role, candidate: ConnectivityCandidate) -> Self {
        Self {
            candidate: Some(candidate),
            role: Some(sender),
            ..Self::default()
        }
    }

    pub fn is_push(&self) -> bool {
        self.sdp.is_some() || self.candidate.is_some()
    }
}

/// Whatever the relay holds for the polling role. Pushes answer with an empty object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<ConnectivityCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<ConnectivityCandidate>>,
}

impl SignalResponse {
    /// Flattens the list form and the single-candidate form into one list.
    pub fn into_parts(self) -> (Option<SessionDescription>, Vec<ConnectivityCandidate>) {
        let mut candidates = self.candidates.unwrap_or_default();
        if let Some(single) = self.candidate {
            candidates.push(single);
        }
        (self.sdp, candidates)
    }
}
