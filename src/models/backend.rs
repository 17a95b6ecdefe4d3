use std::fmt;

use crate::error::{Result, RelayError};

/// Placeholder replaced by the backend index in a host template
pub const INDEX_PLACEHOLDER: &str = "{}";

/// Known Sogou proxy networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyKind {
    #[default]
    Edu,
    Dxt,
    Cnc,
    Ctc,
    Tc9,
}

impl ProxyKind {
    pub const ALL: [ProxyKind; 5] = [
        ProxyKind::Edu,
        ProxyKind::Dxt,
        ProxyKind::Cnc,
        ProxyKind::Ctc,
        ProxyKind::Tc9,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyKind::Edu => "edu",
            ProxyKind::Dxt => "dxt",
            ProxyKind::Cnc => "cnc",
            ProxyKind::Ctc => "ctc",
            ProxyKind::Tc9 => "tc9",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "edu" => Ok(ProxyKind::Edu),
            "dxt" => Ok(ProxyKind::Dxt),
            "cnc" => Ok(ProxyKind::Cnc),
            "ctc" => Ok(ProxyKind::Ctc),
            "tc9" => Ok(ProxyKind::Tc9),
            _ => Err(RelayError::UnknownProxyType(s.to_string())),
        }
    }

    /// Number of mirror hosts operated for this network
    pub fn host_count(&self) -> usize {
        match self {
            ProxyKind::Cnc | ProxyKind::Ctc => 4,
            ProxyKind::Edu | ProxyKind::Dxt | ProxyKind::Tc9 => 16,
        }
    }

    /// Host template for this network
    pub fn template(&self) -> HostTemplate {
        HostTemplate {
            pattern: format!("h{}.{}.bj.ie.sogou.com:80", INDEX_PLACEHOLDER, self.as_str()),
            count: self.host_count(),
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Backend pool configuration: an address pattern plus the number of candidate indices
///
/// Valid indices are `0..count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTemplate {
    pattern: String,
    count: usize,
}

impl HostTemplate {
    pub fn new(pattern: impl Into<String>, count: usize) -> Result<Self> {
        let pattern = pattern.into();
        if !pattern.contains(INDEX_PLACEHOLDER) {
            return Err(RelayError::InvalidConfig(format!(
                "host template '{}' has no '{}' placeholder",
                pattern, INDEX_PLACEHOLDER
            )));
        }
        if count == 0 {
            return Err(RelayError::InvalidConfig(
                "host template needs at least one host".into(),
            ));
        }
        Ok(Self { pattern, count })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Dial address (`host:port`) of the backend at `index`
    pub fn address(&self, index: usize) -> String {
        self.pattern
            .replacen(INDEX_PLACEHOLDER, &index.to_string(), 1)
    }
}
