//! The fixed table of named rate limit policies.
//!
//! Policies are defined in code and never created at runtime, so the abuse
//! prevention configuration is reviewed like any other change.

use serde::Serialize;
use std::borrow::Cow;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RatewallError, Result};

/// Where a policy's identifier comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierSource {
    /// The phone number an OTP is sent to or verified for
    PhoneNumber,
    /// The authenticated user id
    UserId,
    /// The authenticated user id, else the client IP
    UserIdOrIp,
    /// Whatever the caller passes in
    CallerSupplied,
}

/// A named limit over a fixed window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Policy {
    pub name: Cow<'static, str>,
    /// Requests allowed per window
    pub limit: u64,
    /// Window length in seconds
    pub window_secs: u64,
    pub source: IdentifierSource,
}

impl Policy {
    /// A policy for an explicit `(limit, window)` pair.
    pub fn custom(name: impl Into<String>, limit: u64, window_secs: u64) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(RatewallError::Config("policy name must not be empty".into()));
        }
        if limit == 0 || window_secs == 0 {
            return Err(RatewallError::Config(format!(
                "policy {} needs a positive limit and window (got {} per {}s)",
                name, limit, window_secs
            )));
        }
        Ok(Self {
            name: Cow::Owned(name),
            limit,
            window_secs,
            source: IdentifierSource::CallerSupplied,
        })
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

pub static OTP_SEND: Policy = Policy {
    name: Cow::Borrowed("otp-send"),
    limit: 3,
    window_secs: 3600,
    source: IdentifierSource::PhoneNumber,
};

pub static OTP_VERIFY: Policy = Policy {
    name: Cow::Borrowed("otp-verify"),
    limit: 5,
    window_secs: 600,
    source: IdentifierSource::PhoneNumber,
};

pub static CHAT: Policy = Policy {
    name: Cow::Borrowed("chat"),
    limit: 30,
    window_secs: 60,
    source: IdentifierSource::UserId,
};

pub static API: Policy = Policy {
    name: Cow::Borrowed("api"),
    limit: 100,
    window_secs: 60,
    source: IdentifierSource::UserIdOrIp,
};

pub static STRICT: Policy = Policy {
    name: Cow::Borrowed("strict"),
    limit: 10,
    window_secs: 3600,
    source: IdentifierSource::CallerSupplied,
};

/// Names of the registered policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyName {
    OtpSend,
    OtpVerify,
    Chat,
    Api,
    Strict,
}

impl PolicyName {
    pub const ALL: [PolicyName; 5] = [
        PolicyName::OtpSend,
        PolicyName::OtpVerify,
        PolicyName::Chat,
        PolicyName::Api,
        PolicyName::Strict,
    ];

    pub fn policy(self) -> &'static Policy {
        match self {
            PolicyName::OtpSend => &OTP_SEND,
            PolicyName::OtpVerify => &OTP_VERIFY,
            PolicyName::Chat => &CHAT,
            PolicyName::Api => &API,
            PolicyName::Strict => &STRICT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyName::OtpSend => "otp-send",
            PolicyName::OtpVerify => "otp-verify",
            PolicyName::Chat => "chat",
            PolicyName::Api => "api",
            PolicyName::Strict => "strict",
        }
    }
}

impl FromStr for PolicyName {
    type Err = RatewallError;

    fn from_str(s: &str) -> Result<Self> {
        PolicyName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| RatewallError::UnknownPolicy(s.to_string()))
    }
}

impl std::fmt::Display for PolicyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_table() {
        let table: Vec<(&str, u64, u64)> = PolicyName::ALL
            .iter()
            .map(|n| {
                let p = n.policy();
                (p.name.as_ref(), p.limit, p.window_secs)
            })
            .collect();

        assert_eq!(
            table,
            vec![
                ("otp-send", 3, 3600),
                ("otp-verify", 5, 600),
                ("chat", 30, 60),
                ("api", 100, 60),
                ("strict", 10, 3600),
            ]
        );
    }

    #[test]
    fn test_names_round_trip() {
        for name in PolicyName::ALL {
            assert_eq!(name.as_str().parse::<PolicyName>().unwrap(), name);
            assert_eq!(name.policy().name, name.as_str());
        }
    }

    #[test]
    fn test_unknown_policy_name() {
        let err = "otp-resend".parse::<PolicyName>().unwrap_err();
        assert!(matches!(err, RatewallError::UnknownPolicy(ref n) if n == "otp-resend"));
    }

    #[test]
    fn test_identifier_sources() {
        assert_eq!(OTP_SEND.source, IdentifierSource::PhoneNumber);
        assert_eq!(OTP_VERIFY.source, IdentifierSource::PhoneNumber);
        assert_eq!(CHAT.source, IdentifierSource::UserId);
        assert_eq!(API.source, IdentifierSource::UserIdOrIp);
        assert_eq!(STRICT.source, IdentifierSource::CallerSupplied);
    }

    #[test]
    fn test_custom_policy_validation() {
        let p = Policy::custom("export", 2, 30).unwrap();
        assert_eq!(p.window(), Duration::from_secs(30));
        assert_eq!(p.source, IdentifierSource::CallerSupplied);

        assert!(Policy::custom("export", 0, 30).is_err());
        assert!(Policy::custom("export", 2, 0).is_err());
        assert!(Policy::custom("", 2, 30).is_err());
    }
}
