//! OCPI Common module wire types
//!
//! Data structures exchanged with a remote party on the versions,
//! version-detail and credentials endpoints, plus the generic response
//! envelope every OCPI endpoint wraps its payload in.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Status codes
// ============================================================================

/// `status_code` marking a successful OCPI response. Any other value is an error.
pub const STATUS_SUCCESS: i64 = 1000;

/// Generic client error
pub const STATUS_CLIENT_ERROR: i64 = 2000;
/// Invalid or missing parameters
pub const STATUS_INVALID_PARAMETERS: i64 = 2001;
/// Not enough information
pub const STATUS_NOT_ENOUGH_INFORMATION: i64 = 2002;
/// Unknown location
pub const STATUS_UNKNOWN_LOCATION: i64 = 2003;
/// Unknown token
pub const STATUS_UNKNOWN_TOKEN: i64 = 2004;

/// Generic server error
pub const STATUS_SERVER_ERROR: i64 = 3000;
/// Unable to use the client's API
pub const STATUS_UNABLE_TO_USE_CLIENT_API: i64 = 3001;
/// Unsupported version
pub const STATUS_UNSUPPORTED_VERSION: i64 = 3002;
/// No matching endpoints or expected endpoints missing between parties
pub const STATUS_NO_MATCHING_ENDPOINTS: i64 = 3003;

// ============================================================================
// Versions
// ============================================================================

/// Protocol version identifier such as `2.1.1` or `2.2.1`.
///
/// Ordered by its dot-separated numeric components, so `2.2.1 > 2.2 > 2.1.1 > 2.0`.
/// Two identifiers only compare equal when their strings are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionNumber(String);

impl VersionNumber {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of each dot-separated component (leading digits only)
    fn components(&self) -> Vec<u64> {
        self.0
            .split('.')
            .map(|part| {
                let digits: String = part.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    }
}

impl Ord for VersionNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components()
            .cmp(&other.components())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for VersionNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionNumber {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for VersionNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One entry of the `GET /versions` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: VersionNumber,
    pub url: String,
}

/// OCPI module identifier as listed in a version-detail document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModuleId {
    Cdrs,
    ChargingProfiles,
    Commands,
    Credentials,
    HubClientInfo,
    Locations,
    Sessions,
    Tariffs,
    Tokens,
    Other(String),
}

impl ModuleId {
    pub fn as_str(&self) -> &str {
        match self {
            ModuleId::Cdrs => "cdrs",
            ModuleId::ChargingProfiles => "chargingprofiles",
            ModuleId::Commands => "commands",
            ModuleId::Credentials => "credentials",
            ModuleId::HubClientInfo => "hubclientinfo",
            ModuleId::Locations => "locations",
            ModuleId::Sessions => "sessions",
            ModuleId::Tariffs => "tariffs",
            ModuleId::Tokens => "tokens",
            ModuleId::Other(id) => id,
        }
    }
}

impl From<String> for ModuleId {
    fn from(s: String) -> Self {
        match s.as_str() {
            "cdrs" => ModuleId::Cdrs,
            "chargingprofiles" => ModuleId::ChargingProfiles,
            "commands" => ModuleId::Commands,
            "credentials" => ModuleId::Credentials,
            "hubclientinfo" => ModuleId::HubClientInfo,
            "locations" => ModuleId::Locations,
            "sessions" => ModuleId::Sessions,
            "tariffs" => ModuleId::Tariffs,
            "tokens" => ModuleId::Tokens,
            _ => ModuleId::Other(s),
        }
    }
}

impl From<ModuleId> for String {
    fn from(module: ModuleId) -> Self {
        module.as_str().to_string()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a module interface an endpoint implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InterfaceRole {
    Sender,
    Receiver,
}

/// Endpoint of one module in a version-detail document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub identifier: ModuleId,
    pub role: InterfaceRole,
    pub url: String,
}

/// `GET <version url>` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDetails {
    pub version: VersionNumber,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

// ============================================================================
// Parties and credentials
// ============================================================================

/// Role of a party in the charging network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Cpo,
    Emsp,
    Hub,
    Nap,
    Nsp,
    Other,
    Scsp,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Cpo => "CPO",
            Role::Emsp => "EMSP",
            Role::Hub => "HUB",
            Role::Nap => "NAP",
            Role::Nsp => "NSP",
            Role::Other => "OTHER",
            Role::Scsp => "SCSP",
        };
        f.write_str(s)
    }
}

/// (country code, party id, role) triple identifying a party
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartyIdentity {
    pub country_code: String,
    pub party_id: String,
    pub role: Role,
}

impl PartyIdentity {
    pub fn new(country_code: impl Into<String>, party_id: impl Into<String>, role: Role) -> Self {
        Self {
            country_code: country_code.into(),
            party_id: party_id.into(),
            role,
        }
    }
}

impl fmt::Display for PartyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{} ({})", self.country_code, self.party_id, self.role)
    }
}

/// Business details advertised with a credentials role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessDetails {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<serde_json::Value>,
}

impl BusinessDetails {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            website: None,
            logo: None,
        }
    }
}

/// One role entry of a [`Credentials`] object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialsRole {
    pub role: Role,
    pub business_details: BusinessDetails,
    pub party_id: String,
    pub country_code: String,
}

impl CredentialsRole {
    pub fn new(
        role: Role,
        party_id: impl Into<String>,
        country_code: impl Into<String>,
        business_name: impl Into<String>,
    ) -> Self {
        Self {
            role,
            business_details: BusinessDetails::new(business_name),
            party_id: party_id.into(),
            country_code: country_code.into(),
        }
    }

    pub fn identity(&self) -> PartyIdentity {
        PartyIdentity::new(&self.country_code, &self.party_id, self.role)
    }
}

/// Credentials object exchanged during registration and rotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Token the receiving side must use to authenticate against the sender
    pub token: String,
    /// Versions endpoint of the sender
    pub url: String,
    #[serde(default)]
    pub roles: Vec<CredentialsRole>,
}

// ============================================================================
// Response envelope
// ============================================================================

/// Envelope wrapping every OCPI response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcpiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub status_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl<T> OcpiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_SUCCESS
    }

    /// Transform the payload, keeping status fields
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OcpiResponse<U> {
        OcpiResponse {
            data: self.data.map(f),
            status_code: self.status_code,
            status_message: self.status_message,
            timestamp: self.timestamp,
        }
    }
}
