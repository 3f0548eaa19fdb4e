//! Common types for DripRust

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for tenants
pub type TenantId = Uuid;

/// Unique identifier for leads
pub type LeadId = Uuid;

/// Unique identifier for drip campaigns
pub type CampaignId = Uuid;

/// Unique identifier for campaign steps
pub type CampaignStepId = Uuid;

/// Unique identifier for enrollments
pub type EnrollmentId = Uuid;

/// Unique identifier for conversation messages
pub type MessageId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Phone number in a loosely normalized form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse a phone number from a string, stripping common formatting.
    ///
    /// Accepts an optional leading `+` followed by at least seven digits;
    /// spaces, dashes, dots, and parentheses are ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let mut normalized = String::with_capacity(s.len());
        for (i, c) in s.trim().chars().enumerate() {
            match c {
                '+' if i == 0 => normalized.push('+'),
                '0'..='9' => normalized.push(c),
                ' ' | '-' | '.' | '(' | ')' => {}
                _ => return None,
            }
        }

        let digits = normalized.chars().filter(|c| c.is_ascii_digit()).count();
        if digits >= 7 {
            Some(Self(normalized))
        } else {
            None
        }
    }

    /// Get the normalized number as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid phone number".to_string()))
    }
}

/// Enrollment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Responded,
    Completed,
    Cancelled,
}

impl EnrollmentStatus {
    /// Whether the enrollment can still advance or react to replies
    pub fn is_live(&self) -> bool {
        matches!(self, EnrollmentStatus::Active | EnrollmentStatus::Responded)
    }

    /// Whether the enrollment has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrollmentStatus::Active => write!(f, "active"),
            EnrollmentStatus::Responded => write!(f, "responded"),
            EnrollmentStatus::Completed => write!(f, "completed"),
            EnrollmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for EnrollmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EnrollmentStatus::Active),
            "responded" => Ok(EnrollmentStatus::Responded),
            "completed" => Ok(EnrollmentStatus::Completed),
            "cancelled" => Ok(EnrollmentStatus::Cancelled),
            _ => Err(format!("Invalid enrollment status: {}", s)),
        }
    }
}

/// Reason an enrollment was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Lead has no contactable phone number
    NoPhone,
    /// Lead's number is on the do-not-contact registry
    Dnc,
    /// Lead never opted in and the acquisition source implies no consent
    NotOptedIn,
    /// Lead replied that they are not interested
    NotInterested,
    /// Lead opted out of automated messaging
    OptOut,
    /// Lead record was deleted
    LeadDeleted,
    /// Cancelled by an operator
    Manual,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::NoPhone => write!(f, "no_phone"),
            CancelReason::Dnc => write!(f, "dnc"),
            CancelReason::NotOptedIn => write!(f, "not_opted_in"),
            CancelReason::NotInterested => write!(f, "not_interested"),
            CancelReason::OptOut => write!(f, "opt_out"),
            CancelReason::LeadDeleted => write!(f, "lead_deleted"),
            CancelReason::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for CancelReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_phone" => Ok(CancelReason::NoPhone),
            "dnc" => Ok(CancelReason::Dnc),
            "not_opted_in" => Ok(CancelReason::NotOptedIn),
            "not_interested" => Ok(CancelReason::NotInterested),
            "opt_out" => Ok(CancelReason::OptOut),
            "lead_deleted" => Ok(CancelReason::LeadDeleted),
            "manual" => Ok(CancelReason::Manual),
            _ => Err(format!("Invalid cancel reason: {}", s)),
        }
    }
}

/// How a lead entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    WebForm,
    VoiceCall,
    EmailInquiry,
    Import,
    Api,
}

impl LeadSource {
    /// Whether this acquisition channel implies consent to be contacted back.
    ///
    /// A lead who called in or emailed an inquiry has reasonably invited a
    /// follow-up; an imported or form-captured lead has not.
    pub fn implies_consent(&self) -> bool {
        matches!(self, LeadSource::VoiceCall | LeadSource::EmailInquiry)
    }
}

impl std::fmt::Display for LeadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadSource::WebForm => write!(f, "web_form"),
            LeadSource::VoiceCall => write!(f, "voice_call"),
            LeadSource::EmailInquiry => write!(f, "email_inquiry"),
            LeadSource::Import => write!(f, "import"),
            LeadSource::Api => write!(f, "api"),
        }
    }
}

impl std::str::FromStr for LeadSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web_form" => Ok(LeadSource::WebForm),
            "voice_call" => Ok(LeadSource::VoiceCall),
            "email_inquiry" => Ok(LeadSource::EmailInquiry),
            "import" => Ok(LeadSource::Import),
            "api" => Ok(LeadSource::Api),
            _ => Err(format!("Invalid lead source: {}", s)),
        }
    }
}

/// Direction of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Direction::Inbound),
            "outbound" => Ok(Direction::Outbound),
            _ => Err(format!("Invalid message direction: {}", s)),
        }
    }
}
