//! Buyer profile and the single validation routine shared by the checkout
//! controller and the server-side order gate.

use std::fmt;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Minimum buyer age, inclusive.
pub const MINIMUM_AGE: u32 = 18;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

/// KYC details collected before payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerProfile {
    pub full_name: String,
    pub mobile: String,
    pub state: String,
    pub age: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aadhaar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl BuyerProfile {
    /// Drop empty optional fields so `""` and absent are treated alike.
    pub fn normalized(mut self) -> Self {
        self.full_name = self.full_name.trim().to_string();
        self.state = self.state.trim().to_string();
        self.aadhaar = self.aadhaar.filter(|a| !a.trim().is_empty());
        self.email = self.email.filter(|e| !e.trim().is_empty());
        self
    }
}

/// Which profile field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileField {
    FullName,
    Mobile,
    State,
    Age,
    Aadhaar,
    Email,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: ProfileField,
    pub message: String,
}

/// All field errors for one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileErrors {
    pub errors: Vec<FieldError>,
}

impl fmt::Display for ProfileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
        write!(f, "invalid buyer profile: {}", messages.join(", "))
    }
}

impl std::error::Error for ProfileErrors {}

impl ProfileErrors {
    pub fn has(&self, field: ProfileField) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

/// True when `value` is exactly `len` ASCII digits.
pub fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

/// Validate a buyer profile. Every failing field is reported, not just the first.
pub fn validate_profile(profile: &BuyerProfile) -> Result<(), ProfileErrors> {
    let mut errors = Vec::new();
    let mut fail = |field, message: &str| {
        errors.push(FieldError {
            field,
            message: message.to_string(),
        })
    };

    if profile.full_name.trim().is_empty() {
        fail(ProfileField::FullName, "Full name is required");
    }
    if !is_digits(&profile.mobile, 10) {
        fail(ProfileField::Mobile, "Mobile must be 10 digits");
    }
    if profile.state.trim().is_empty() {
        fail(ProfileField::State, "State is required");
    }
    if profile.age < MINIMUM_AGE {
        fail(ProfileField::Age, "Age must be 18 or over");
    }
    if let Some(aadhaar) = profile.aadhaar.as_deref().filter(|a| !a.is_empty()) {
        if !is_digits(aadhaar, 12) {
            fail(ProfileField::Aadhaar, "Aadhaar must be 12 digits");
        }
    }
    if let Some(email) = profile.email.as_deref().filter(|e| !e.is_empty()) {
        if !EMAIL_RE.is_match(email) {
            fail(ProfileField::Email, "Please enter a valid email address");
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProfileErrors { errors })
    }
}
