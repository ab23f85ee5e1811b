use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// The stores use an empty string for "unset" actor fields.
            pub fn is_unset(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(RequestId);
id_newtype!(UserId);

/// Lifecycle state of a donation request. `Deliver` is the initial state,
/// `Received` is terminal; there is no transition that skips `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Deliver,
    Pending,
    Received,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Deliver => "deliver",
            RequestStatus::Pending => "pending",
            RequestStatus::Received => "received",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "deliver" => Some(RequestStatus::Deliver),
            "pending" => Some(RequestStatus::Pending),
            "received" => Some(RequestStatus::Received),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Donor,
    Volunteer,
    Recipient,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Donor => "donor",
            Role::Volunteer => "volunteer",
            Role::Recipient => "recipient",
        }
    }

    /// Profiles carry the role as a free-form `account_type` string; anything
    /// unrecognized maps to no role at all, which gates every transition.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "donor" => Some(Role::Donor),
            "volunteer" => Some(Role::Volunteer),
            "recipient" => Some(Role::Recipient),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pickup location. While a form field is being edited this is the raw text;
/// once the field contains a comma it becomes a coordinate pair. Parsing is
/// lenient by design: no check that either part is numeric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Coordinates { lat: String, lng: String },
    Raw(String),
}

impl Location {
    /// Parses a free-text "lat,lng" field at input time. Splits on commas and
    /// trims; segments past the second are dropped. Input without a comma
    /// stays raw.
    pub fn parse_input(value: &str) -> Self {
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        if parts.len() >= 2 {
            Location::Coordinates {
                lat: parts[0].to_string(),
                lng: parts[1].to_string(),
            }
        } else {
            Location::Raw(value.to_string())
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Location::Raw(String::new())
    }
}

/// A donation request record. Every write is a full-record overwrite; the
/// `time` field is stamped once at creation and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRequest {
    pub title: String,
    pub description: String,
    pub food_type: String,
    pub food_quantity: String,
    pub food_weight: String,
    pub expiration_date: String,
    pub pickup_date_time: String,
    pub location: Location,
    pub donated_by: UserId,
    pub delivered_by: UserId,
    pub received_by: UserId,
    pub status: RequestStatus,
    pub time: String,
}

/// A request tagged with its store key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRow {
    pub request_id: RequestId,
    pub request: DonationRequest,
}

/// The full keyed mapping in the store's natural insertion order, pushed in
/// its entirety on every mutation.
pub type RequestSnapshot = Vec<RequestRow>;

/// Profile record keyed by user identifier. Read-only from the controller's
/// perspective; malformed or missing fields simply stay unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub account_type: Option<Role>,
    pub first_name: Option<String>,
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
