use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Access level of a tenant member inside the customer's organization.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "entity_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EntityRole {
    Admin,
    Editor,
    #[default]
    Viewer,
}

/// Lifecycle of a tenant member. New members start out as `pending`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "entity_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EntityStatus {
    Active,
    Inactive,
    #[default]
    Pending,
}

/// Parses a list filter value. `"all"` and empty strings mean "no filter".
pub fn parse_filter<T: std::str::FromStr>(raw: Option<&str>) -> Result<Option<T>, String> {
    match raw.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("Invalid filter value: {value}")),
    }
}
