//! Domain records: vehicles, owners, sparse patches and listing filters.
//!
//! Patch fields use the tri-state [`Field`] wrapper so that "key missing from
//! the request" and "key explicitly set to null" stay distinguishable after
//! deserialization. A plain `Option` collapses the two and breaks sparse
//! updates.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Owner of exactly one registered vehicle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Owner {
    pub name: String,
    pub surname: String,
    pub patronymic: Option<String>,
}

/// Vehicle payload as returned by the enrichment service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vehicle {
    #[serde(rename = "regNum")]
    pub reg_num: String,
    pub mark: String,
    pub model: String,
    pub year: Option<i64>,
    pub owner: Owner,
}

/// Listing row: a persisted vehicle joined with its owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VehicleWithOwner {
    pub id: i64,
    #[serde(rename = "regNum")]
    pub reg_num: String,
    pub mark: String,
    pub model: String,
    pub year: Option<i64>,
    pub owner: Owner,
}

/// Tri-state optional for patch fields: absent (leave untouched), explicit
/// null (clear), or a value to set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Field<T> {
    #[default]
    Absent,
    Null,
    Value(T),
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    /// Serde hook for use with `#[serde(default, deserialize_with = ...)]`:
    /// a missing key falls back to the `Absent` default, an explicit JSON
    /// `null` becomes `Null`, anything else becomes `Value`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Field::Value(value),
            None => Field::Null,
        })
    }
}

/// Sparse update for the owner side of a vehicle record.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct OwnerPatch {
    #[serde(default, deserialize_with = "Field::deserialize")]
    pub name: Field<String>,
    #[serde(default, deserialize_with = "Field::deserialize")]
    pub surname: Field<String>,
    #[serde(default, deserialize_with = "Field::deserialize")]
    pub patronymic: Field<String>,
}

impl OwnerPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_absent() && self.surname.is_absent() && self.patronymic.is_absent()
    }
}

/// Sparse update for a vehicle and (optionally) its owner. A patch with zero
/// present fields on both sides is a valid no-op.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct VehiclePatch {
    #[serde(default, deserialize_with = "Field::deserialize")]
    pub reg_num: Field<String>,
    #[serde(default, deserialize_with = "Field::deserialize")]
    pub mark: Field<String>,
    #[serde(default, deserialize_with = "Field::deserialize")]
    pub model: Field<String>,
    #[serde(default, deserialize_with = "Field::deserialize")]
    pub year: Field<i64>,
    #[serde(default)]
    pub owner: OwnerPatch,
}

impl VehiclePatch {
    /// True when neither the vehicle side nor the owner side has any field
    /// present.
    pub fn is_empty(&self) -> bool {
        self.reg_num.is_absent()
            && self.mark.is_absent()
            && self.model.is_absent()
            && self.year.is_absent()
            && self.owner.is_empty()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid year filter format, expected start:end")]
    YearFormat,
    #[error("invalid year in filter: {0}")]
    YearValue(String),
    #[error("start year cannot be greater than end year")]
    YearOrder,
}

/// Inclusive year range parsed from the `start:end` query form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub start: i64,
    pub end: i64,
}

impl YearRange {
    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        let (start, end) = raw.split_once(':').ok_or(FilterError::YearFormat)?;
        let start: i64 = start
            .parse()
            .map_err(|_| FilterError::YearValue(start.to_string()))?;
        let end: i64 = end
            .parse()
            .map_err(|_| FilterError::YearValue(end.to_string()))?;
        if start > end {
            return Err(FilterError::YearOrder);
        }
        Ok(YearRange { start, end })
    }
}

/// Sparse listing filter. Absent fields place no predicate on the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub year: Option<YearRange>,
    pub reg_num: Option<String>,
    pub mark: Option<String>,
    pub model: Option<String>,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub patronymic: Option<String>,
}
