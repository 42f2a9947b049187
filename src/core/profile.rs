//! The user's structured profile
//!
//! One row of recognized keys. Text fields are overwritten on update;
//! `interests` is a sorted set that only ever grows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::tools::ToolOutcome;

use super::memory::MemoryError;

pub const PROFILE_KEYS: [&str; 7] = [
    "name",
    "last_name",
    "age",
    "gender",
    "location",
    "occupation",
    "interests",
];

#[derive(Debug, Error, PartialEq)]
pub enum ProfileUpdateError {
    #[error("Please provide a valid key from: {}", PROFILE_KEYS.join(", "))]
    UnknownKey(String),

    #[error("No valid fields provided.")]
    Empty,

    #[error("Invalid value for '{key}': expected {expected}")]
    InvalidValue { key: String, expected: &'static str },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub interests: BTreeSet<String>,
}

impl Profile {
    pub fn is_empty(&self) -> bool {
        *self == Profile::default()
    }

    pub fn interests_list(&self) -> Vec<&str> {
        self.interests.iter().map(String::as_str).collect()
    }

    /// Validate every field first, then apply. A rejected update leaves the
    /// profile untouched.
    pub fn apply(&mut self, fields: &Map<String, Value>) -> Result<(), ProfileUpdateError> {
        if fields.is_empty() {
            return Err(ProfileUpdateError::Empty);
        }

        if let Some(key) = fields.keys().find(|k| !PROFILE_KEYS.contains(&k.as_str())) {
            return Err(ProfileUpdateError::UnknownKey(key.clone()));
        }

        let mut next = self.clone();
        for (key, value) in fields {
            match key.as_str() {
                "age" => next.age = parse_age(value)?,
                "interests" => next.interests.extend(parse_interests(value)?),
                text_key => {
                    let text = parse_text(text_key, value)?;
                    *next.text_field_mut(text_key) = text;
                }
            }
        }

        *self = next;
        Ok(())
    }

    fn text_field_mut(&mut self, key: &str) -> &mut Option<String> {
        match key {
            "name" => &mut self.name,
            "last_name" => &mut self.last_name,
            "gender" => &mut self.gender,
            "location" => &mut self.location,
            _ => &mut self.occupation,
        }
    }
}

fn parse_text(key: &str, value: &Value) -> Result<Option<String>, ProfileUpdateError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        _ => Err(ProfileUpdateError::InvalidValue {
            key: key.to_string(),
            expected: "a string",
        }),
    }
}

fn parse_age(value: &Value) -> Result<Option<i64>, ProfileUpdateError> {
    let invalid = || ProfileUpdateError::InvalidValue {
        key: "age".to_string(),
        expected: "an integer",
    };

    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_i64().map(Some).ok_or_else(invalid),
        Value::String(s) => s.trim().parse::<i64>().map(Some).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Interests arrive as a list of strings or one comma-separated string
pub fn parse_interests(value: &Value) -> Result<Vec<String>, ProfileUpdateError> {
    let items: Vec<String> = match value {
        Value::Null => Vec::new(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        Value::Array(values) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => {
            return Err(ProfileUpdateError::InvalidValue {
                key: "interests".to_string(),
                expected: "a list of strings",
            })
        }
    };

    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        let text = [
            ("name", &self.name),
            ("last_name", &self.last_name),
            ("gender", &self.gender),
            ("location", &self.location),
            ("occupation", &self.occupation),
        ];
        for (key, value) in text {
            if let Some(v) = value {
                parts.push(format!("{}: {}", key, v));
            }
        }
        if let Some(age) = self.age {
            parts.push(format!("age: {}", age));
        }
        if !self.interests.is_empty() {
            parts.push(format!("interests: {}", self.interests_list().join(", ")));
        }
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn read(&self) -> Result<Option<Profile>, MemoryError>;

    /// Validation problems come back as a failure outcome, storage problems as `Err`
    async fn update(&self, fields: &Map<String, Value>) -> Result<ToolOutcome, MemoryError>;
}
