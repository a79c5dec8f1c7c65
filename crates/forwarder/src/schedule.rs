//! Schedule definitions for the rules that fire the forwarder.
//!
//! Each [`ScheduleItem`] becomes one scheduled rule whose target input is the
//! trigger payload the forwarder later receives. The deployment tooling reads
//! [`ScheduleItem::expression`] and [`ScheduleItem::target_input`]; the
//! forwarder itself never evaluates schedules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::SecretRef;

/// Template placeholder bound to the scheduled event's `id`.
const ID_PLACEHOLDER: &str = "<id>";

/// Unit of a [`Schedule::Rate`] period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnits {
    Minutes,
    Hours,
    Days,
}

impl PeriodUnits {
    fn as_str(self) -> &'static str {
        match self {
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }
}

/// When a rule fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fires every `period` units.
    Rate {
        period: u32,
        period_units: PeriodUnits,
    },
    /// Cron style; `fields` is the six-field scheduler syntax, e.g.
    /// `"0 12 * * ? *"`.
    Cron { fields: String },
}

impl Schedule {
    /// Formats the schedule in the scheduler's expression syntax.
    ///
    /// A period of one uses the singular unit (`rate(1 hour)`), which the
    /// scheduler requires.
    pub fn expression(&self) -> Result<String, ScheduleError> {
        match self {
            Self::Rate { period: 0, .. } => Err(ScheduleError::ZeroPeriod),
            Self::Rate {
                period,
                period_units,
            } => {
                let units = period_units.as_str();
                let units = if *period == 1 {
                    units.strip_suffix('s').unwrap_or(units)
                } else {
                    units
                };
                Ok(format!("rate({period} {units})"))
            }
            Self::Cron { fields } if fields.trim().is_empty() => Err(ScheduleError::EmptyCron),
            Self::Cron { fields } => Ok(format!("cron({})", fields.trim())),
        }
    }
}

/// Invalid schedule definitions.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("rate period must be at least 1")]
    ZeroPeriod,
    #[error("cron schedule has no fields")]
    EmptyCron,
}

/// A periodic POST to `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleItem {
    pub name: String,
    pub url: String,
    pub schedule: Schedule,
}

impl ScheduleItem {
    /// Rule name for this item under `prefix`.
    pub fn rule_name(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.name)
    }

    /// Scheduler expression for this item.
    pub fn expression(&self) -> Result<String, ScheduleError> {
        self.schedule.expression()
    }

    /// How the rule target builds the forwarder's payload.
    ///
    /// Constant input would replace the scheduled event entirely and lose its
    /// `id`, so the target copies `$.id` from the event into a template that
    /// carries the constant endpoint and secret reference.
    pub fn target_input(&self, secret_ref: &SecretRef) -> InputTransformer {
        let template = serde_json::json!({
            "id": ID_PLACEHOLDER,
            "endpoint": self.url,
            "shared_secret_arn": secret_ref.as_str(),
        });
        InputTransformer {
            input_paths_map: BTreeMap::from([("id".to_owned(), "$.id".to_owned())]),
            input_template: template.to_string(),
        }
    }
}

/// A rule target input transformer: JSON paths extracted from the scheduled
/// event, substituted as `<name>` into `input_template`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InputTransformer {
    pub input_paths_map: BTreeMap<String, String>,
    pub input_template: String,
}
