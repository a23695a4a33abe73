//! Job launch parameters

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A typed parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum JobParameter {
    String(String),
    Int(i64),
    Date(NaiveDate),
}

impl JobParameter {
    pub fn type_name(&self) -> &'static str {
        match self {
            JobParameter::String(_) => "string",
            JobParameter::Int(_) => "int",
            JobParameter::Date(_) => "date",
        }
    }
}

impl fmt::Display for JobParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobParameter::String(s) => f.write_str(s),
            JobParameter::Int(i) => write!(f, "{}", i),
            JobParameter::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// Ordered, read-only name -> value mapping supplied once per job run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameters {
    entries: Vec<(String, JobParameter)>,
}

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> JobParametersBuilder {
        JobParametersBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&JobParameter> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(JobParameter::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(JobParameter::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn get_date(&self, name: &str) -> Option<NaiveDate> {
        match self.get(name) {
            Some(JobParameter::Date(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JobParameter)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical, order-independent representation identifying the job instance
    pub fn instance_key(&self) -> String {
        let mut pairs: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}({})={}", k, v.type_name(), v))
            .collect();
        pairs.sort();
        pairs.join(",")
    }
}

/// Builder for [`JobParameters`]; a later value for the same name replaces the earlier one
#[derive(Debug, Default)]
pub struct JobParametersBuilder {
    entries: Vec<(String, JobParameter)>,
}

impl JobParametersBuilder {
    pub fn add(mut self, name: impl Into<String>, value: JobParameter) -> Self {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    pub fn add_string(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(name, JobParameter::String(value.into()))
    }

    pub fn add_int(self, name: impl Into<String>, value: i64) -> Self {
        self.add(name, JobParameter::Int(value))
    }

    pub fn add_date(self, name: impl Into<String>, value: NaiveDate) -> Self {
        self.add(name, JobParameter::Date(value))
    }

    pub fn build(self) -> JobParameters {
        JobParameters {
            entries: self.entries,
        }
    }
}

fn parameter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_.\-]+)(?::(string|int|date))?=(.*)$")
            .expect("parameter pattern is valid")
    })
}

/// Parse `name=value`, `name:int=value` or `name:date=YYYY-MM-DD`
pub fn parse_parameter(s: &str) -> Result<(String, JobParameter), String> {
    let caps = parameter_regex()
        .captures(s.trim())
        .ok_or_else(|| format!("Invalid parameter '{}', expected name[:type]=value", s))?;

    let name = caps[1].to_string();
    let raw = &caps[3];
    let value = match caps.get(2).map(|m| m.as_str()).unwrap_or("string") {
        "int" => JobParameter::Int(
            raw.parse()
                .map_err(|_| format!("Parameter '{}' is not an integer: {}", name, raw))?,
        ),
        "date" => JobParameter::Date(
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| format!("Parameter '{}' is not a YYYY-MM-DD date: {}", name, raw))?,
        ),
        _ => JobParameter::String(raw.to_string()),
    };

    Ok((name, value))
}
