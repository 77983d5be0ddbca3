//! Parsing of `<count>x<type>` instance specifications.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

static SPEC_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^([1-9][0-9]*)x([A-Za-z0-9_]+)$"));

const SUFFIX_LEN: usize = 8;

/// Errors raised while parsing an instance specification.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SpecError {
    /// Raised when the input does not match `<count>x<type>`.
    #[error(
        "invalid instance specification '{input}': use <number_gpus>x<gpu_type> \
         (for example 1xA100 or 2xH100_SXM5)"
    )]
    InvalidFormat {
        /// Raw input passed by the caller.
        input: String,
    },
}

/// A parsed GPU request such as `2xH100_SXM5`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSpec {
    gpu_count: u32,
    gpu_type: String,
}

impl InstanceSpec {
    /// Parses `input` against the `<count>x<type>` grammar.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::InvalidFormat`] when the input does not match, or
    /// when the count does not fit in 32 bits.
    pub fn parse(input: &str) -> Result<Self, SpecError> {
        let invalid = || SpecError::InvalidFormat {
            input: input.to_owned(),
        };
        let pattern = SPEC_PATTERN.as_ref().map_err(|_| invalid())?;
        let captures = pattern.captures(input).ok_or_else(invalid)?;
        let count = captures.get(1).ok_or_else(invalid)?.as_str();
        let gpu_type = captures.get(2).ok_or_else(invalid)?.as_str();
        let gpu_count = count.parse::<u32>().map_err(|_| invalid())?;

        Ok(Self {
            gpu_count,
            gpu_type: gpu_type.to_owned(),
        })
    }

    /// Number of GPUs requested.
    #[must_use]
    pub const fn gpu_count(&self) -> u32 {
        self.gpu_count
    }

    /// GPU model token exactly as typed (for example `H100_SXM5`).
    #[must_use]
    pub fn gpu_type(&self) -> &str {
        &self.gpu_type
    }

    /// Provider instance type name, e.g. `gpu_2x_H100_SXM5`.
    #[must_use]
    pub fn instance_type_name(&self) -> String {
        format!("gpu_{}x_{}", self.gpu_count, self.gpu_type)
    }

    /// GPU family used for the quota check: the model token up to the first
    /// underscore (`H100_SXM5` → `H100`).
    #[must_use]
    pub fn family(&self) -> &str {
        family_of(&self.gpu_type)
    }

    /// Builds an instance name from `prefix` with a fresh random suffix.
    #[must_use]
    pub fn instance_name(&self, prefix: &str) -> String {
        let suffix: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(SUFFIX_LEN)
            .collect();
        self.instance_name_with_suffix(prefix, &suffix)
    }

    /// Builds an instance name from `prefix` and an explicit `suffix`.
    #[must_use]
    pub fn instance_name_with_suffix(&self, prefix: &str, suffix: &str) -> String {
        format!("{prefix}-{}_{}-{suffix}", self.gpu_count, self.gpu_type)
    }
}

impl FromStr for InstanceSpec {
    type Err = SpecError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for InstanceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.gpu_count, self.gpu_type)
    }
}

/// Extracts the GPU family token from a provider type name.
///
/// `gpu_8x_h100_sxm5` yields `h100`; names without the `<n>x_` marker yield
/// `None`.
#[must_use]
pub fn family_of_type_name(type_name: &str) -> Option<&str> {
    let (_, model) = type_name.split_once("x_")?;
    Some(family_of(model))
}

fn family_of(model: &str) -> &str {
    model.split('_').next().unwrap_or(model)
}

/// Strips the `gpu_` provider prefix for display (`gpu_1x_a100` → `1x_a100`).
#[must_use]
pub fn display_gpu_type(type_name: &str) -> &str {
    if type_name.is_empty() {
        return "N/A";
    }
    type_name.strip_prefix("gpu_").unwrap_or(type_name)
}
