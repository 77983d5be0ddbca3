//! Table and JSON rendering for command results.
//!
//! Everything here writes to a caller-supplied writer; the binary passes
//! standard output.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use serde_json::json;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use thiserror::Error;

use crate::api::{Instance, InstanceStatus};
use crate::lifecycle::OperationOutcome;
use crate::spec::display_gpu_type;

const PLACEHOLDER: &str = "-";

/// Output style selected with `--output`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned columns for people.
    #[default]
    Table,
    /// JSON documents for scripts.
    Json,
}

/// Rejected `--output` value.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid output format '{value}': expected 'table' or 'json'")]
pub struct OutputFormatError {
    /// Value as given.
    pub value: String,
}

impl FromStr for OutputFormat {
    type Err = OutputFormatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(OutputFormatError {
                value: value.to_owned(),
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Table => "table",
            Self::Json => "json",
        })
    }
}

/// Formats an hourly price in cents as dollars, e.g. `129` → `$1.29`.
#[must_use]
pub fn format_price(cents: Option<u64>) -> String {
    cents.map_or_else(
        || PLACEHOLDER.to_owned(),
        |value| format!("${}.{:02}", value.div_euclid(100), value.rem_euclid(100)),
    )
}

/// One line of the instance table.
#[derive(Debug, Tabled)]
struct InstanceRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "IP_ADDRESS")]
    ip_address: String,
    #[tabled(rename = "GPU_TYPE")]
    gpu_type: String,
    #[tabled(rename = "REGION")]
    region: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "PRICE/HR")]
    price: String,
}

impl From<&Instance> for InstanceRow {
    fn from(instance: &Instance) -> Self {
        Self {
            name: instance.name.clone(),
            id: instance.id.clone(),
            ip_address: instance.usable_ip().unwrap_or(PLACEHOLDER).to_owned(),
            gpu_type: display_gpu_type(&instance.instance_type_name).to_owned(),
            region: instance.region.clone(),
            status: instance.status.to_string(),
            price: format_price(instance.price_cents_per_hour),
        }
    }
}

/// Renders the instance listing.
///
/// The table shows only active instances unless `include_all` is set; JSON
/// always carries the full set.
///
/// # Errors
///
/// Returns an I/O error when writing fails.
pub fn render_instances(
    out: &mut dyn Write,
    instances: &[Instance],
    format: OutputFormat,
    include_all: bool,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, instances)?;
            writeln!(out)
        }
        OutputFormat::Table => {
            let rows: Vec<_> = instances
                .iter()
                .filter(|instance| include_all || instance.status == InstanceStatus::Active)
                .map(InstanceRow::from)
                .collect::<Vec<_>>();
            if rows.is_empty() {
                let scope = if include_all { "" } else { "active " };
                return writeln!(out, "No {scope}instances found.");
            }
            let table = Table::new(rows).with(Style::rounded()).to_string();
            writeln!(out, "{table}")
        }
    }
}

/// Follow-up details printed after a successful create.
#[derive(Clone, Copy, Debug)]
pub struct CreatedSummary<'a> {
    /// The ready instance.
    pub instance: &'a Instance,
    /// Filesystem attached at launch.
    pub filesystem: &'a str,
    /// Login user for the `ssh` hint.
    pub remote_user: &'a str,
    /// Whether to suggest `lambda setup`.
    pub suggest_setup: bool,
}

/// Renders the create summary with next-step hints.
///
/// # Errors
///
/// Returns an I/O error when writing fails.
pub fn render_created(
    out: &mut dyn Write,
    summary: &CreatedSummary<'_>,
    format: OutputFormat,
) -> io::Result<()> {
    let instance = summary.instance;
    let ip = instance.usable_ip().unwrap_or(PLACEHOLDER);
    if format == OutputFormat::Json {
        let document = json!({
            "instance_id": instance.id,
            "instance_name": instance.name,
            "instance_type": instance.instance_type_name,
            "region": instance.region,
            "status": instance.status,
            "ip": instance.usable_ip(),
            "filesystem": summary.filesystem,
        });
        serde_json::to_writer_pretty(&mut *out, &document)?;
        return writeln!(out);
    }

    writeln!(out, "Instance is ready.")?;
    writeln!(out, "  ID:         {}", instance.id)?;
    writeln!(out, "  Name:       {}", instance.name)?;
    writeln!(
        out,
        "  Type:       {}",
        display_gpu_type(&instance.instance_type_name)
    )?;
    writeln!(out, "  Region:     {}", instance.region)?;
    writeln!(out, "  Status:     {}", instance.status)?;
    writeln!(out, "  IP:         {ip}")?;
    writeln!(out, "  Filesystem: {}", summary.filesystem)?;
    writeln!(out)?;
    writeln!(out, "Next steps:")?;
    writeln!(
        out,
        "  ssh {}@{ip}    # accept the host key once",
        summary.remote_user
    )?;
    writeln!(out, "  lambda connect {}", instance.name)?;
    if summary.suggest_setup {
        writeln!(out, "  lambda setup {}", instance.name)?;
    }
    Ok(())
}

/// Renders the informational outcome of a create that hit the quota.
///
/// # Errors
///
/// Returns an I/O error when writing fails.
pub fn render_quota_reached(
    out: &mut dyn Write,
    family: &str,
    limit: usize,
    existing: &[Instance],
    format: OutputFormat,
) -> io::Result<()> {
    if format == OutputFormat::Json {
        let document = json!({
            "status": "skipped",
            "reason": "quota_reached",
            "family": family,
            "limit": limit,
            "existing": existing,
        });
        serde_json::to_writer_pretty(&mut *out, &document)?;
        return writeln!(out);
    }

    writeln!(
        out,
        "Found {} active {family} instance(s), the limit is {limit}; not launching another.",
        existing.len()
    )?;
    for instance in existing {
        writeln!(
            out,
            "  {} ({}) {}",
            instance.name,
            instance.id,
            instance.usable_ip().unwrap_or(PLACEHOLDER)
        )?;
    }
    if let Some(first) = existing.first() {
        writeln!(out, "Connect instead: lambda connect {}", first.name)?;
    }
    Ok(())
}

/// Renders an accepted terminate or restart.
///
/// # Errors
///
/// Returns an I/O error when writing fails.
pub fn render_operation(
    out: &mut dyn Write,
    outcome: &OperationOutcome,
    format: OutputFormat,
) -> io::Result<()> {
    let instance = &outcome.instance;
    match format {
        OutputFormat::Json => {
            let document = json!({
                "instance_id": instance.id,
                "instance_name": instance.name,
                "action": outcome.action.as_str(),
                "status": "initiated",
            });
            serde_json::to_writer_pretty(&mut *out, &document)?;
            writeln!(out)
        }
        OutputFormat::Table => writeln!(
            out,
            "{} initiated for instance {} ({}).",
            capitalised(outcome.action.as_str()),
            instance.name,
            instance.id
        ),
    }
}

fn capitalised(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
