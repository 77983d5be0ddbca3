//! Identifier resolution shared by delete, restart, connect, and setup.

use thiserror::Error;

use crate::api::Instance;

/// Failure to map a user-supplied identifier to exactly one instance.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ResolveError {
    /// Nothing matched the identifier by ID or by name.
    #[error("no instance found with ID or name '{identifier}'")]
    NotFound {
        /// Identifier passed by the caller.
        identifier: String,
    },
    /// Several instances share the name and none has it as an ID.
    #[error(
        "name '{identifier}' matches {} instances ({}); use the instance ID instead",
        .matches.len(),
        .matches.join(", ")
    )]
    Ambiguous {
        /// Identifier passed by the caller.
        identifier: String,
        /// IDs of the instances sharing the name.
        matches: Vec<String>,
    },
}

/// Resolves `identifier` against `instances`.
///
/// An exact ID match always wins. Otherwise the identifier must name exactly
/// one instance.
///
/// # Errors
///
/// Returns [`ResolveError::NotFound`] when nothing matches and
/// [`ResolveError::Ambiguous`] when the name is shared.
pub fn resolve_identifier<'a>(
    instances: &'a [Instance],
    identifier: &str,
) -> Result<&'a Instance, ResolveError> {
    if let Some(found) = instances.iter().find(|instance| instance.id == identifier) {
        return Ok(found);
    }

    let mut by_name = instances
        .iter()
        .filter(|instance| !instance.name.is_empty() && instance.name == identifier);
    match (by_name.next(), by_name.next()) {
        (Some(found), None) => Ok(found),
        (Some(first), Some(second)) => {
            let matches = [first, second]
                .into_iter()
                .chain(by_name)
                .map(|instance| instance.id.clone())
                .collect();
            Err(ResolveError::Ambiguous {
                identifier: identifier.to_owned(),
                matches,
            })
        }
        _ => Err(ResolveError::NotFound {
            identifier: identifier.to_owned(),
        }),
    }
}
