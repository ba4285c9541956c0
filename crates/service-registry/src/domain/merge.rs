//! Presentation merge: revealed attributes become one record value.
//!
//! Values are joined with `;` in referent order, so the result does not
//! depend on the order the presentation listed them in.

use shared_types::{PresentationPayload, PresentationState};
use std::collections::BTreeMap;

use crate::domain::attribute_group::AttributeGroup;
use crate::domain::errors::SubflowError;

/// Separator between attribute values in a record entry.
pub const VALUE_SEPARATOR: &str = ";";

/// Join values sorted by their referent.
pub fn join_sorted<I, K, V>(attributes: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Ord,
    V: AsRef<str>,
{
    let sorted: BTreeMap<K, V> = attributes.into_iter().collect();
    sorted
        .values()
        .map(|v| v.as_ref())
        .collect::<Vec<&str>>()
        .join(VALUE_SEPARATOR)
}

/// Extract the value of `group` from a completed presentation.
///
/// # Errors
///
/// - `Abandoned` if the exchange ended without a presentation
/// - `NotVerified` if the verifier rejected the presentation
/// - `MissingAttribute` if a requested referent was not revealed
pub fn merge_presentation(
    group: &AttributeGroup,
    presentation: &PresentationPayload,
) -> Result<String, SubflowError> {
    if presentation.state == PresentationState::Abandoned {
        return Err(SubflowError::Abandoned {
            exchange_id: presentation.exchange_id,
        });
    }
    if !presentation.verified {
        return Err(SubflowError::NotVerified {
            exchange_id: presentation.exchange_id,
        });
    }

    let mut revealed = Vec::with_capacity(group.attributes.len());
    for referent in group.referents() {
        let value = presentation
            .revealed_attributes
            .get(referent)
            .ok_or_else(|| SubflowError::MissingAttribute {
                exchange_id: presentation.exchange_id,
                referent: referent.to_string(),
            })?;
        revealed.push((referent, value.as_str()));
    }
    Ok(join_sorted(revealed))
}
