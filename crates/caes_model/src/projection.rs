//! Field projection applied to payloads leaving a store.

use crate::value::Payload;
use std::collections::BTreeSet;

/// Which fields of a payload may cross to the other store.
///
/// An include list takes precedence over an exclude list when both are
/// configured. Applying a projection twice yields the same payload as
/// applying it once.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// Every field crosses.
    #[default]
    All,
    /// Only the listed fields cross.
    Include(BTreeSet<String>),
    /// Every field except the listed ones crosses.
    Exclude(BTreeSet<String>),
}

impl Projection {
    /// Builds a projection from optional include and exclude lists.
    pub fn new<I, E>(include: Option<I>, exclude: Option<E>) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        match (include, exclude) {
            (Some(include), _) => Projection::Include(include.into_iter().map(Into::into).collect()),
            (None, Some(exclude)) => {
                Projection::Exclude(exclude.into_iter().map(Into::into).collect())
            }
            (None, None) => Projection::All,
        }
    }

    /// Projection keeping only the given fields.
    pub fn include<I>(fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Projection::Include(fields.into_iter().map(Into::into).collect())
    }

    /// Projection dropping the given fields.
    pub fn exclude<I>(fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Projection::Exclude(fields.into_iter().map(Into::into).collect())
    }

    /// Returns true if the field may cross.
    pub fn allows(&self, field: &str) -> bool {
        match self {
            Projection::All => true,
            Projection::Include(fields) => fields.contains(field),
            Projection::Exclude(fields) => !fields.contains(field),
        }
    }

    /// Applies the projection to a payload.
    pub fn apply(&self, mut payload: Payload) -> Payload {
        if !matches!(self, Projection::All) {
            payload.retain(|field, _| self.allows(field));
        }
        payload
    }
}
