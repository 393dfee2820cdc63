//! Source attribution for a cluster of duplicate articles.

use crate::models::{DigestEntry, Source};
use itertools::Itertools;

/// One [`Source`] per distinct newspaper in `members`, first occurrence wins.
///
/// A previously merged member contributes all of its sources in their
/// existing order, so attribution accumulates across passes.
pub fn attribute_sources<'a, I>(members: I) -> Vec<Source>
where
    I: IntoIterator<Item = &'a DigestEntry>,
{
    members
        .into_iter()
        .flat_map(DigestEntry::sources)
        .unique_by(|s| s.source_name.clone())
        .collect()
}
