//! Predicate filtering over the sections of a package.
//!
//! Zero matches is an empty result, never an error.

use crate::uci::Package;
use crate::uci::Section;
use crate::Result;

/// Section predicate. Lookup failures inside a predicate count as no match.
pub type SectionFilter<'f> = dyn Fn(&Section<'_>) -> bool + 'f;

/// Matches sections of type `section_type`.
pub fn by_type(section_type: &str) -> impl Fn(&Section<'_>) -> bool + '_ {
    move |section| section.section_type() == section_type
}

/// Matches sections whose option `name` equals `value`, or contains it when
/// the option is a list.
pub fn by_option<'a>(
    name: &'a str,
    value: &'a str,
) -> impl Fn(&Section<'_>) -> bool + 'a {
    move |section| match section.option(name) {
        Ok(Some(option)) => option.matches(value),
        _ => false,
    }
}

pub fn by_type_and_option<'a>(
    section_type: &'a str,
    name: &'a str,
    value: &'a str,
) -> impl Fn(&Section<'_>) -> bool + 'a {
    let type_matches = by_type(section_type);
    let option_matches = by_option(name, value);
    move |section| type_matches(section) && option_matches(section)
}

impl Package {
    /// Sections accepted by `filter`, in native order.
    pub fn query_sections(
        &self,
        filter: &SectionFilter<'_>,
    ) -> Result<Vec<Section<'_>>> {
        Ok(self.sections()?.into_iter().filter(|s| filter(s)).collect())
    }

    /// First section accepted by `filter`.
    pub fn query_one(
        &self,
        filter: &SectionFilter<'_>,
    ) -> Result<Option<Section<'_>>> {
        Ok(self.sections()?.into_iter().find(|s| filter(s)))
    }
}
