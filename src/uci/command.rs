//! Mutation intents executed against a loaded package.
//!
//! Each command targets a section either through a reference resolved
//! earlier or by name. Executing through [`crate::uci::UciClient::exec`]
//! marks the client dirty so the change is committed on flush or close.

use crate::uci::Package;
use crate::uci::Section;
use crate::uci::SectionRef;
use crate::Error;
use crate::Result;

pub trait UciCommand {
    fn exec(
        &mut self,
        package: &Package,
    ) -> Result<()>;
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn require_option(name: &str) -> Result<()> {
    if is_blank(name) {
        return Err(Error::Validation("option name must be specified".into()));
    }
    Ok(())
}

/// Resolves the target section: the explicit reference wins over the name.
fn target<'p>(
    package: &'p Package,
    section: Option<&SectionRef>,
    section_name: &str,
) -> Result<Section<'p>> {
    if let Some(info) = section {
        return Ok(package.section_at(info));
    }
    if is_blank(section_name) {
        return Err(Error::Validation("command section must be specified".into()));
    }
    package
        .section(section_name)?
        .ok_or_else(|| Error::NotFound(format!("section {}.{}", package.name(), section_name)))
}

/// Creates a named section (re-typing an existing one) or, without a name,
/// an anonymous one. The resulting reference is kept in `section` so later
/// commands can chain on it.
#[derive(Debug, Clone, Default)]
pub struct AddSection {
    pub section: Option<SectionRef>,
    pub section_name: String,
    pub section_type: String,
}

impl AddSection {
    pub fn named(
        name: impl Into<String>,
        section_type: impl Into<String>,
    ) -> Self {
        Self {
            section: None,
            section_name: name.into(),
            section_type: section_type.into(),
        }
    }

    pub fn anonymous(section_type: impl Into<String>) -> Self {
        Self {
            section: None,
            section_name: String::new(),
            section_type: section_type.into(),
        }
    }
}

impl UciCommand for AddSection {
    fn exec(
        &mut self,
        package: &Package,
    ) -> Result<()> {
        if is_blank(&self.section_type) {
            return Err(Error::Validation("section type must be specified".into()));
        }

        let section = if is_blank(&self.section_name) {
            package.add_anonymous_section(&self.section_type)?
        } else {
            package.add_section(&self.section_name, &self.section_type)?
        };

        self.section = Some(section.info().clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DelSection {
    pub section: Option<SectionRef>,
    pub section_name: String,
}

impl DelSection {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            section: None,
            section_name: name.into(),
        }
    }

    pub fn at(section: SectionRef) -> Self {
        Self {
            section: Some(section),
            section_name: String::new(),
        }
    }
}

impl UciCommand for DelSection {
    fn exec(
        &mut self,
        package: &Package,
    ) -> Result<()> {
        match &self.section {
            Some(info) => package.delete_section(&info.name),
            None if is_blank(&self.section_name) => Err(Error::Validation(
                "command section must be specified".into(),
            )),
            None => package.delete_section(&self.section_name),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SetOption {
    pub section: Option<SectionRef>,
    pub section_name: String,
    pub option_name: String,
    pub option_value: String,
}

impl SetOption {
    pub fn new(
        section_name: impl Into<String>,
        option_name: impl Into<String>,
        option_value: impl Into<String>,
    ) -> Self {
        Self {
            section: None,
            section_name: section_name.into(),
            option_name: option_name.into(),
            option_value: option_value.into(),
        }
    }
}

impl UciCommand for SetOption {
    fn exec(
        &mut self,
        package: &Package,
    ) -> Result<()> {
        let section = target(package, self.section.as_ref(), &self.section_name)?;
        require_option(&self.option_name)?;
        section.set_option(&self.option_name, &self.option_value)
    }
}

/// Appends `option_value` (when non-empty) and then every entry of
/// `option_values` to a list option.
#[derive(Debug, Clone, Default)]
pub struct AddListOption {
    pub section: Option<SectionRef>,
    pub section_name: String,
    pub option_name: String,
    pub option_value: String,
    pub option_values: Vec<String>,
}

impl AddListOption {
    pub fn new(
        section_name: impl Into<String>,
        option_name: impl Into<String>,
        option_values: Vec<String>,
    ) -> Self {
        Self {
            section: None,
            section_name: section_name.into(),
            option_name: option_name.into(),
            option_value: String::new(),
            option_values,
        }
    }
}

impl UciCommand for AddListOption {
    fn exec(
        &mut self,
        package: &Package,
    ) -> Result<()> {
        let section = target(package, self.section.as_ref(), &self.section_name)?;
        require_option(&self.option_name)?;

        if !self.option_value.is_empty() {
            section.add_list(&self.option_name, [&self.option_value])?;
        }
        section.add_list(&self.option_name, &self.option_values)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DelOption {
    pub section: Option<SectionRef>,
    pub section_name: String,
    pub option_name: String,
}

impl DelOption {
    pub fn new(
        section_name: impl Into<String>,
        option_name: impl Into<String>,
    ) -> Self {
        Self {
            section: None,
            section_name: section_name.into(),
            option_name: option_name.into(),
        }
    }
}

impl UciCommand for DelOption {
    fn exec(
        &mut self,
        package: &Package,
    ) -> Result<()> {
        let section = target(package, self.section.as_ref(), &self.section_name)?;
        require_option(&self.option_name)?;
        section.del_option(&self.option_name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DelFromList {
    pub section: Option<SectionRef>,
    pub section_name: String,
    pub option_name: String,
    pub option_value: String,
}

impl DelFromList {
    pub fn new(
        section_name: impl Into<String>,
        option_name: impl Into<String>,
        option_value: impl Into<String>,
    ) -> Self {
        Self {
            section: None,
            section_name: section_name.into(),
            option_name: option_name.into(),
            option_value: option_value.into(),
        }
    }
}

impl UciCommand for DelFromList {
    fn exec(
        &mut self,
        package: &Package,
    ) -> Result<()> {
        let section = target(package, self.section.as_ref(), &self.section_name)?;
        require_option(&self.option_name)?;
        section.del_from_list(&self.option_name, &self.option_value)
    }
}
