use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::config::UciConfig;
use crate::uci::by_option;
use crate::uci::by_type;
use crate::uci::by_type_and_option;
use crate::uci::Package;
use crate::uci::Section;
use crate::uci::SectionFilter;
use crate::uci::SectionRef;
use crate::uci::UciCommand;
use crate::uci::UciContext;
use crate::Error;
use crate::Result;

/// A record bound to a section target.
///
/// Saving needs `section` or a non-blank `section_type` (with an optional
/// name; none means a new anonymous section). Loading needs `section` or a
/// non-blank `section_name`.
#[derive(Debug, Clone, Default)]
pub struct UciFragment<T> {
    pub section: Option<SectionRef>,
    pub section_name: String,
    pub section_type: String,
    pub content: T,
}

impl<T> UciFragment<T> {
    pub fn named(
        section_name: impl Into<String>,
        section_type: impl Into<String>,
        content: T,
    ) -> Self {
        Self {
            section: None,
            section_name: section_name.into(),
            section_type: section_type.into(),
            content,
        }
    }

    pub fn at(
        section: SectionRef,
        content: T,
    ) -> Self {
        Self {
            section: Some(section),
            section_name: String::new(),
            section_type: String::new(),
            content,
        }
    }
}

/// Batches mutations of one package behind a single commit.
///
/// Clean until a command or save succeeds, dirty afterwards. Flush and close
/// commit only a dirty package, so a client that changed nothing never
/// writes.
pub struct UciClient {
    ctx: UciContext,
    package: Option<Package>,
    dirty: bool,
    owns_context: bool,
}

impl UciClient {
    /// Client over its own context, closed together with the client.
    pub fn open(
        package_name: &str,
        config: UciConfig,
    ) -> Result<Self> {
        let ctx = UciContext::open(config)?;
        match ctx.add_package(package_name) {
            Ok(package) => Ok(Self {
                ctx,
                package: Some(package),
                dirty: false,
                owns_context: true,
            }),
            Err(e) => {
                ctx.close();
                Err(e)
            }
        }
    }

    /// Client sharing an external context, which stays open on close.
    pub fn with_context(
        ctx: UciContext,
        package_name: &str,
    ) -> Result<Self> {
        let package = ctx.add_package(package_name)?;
        Ok(Self {
            ctx,
            package: Some(package),
            dirty: false,
            owns_context: false,
        })
    }

    pub fn context(&self) -> &UciContext {
        &self.ctx
    }

    pub fn package(&self) -> Result<&Package> {
        self.package.as_ref().ok_or(Error::Closed("uci client"))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn exec(
        &mut self,
        command: &mut dyn UciCommand,
    ) -> Result<()> {
        command.exec(self.package()?)?;
        self.dirty = true;
        Ok(())
    }

    /// Commits pending changes; a clean client does nothing.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.package()?.commit(self.ctx.config().overwrite_on_commit)?;
        self.dirty = false;
        Ok(())
    }

    /// Commits once if dirty, unloads the package and closes an owned
    /// context. Later calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        let Some(package) = self.package.take() else {
            return Ok(());
        };

        let committed = if self.dirty {
            package.commit(self.ctx.config().overwrite_on_commit)
        } else {
            Ok(())
        };
        self.dirty = false;

        let unloaded = package.unload();
        if self.owns_context {
            self.ctx.close();
        }
        debug!("closed uci client");

        committed.and(unloaded)
    }

    /// Deletes the package's backing file.
    pub fn remove(&self) -> Result<()> {
        self.ctx.del_package(self.package()?.name())
    }

    /// Writes the fragment's record; returns the section written.
    pub fn save<T: Serialize>(
        &mut self,
        fragment: &UciFragment<T>,
    ) -> Result<SectionRef> {
        let package = self.package()?;

        let section = match &fragment.section {
            Some(section) => {
                package.marshal_into(section, &fragment.content, false)?;
                section.clone()
            }
            None if fragment.section_type.trim().is_empty() => {
                return Err(Error::Validation("fragment section must be specified".into()));
            }
            None => {
                let name = Some(fragment.section_name.as_str()).filter(|n| !n.trim().is_empty());
                package.marshal(name, &fragment.section_type, &fragment.content, false)?
            }
        };

        self.dirty = true;
        Ok(section)
    }

    /// Reads the fragment's section into its record.
    pub fn load<T: DeserializeOwned>(
        &self,
        fragment: &mut UciFragment<T>,
    ) -> Result<()> {
        let package = self.package()?;

        fragment.content = match &fragment.section {
            Some(section) => package.unmarshal_section(section)?,
            None if fragment.section_name.trim().is_empty() => {
                return Err(Error::Validation("fragment section must be specified".into()));
            }
            None => package.unmarshal(&fragment.section_name)?,
        };
        Ok(())
    }

    pub fn load_section_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Section<'_>>> {
        self.package()?.section(name)
    }

    pub fn query_section(
        &self,
        filter: &SectionFilter<'_>,
    ) -> Result<Vec<Section<'_>>> {
        self.package()?.query_sections(filter)
    }

    pub fn query_section_by_type(
        &self,
        section_type: &str,
    ) -> Result<Vec<Section<'_>>> {
        self.package()?.query_sections(&by_type(section_type))
    }

    pub fn query_section_by_option(
        &self,
        name: &str,
        value: &str,
    ) -> Result<Vec<Section<'_>>> {
        self.package()?.query_sections(&by_option(name, value))
    }

    pub fn query_one_by_option(
        &self,
        name: &str,
        value: &str,
    ) -> Result<Option<Section<'_>>> {
        self.package()?.query_one(&by_option(name, value))
    }

    pub fn query_section_by_type_and_option(
        &self,
        section_type: &str,
        name: &str,
        value: &str,
    ) -> Result<Vec<Section<'_>>> {
        self.package()?
            .query_sections(&by_type_and_option(section_type, name, value))
    }

    pub fn query_one_by_type_and_option(
        &self,
        section_type: &str,
        name: &str,
        value: &str,
    ) -> Result<Option<Section<'_>>> {
        self.package()?
            .query_one(&by_type_and_option(section_type, name, value))
    }
}

impl Drop for UciClient {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("closing uci client on drop failed: {}", e);
        }
    }
}
