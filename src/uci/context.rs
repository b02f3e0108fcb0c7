use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::config::UciConfig;
use crate::uci::de::from_options;
use crate::uci::ser::to_options;
use crate::uci::MemoryStore;
use crate::uci::OptionValue;
use crate::uci::PackageId;
use crate::uci::SectionRef;
use crate::uci::UciBackend;
use crate::uci::UciOption;
use crate::Error;
use crate::Result;

/// Connection to the configuration store.
///
/// Cheap to clone; every clone shares the one native handle. Packages keep
/// the context alive, so a package can never outlive it.
#[derive(Clone)]
pub struct UciContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    backend: Arc<dyn UciBackend>,
    config: UciConfig,
    closed: AtomicBool,
}

impl std::fmt::Debug for UciContext {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("UciContext")
            .field("config_dir", &self.inner.config.config_dir)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl UciContext {
    /// Opens the store described by `config`.
    ///
    /// Uses libuci when built with the `native` feature, the in-process
    /// store otherwise.
    pub fn open(config: UciConfig) -> Result<Self> {
        config.validate()?;

        #[cfg(feature = "native")]
        let backend: Arc<dyn UciBackend> = Arc::new(crate::uci::NativeStore::open(&config)?);
        #[cfg(not(feature = "native"))]
        let backend: Arc<dyn UciBackend> = Arc::new(MemoryStore::new(config.config_dir.clone()));

        Ok(Self::with_backend(backend, config))
    }

    /// Context over an in-process store rooted at `config.config_dir`.
    pub fn in_memory(config: UciConfig) -> Self {
        let backend = Arc::new(MemoryStore::new(config.config_dir.clone()));
        Self::with_backend(backend, config)
    }

    pub fn with_backend(
        backend: Arc<dyn UciBackend>,
        config: UciConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                backend,
                config,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &UciConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn backend(&self) -> Result<&dyn UciBackend> {
        if self.is_closed() {
            return Err(Error::Closed("uci context"));
        }
        Ok(self.inner.backend.as_ref())
    }

    /// Loads an existing package.
    pub fn load_package(
        &self,
        name: &str,
    ) -> Result<Package> {
        let id = self.backend()?.load(name)?;
        Ok(Package {
            name: name.to_string(),
            id,
            ctx: self.clone(),
            loaded: true,
        })
    }

    /// Loads a package, creating its backing file first when absent.
    /// An existing file is never truncated.
    pub fn add_package(
        &self,
        name: &str,
    ) -> Result<Package> {
        let path = self.inner.config.package_path(name);
        if !path.exists() {
            OpenOptions::new().create(true).append(true).open(&path)?;
            debug!(package = name, ?path, "created package file");
        }
        self.load_package(name)
    }

    /// Removes the package's backing file. Absent files are not an error.
    pub fn del_package(
        &self,
        name: &str,
    ) -> Result<()> {
        self.backend()?;
        let path = self.inner.config.package_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(package = name, ?path, "deleted package file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes one option value and makes it take effect.
    pub fn set(
        &self,
        package: &str,
        section: &str,
        option: &str,
        value: &str,
    ) -> Result<()> {
        let pkg = self.load_package(package)?;
        if pkg.section(section)?.is_none() {
            return Err(Error::NotFound(format!("section {}.{}", package, section)));
        }
        self.backend()?.set_option(pkg.id, section, option, value)?;
        pkg.take_effect()
    }

    /// Replaces `section` in `package` with the record and commits.
    ///
    /// The package is created when missing.
    pub fn marshal<T: Serialize + ?Sized>(
        &self,
        package: &str,
        section: &str,
        section_type: &str,
        record: &T,
    ) -> Result<()> {
        if package.trim().is_empty() || section.trim().is_empty() {
            return Err(Error::Validation("package or section must not be empty".into()));
        }

        let pkg = self.add_package(package)?;
        pkg.marshal(Some(section), section_type, record, true)?;
        pkg.unload()
    }

    pub fn unmarshal<T: DeserializeOwned>(
        &self,
        package: &str,
        section: &str,
    ) -> Result<T> {
        let pkg = self.load_package(package)?;
        pkg.unmarshal(section)
    }

    /// Releases the native handle and every package still loaded under it.
    ///
    /// Idempotent; later use of the context or its packages fails with
    /// [`Error::Closed`].
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.backend.close();
        debug!("closed uci context");
    }
}

/// A package loaded into a context.
///
/// Unloads on drop without committing.
pub struct Package {
    name: String,
    id: PackageId,
    ctx: UciContext,
    loaded: bool,
}

impl std::fmt::Debug for Package {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

impl Package {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> PackageId {
        self.id
    }

    pub fn context(&self) -> &UciContext {
        &self.ctx
    }

    fn backend(&self) -> Result<&dyn UciBackend> {
        self.ctx.backend()
    }

    pub fn commit(
        &self,
        overwrite: bool,
    ) -> Result<()> {
        self.backend()?.commit(self.id, overwrite).map_err(|e| {
            warn!(package = %self.name, "commit failed: {}", e);
            e
        })
    }

    /// Commits with the configured overwrite mode, then unloads.
    pub fn take_effect(self) -> Result<()> {
        self.commit(self.ctx.config().overwrite_on_commit)?;
        self.unload()
    }

    /// Releases the in-memory tree without committing.
    pub fn unload(mut self) -> Result<()> {
        self.loaded = false;
        self.backend()?.unload(self.id)
    }

    pub fn section(
        &self,
        name: &str,
    ) -> Result<Option<Section<'_>>> {
        Ok(self
            .backend()?
            .lookup_section(self.id, name)?
            .map(|info| Section { package: self, info }))
    }

    /// Section handle for a reference resolved earlier.
    pub fn section_at(
        &self,
        info: &SectionRef,
    ) -> Section<'_> {
        Section {
            package: self,
            info: info.clone(),
        }
    }

    /// Every section in native order.
    pub fn sections(&self) -> Result<Vec<Section<'_>>> {
        Ok(self
            .backend()?
            .sections(self.id)?
            .into_iter()
            .map(|info| Section { package: self, info })
            .collect())
    }

    /// Creates the named section, or re-types it if it exists.
    pub fn add_section(
        &self,
        name: &str,
        section_type: &str,
    ) -> Result<Section<'_>> {
        let backend = self.backend()?;
        backend.set_section(self.id, name, section_type)?;
        let info = backend
            .lookup_section(self.id, name)?
            .ok_or_else(|| Error::NotFound(format!("section {}.{}", self.name, name)))?;
        Ok(Section { package: self, info })
    }

    pub fn add_anonymous_section(
        &self,
        section_type: &str,
    ) -> Result<Section<'_>> {
        let info = self.backend()?.add_section(self.id, section_type)?;
        trace!(package = %self.name, section = %info.name, "added anonymous section");
        Ok(Section { package: self, info })
    }

    /// Deletes a section by name; anonymous sections go by their generated
    /// name.
    pub fn delete_section(
        &self,
        name: &str,
    ) -> Result<()> {
        self.backend()?.delete_section(self.id, name)
    }

    /// Writes `record` as a section of `section_type`.
    ///
    /// Without a name an anonymous section is created. A named section is
    /// replaced: any existing section of that name is deleted first, so
    /// options missing from the record do not survive.
    pub fn marshal<T: Serialize + ?Sized>(
        &self,
        section: Option<&str>,
        section_type: &str,
        record: &T,
        autocommit: bool,
    ) -> Result<SectionRef> {
        let options = to_options(record)?;
        let backend = self.backend()?;

        let info = match section {
            None => backend.add_section(self.id, section_type)?,
            Some(name) => {
                if backend.lookup_section(self.id, name)?.is_some() {
                    backend.delete_section(self.id, name)?;
                }
                backend.set_section(self.id, name, section_type)?;
                SectionRef::new(name, section_type, false)
            }
        };

        self.write_options(&info.name, options, false)?;

        if autocommit {
            self.commit(self.ctx.config().overwrite_on_commit)?;
        }
        Ok(info)
    }

    /// Writes `record` into an existing section, replacing every option the
    /// record names and leaving the others alone.
    pub fn marshal_into<T: Serialize + ?Sized>(
        &self,
        section: &SectionRef,
        record: &T,
        autocommit: bool,
    ) -> Result<()> {
        let options = to_options(record)?;
        if self.backend()?.lookup_section(self.id, &section.name)?.is_none() {
            return Err(Error::NotFound(format!("section {}.{}", self.name, section.name)));
        }

        self.write_options(&section.name, options, true)?;

        if autocommit {
            self.commit(self.ctx.config().overwrite_on_commit)?;
        }
        Ok(())
    }

    fn write_options(
        &self,
        section: &str,
        options: Vec<(String, OptionValue)>,
        replace: bool,
    ) -> Result<()> {
        let backend = self.backend()?;
        for (name, value) in options {
            if replace && backend.lookup_option(self.id, section, &name)?.is_some() {
                backend.delete_option(self.id, section, &name)?;
            }
            match value {
                OptionValue::String(v) => backend.set_option(self.id, section, &name, &v)?,
                OptionValue::List(values) => {
                    for v in values {
                        backend.add_list(self.id, section, &name, &v)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Reads the named section into a record.
    pub fn unmarshal<T: DeserializeOwned>(
        &self,
        section: &str,
    ) -> Result<T> {
        let info = self
            .backend()?
            .lookup_section(self.id, section)?
            .ok_or_else(|| Error::NotFound(format!("section {}.{}", self.name, section)))?;
        self.unmarshal_section(&info)
    }

    pub fn unmarshal_section<T: DeserializeOwned>(
        &self,
        section: &SectionRef,
    ) -> Result<T> {
        let options = self.backend()?.options(self.id, &section.name)?;
        Ok(from_options(&options, self.ctx.config().strict_kinds)?)
    }
}

impl Drop for Package {
    fn drop(&mut self) {
        if !self.loaded || self.ctx.is_closed() {
            return;
        }
        if let Err(e) = self.ctx.inner.backend.unload(self.id) {
            debug!(package = %self.name, "unload on drop failed: {}", e);
        }
    }
}

/// A section of a loaded package. Borrows the package, so it cannot
/// outlive it.
#[derive(Debug, Clone)]
pub struct Section<'p> {
    package: &'p Package,
    info: SectionRef,
}

impl<'p> Section<'p> {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn section_type(&self) -> &str {
        &self.info.section_type
    }

    pub fn is_anonymous(&self) -> bool {
        self.info.anonymous
    }

    pub fn info(&self) -> &SectionRef {
        &self.info
    }

    pub fn package(&self) -> &'p Package {
        self.package
    }

    pub fn option(
        &self,
        name: &str,
    ) -> Result<Option<OptionValue>> {
        self.package
            .backend()?
            .lookup_option(self.package.id, &self.info.name, name)
    }

    pub fn options(&self) -> Result<Vec<UciOption>> {
        self.package.backend()?.options(self.package.id, &self.info.name)
    }

    /// Sets a single-value option; an empty value deletes it.
    pub fn set_option(
        &self,
        name: &str,
        value: &str,
    ) -> Result<()> {
        self.package
            .backend()?
            .set_option(self.package.id, &self.info.name, name, value)
    }

    /// Appends each value to the list option `name`.
    pub fn add_list<I, S>(
        &self,
        name: &str,
        values: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let backend = self.package.backend()?;
        for value in values {
            backend.add_list(self.package.id, &self.info.name, name, value.as_ref())?;
        }
        Ok(())
    }

    pub fn del_option(
        &self,
        name: &str,
    ) -> Result<()> {
        self.package
            .backend()?
            .delete_option(self.package.id, &self.info.name, name)
    }

    pub fn del_from_list(
        &self,
        name: &str,
        value: &str,
    ) -> Result<()> {
        self.package
            .backend()?
            .del_list(self.package.id, &self.info.name, name, value)
    }
}
