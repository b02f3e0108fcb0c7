use crate::uci::OptionValue;
use crate::uci::PackageId;
use crate::uci::SectionRef;
use crate::uci::UciOption;
use crate::Result;

#[cfg(test)]
use mockall::automock;

/// Primitive operations of the native configuration store.
///
/// Mirrors the libuci surface the bindings need. Packages are addressed by
/// the handle returned from `load`; sections by name (anonymous sections by
/// their generated name). Implementations own every native pointer.
#[cfg_attr(test, automock)]
pub trait UciBackend: Send + Sync {
    /// Parses the package file into an in-memory tree.
    fn load(
        &self,
        package: &str,
    ) -> Result<PackageId>;

    /// Releases the in-memory tree without committing.
    fn unload(
        &self,
        package: PackageId,
    ) -> Result<()>;

    /// Writes pending changes of the tree to the store.
    fn commit(
        &self,
        package: PackageId,
        overwrite: bool,
    ) -> Result<()>;

    /// Every section in native (declaration) order.
    fn sections(
        &self,
        package: PackageId,
    ) -> Result<Vec<SectionRef>>;

    fn lookup_section(
        &self,
        package: PackageId,
        name: &str,
    ) -> Result<Option<SectionRef>>;

    /// Creates a named section, or re-types it if it already exists.
    fn set_section(
        &self,
        package: PackageId,
        name: &str,
        section_type: &str,
    ) -> Result<()>;

    /// Creates a section whose name is generated by the store.
    fn add_section(
        &self,
        package: PackageId,
        section_type: &str,
    ) -> Result<SectionRef>;

    fn delete_section(
        &self,
        package: PackageId,
        name: &str,
    ) -> Result<()>;

    fn options(
        &self,
        package: PackageId,
        section: &str,
    ) -> Result<Vec<UciOption>>;

    fn lookup_option(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
    ) -> Result<Option<OptionValue>>;

    /// Sets a single-value option; an empty value deletes the option.
    fn set_option(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
        value: &str,
    ) -> Result<()>;

    fn delete_option(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
    ) -> Result<()>;

    /// Appends one entry to a list option, creating the list if needed.
    fn add_list(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
        value: &str,
    ) -> Result<()>;

    /// Removes every matching entry from a list option.
    fn del_list(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
        value: &str,
    ) -> Result<()>;

    /// Frees the native context and every package still loaded under it.
    /// Calling it again is a no-op.
    fn close(&self);
}
