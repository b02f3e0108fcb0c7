//! In-process configuration store.
//!
//! Behaves like libuci for everything the bindings observe: one file per
//! package under the config directory decides existence, `load` parses into a
//! private tree, `commit` makes the tree visible to later loads, and the
//! generated names of anonymous sections follow the `cfgXXYYYY` shape.
//! Committed trees live in memory; the package files only mark existence.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use crate::constants::ANONYMOUS_SECTION_PREFIX;
use crate::handles::HandleRegistry;
use crate::uci::OptionValue;
use crate::uci::PackageId;
use crate::uci::SectionRef;
use crate::uci::UciBackend;
use crate::uci::UciOption;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone, Default)]
struct PackageTree {
    sections: Vec<SectionNode>,
    /// Sections ever added; feeds anonymous name generation
    n_section: u32,
}

#[derive(Debug, Clone)]
struct SectionNode {
    info: SectionRef,
    options: Vec<UciOption>,
}

#[derive(Debug)]
struct LoadedPackage {
    name: String,
    tree: PackageTree,
}

/// Store whose committed state is kept in memory
pub struct MemoryStore {
    config_dir: PathBuf,
    committed: Mutex<HashMap<String, PackageTree>>,
    loaded: HandleRegistry<LoadedPackage>,
    commits: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            committed: Mutex::new(HashMap::new()),
            loaded: HandleRegistry::new(),
            commits: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of successful commits since creation.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of packages currently loaded.
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed("uci context"));
        }
        Ok(())
    }

    fn with_tree<R>(
        &self,
        package: PackageId,
        f: impl FnOnce(&mut PackageTree) -> Result<R>,
    ) -> Result<R> {
        self.ensure_open()?;
        let mut entry = self
            .loaded
            .get_mut(package.0)
            .ok_or_else(|| Error::NotFound(format!("package handle {}", package.0)))?;
        f(&mut entry.tree)
    }

    fn with_section<R>(
        &self,
        package: PackageId,
        section: &str,
        f: impl FnOnce(&mut SectionNode) -> Result<R>,
    ) -> Result<R> {
        self.with_tree(package, |tree| {
            let node = tree
                .sections
                .iter_mut()
                .find(|s| s.info.name == section)
                .ok_or_else(|| Error::NotFound(format!("section {}", section)))?;
            f(node)
        })
    }
}

impl UciBackend for MemoryStore {
    fn load(
        &self,
        package: &str,
    ) -> Result<PackageId> {
        self.ensure_open()?;

        if !self.config_dir.join(package).exists() {
            self.committed.lock().remove(package);
            return Err(Error::NotFound(format!("package {}", package)));
        }

        let tree = self.committed.lock().get(package).cloned().unwrap_or_default();
        let id = self.loaded.insert(LoadedPackage {
            name: package.to_string(),
            tree,
        });
        debug!(package, id, "loaded package");

        Ok(PackageId(id))
    }

    fn unload(
        &self,
        package: PackageId,
    ) -> Result<()> {
        self.ensure_open()?;
        match self.loaded.remove(package.0) {
            Some(loaded) => {
                debug!(package = %loaded.name, id = package.0, "unloaded package");
                Ok(())
            }
            None => Err(Error::NotFound(format!("package handle {}", package.0))),
        }
    }

    fn commit(
        &self,
        package: PackageId,
        _overwrite: bool,
    ) -> Result<()> {
        self.ensure_open()?;
        let entry = self
            .loaded
            .get(package.0)
            .ok_or_else(|| Error::NotFound(format!("package handle {}", package.0)))?;

        self.committed.lock().insert(entry.name.clone(), entry.tree.clone());
        self.commits.fetch_add(1, Ordering::SeqCst);
        trace!(package = %entry.name, "committed package");

        Ok(())
    }

    fn sections(
        &self,
        package: PackageId,
    ) -> Result<Vec<SectionRef>> {
        self.with_tree(package, |tree| {
            Ok(tree.sections.iter().map(|s| s.info.clone()).collect())
        })
    }

    fn lookup_section(
        &self,
        package: PackageId,
        name: &str,
    ) -> Result<Option<SectionRef>> {
        self.with_tree(package, |tree| {
            Ok(tree
                .sections
                .iter()
                .find(|s| s.info.name == name)
                .map(|s| s.info.clone()))
        })
    }

    fn set_section(
        &self,
        package: PackageId,
        name: &str,
        section_type: &str,
    ) -> Result<()> {
        self.with_tree(package, |tree| {
            if let Some(node) = tree.sections.iter_mut().find(|s| s.info.name == name) {
                node.info.section_type = section_type.to_string();
                return Ok(());
            }

            tree.n_section += 1;
            tree.sections.push(SectionNode {
                info: SectionRef::new(name, section_type, false),
                options: Vec::new(),
            });
            Ok(())
        })
    }

    fn add_section(
        &self,
        package: PackageId,
        section_type: &str,
    ) -> Result<SectionRef> {
        self.with_tree(package, |tree| {
            let name = loop {
                let candidate = anonymous_name(tree.n_section, section_type);
                tree.n_section += 1;
                if !tree.sections.iter().any(|s| s.info.name == candidate) {
                    break candidate;
                }
            };

            let info = SectionRef::new(name, section_type, true);
            tree.sections.push(SectionNode {
                info: info.clone(),
                options: Vec::new(),
            });
            Ok(info)
        })
    }

    fn delete_section(
        &self,
        package: PackageId,
        name: &str,
    ) -> Result<()> {
        self.with_tree(package, |tree| {
            let before = tree.sections.len();
            tree.sections.retain(|s| s.info.name != name);
            if tree.sections.len() == before {
                return Err(Error::NotFound(format!("section {}", name)));
            }
            Ok(())
        })
    }

    fn options(
        &self,
        package: PackageId,
        section: &str,
    ) -> Result<Vec<UciOption>> {
        self.with_section(package, section, |node| Ok(node.options.clone()))
    }

    fn lookup_option(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
    ) -> Result<Option<OptionValue>> {
        self.with_section(package, section, |node| {
            Ok(node
                .options
                .iter()
                .find(|o| o.name == option)
                .map(|o| o.value.clone()))
        })
    }

    fn set_option(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
        value: &str,
    ) -> Result<()> {
        self.with_section(package, section, |node| {
            if value.is_empty() {
                node.options.retain(|o| o.name != option);
                return Ok(());
            }

            match node.options.iter_mut().find(|o| o.name == option) {
                Some(existing) => existing.value = OptionValue::String(value.to_string()),
                None => node.options.push(UciOption::new(option, value)),
            }
            Ok(())
        })
    }

    fn delete_option(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
    ) -> Result<()> {
        self.with_section(package, section, |node| {
            let before = node.options.len();
            node.options.retain(|o| o.name != option);
            if node.options.len() == before {
                return Err(Error::NotFound(format!("option {}.{}", section, option)));
            }
            Ok(())
        })
    }

    fn add_list(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
        value: &str,
    ) -> Result<()> {
        self.with_section(package, section, |node| {
            match node.options.iter_mut().find(|o| o.name == option) {
                Some(existing) => match &mut existing.value {
                    OptionValue::List(values) => values.push(value.to_string()),
                    OptionValue::String(old) => {
                        // a string option turns into a list keeping its value
                        let old = std::mem::take(old);
                        existing.value = OptionValue::List(vec![old, value.to_string()]);
                    }
                },
                None => node
                    .options
                    .push(UciOption::new(option, vec![value.to_string()])),
            }
            Ok(())
        })
    }

    fn del_list(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
        value: &str,
    ) -> Result<()> {
        self.with_section(package, section, |node| {
            let index = node
                .options
                .iter()
                .position(|o| o.name == option)
                .ok_or_else(|| Error::NotFound(format!("option {}.{}", section, option)))?;

            if let OptionValue::List(values) = &mut node.options[index].value {
                values.retain(|v| v != value);
                if values.is_empty() {
                    node.options.remove(index);
                }
            }
            Ok(())
        })
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let released = self.loaded.drain();
        debug!(packages = released.len(), "closed memory uci context");
    }
}

fn anonymous_name(
    index: u32,
    section_type: &str,
) -> String {
    // FNV-1a folded to 16 bits
    let mut hash: u32 = 0x811c9dc5;
    for byte in section_type.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    let folded = (hash >> 16) ^ (hash & 0xffff);

    format!("{}{:02x}{:04x}", ANONYMOUS_SECTION_PREFIX, index & 0xff, folded)
}
