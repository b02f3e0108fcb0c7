//! libuci backend.
//!
//! Every native pointer stays behind the context mutex; packages are handed
//! out as registry handles. List walking happens in `native/uci_shim.c`,
//! which reports sections and options through callbacks.

use std::ffi::c_char;
use std::ffi::c_int;
use std::ffi::c_void;
use std::ffi::CStr;
use std::ffi::CString;
use std::ptr;

use parking_lot::Mutex;
use tracing::debug;
use tracing::warn;

use crate::config::UciConfig;
use crate::errors::NativeError;
use crate::handles::HandleRegistry;
use crate::uci::OptionValue;
use crate::uci::PackageId;
use crate::uci::SectionRef;
use crate::uci::UciBackend;
use crate::uci::UciOption;
use crate::Error;
use crate::Result;

const UCI_OK: c_int = 0;
const UCI_ERR_NOTFOUND: c_int = 3;

#[repr(C)]
struct RawContext {
    _private: [u8; 0],
}

#[repr(C)]
struct RawPackage {
    _private: [u8; 0],
}

type SectionCallback = unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char, c_int);
type OptionCallback = unsafe extern "C" fn(*mut c_void, *const c_char, c_int, *const c_char);

extern "C" {
    fn wrt_uci_open(
        confdir: *const c_char,
        savedir: *const c_char,
    ) -> *mut RawContext;
    fn wrt_uci_close(ctx: *mut RawContext);
    fn wrt_uci_error(ctx: *mut RawContext) -> *mut c_char;
    fn wrt_uci_load(
        ctx: *mut RawContext,
        name: *const c_char,
        pkg: *mut *mut RawPackage,
    ) -> c_int;
    fn wrt_uci_unload(
        ctx: *mut RawContext,
        pkg: *mut RawPackage,
    ) -> c_int;
    fn wrt_uci_commit(
        ctx: *mut RawContext,
        pkg: *mut *mut RawPackage,
        overwrite: c_int,
    ) -> c_int;
    fn wrt_uci_foreach_section(
        pkg: *mut RawPackage,
        cb: SectionCallback,
        user: *mut c_void,
    );
    fn wrt_uci_lookup_section(
        ctx: *mut RawContext,
        pkg: *mut RawPackage,
        name: *const c_char,
        cb: SectionCallback,
        user: *mut c_void,
    ) -> c_int;
    fn wrt_uci_foreach_option(
        ctx: *mut RawContext,
        pkg: *mut RawPackage,
        section: *const c_char,
        cb: OptionCallback,
        user: *mut c_void,
    ) -> c_int;
    fn wrt_uci_lookup_option(
        ctx: *mut RawContext,
        pkg: *mut RawPackage,
        section: *const c_char,
        option: *const c_char,
        cb: OptionCallback,
        user: *mut c_void,
    ) -> c_int;
    fn wrt_uci_set_section(
        ctx: *mut RawContext,
        pkg: *mut RawPackage,
        name: *const c_char,
        section_type: *const c_char,
    ) -> c_int;
    fn wrt_uci_add_section(
        ctx: *mut RawContext,
        pkg: *mut RawPackage,
        section_type: *const c_char,
        cb: SectionCallback,
        user: *mut c_void,
    ) -> c_int;
    fn wrt_uci_delete(
        ctx: *mut RawContext,
        pkg: *mut RawPackage,
        section: *const c_char,
        option: *const c_char,
    ) -> c_int;
    fn wrt_uci_set_option(
        ctx: *mut RawContext,
        pkg: *mut RawPackage,
        section: *const c_char,
        option: *const c_char,
        value: *const c_char,
    ) -> c_int;
    fn wrt_uci_add_list(
        ctx: *mut RawContext,
        pkg: *mut RawPackage,
        section: *const c_char,
        option: *const c_char,
        value: *const c_char,
    ) -> c_int;
    fn wrt_uci_del_list(
        ctx: *mut RawContext,
        pkg: *mut RawPackage,
        section: *const c_char,
        option: *const c_char,
        value: *const c_char,
    ) -> c_int;
}

struct ContextPtr(*mut RawContext);
struct PackagePtr(*mut RawPackage);

// SAFETY: the pointers are only dereferenced by libuci while the context
// mutex is held.
unsafe impl Send for ContextPtr {}
unsafe impl Send for PackagePtr {}
unsafe impl Sync for PackagePtr {}

/// Configuration store backed by libuci.
pub struct NativeStore {
    ctx: Mutex<ContextPtr>,
    packages: HandleRegistry<PackagePtr>,
}

fn c_string(value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| Error::Validation(format!("{:?} contains a NUL byte", value)))
}

unsafe fn owned(p: *const c_char) -> String {
    if p.is_null() {
        return String::new();
    }
    CStr::from_ptr(p).to_string_lossy().into_owned()
}

unsafe extern "C" fn collect_section(
    user: *mut c_void,
    name: *const c_char,
    section_type: *const c_char,
    anonymous: c_int,
) {
    let out = &mut *(user as *mut Vec<SectionRef>);
    out.push(SectionRef::new(owned(name), owned(section_type), anonymous != 0));
}

unsafe extern "C" fn collect_option(
    user: *mut c_void,
    name: *const c_char,
    is_list: c_int,
    value: *const c_char,
) {
    let out = &mut *(user as *mut Vec<UciOption>);
    let name = owned(name);
    let value = owned(value);

    if is_list == 0 {
        out.push(UciOption::new(name, value));
        return;
    }

    // list entries arrive one by one, consecutively
    match out.last_mut() {
        Some(UciOption {
            name: last,
            value: OptionValue::List(values),
        }) if *last == name => values.push(value),
        _ => out.push(UciOption::new(name, vec![value])),
    }
}

impl NativeStore {
    pub fn open(config: &UciConfig) -> Result<Self> {
        let confdir = c_string(&config.config_dir.to_string_lossy())?;
        let savedir = match &config.save_dir {
            Some(dir) => Some(c_string(&dir.to_string_lossy())?),
            None => None,
        };

        let ctx = unsafe {
            wrt_uci_open(
                confdir.as_ptr(),
                savedir.as_ref().map_or(ptr::null(), |d| d.as_ptr()),
            )
        };
        if ctx.is_null() {
            return Err(Error::Connect {
                path: config.config_dir.clone(),
                reason: "uci_alloc_context failed".into(),
            });
        }

        debug!(config_dir = ?config.config_dir, "opened libuci context");
        Ok(Self {
            ctx: Mutex::new(ContextPtr(ctx)),
            packages: HandleRegistry::new(),
        })
    }

    fn check(
        ctx: *mut RawContext,
        ret: c_int,
    ) -> Result<()> {
        if ret == UCI_OK {
            return Ok(());
        }

        let message = unsafe {
            let raw = wrt_uci_error(ctx);
            let message = owned(raw);
            if !raw.is_null() {
                libc::free(raw as *mut c_void);
            }
            message
        };
        Err(Error::Native(NativeError::new(ret, message.trim())))
    }

    fn with_package<R>(
        &self,
        package: PackageId,
        f: impl FnOnce(*mut RawContext, &mut *mut RawPackage) -> Result<R>,
    ) -> Result<R> {
        let guard = self.ctx.lock();
        if guard.0.is_null() {
            return Err(Error::Closed("uci context"));
        }
        let mut entry = self
            .packages
            .get_mut(package.0)
            .ok_or_else(|| Error::NotFound(format!("package handle {}", package.0)))?;
        f(guard.0, &mut entry.0)
    }

    fn option_op(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
        value: &str,
        op: unsafe extern "C" fn(
            *mut RawContext,
            *mut RawPackage,
            *const c_char,
            *const c_char,
            *const c_char,
        ) -> c_int,
    ) -> Result<()> {
        let section = c_string(section)?;
        let option = c_string(option)?;
        let value = c_string(value)?;
        self.with_package(package, |ctx, pkg| {
            let ret = unsafe { op(ctx, *pkg, section.as_ptr(), option.as_ptr(), value.as_ptr()) };
            Self::check(ctx, ret)
        })
    }
}

impl UciBackend for NativeStore {
    fn load(
        &self,
        package: &str,
    ) -> Result<PackageId> {
        let name = c_string(package)?;
        let guard = self.ctx.lock();
        if guard.0.is_null() {
            return Err(Error::Closed("uci context"));
        }

        let mut pkg: *mut RawPackage = ptr::null_mut();
        let ret = unsafe { wrt_uci_load(guard.0, name.as_ptr(), &mut pkg) };
        if ret == UCI_ERR_NOTFOUND {
            return Err(Error::NotFound(format!("package {}", package)));
        }
        Self::check(guard.0, ret)?;

        let id = self.packages.insert(PackagePtr(pkg));
        debug!(package, id, "loaded package");
        Ok(PackageId(id))
    }

    fn unload(
        &self,
        package: PackageId,
    ) -> Result<()> {
        let guard = self.ctx.lock();
        if guard.0.is_null() {
            return Err(Error::Closed("uci context"));
        }
        let pkg = self
            .packages
            .remove(package.0)
            .ok_or_else(|| Error::NotFound(format!("package handle {}", package.0)))?;

        let ret = unsafe { wrt_uci_unload(guard.0, pkg.0) };
        Self::check(guard.0, ret)
    }

    fn commit(
        &self,
        package: PackageId,
        overwrite: bool,
    ) -> Result<()> {
        self.with_package(package, |ctx, pkg| {
            // libuci reloads the package and may hand back a new pointer
            let ret = unsafe { wrt_uci_commit(ctx, pkg, overwrite as c_int) };
            Self::check(ctx, ret)
        })
    }

    fn sections(
        &self,
        package: PackageId,
    ) -> Result<Vec<SectionRef>> {
        self.with_package(package, |_, pkg| {
            let mut out: Vec<SectionRef> = Vec::new();
            unsafe {
                wrt_uci_foreach_section(
                    *pkg,
                    collect_section,
                    &mut out as *mut Vec<SectionRef> as *mut c_void,
                )
            };
            Ok(out)
        })
    }

    fn lookup_section(
        &self,
        package: PackageId,
        name: &str,
    ) -> Result<Option<SectionRef>> {
        let cname = c_string(name)?;
        self.with_package(package, |ctx, pkg| {
            let mut out: Vec<SectionRef> = Vec::new();
            unsafe {
                wrt_uci_lookup_section(
                    ctx,
                    *pkg,
                    cname.as_ptr(),
                    collect_section,
                    &mut out as *mut Vec<SectionRef> as *mut c_void,
                )
            };
            Ok(out.pop())
        })
    }

    fn set_section(
        &self,
        package: PackageId,
        name: &str,
        section_type: &str,
    ) -> Result<()> {
        let cname = c_string(name)?;
        let ctype = c_string(section_type)?;
        self.with_package(package, |ctx, pkg| {
            let ret = unsafe { wrt_uci_set_section(ctx, *pkg, cname.as_ptr(), ctype.as_ptr()) };
            Self::check(ctx, ret)
        })
    }

    fn add_section(
        &self,
        package: PackageId,
        section_type: &str,
    ) -> Result<SectionRef> {
        let ctype = c_string(section_type)?;
        self.with_package(package, |ctx, pkg| {
            let mut out: Vec<SectionRef> = Vec::new();
            let ret = unsafe {
                wrt_uci_add_section(
                    ctx,
                    *pkg,
                    ctype.as_ptr(),
                    collect_section,
                    &mut out as *mut Vec<SectionRef> as *mut c_void,
                )
            };
            Self::check(ctx, ret)?;
            out.pop()
                .ok_or_else(|| Error::NotFound(format!("new section of type {}", section_type)))
        })
    }

    fn delete_section(
        &self,
        package: PackageId,
        name: &str,
    ) -> Result<()> {
        let cname = c_string(name)?;
        self.with_package(package, |ctx, pkg| {
            let ret = unsafe { wrt_uci_delete(ctx, *pkg, cname.as_ptr(), ptr::null()) };
            if ret == UCI_ERR_NOTFOUND {
                return Err(Error::NotFound(format!("section {}", name)));
            }
            Self::check(ctx, ret)
        })
    }

    fn options(
        &self,
        package: PackageId,
        section: &str,
    ) -> Result<Vec<UciOption>> {
        let csection = c_string(section)?;
        self.with_package(package, |ctx, pkg| {
            let mut out: Vec<UciOption> = Vec::new();
            let ret = unsafe {
                wrt_uci_foreach_option(
                    ctx,
                    *pkg,
                    csection.as_ptr(),
                    collect_option,
                    &mut out as *mut Vec<UciOption> as *mut c_void,
                )
            };
            if ret == UCI_ERR_NOTFOUND {
                return Err(Error::NotFound(format!("section {}", section)));
            }
            Ok(out)
        })
    }

    fn lookup_option(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
    ) -> Result<Option<OptionValue>> {
        let csection = c_string(section)?;
        let coption = c_string(option)?;
        self.with_package(package, |ctx, pkg| {
            let mut out: Vec<UciOption> = Vec::new();
            let ret = unsafe {
                wrt_uci_lookup_option(
                    ctx,
                    *pkg,
                    csection.as_ptr(),
                    coption.as_ptr(),
                    collect_option,
                    &mut out as *mut Vec<UciOption> as *mut c_void,
                )
            };
            if ret == UCI_ERR_NOTFOUND {
                return Err(Error::NotFound(format!("section {}", section)));
            }
            Ok(out.pop().map(|o| o.value))
        })
    }

    fn set_option(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
        value: &str,
    ) -> Result<()> {
        self.option_op(package, section, option, value, wrt_uci_set_option)
    }

    fn delete_option(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
    ) -> Result<()> {
        let csection = c_string(section)?;
        let coption = c_string(option)?;
        self.with_package(package, |ctx, pkg| {
            let ret = unsafe { wrt_uci_delete(ctx, *pkg, csection.as_ptr(), coption.as_ptr()) };
            if ret == UCI_ERR_NOTFOUND {
                return Err(Error::NotFound(format!("option {}.{}", section, option)));
            }
            Self::check(ctx, ret)
        })
    }

    fn add_list(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
        value: &str,
    ) -> Result<()> {
        self.option_op(package, section, option, value, wrt_uci_add_list)
    }

    fn del_list(
        &self,
        package: PackageId,
        section: &str,
        option: &str,
        value: &str,
    ) -> Result<()> {
        self.option_op(package, section, option, value, wrt_uci_del_list)
    }

    fn close(&self) {
        let mut guard = self.ctx.lock();
        if guard.0.is_null() {
            return;
        }

        // uci_free_context releases every package still loaded
        let released = self.packages.drain();
        unsafe { wrt_uci_close(guard.0) };
        guard.0 = ptr::null_mut();

        if !released.is_empty() {
            warn!(packages = released.len(), "closed libuci context with packages still loaded");
        }
        debug!("closed libuci context");
    }
}

impl Drop for NativeStore {
    fn drop(&mut self) {
        self.close();
    }
}
