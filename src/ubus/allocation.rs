//! Native representation of a registered object.
//!
//! libubus keeps pointers to the object name, the method table and every
//! policy entry for as long as the object is registered. One
//! [`ObjectAllocation`] owns all of that memory; dropping it releases each
//! piece exactly once, so the transport must have removed the object first.

use std::ffi::c_char;
use std::ffi::c_int;
use std::ffi::CString;
use std::ptr;

use crate::ubus::BlobmsgType;
use crate::ubus::MethodField;
use crate::ubus::UbusObject;
use crate::Error;
use crate::Result;

/// Policy entry handed to the C side (`struct blobmsg_policy` shape).
#[repr(C)]
#[derive(Debug)]
pub struct RawPolicy {
    pub name: *const c_char,
    pub kind: c_int,
}

/// Method entry handed to the C side.
#[repr(C)]
#[derive(Debug)]
pub struct RawMethod {
    pub name: *const c_char,
    pub policy: *const RawPolicy,
    pub n_policy: c_int,
}

/// Method description kept for transports that validate in process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: String,
    pub fields: Vec<MethodField>,
}

#[derive(Debug)]
pub struct ObjectAllocation {
    name: String,
    specs: Vec<MethodSpec>,
    c_name: CString,
    // Backing storage; the raw tables below point into these.
    _method_names: Vec<CString>,
    _field_names: Vec<Vec<CString>>,
    policies: Vec<Vec<RawPolicy>>,
    methods: Vec<RawMethod>,
}

// SAFETY: the raw pointers only reference heap storage owned by this struct,
// which is never mutated after construction.
unsafe impl Send for ObjectAllocation {}
unsafe impl Sync for ObjectAllocation {}

impl ObjectAllocation {
    pub fn new(object: &UbusObject) -> Result<Self> {
        let c_name = c_string(&object.name)?;

        let mut method_names = Vec::with_capacity(object.methods.len());
        let mut field_names = Vec::with_capacity(object.methods.len());
        let mut policies = Vec::with_capacity(object.methods.len());
        let mut specs = Vec::with_capacity(object.methods.len());

        for method in &object.methods {
            method_names.push(c_string(&method.name)?);

            let names = method
                .fields
                .iter()
                .map(|field| c_string(&field.name))
                .collect::<Result<Vec<_>>>()?;
            let policy = names
                .iter()
                .zip(&method.fields)
                .map(|(name, field)| RawPolicy {
                    name: name.as_ptr(),
                    kind: field.kind.to_native(),
                })
                .collect::<Vec<_>>();

            field_names.push(names);
            policies.push(policy);
            specs.push(MethodSpec {
                name: method.name.clone(),
                fields: method.fields.clone(),
            });
        }

        let methods = method_names
            .iter()
            .zip(&policies)
            .map(|(name, policy)| RawMethod {
                name: name.as_ptr(),
                policy: if policy.is_empty() {
                    ptr::null()
                } else {
                    policy.as_ptr()
                },
                n_policy: policy.len() as c_int,
            })
            .collect();

        Ok(Self {
            name: object.name.clone(),
            specs,
            c_name,
            _method_names: method_names,
            _field_names: field_names,
            policies,
            methods,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[MethodSpec] {
        &self.specs
    }

    pub fn method(
        &self,
        name: &str,
    ) -> Option<&MethodSpec> {
        self.specs.iter().find(|m| m.name == name)
    }

    pub fn c_name(&self) -> *const c_char {
        self.c_name.as_ptr()
    }

    pub fn raw_methods(&self) -> &[RawMethod] {
        &self.methods
    }

    /// Total policy entries across all methods.
    pub fn policy_count(&self) -> usize {
        self.policies.iter().map(Vec::len).sum()
    }
}

impl MethodSpec {
    /// Kind declared for `field`, if any.
    pub fn kind_of(
        &self,
        field: &str,
    ) -> Option<BlobmsgType> {
        self.fields.iter().find(|f| f.name == field).map(|f| f.kind)
    }
}

fn c_string(value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| Error::Validation(format!("{:?} contains a NUL byte", value)))
}
