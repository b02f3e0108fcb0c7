use std::ffi::c_int;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::NativeError;

/// Wire type of one method argument, as declared in the method policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobmsgType {
    Unspec,
    Array,
    Table,
    String,
    Int64,
    Int32,
    Int16,
    Int8,
    Bool,
    Double,
}

impl BlobmsgType {
    /// `enum blobmsg_type` value libubox expects in a policy. Bool shares
    /// the int8 tag there.
    pub fn to_native(self) -> c_int {
        match self {
            BlobmsgType::Unspec => 0,
            BlobmsgType::Array => 1,
            BlobmsgType::Table => 2,
            BlobmsgType::String => 3,
            BlobmsgType::Int64 => 4,
            BlobmsgType::Int32 => 5,
            BlobmsgType::Int16 => 6,
            BlobmsgType::Int8 | BlobmsgType::Bool => 7,
            BlobmsgType::Double => 8,
        }
    }

    /// Whether a JSON argument satisfies this wire type.
    pub fn accepts(
        &self,
        value: &Value,
    ) -> bool {
        match self {
            BlobmsgType::Unspec => true,
            BlobmsgType::Array => value.is_array(),
            BlobmsgType::Table => value.is_object(),
            BlobmsgType::String => value.is_string(),
            BlobmsgType::Int64 => value.is_i64() || value.is_u64(),
            BlobmsgType::Int32 => fits(value, i32::MIN as i64, i32::MAX as i64),
            BlobmsgType::Int16 => fits(value, i16::MIN as i64, i16::MAX as i64),
            BlobmsgType::Int8 => fits(value, i8::MIN as i64, i8::MAX as i64),
            // blobmsg_json encodes booleans as int8, so 0/1 pass as well
            BlobmsgType::Bool => value.is_boolean() || fits(value, 0, 1),
            BlobmsgType::Double => value.is_number(),
        }
    }
}

fn fits(
    value: &Value,
    min: i64,
    max: i64,
) -> bool {
    value
        .as_i64()
        .map(|v| (min..=max).contains(&v))
        .unwrap_or(false)
}

/// Status codes of the bus, numbered as libubus numbers them.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UbusStatus {
    Ok = 0,
    InvalidCommand = 1,
    InvalidArgument = 2,
    MethodNotFound = 3,
    NotFound = 4,
    NoData = 5,
    PermissionDenied = 6,
    Timeout = 7,
    NotSupported = 8,
    UnknownError = 9,
    ConnectionFailed = 10,
    NoMemory = 11,
    ParseError = 12,
    SystemError = 13,
}

impl UbusStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let status = match code {
            0 => UbusStatus::Ok,
            1 => UbusStatus::InvalidCommand,
            2 => UbusStatus::InvalidArgument,
            3 => UbusStatus::MethodNotFound,
            4 => UbusStatus::NotFound,
            5 => UbusStatus::NoData,
            6 => UbusStatus::PermissionDenied,
            7 => UbusStatus::Timeout,
            8 => UbusStatus::NotSupported,
            9 => UbusStatus::UnknownError,
            10 => UbusStatus::ConnectionFailed,
            11 => UbusStatus::NoMemory,
            12 => UbusStatus::ParseError,
            13 => UbusStatus::SystemError,
            _ => return None,
        };
        Some(status)
    }

    /// Same text as `ubus_strerror`.
    pub fn message(self) -> &'static str {
        match self {
            UbusStatus::Ok => "Success",
            UbusStatus::InvalidCommand => "Invalid command",
            UbusStatus::InvalidArgument => "Invalid argument",
            UbusStatus::MethodNotFound => "Method not found",
            UbusStatus::NotFound => "Not found",
            UbusStatus::NoData => "No response",
            UbusStatus::PermissionDenied => "Permission denied",
            UbusStatus::Timeout => "Request timed out",
            UbusStatus::NotSupported => "Operation not supported",
            UbusStatus::UnknownError => "Unknown error",
            UbusStatus::ConnectionFailed => "Connection failed",
            UbusStatus::NoMemory => "Out of memory",
            UbusStatus::ParseError => "Parsing message data failed",
            UbusStatus::SystemError => "System error",
        }
    }

    pub fn is_ok(self) -> bool {
        self == UbusStatus::Ok
    }
}

impl fmt::Display for UbusStatus {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl From<UbusStatus> for NativeError {
    fn from(status: UbusStatus) -> Self {
        NativeError::new(status.code(), status.message())
    }
}

/// Native status text for any code, including ones libubus does not know.
pub fn strerror(code: i32) -> &'static str {
    UbusStatus::from_code(code)
        .map(UbusStatus::message)
        .unwrap_or("Unknown error")
}

/// Numeric id the bus assigned to an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

/// Correlates an async invoke with its reply handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestSeq(pub u32);

/// One event listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Bus context sharing a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

/// Token naming an incoming method call that may still be replied to.
/// Valid only while the method handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplyHandle(pub u64);

/// Incoming method call as seen by a method handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UbusRequest {
    pub object: String,
    pub method: String,
    pub reply: ReplyHandle,
}

/// Method handler: receives the request and its JSON arguments. Replies go
/// out through `UbusContext::send_reply`; the returned status completes the
/// call.
pub type MethodHandler =
    Arc<dyn Fn(&UbusRequest, &str) -> std::result::Result<(), UbusStatus> + Send + Sync>;

/// One declared argument of a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodField {
    pub name: String,
    pub kind: BlobmsgType,
}

impl MethodField {
    pub fn new(
        name: impl Into<String>,
        kind: BlobmsgType,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Clone)]
pub struct UbusMethod {
    pub name: String,
    pub handler: MethodHandler,
    pub fields: Vec<MethodField>,
}

impl fmt::Debug for UbusMethod {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("UbusMethod")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish()
    }
}

/// RPC object exposed on the bus: a path plus its methods, in order.
#[derive(Debug, Clone)]
pub struct UbusObject {
    pub name: String,
    pub methods: Vec<UbusMethod>,
}

impl UbusObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Appends a method; builder style.
    pub fn add_method<F>(
        mut self,
        name: impl Into<String>,
        fields: Vec<MethodField>,
        handler: F,
    ) -> Self
    where
        F: Fn(&UbusRequest, &str) -> std::result::Result<(), UbusStatus> + Send + Sync + 'static,
    {
        self.methods.push(UbusMethod {
            name: name.into(),
            handler: Arc::new(handler),
            fields,
        });
        self
    }

    pub fn method(
        &self,
        name: &str,
    ) -> Option<&UbusMethod> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn status_codes_round_trip_with_native_text() {
        for code in 0..=13 {
            let status = UbusStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(UbusStatus::from_code(14), None);
        assert_eq!(UbusStatus::MethodNotFound.message(), "Method not found");
        assert_eq!(strerror(99), "Unknown error");
    }

    #[test]
    fn native_error_from_status_formats_code_and_text() {
        let err: NativeError = UbusStatus::Timeout.into();

        assert_eq!(err.to_string(), "7: Request timed out");
    }

    #[test]
    fn policy_types_check_json_kinds() {
        assert!(BlobmsgType::String.accepts(&json!("eth0")));
        assert!(!BlobmsgType::String.accepts(&json!(1)));
        assert!(BlobmsgType::Int32.accepts(&json!(1500)));
        assert!(!BlobmsgType::Int8.accepts(&json!(300)));
        assert!(BlobmsgType::Bool.accepts(&json!(true)));
        assert!(BlobmsgType::Bool.accepts(&json!(1)));
        assert!(BlobmsgType::Table.accepts(&json!({ "a": 1 })));
        assert!(BlobmsgType::Array.accepts(&json!([1, 2])));
        assert!(BlobmsgType::Unspec.accepts(&json!(null)));
    }

    #[test]
    fn policy_types_use_libubox_numbering() {
        let expected = [
            (BlobmsgType::Unspec, 0),
            (BlobmsgType::Array, 1),
            (BlobmsgType::Table, 2),
            (BlobmsgType::String, 3),
            (BlobmsgType::Int64, 4),
            (BlobmsgType::Int32, 5),
            (BlobmsgType::Int16, 6),
            (BlobmsgType::Int8, 7),
            (BlobmsgType::Bool, 7),
            (BlobmsgType::Double, 8),
        ];
        for (kind, native) in expected {
            assert_eq!(kind.to_native(), native, "{kind:?}");
        }
    }
}
