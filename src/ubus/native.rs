//! libubus transport.
//!
//! `native/ubus_shim.c` owns every libubus structure. Rust hands it the
//! [`ObjectAllocation`] tables and a pointer to the [`CallbackSink`]; the shim
//! calls back with plain values only. Calls are serialized by the
//! dispatcher's send lock, which the context holds around each of them.

use std::collections::HashMap;
use std::ffi::c_char;
use std::ffi::c_int;
use std::ffi::c_void;
use std::ffi::CStr;
use std::ffi::CString;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::ptr;
use std::sync::atomic::AtomicPtr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::errors::NativeError;
use crate::ubus::strerror;
use crate::ubus::BlobBuf;
use crate::ubus::CallbackSink;
use crate::ubus::ListenerId;
use crate::ubus::ObjectAllocation;
use crate::ubus::ObjectId;
use crate::ubus::RawMethod;
use crate::ubus::ReplyHandle;
use crate::ubus::RequestSeq;
use crate::ubus::UbusConnector;
use crate::ubus::UbusRequest;
use crate::ubus::UbusStatus;
use crate::ubus::UbusTransport;
use crate::Error;
use crate::Result;

#[repr(C)]
struct RawUbus {
    _private: [u8; 0],
}

#[repr(C)]
struct RawObject {
    _private: [u8; 0],
}

type MethodCallback =
    unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char, u64, *const c_char) -> c_int;
type DataCallback = unsafe extern "C" fn(*mut c_void, u32, *const c_char);
type EventCallback = unsafe extern "C" fn(*mut c_void, u64, *const c_char, *const c_char);
type LostCallback = unsafe extern "C" fn(*mut c_void);

extern "C" {
    fn wrt_ubus_connect(
        path: *const c_char,
        user: *mut c_void,
        on_method: MethodCallback,
        on_data: DataCallback,
        on_event: EventCallback,
        on_lost: LostCallback,
    ) -> *mut RawUbus;
    fn wrt_ubus_free(w: *mut RawUbus);
    fn wrt_ubus_reconnect(
        w: *mut RawUbus,
        path: *const c_char,
    ) -> c_int;
    fn wrt_ubus_add_uloop(w: *mut RawUbus);
    fn wrt_ubus_add_object(
        w: *mut RawUbus,
        name: *const c_char,
        methods: *const RawMethod,
        n_methods: c_int,
        id: *mut u32,
        status: *mut c_int,
    ) -> *mut RawObject;
    fn wrt_ubus_free_object(object: *mut RawObject);
    fn wrt_ubus_remove_object(
        w: *mut RawUbus,
        object: *mut RawObject,
    ) -> c_int;
    fn wrt_ubus_lookup_id(
        w: *mut RawUbus,
        path: *const c_char,
        id: *mut u32,
    ) -> c_int;
    fn wrt_ubus_invoke_async(
        w: *mut RawUbus,
        id: u32,
        method: *const c_char,
        json: *const c_char,
        seq: u32,
    ) -> c_int;
    fn wrt_ubus_complete(
        w: *mut RawUbus,
        seq: u32,
        timeout: c_int,
        err: *mut c_int,
    ) -> c_int;
    fn wrt_ubus_release(
        w: *mut RawUbus,
        seq: u32,
    );
    fn wrt_ubus_send_reply(
        w: *mut RawUbus,
        reply: u64,
        json: *const c_char,
    ) -> c_int;
    fn wrt_ubus_register_event(
        w: *mut RawUbus,
        pattern: *const c_char,
        id: u64,
    ) -> c_int;
    fn wrt_ubus_unregister_event(
        w: *mut RawUbus,
        id: u64,
    ) -> c_int;
    fn wrt_ubus_send_event(
        w: *mut RawUbus,
        event: *const c_char,
        json: *const c_char,
    ) -> c_int;
    fn wrt_uloop_init();
    fn wrt_uloop_run() -> c_int;
    fn wrt_uloop_done();
}

/// Process wide event loop of libubox.
pub mod uloop {
    pub fn init() {
        unsafe { super::wrt_uloop_init() }
    }

    /// Runs until [`done`] or a signal ends the loop.
    pub fn run() -> i32 {
        unsafe { super::wrt_uloop_run() }
    }

    pub fn done() {
        unsafe { super::wrt_uloop_done() }
    }
}

fn c_string(value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| Error::Validation(format!("{:?} contains a NUL byte", value)))
}

fn path_string(path: &Path) -> Result<CString> {
    c_string(&path.to_string_lossy())
}

unsafe fn borrowed<'a>(p: *const c_char) -> std::borrow::Cow<'a, str> {
    if p.is_null() {
        return std::borrow::Cow::Borrowed("");
    }
    CStr::from_ptr(p).to_string_lossy()
}

fn check(ret: c_int) -> Result<()> {
    if ret == UbusStatus::Ok.code() {
        return Ok(());
    }
    Err(Error::Native(NativeError::new(ret, strerror(ret))))
}

unsafe extern "C" fn on_method(
    user: *mut c_void,
    object: *const c_char,
    method: *const c_char,
    reply: u64,
    json: *const c_char,
) -> c_int {
    let sink = &*(user as *const CallbackSink);
    let request = UbusRequest {
        object: borrowed(object).into_owned(),
        method: borrowed(method).into_owned(),
        reply: ReplyHandle(reply),
    };
    let payload = borrowed(json);

    match panic::catch_unwind(AssertUnwindSafe(|| sink.on_method(&request, &payload))) {
        Ok(status) => status.code(),
        Err(_) => {
            error!(object = %request.object, method = %request.method, "method handler panicked");
            UbusStatus::UnknownError.code()
        }
    }
}

unsafe extern "C" fn on_data(
    user: *mut c_void,
    seq: u32,
    json: *const c_char,
) {
    let sink = &*(user as *const CallbackSink);
    let payload = borrowed(json);
    if panic::catch_unwind(AssertUnwindSafe(|| sink.on_reply(RequestSeq(seq), &payload))).is_err() {
        error!(seq, "reply handler panicked");
    }
}

unsafe extern "C" fn on_event(
    user: *mut c_void,
    listener: u64,
    event: *const c_char,
    json: *const c_char,
) {
    let sink = &*(user as *const CallbackSink);
    let event = borrowed(event);
    let payload = borrowed(json);
    if panic::catch_unwind(AssertUnwindSafe(|| {
        sink.on_event(ListenerId(listener), &event, &payload)
    }))
    .is_err()
    {
        error!(%event, "event handler panicked");
    }
}

unsafe extern "C" fn on_lost(user: *mut c_void) {
    let sink = &*(user as *const CallbackSink);
    if panic::catch_unwind(AssertUnwindSafe(|| sink.on_connection_lost())).is_err() {
        error!("connection lost hook panicked");
    }
}

/// Connects contexts through libubus.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConnector;

impl UbusConnector for NativeConnector {
    fn connect(
        &self,
        socket: &Path,
        sink: Arc<CallbackSink>,
    ) -> Result<Arc<dyn UbusTransport>> {
        let path = path_string(socket)?;
        let user = Arc::as_ptr(&sink) as *mut c_void;

        let raw = unsafe { wrt_ubus_connect(path.as_ptr(), user, on_method, on_data, on_event, on_lost) };
        if raw.is_null() {
            return Err(Error::Connect {
                path: socket.to_path_buf(),
                reason: UbusStatus::ConnectionFailed.message().to_string(),
            });
        }

        debug!(?socket, "connected to ubusd");
        Ok(Arc::new(NativeTransport {
            raw: AtomicPtr::new(raw),
            objects: Mutex::new(HashMap::new()),
            _sink: sink,
        }))
    }
}

struct ObjectPtr(*mut RawObject);

// SAFETY: only passed back to the shim under the dispatcher's send lock.
unsafe impl Send for ObjectPtr {}

struct NativeTransport {
    raw: AtomicPtr<RawUbus>,
    objects: Mutex<HashMap<ObjectId, ObjectPtr>>,
    // The shim holds a raw pointer to this sink until `wrt_ubus_free`.
    _sink: Arc<CallbackSink>,
}

impl NativeTransport {
    fn raw(&self) -> Result<*mut RawUbus> {
        let raw = self.raw.load(Ordering::SeqCst);
        if raw.is_null() {
            return Err(Error::Closed("ubus connection"));
        }
        Ok(raw)
    }
}

impl UbusTransport for NativeTransport {
    fn add_object(
        &self,
        object: &ObjectAllocation,
    ) -> Result<ObjectId> {
        let raw = self.raw()?;
        let methods = object.raw_methods();
        let mut id = 0u32;
        let mut status: c_int = 0;

        let handle = unsafe {
            wrt_ubus_add_object(
                raw,
                object.c_name(),
                if methods.is_empty() {
                    ptr::null()
                } else {
                    methods.as_ptr()
                },
                methods.len() as c_int,
                &mut id,
                &mut status,
            )
        };
        if handle.is_null() {
            check(status)?;
            return Err(Error::Native(UbusStatus::UnknownError.into()));
        }

        let id = ObjectId(id);
        self.objects.lock().insert(id, ObjectPtr(handle));
        Ok(id)
    }

    fn remove_object(
        &self,
        id: ObjectId,
    ) -> Result<()> {
        let raw = self.raw()?;
        let mut objects = self.objects.lock();
        let handle = objects
            .get(&id)
            .map(|o| o.0)
            .ok_or_else(|| Error::NotFound(format!("object id {}", id.0)))?;

        check(unsafe { wrt_ubus_remove_object(raw, handle) })?;
        // The shim freed its structures on success.
        objects.remove(&id);
        Ok(())
    }

    fn lookup_id(
        &self,
        path: &str,
    ) -> Result<ObjectId> {
        let raw = self.raw()?;
        let path = c_string(path)?;
        let mut id = 0u32;
        check(unsafe { wrt_ubus_lookup_id(raw, path.as_ptr(), &mut id) })?;
        Ok(ObjectId(id))
    }

    fn invoke_async(
        &self,
        id: ObjectId,
        method: &str,
        payload: &BlobBuf,
        seq: RequestSeq,
    ) -> Result<()> {
        let raw = self.raw()?;
        let method = c_string(method)?;
        let json = c_string(&payload.to_json())?;
        check(unsafe { wrt_ubus_invoke_async(raw, id.0, method.as_ptr(), json.as_ptr(), seq.0) })
    }

    fn complete_request(
        &self,
        seq: RequestSeq,
        timeout_ms: u32,
    ) -> Result<()> {
        let raw = self.raw()?;
        let mut errno: c_int = 0;
        let ret = unsafe { wrt_ubus_complete(raw, seq.0, timeout_ms.min(c_int::MAX as u32) as c_int, &mut errno) };
        if ret == UbusStatus::Ok.code() {
            return Ok(());
        }

        if errno == libc::EAGAIN || errno == libc::EINTR {
            return Err(Error::Transient(NativeError::new(ret, strerror(ret))));
        }
        check(ret)
    }

    fn release_request(
        &self,
        seq: RequestSeq,
    ) {
        if let Ok(raw) = self.raw() {
            unsafe { wrt_ubus_release(raw, seq.0) }
        }
    }

    fn send_reply(
        &self,
        reply: ReplyHandle,
        payload: &BlobBuf,
    ) -> Result<()> {
        let raw = self.raw()?;
        let json = c_string(&payload.to_json())?;
        check(unsafe { wrt_ubus_send_reply(raw, reply.0, json.as_ptr()) })
    }

    fn register_event(
        &self,
        pattern: &str,
        listener: ListenerId,
    ) -> Result<()> {
        let raw = self.raw()?;
        let pattern = c_string(pattern)?;
        check(unsafe { wrt_ubus_register_event(raw, pattern.as_ptr(), listener.0) })
    }

    fn unregister_event(
        &self,
        listener: ListenerId,
    ) -> Result<()> {
        let raw = self.raw()?;
        check(unsafe { wrt_ubus_unregister_event(raw, listener.0) })
    }

    fn send_event(
        &self,
        event: &str,
        payload: &BlobBuf,
    ) -> Result<()> {
        let raw = self.raw()?;
        let event = c_string(event)?;
        let json = c_string(&payload.to_json())?;
        check(unsafe { wrt_ubus_send_event(raw, event.as_ptr(), json.as_ptr()) })
    }

    fn reconnect(
        &self,
        socket: &Path,
    ) -> Result<()> {
        let raw = self.raw()?;
        let path = path_string(socket)?;
        check(unsafe { wrt_ubus_reconnect(raw, path.as_ptr()) })
    }

    fn add_to_loop(&self) -> Result<()> {
        let raw = self.raw()?;
        unsafe { wrt_ubus_add_uloop(raw) };
        Ok(())
    }

    fn shutdown(&self) {
        let raw = self.raw.swap(ptr::null_mut(), Ordering::SeqCst);
        if raw.is_null() {
            return;
        }

        let leftover: Vec<ObjectPtr> = self.objects.lock().drain().map(|(_, o)| o).collect();
        if !leftover.is_empty() {
            warn!(leftover = leftover.len(), "freeing ubus connection with objects still registered");
        }
        unsafe {
            wrt_ubus_free(raw);
            for object in leftover {
                wrt_ubus_free_object(object.0);
            }
        }
        debug!("ubus connection freed");
    }
}

impl Drop for NativeTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
