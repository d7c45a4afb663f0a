//! libmpv backend
//!
//! `LibMpv` implements `Engine` over the engine's C client API. Everything
//! crosses the boundary in node form: `Node` trees are laid out in a
//! `NodeArena` for the duration of one call, and engine-owned nodes are copied
//! out and freed immediately.

use mpvkit_core::{
    Engine, EngineResult, EndFileReason, ErrorCode, EventData, EventKind, Format, LogLevel,
    MediaStream, MpvError, MpvResult, Node, RawEvent, StreamOpener,
};
use std::ffi::{CStr, CString};
use std::io;
use std::os::raw::{c_char, c_double, c_int, c_void};
use std::ptr;
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;
use tracing::{debug, info};

#[allow(non_camel_case_types)]
mod ffi {
    use std::os::raw::{c_char, c_double, c_int, c_void};

    pub enum mpv_handle {}

    pub const MPV_FORMAT_NONE: c_int = 0;
    pub const MPV_FORMAT_STRING: c_int = 1;
    pub const MPV_FORMAT_OSD_STRING: c_int = 2;
    pub const MPV_FORMAT_FLAG: c_int = 3;
    pub const MPV_FORMAT_INT64: c_int = 4;
    pub const MPV_FORMAT_DOUBLE: c_int = 5;
    pub const MPV_FORMAT_NODE: c_int = 6;
    pub const MPV_FORMAT_NODE_ARRAY: c_int = 7;
    pub const MPV_FORMAT_NODE_MAP: c_int = 8;
    pub const MPV_FORMAT_BYTE_ARRAY: c_int = 9;

    #[repr(C)]
    #[derive(Copy, Clone)]
    pub union mpv_node_u {
        pub string: *mut c_char,
        pub flag: c_int,
        pub int64: i64,
        pub double_: c_double,
        pub list: *mut mpv_node_list,
        pub ba: *mut mpv_byte_array,
    }

    #[repr(C)]
    #[derive(Copy, Clone)]
    pub struct mpv_node {
        pub u: mpv_node_u,
        pub format: c_int,
    }

    #[repr(C)]
    pub struct mpv_node_list {
        pub num: c_int,
        pub values: *mut mpv_node,
        pub keys: *mut *mut c_char,
    }

    #[repr(C)]
    pub struct mpv_byte_array {
        pub data: *mut c_void,
        pub size: usize,
    }

    #[repr(C)]
    pub struct mpv_event {
        pub event_id: c_int,
        pub error: c_int,
        pub reply_userdata: u64,
        pub data: *mut c_void,
    }

    #[repr(C)]
    pub struct mpv_event_property {
        pub name: *const c_char,
        pub format: c_int,
        pub data: *mut c_void,
    }

    #[repr(C)]
    pub struct mpv_event_log_message {
        pub prefix: *const c_char,
        pub level: *const c_char,
        pub text: *const c_char,
        pub log_level: c_int,
    }

    #[repr(C)]
    pub struct mpv_event_command {
        pub result: mpv_node,
    }

    #[repr(C)]
    pub struct mpv_event_client_message {
        pub num_args: c_int,
        pub args: *const *const c_char,
    }

    #[repr(C)]
    pub struct mpv_event_start_file {
        pub playlist_entry_id: i64,
    }

    #[repr(C)]
    pub struct mpv_event_end_file {
        pub reason: c_int,
        pub error: c_int,
        pub playlist_entry_id: i64,
        pub playlist_insert_id: i64,
        pub playlist_insert_num_entries: c_int,
    }

    #[repr(C)]
    pub struct mpv_event_hook {
        pub name: *const c_char,
        pub id: u64,
    }

    pub type StreamReadFn = extern "C" fn(*mut c_void, *mut c_char, u64) -> i64;
    pub type StreamSeekFn = extern "C" fn(*mut c_void, i64) -> i64;
    pub type StreamSizeFn = extern "C" fn(*mut c_void) -> i64;
    pub type StreamCloseFn = extern "C" fn(*mut c_void);
    pub type StreamCancelFn = extern "C" fn(*mut c_void);
    pub type StreamOpenFn = extern "C" fn(*mut c_void, *mut c_char, *mut mpv_stream_cb_info) -> c_int;

    #[repr(C)]
    pub struct mpv_stream_cb_info {
        pub cookie: *mut c_void,
        pub read_fn: Option<StreamReadFn>,
        pub seek_fn: Option<StreamSeekFn>,
        pub size_fn: Option<StreamSizeFn>,
        pub close_fn: Option<StreamCloseFn>,
        pub cancel_fn: Option<StreamCancelFn>,
    }

    #[link(name = "mpv")]
    extern "C" {
        pub fn mpv_create() -> *mut mpv_handle;
        pub fn mpv_initialize(ctx: *mut mpv_handle) -> c_int;
        pub fn mpv_terminate_destroy(ctx: *mut mpv_handle);
        pub fn mpv_client_name(ctx: *mut mpv_handle) -> *const c_char;
        pub fn mpv_free(data: *mut c_void);
        pub fn mpv_free_node_contents(node: *mut mpv_node);
        pub fn mpv_set_option(
            ctx: *mut mpv_handle,
            name: *const c_char,
            format: c_int,
            data: *mut c_void,
        ) -> c_int;
        pub fn mpv_get_property(
            ctx: *mut mpv_handle,
            name: *const c_char,
            format: c_int,
            data: *mut c_void,
        ) -> c_int;
        pub fn mpv_set_property(
            ctx: *mut mpv_handle,
            name: *const c_char,
            format: c_int,
            data: *mut c_void,
        ) -> c_int;
        pub fn mpv_command_node(ctx: *mut mpv_handle, args: *mut mpv_node, result: *mut mpv_node) -> c_int;
        pub fn mpv_command_node_async(ctx: *mut mpv_handle, reply_userdata: u64, args: *mut mpv_node) -> c_int;
        pub fn mpv_observe_property(
            ctx: *mut mpv_handle,
            reply_userdata: u64,
            name: *const c_char,
            format: c_int,
        ) -> c_int;
        pub fn mpv_unobserve_property(ctx: *mut mpv_handle, registered_reply_userdata: u64) -> c_int;
        pub fn mpv_request_log_messages(ctx: *mut mpv_handle, min_level: *const c_char) -> c_int;
        pub fn mpv_wait_event(ctx: *mut mpv_handle, timeout: c_double) -> *mut mpv_event;
        pub fn mpv_wakeup(ctx: *mut mpv_handle);
        pub fn mpv_stream_cb_add_ro(
            ctx: *mut mpv_handle,
            protocol: *const c_char,
            user_data: *mut c_void,
            open_fn: StreamOpenFn,
        ) -> c_int;
    }
}

fn c_string(s: &str) -> EngineResult<CString> {
    CString::new(s).map_err(|_| ErrorCode::InvalidParameter)
}

/// Copy a possibly-null C string
unsafe fn text(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

// ----------------------------------------------------------------------------
// Node Conversion
// ----------------------------------------------------------------------------

/// Owns the C layout of one outgoing node tree
#[derive(Default)]
struct NodeArena {
    strings: Vec<CString>,
    values: Vec<Vec<ffi::mpv_node>>,
    keys: Vec<Vec<*mut c_char>>,
    lists: Vec<Box<ffi::mpv_node_list>>,
    bytes: Vec<Vec<u8>>,
    byte_arrays: Vec<Box<ffi::mpv_byte_array>>,
}

impl NodeArena {
    fn string(&mut self, bytes: &[u8]) -> EngineResult<*mut c_char> {
        let s = CString::new(bytes).map_err(|_| ErrorCode::InvalidParameter)?;
        let ptr = s.as_ptr() as *mut c_char;
        self.strings.push(s);
        Ok(ptr)
    }

    fn build(&mut self, node: &Node) -> EngineResult<ffi::mpv_node> {
        let (u, format) = match node {
            Node::None => (ffi::mpv_node_u { int64: 0 }, ffi::MPV_FORMAT_NONE),
            Node::String(b) => (
                ffi::mpv_node_u {
                    string: self.string(b)?,
                },
                ffi::MPV_FORMAT_STRING,
            ),
            Node::Flag(b) => (ffi::mpv_node_u { flag: *b as c_int }, ffi::MPV_FORMAT_FLAG),
            Node::Int64(i) => (ffi::mpv_node_u { int64: *i }, ffi::MPV_FORMAT_INT64),
            Node::Double(d) => (ffi::mpv_node_u { double_: *d }, ffi::MPV_FORMAT_DOUBLE),
            Node::Array(items) => {
                let mut values = items
                    .iter()
                    .map(|item| self.build(item))
                    .collect::<EngineResult<Vec<_>>>()?;
                let list = self.list(&mut values, ptr::null_mut());
                self.values.push(values);
                (ffi::mpv_node_u { list }, ffi::MPV_FORMAT_NODE_ARRAY)
            }
            Node::Map(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                let mut keys = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    keys.push(self.string(key.as_bytes())?);
                    values.push(self.build(value)?);
                }
                let list = self.list(&mut values, keys.as_mut_ptr());
                self.values.push(values);
                self.keys.push(keys);
                (ffi::mpv_node_u { list }, ffi::MPV_FORMAT_NODE_MAP)
            }
            Node::ByteArray(b) => {
                let mut data = b.clone();
                let mut ba = Box::new(ffi::mpv_byte_array {
                    data: data.as_mut_ptr() as *mut c_void,
                    size: data.len(),
                });
                let ptr = &mut *ba as *mut ffi::mpv_byte_array;
                self.bytes.push(data);
                self.byte_arrays.push(ba);
                (ffi::mpv_node_u { ba: ptr }, ffi::MPV_FORMAT_BYTE_ARRAY)
            }
        };
        Ok(ffi::mpv_node { u, format })
    }

    fn list(&mut self, values: &mut [ffi::mpv_node], keys: *mut *mut c_char) -> *mut ffi::mpv_node_list {
        let mut list = Box::new(ffi::mpv_node_list {
            num: values.len() as c_int,
            values: values.as_mut_ptr(),
            keys,
        });
        let ptr = &mut *list as *mut ffi::mpv_node_list;
        self.lists.push(list);
        ptr
    }
}

/// Copy an engine-owned node
unsafe fn read_node(node: &ffi::mpv_node) -> Node {
    match node.format {
        ffi::MPV_FORMAT_STRING | ffi::MPV_FORMAT_OSD_STRING => {
            if node.u.string.is_null() {
                Node::None
            } else {
                Node::String(CStr::from_ptr(node.u.string).to_bytes().to_vec())
            }
        }
        ffi::MPV_FORMAT_FLAG => Node::Flag(node.u.flag != 0),
        ffi::MPV_FORMAT_INT64 => Node::Int64(node.u.int64),
        ffi::MPV_FORMAT_DOUBLE => Node::Double(node.u.double_),
        ffi::MPV_FORMAT_NODE_ARRAY => Node::Array(
            list_entries(node.u.list)
                .map(|(_, value)| read_node(value))
                .collect(),
        ),
        ffi::MPV_FORMAT_NODE_MAP => Node::Map(
            list_entries(node.u.list)
                .map(|(key, value)| (key, read_node(value)))
                .collect(),
        ),
        ffi::MPV_FORMAT_BYTE_ARRAY => {
            let ba = node.u.ba;
            if ba.is_null() || (*ba).data.is_null() {
                Node::ByteArray(Vec::new())
            } else {
                Node::ByteArray(std::slice::from_raw_parts((*ba).data as *const u8, (*ba).size).to_vec())
            }
        }
        _ => Node::None,
    }
}

unsafe fn list_entries<'a>(list: *const ffi::mpv_node_list) -> impl Iterator<Item = (String, &'a ffi::mpv_node)> {
    let (num, values, keys) = if list.is_null() {
        (0, ptr::null(), ptr::null())
    } else {
        ((*list).num.max(0) as usize, (*list).values as *const ffi::mpv_node, (*list).keys as *const *mut c_char)
    };
    (0..num).map(move |i| {
        let key = if keys.is_null() { String::new() } else { text(*keys.add(i)) };
        (key, &*values.add(i))
    })
}

// ----------------------------------------------------------------------------
// Event Conversion
// ----------------------------------------------------------------------------

fn log_level(level: &str, raw: c_int) -> LogLevel {
    level.parse().unwrap_or(match raw {
        i32::MIN..=10 => LogLevel::Fatal,
        11..=20 => LogLevel::Error,
        21..=30 => LogLevel::Warn,
        31..=40 => LogLevel::Info,
        41..=50 => LogLevel::V,
        51..=60 => LogLevel::Debug,
        _ => LogLevel::Trace,
    })
}

unsafe fn read_event(event: &ffi::mpv_event) -> RawEvent {
    let kind = EventKind::from_raw(event.event_id);
    let raw = RawEvent::new(kind)
        .with_error(ErrorCode::from_raw(event.error))
        .with_userdata(event.reply_userdata);
    if event.data.is_null() {
        return raw;
    }

    let data = match kind {
        EventKind::PropertyChange => {
            let prop = &*(event.data as *const ffi::mpv_event_property);
            let value = if prop.format == ffi::MPV_FORMAT_NODE && !prop.data.is_null() {
                read_node(&*(prop.data as *const ffi::mpv_node))
            } else {
                Node::None
            };
            EventData::Property {
                name: text(prop.name),
                value,
            }
        }
        EventKind::LogMessage => {
            let msg = &*(event.data as *const ffi::mpv_event_log_message);
            EventData::LogMessage {
                prefix: text(msg.prefix),
                level: log_level(&text(msg.level), msg.log_level),
                text: text(msg.text),
            }
        }
        EventKind::CommandReply => {
            let cmd = &*(event.data as *const ffi::mpv_event_command);
            EventData::CommandReply {
                result: read_node(&cmd.result),
            }
        }
        EventKind::ClientMessage => {
            let msg = &*(event.data as *const ffi::mpv_event_client_message);
            let args = (0..msg.num_args.max(0) as usize)
                .map(|i| text(*msg.args.add(i)))
                .collect();
            EventData::ClientMessage { args }
        }
        EventKind::StartFile => {
            let start = &*(event.data as *const ffi::mpv_event_start_file);
            EventData::StartFile {
                playlist_entry_id: start.playlist_entry_id,
            }
        }
        EventKind::EndFile => {
            let end = &*(event.data as *const ffi::mpv_event_end_file);
            EventData::EndFile {
                reason: EndFileReason::from_raw(end.reason),
                error: ErrorCode::from_raw(end.error),
                playlist_entry_id: end.playlist_entry_id,
            }
        }
        EventKind::Hook => {
            let hook = &*(event.data as *const ffi::mpv_event_hook);
            EventData::Hook {
                name: text(hook.name),
                id: hook.id,
            }
        }
        _ => EventData::None,
    };
    raw.with_data(data)
}

// ----------------------------------------------------------------------------
// Stream Callbacks
// ----------------------------------------------------------------------------

type StreamCookie = Box<dyn MediaStream>;

fn io_error_code(err: &io::Error) -> i64 {
    match err.kind() {
        io::ErrorKind::Unsupported => ErrorCode::Unsupported.as_raw() as i64,
        _ => ErrorCode::Generic.as_raw() as i64,
    }
}

extern "C" fn stream_open(user_data: *mut c_void, uri: *mut c_char, info: *mut ffi::mpv_stream_cb_info) -> c_int {
    let opener = unsafe { &*(user_data as *const StreamOpener) };
    let uri = unsafe { text(uri) };
    match opener(&uri) {
        Ok(stream) => {
            let cookie: Box<StreamCookie> = Box::new(stream);
            unsafe {
                (*info).cookie = Box::into_raw(cookie) as *mut c_void;
                (*info).read_fn = Some(stream_read);
                (*info).seek_fn = Some(stream_seek);
                (*info).size_fn = Some(stream_size);
                (*info).close_fn = Some(stream_close);
                (*info).cancel_fn = None;
            }
            0
        }
        Err(code) => code.as_raw(),
    }
}

extern "C" fn stream_read(cookie: *mut c_void, buf: *mut c_char, nbytes: u64) -> i64 {
    let stream = unsafe { &mut *(cookie as *mut StreamCookie) };
    let buf = unsafe { std::slice::from_raw_parts_mut(buf as *mut u8, nbytes as usize) };
    match stream.read(buf) {
        Ok(n) => n as i64,
        Err(_) => -1,
    }
}

extern "C" fn stream_seek(cookie: *mut c_void, offset: i64) -> i64 {
    let stream = unsafe { &mut *(cookie as *mut StreamCookie) };
    if offset < 0 {
        return ErrorCode::Generic.as_raw() as i64;
    }
    match stream.seek(offset as u64) {
        Ok(pos) => pos as i64,
        Err(err) => io_error_code(&err),
    }
}

extern "C" fn stream_size(cookie: *mut c_void) -> i64 {
    let stream = unsafe { &mut *(cookie as *mut StreamCookie) };
    match stream.size() {
        Some(size) => size as i64,
        None => ErrorCode::Unsupported.as_raw() as i64,
    }
}

extern "C" fn stream_close(cookie: *mut c_void) {
    let mut stream = unsafe { Box::from_raw(cookie as *mut StreamCookie) };
    stream.close();
}

// ----------------------------------------------------------------------------
// Engine
// ----------------------------------------------------------------------------

/// Read access to a live handle, held across one client call
struct LiveHandle<'a>(RwLockReadGuard<'a, *mut ffi::mpv_handle>);

impl LiveHandle<'_> {
    fn ptr(&self) -> *mut ffi::mpv_handle {
        *self.0
    }
}

/// Engine backed by the libmpv client API
pub struct LibMpv {
    /// Null once destroyed. Every client call holds the read lock for its
    /// whole duration so `destroy` cannot free the handle underneath it.
    handle: RwLock<*mut ffi::mpv_handle>,
    /// Openers handed to the engine; released after the handle is destroyed
    openers: Mutex<Vec<Box<StreamOpener>>>,
}

// The client API is thread-safe; `mpv_wait_event` is only called from the
// event loop thread.
unsafe impl Send for LibMpv {}
unsafe impl Sync for LibMpv {}

impl LibMpv {
    /// Create an uninitialised engine instance
    pub fn new() -> MpvResult<Self> {
        let handle = unsafe { ffi::mpv_create() };
        if handle.is_null() {
            return Err(MpvError::Init {
                option: None,
                code: ErrorCode::NoMem,
            });
        }
        info!("Created libmpv handle");
        Ok(Self {
            handle: RwLock::new(handle),
            openers: Mutex::new(Vec::new()),
        })
    }

    fn ctx(&self) -> EngineResult<LiveHandle<'_>> {
        let guard = self.handle.read().unwrap_or_else(PoisonError::into_inner);
        if guard.is_null() {
            Err(ErrorCode::Uninitialized)
        } else {
            Ok(LiveHandle(guard))
        }
    }

    fn node_call<F>(&self, name: &str, value: &Node, f: F) -> EngineResult<()>
    where
        F: FnOnce(*mut ffi::mpv_handle, *const c_char, *mut ffi::mpv_node) -> c_int,
    {
        let handle = self.ctx()?;
        let name = c_string(name)?;
        let mut arena = NodeArena::default();
        let mut node = arena.build(value)?;
        ErrorCode::check(f(handle.ptr(), name.as_ptr(), &mut node))
    }
}

impl Engine for LibMpv {
    fn client_name(&self) -> String {
        match self.ctx() {
            Ok(handle) => unsafe { text(ffi::mpv_client_name(handle.ptr())) },
            Err(_) => String::new(),
        }
    }

    fn set_option(&self, name: &str, value: &Node) -> EngineResult<()> {
        self.node_call(name, value, |ctx, name, node| unsafe {
            ffi::mpv_set_option(ctx, name, ffi::MPV_FORMAT_NODE, node as *mut c_void)
        })
    }

    fn initialize(&self) -> EngineResult<()> {
        let handle = self.ctx()?;
        let ctx = handle.ptr();
        ErrorCode::check(unsafe { ffi::mpv_initialize(ctx) })
    }

    fn get_property(&self, name: &str, format: Format) -> EngineResult<Node> {
        let handle = self.ctx()?;
        let ctx = handle.ptr();
        let name = c_string(name)?;
        match format {
            Format::String | Format::OsdString => {
                let mut out: *mut c_char = ptr::null_mut();
                ErrorCode::check(unsafe {
                    ffi::mpv_get_property(
                        ctx,
                        name.as_ptr(),
                        format.as_raw(),
                        &mut out as *mut *mut c_char as *mut c_void,
                    )
                })?;
                if out.is_null() {
                    return Ok(Node::None);
                }
                let bytes = unsafe { CStr::from_ptr(out).to_bytes().to_vec() };
                unsafe { ffi::mpv_free(out as *mut c_void) };
                Ok(Node::String(bytes))
            }
            _ => {
                let mut out = ffi::mpv_node {
                    u: ffi::mpv_node_u { int64: 0 },
                    format: ffi::MPV_FORMAT_NONE,
                };
                ErrorCode::check(unsafe {
                    ffi::mpv_get_property(
                        ctx,
                        name.as_ptr(),
                        ffi::MPV_FORMAT_NODE,
                        &mut out as *mut ffi::mpv_node as *mut c_void,
                    )
                })?;
                let node = unsafe { read_node(&out) };
                unsafe { ffi::mpv_free_node_contents(&mut out) };
                Ok(node)
            }
        }
    }

    fn set_property(&self, name: &str, value: &Node) -> EngineResult<()> {
        self.node_call(name, value, |ctx, name, node| unsafe {
            ffi::mpv_set_property(ctx, name, ffi::MPV_FORMAT_NODE, node as *mut c_void)
        })
    }

    fn command(&self, args: &Node) -> EngineResult<Node> {
        let handle = self.ctx()?;
        let ctx = handle.ptr();
        let mut arena = NodeArena::default();
        let mut node = arena.build(args)?;
        let mut out = ffi::mpv_node {
            u: ffi::mpv_node_u { int64: 0 },
            format: ffi::MPV_FORMAT_NONE,
        };
        ErrorCode::check(unsafe { ffi::mpv_command_node(ctx, &mut node, &mut out) })?;
        let result = unsafe { read_node(&out) };
        unsafe { ffi::mpv_free_node_contents(&mut out) };
        Ok(result)
    }

    fn command_async(&self, reply_id: u64, args: &Node) -> EngineResult<()> {
        let handle = self.ctx()?;
        let ctx = handle.ptr();
        let mut arena = NodeArena::default();
        let mut node = arena.build(args)?;
        ErrorCode::check(unsafe { ffi::mpv_command_node_async(ctx, reply_id, &mut node) })
    }

    fn observe_property(&self, id: u64, name: &str) -> EngineResult<()> {
        let handle = self.ctx()?;
        let ctx = handle.ptr();
        let name = c_string(name)?;
        ErrorCode::check(unsafe { ffi::mpv_observe_property(ctx, id, name.as_ptr(), ffi::MPV_FORMAT_NODE) })
    }

    fn unobserve_property(&self, id: u64) -> EngineResult<()> {
        let handle = self.ctx()?;
        let ctx = handle.ptr();
        ErrorCode::check(unsafe { ffi::mpv_unobserve_property(ctx, id) })
    }

    fn request_log_messages(&self, level: &str) -> EngineResult<()> {
        let handle = self.ctx()?;
        let ctx = handle.ptr();
        let level = c_string(level)?;
        ErrorCode::check(unsafe { ffi::mpv_request_log_messages(ctx, level.as_ptr()) })
    }

    fn wait_event(&self, timeout: Option<Duration>) -> RawEvent {
        let Ok(handle) = self.ctx() else {
            return RawEvent::none();
        };
        let ctx = handle.ptr();
        let timeout: c_double = timeout.map_or(-1.0, |d| d.as_secs_f64());
        let event = unsafe { ffi::mpv_wait_event(ctx, timeout) };
        if event.is_null() {
            return RawEvent::none();
        }
        unsafe { read_event(&*event) }
    }

    fn wakeup(&self) {
        if let Ok(handle) = self.ctx() {
            unsafe { ffi::mpv_wakeup(handle.ptr()) };
        }
    }

    fn add_stream_protocol(&self, protocol: &str, opener: StreamOpener) -> EngineResult<()> {
        let handle = self.ctx()?;
        let ctx = handle.ptr();
        let name = c_string(protocol)?;
        let mut openers = self.openers.lock().unwrap_or_else(PoisonError::into_inner);
        let boxed = Box::new(opener);
        let user_data = &*boxed as *const StreamOpener as *mut c_void;
        ErrorCode::check(unsafe { ffi::mpv_stream_cb_add_ro(ctx, name.as_ptr(), user_data, stream_open) })?;
        openers.push(boxed);
        debug!(protocol, "Installed stream protocol");
        Ok(())
    }

    fn destroy(&self) {
        let mut handle = self.handle.write().unwrap_or_else(PoisonError::into_inner);
        let ctx = std::mem::replace(&mut *handle, ptr::null_mut());
        if ctx.is_null() {
            return;
        }
        unsafe { ffi::mpv_terminate_destroy(ctx) };
        drop(handle);
        self.openers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("Destroyed libmpv handle");
    }
}

impl Drop for LibMpv {
    fn drop(&mut self) {
        self.destroy();
    }
}
