// Script side of the host bridge. Every combined unit embeds this text as
// `mod __rscript`; the layout of `HostApi` must match `execute::abi`.

use std::any::Any;
use std::cell::Cell;
use std::ffi::c_void;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

pub const ABI_VERSION: u32 = 1;

const OK: i32 = 0;
const ABSENT: i32 = 1;

pub type WriteFn = unsafe extern "C" fn(out: *mut c_void, ptr: *const u8, len: usize);
pub type BodyFn = unsafe extern "C" fn(data: *mut c_void) -> i32;

#[repr(C)]
pub struct HostApi {
    pub abi_version: u32,
    pub ctx: *mut c_void,
    pub print: unsafe extern "C" fn(ctx: *mut c_void, ptr: *const u8, len: usize),
    pub fail: unsafe extern "C" fn(
        ctx: *mut c_void,
        message: *const u8,
        message_len: usize,
        trace: *const u8,
        trace_len: usize,
    ),
    pub document_title:
        unsafe extern "C" fn(ctx: *mut c_void, out: *mut c_void, write: WriteFn) -> i32,
    pub get_parameter: unsafe extern "C" fn(
        ctx: *mut c_void,
        key: *const u8,
        key_len: usize,
        out: *mut c_void,
        write: WriteFn,
    ) -> i32,
    pub set_parameter: unsafe extern "C" fn(
        ctx: *mut c_void,
        key: *const u8,
        key_len: usize,
        value: *const u8,
        value_len: usize,
        out: *mut c_void,
        write: WriteFn,
    ) -> i32,
    pub remove_parameter: unsafe extern "C" fn(
        ctx: *mut c_void,
        key: *const u8,
        key_len: usize,
        out: *mut c_void,
        write: WriteFn,
    ) -> i32,
    pub selection: unsafe extern "C" fn(ctx: *mut c_void, out: *mut c_void, write: WriteFn) -> i32,
    pub transact: unsafe extern "C" fn(
        ctx: *mut c_void,
        name: *const u8,
        name_len: usize,
        body: BodyFn,
        data: *mut c_void,
        out: *mut c_void,
        write: WriteFn,
    ) -> i32,
}

thread_local! {
    static CURRENT: Cell<*const HostApi> = const { Cell::new(std::ptr::null()) };
}

static LAST_PANIC: Mutex<Option<String>> = Mutex::new(None);

pub mod prelude {
    pub use super::{print, selection, transact, Document, Script};
}

fn api<'a>() -> &'a HostApi {
    let ptr = CURRENT.with(|current| current.get());
    if ptr.is_null() {
        panic!("the host API is only available while the script is running");
    }
    unsafe { &*ptr }
}

fn out_ptr<T>(value: &mut T) -> *mut c_void {
    value as *mut T as *mut c_void
}

unsafe extern "C" fn write_string(out: *mut c_void, ptr: *const u8, len: usize) {
    if out.is_null() || ptr.is_null() {
        return;
    }
    let out = &mut *(out as *mut String);
    out.push_str(&String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len)));
}

unsafe extern "C" fn push_string(out: *mut c_void, ptr: *const u8, len: usize) {
    if out.is_null() || ptr.is_null() {
        return;
    }
    let out = &mut *(out as *mut Vec<String>);
    out.push(String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len)).into_owned());
}

/// Send one line of output to the host.
pub fn print(message: impl Display) {
    let text = message.to_string();
    let api = api();
    unsafe { (api.print)(api.ctx, text.as_ptr(), text.len()) }
}

/// Ids of the elements currently selected in the active view.
pub fn selection() -> Vec<String> {
    let api = api();
    let mut ids: Vec<String> = Vec::new();
    let code = unsafe { (api.selection)(api.ctx, out_ptr(&mut ids), push_string) };
    if code != OK {
        panic!("selection is not available");
    }
    ids
}

struct Frame<F> {
    body: Option<F>,
    panic: Option<Box<dyn Any + Send>>,
}

unsafe extern "C" fn trampoline<F: FnOnce(&Document)>(data: *mut c_void) -> i32 {
    let frame = &mut *(data as *mut Frame<F>);
    let body = match frame.body.take() {
        Some(body) => body,
        None => return ABSENT,
    };
    match panic::catch_unwind(AssertUnwindSafe(move || body(&Document { _private: () }))) {
        Ok(()) => OK,
        Err(payload) => {
            frame.panic = Some(payload);
            ABSENT
        }
    }
}

/// Run `body` inside a named host transaction.
///
/// The transaction commits when `body` returns and rolls back when it
/// panics; the panic then continues with its original payload.
pub fn transact<F: FnOnce(&Document)>(name: &str, body: F) {
    let api = api();
    let mut frame = Frame {
        body: Some(body),
        panic: None,
    };
    let mut error = String::new();
    let code = unsafe {
        (api.transact)(
            api.ctx,
            name.as_ptr(),
            name.len(),
            trampoline::<F>,
            out_ptr(&mut frame),
            out_ptr(&mut error),
            write_string,
        )
    };
    if let Some(payload) = frame.panic.take() {
        panic::resume_unwind(payload);
    }
    if code != OK {
        panic!("transaction '{}' failed: {}", name, error);
    }
}

/// `transact!("name", |doc| { ... })`
macro_rules! transact {
    ($name:expr, $body:expr) => {
        $crate::__rscript::transact($name, $body)
    };
}

/// The active document.
#[derive(Clone, Copy)]
pub struct Document {
    _private: (),
}

impl Document {
    pub fn title(&self) -> String {
        let api = api();
        let mut title = String::new();
        unsafe { (api.document_title)(api.ctx, out_ptr(&mut title), write_string) };
        title
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let api = api();
        let mut value = String::new();
        let code = unsafe {
            (api.get_parameter)(api.ctx, key.as_ptr(), key.len(), out_ptr(&mut value), write_string)
        };
        match code {
            OK => Some(value),
            ABSENT => None,
            _ => panic!("{}", value),
        }
    }

    /// Set a parameter. Fails outside a transaction.
    pub fn set(&self, key: &str, value: impl Display) {
        let api = api();
        let value = value.to_string();
        let mut error = String::new();
        let code = unsafe {
            (api.set_parameter)(
                api.ctx,
                key.as_ptr(),
                key.len(),
                value.as_ptr(),
                value.len(),
                out_ptr(&mut error),
                write_string,
            )
        };
        if code != OK {
            panic!("{}", error);
        }
    }

    /// Remove a parameter, returning its old value. Fails outside a transaction.
    pub fn remove(&self, key: &str) -> Option<String> {
        let api = api();
        let mut value = String::new();
        let code = unsafe {
            (api.remove_parameter)(api.ctx, key.as_ptr(), key.len(), out_ptr(&mut value), write_string)
        };
        match code {
            OK => Some(value),
            ABSENT => None,
            _ => panic!("{}", value),
        }
    }
}

/// Handle passed to the generated `execute` function.
pub struct Script {
    _private: (),
}

impl Script {
    pub fn print(&self, message: impl Display) {
        print(message)
    }

    pub fn document(&self) -> Document {
        Document { _private: () }
    }

    pub fn selection(&self) -> Vec<String> {
        selection()
    }

    pub fn transact<F: FnOnce(&Document)>(&self, name: &str, body: F) {
        transact(name, body)
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Called by the exported entry symbol.
pub unsafe fn run(api: *const HostApi, execute: fn(&Script)) -> i32 {
    if api.is_null() {
        return -2;
    }
    if (*api).abi_version != ABI_VERSION {
        return -3;
    }

    CURRENT.with(|current| current.set(api));
    let previous = panic::take_hook();
    panic::set_hook(Box::new(|info| {
        let mut trace = String::new();
        if let Some(location) = info.location() {
            trace.push_str(&format!(
                "at {}:{}:{}\n",
                location.file(),
                location.line(),
                location.column()
            ));
        }
        trace.push_str(&std::backtrace::Backtrace::force_capture().to_string());
        if let Ok(mut last) = LAST_PANIC.lock() {
            *last = Some(trace);
        }
    }));

    let script = Script { _private: () };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| execute(&script)));

    panic::set_hook(previous);
    CURRENT.with(|current| current.set(std::ptr::null()));

    match outcome {
        Ok(()) => OK,
        Err(payload) => {
            let message = payload_message(&*payload);
            let trace = LAST_PANIC
                .lock()
                .ok()
                .and_then(|mut last| last.take())
                .unwrap_or_default();
            let api = &*api;
            (api.fail)(
                api.ctx,
                message.as_ptr(),
                message.len(),
                trace.as_ptr(),
                trace.len(),
            );
            ABSENT
        }
    }
}
