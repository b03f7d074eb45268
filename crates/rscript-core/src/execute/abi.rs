//! Host side of the function table handed to `rscript_entry`.
//!
//! The layout of [`HostApi`] mirrors the struct of the same name in the
//! script prelude; both carry [`ABI_VERSION`].

use std::borrow::Cow;
use std::cell::RefCell;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};

use crate::host::{Document, HostError, UiDocument};
use crate::transaction::run_in_transaction;

use super::output::OutputSink;

pub const ABI_VERSION: u32 = 1;

/// Call succeeded.
pub const OK: i32 = 0;
/// Value absent, or the script body failed.
pub const ABSENT: i32 = 1;
/// Host error; the message was written to `out`.
pub const ERROR: i32 = -1;
/// The script was handed a null table.
pub const NULL_API: i32 = -2;
/// The script was built against another table version.
pub const ABI_MISMATCH: i32 = -3;

pub type WriteFn = unsafe extern "C" fn(out: *mut c_void, ptr: *const u8, len: usize);
pub type BodyFn = unsafe extern "C" fn(data: *mut c_void) -> i32;

/// Signature of the exported `rscript_entry`.
pub type EntryFn = unsafe extern "C" fn(api: *const HostApi) -> i32;

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

/// A panic reported by the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub message: String,
    pub trace: String,
}

/// State behind `HostApi::ctx` for one run. Lives on the UI thread.
pub struct HostSession<'a> {
    document: &'a dyn Document,
    ui_document: Option<&'a dyn UiDocument>,
    output: RefCell<Vec<String>>,
    sink: RefCell<Option<Box<dyn OutputSink>>>,
    failure: RefCell<Option<ScriptFailure>>,
}

impl<'a> HostSession<'a> {
    pub fn new(
        document: &'a dyn Document,
        ui_document: Option<&'a dyn UiDocument>,
        sink: Option<Box<dyn OutputSink>>,
    ) -> Self {
        Self {
            document,
            ui_document,
            output: RefCell::new(Vec::new()),
            sink: RefCell::new(sink),
            failure: RefCell::new(None),
        }
    }

    /// Function table pointing back at this session. Valid while `self` is.
    pub fn api(&self) -> HostApi {
        HostApi {
            abi_version: ABI_VERSION,
            ctx: self as *const Self as *mut c_void,
            print: host_print,
            fail: host_fail,
            document_title: host_document_title,
            get_parameter: host_get_parameter,
            set_parameter: host_set_parameter,
            remove_parameter: host_remove_parameter,
            selection: host_selection,
            transact: host_transact,
        }
    }

    /// Printed lines in order, and the panic the script reported, if any.
    pub fn into_parts(self) -> (Vec<String>, Option<ScriptFailure>) {
        (self.output.into_inner(), self.failure.into_inner())
    }

    fn print(&self, line: String) {
        let mut sink = self.sink.borrow_mut();
        if let Some(active) = sink.as_mut() {
            if let Err(err) = active.emit(&line) {
                tracing::warn!(error = %err, "output stream failed, continuing without it");
                *sink = None;
            }
        }
        self.output.borrow_mut().push(line);
    }
}

#[derive(Debug)]
enum TransactError {
    Body,
    Host(HostError),
}

impl From<HostError> for TransactError {
    fn from(err: HostError) -> Self {
        TransactError::Host(err)
    }
}

/// Run `f` against the session behind `ctx`. Panics must not unwind into
/// the script, so they are logged and turned into `fallback`.
unsafe fn with_session<R>(ctx: *mut c_void, fallback: R, f: impl FnOnce(&HostSession<'_>) -> R) -> R {
    if ctx.is_null() {
        return fallback;
    }
    let session = unsafe { &*(ctx as *const HostSession<'_>) };
    match panic::catch_unwind(AssertUnwindSafe(|| f(session))) {
        Ok(value) => value,
        Err(_) => {
            tracing::error!("host callback panicked");
            fallback
        }
    }
}

unsafe fn text<'b>(ptr: *const u8, len: usize) -> Cow<'b, str> {
    if ptr.is_null() {
        return Cow::Borrowed("");
    }
    String::from_utf8_lossy(unsafe { std::slice::from_raw_parts(ptr, len) })
}

fn write_str(out: *mut c_void, write: WriteFn, value: &str) {
    unsafe { write(out, value.as_ptr(), value.len()) }
}

fn report(out: *mut c_void, write: WriteFn, err: &HostError) -> i32 {
    write_str(out, write, &err.to_string());
    ERROR
}

unsafe extern "C" fn host_print(ctx: *mut c_void, ptr: *const u8, len: usize) {
    let line = unsafe { text(ptr, len) }.into_owned();
    unsafe { with_session(ctx, (), |session| session.print(line)) }
}

unsafe extern "C" fn host_fail(
    ctx: *mut c_void,
    message: *const u8,
    message_len: usize,
    trace: *const u8,
    trace_len: usize,
) {
    let failure = ScriptFailure {
        message: unsafe { text(message, message_len) }.into_owned(),
        trace: unsafe { text(trace, trace_len) }.into_owned(),
    };
    unsafe {
        with_session(ctx, (), |session| {
            *session.failure.borrow_mut() = Some(failure);
        })
    }
}

unsafe extern "C" fn host_document_title(ctx: *mut c_void, out: *mut c_void, write: WriteFn) -> i32 {
    unsafe {
        with_session(ctx, ERROR, |session| {
            write_str(out, write, &session.document.title());
            OK
        })
    }
}

unsafe extern "C" fn host_get_parameter(
    ctx: *mut c_void,
    key: *const u8,
    key_len: usize,
    out: *mut c_void,
    write: WriteFn,
) -> i32 {
    let key = unsafe { text(key, key_len) };
    unsafe {
        with_session(ctx, ERROR, |session| match session.document.parameter(&key) {
            Some(value) => {
                write_str(out, write, &value);
                OK
            }
            None => ABSENT,
        })
    }
}

unsafe extern "C" fn host_set_parameter(
    ctx: *mut c_void,
    key: *const u8,
    key_len: usize,
    value: *const u8,
    value_len: usize,
    out: *mut c_void,
    write: WriteFn,
) -> i32 {
    let key = unsafe { text(key, key_len) };
    let value = unsafe { text(value, value_len) };
    unsafe {
        with_session(ctx, ERROR, |session| {
            match session.document.set_parameter(&key, &value) {
                Ok(()) => OK,
                Err(err) => report(out, write, &err),
            }
        })
    }
}

unsafe extern "C" fn host_remove_parameter(
    ctx: *mut c_void,
    key: *const u8,
    key_len: usize,
    out: *mut c_void,
    write: WriteFn,
) -> i32 {
    let key = unsafe { text(key, key_len) };
    unsafe {
        with_session(ctx, ERROR, |session| match session.document.remove_parameter(&key) {
            Ok(Some(old)) => {
                write_str(out, write, &old);
                OK
            }
            Ok(None) => ABSENT,
            Err(err) => report(out, write, &err),
        })
    }
}

unsafe extern "C" fn host_selection(ctx: *mut c_void, out: *mut c_void, write: WriteFn) -> i32 {
    unsafe {
        with_session(ctx, ERROR, |session| match session.ui_document {
            Some(ui) => {
                for id in ui.selection() {
                    write_str(out, write, &id);
                }
                OK
            }
            None => ABSENT,
        })
    }
}

unsafe extern "C" fn host_transact(
    ctx: *mut c_void,
    name: *const u8,
    name_len: usize,
    body: BodyFn,
    data: *mut c_void,
    out: *mut c_void,
    write: WriteFn,
) -> i32 {
    let name = unsafe { text(name, name_len) };
    unsafe {
        with_session(ctx, ERROR, |session| {
            let outcome = run_in_transaction(session.document, &name, |_| {
                match body(data) {
                    OK => Ok(()),
                    _ => Err(TransactError::Body),
                }
            });
            match outcome {
                Ok(()) => OK,
                Err(TransactError::Body) => ABSENT,
                Err(TransactError::Host(err)) => report(out, write, &err),
            }
        })
    }
}
