//! String marshaling across the C boundary.
//!
//! Every string returned by this library is a fresh `CString` whose
//! ownership passes to the caller. The caller must release it with
//! [`quarry_free_str`] exactly once. Releasing twice, or releasing a
//! pointer that did not come from this library, is undefined behavior.

use crate::error::{FfiError, FfiResult};
use std::ffi::{c_char, CStr, CString};
use std::sync::atomic::{AtomicUsize, Ordering};

static OUTSTANDING: AtomicUsize = AtomicUsize::new(0);

/// Number of returned strings not yet released with [`quarry_free_str`].
pub fn outstanding_strings() -> usize {
    OUTSTANDING.load(Ordering::SeqCst)
}

/// Borrows a caller-supplied C string as UTF-8.
///
/// # Safety
///
/// `ptr` must be null or point to a null-terminated buffer that stays valid
/// and unmodified for `'a`.
pub(crate) unsafe fn str_from_ptr<'a>(ptr: *const c_char, arg: &'static str) -> FfiResult<&'a str> {
    if ptr.is_null() {
        return Err(FfiError::encoding(arg, "null pointer"));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|e| FfiError::encoding(arg, format!("invalid UTF-8: {e}")))
}

/// Rejects text that could not survive null-terminated framing.
pub(crate) fn check_text(text: &str, arg: &'static str) -> FfiResult<()> {
    match text.find('\0') {
        Some(at) => Err(FfiError::encoding(
            arg,
            format!("embedded NUL at byte {at}"),
        )),
        None => Ok(()),
    }
}

/// Hands a string to the caller.
///
/// Output is JSON or an error message, so a NUL can only come from an
/// engine message; it is written as the JSON escape `\u0000`.
pub(crate) fn into_c_string(text: String) -> *mut c_char {
    let text = if text.contains('\0') {
        text.replace('\0', "\\u0000")
    } else {
        text
    };
    let owned = CString::new(text).unwrap_or_default();
    OUTSTANDING.fetch_add(1, Ordering::SeqCst);
    owned.into_raw()
}

/// Frees a string returned by this library. Null is ignored.
///
/// # Safety
///
/// `s` must be null or a pointer returned by a `quarry_*` function that has
/// not been freed yet. It must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn quarry_free_str(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    drop(CString::from_raw(s));
    OUTSTANDING.fetch_sub(1, Ordering::SeqCst);
}
