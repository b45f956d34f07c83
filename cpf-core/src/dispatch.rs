//! Type-safe variadic dispatch over a closed set of function prototypes.
//!
//! A raw function address is only ever invoked through one of the
//! variants of [`Prototype`], which carries its typed arguments directly
//! instead of going through a C-style `va_list`. Extending the supported
//! signature set means adding one variant here, one in [`CallResult`],
//! and one `match` arm in [`dispatch`] -- a single-place edit.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};

use tracing::error;

/// One supported function signature, together with the arguments a call
/// through it needs. Adding a fourth prototype means adding one arm here,
/// one in [`CallResult`], and one `match` arm in [`dispatch`].
#[derive(Debug, Clone)]
pub enum Prototype {
    /// `char *f(void)`
    CharPtr,
    /// `int f(int)`
    IntInt(i32),
    /// `void *f(char *, int)`
    VoidPtrCharPtrInt(CString, i32),
}

/// The typed result of a dispatched call.
#[derive(Debug)]
pub enum CallResult {
    CharPtr(Option<String>),
    Int(i32),
    VoidPtr(*mut c_void),
}

type CharPtrFn = unsafe extern "C" fn() -> *const c_char;
type IntIntFn = unsafe extern "C" fn(c_int) -> c_int;
type VoidPtrCharPtrIntFn = unsafe extern "C" fn(*const c_char, c_int) -> *mut c_void;

/// Invoke the function at `addr` under the signature named by `proto`.
///
/// # Safety
/// `addr` must point to a function that actually has the signature named
/// by `proto`; this is the dispatcher's fundamental unchecked assumption.
///
/// Returns `None` (logged) for a null address.
pub unsafe fn dispatch(addr: *const (), proto: Prototype) -> Option<CallResult> {
    if addr.is_null() {
        error!("dispatch(): function address is null");
        return None;
    }

    Some(match proto {
        Prototype::CharPtr => {
            let f: CharPtrFn = std::mem::transmute(addr);
            let raw = f();
            CallResult::CharPtr(if raw.is_null() {
                None
            } else {
                Some(CStr::from_ptr(raw).to_string_lossy().into_owned())
            })
        }
        Prototype::IntInt(i) => {
            let f: IntIntFn = std::mem::transmute(addr);
            CallResult::Int(f(i))
        }
        Prototype::VoidPtrCharPtrInt(s, i) => {
            let f: VoidPtrCharPtrIntFn = std::mem::transmute(addr);
            CallResult::VoidPtr(f(s.as_ptr(), i))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn succ(i: c_int) -> c_int {
        i + 1
    }

    unsafe extern "C" fn greeting() -> *const c_char {
        static MSG: &[u8] = b"Msg from lib1!\0";
        MSG.as_ptr() as *const c_char
    }

    unsafe extern "C" fn null_greeting() -> *const c_char {
        std::ptr::null()
    }

    unsafe extern "C" fn concat_len(s: *const c_char, i: c_int) -> *mut c_void {
        let base = CStr::from_ptr(s).to_bytes().len() as isize;
        (base + i as isize) as *mut c_void
    }

    #[test]
    fn int_int_dispatch() {
        let addr = succ as *const ();
        let result = unsafe { dispatch(addr, Prototype::IntInt(5)) }.unwrap();
        match result {
            CallResult::Int(v) => assert_eq!(v, 6),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn charptr_dispatch() {
        let addr = greeting as *const ();
        let result = unsafe { dispatch(addr, Prototype::CharPtr) }.unwrap();
        match result {
            CallResult::CharPtr(Some(s)) => assert_eq!(s, "Msg from lib1!"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn charptr_dispatch_null_return() {
        let addr = null_greeting as *const ();
        let result = unsafe { dispatch(addr, Prototype::CharPtr) }.unwrap();
        match result {
            CallResult::CharPtr(None) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn voidptr_charptr_int_dispatch() {
        let addr = concat_len as *const ();
        let arg = CString::new("hi").unwrap();
        let result = unsafe { dispatch(addr, Prototype::VoidPtrCharPtrInt(arg, 3)) }.unwrap();
        match result {
            CallResult::VoidPtr(p) => assert_eq!(p as isize, 5),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn null_address_is_none() {
        let result = unsafe { dispatch(std::ptr::null(), Prototype::IntInt(1)) };
        assert!(result.is_none());
    }
}
