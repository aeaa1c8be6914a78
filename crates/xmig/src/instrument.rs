//! `-finstrument-functions` hooks
//!
//! Code compiled with `-finstrument-functions` calls these on every
//! function entry and exit, which turns each call boundary into a
//! migration point using the registered callback.

use core::ffi::c_void;

use xmig_runtime::dispatch;

#[no_mangle]
pub extern "C" fn __cyg_profile_func_enter(_this_fn: *mut c_void, _call_site: *mut c_void) {
    dispatch::check_migrate(None);
}

#[no_mangle]
pub extern "C" fn __cyg_profile_func_exit(_this_fn: *mut c_void, _call_site: *mut c_void) {
    dispatch::check_migrate(None);
}
