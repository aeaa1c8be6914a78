//! Post-migration callbacks
//!
//! A callback runs on the destination ISA exactly once per migration,
//! after the translated state is installed and before the migration point
//! returns to its caller. It takes the C shape (function pointer plus
//! opaque data) so instrumented C code can register one directly.

use core::ffi::c_void;
use core::fmt;

/// Callback signature shared with the C ABI
pub type MigrateCallback = unsafe extern "C" fn(*mut c_void);

/// A callback together with its user data
#[derive(Clone, Copy)]
pub struct CallbackBinding {
    pub func: MigrateCallback,
    pub data: *mut c_void,
}

impl CallbackBinding {
    pub const fn new(func: MigrateCallback, data: *mut c_void) -> Self {
        CallbackBinding { func, data }
    }

    /// Binding that passes a null data pointer
    pub const fn without_data(func: MigrateCallback) -> Self {
        CallbackBinding {
            func,
            data: core::ptr::null_mut(),
        }
    }

    /// Whether both bindings carry the same data pointer
    #[inline]
    pub fn same_data(&self, other: &CallbackBinding) -> bool {
        self.data == other.data
    }

    /// Run the callback
    ///
    /// # Safety
    ///
    /// `data` must be what `func` expects; whoever built the binding
    /// vouches for that.
    #[inline]
    pub unsafe fn invoke(&self) {
        (self.func)(self.data)
    }
}

impl fmt::Debug for CallbackBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackBinding")
            .field("func", &(self.func as usize as *const c_void))
            .field("data", &self.data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    unsafe extern "C" fn bump(data: *mut c_void) {
        let counter = &*(data as *const AtomicUsize);
        counter.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_invoke_passes_data() {
        let counter = AtomicUsize::new(0);
        let cb = CallbackBinding::new(bump, &counter as *const AtomicUsize as *mut c_void);
        unsafe { cb.invoke() };
        unsafe { cb.invoke() };
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_without_data_is_null() {
        unsafe extern "C" fn nop(_: *mut c_void) {}
        let cb = CallbackBinding::without_data(nop);
        assert!(cb.data.is_null());
        assert!(format!("{:?}", cb).starts_with("CallbackBinding"));
    }
}
