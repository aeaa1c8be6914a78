//! Basic migration example
//!
//! Attaches the main thread, builds a small call stack, and tours every
//! ISA through migration points, checking that the thread's state survives.
//!
//! # Environment Variables
//!
//! - `XMIG_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `XMIG_FLUSH_EPRINT=1` - Flush debug output immediately
//! - `XMIG_DEBUG=1` - Same as debug logging in the config

use std::cell::Cell;
use std::ffi::c_void;
use std::sync::Arc;

use xmig::{
    attach, migration_point, register_migrate_callback, with_thread_image, Arch, AttachOptions,
    CallbackBinding, MigrateConfig, MigrateResult, ProgramImage,
};
use xmig::{kdebug, kinfo};

thread_local! {
    static ARRIVALS: Cell<usize> = const { Cell::new(0) };
}

unsafe extern "C" fn arrived(_data: *mut c_void) {
    ARRIVALS.with(|a| a.set(a.get() + 1));
    kdebug!("landed on {}", xmig::current_arch());
}

// XMIG_LOG_LEVEL=debug cargo run -p xmig-basic
fn main() -> MigrateResult<()> {
    println!("=== xmig Basic Example ===\n");

    let mut b = ProgramImage::builder();
    let main_fn = b.function("main", 2);
    let worker = b.function("worker", 3);
    let leaf = b.function("leaf", 0);
    let sites = [b.call_site(main_fn), b.call_site(worker), b.call_site(leaf)];
    let program = Arc::new(b.build().map_err(|e| {
        eprintln!("bad program image: {}", e);
        xmig::MigrateError::InvalidConfig("program image")
    })?);

    let config = MigrateConfig::from_env().debug_logging(true);
    config.print();

    let guard = attach(AttachOptions::new(program).config(config))?;
    kinfo!("attached on {}", xmig::current_arch());

    for (i, (site, n)) in sites.iter().zip([2usize, 3, 0]).enumerate() {
        let slots = vec![0x1000 + i as u64; n];
        with_thread_image(|img| img.push_frame(*site, slots))??;
    }
    let before = with_thread_image(|img| img.capture())??;
    println!("Stack depth: {}", before.depth());

    register_migrate_callback(Some(CallbackBinding::without_data(arrived)));

    let tour = [Arch::AArch64, Arch::PowerPc64, Arch::X86_64, Arch::current()];
    for dest in tour {
        guard.handle().request(dest);
        let moved = migration_point!();
        println!("Requested {} migrated={} now on {}", dest, moved, xmig::current_arch());
    }

    let after = with_thread_image(|img| img.capture())??;
    println!("\nState preserved: {}", after.same_state(&before));
    println!("Callbacks run:   {}", ARRIVALS.with(|a| a.get()));

    let stats = xmig::migration_stats();
    println!("Completed:       {}", stats.completed);
    println!("Failed:          {}", stats.failed);
    for rec in xmig::drain_migrations() {
        println!("  {} -> {} ({} frames, {:?})", rec.from, rec.to, rec.frames, rec.elapsed);
    }

    drop(guard);
    println!("\n=== Example Complete ===");
    Ok(())
}
