//! Stress test - many threads, many migrations
//!
//! Each worker thread attaches, grows and shrinks a call stack while passing
//! through migration points. A controller thread fires requests at random
//! workers. At the end every worker checks its state against a shadow copy.
//!
//! Usage: `stress [threads] [iterations]`

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use xmig::{
    attach, migration_point, with_thread_image, Arch, AttachOptions, MigrateConfig,
    ProgramImage, RequestHandle, SiteId,
};

const MAX_DEPTH: usize = 24;

fn build_program() -> (Arc<ProgramImage>, Vec<SiteId>) {
    let mut b = ProgramImage::builder();
    let sites = (0..MAX_DEPTH)
        .map(|i| {
            let f = b.function(&format!("f{}", i), i % 5);
            b.call_site(f)
        })
        .collect();
    match b.build() {
        Ok(image) => (Arc::new(image), sites),
        Err(e) => {
            eprintln!("bad program image: {}", e);
            std::process::exit(1);
        }
    }
}

/// Cheap xorshift so workers and controller need no shared RNG
fn next(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

fn worker(
    id: usize,
    iterations: usize,
    program: Arc<ProgramImage>,
    sites: Arc<Vec<SiteId>>,
    handles: mpsc::Sender<RequestHandle>,
    migrated: Arc<AtomicU64>,
) -> bool {
    let guard = match attach(
        AttachOptions::new(program.clone())
            .config(MigrateConfig::from_env().capture_host_state(false))
            .initial_arch(Arch::ALL[id % Arch::ALL.len()]),
    ) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("[worker {}] attach: {}", id, e);
            return false;
        }
    };
    let _ = handles.send(guard.handle().clone());

    let mut rng = 0x9E37_79B9_7F4A_7C15 ^ id as u64;
    let mut shadow: Vec<(SiteId, Vec<u64>)> = Vec::new();

    for _ in 0..iterations {
        let r = next(&mut rng);
        if shadow.len() < MAX_DEPTH && (shadow.is_empty() || r % 3 != 0) {
            let site = sites[shadow.len()];
            let n = program.slots_at(site).unwrap_or(0);
            let slots: Vec<u64> = (0..n).map(|_| next(&mut rng)).collect();
            if let Err(e) = with_thread_image(|img| img.push_frame(site, slots.clone()))
                .and_then(|r| r)
            {
                eprintln!("[worker {}] push: {}", id, e);
                return false;
            }
            shadow.push((site, slots));
        } else if !shadow.is_empty() {
            if let Err(e) = with_thread_image(|img| img.pop_frame()).and_then(|r| r) {
                eprintln!("[worker {}] pop: {}", id, e);
                return false;
            }
            shadow.pop();
        }

        if migration_point!() {
            migrated.fetch_add(1, Ordering::Relaxed);
        }
    }

    let frames = match with_thread_image(|img| img.capture()) {
        Ok(Ok(t)) => t.frames,
        _ => return false,
    };
    let ok = frames.len() == shadow.len()
        && frames
            .iter()
            .zip(&shadow)
            .all(|(f, (site, slots))| f.site == *site && &f.slots == slots);
    if !ok {
        eprintln!("[worker {}] stack mismatch on {}", id, xmig::current_arch());
    }
    ok
}

fn main() {
    println!("=== xmig Stress Test ===\n");

    let num_threads: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(8);
    let iterations: usize = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(20_000);

    println!("Threads: {}  Iterations: {}", num_threads, iterations);

    let (program, sites) = build_program();
    let sites = Arc::new(sites);
    let migrated = Arc::new(AtomicU64::new(0));
    let requested = Arc::new(AtomicU64::new(0));
    let stop = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();

    let start = Instant::now();

    let workers: Vec<_> = (0..num_threads)
        .map(|id| {
            let (program, sites, tx, migrated) =
                (program.clone(), sites.clone(), tx.clone(), migrated.clone());
            std::thread::spawn(move || worker(id, iterations, program, sites, tx, migrated))
        })
        .collect();
    drop(tx);

    let controller = {
        let (stop, requested) = (stop.clone(), requested.clone());
        std::thread::spawn(move || {
            let handles: Vec<RequestHandle> = rx.iter().take(num_threads).collect();
            let mut rng = 0xDEAD_BEEF_u64;
            while !stop.load(Ordering::Relaxed) && !handles.is_empty() {
                let r = next(&mut rng);
                let h = &handles[r as usize % handles.len()];
                h.request(Arch::ALL[(r >> 32) as usize % Arch::ALL.len()]);
                requested.fetch_add(1, Ordering::Relaxed);
                std::thread::sleep(Duration::from_micros(50));
            }
        })
    };

    let passed = workers
        .into_iter()
        .map(|w| w.join().unwrap_or(false))
        .filter(|ok| *ok)
        .count();
    stop.store(true, Ordering::Relaxed);
    let _ = controller.join();

    let total = start.elapsed();
    let stats = xmig::migration_stats();

    println!("\n=== Results ===");
    println!("Workers passed:  {}/{}", passed, num_threads);
    println!("Requests:        {}", requested.load(Ordering::Relaxed));
    println!("Migrations:      {}", migrated.load(Ordering::Relaxed));
    println!("Failed:          {}", stats.failed);
    println!("Total time:      {:?}", total);
    println!(
        "Throughput:      {:.0} migrations/sec",
        migrated.load(Ordering::Relaxed) as f64 / total.as_secs_f64()
    );

    println!("\n=== Stress Test Complete ===");
    if passed != num_threads {
        std::process::exit(1);
    }
}
