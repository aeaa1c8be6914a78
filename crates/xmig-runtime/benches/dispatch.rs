//! Migration-point overhead
//!
//! 1. **Fast path**: `check_migrate` with nothing pending, the cost every
//!    instrumented call pays
//! 2. **Migration**: a full capture/translate/rewrite/resume at several
//!    stack depths

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use xmig_core::constants::MIN_STACK_SIZE;
use xmig_core::{Arch, ProgramImage};
use xmig_runtime::{attach, check_migrate, detach, tls, try_migrate, AttachOptions, MigrateConfig};

fn program(depth: usize) -> (Arc<ProgramImage>, Vec<xmig_core::SiteId>) {
    let mut b = ProgramImage::builder();
    let sites = (0..depth)
        .map(|i| {
            let f = b.function(&format!("f{}", i), 4);
            b.call_site(f)
        })
        .collect();
    (Arc::new(b.build().unwrap()), sites)
}

fn attach_with_depth(depth: usize) {
    let (program, sites) = program(depth.max(1));
    attach(
        AttachOptions::new(program)
            .config(MigrateConfig::new().stack_size(16 * MIN_STACK_SIZE))
            .initial_arch(Arch::X86_64),
    )
    .unwrap();
    for (i, site) in sites.into_iter().take(depth).enumerate() {
        tls::with_context(|ctx| ctx.image.push_frame(site, vec![i as u64; 4]))
            .unwrap()
            .unwrap();
    }
}

fn bench_fast_path(c: &mut Criterion) {
    attach_with_depth(1);
    c.bench_function("check_migrate/nothing_pending", |b| {
        b.iter(|| black_box(check_migrate(black_box(None))))
    });
    detach().unwrap();
}

fn bench_migration(c: &mut Criterion) {
    let mut group = c.benchmark_group("migrate");
    for depth in [0usize, 4, 16, 64] {
        attach_with_depth(depth);
        let mut dest = Arch::AArch64;
        group.bench_with_input(BenchmarkId::new("ping_pong", depth), &depth, |b, _| {
            b.iter(|| {
                let out = try_migrate(None, Some(dest)).unwrap();
                dest = if dest == Arch::AArch64 { Arch::PowerPc64 } else { Arch::AArch64 };
                black_box(out)
            })
        });
        detach().unwrap();
    }
    group.finish();
}

criterion_group!(benches, bench_fast_path, bench_migration);
criterion_main!(benches);
