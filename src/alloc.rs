//! Allocation counters read from jemalloc.
//!
//! jemalloc splits requests into size classes: small ones are served from
//! per-thread caches and arena bins, large ones get their own extents. The
//! split point is jemalloc's (14 KiB with 4 KiB pages). Both counters are
//! read from the merged `stats.arenas.<all>` namespace, which only reflects
//! this process when jemalloc is the global allocator:
//!
//! ```no_run
//! use string_build_bench::alloc::Jemalloc;
//!
//! #[global_allocator]
//! static GLOBAL: Jemalloc = Jemalloc;
//! # fn main() {}
//! ```

use std::hint::black_box;
use std::sync::OnceLock;

use tikv_jemalloc_ctl::{epoch, raw};
pub use tikv_jemallocator::Jemalloc;
use tracing::debug;

/// `MALLCTL_ARENAS_ALL`: the pseudo-arena that sums every arena.
const SMALL_REQUESTS: &[u8] = b"stats.arenas.4096.small.nrequests\0";
const LARGE_REQUESTS: &[u8] = b"stats.arenas.4096.large.nrequests\0";

/// Comfortably above jemalloc's largest small size class.
const PROBE_SIZE: usize = 1 << 20;

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Cumulative allocation counts since process start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocCounts {
    pub small: u64,
    pub large: u64,
}

impl AllocCounts {
    pub fn total(&self) -> u64 {
        self.small.saturating_add(self.large)
    }
}

/// Refresh jemalloc's stats snapshot and read both request counters.
///
/// `nrequests` includes requests served from the thread cache, unlike
/// `nmalloc`, which only counts cache fills.
fn read_counts() -> Option<AllocCounts> {
    epoch::advance().ok()?;
    // SAFETY: both names are NUL-terminated and jemalloc declares them as
    // `uint64_t`.
    let (small, large) = unsafe {
        (
            raw::read::<u64>(SMALL_REQUESTS).ok()?,
            raw::read::<u64>(LARGE_REQUESTS).ok()?,
        )
    };
    Some(AllocCounts { small, large })
}

/// Whether jemalloc is serving this process's heap with stats enabled.
///
/// Decided once, by checking that a large allocation made through the
/// global allocator moves jemalloc's large counter.
pub fn is_installed() -> bool {
    *INSTALLED.get_or_init(|| {
        let Some(before) = read_counts() else {
            debug!("jemalloc stats unavailable");
            return false;
        };
        drop(black_box(Vec::<u8>::with_capacity(PROBE_SIZE)));
        let installed = read_counts().is_some_and(|after| after.large > before.large);
        debug!(installed, "jemalloc global allocator check");
        installed
    })
}

/// Current cumulative counters, or `None` when jemalloc is not the global
/// allocator or was built without stats.
pub fn snapshot() -> Option<AllocCounts> {
    if !is_installed() {
        return None;
    }
    read_counts()
}
