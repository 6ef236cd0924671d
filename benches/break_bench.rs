use std::alloc::{GlobalAlloc, Layout, System};
use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use flowbreak::{DisplayAlign, PageMaster, SearchMode};
use flowbreak_render::{BlockFlow, FlowBlock, FlowSpace, RenderEngine, RenderEngineOptions};

const PAGE_WIDTH: i32 = 468_000;
const PAGE_HEIGHT: i32 = 648_000;
const LINE_HEIGHT: i32 = 14_400;

struct TrackingAllocator;

static CURRENT_ALLOC_BYTES: AtomicUsize = AtomicUsize::new(0);
static PEAK_ALLOC_BYTES: AtomicUsize = AtomicUsize::new(0);

#[global_allocator]
static GLOBAL_ALLOCATOR: TrackingAllocator = TrackingAllocator;

fn current_alloc_bytes() -> usize {
    CURRENT_ALLOC_BYTES.load(Ordering::Relaxed)
}

fn peak_alloc_bytes() -> usize {
    PEAK_ALLOC_BYTES.load(Ordering::Relaxed)
}

fn reset_peak_alloc_bytes() {
    PEAK_ALLOC_BYTES.store(current_alloc_bytes(), Ordering::Relaxed);
}

fn update_peak_alloc_bytes(current: usize) {
    let mut peak = PEAK_ALLOC_BYTES.load(Ordering::Relaxed);
    while current > peak {
        match PEAK_ALLOC_BYTES.compare_exchange_weak(
            peak,
            current,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(next) => peak = next,
        }
    }
}

fn add_current_alloc_bytes(delta: usize) {
    let current = CURRENT_ALLOC_BYTES.fetch_add(delta, Ordering::Relaxed) + delta;
    update_peak_alloc_bytes(current);
}

fn sub_current_alloc_bytes(delta: usize) {
    let mut current = CURRENT_ALLOC_BYTES.load(Ordering::Relaxed);
    loop {
        let next = current.saturating_sub(delta);
        match CURRENT_ALLOC_BYTES.compare_exchange_weak(
            current,
            next,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            add_current_alloc_bytes(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        sub_current_alloc_bytes(layout.size());
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            add_current_alloc_bytes(layout.size());
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            if new_size >= layout.size() {
                add_current_alloc_bytes(new_size - layout.size());
            } else {
                sub_current_alloc_bytes(layout.size() - new_size);
            }
        }
        new_ptr
    }
}

#[derive(Clone, Debug)]
struct CaseResult {
    fixture: String,
    case: String,
    iterations: usize,
    min_ns: u128,
    median_ns: u128,
    mean_ns: u128,
    max_ns: u128,
    median_peak_heap_bytes: usize,
    max_peak_heap_bytes: usize,
}

fn percentile_u128(sorted: &[u128], percentile: f64) -> u128 {
    let idx = ((sorted.len().saturating_sub(1) as f64) * percentile).round() as usize;
    sorted[idx]
}

fn percentile_usize(sorted: &[usize], percentile: f64) -> usize {
    let idx = ((sorted.len().saturating_sub(1) as f64) * percentile).round() as usize;
    sorted[idx]
}

/// Deterministic flow: paragraphs of varying length with elastic spacing and
/// an occasional page break.
fn synthetic_flow(blocks: usize, page_breaks: bool) -> Vec<FlowBlock> {
    let mut out = Vec::with_capacity(blocks);
    let mut seed: u32 = 0x9e37_79b9;
    for i in 0..blocks {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let lines = 1 + (seed % 12) as i32;
        let mut block = FlowBlock::paragraph(lines * PAGE_WIDTH - (seed % 997) as i32, LINE_HEIGHT)
            .with_space_before(FlowSpace::elastic(6_000, 3_000))
            .with_space_after(FlowSpace::elastic(6_000, 3_000));
        if page_breaks && i > 0 && i % 40 == 0 {
            block = block.with_break_before(flowbreak::BreakClass::Page);
        }
        out.push(block);
    }
    out
}

fn run_case<F>(
    fixture: &str,
    case: &str,
    warmup_iters: usize,
    measure_iters: usize,
    mut op: F,
) -> CaseResult
where
    F: FnMut() -> usize,
{
    for _ in 0..warmup_iters {
        black_box(op());
    }

    let mut time_samples = Vec::with_capacity(measure_iters);
    let mut mem_samples = Vec::with_capacity(measure_iters);
    for _ in 0..measure_iters {
        let baseline_alloc = current_alloc_bytes();
        reset_peak_alloc_bytes();
        let start = Instant::now();
        black_box(op());
        time_samples.push(start.elapsed().as_nanos());
        mem_samples.push(peak_alloc_bytes().saturating_sub(baseline_alloc));
    }

    time_samples.sort_unstable();
    mem_samples.sort_unstable();
    let time_sum: u128 = time_samples.iter().copied().sum();

    CaseResult {
        fixture: fixture.to_string(),
        case: case.to_string(),
        iterations: measure_iters,
        min_ns: time_samples[0],
        median_ns: percentile_u128(&time_samples, 0.5),
        mean_ns: time_sum / time_samples.len() as u128,
        max_ns: time_samples[time_samples.len() - 1],
        median_peak_heap_bytes: percentile_usize(&mem_samples, 0.5),
        max_peak_heap_bytes: mem_samples[mem_samples.len() - 1],
    }
}

fn layout_pages(blocks: &[FlowBlock], opts: &RenderEngineOptions) -> usize {
    let engine = RenderEngine::new(opts.clone());
    let mut flow = BlockFlow::new(blocks.to_vec());
    engine
        .layout(&mut flow)
        .unwrap_or_else(|e| panic!("layout failed: {}", e))
        .len()
}

fn main() {
    let quick = std::env::args().any(|arg| arg == "--quick");
    let warmup_iters = if quick { 1 } else { 2 };
    let measure_iters = if quick { 3 } else { 10 };

    println!("# flowbreak benchmark");
    println!(
        "# mode={} warmup_iters={} measure_iters={}",
        if quick { "quick" } else { "full" },
        warmup_iters,
        measure_iters
    );
    println!(
        "fixture,case,iterations,min_ns,median_ns,mean_ns,max_ns,median_peak_heap_bytes,max_peak_heap_bytes"
    );

    let fixtures: [(&str, Vec<FlowBlock>); 3] = [
        ("short-flow", synthetic_flow(40, false)),
        ("long-flow", synthetic_flow(400, false)),
        ("sectioned-flow", synthetic_flow(400, true)),
    ];

    let mut results = Vec::new();
    for (fixture_key, blocks) in &fixtures {
        let base = RenderEngineOptions::for_display(PAGE_WIDTH, PAGE_HEIGHT);

        results.push(run_case(fixture_key, "layout_before", warmup_iters, measure_iters, || {
            layout_pages(blocks, &base)
        }));

        let mut fill = base.clone();
        fill.breaker = fill.breaker.clone().with_display_align(DisplayAlign::Fill);
        results.push(run_case(fixture_key, "layout_fill", warmup_iters, measure_iters, || {
            layout_pages(blocks, &fill)
        }));

        let mut first_fit = base.clone();
        first_fit.breaker = first_fit.breaker.clone().with_search_mode(SearchMode::FirstFit);
        results.push(run_case(
            fixture_key,
            "layout_first_fit",
            warmup_iters,
            measure_iters,
            || layout_pages(blocks, &first_fit),
        ));

        let mut narrowing = base.clone();
        narrowing.masters = narrowing
            .masters
            .with_first(PageMaster::new(PAGE_HEIGHT, PAGE_WIDTH + PAGE_WIDTH / 4));
        results.push(run_case(
            fixture_key,
            "layout_ipd_restart",
            warmup_iters,
            measure_iters,
            || layout_pages(blocks, &narrowing),
        ));
    }

    for result in &results {
        println!(
            "{},{},{},{},{},{},{},{},{}",
            result.fixture,
            result.case,
            result.iterations,
            result.min_ns,
            result.median_ns,
            result.mean_ns,
            result.max_ns,
            result.median_peak_heap_bytes,
            result.max_peak_heap_bytes
        );
    }
}
