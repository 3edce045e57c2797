use std::sync::LazyLock;

use prometheus::*;

static METRIC_INGESTED_PAGES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "pagesearch_ingested_pages",
        "count of the pdf pages processed during ingestion",
        &["status"]
    )
    .unwrap()
});

static METRIC_FAILED_FILES: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("pagesearch_failed_files", "count of the pdf files failed to rasterize")
        .unwrap()
});

static METRIC_SEARCH_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "pagesearch_search_duration",
        "duration of the query embedding and search in seconds",
        &["k"]
    )
    .unwrap()
});

static METRIC_ANSWER_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("pagesearch_answer_failures", "count of the failed answer generations")
        .unwrap()
});

/// 记录一页的处理结果
pub fn inc_page(stored: bool) {
    let status = if stored { "stored" } else { "failed" };
    METRIC_INGESTED_PAGES.with_label_values(&[status]).inc();
}

pub fn inc_failed_file() {
    METRIC_FAILED_FILES.inc();
}

pub fn observe_search_duration(k: usize, duration: f32) {
    METRIC_SEARCH_DURATION.with_label_values(&[&k.to_string()]).observe(duration as f64);
}

pub fn inc_answer_failure() {
    METRIC_ANSWER_FAILURES.inc();
}

/// 以文本格式导出所有指标
pub fn gather_text() -> String {
    TextEncoder::new().encode_to_string(&gather()).unwrap_or_default()
}
