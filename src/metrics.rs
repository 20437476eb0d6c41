use std::sync::LazyLock;

use prometheus::*;

static METRIC_QUERY_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("anisearch_query_count", "count of the image to search", &["index"])
        .expect("failed to register metric")
});

static METRIC_QUERY_FAILED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("anisearch_query_failed", "count of the failed search", &["index", "error"])
        .expect("failed to register metric")
});

static METRIC_SEARCH_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "anisearch_search_duration",
        "duration of the per-image search in seconds",
        &["index"]
    )
    .expect("failed to register metric")
});

static METRIC_TOP_SIMILARITY: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "anisearch_top_similarity",
        "similarity of the best result",
        &["index"],
        (5..=100).step_by(5).map(|x| x as f64).collect()
    )
    .expect("failed to register metric")
});

pub fn inc_query_count(index: &str) {
    METRIC_QUERY_COUNT.with_label_values(&[index]).inc();
}

pub fn inc_query_failed(index: &str, error: &str) {
    METRIC_QUERY_FAILED.with_label_values(&[index, error]).inc();
}

pub fn observe_search_duration(index: &str, seconds: f64) {
    METRIC_SEARCH_DURATION.with_label_values(&[index]).observe(seconds);
}

pub fn observe_top_similarity(index: &str, similarity: f64) {
    METRIC_TOP_SIMILARITY.with_label_values(&[index]).observe(similarity);
}

/// 以文本格式导出所有指标
pub fn render() -> String {
    let encoder = TextEncoder::new();
    encoder.encode_to_string(&gather()).unwrap_or_default()
}
