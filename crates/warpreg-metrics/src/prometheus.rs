//! Prometheus text exposition format.

use crate::collector::RegistryMetrics;

/// Escape a label value per the exposition format.
fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Render all registry metrics into Prometheus text format.
pub fn render_prometheus(metrics: &RegistryMetrics) -> String {
    let mut out = String::new();
    let workers = metrics.worker_samples();

    out.push_str("# HELP warpreg_worker_health_status Health status of workers (1 healthy, 0 unhealthy).\n");
    out.push_str("# TYPE warpreg_worker_health_status gauge\n");
    for w in &workers {
        out.push_str(&format!(
            "warpreg_worker_health_status{{worker=\"{}\",url=\"{}\"}} {}\n",
            escape_label(&w.worker_id),
            escape_label(&w.url),
            u8::from(w.healthy)
        ));
    }

    out.push_str("# HELP warpreg_workers_registered Workers currently tracked.\n");
    out.push_str("# TYPE warpreg_workers_registered gauge\n");
    out.push_str(&format!("warpreg_workers_registered {}\n", workers.len()));

    let sweeps = metrics.sweep_totals();
    out.push_str("# HELP warpreg_health_sweeps_total Completed health sweeps.\n");
    out.push_str("# TYPE warpreg_health_sweeps_total counter\n");
    out.push_str(&format!("warpreg_health_sweeps_total {}\n", sweeps.sweeps));

    out.push_str("# HELP warpreg_worker_probes_total Workers probed across all sweeps.\n");
    out.push_str("# TYPE warpreg_worker_probes_total counter\n");
    out.push_str(&format!("warpreg_worker_probes_total {}\n", sweeps.probed));

    out.push_str("# HELP warpreg_worker_evictions_total Workers evicted after exhausting probe retries.\n");
    out.push_str("# TYPE warpreg_worker_evictions_total counter\n");
    out.push_str(&format!("warpreg_worker_evictions_total {}\n", sweeps.evicted));

    out.push_str("# HELP warpreg_last_sweep_duration_seconds Duration of the most recent sweep.\n");
    out.push_str("# TYPE warpreg_last_sweep_duration_seconds gauge\n");
    out.push_str(&format!(
        "warpreg_last_sweep_duration_seconds {:.6}\n",
        sweeps.last_duration_seconds
    ));

    let requests = metrics.request_samples();

    out.push_str("# HELP warpreg_http_requests_total Total number of HTTP requests.\n");
    out.push_str("# TYPE warpreg_http_requests_total counter\n");
    for (method, endpoint, status, stats) in &requests {
        out.push_str(&format!(
            "warpreg_http_requests_total{{method=\"{}\",endpoint=\"{}\",status=\"{}\"}} {}\n",
            escape_label(method),
            escape_label(endpoint),
            status,
            stats.count
        ));
    }

    out.push_str("# HELP warpreg_http_request_duration_seconds Duration of HTTP requests in seconds.\n");
    out.push_str("# TYPE warpreg_http_request_duration_seconds summary\n");
    for (method, endpoint, status, stats) in &requests {
        let labels = format!(
            "method=\"{}\",endpoint=\"{}\",status=\"{}\"",
            escape_label(method),
            escape_label(endpoint),
            status
        );
        out.push_str(&format!(
            "warpreg_http_request_duration_seconds_sum{{{labels}}} {:.6}\n",
            stats.total_seconds
        ));
        out.push_str(&format!(
            "warpreg_http_request_duration_seconds_count{{{labels}}} {}\n",
            stats.count
        ));
    }

    out
}
