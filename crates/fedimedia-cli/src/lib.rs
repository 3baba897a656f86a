use fedimedia_media::{PruneReport, SweepResult};
use fedimedia_processing::ProbeResult;
use serde_json::{json, Value};

/// Initialize tracing for the CLI. `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fedimedia=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

pub fn report_json(report: &PruneReport) -> Value {
    json!({
        "dry_run": report.dry_run,
        "unused_local": report.unused_local,
        "unused_remote": report.unused_remote,
        "uncached_remote": report.uncached_remote,
        "uncached_emoji": report.uncached_emoji,
        "fixed_cache_states": report.fixed_cache_states,
        "orphaned": report.orphaned,
        "total": report.total(),
        "errors": report.errors.errors(),
    })
}

pub fn sweep_json(sweep: &str, dry_run: bool, result: &SweepResult) -> Value {
    json!({
        "sweep": sweep,
        "dry_run": dry_run,
        "pruned": result.pruned,
        "errors": result.errors.errors(),
    })
}

pub fn probe_json(probe: &ProbeResult) -> Value {
    json!({
        "type": probe.kind,
        "container": probe.container,
        "mime": probe.mime,
        "extension": probe.extension,
        "width": probe.width,
        "height": probe.height,
        "framerate": probe.framerate,
        "duration": probe.duration,
        "bitrate": probe.bitrate,
        "orientation": probe.orientation,
        "pixel_format": probe.pixel_format,
        "has_alpha": probe.has_alpha,
    })
}
