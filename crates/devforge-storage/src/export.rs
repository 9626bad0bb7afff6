//! `export(format, filter)` byte-stream rendering (spec §6), shared by
//! every [`devforge_analytics::StorageBackend`] implementation.

use devforge_analytics::{AnalyticsError, ExportFormat, Result};
use devforge_tracer::FinishedTrace;

/// Render `traces` in `format`. JSON export is a canonical array (stable
/// field order from `FinishedTrace`'s derive) so that `export -> import ->
/// export` is byte-identical (spec §8 Round-trips).
pub fn render(traces: &[FinishedTrace], format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Json => serde_json::to_vec(traces).map_err(|e| AnalyticsError::ExportFailure(e.to_string())),
        ExportFormat::Csv => render_csv(traces),
    }
}

fn render_csv(traces: &[FinishedTrace]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer
        .write_record(["request_id", "root_label", "success", "duration_ms", "node_count", "truncated"])
        .map_err(|e| AnalyticsError::ExportFailure(e.to_string()))?;

    for trace in traces {
        let root = trace.root();
        writer
            .write_record([
                trace.request_id.to_string(),
                root.label.clone(),
                trace.succeeded().to_string(),
                trace.total_duration_ms().to_string(),
                trace.nodes.len().to_string(),
                trace.truncated.to_string(),
            ])
            .map_err(|e| AnalyticsError::ExportFailure(e.to_string()))?;
    }

    writer.into_inner().map_err(|e| AnalyticsError::ExportFailure(e.to_string()))
}
