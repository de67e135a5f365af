use crate::common::{format_time, write_attributes, write_resource, BoxedWriter, Output};
use std::fmt::{self, Display};
use std::io::{self, Write};
use telepipe_sdk::metrics::data::{
    AggregatedMetrics, Gauge, Histogram, Metric, MetricData, ResourceMetrics, Sum,
};
use telepipe_sdk::metrics::PushMetricExporter;
use telepipe_sdk::ExportResult;

/// Writes collected metrics in a human readable form.
#[derive(Debug)]
pub struct MetricExporter {
    output: Output,
}

impl Default for MetricExporter {
    fn default() -> Self {
        MetricExporter::builder().build()
    }
}

impl MetricExporter {
    /// Create a builder to configure this exporter.
    pub fn builder() -> MetricExporterBuilder {
        MetricExporterBuilder::default()
    }
}

impl PushMetricExporter for MetricExporter {
    async fn export(&self, metrics: &ResourceMetrics) -> ExportResult {
        self.output.write_with(|w| {
            writeln!(w, "Metrics")?;
            write_resource(w, &metrics.resource)?;
            for (i, scope_metrics) in metrics.scope_metrics.iter().enumerate() {
                writeln!(w, "\tInstrumentation Scope #{i}")?;
                writeln!(w, "\t\tName         : {}", scope_metrics.scope.name())?;
                if let Some(version) = scope_metrics.scope.version() {
                    writeln!(w, "\t\tVersion      : {version}")?;
                }
                for (j, metric) in scope_metrics.metrics.iter().enumerate() {
                    writeln!(w, "\tMetric #{j}")?;
                    write_metric(w, metric)?;
                }
            }
            Ok(())
        })
    }

    fn force_flush(&self) -> ExportResult {
        self.output.flush()
    }

    fn shutdown(&self) -> ExportResult {
        self.output.close()
    }
}

fn write_metric(w: &mut dyn Write, metric: &Metric) -> io::Result<()> {
    writeln!(w, "\t\tName         : {}", metric.name)?;
    writeln!(w, "\t\tDescription  : {}", metric.description)?;
    writeln!(w, "\t\tUnit         : {}", metric.unit)?;
    match &metric.data {
        AggregatedMetrics::F64(data) => write_data(w, data),
        AggregatedMetrics::U64(data) => write_data(w, data),
        AggregatedMetrics::I64(data) => write_data(w, data),
    }
}

fn write_data<T: Display>(w: &mut dyn Write, data: &MetricData<T>) -> io::Result<()> {
    match data {
        MetricData::Gauge(gauge) => {
            writeln!(w, "\t\tType         : Gauge")?;
            write_gauge(w, gauge)
        }
        MetricData::Sum(sum) => {
            writeln!(w, "\t\tType         : Sum")?;
            write_sum(w, sum)
        }
        MetricData::Histogram(histogram) => {
            writeln!(w, "\t\tType         : Histogram")?;
            write_histogram(w, histogram)
        }
    }
}

fn write_sum<T: Display>(w: &mut dyn Write, sum: &Sum<T>) -> io::Result<()> {
    writeln!(w, "\t\tSum DataPoints")?;
    writeln!(w, "\t\tMonotonic    : {}", sum.is_monotonic)?;
    writeln!(w, "\t\tTemporality  : {:?}", sum.temporality)?;
    writeln!(w, "\t\tStartTime    : {}", format_time(sum.start_time))?;
    writeln!(w, "\t\tEndTime      : {}", format_time(sum.time))?;
    for (i, point) in sum.data_points.iter().enumerate() {
        writeln!(w, "\t\tDataPoint #{i}")?;
        writeln!(w, "\t\t\tValue        : {}", point.value)?;
        writeln!(w, "\t\t\tAttributes   :")?;
        write_attributes(w, "\t\t\t\t ", &point.attributes)?;
    }
    Ok(())
}

fn write_gauge<T: Display>(w: &mut dyn Write, gauge: &Gauge<T>) -> io::Result<()> {
    writeln!(w, "\t\tGauge DataPoints")?;
    if let Some(start_time) = gauge.start_time {
        writeln!(w, "\t\tStartTime    : {}", format_time(start_time))?;
    }
    writeln!(w, "\t\tEndTime      : {}", format_time(gauge.time))?;
    for (i, point) in gauge.data_points.iter().enumerate() {
        writeln!(w, "\t\tDataPoint #{i}")?;
        writeln!(w, "\t\t\tValue        : {}", point.value)?;
        writeln!(w, "\t\t\tAttributes   :")?;
        write_attributes(w, "\t\t\t\t ", &point.attributes)?;
    }
    Ok(())
}

fn write_histogram<T: Display>(w: &mut dyn Write, histogram: &Histogram<T>) -> io::Result<()> {
    writeln!(w, "\t\tHistogram DataPoints")?;
    writeln!(w, "\t\tTemporality  : {:?}", histogram.temporality)?;
    writeln!(w, "\t\tStartTime    : {}", format_time(histogram.start_time))?;
    writeln!(w, "\t\tEndTime      : {}", format_time(histogram.time))?;
    for (i, point) in histogram.data_points.iter().enumerate() {
        writeln!(w, "\t\tDataPoint #{i}")?;
        writeln!(w, "\t\t\tCount        : {}", point.count)?;
        writeln!(w, "\t\t\tSum          : {}", point.sum)?;
        if let Some(min) = &point.min {
            writeln!(w, "\t\t\tMin          : {min}")?;
        }
        if let Some(max) = &point.max {
            writeln!(w, "\t\t\tMax          : {max}")?;
        }
        writeln!(w, "\t\t\tAttributes   :")?;
        write_attributes(w, "\t\t\t\t ", &point.attributes)?;
        writeln!(w, "\t\t\tBuckets")?;
        let mut lower = Bound::NegInfinity;
        for (bound, count) in point.bounds.iter().zip(&point.bucket_counts) {
            writeln!(w, "\t\t\t\t {lower} to {bound} : {count}")?;
            lower = Bound::Finite(*bound);
        }
        if let Some(last) = point.bucket_counts.get(point.bounds.len()) {
            writeln!(w, "\t\t\t\t {lower} to +Infinity : {last}")?;
        }
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Bound {
    NegInfinity,
    Finite(f64),
}

impl Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::NegInfinity => f.write_str("-Infinity"),
            Bound::Finite(value) => value.fmt(f),
        }
    }
}

/// Configuration for the console [`MetricExporter`].
#[derive(Default)]
pub struct MetricExporterBuilder {
    writer: Option<BoxedWriter>,
}

impl fmt::Debug for MetricExporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MetricExporterBuilder")
    }
}

impl MetricExporterBuilder {
    /// Set the writer that metrics are written to, stdout by default.
    pub fn with_writer<W>(mut self, writer: W) -> Self
    where
        W: Write + Send + Sync + 'static,
    {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Create a metrics exporter with the current configuration.
    pub fn build(self) -> MetricExporter {
        MetricExporter {
            output: Output::new(self.writer),
        }
    }
}
