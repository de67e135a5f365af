use chrono::{DateTime, Utc};
use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::SystemTime;
use telepipe::KeyValue;
use telepipe_sdk::{ExportError, ExportResult, Resource};

pub(crate) type BoxedWriter = Box<dyn Write + Send + Sync>;

/// Destination of an exporter. Taken on shutdown, so writes after shutdown
/// fail with [`ExportError::AlreadyShutdown`].
pub(crate) struct Output {
    writer: Mutex<Option<BoxedWriter>>,
}

impl Output {
    pub(crate) fn new(writer: Option<BoxedWriter>) -> Self {
        Output {
            writer: Mutex::new(Some(writer.unwrap_or_else(|| Box::new(io::stdout())))),
        }
    }

    pub(crate) fn write_with<F>(&self, f: F) -> ExportResult
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let mut guard = self.writer.lock()?;
        let writer = guard.as_mut().ok_or(ExportError::AlreadyShutdown)?;
        f(&mut **writer)
            .and_then(|_| writer.flush())
            .map_err(|err| ExportError::Failed(err.to_string()))
    }

    pub(crate) fn flush(&self) -> ExportResult {
        self.write_with(|_| Ok(()))
    }

    pub(crate) fn close(&self) -> ExportResult {
        match self.writer.lock()?.take() {
            Some(mut writer) => writer
                .flush()
                .map_err(|err| ExportError::Failed(err.to_string())),
            None => Err(ExportError::AlreadyShutdown),
        }
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = self.writer.lock().map(|w| w.is_some()).unwrap_or(false);
        f.debug_struct("Output").field("open", &open).finish()
    }
}

pub(crate) fn format_time(time: SystemTime) -> impl fmt::Display {
    let datetime: DateTime<Utc> = time.into();
    datetime.format("%Y-%m-%d %H:%M:%S%.6f")
}

pub(crate) fn write_resource(w: &mut dyn Write, resource: &Resource) -> io::Result<()> {
    writeln!(w, "Resource")?;
    if let Some(schema_url) = resource.schema_url() {
        writeln!(w, "\t Resource SchemaUrl: {schema_url:?}")?;
    }
    let mut attributes: Vec<_> = resource.iter().collect();
    attributes.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    for (key, value) in attributes {
        writeln!(w, "\t ->  {key}={value}")?;
    }
    Ok(())
}

pub(crate) fn write_attributes(
    w: &mut dyn Write,
    indent: &str,
    attributes: &[KeyValue],
) -> io::Result<()> {
    for kv in attributes {
        writeln!(w, "{indent}->  {}: {}", kv.key, kv.value)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    /// An in-memory sink whose clones share the same buffer.
    #[derive(Clone, Default)]
    pub(crate) struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Buffer {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
