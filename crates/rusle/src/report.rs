//! Sinks for per-region statistics

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use erosgis_core::{Error, Result};
use erosgis_parallel::ZonalResult;

pub trait StatisticsReporter {
    fn report(&mut self, result: &ZonalResult) -> Result<()>;

    /// Flush buffered output
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One JSON object per region and line
pub struct JsonLinesReporter<W: Write> {
    writer: W,
}

impl JsonLinesReporter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonLinesReporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> StatisticsReporter for JsonLinesReporter<W> {
    fn report(&mut self, result: &ZonalResult) -> Result<()> {
        serde_json::to_writer(&mut self.writer, result).map_err(|e| Error::Other(e.to_string()))?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps results in memory
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    pub results: Vec<ZonalResult>,
}

impl StatisticsReporter for CollectingReporter {
    fn report(&mut self, result: &ZonalResult) -> Result<()> {
        self.results.push(result.clone());
        Ok(())
    }
}
