use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::{error::Result, shared::Particle};

/// Receives the particle set once per tick, after integration.
pub trait FrameSink<P: Particle> {
    fn frame(&mut self, step: u64, points: &[P]) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards every frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl<P: Particle> FrameSink<P> for NullSink {
    fn frame(&mut self, _step: u64, _points: &[P]) -> Result<()> {
        Ok(())
    }
}

/// Writes `frame,body,x,y` rows, one per particle, every `every` steps.
pub struct CsvFrameSink<W: Write> {
    writer: BufWriter<W>,
    every: u64,
    header_written: bool,
}

impl CsvFrameSink<File> {
    pub fn create(path: impl AsRef<Path>, every: u64) -> Result<Self> {
        Ok(Self::new(File::create(path)?, every))
    }
}

impl<W: Write> CsvFrameSink<W> {
    pub fn new(writer: W, every: u64) -> Self {
        Self {
            writer: BufWriter::new(writer),
            every: every.max(1),
            header_written: false,
        }
    }

    pub fn into_inner(self) -> std::result::Result<W, std::io::Error> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

impl<P: Particle, W: Write> FrameSink<P> for CsvFrameSink<W> {
    fn frame(&mut self, step: u64, points: &[P]) -> Result<()> {
        if step % self.every != 0 {
            return Ok(());
        }
        if !self.header_written {
            writeln!(self.writer, "frame,body,x,y")?;
            self.header_written = true;
        }
        for (body, p) in points.iter().enumerate() {
            let position = p.position();
            writeln!(self.writer, "{step},{body},{},{}", position.x, position.y)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
