//! Segment files: one JSON document per line, optionally Snappy framed.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;

use common_config::CompressionCodec;
use common_error::{WeirError, WeirResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

fn create(dir: Option<&Path>) -> WeirResult<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("weir-spill-").suffix(".jsonl");
    match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|e| WeirError::spill(format!("cannot create spill file: {e}")))
}

/// Write `items` to a fresh temporary file. Returns the file and its size.
pub(crate) fn write_segment<T: Serialize>(
    dir: Option<&Path>,
    codec: CompressionCodec,
    items: &[T],
) -> WeirResult<(NamedTempFile, u64)> {
    let file = create(dir)?;
    let handle = file.reopen()?;
    match codec {
        CompressionCodec::None => write_lines(BufWriter::new(handle), items)?,
        CompressionCodec::Snappy => {
            write_lines(snap::write::FrameEncoder::new(BufWriter::new(handle)), items)?
        }
    }
    let bytes = file.as_file().metadata()?.len();
    Ok((file, bytes))
}

/// Copy an existing segment into a new temporary file.
pub(crate) fn copy_segment(dir: Option<&Path>, from: &Path) -> WeirResult<NamedTempFile> {
    let file = create(dir)?;
    std::fs::copy(from, file.path()).map_err(|e| {
        WeirError::spill(format!("cannot copy spill file {}: {e}", from.display()))
    })?;
    Ok(file)
}

fn write_lines<W: Write, T: Serialize>(mut out: W, items: &[T]) -> WeirResult<()> {
    for item in items {
        serde_json::to_writer(&mut out, item)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Streams the elements of one segment back.
pub(crate) struct SegmentReader<T> {
    lines: std::io::Lines<BufReader<Box<dyn Read + Send>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> SegmentReader<T> {
    pub(crate) fn open(path: &Path, codec: CompressionCodec) -> WeirResult<Self> {
        let file = File::open(path).map_err(|e| {
            WeirError::spill(format!("cannot open spill file {}: {e}", path.display()))
        })?;
        let raw: Box<dyn Read + Send> = match codec {
            CompressionCodec::None => Box::new(file),
            CompressionCodec::Snappy => Box::new(snap::read::FrameDecoder::new(file)),
        };
        Ok(Self {
            lines: BufReader::new(raw).lines(),
            _marker: PhantomData,
        })
    }
}

impl<T: DeserializeOwned> Iterator for SegmentReader<T> {
    type Item = WeirResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(WeirError::spill(format!("reading spill segment: {e}")))),
        };
        Some(
            serde_json::from_str(&line)
                .map_err(|e| WeirError::spill(format!("corrupt spill segment: {e}"))),
        )
    }
}
