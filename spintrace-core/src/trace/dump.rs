//! Hex dump of a trace table
//!
//! ```text
//! Trace(0x7f3a5c000000)::dump
//! ..next(0x000000e0) size(0x00001000) zero(0x20) last(0x00001000) wrap(0)
//! 00000020  4F50454E 0000002A 00000000 000003E8  |OPEN...*........|
//! 00000030  66696C65 2E747874 00000000 00000000  |file.txt........|
//! 00000040  00000000 00000000 00000000 00000000  |................|
//! 00000050  to 000000BF, lines duplicated
//! 000000C0  434C4F53 00000001 00000000 000003E8  |CLOS............|
//! 000000D0  00000000 00000000 00000000 00000000  |................|
//! ```
//!
//! Repeated lines collapse into one `lines duplicated` entry; the final line
//! is always shown. After a wrap the abandoned tail of the lap is summarised
//! on one line:
//!
//! ```text
//! 000003E0  .END to 000003FF, lap end
//! ```

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::timing::Clock;

use super::buffer::TraceBuffer;
use super::reader::{TraceImage, LINE_SIZE};
use super::record::IDENT_LAP_END;

/// Process-wide output sink, locked for the duration of a dump so lines
/// from concurrent dumps never interleave
pub type DumpSink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Sink writing to standard error
pub fn stderr_sink() -> DumpSink {
    Arc::new(Mutex::new(Box::new(std::io::stderr())))
}

impl<C: Clock> TraceBuffer<'_, C> {
    /// Dump the table to the shared sink, holding its lock throughout
    pub fn dump(&self, sink: &DumpSink) -> Result<()> {
        let mut out = sink.lock();
        self.dump_to(&mut *out)
    }

    /// Dump the table to `out`.
    ///
    /// Writers are not stopped; the dump may show records mid-write.
    pub fn dump_to<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        let snapshot = self.snapshot();
        let image = TraceImage::parse(&snapshot)?;

        writeln!(out, "Trace({:p})::dump", self.as_ptr())?;
        write_image(&image, out)?;

        tracing::info!(
            next = image.next,
            last = image.last,
            wraps = image.wrap,
            "trace table dumped"
        );
        Ok(())
    }
}

/// Write the header fields and the hex view of an image's dump range
pub fn write_image<W: Write + ?Sized>(image: &TraceImage<'_>, out: &mut W) -> Result<()> {
    writeln!(
        out,
        "..next({:#010x}) size({:#010x}) zero({:#04x}) last({:#010x}) wrap({})",
        image.next, image.size, image.zero, image.last, image.wrap
    )?;

    let total = image.lines().len();
    let mut previous: Option<&[u8]> = None;
    let mut repeat_from: Option<usize> = None;

    for (index, (offset, line)) in image.lines().enumerate() {
        let final_line = index + 1 == total;
        let repeated = previous == Some(line) && line.len() == LINE_SIZE && !final_line;

        if repeated {
            repeat_from.get_or_insert(offset);
            continue;
        }

        if let Some(from) = repeat_from.take() {
            writeln!(out, "{from:08X}  to {:08X}, lines duplicated", offset - 1)?;
        }
        writeln!(out, "{}", format_line(offset, line))?;
        previous = Some(line);
    }

    if let Some(tail) = image.stale_tail() {
        writeln!(
            out,
            "{:08X}  {} to {:08X}, lap end",
            tail.start,
            String::from_utf8_lossy(&IDENT_LAP_END),
            tail.end - 1
        )?;
    }

    Ok(())
}

/// Format one line: offset, four groups of four hex bytes, ASCII column.
/// Bytes missing from a short line show as `~`.
pub fn format_line(offset: usize, line: &[u8]) -> String {
    let mut hex_groups = Vec::with_capacity(LINE_SIZE / 4);
    for group in 0..LINE_SIZE / 4 {
        let start = (group * 4).min(line.len());
        let end = (group * 4 + 4).min(line.len());
        let mut text = hex::encode_upper(&line[start..end]);
        while text.len() < 8 {
            text.push('~');
        }
        hex_groups.push(text);
    }

    let mut ascii: String = line
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect();
    while ascii.len() < LINE_SIZE {
        ascii.push('~');
    }

    format!("{offset:08X}  {}  |{ascii}|", hex_groups.join(" "))
}
