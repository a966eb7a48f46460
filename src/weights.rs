//! Weights serialization.
//!
//! Only constant payloads are written; placeholders are caller-supplied
//! at load time. Constants are processed in declaration order at their
//! planned offsets. A constant whose offset lies behind the write
//! cursor aliases already-written bytes and is skipped. The file is
//! zero-padded to the declared constant arena size so its length always
//! matches the header, trailing alignment padding included.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::alloc::{AllocationPlan, Arena};
use crate::error::{BundleError, Result};
use crate::ir::BundleIr;

/// Write the binary weights file.
pub fn write_weights(path: &Path, ir: &BundleIr, plan: &AllocationPlan) -> Result<()> {
    let file = File::create(path).map_err(|e| BundleError::open(path, e))?;
    let mut out = BufWriter::new(file);

    let mut pos = 0u64;
    let mut max_pos = 0u64;
    for c in ir.constants() {
        let addr = plan.offset_of(&c.var.name)?;
        if addr < pos {
            // The payload aliases bytes we have already written.
            debug!(constant = %c.var.name, offset = addr, "skipping aliased constant");
            continue;
        }
        out.seek(SeekFrom::Start(addr))
            .map_err(|e| BundleError::write(path, e))?;
        out.write_all(c.payload())
            .map_err(|e| BundleError::write(path, e))?;
        pos = addr + c.payload().len() as u64;
        max_pos = max_pos.max(pos);
    }

    // Pad to the declared arena size so the file length matches the
    // header even when the last constant is followed by alignment slack.
    let end = plan.arena_size(Arena::Constant);
    if max_pos < end {
        out.seek(SeekFrom::Start(max_pos))
            .map_err(|e| BundleError::write(path, e))?;
        let zeros = vec![0u8; (end - max_pos) as usize];
        out.write_all(&zeros)
            .map_err(|e| BundleError::write(path, e))?;
    }
    out.flush().map_err(|e| BundleError::write(path, e))?;
    Ok(())
}

/// Bytes per line of the textual weights dump.
const BYTES_PER_LINE: usize = 20;

/// Dump a binary weights file as a comma-separated hexadecimal C array,
/// for compile-time inclusion on toolchains without binary embedding.
pub fn write_weights_txt(bin_path: &Path, txt_path: &Path) -> Result<()> {
    let mut bytes = Vec::new();
    File::open(bin_path)
        .map_err(|e| BundleError::open(bin_path, e))?
        .read_to_end(&mut bytes)
        .map_err(|e| BundleError::open(bin_path, e))?;

    let mut text = String::with_capacity(bytes.len() * 6);
    for (i, b) in bytes.iter().enumerate() {
        text.push_str(&format!(" 0X{b:02X},"));
        if i % BYTES_PER_LINE == BYTES_PER_LINE - 1 {
            text.push('\n');
        }
    }
    text.push('\n');

    let mut file = File::create(txt_path).map_err(|e| BundleError::open(txt_path, e))?;
    file.write_all(text.as_bytes())
        .map_err(|e| BundleError::write(txt_path, e))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::ir::{Constant, ElemType};

    fn plan_for(pairs: &[(&str, u64)], arena_size: u64) -> AllocationPlan {
        let mut plan = AllocationPlan::new(1);
        for (name, off) in pairs {
            plan.assign(*name, Arena::Constant, *off).unwrap();
        }
        plan.set_arena_size(Arena::Constant, arena_size);
        plan
    }

    fn byte_constant(name: &str, payload: Vec<u8>) -> Constant {
        let len = payload.len();
        Constant::from_bytes(name, ElemType::U8, vec![len], payload).unwrap()
    }

    #[test]
    fn file_length_equals_declared_arena_size() {
        // Two 4-byte constants at 0 and 4, arena declared as 8.
        let mut ir = BundleIr::new();
        ir.add_constant(byte_constant("w0", vec![1, 2, 3, 4]));
        ir.add_constant(byte_constant("w1", vec![5, 6, 7, 8]));
        let plan = plan_for(&[("w0", 0), ("w1", 4)], 8);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.weights");
        write_weights(&path, &ir, &plan).unwrap();
        let data = fs::read(&path).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn trailing_alignment_is_zero_padded() {
        let mut ir = BundleIr::new();
        ir.add_constant(byte_constant("w", vec![0xAA, 0xBB]));
        let plan = plan_for(&[("w", 0)], 64);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.weights");
        write_weights(&path, &ir, &plan).unwrap();
        let data = fs::read(&path).unwrap();
        assert_eq!(data.len(), 64);
        assert_eq!(&data[..2], &[0xAA, 0xBB]);
        assert!(data[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn aliased_constants_are_written_once() {
        // w1 fully overlaps the tail of w0; its payload must not land.
        let mut ir = BundleIr::new();
        ir.add_constant(byte_constant("w0", vec![1, 2, 3, 4, 5, 6, 7, 8]));
        ir.add_constant(byte_constant("w1", vec![0xFF, 0xFF, 0xFF, 0xFF]));
        let plan = plan_for(&[("w0", 0), ("w1", 4)], 8);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.weights");
        write_weights(&path, &ir, &plan).unwrap();
        let data = fs::read(&path).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn gaps_between_constants_read_zero() {
        let mut ir = BundleIr::new();
        ir.add_constant(byte_constant("w0", vec![9]));
        ir.add_constant(byte_constant("w1", vec![7]));
        let plan = plan_for(&[("w0", 0), ("w1", 4)], 5);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.weights");
        write_weights(&path, &ir, &plan).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![9, 0, 0, 0, 7]);
    }

    #[test]
    fn serialization_is_byte_identical_across_runs() {
        let mut ir = BundleIr::new();
        ir.add_constant(byte_constant("w0", (0..32).collect()));
        let plan = plan_for(&[("w0", 0)], 64);

        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.weights");
        let b = dir.path().join("b.weights");
        write_weights(&a, &ir, &plan).unwrap();
        write_weights(&b, &ir, &plan).unwrap();
        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    }

    #[test]
    fn text_dump_is_twenty_bytes_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("net.weights");
        let txt = dir.path().join("net.inc");
        fs::write(&bin, (0u8..25).collect::<Vec<_>>()).unwrap();

        write_weights_txt(&bin, &txt).unwrap();
        let text = fs::read_to_string(&txt).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].matches(',').count(), 20);
        assert_eq!(lines[1].matches(',').count(), 5);
        assert!(lines[0].starts_with(" 0X00,"));
        assert!(lines[0].ends_with("0X13,"));
        assert!(lines[1].ends_with("0X18,"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn unopenable_text_dump_path_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("net.weights");
        fs::write(&bin, [1u8, 2, 3]).unwrap();
        let txt = dir.path().join("missing").join("net.inc");
        let err = write_weights_txt(&bin, &txt).unwrap_err();
        assert!(matches!(err, BundleError::Open { .. }));
    }
}
