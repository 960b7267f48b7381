// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transfer strategies: native, buffered, file, audio.
//
// Each strategy moves exactly one page (or clip) and leaves acknowledgement
// to the acquisition driver. A source holds a single transfer slot: the
// strip buffer is leased out for each device call and must come back before
// the next one, so a double-lease surfaces as `BufferInFlight` instead of
// corrupted strips.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{
    Destination, FileFormat, ImageInfo, PageData, ResultCode, SourceState, TransferMechanism,
};
use scanwerk_dsm::traits::{
    MemXferPayload, NativeXferPayload, SetupFileXferPayload, SetupMemXferPayload,
};
use scanwerk_dsm::{Dat, Msg, Payload, Triplet};

use crate::acquire::AcquireJob;
use crate::source::Source;

/// Where the strip buffer currently lives.
#[derive(Debug)]
pub(crate) enum BufferLease {
    /// No buffer negotiated (native/file transfers).
    Empty,
    /// Buffer at rest between device calls.
    Held(Vec<u8>),
    /// Buffer handed to the manager for filling.
    Leased,
}

/// The single in-flight transfer of a source.
#[derive(Debug)]
pub(crate) struct TransferContext {
    pub mechanism: TransferMechanism,
    pub lease: BufferLease,
}

/// How one page transfer ended.
#[derive(Debug)]
pub(crate) enum PageTransfer {
    Done(PageData),
    Cancelled,
}

impl Source {
    /// Claim the transfer slot and enter the transferring state.
    pub(crate) fn begin_transfer(
        &mut self,
        mechanism: TransferMechanism,
        buffer: Option<Vec<u8>>,
    ) -> Result<()> {
        if self.xfer.is_some() {
            return Err(ScanwerkError::BufferInFlight);
        }
        if self.state < SourceState::TransferReady {
            return Err(ScanwerkError::Sequence {
                state: self.state,
                detail: "transfer begun before transfer-ready".into(),
            });
        }
        self.xfer = Some(TransferContext {
            mechanism,
            lease: match buffer {
                Some(buf) => BufferLease::Held(buf),
                None => BufferLease::Empty,
            },
        });
        self.state = SourceState::Transferring;
        Ok(())
    }

    /// Take the strip buffer out of the slot for one device call.
    pub(crate) fn lease_buffer(&mut self) -> Result<Vec<u8>> {
        let Some(xfer) = self.xfer.as_mut() else {
            return Err(ScanwerkError::Misuse("no transfer in progress".into()));
        };
        match std::mem::replace(&mut xfer.lease, BufferLease::Leased) {
            BufferLease::Held(buf) => Ok(buf),
            BufferLease::Leased => Err(ScanwerkError::BufferInFlight),
            BufferLease::Empty => {
                xfer.lease = BufferLease::Empty;
                Err(ScanwerkError::Misuse(
                    "transfer has no strip buffer".into(),
                ))
            }
        }
    }

    /// Return the strip buffer after a device call.
    pub(crate) fn restore_buffer(&mut self, buffer: Vec<u8>) {
        if let Some(xfer) = self.xfer.as_mut() {
            xfer.lease = BufferLease::Held(buffer);
        }
    }

    /// Release the transfer slot.
    pub(crate) fn finish_transfer(&mut self) {
        self.xfer = None;
    }
}

/// Move one page with the job's mechanism. The caller acknowledges via the
/// pending-transfers triplet afterwards.
pub(crate) fn transfer_one_page(
    source: &mut Source,
    job: &mut AcquireJob,
    info: &ImageInfo,
    page_index: u32,
) -> Result<PageTransfer> {
    match job.mechanism {
        TransferMechanism::Native => native_transfer(source, &job.destination),
        TransferMechanism::Buffered => buffered_transfer(source, job, info),
        TransferMechanism::File => file_transfer(source, job, page_index),
        TransferMechanism::AudioNative => audio_transfer(source),
    }
}

fn native_transfer(source: &mut Source, destination: &Destination) -> Result<PageTransfer> {
    source.begin_transfer(TransferMechanism::Native, None)?;
    let mut payload = Payload::NativeXfer(NativeXferPayload::default());
    let rc = source.call(Triplet::image(Dat::ImageNativeXfer, Msg::Get), &mut payload);
    source.finish_transfer();
    let rc = rc?;
    if rc == ResultCode::Cancel {
        return Ok(PageTransfer::Cancelled);
    }
    let handle = match payload {
        Payload::NativeXfer(native) => native.handle,
        _ => None,
    };
    let Some(data) = handle else {
        return Err(ScanwerkError::Transfer(
            "native transfer completed without a buffer".into(),
        ));
    };
    debug!(bytes = data.len(), "native page transferred");
    Ok(PageTransfer::Done(match destination {
        Destination::Discard => PageData::Discarded,
        _ => PageData::Native(data),
    }))
}

fn buffered_transfer(
    source: &mut Source,
    job: &AcquireJob,
    info: &ImageInfo,
) -> Result<PageTransfer> {
    let mut setup = Payload::SetupMemXfer(SetupMemXferPayload::default());
    source.call(Triplet::control(Dat::SetupMemXfer, Msg::Get), &mut setup)?;
    let (min, preferred, max) = match setup {
        Payload::SetupMemXfer(s) => (s.min_size, s.preferred, s.max_size),
        _ => (0, 0, 0),
    };

    let strip_len = strip_size(source, job, min, preferred, max)?;
    debug!(strip_len, min, preferred, max, "buffered transfer negotiated");

    source.begin_transfer(TransferMechanism::Buffered, Some(vec![0u8; strip_len as usize]))?;
    let mut assembled = Vec::with_capacity(estimated_bytes(info, source.ctx.config().max_buffer_bytes));
    loop {
        let buffer = match source.lease_buffer() {
            Ok(buf) => buf,
            Err(err) => {
                source.finish_transfer();
                return Err(err);
            }
        };
        let mut payload = Payload::MemXfer(MemXferPayload {
            buffer,
            ..Default::default()
        });
        let rc = source.call(Triplet::image(Dat::ImageMemXfer, Msg::Get), &mut payload);
        let mem = match payload {
            Payload::MemXfer(mem) => mem,
            _ => MemXferPayload::default(),
        };
        match rc {
            Ok(rc) => {
                assembled.extend_from_slice(&mem.buffer[..mem.bytes_written as usize]);
                trace!(
                    bytes = mem.bytes_written,
                    rows = mem.rows,
                    offset = mem.y_offset,
                    "strip received"
                );
                source.restore_buffer(mem.buffer);
                match rc {
                    ResultCode::XferDone => break,
                    ResultCode::Cancel => {
                        source.finish_transfer();
                        return Ok(PageTransfer::Cancelled);
                    }
                    _ => {}
                }
            }
            Err(err) => {
                source.finish_transfer();
                return Err(err);
            }
        }
    }
    source.finish_transfer();
    debug!(bytes = assembled.len(), "buffered page assembled");
    Ok(PageTransfer::Done(match job.destination {
        Destination::Discard => PageData::Discarded,
        _ => PageData::Memory(assembled),
    }))
}

/// Pick the strip size. A caller-supplied size is used exactly as given
/// (after bounds validation); otherwise the device's preferred size wins
/// unless it exceeds the allocation ceiling, in which case the minimum is
/// used. Auto-chosen sizes are clamped to the device's [min, max] window.
fn strip_size(
    source: &Source,
    job: &AcquireJob,
    min: u32,
    preferred: u32,
    max: u32,
) -> Result<u32> {
    if let Some(requested) = job.strip_buffer_size {
        if requested < min || (max > 0 && requested > max) {
            return Err(ScanwerkError::StripSize {
                requested,
                min,
                max,
            });
        }
        return Ok(requested);
    }
    let ceiling = source.ctx.config().max_buffer_bytes as u32;
    let chosen = if preferred > 0 { preferred } else { min.max(4096) };
    let chosen = if chosen > ceiling {
        min.max(1)
    } else {
        chosen.max(min)
    };
    // Auto-chosen sizes stay inside the device's advertised window.
    if max > 0 {
        Ok(chosen.min(max))
    } else {
        Ok(chosen)
    }
}

/// Capacity hint for the assembly buffer; undefined extents fall back to
/// zero and let the vector grow.
fn estimated_bytes(info: &ImageInfo, ceiling: usize) -> usize {
    if !info.width_known() || !info.height_known() {
        return 0;
    }
    let bits = info.width as u64 * info.height as u64 * u64::from(info.bits_per_pixel.max(1));
    usize::try_from(bits / 8).unwrap_or(0).min(ceiling)
}

fn file_transfer(
    source: &mut Source,
    job: &mut AcquireJob,
    page_index: u32,
) -> Result<PageTransfer> {
    let Destination::File { path, format } = job.destination.clone() else {
        return Err(ScanwerkError::Misuse(
            "file transfer requires a file destination".into(),
        ));
    };

    // Learn the device's proposed name, then override it.
    let mut proposal = Payload::SetupFileXfer(SetupFileXferPayload {
        path: PathBuf::new(),
        format,
    });
    source.call(Triplet::control(Dat::SetupFileXfer, Msg::Get), &mut proposal)?;
    let proposed = match proposal {
        Payload::SetupFileXfer(setup) => setup.path,
        _ => PathBuf::new(),
    };

    let target = match job.rename_hook.as_mut() {
        Some(hook) => hook(&proposed, page_index),
        None => page_path(&path, format, page_index),
    };
    let mut setup = Payload::SetupFileXfer(SetupFileXferPayload {
        path: target.clone(),
        format,
    });
    source.call(Triplet::control(Dat::SetupFileXfer, Msg::Set), &mut setup)?;

    source.begin_transfer(TransferMechanism::File, None)?;
    let mut payload = Payload::None;
    let rc = source.call(Triplet::image(Dat::ImageFileXfer, Msg::Get), &mut payload);
    source.finish_transfer();
    if rc? == ResultCode::Cancel {
        return Ok(PageTransfer::Cancelled);
    }
    debug!(path = %target.display(), "file page transferred");
    Ok(PageTransfer::Done(PageData::File(target)))
}

fn audio_transfer(source: &mut Source) -> Result<PageTransfer> {
    source.begin_transfer(TransferMechanism::AudioNative, None)?;
    let mut payload = Payload::NativeXfer(NativeXferPayload::default());
    let rc = source.call(Triplet::audio(Dat::AudioNativeXfer, Msg::Get), &mut payload);
    source.finish_transfer();
    if rc? == ResultCode::Cancel {
        return Ok(PageTransfer::Cancelled);
    }
    let handle = match payload {
        Payload::NativeXfer(native) => native.handle,
        _ => None,
    };
    let Some(data) = handle else {
        return Err(ScanwerkError::Transfer(
            "audio transfer completed without a clip".into(),
        ));
    };
    debug!(bytes = data.len(), "audio clip transferred");
    Ok(PageTransfer::Done(PageData::Audio(data)))
}

/// Page-numbered variant of the destination path: the base name for page
/// zero, `stem-NNNN.ext` afterwards.
fn page_path(base: &Path, format: FileFormat, index: u32) -> PathBuf {
    if index == 0 {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".into());
    let ext = base
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| format.extension().into());
    base.with_file_name(format!("{stem}-{:04}.{ext}", index + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::context::EngineContext;
    use crate::session::Session;
    use scanwerk_core::config::EngineConfig;
    use scanwerk_core::types::AppIdentity;
    use scanwerk_dsm::stub::StubManager;

    #[test]
    fn transfer_slot_is_single_occupancy() {
        let ctx = EngineContext::init(EngineConfig::default()).expect("init");
        let stub = Arc::new(StubManager::new().with_pages(1, 16));
        let app = AppIdentity::new("Scanwerk", "Engine", "SlotTest");
        let mut session = Session::open_with(ctx, stub, app).expect("session");
        let source = session.open_default().expect("open");
        source.enable_ui(false).expect("enable");
        source.state = SourceState::TransferReady;

        source
            .begin_transfer(TransferMechanism::Buffered, Some(vec![0u8; 8]))
            .expect("first claim");
        assert!(matches!(
            source.begin_transfer(TransferMechanism::Native, None),
            Err(ScanwerkError::BufferInFlight)
        ));

        let buf = source.lease_buffer().expect("lease");
        assert!(matches!(
            source.lease_buffer(),
            Err(ScanwerkError::BufferInFlight)
        ));
        source.restore_buffer(buf);
        source.lease_buffer().expect("lease again after return");

        source.finish_transfer();
        source
            .begin_transfer(TransferMechanism::Native, None)
            .expect("slot free again");
        source.finish_transfer();
    }

    #[test]
    fn page_paths_number_from_the_second_page() {
        let base = PathBuf::from("/scans/batch.tif");
        assert_eq!(page_path(&base, FileFormat::Tiff, 0), base);
        assert_eq!(
            page_path(&base, FileFormat::Tiff, 1),
            PathBuf::from("/scans/batch-0002.tif")
        );
        assert_eq!(
            page_path(&base, FileFormat::Tiff, 11),
            PathBuf::from("/scans/batch-0012.tif")
        );
    }

    #[test]
    fn estimate_honours_the_sentinel() {
        let known = ImageInfo {
            width: 100,
            height: 200,
            bits_per_pixel: 8,
            pixel_type: scanwerk_core::types::PixelType::Gray,
            x_resolution: 300.0,
            y_resolution: 300.0,
        };
        assert_eq!(estimated_bytes(&known, usize::MAX), 20_000);
        let unknown = ImageInfo {
            height: ImageInfo::UNDEFINED,
            ..known
        };
        assert_eq!(estimated_bytes(&unknown, usize::MAX), 0);
        // The ceiling bounds the hint.
        assert_eq!(estimated_bytes(&known, 1024), 1024);
    }
}
